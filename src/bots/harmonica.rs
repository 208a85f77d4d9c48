use crate::dispatch::CommandRegistry;

pub(crate) const BEER_REPLY: &str = "Here's a beer for ya!";

pub(crate) fn register(registry: &mut CommandRegistry) {
    registry.register_content("gimmeBeer", |_, outbox| {
        outbox.send(BEER_REPLY);
        Ok(())
    });
}
