use crate::dispatch::CommandRegistry;
use crate::helpers::command_rest;

fn cmd_gimme(sender: &str, content: &str) -> String {
    match command_rest(content) {
        "" => format!("Gimme what, {sender}?"),
        thing => format!("{sender}, here's your {thing}!"),
    }
}

pub(crate) fn register(registry: &mut CommandRegistry) {
    registry.register_full("gimme", |record, outbox| {
        outbox.send(cmd_gimme(&record.sender, &record.content));
        Ok(())
    });
}
