pub(crate) mod gimme;
pub(crate) mod greeter;
pub(crate) mod harmonica;
pub(crate) mod logbook;


use std::sync::Arc;
use tracing::info;

use crate::chatlog::LogStore;
use crate::config::{BotGroup, BotGroups};
use crate::dispatch::CommandRegistry;
use crate::traits::Mailer;

/// Populate a registry with every enabled command group.
pub(crate) fn register_enabled(
    registry: &mut CommandRegistry,
    groups: &BotGroups,
    log: Arc<dyn LogStore>,
    mailer: Option<Arc<dyn Mailer>>,
) {
    for group in &groups.0 {
        match group {
            BotGroup::Greeter => greeter::register(registry),
            BotGroup::Gimme => gimme::register(registry),
            BotGroup::Harmonica => harmonica::register(registry),
            BotGroup::Logbook => logbook::register(registry, Arc::clone(&log), mailer.clone()),
        }
        info!(group = ?group, "Registered bot commands");
    }
}
