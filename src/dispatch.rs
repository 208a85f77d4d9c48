use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::constants::COMMAND_MARKER;
use crate::error::AppError;
use crate::parser::MessageRecord;

/// Handle for requesting outgoing chat messages. Every producer (handlers,
/// background feeds) goes through here; the client's run loop is the only
/// reader and the only one that talks to the server.
#[derive(Clone)]
pub(crate) struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn send(&self, text: impl Into<String>) {
        if self.tx.send(text.into()).is_err() {
            warn!("Outbox closed, dropping outgoing message");
        }
    }
}

pub(crate) type FullHandler =
    Box<dyn Fn(&MessageRecord, &Outbox) -> Result<(), AppError> + Send + Sync>;
pub(crate) type ContentHandler = Box<dyn Fn(&str, &Outbox) -> Result<(), AppError> + Send + Sync>;
pub(crate) type Observer = Box<dyn Fn(&MessageRecord) + Send + Sync>;

pub(crate) enum Handler {
    Full(FullHandler),
    Content(ContentHandler),
}

impl Handler {
    fn kind(&self) -> &'static str {
        match self {
            Handler::Full(_) => "full",
            Handler::Content(_) => "content",
        }
    }

    fn invoke(&self, record: &MessageRecord, outbox: &Outbox) -> Result<(), AppError> {
        match self {
            Handler::Full(h) => h(record, outbox),
            Handler::Content(h) => h(&record.content, outbox),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DispatchOutcome {
    pub(crate) invoked: usize,
    pub(crate) failed: usize,
}

/// Command name → handlers. At most one handler of each kind per name; a
/// full-record handler always runs before a content-only one.
#[derive(Default)]
pub(crate) struct CommandRegistry {
    commands: HashMap<String, Vec<Handler>>,
    observers: Vec<Observer>,
}

pub(crate) fn command_name(content: &str) -> Option<String> {
    content
        .strip_prefix(COMMAND_MARKER)?
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl CommandRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_full<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&MessageRecord, &Outbox) -> Result<(), AppError> + Send + Sync + 'static,
    {
        self.insert(name, Handler::Full(Box::new(handler)));
    }

    pub(crate) fn register_content<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&str, &Outbox) -> Result<(), AppError> + Send + Sync + 'static,
    {
        self.insert(name, Handler::Content(Box::new(handler)));
    }

    /// Observers see every record, command or not.
    pub(crate) fn observe<F>(&mut self, observer: F)
    where
        F: Fn(&MessageRecord) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    fn insert(&mut self, name: &str, handler: Handler) {
        let key = name.to_lowercase();
        let slot = self.commands.entry(key.clone()).or_default();
        if let Some(pos) = slot.iter().position(|h| h.kind() == handler.kind()) {
            warn!(command = %key, kind = handler.kind(), "Replacing registered handler");
            slot.remove(pos);
        }
        slot.push(handler);
        slot.sort_by_key(|h| matches!(h, Handler::Content(_)));
        if slot.len() > 1 {
            warn!(command = %key, "Command has both full and content handlers; both will fire");
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    pub(crate) fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn dispatch(&self, record: &MessageRecord, outbox: &Outbox) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for observer in &self.observers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer(record))) {
                error!(
                    sender = %record.sender,
                    number = record.number,
                    "Message observer panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }

        let Some(name) = command_name(&record.content) else {
            return outcome;
        };
        let Some(handlers) = self.commands.get(&name) else {
            debug!(command = %name, "No handler for command");
            return outcome;
        };

        for handler in handlers {
            outcome.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler.invoke(record, outbox))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    error!(
                        command = %name,
                        kind = handler.kind(),
                        sender = %record.sender,
                        "Handler failed: {e}"
                    );
                }
                Err(panic) => {
                    outcome.failed += 1;
                    error!(
                        command = %name,
                        kind = handler.kind(),
                        sender = %record.sender,
                        "Handler panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub(crate) fn record(sender: &str, content: &str) -> MessageRecord {
        MessageRecord {
            number: 1,
            date: "01/01/2020".to_string(),
            time: "12:00:00".to_string(),
            sender: sender.to_string(),
            room: "room1".to_string(),
            msg_type: "normal".to_string(),
            content: content.to_string(),
        }
    }

    pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(text);
        }
        out
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&c), c)
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name("!HoLa").as_deref(), Some("hola"));
        assert_eq!(command_name("!topsy a b").as_deref(), Some("topsy"));
        assert_eq!(command_name("!  hola there").as_deref(), Some("hola"));
        assert_eq!(command_name("hello"), None);
        assert_eq!(command_name(" !hola"), None);
        assert_eq!(command_name("!"), None);
    }

    #[test]
    fn test_dispatch_case_insensitive() {
        let (hits, seen) = counter();
        let mut registry = CommandRegistry::new();
        registry.register_full("hola", move |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let (outbox, _rx) = Outbox::channel();
        let outcome = registry.dispatch(&record("Alice", "!HoLa"), &outbox);
        assert_eq!(outcome.invoked, 1);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_registration_name_lowercased() {
        let mut registry = CommandRegistry::new();
        registry.register_content("gimmeBeer", |_, _| Ok(()));
        assert!(registry.contains("gimmebeer"));
        assert!(registry.contains("GIMMEBEER"));
        assert_eq!(registry.command_names(), vec!["gimmebeer".to_string()]);
    }

    #[test]
    fn test_non_command_is_noop() {
        let (hits, seen) = counter();
        let mut registry = CommandRegistry::new();
        registry.register_full("hello", move |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let (outbox, _rx) = Outbox::channel();
        let outcome = registry.dispatch(&record("Alice", "hello"), &outbox);
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unknown_command_is_noop() {
        let registry = CommandRegistry::new();
        let (outbox, _rx) = Outbox::channel();
        let outcome = registry.dispatch(&record("Alice", "!nope"), &outbox);
        assert_eq!(outcome.invoked, 0);
    }

    #[test]
    fn test_content_handler_receives_content_only() {
        let got = Arc::new(Mutex::new(String::new()));
        let got_clone = Arc::clone(&got);
        let mut registry = CommandRegistry::new();
        registry.register_content("echo", move |content, _| {
            *got_clone.lock().unwrap() = content.to_string();
            Ok(())
        });
        let (outbox, _rx) = Outbox::channel();
        registry.dispatch(&record("Alice", "!echo some words"), &outbox);
        assert_eq!(*got.lock().unwrap(), "!echo some words");
    }

    #[test]
    fn test_both_tables_fire_full_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2) = (Arc::clone(&order), Arc::clone(&order));
        let mut registry = CommandRegistry::new();
        registry.register_content("dup", move |_, _| {
            o1.lock().unwrap().push("content");
            Ok(())
        });
        registry.register_full("dup", move |_, _| {
            o2.lock().unwrap().push("full");
            Ok(())
        });
        let (outbox, _rx) = Outbox::channel();
        let outcome = registry.dispatch(&record("Alice", "!dup"), &outbox);
        assert_eq!(outcome.invoked, 2);
        assert_eq!(*order.lock().unwrap(), vec!["full", "content"]);
    }

    #[test]
    fn test_reregistering_same_kind_replaces() {
        let (hits, seen) = counter();
        let mut registry = CommandRegistry::new();
        registry.register_full("hola", |_, _| Err(AppError::Handler("old".to_string())));
        registry.register_full("hola", move |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let (outbox, _rx) = Outbox::channel();
        let outcome = registry.dispatch(&record("Alice", "!hola"), &outbox);
        assert_eq!(outcome, DispatchOutcome { invoked: 1, failed: 0 });
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handler_error_is_contained() {
        let (hits, seen) = counter();
        let mut registry = CommandRegistry::new();
        registry.register_full("x", |_, _| Err(AppError::Handler("boom".to_string())));
        registry.register_content("x", move |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let (outbox, _rx) = Outbox::channel();
        let outcome = registry.dispatch(&record("Alice", "!x"), &outbox);
        assert_eq!(outcome, DispatchOutcome { invoked: 2, failed: 1 });
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let mut registry = CommandRegistry::new();
        registry.register_full("crash", |_, _| panic!("handler exploded"));
        registry.register_full("ok", |_, outbox| {
            outbox.send("still alive");
            Ok(())
        });
        let (outbox, mut rx) = Outbox::channel();
        let first = registry.dispatch(&record("Alice", "!crash"), &outbox);
        assert_eq!(first.failed, 1);
        registry.dispatch(&record("Alice", "!ok"), &outbox);
        assert_eq!(drain(&mut rx), vec!["still alive".to_string()]);
    }

    #[test]
    fn test_observers_see_every_record() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let mut registry = CommandRegistry::new();
        registry.observe(move |r| seen_clone.lock().unwrap().push(r.content.clone()));
        let (outbox, _rx) = Outbox::channel();
        registry.dispatch(&record("Alice", "plain chat"), &outbox);
        registry.dispatch(&record("Bob", "!unknown"), &outbox);
        assert_eq!(*seen.lock().unwrap(), vec!["plain chat", "!unknown"]);
    }

    #[test]
    fn test_panicking_observer_does_not_block_commands() {
        let (hits, seen) = counter();
        let mut registry = CommandRegistry::new();
        registry.observe(|_| panic!("observer broke"));
        registry.register_full("hola", move |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let (outbox, _rx) = Outbox::channel();
        registry.dispatch(&record("Alice", "!hola"), &outbox);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_outbox_send_after_receiver_dropped_does_not_panic() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        outbox.send("nobody listening");
    }
}
