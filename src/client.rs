use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::{SEEN_CAPACITY, SEND_PRIORITY, UPDATE_PRIORITY};
use crate::dispatch::{CommandRegistry, Outbox};
use crate::error::ConnectError;
use crate::helpers::truncate;
use crate::parser::parse_response;
use crate::schedule::{Scheduler, Task};
use crate::session::{self, Session};
use crate::traits::ChatApi;

/// One chat connection plus everything that acts on it. The run loop is the
/// only code path that issues chat commands.
pub(crate) struct PfcClient {
    api: Box<dyn ChatApi>,
    session: Option<Session>,
    registry: CommandRegistry,
    scheduler: Scheduler,
    outbox: Outbox,
    inbox: mpsc::UnboundedReceiver<String>,
    seen: HashSet<u64>,
    seen_order: VecDeque<u64>,
    poll_delay: Duration,
    retry_delay: Duration,
}

impl PfcClient {
    pub(crate) fn new(
        api: Box<dyn ChatApi>,
        registry: CommandRegistry,
        poll_delay: Duration,
        retry_delay: Duration,
    ) -> Self {
        let (outbox, inbox) = Outbox::channel();
        Self {
            api,
            session: None,
            registry,
            scheduler: Scheduler::new(),
            outbox,
            inbox,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            poll_delay,
            retry_delay,
        }
    }

    /// A producer handle for background tasks.
    pub(crate) fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    pub(crate) async fn connect(&mut self, display_name: &str) -> Result<(), ConnectError> {
        let session = session::connect(self.api.as_ref(), display_name).await?;
        self.session = Some(session);
        Ok(())
    }

    pub(crate) fn schedule_update(&mut self) {
        self.scheduler
            .enter(self.poll_delay, UPDATE_PRIORITY, Task::Update);
    }

    /// Poll for new messages. Reschedules before doing anything else so a
    /// failed poll never ends the recurrence.
    pub(crate) async fn update(&mut self) {
        self.schedule_update();
        let Some(session) = &self.session else {
            warn!("Update skipped, not connected");
            return;
        };
        let result = self
            .api
            .handle_request(&session.cookie, &session.update_command())
            .await;
        match result {
            Ok(body) => {
                self.update_received(&body);
            }
            Err(e) => warn!(endpoint = %session.endpoint, "Update failed: {e}"),
        }
    }

    /// Parse a response body and dispatch every record not seen before.
    /// Returns how many records were dispatched.
    pub(crate) fn update_received(&mut self, body: &str) -> usize {
        let mut dispatched = 0;
        for record in parse_response(body) {
            if !self.remember(record.number) {
                debug!(number = record.number, sender = %record.sender, "Skipping already dispatched message");
                continue;
            }
            debug!(
                number = record.number,
                sender = %record.sender,
                room = %record.room,
                msg_type = %record.msg_type,
                sent_at = %format!("{} {}", record.date, record.time),
                "Dispatching message"
            );
            let outcome = self.registry.dispatch(&record, &self.outbox);
            if outcome.failed > 0 {
                warn!(
                    number = record.number,
                    invoked = outcome.invoked,
                    failed = outcome.failed,
                    "Some handlers failed for message"
                );
            }
            dispatched += 1;
        }
        dispatched
    }

    fn remember(&mut self, number: u64) -> bool {
        if !self.seen.insert(number) {
            return false;
        }
        self.seen_order.push_back(number);
        if self.seen_order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Post a chat message. A transport failure schedules one retry of the
    /// same text; that retry does the same if it fails in turn.
    pub(crate) async fn send(&mut self, text: String) {
        let Some(session) = &self.session else {
            warn!(text = %truncate(&text, 80), "Send dropped, not connected");
            return;
        };
        let result = self
            .api
            .handle_request(&session.cookie, &session.send_command(&text))
            .await;
        match result {
            Ok(body) => {
                debug!(text = %truncate(&text, 80), "Message sent");
                self.update_received(&body);
            }
            Err(e) => {
                warn!(
                    text = %truncate(&text, 80),
                    retry_in_ms = self.retry_delay.as_millis() as u64,
                    "Send failed: {e}"
                );
                self.scheduler
                    .enter(self.retry_delay, SEND_PRIORITY, Task::Send(text));
            }
        }
    }

    fn enqueue_send(&mut self, text: String) {
        self.scheduler
            .enter(Duration::ZERO, SEND_PRIORITY, Task::Send(text));
    }

    /// Move every waiting outbox item onto the task queue.
    pub(crate) fn collect_outbox(&mut self) -> usize {
        let mut moved = 0;
        while let Ok(text) = self.inbox.try_recv() {
            self.enqueue_send(text);
            moved += 1;
        }
        moved
    }

    async fn execute(&mut self, task: Task) {
        match task {
            Task::Update => self.update().await,
            Task::Send(text) => self.send(text).await,
        }
    }

    /// Execute every task that is due now, in queue order.
    pub(crate) async fn run_due(&mut self) -> usize {
        let mut executed = 0;
        self.collect_outbox();
        while let Some(task) = self.scheduler.pop_due(Instant::now()) {
            self.execute(task).await;
            self.collect_outbox();
            executed += 1;
        }
        executed
    }

    pub(crate) async fn run(&mut self) {
        info!(
            commands = ?self.registry.command_names(),
            poll_delay_secs = self.poll_delay.as_secs(),
            "Entering run loop"
        );
        loop {
            self.run_due().await;
            let next = self.scheduler.next_due();
            debug!(queued = self.scheduler.len(), "Waiting for next task");
            tokio::select! {
                Some(text) = self.inbox.recv() => self.enqueue_send(text),
                _ = sleep_until(next) => {}
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
