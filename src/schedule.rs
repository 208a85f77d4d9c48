use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Task {
    Update,
    Send(String),
}

struct Entry {
    fire_at: Instant,
    priority: u8,
    seq: u64,
    task: Task,
}

impl Entry {
    fn key(&self) -> (Instant, u8, u64) {
        (self.fire_at, self.priority, self.seq)
    }
}

// BinaryHeap is a max-heap; reverse so the earliest entry sits on top.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

/// Work queue of one-shot tasks ordered by fire time, then priority, then
/// insertion order. Recurrence comes from tasks re-entering themselves.
#[derive(Default)]
pub(crate) struct Scheduler {
    queue: BinaryHeap<Entry>,
    next_seq: u64,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enter(&mut self, delay: Duration, priority: u8, task: Task) {
        self.enter_at(Instant::now() + delay, priority, task);
    }

    pub(crate) fn enter_at(&mut self, fire_at: Instant, priority: u8, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry {
            fire_at,
            priority,
            seq,
            task,
        });
    }

    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.queue.peek().map(|e| e.fire_at)
    }

    /// Remove and return the earliest task if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Task> {
        if self.queue.peek()?.fire_at > now {
            return None;
        }
        self.queue.pop().map(|e| e.task)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Snapshot of queued tasks in firing order.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> Vec<(Instant, &Task)> {
        let mut entries: Vec<&Entry> = self.queue.iter().collect();
        entries.sort_by_key(|e| e.key());
        entries.into_iter().map(|e| (e.fire_at, &e.task)).collect()
    }
}
