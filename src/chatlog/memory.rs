use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{LogEntry, LogStore, Mark};
use crate::error::AppError;

struct Inner {
    entries: VecDeque<LogEntry>,
    marks: HashMap<String, Mark>,
}

/// Bounded log: once `capacity` entries are held, the oldest is dropped.
pub(crate) struct MemoryLog {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MemoryLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                marks: HashMap::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogStore for MemoryLog {
    fn append(&self, entry: &LogEntry) -> Result<(), AppError> {
        let mut inner = self.lock();
        while inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry.clone());
        Ok(())
    }

    fn messages_between(&self, start: i64, end: i64) -> Result<Vec<LogEntry>, AppError> {
        let inner = self.lock();
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect())
    }

    fn open_mark(&self, name: &str, at: i64) -> Result<bool, AppError> {
        let mut inner = self.lock();
        if inner.marks.contains_key(name) {
            return Ok(false);
        }
        inner.marks.insert(
            name.to_string(),
            Mark {
                name: name.to_string(),
                start_ts: at,
                end_ts: None,
            },
        );
        Ok(true)
    }

    fn close_mark(&self, name: &str, at: i64) -> Result<bool, AppError> {
        let mut inner = self.lock();
        match inner.marks.get_mut(name) {
            Some(mark) if mark.is_open() => {
                mark.end_ts = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_mark(&self, name: &str) -> Result<Option<Mark>, AppError> {
        Ok(self.lock().marks.get(name).cloned())
    }

    fn marks(&self) -> Result<Vec<Mark>, AppError> {
        let mut marks: Vec<Mark> = self.lock().marks.values().cloned().collect();
        marks.sort_by(|a, b| a.start_ts.cmp(&b.start_ts).then_with(|| a.name.cmp(&b.name)));
        Ok(marks)
    }

    fn clear(&self) -> Result<(usize, usize), AppError> {
        let mut inner = self.lock();
        let counts = (inner.entries.len(), inner.marks.len());
        inner.entries.clear();
        inner.marks.clear();
        Ok(counts)
    }
}
