mod memory;
mod sqlite;

use std::sync::Arc;
use tracing::info;

pub(crate) use memory::MemoryLog;
pub(crate) use sqlite::SqliteLog;

use crate::config::{LogBackend, LogConfig};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogEntry {
    pub(crate) timestamp: i64,
    pub(crate) sender: String,
    pub(crate) content: String,
}

/// A named time range over the log. `end_ts` stays `None` while the mark is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mark {
    pub(crate) name: String,
    pub(crate) start_ts: i64,
    pub(crate) end_ts: Option<i64>,
}

impl Mark {
    pub(crate) fn is_open(&self) -> bool {
        self.end_ts.is_none()
    }
}

/// Rolling chat log plus named marks.
pub(crate) trait LogStore: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<(), AppError>;
    /// Entries with `start <= timestamp <= end`, oldest first.
    fn messages_between(&self, start: i64, end: i64) -> Result<Vec<LogEntry>, AppError>;
    /// Returns false if a mark with this name already exists.
    fn open_mark(&self, name: &str, at: i64) -> Result<bool, AppError>;
    /// Returns false unless an open mark with this name was closed.
    fn close_mark(&self, name: &str, at: i64) -> Result<bool, AppError>;
    fn get_mark(&self, name: &str) -> Result<Option<Mark>, AppError>;
    /// All marks ordered by start time.
    fn marks(&self) -> Result<Vec<Mark>, AppError>;
    /// Removes every entry and mark. Returns `(entries, marks)` removed.
    fn clear(&self) -> Result<(usize, usize), AppError>;
}

pub(crate) fn open_log(cfg: &LogConfig) -> Result<Arc<dyn LogStore>, AppError> {
    match cfg.backend {
        LogBackend::Memory => {
            info!(capacity = cfg.capacity, "Using in-memory chat log");
            Ok(Arc::new(MemoryLog::new(cfg.capacity)))
        }
        LogBackend::Sqlite => {
            let path = cfg.db_path();
            info!(path = %path.display(), retention_days = cfg.retention_days, "Using SQLite chat log");
            Ok(Arc::new(SqliteLog::open(&path, cfg.retention_days)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_backend() {
        let log = open_log(&LogConfig::default()).unwrap();
        log.append(&LogEntry {
            timestamp: 10,
            sender: "Alice".to_string(),
            content: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(log.messages_between(0, 20).unwrap().len(), 1);
    }

    #[test]
    fn test_open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LogConfig {
            backend: LogBackend::Sqlite,
            path: Some(dir.path().join("log.db")),
            ..LogConfig::default()
        };
        let log = open_log(&cfg).unwrap();
        assert!(log.open_mark("standup", 100).unwrap());
        assert!(dir.path().join("log.db").exists());
    }

    #[test]
    fn test_mark_is_open() {
        let mut mark = Mark {
            name: "m".to_string(),
            start_ts: 1,
            end_ts: None,
        };
        assert!(mark.is_open());
        mark.end_ts = Some(2);
        assert!(!mark.is_open());
    }
}
