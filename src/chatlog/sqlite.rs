use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use super::{LogEntry, LogStore, Mark};
use crate::constants::SECS_PER_DAY;
use crate::error::AppError;

pub(crate) struct SqliteLog {
    conn: Mutex<Connection>,
}

fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS log_messages (
            id INTEGER PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            sender TEXT NOT NULL,
            content TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS log_messages_ts ON log_messages (timestamp);
        CREATE TABLE IF NOT EXISTS marks (
            name TEXT NOT NULL UNIQUE,
            start_ts INTEGER NOT NULL,
            end_ts INTEGER
        );",
    )?;
    Ok(())
}

fn purge_older_than(conn: &Connection, days: u32) -> usize {
    let cutoff = crate::helpers::epoch_now() - (days as i64 * SECS_PER_DAY);
    match conn.execute(
        "DELETE FROM log_messages WHERE timestamp < ?1",
        params![cutoff],
    ) {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to purge old log rows: {e}");
            0
        }
    }
}

impl SqliteLog {
    pub(crate) fn open(path: &Path, retention_days: u32) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_schema(&conn)?;
        let purged = purge_older_than(&conn, retention_days);
        if purged > 0 {
            info!(purged, retention_days, "Purged old log rows");
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn mark_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mark> {
    Ok(Mark {
        name: row.get(0)?,
        start_ts: row.get(1)?,
        end_ts: row.get(2)?,
    })
}

impl LogStore for SqliteLog {
    fn append(&self, entry: &LogEntry) -> Result<(), AppError> {
        self.conn().execute(
            "INSERT INTO log_messages (timestamp, sender, content) VALUES (?1, ?2, ?3)",
            params![entry.timestamp, entry.sender, entry.content],
        )?;
        Ok(())
    }

    fn messages_between(&self, start: i64, end: i64) -> Result<Vec<LogEntry>, AppError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT timestamp, sender, content FROM log_messages
             WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok(LogEntry {
                timestamp: row.get(0)?,
                sender: row.get(1)?,
                content: row.get(2)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn open_mark(&self, name: &str, at: i64) -> Result<bool, AppError> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO marks (name, start_ts, end_ts) VALUES (?1, ?2, NULL)",
            params![name, at],
        )?;
        Ok(inserted == 1)
    }

    fn close_mark(&self, name: &str, at: i64) -> Result<bool, AppError> {
        let updated = self.conn().execute(
            "UPDATE marks SET end_ts = ?2 WHERE name = ?1 AND end_ts IS NULL",
            params![name, at],
        )?;
        Ok(updated == 1)
    }

    fn get_mark(&self, name: &str) -> Result<Option<Mark>, AppError> {
        let mark = self
            .conn()
            .query_row(
                "SELECT name, start_ts, end_ts FROM marks WHERE name = ?1",
                params![name],
                mark_from_row,
            )
            .optional()?;
        Ok(mark)
    }

    fn marks(&self) -> Result<Vec<Mark>, AppError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT name, start_ts, end_ts FROM marks ORDER BY start_ts ASC, name ASC")?;
        let rows = stmt.query_map([], mark_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn clear(&self) -> Result<(usize, usize), AppError> {
        let conn = self.conn();
        let entries = conn.execute("DELETE FROM log_messages", [])?;
        let marks = conn.execute("DELETE FROM marks", [])?;
        Ok((entries, marks))
    }
}
