use chrono::{DateTime, Utc};

pub(crate) fn epoch_now() -> i64 {
    Utc::now().timestamp()
}

/// `YYYY-MM-DD HH:MM:SS` in UTC. Out-of-range values render as the raw number.
pub(crate) fn format_epoch(epoch: i64) -> String {
    match DateTime::from_timestamp(epoch, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch.to_string(),
    }
}

/// Whitespace-separated words of a chat message, command token included.
pub(crate) fn words(content: &str) -> Vec<&str> {
    content.split_whitespace().collect()
}

/// Everything after the command token, with surrounding whitespace removed.
pub(crate) fn command_rest(content: &str) -> &str {
    let trimmed = content.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => trimmed[idx..].trim(),
        None => "",
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}
