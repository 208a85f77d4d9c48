use std::time::Duration;

pub(crate) const SESSION_COOKIE: &str = "PHPSESSID";
pub(crate) const COMMAND_MARKER: char = '!';

pub(crate) const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_SEND_RETRY_DELAY: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower value fires first among tasks due at the same instant: pending
/// replies go out before the next poll.
pub(crate) const SEND_PRIORITY: u8 = 0;
pub(crate) const UPDATE_PRIORITY: u8 = 1;

/// How many recent sequence numbers the client remembers for echo dedup.
pub(crate) const SEEN_CAPACITY: usize = 512;

pub(crate) const DEFAULT_LOG_CAPACITY: usize = 5000;
pub(crate) const DEFAULT_RETENTION_DAYS: u32 = 30;
pub(crate) const SECS_PER_DAY: i64 = 86400;

pub(crate) const DEFAULT_SMTP_PORT: u16 = 587;

pub(crate) const DEFAULT_FEED_INTERVAL_SECS: u64 = 60;
pub(crate) const DEFAULT_FEED_STARTUP_DELAY_SECS: u64 = 30;
pub(crate) const DEFAULT_FEED_GAP_SECS: u64 = 5;
