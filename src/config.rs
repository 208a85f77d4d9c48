use rand::Rng;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_FEED_GAP_SECS, DEFAULT_FEED_INTERVAL_SECS, DEFAULT_FEED_STARTUP_DELAY_SECS,
    DEFAULT_LOG_CAPACITY, DEFAULT_POLL_DELAY, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETENTION_DAYS,
    DEFAULT_SEND_RETRY_DELAY, DEFAULT_SMTP_PORT,
};
use crate::error::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) chat: ChatConfig,
    pub(crate) bots: BotGroups,
    pub(crate) log: LogConfig,
    pub(crate) mail: Option<MailConfig>,
    pub(crate) feed: Option<FeedConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ChatConfig {
    pub(crate) url: String,
    pub(crate) name: String,
    pub(crate) random_suffix: bool,
    pub(crate) poll_delay_secs: u64,
    pub(crate) send_retry_secs: u64,
    pub(crate) request_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: String::new(),
            random_suffix: true,
            poll_delay_secs: DEFAULT_POLL_DELAY.as_secs(),
            send_retry_secs: DEFAULT_SEND_RETRY_DELAY.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ChatConfig {
    pub(crate) fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    pub(crate) fn send_retry_delay(&self) -> Duration {
        Duration::from_secs(self.send_retry_secs)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Name shown in the room. Several bots may share a prefix, so a random
    /// four-digit suffix is appended unless disabled.
    pub(crate) fn display_name(&self) -> String {
        if self.random_suffix {
            let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
            format!("{}{suffix}", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum BotGroup {
    Greeter,
    Gimme,
    Harmonica,
    Logbook,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub(crate) struct BotGroups(pub(crate) Vec<BotGroup>);

impl Default for BotGroups {
    fn default() -> Self {
        Self(vec![
            BotGroup::Greeter,
            BotGroup::Gimme,
            BotGroup::Harmonica,
            BotGroup::Logbook,
        ])
    }
}

impl BotGroups {
    #[cfg(test)]
    pub(crate) fn contains(&self, group: BotGroup) -> bool {
        self.0.contains(&group)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum LogBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct LogConfig {
    pub(crate) backend: LogBackend,
    pub(crate) path: Option<PathBuf>,
    pub(crate) capacity: usize,
    pub(crate) retention_days: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            backend: LogBackend::Memory,
            path: None,
            capacity: DEFAULT_LOG_CAPACITY,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl LogConfig {
    pub(crate) fn db_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| config_dir().join("log.db"))
    }
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MailConfig {
    pub(crate) server: String,
    #[serde(default = "default_smtp_port")]
    pub(crate) port: u16,
    #[serde(default)]
    pub(crate) username: Option<String>,
    #[serde(default)]
    pub(crate) password: Option<String>,
    pub(crate) from: String,
    #[serde(default)]
    pub(crate) mailing_list: Option<String>,
}

fn default_feed_interval() -> u64 {
    DEFAULT_FEED_INTERVAL_SECS
}

fn default_feed_startup_delay() -> u64 {
    DEFAULT_FEED_STARTUP_DELAY_SECS
}

fn default_feed_gap() -> u64 {
    DEFAULT_FEED_GAP_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FeedConfig {
    pub(crate) api_url: String,
    pub(crate) wiki_url: String,
    #[serde(default = "default_feed_interval")]
    pub(crate) interval_secs: u64,
    #[serde(default = "default_feed_startup_delay")]
    pub(crate) startup_delay_secs: u64,
    #[serde(default = "default_feed_gap")]
    pub(crate) message_gap_secs: u64,
}

/// `~/.config/pfcbot`, or `./.config/pfcbot` without `HOME`. Not created here.
pub(crate) fn config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("pfcbot")
}

pub(crate) fn load_config_file(path: &Path) -> Result<Config, AppError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let config = if is_yaml {
        serde_yaml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };
    Ok(config)
}

impl Config {
    /// Command-line values win over the file.
    pub(crate) fn apply_overrides(&mut self, chat_url: Option<String>, name: Option<String>) {
        if let Some(url) = chat_url {
            self.chat.url = url;
        }
        if let Some(name) = name {
            self.chat.name = name;
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AppError> {
        if self.chat.url.trim().is_empty() {
            return Err(AppError::Config("chat.url is required".to_string()));
        }
        if self.chat.name.trim().is_empty() {
            return Err(AppError::Config("chat.name is required".to_string()));
        }
        if self.chat.poll_delay_secs == 0 {
            return Err(AppError::Config("chat.poll_delay_secs must be positive".to_string()));
        }
        if self.chat.send_retry_secs == 0 {
            return Err(AppError::Config("chat.send_retry_secs must be positive".to_string()));
        }
        if self.chat.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "chat.request_timeout_secs must be positive".to_string(),
            ));
        }
        if let Some(feed) = &self.feed {
            if feed.interval_secs == 0 {
                return Err(AppError::Config("feed.interval_secs must be positive".to_string()));
            }
        }
        Ok(())
    }
}
