use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::dispatch::Outbox;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct RecentChangesResponse {
    query: RecentChangesQuery,
}

#[derive(Debug, Deserialize)]
struct RecentChangesQuery {
    recentchanges: Vec<RecentChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct RecentChange {
    #[serde(default)]
    pub(crate) user: String,
    pub(crate) title: String,
    pub(crate) timestamp: String,
    pub(crate) revid: u64,
}

/// Oldest edit time of interest, in the compact form MediaWiki expects.
pub(crate) fn rcend_param(now: DateTime<Utc>, window: Duration) -> String {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
    (now - window).format("%Y%m%d%H%M%S").to_string()
}

pub(crate) fn format_change(change: &RecentChange, wiki_url: &str) -> String {
    format!(
        "{} editó \"{}\" a las {}. Ver diff: {}/index.php?oldid={}&diff=prev",
        change.user,
        change.title,
        change.timestamp,
        wiki_url.trim_end_matches('/'),
        change.revid
    )
}

pub(crate) async fn fetch_recent_changes(
    http: &Client,
    api_url: &str,
    rcend: &str,
) -> Result<Vec<RecentChange>, AppError> {
    let resp = http
        .get(api_url)
        .query(&[
            ("action", "query"),
            ("list", "recentchanges"),
            ("rcshow", "anon"),
            ("rcprop", "title|ids|user|timestamp"),
            ("rcend", rcend),
            ("rclimit", "500"),
            ("format", "json"),
        ])
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(AppError::Other(format!(
            "Recent changes query failed: {}",
            resp.status()
        )));
    }
    let body = resp.text().await?;
    let parsed: RecentChangesResponse = serde_json::from_str(&body)?;
    Ok(parsed.query.recentchanges)
}

/// One query plus one outbox message per change. Returns the number announced.
pub(crate) async fn announce_recent_changes(
    http: &Client,
    cfg: &FeedConfig,
    outbox: &Outbox,
) -> Result<usize, AppError> {
    let rcend = rcend_param(Utc::now(), Duration::from_secs(cfg.interval_secs));
    debug!(rcend = %rcend, "Querying recent changes");
    let changes = fetch_recent_changes(http, &cfg.api_url, &rcend).await?;
    for change in &changes {
        outbox.send(format_change(change, &cfg.wiki_url));
        tokio::time::sleep(Duration::from_secs(cfg.message_gap_secs)).await;
    }
    Ok(changes.len())
}

pub(crate) fn spawn_recent_changes(
    cfg: FeedConfig,
    timeout: Duration,
    outbox: Outbox,
) -> Result<JoinHandle<()>, AppError> {
    let http = Client::builder().timeout(timeout).build()?;
    info!(
        api_url = %cfg.api_url,
        interval_secs = cfg.interval_secs,
        "Starting recent-changes feed"
    );
    Ok(tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(cfg.startup_delay_secs)).await;
        loop {
            match announce_recent_changes(&http, &cfg, &outbox).await {
                Ok(0) => debug!("No recent changes"),
                Ok(count) => info!(count, "Announced recent changes"),
                Err(e) => warn!(api_url = %cfg.api_url, "Recent changes fetch failed: {e}"),
            }
            tokio::time::sleep(Duration::from_secs(cfg.interval_secs)).await;
        }
    }))
}
