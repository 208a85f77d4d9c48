use std::sync::Arc;
use tracing::{error, info, warn};

use crate::chatlog::{LogEntry, LogStore, Mark};
use crate::dispatch::{CommandRegistry, Outbox};
use crate::error::AppError;
use crate::helpers::{epoch_now, format_epoch, words};
use crate::parser::MessageRecord;
use crate::traits::Mailer;

fn cmd_mark_log(log: &dyn LogStore, name: Option<&str>, now: i64) -> Result<String, AppError> {
    let Some(name) = name else {
        return Ok("Usage: !markLog <name>".to_string());
    };
    let reply = match log.get_mark(name)? {
        None => {
            log.open_mark(name, now)?;
            format!("Mark '{name}' opened at {}.", format_epoch(now))
        }
        Some(mark) if mark.is_open() => {
            log.close_mark(name, now)?;
            format!("Mark '{name}' closed at {}.", format_epoch(now))
        }
        Some(_) => format!("Mark '{name}' is already taken. Choose another name."),
    };
    Ok(reply)
}

fn describe_mark(mark: &Mark) -> String {
    let end = match mark.end_ts {
        Some(ts) => format_epoch(ts),
        None => "open".to_string(),
    };
    format!("{} ({} - {end})", mark.name, format_epoch(mark.start_ts))
}

fn cmd_view_logs(log: &dyn LogStore) -> Result<String, AppError> {
    let marks = log.marks()?;
    if marks.is_empty() {
        return Ok("No marks.".to_string());
    }
    let listed: Vec<String> = marks.iter().map(describe_mark).collect();
    Ok(format!("Marks: {}", listed.join("; ")))
}

fn cmd_clear_log(log: &dyn LogStore) -> Result<String, AppError> {
    let (entries, marks) = log.clear()?;
    info!(entries, marks, "Chat log cleared");
    Ok(format!("Cleared {entries} messages and {marks} marks."))
}

pub(crate) fn format_transcript(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "(no messages)".to_string();
    }
    entries
        .iter()
        .map(|e| format!("[{}] {}: {}", format_epoch(e.timestamp), e.sender, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// An email ready to go out, or the reply explaining why it cannot.
enum SendLogPlan {
    Reply(String),
    Mail {
        mailer: Arc<dyn Mailer>,
        to: String,
        subject: String,
        body: String,
        lines: usize,
    },
}

fn plan_send_log(
    log: &dyn LogStore,
    mailer: Option<&Arc<dyn Mailer>>,
    name: Option<&str>,
    address: Option<&str>,
    now: i64,
) -> Result<SendLogPlan, AppError> {
    let Some(name) = name else {
        return Ok(SendLogPlan::Reply("Usage: !sendLog <name> [address]".to_string()));
    };
    let Some(mark) = log.get_mark(name)? else {
        return Ok(SendLogPlan::Reply(format!("No mark named '{name}'.")));
    };
    let Some(mailer) = mailer else {
        return Ok(SendLogPlan::Reply("Email is not configured.".to_string()));
    };
    let Some(to) = address.map(str::to_string).or_else(|| mailer.default_recipient()) else {
        return Ok(SendLogPlan::Reply(
            "No recipient: give an address or configure a mailing list.".to_string(),
        ));
    };
    let entries = log.messages_between(mark.start_ts, mark.end_ts.unwrap_or(now))?;
    Ok(SendLogPlan::Mail {
        mailer: Arc::clone(mailer),
        to,
        subject: format!("Chat log: {name}"),
        body: format_transcript(&entries),
        lines: entries.len(),
    })
}

/// SMTP blocks, so the mail goes out on the blocking pool and the outcome is
/// reported back through the outbox.
fn deliver(plan: SendLogPlan, outbox: &Outbox) -> Result<(), AppError> {
    let (mailer, to, subject, body, lines) = match plan {
        SendLogPlan::Reply(text) => {
            outbox.send(text);
            return Ok(());
        }
        SendLogPlan::Mail {
            mailer,
            to,
            subject,
            body,
            lines,
        } => (mailer, to, subject, body, lines),
    };
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| AppError::Handler(format!("No runtime for mail delivery: {e}")))?;
    let outbox = outbox.clone();
    handle.spawn_blocking(move || {
        let reply = match mailer.send_mail(&to, &subject, &body) {
            Ok(()) => {
                info!(to = %to, lines, "Chat log emailed");
                format!("Sent {lines} lines to {to}.")
            }
            Err(e) => {
                error!(to = %to, "Failed to email chat log: {e}");
                format!("Could not send the log to {to}.")
            }
        };
        outbox.send(reply);
    });
    Ok(())
}

fn record_entry(log: &dyn LogStore, record: &MessageRecord) {
    let entry = LogEntry {
        timestamp: epoch_now(),
        sender: record.sender.clone(),
        content: record.content.clone(),
    };
    if let Err(e) = log.append(&entry) {
        warn!(sender = %record.sender, number = record.number, "Failed to log message: {e}");
    }
}

pub(crate) fn register(
    registry: &mut CommandRegistry,
    log: Arc<dyn LogStore>,
    mailer: Option<Arc<dyn Mailer>>,
) {
    let observed = Arc::clone(&log);
    registry.observe(move |record| record_entry(observed.as_ref(), record));

    let marks = Arc::clone(&log);
    registry.register_full("markLog", move |record, outbox| {
        let args = words(&record.content);
        let reply = cmd_mark_log(marks.as_ref(), args.get(1).copied(), epoch_now())?;
        outbox.send(reply);
        Ok(())
    });

    let sender_log = Arc::clone(&log);
    registry.register_full("sendLog", move |record, outbox| {
        let args = words(&record.content);
        let plan = plan_send_log(
            sender_log.as_ref(),
            mailer.as_ref(),
            args.get(1).copied(),
            args.get(2).copied(),
            epoch_now(),
        )?;
        deliver(plan, outbox)
    });

    let viewer = Arc::clone(&log);
    registry.register_full("viewLogs", move |_, outbox| {
        outbox.send(cmd_view_logs(viewer.as_ref())?);
        Ok(())
    });

    registry.register_full("clearLog", move |record, outbox| {
        info!(sender = %record.sender, "Clear log requested");
        outbox.send(cmd_clear_log(log.as_ref())?);
        Ok(())
    });
}
