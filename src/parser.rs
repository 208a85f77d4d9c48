use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static NEW_MSGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pfc\.handleResponse\('getnewmsg',\s*'ok',\s*(.*)\);")
        .expect("new-message pattern is a valid regex")
});

/// Number of advisory fields the server appends to every message row.
const TRAILING_FIELDS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageRecord {
    pub(crate) number: u64,
    pub(crate) date: String,
    pub(crate) time: String,
    pub(crate) sender: String,
    pub(crate) room: String,
    pub(crate) msg_type: String,
    pub(crate) content: String,
}

/// Extract every message row embedded in a poll or send response.
/// Lines that don't carry a `getnewmsg` payload are ignored, as are payloads
/// that don't decode as a list of rows.
pub(crate) fn parse_response(body: &str) -> Vec<MessageRecord> {
    let mut records = Vec::new();
    for line in body.lines() {
        let Some(caps) = NEW_MSGS_RE.captures(line) else {
            continue;
        };
        let payload = &caps[1];
        let rows: Vec<Vec<Value>> = match serde_json::from_str(payload) {
            Ok(rows) => rows,
            Err(e) => {
                debug!("Skipping undecodable getnewmsg payload: {e}");
                continue;
            }
        };
        records.extend(rows.iter().filter_map(|row| record_from_row(row)));
    }
    records
}

fn record_from_row(row: &[Value]) -> Option<MessageRecord> {
    let kept = row.len().checked_sub(TRAILING_FIELDS)?;
    let [number, date, time, sender, room, msg_type, content] = &row[..kept] else {
        debug!(fields = row.len(), "Skipping message row with unexpected shape");
        return None;
    };
    Some(MessageRecord {
        number: sequence_number(number)?,
        date: scalar_text(date)?,
        time: scalar_text(time)?,
        sender: scalar_text(sender)?,
        room: scalar_text(room)?,
        msg_type: scalar_text(msg_type)?,
        content: unescape(&scalar_text(content)?),
    })
}

fn sequence_number(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

pub(crate) fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
