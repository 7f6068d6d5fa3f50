// ── Telemetry events ──
//
// Typed view of one stream frame. A frame may carry several kinds of
// payload at once; each present key becomes one event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use teslemetry_api::StreamMessage;
use tracing::debug;

/// Alert or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoticeKind {
    Alert,
    Error,
}

impl NoticeKind {
    /// Key holding the entry's timestamp.
    fn timestamp_key(self) -> &'static str {
        match self {
            Self::Alert => "startedAt",
            Self::Error => "createdAt",
        }
    }
}

/// One alert or error entry with a parsed timestamp (epoch millis).
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub name: String,
    pub timestamp: i64,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Alerts(Vec<Notice>),
    Errors(Vec<Notice>),
    /// Field name -> value.
    Data(Map<String, Value>),
    State(String),
    /// Full nested vehicle document, same shape as a poll.
    VehicleData(Value),
    Config(Value),
}

impl TelemetryEvent {
    /// Split a stream frame into events. Unknown keys are ignored.
    pub fn parse(message: &StreamMessage) -> Vec<Self> {
        let payload = &message.payload;
        let mut events = Vec::new();

        if let Some(entries) = payload.get("alerts").and_then(Value::as_array) {
            events.push(Self::Alerts(parse_notices(entries, NoticeKind::Alert)));
        }
        if let Some(entries) = payload.get("errors").and_then(Value::as_array) {
            events.push(Self::Errors(parse_notices(entries, NoticeKind::Error)));
        }
        if let Some(Value::Object(fields)) = payload.get("data") {
            events.push(Self::Data(fields.clone()));
        }
        if let Some(state) = payload.get("state").and_then(Value::as_str) {
            events.push(Self::State(state.to_owned()));
        }
        if let Some(data) = payload.get("vehicle_data").filter(|v| v.is_object()) {
            events.push(Self::VehicleData(data.clone()));
        }
        if let Some(config) = payload.get("config").filter(|v| !v.is_null()) {
            events.push(Self::Config(config.clone()));
        }

        events
    }
}

fn parse_notices(entries: &[Value], kind: NoticeKind) -> Vec<Notice> {
    entries
        .iter()
        .filter_map(|entry| {
            let Some(timestamp) = entry.get(kind.timestamp_key()).and_then(parse_timestamp) else {
                debug!(%kind, "stream entry without a usable timestamp, skipping");
                return None;
            };
            Some(Notice {
                name: entry
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                timestamp,
                body: entry.clone(),
            })
        })
        .collect()
}

/// Epoch millis from a number or an RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).timestamp_millis()),
        _ => None,
    }
}

/// Entries strictly newer than `watermark`, newest first.
///
/// Scanning newest-first stops at the first entry at or below the
/// watermark, so a batch that is already partly delivered only yields
/// its new head.
pub fn fresh_notices(mut notices: Vec<Notice>, watermark: i64) -> Vec<Notice> {
    notices.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    notices
        .into_iter()
        .take_while(|n| n.timestamp > watermark)
        .collect()
}
