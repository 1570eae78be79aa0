//! Event log entries observed on the live connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Connected,
    Disconnected,
    Subscribed,
    Unsubscribed,
    Publication,
    Error,
    Info,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Connected => "connected",
            EventType::Disconnected => "disconnected",
            EventType::Subscribed => "subscribed",
            EventType::Unsubscribed => "unsubscribed",
            EventType::Publication => "publication",
            EventType::Error => "error",
            EventType::Info => "info",
        }
    }
}

/// Immutable record appended to the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Insertion sequence; strictly increasing across the life of the log.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl EventLogEntry {
    /// One export line: `[HH:MM:SS.mmm] TYPE [channel]: message`.
    pub fn export_line(&self) -> String {
        let time = self.timestamp.format("%H:%M:%S%.3f");
        let kind = self.kind.as_str().to_uppercase();
        match &self.channel {
            Some(channel) => format!("[{}] {} [{}]: {}", time, kind, channel, self.message),
            None => format!("[{}] {}: {}", time, kind, self.message),
        }
    }
}

/// Entry under construction; the log assigns `id` and `timestamp` on append.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub kind: EventType,
    pub message: String,
    pub channel: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl NewEvent {
    pub fn new(kind: EventType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            channel: None,
            data: None,
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(channel: Option<&str>) -> EventLogEntry {
        EventLogEntry {
            id: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 3).unwrap()
                + chrono::Duration::milliseconds(42),
            kind: EventType::Publication,
            message: "Message received".to_string(),
            channel: channel.map(String::from),
            data: None,
        }
    }

    #[test]
    fn export_line_with_channel() {
        assert_eq!(
            entry(Some("test:channel")).export_line(),
            "[09:05:03.042] PUBLICATION [test:channel]: Message received"
        );
    }

    #[test]
    fn export_line_without_channel() {
        assert_eq!(
            entry(None).export_line(),
            "[09:05:03.042] PUBLICATION: Message received"
        );
    }

    #[test]
    fn serializes_type_field() {
        let json = serde_json::to_value(entry(None)).unwrap();
        assert_eq!(json["type"], "publication");
        assert!(json.get("channel").is_none());
    }
}
