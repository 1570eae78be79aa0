//! Wire frames exchanged with the real-time broker.

use serde::{Deserialize, Serialize};

/// Frame sent from the harness to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Publish {
        channel: String,
        data: serde_json::Value,
        message_id: String,
        #[serde(default)]
        wait_for_ack: bool,
    },
}

/// Frame received from the broker, classified by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Publication {
        channel: String,
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Ack {
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    Error {
        reason: String,
    },
    /// Anything the harness does not understand; kept verbatim for the log.
    Unknown {
        raw: String,
    },
}

impl InboundFrame {
    /// Classify a raw text frame. Unparseable input becomes [`InboundFrame::Unknown`].
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| InboundFrame::Unknown {
            raw: raw.to_string(),
        })
    }
}

/// Event emitted by a transport after `open()`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Frame(InboundFrame),
    /// Connection ended. `reason` is set when the close was caused by a failure.
    Closed { reason: Option<String> },
}
