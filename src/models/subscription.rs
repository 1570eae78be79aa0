//! Channel subscription state held by the harness registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One active subscription, keyed by channel in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: String,
    pub message_count: u64,
    pub last_message: Option<serde_json::Value>,
    pub subscribed_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message_count: 0,
            last_message: None,
            subscribed_at: Utc::now(),
        }
    }

    /// Record one inbound publication.
    pub fn record(&mut self, data: serde_json::Value) {
        self.message_count += 1;
        self.last_message = Some(data);
    }
}
