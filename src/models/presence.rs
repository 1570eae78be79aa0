//! Presence information reported by the admin query API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A client present on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub user: String,
    #[serde(default)]
    pub conn_info: Option<serde_json::Value>,
}

/// Presence map keyed by client id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub presence: BTreeMap<String, ClientInfo>,
}

/// Stored history item for a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPublication {
    pub data: serde_json::Value,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub publications: Vec<HistoryPublication>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelsResponse {
    pub channels: Vec<String>,
}
