//! Admin queries against the broker: channel history, presence, and channel listing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::AppResult;
use crate::models::channel::channel_matches;
use crate::models::frame::InboundFrame;
use crate::models::presence::{
    ChannelsResponse, ClientInfo, HistoryPublication, HistoryResponse, PresenceResponse,
};
use crate::repositories::RedisRepository;

#[async_trait]
pub trait AdminQuery: Send + Sync {
    async fn channel_history(&self, channel: &str) -> AppResult<HistoryResponse>;
    async fn presence(&self, channel: &str) -> AppResult<PresenceResponse>;
    async fn list_channels(&self, pattern: Option<&str>) -> AppResult<ChannelsResponse>;
}

/// Admin queries served from the Redis history lists and presence hashes.
#[derive(Clone)]
pub struct RedisAdmin {
    repo: Arc<RedisRepository>,
}

impl RedisAdmin {
    pub fn new(repo: Arc<RedisRepository>) -> Self {
        Self { repo }
    }
}

/// Decode one stored history item; foreign payloads are kept as raw data.
pub(crate) fn decode_history(raw: &str) -> HistoryPublication {
    match InboundFrame::parse(raw) {
        InboundFrame::Publication {
            data, message_id, ..
        } => HistoryPublication { data, message_id },
        _ => HistoryPublication {
            data: serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
            message_id: None,
        },
    }
}

/// Members whose stored JSON does not decode are skipped.
pub(crate) fn decode_presence(raw: impl IntoIterator<Item = (String, String)>) -> PresenceResponse {
    let presence: BTreeMap<String, ClientInfo> = raw
        .into_iter()
        .filter_map(|(client_id, data)| {
            serde_json::from_str::<ClientInfo>(&data)
                .ok()
                .map(|info| (client_id, info))
        })
        .collect();
    PresenceResponse { presence }
}

#[async_trait]
impl AdminQuery for RedisAdmin {
    async fn channel_history(&self, channel: &str) -> AppResult<HistoryResponse> {
        let raw = self.repo.history(channel).await?;
        debug!(channel = %channel, items = raw.len(), "history loaded");
        Ok(HistoryResponse {
            publications: raw.iter().map(|r| decode_history(r)).collect(),
        })
    }

    async fn presence(&self, channel: &str) -> AppResult<PresenceResponse> {
        let raw = self.repo.presence_members(channel).await?;
        Ok(decode_presence(raw))
    }

    async fn list_channels(&self, pattern: Option<&str>) -> AppResult<ChannelsResponse> {
        let channels = self
            .repo
            .channels_with_history()
            .await?
            .into_iter()
            .filter(|c| pattern.map_or(true, |p| channel_matches(p, c)))
            .collect();
        Ok(ChannelsResponse { channels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_history_unwraps_harness_frames() {
        let raw = json!({
            "type": "publication",
            "channel": "a",
            "data": { "type": "test" },
            "message_id": "m-1"
        })
        .to_string();
        let item = decode_history(&raw);
        assert_eq!(item.data, json!({ "type": "test" }));
        assert_eq!(item.message_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn decode_history_keeps_foreign_payloads() {
        assert_eq!(decode_history("hello").data, json!("hello"));
        assert_eq!(decode_history(r#"{"x":1}"#).data, json!({ "x": 1 }));
    }

    #[test]
    fn decode_presence_skips_bad_members() {
        let resp = decode_presence(vec![
            ("c1".to_string(), r#"{"user":"alice"}"#.to_string()),
            ("c2".to_string(), "garbage".to_string()),
        ]);
        assert_eq!(resp.presence.len(), 1);
        assert_eq!(resp.presence["c1"].user, "alice");
    }
}
