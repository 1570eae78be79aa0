//! Redis connection and pub/sub for channel messaging, acks, history and presence storage.

use crate::error::AppError;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use futures::stream::{BoxStream, StreamExt};

pub const CHANNEL_PREFIX: &str = "livewire:channel:";
pub const ACK_PREFIX: &str = "livewire:ack:";
const HISTORY_PREFIX: &str = "livewire:history:";
const PRESENCE_PREFIX: &str = "livewire:presence:";

/// Publications kept per channel history list.
pub const HISTORY_LIMIT: isize = 100;

fn channel_key(channel: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, channel)
}

fn history_key(channel: &str) -> String {
    format!("{}{}", HISTORY_PREFIX, channel)
}

fn presence_key(channel: &str) -> String {
    format!("{}{}", PRESENCE_PREFIX, channel)
}

/// Redis-backed repository: pub/sub for publications and acks, lists for history, hashes for presence.
#[derive(Clone)]
pub struct RedisRepository {
    client: Arc<redis::Client>,
}

impl RedisRepository {
    /// Create repository from Redis URL.
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get a multiplexed connection for commands (publish, lists, hashes).
    pub async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Publish a frame to a channel and append it to the channel's capped history.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<u64, AppError> {
        let mut conn = self.connection().await?;
        let count: u64 = conn.publish(channel_key(channel), payload).await?;
        let history = history_key(channel);
        conn.lpush::<_, _, ()>(&history, payload).await?;
        conn.ltrim::<_, ()>(&history, 0, HISTORY_LIMIT - 1).await?;
        debug!(channel = %channel, count, "published");
        Ok(count)
    }

    /// Pattern-subscribe to every channel and ack key.
    ///
    /// Yields `(redis_channel, payload)` pairs. The stream owns the pub/sub
    /// connection; dropping it unsubscribes.
    pub async fn subscribe_all(&self) -> Result<BoxStream<'static, (String, String)>, AppError> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.psubscribe(format!("{}*", CHANNEL_PREFIX)).await?;
        pubsub.psubscribe(format!("{}*", ACK_PREFIX)).await?;
        info!("pattern-subscribed to redis channels and acks");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let name = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => Some((name, payload)),
                Err(e) => {
                    warn!(channel = %name, error = %e, "non-text payload dropped");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    /// Most recent history entries for a channel, newest first.
    pub async fn history(&self, channel: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.connection().await?;
        let items: Vec<String> = conn.lrange(history_key(channel), 0, HISTORY_LIMIT - 1).await?;
        Ok(items)
    }

    /// Channels that have recorded history.
    pub async fn channels_with_history(&self) -> Result<Vec<String>, AppError> {
        let mut conn = self.connection().await?;
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<String> =
                conn.scan_match(format!("{}*", HISTORY_PREFIX)).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        let mut channels: Vec<String> = keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(HISTORY_PREFIX).map(String::from))
            .collect();
        channels.sort();
        channels.dedup();
        Ok(channels)
    }

    // --- Presence: client_id -> client info JSON in a hash per channel ---

    /// Add a presence member to a channel.
    pub async fn presence_add(
        &self,
        channel: &str,
        client_id: &str,
        member_data: &str,
    ) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(presence_key(channel), client_id, member_data)
            .await?;
        Ok(())
    }

    /// Remove a presence member.
    pub async fn presence_remove(&self, channel: &str, client_id: &str) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        conn.hdel::<_, _, ()>(presence_key(channel), client_id).await?;
        Ok(())
    }

    /// Get all presence members for a channel (client_id -> member_data).
    pub async fn presence_members(&self, channel: &str) -> Result<HashMap<String, String>, AppError> {
        let mut conn = self.connection().await?;
        let map: HashMap<String, String> = conn.hgetall(presence_key(channel)).await?;
        Ok(map)
    }
}
