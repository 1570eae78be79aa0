//! Redis pub/sub transport: the broker is a Redis server shared with other clients.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Transport;
use crate::error::{HarnessError, HarnessResult};
use crate::models::frame::{InboundFrame, OutboundFrame, TransportEvent};
use crate::models::presence::ClientInfo;
use crate::repositories::redis_repo::{ACK_PREFIX, CHANNEL_PREFIX};
use crate::repositories::RedisRepository;

/// Transport over Redis pub/sub. Subscriptions are tracked locally; only
/// publications for subscribed channels are forwarded to the harness.
pub struct RedisTransport {
    repo: Arc<RedisRepository>,
    client_id: String,
    subscribed: Arc<RwLock<HashSet<String>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl RedisTransport {
    pub fn new(repo: Arc<RedisRepository>, client_id: impl Into<String>) -> Self {
        Self {
            repo,
            client_id: client_id.into(),
            subscribed: Arc::new(RwLock::new(HashSet::new())),
            forwarder: Mutex::new(None),
        }
    }

    async fn join(&self, channel: &str) {
        let info = ClientInfo {
            user: self.client_id.clone(),
            conn_info: Some(serde_json::json!({ "transport": "redis", "harness": true })),
        };
        let result = match serde_json::to_string(&info) {
            Ok(data) => self.repo.presence_add(channel, &self.client_id, &data).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(channel = %channel, error = %e, "presence join failed");
        }
    }

    async fn leave(&self, channel: &str) {
        if let Err(e) = self.repo.presence_remove(channel, &self.client_id).await {
            warn!(channel = %channel, error = %e, "presence leave failed");
        }
    }
}

fn transport_err(e: impl std::fmt::Display) -> HarnessError {
    HarnessError::Transport(e.to_string())
}

/// Map a raw Redis message to an inbound frame. `None` when it should be ignored.
pub(crate) fn classify(
    redis_channel: &str,
    payload: &str,
    subscribed: &HashSet<String>,
) -> Option<InboundFrame> {
    if let Some(channel) = redis_channel.strip_prefix(CHANNEL_PREFIX) {
        if !subscribed.contains(channel) {
            return None;
        }
        return Some(match InboundFrame::parse(payload) {
            frame @ InboundFrame::Publication { .. } => frame,
            _ => InboundFrame::Publication {
                channel: channel.to_string(),
                data: serde_json::from_str(payload)
                    .unwrap_or_else(|_| serde_json::Value::String(payload.to_string())),
                message_id: None,
            },
        });
    }
    if let Some(message_id) = redis_channel.strip_prefix(ACK_PREFIX) {
        let client_id = serde_json::from_str::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("client_id").and_then(|c| c.as_str()).map(String::from));
        return Some(InboundFrame::Ack {
            message_id: message_id.to_string(),
            client_id,
        });
    }
    Some(InboundFrame::Unknown {
        raw: payload.to_string(),
    })
}

/// Classify raw messages into frames until the stream ends. The task owns the
/// stream, so aborting it releases the pub/sub connection.
pub(crate) fn spawn_forwarder<S>(
    mut raw: S,
    subscribed: Arc<RwLock<HashSet<String>>>,
    tx: mpsc::UnboundedSender<TransportEvent>,
) -> JoinHandle<()>
where
    S: Stream<Item = (String, String)> + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        while let Some((redis_channel, payload)) = raw.next().await {
            let frame = {
                let subs = subscribed.read().await;
                classify(&redis_channel, &payload, &subs)
            };
            if let Some(frame) = frame {
                if tx.send(TransportEvent::Frame(frame)).is_err() {
                    return;
                }
            }
        }
        warn!("redis pub/sub stream closed");
        let _ = tx.send(TransportEvent::Closed {
            reason: Some("redis pub/sub stream closed".to_string()),
        });
    })
}

#[async_trait]
impl Transport for RedisTransport {
    async fn open(&self) -> HarnessResult<mpsc::UnboundedReceiver<TransportEvent>> {
        self.close().await;
        let raw = self.repo.subscribe_all().await.map_err(transport_err)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_forwarder(raw, self.subscribed.clone(), tx);
        *self.forwarder.lock().await = Some(handle);
        info!("redis transport opened");
        Ok(rx)
    }

    async fn send(&self, frame: OutboundFrame) -> HarnessResult<()> {
        if self.forwarder.lock().await.is_none() {
            return Err(HarnessError::Transport("redis transport is closed".to_string()));
        }
        match frame {
            OutboundFrame::Subscribe { channel } => {
                self.join(&channel).await;
                self.subscribed.write().await.insert(channel);
            }
            OutboundFrame::Unsubscribe { channel } => {
                self.subscribed.write().await.remove(&channel);
                self.leave(&channel).await;
            }
            OutboundFrame::Publish {
                channel,
                data,
                message_id,
                ..
            } => {
                let payload = serde_json::to_string(&InboundFrame::Publication {
                    channel: channel.clone(),
                    data,
                    message_id: Some(message_id),
                })
                .map_err(transport_err)?;
                let receivers = self
                    .repo
                    .publish(&channel, &payload)
                    .await
                    .map_err(transport_err)?;
                debug!(channel = %channel, receivers, "frame published");
            }
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(handle) = self.forwarder.lock().await.take() {
            handle.abort();
            debug!("redis transport closed");
        }
        let channels: Vec<String> = self.subscribed.write().await.drain().collect();
        for channel in channels {
            self.leave(&channel).await;
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subs(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classify_ignores_unsubscribed_channels() {
        let frame = classify("livewire:channel:other", "{}", &subs(&["test:channel"]));
        assert!(frame.is_none());
    }

    #[test]
    fn classify_wraps_plain_payloads() {
        let frame = classify(
            "livewire:channel:test:channel",
            r#"{"hello":"world"}"#,
            &subs(&["test:channel"]),
        );
        assert_eq!(
            frame,
            Some(InboundFrame::Publication {
                channel: "test:channel".into(),
                data: json!({ "hello": "world" }),
                message_id: None,
            })
        );
        let frame = classify("livewire:channel:test:channel", "plain", &subs(&["test:channel"]));
        assert!(matches!(
            frame,
            Some(InboundFrame::Publication { data: serde_json::Value::String(_), .. })
        ));
    }

    #[test]
    fn classify_keeps_harness_frames() {
        let payload = json!({
            "type": "publication",
            "channel": "test:channel",
            "data": { "type": "test" },
            "message_id": "m-9"
        })
        .to_string();
        let frame = classify("livewire:channel:test:channel", &payload, &subs(&["test:channel"]));
        assert!(matches!(
            frame,
            Some(InboundFrame::Publication { message_id: Some(ref id), .. }) if id == "m-9"
        ));
    }

    #[test]
    fn classify_ack_keys() {
        let frame = classify("livewire:ack:m-1", r#"{"client_id":"c-7"}"#, &HashSet::new());
        assert_eq!(
            frame,
            Some(InboundFrame::Ack {
                message_id: "m-1".into(),
                client_id: Some("c-7".into()),
            })
        );
    }

    #[tokio::test]
    async fn forwarder_passes_subscribed_frames_then_reports_close() {
        let raw = futures::stream::iter(vec![
            ("livewire:channel:other".to_string(), "{}".to_string()),
            ("livewire:channel:news".to_string(), r#"{"n":1}"#.to_string()),
            ("livewire:ack:m-1".to_string(), r#"{"client_id":"c"}"#.to_string()),
        ]);
        let subscribed = Arc::new(RwLock::new(subs(&["news"])));
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_forwarder(raw, subscribed, tx).await.unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Frame(InboundFrame::Publication { ref channel, .. })) if channel == "news"
        ));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Frame(InboundFrame::Ack { .. }))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Closed { reason: Some(_) })
        ));
    }

    #[tokio::test]
    async fn aborting_forwarder_releases_idle_stream() {
        // The guard lives inside the stream; its drop stands in for the connection closing.
        let (guard, released) = tokio::sync::oneshot::channel::<()>();
        let idle = futures::stream::pending::<(String, String)>().map(move |item| {
            let _held = &guard;
            item
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn_forwarder(idle, Arc::new(RwLock::new(HashSet::new())), tx);
        handle.abort();
        let released = tokio::time::timeout(std::time::Duration::from_secs(1), released).await;
        assert!(matches!(released, Ok(Err(_))));
    }
}
