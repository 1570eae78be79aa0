//! In-process broker: echoes publishes back to subscribed channels.
//!
//! Used by tests and for running the harness without external infrastructure.
//! Failure injection hooks let callers exercise the error paths.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

use super::Transport;
use crate::error::{HarnessError, HarnessResult};
use crate::models::frame::{InboundFrame, OutboundFrame, TransportEvent};

#[derive(Default)]
struct LoopbackState {
    sender: Option<mpsc::UnboundedSender<TransportEvent>>,
    subscribed: HashSet<String>,
    auto_ack: Option<String>,
    refuse_open: Option<String>,
    fail_sends: Option<String>,
    sent: Vec<OutboundFrame>,
    opens: usize,
}

/// Loopback transport. Clones share the same broker state.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledge every `wait_for_ack` publish as `client_id`.
    pub fn with_auto_ack(self, client_id: impl Into<String>) -> Self {
        self.lock().auto_ack = Some(client_id.into());
        self
    }

    pub fn set_auto_ack(&self, client_id: Option<String>) {
        self.lock().auto_ack = client_id;
    }

    /// Make subsequent `open()` calls fail with `reason` (`None` restores).
    pub fn refuse_open(&self, reason: Option<String>) {
        self.lock().refuse_open = reason;
    }

    /// Make subsequent `send()` calls fail with `reason` (`None` restores).
    pub fn fail_sends(&self, reason: Option<String>) {
        self.lock().fail_sends = reason;
    }

    /// Deliver a frame as if it came from the broker. Returns false when not open.
    pub fn inject(&self, frame: InboundFrame) -> bool {
        let state = self.lock();
        match &state.sender {
            Some(tx) => tx.send(TransportEvent::Frame(frame)).is_ok(),
            None => false,
        }
    }

    /// Close the connection from the broker side.
    pub fn drop_connection(&self, reason: Option<String>) {
        let mut state = self.lock();
        if let Some(tx) = state.sender.take() {
            let _ = tx.send(TransportEvent::Closed { reason });
        }
        state.subscribed.clear();
    }

    pub fn is_open(&self) -> bool {
        self.lock().sender.is_some()
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    /// Every frame accepted by `send()` so far.
    pub fn sent_frames(&self) -> Vec<OutboundFrame> {
        self.lock().sent.clone()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.lock().subscribed.contains(channel)
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&self) -> HarnessResult<mpsc::UnboundedReceiver<TransportEvent>> {
        let mut state = self.lock();
        if let Some(reason) = &state.refuse_open {
            return Err(HarnessError::Transport(reason.clone()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.sender = Some(tx);
        state.subscribed.clear();
        state.opens += 1;
        debug!(opens = state.opens, "loopback opened");
        Ok(rx)
    }

    async fn send(&self, frame: OutboundFrame) -> HarnessResult<()> {
        let mut state = self.lock();
        if let Some(reason) = &state.fail_sends {
            return Err(HarnessError::Transport(reason.clone()));
        }
        let tx = state
            .sender
            .clone()
            .ok_or_else(|| HarnessError::Transport("loopback is closed".to_string()))?;
        state.sent.push(frame.clone());

        match frame {
            OutboundFrame::Subscribe { channel } => {
                state.subscribed.insert(channel);
            }
            OutboundFrame::Unsubscribe { channel } => {
                state.subscribed.remove(&channel);
            }
            OutboundFrame::Publish {
                channel,
                data,
                message_id,
                wait_for_ack,
            } => {
                if state.subscribed.contains(&channel) {
                    let _ = tx.send(TransportEvent::Frame(InboundFrame::Publication {
                        channel,
                        data,
                        message_id: Some(message_id.clone()),
                    }));
                }
                if wait_for_ack {
                    if let Some(client_id) = state.auto_ack.clone() {
                        let _ = tx.send(TransportEvent::Frame(InboundFrame::Ack {
                            message_id,
                            client_id: Some(client_id),
                        }));
                    }
                }
            }
        }
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.lock();
        state.sender = None;
        state.subscribed.clear();
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echoes_only_subscribed_channels() {
        let transport = LoopbackTransport::new();
        let mut rx = transport.open().await.unwrap();
        transport
            .send(OutboundFrame::Publish {
                channel: "a".into(),
                data: json!(1),
                message_id: "m1".into(),
                wait_for_ack: false,
            })
            .await
            .unwrap();
        transport
            .send(OutboundFrame::Subscribe { channel: "b".into() })
            .await
            .unwrap();
        transport
            .send(OutboundFrame::Publish {
                channel: "b".into(),
                data: json!(2),
                message_id: "m2".into(),
                wait_for_ack: false,
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::Frame(InboundFrame::Publication {
                channel: "b".into(),
                data: json!(2),
                message_id: Some("m2".into()),
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn auto_ack_follows_publication() {
        let transport = LoopbackTransport::new().with_auto_ack("client-1");
        let mut rx = transport.open().await.unwrap();
        transport
            .send(OutboundFrame::Publish {
                channel: "a".into(),
                data: json!({}),
                message_id: "m1".into(),
                wait_for_ack: true,
            })
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            TransportEvent::Frame(InboundFrame::Ack {
                message_id: "m1".into(),
                client_id: Some("client-1".into()),
            })
        );
    }

    #[tokio::test]
    async fn refused_open_and_closed_send_fail() {
        let transport = LoopbackTransport::new();
        transport.refuse_open(Some("connection refused".into()));
        assert_eq!(
            transport.open().await.unwrap_err(),
            HarnessError::Transport("connection refused".into())
        );
        let err = transport
            .send(OutboundFrame::Subscribe { channel: "a".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Transport(_)));
    }

    #[tokio::test]
    async fn drop_connection_reports_reason() {
        let transport = LoopbackTransport::new();
        let mut rx = transport.open().await.unwrap();
        transport.drop_connection(Some("reset by peer".into()));
        assert_eq!(
            rx.recv().await.unwrap(),
            TransportEvent::Closed {
                reason: Some("reset by peer".into())
            }
        );
        assert!(!transport.is_open());
    }
}
