//! Correlates publishes that asked for acknowledgment with inbound acks.
//!
//! Resolution is keyed purely by `message_id`. An entry is removed from the
//! map in the same critical section that delivers its outcome, so at most one
//! of {broker ack, manual ack, timeout, abort} ever resolves a given id.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use crate::models::telemetry::PublishStatus;

/// Who or what resolved a pending ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckSource {
    Broker,
    Manual,
    Timeout,
    Aborted,
}

/// Final outcome of a publish that waited for acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AckOutcome {
    pub status: PublishStatus,
    pub acks_received: u32,
    pub client_id: Option<String>,
    pub duration_ms: f64,
    pub source: AckSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

struct PendingAck {
    channel: String,
    client_id: Option<String>,
    started: Instant,
    deadline: Instant,
    tx: oneshot::Sender<AckOutcome>,
}

/// Handle returned by [`AckTracker::register`].
pub struct AckWaiter {
    pub message_id: String,
    pub deadline: Instant,
    pub rx: oneshot::Receiver<AckOutcome>,
}

/// Result of delivering an ack to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum AckResolution {
    Resolved { channel: String, outcome: AckOutcome },
    /// The ack came from a client other than the one the publish expected.
    UnexpectedClient { channel: String, expected: String },
    /// No pending entry: unknown, already resolved, or timed out.
    NotPending,
}

/// Summary of one outstanding ack, for snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct PendingAckInfo {
    pub message_id: String,
    pub channel: String,
    pub client_id: Option<String>,
    pub remaining_ms: u128,
}

#[derive(Default)]
pub struct AckTracker {
    pending: Mutex<HashMap<String, PendingAck>>,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending ack. A second registration for the same id replaces nothing and
    /// returns `None`.
    pub async fn register(
        &self,
        message_id: &str,
        channel: &str,
        client_id: Option<String>,
        timeout: Duration,
    ) -> Option<AckWaiter> {
        let mut pending = self.pending.lock().await;
        if pending.contains_key(message_id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        let deadline = started + timeout;
        pending.insert(
            message_id.to_string(),
            PendingAck {
                channel: channel.to_string(),
                client_id,
                started,
                deadline,
                tx,
            },
        );
        Some(AckWaiter {
            message_id: message_id.to_string(),
            deadline,
            rx,
        })
    }

    /// Deliver an ack for `message_id`.
    pub async fn resolve(
        &self,
        message_id: &str,
        client_id: Option<&str>,
        source: AckSource,
    ) -> AckResolution {
        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.get(message_id) else {
            return AckResolution::NotPending;
        };
        if let (Some(expected), Some(actual)) = (&entry.client_id, client_id) {
            if expected != actual {
                return AckResolution::UnexpectedClient {
                    channel: entry.channel.clone(),
                    expected: expected.clone(),
                };
            }
        }
        let Some(entry) = pending.remove(message_id) else {
            return AckResolution::NotPending;
        };
        let outcome = AckOutcome {
            status: PublishStatus::Success,
            acks_received: 1,
            client_id: client_id.map(String::from).or(entry.client_id),
            duration_ms: elapsed_ms(entry.started),
            source,
            reason: None,
        };
        let _ = entry.tx.send(outcome.clone());
        AckResolution::Resolved {
            channel: entry.channel,
            outcome,
        }
    }

    /// Resolve `message_id` as timed out if it is still pending.
    pub async fn expire(&self, message_id: &str) -> Option<(String, AckOutcome)> {
        let entry = self.pending.lock().await.remove(message_id)?;
        let outcome = AckOutcome {
            status: PublishStatus::Timeout,
            acks_received: 0,
            client_id: entry.client_id,
            duration_ms: elapsed_ms(entry.started),
            source: AckSource::Timeout,
            reason: Some(format!("ack timeout for {}", message_id)),
        };
        let _ = entry.tx.send(outcome.clone());
        Some((entry.channel, outcome))
    }

    /// Drop a registration whose publish was never sent. The waiter sees a failed outcome.
    pub async fn cancel(&self, message_id: &str, reason: &str) {
        if let Some(entry) = self.pending.lock().await.remove(message_id) {
            let _ = entry.tx.send(AckOutcome {
                status: PublishStatus::Failed,
                acks_received: 0,
                client_id: entry.client_id,
                duration_ms: elapsed_ms(entry.started),
                source: AckSource::Aborted,
                reason: Some(reason.to_string()),
            });
        }
    }

    /// Fail every outstanding entry immediately. Returns `(message_id, channel, outcome)` per entry.
    pub async fn abort_all(&self, reason: &str) -> Vec<(String, String, AckOutcome)> {
        let mut pending = self.pending.lock().await;
        let mut aborted: Vec<(String, String, AckOutcome)> = pending
            .drain()
            .map(|(message_id, entry)| {
                let outcome = AckOutcome {
                    status: PublishStatus::Failed,
                    acks_received: 0,
                    client_id: entry.client_id,
                    duration_ms: elapsed_ms(entry.started),
                    source: AckSource::Aborted,
                    reason: Some(reason.to_string()),
                };
                let _ = entry.tx.send(outcome.clone());
                (message_id, entry.channel, outcome)
            })
            .collect();
        aborted.sort_by(|a, b| a.0.cmp(&b.0));
        aborted
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn pending(&self) -> Vec<PendingAckInfo> {
        let now = Instant::now();
        let pending = self.pending.lock().await;
        let mut list: Vec<PendingAckInfo> = pending
            .iter()
            .map(|(id, p)| PendingAckInfo {
                message_id: id.clone(),
                channel: p.channel.clone(),
                client_id: p.client_id.clone(),
                remaining_ms: p.deadline.saturating_duration_since(now).as_millis(),
            })
            .collect();
        list.sort_by(|a, b| a.remaining_ms.cmp(&b.remaining_ms));
        list
    }
}
