//! Live pub/sub test harness: one logical connection, its subscriptions,
//! pending acknowledgments, and the event log the dashboard observes.

pub mod acks;
pub mod event_log;
pub mod registry;
pub mod scenarios;

pub use acks::{AckOutcome, AckResolution, AckSource, AckTracker, PendingAckInfo};
pub use event_log::EventLog;
pub use registry::SubscriptionRegistry;
pub use scenarios::{Scenario, ScenarioInfo, ScenarioReport, SCENARIOS};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{HarnessError, HarnessResult};
use crate::models::channel::validate_channel;
use crate::models::event::{EventLogEntry, EventType, NewEvent};
use crate::models::frame::{InboundFrame, OutboundFrame, TransportEvent};
use crate::models::subscription::Subscription;
use crate::transport::Transport;

/// State of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tunables for ack waits and scenario runs.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub default_ack_timeout: Duration,
    pub min_ack_timeout: Duration,
    pub max_ack_timeout: Duration,
    /// How long a scenario waits for its publication to come back.
    pub scenario_observe_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            default_ack_timeout: Duration::from_secs(5),
            min_ack_timeout: Duration::from_secs(1),
            max_ack_timeout: Duration::from_secs(60),
            scenario_observe_timeout: Duration::from_secs(2),
        }
    }
}

impl HarnessConfig {
    /// Requested timeout (or the default), clamped to the configured bounds.
    pub fn ack_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_ack_timeout)
            .clamp(self.min_ack_timeout, self.max_ack_timeout)
    }
}

/// Options for [`LiveHarness::publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub wait_for_ack: bool,
    pub ack_timeout: Option<Duration>,
    /// Subscriber expected to ack; acks from other clients are logged and ignored.
    pub client_id: Option<String>,
}

impl PublishOptions {
    pub fn with_ack(timeout: Option<Duration>) -> Self {
        Self {
            wait_for_ack: true,
            ack_timeout: timeout,
            client_id: None,
        }
    }
}

/// Result of a publish. `ack` is set only when acknowledgment was requested.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    pub message_id: String,
    pub channel: String,
    pub ack: Option<AckOutcome>,
}

/// Read-only view of the harness state.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessSnapshot {
    pub transport: &'static str,
    pub state: ConnectionState,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub connection_time_ms: Option<i64>,
    pub total_messages_received: u64,
    pub subscriptions: Vec<Subscription>,
    pub pending_acks: Vec<PendingAckInfo>,
}

struct Connection {
    state: ConnectionState,
    connected_at: Option<DateTime<Utc>>,
    total_messages_received: u64,
    /// Bumped on every connect and disconnect; frames from older sessions are ignored.
    session: u64,
    pump: Option<JoinHandle<()>>,
}

struct HarnessInner {
    transport: Arc<dyn Transport>,
    config: HarnessConfig,
    events: EventLog,
    subscriptions: SubscriptionRegistry,
    acks: AckTracker,
    conn: Mutex<Connection>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Handle to the harness. Clones share the same connection.
#[derive(Clone)]
pub struct LiveHarness {
    inner: Arc<HarnessInner>,
}

impl LiveHarness {
    pub fn new(transport: Arc<dyn Transport>, config: HarnessConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(HarnessInner {
                transport,
                config,
                events: EventLog::new(),
                subscriptions: SubscriptionRegistry::new(),
                acks: AckTracker::new(),
                conn: Mutex::new(Connection {
                    state: ConnectionState::Disconnected,
                    connected_at: None,
                    total_messages_received: 0,
                    session: 0,
                    pump: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.inner.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    // ---- Connection ----

    /// Open the connection. A no-op returning the current state when already
    /// connecting or connected.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> HarnessResult<ConnectionState> {
        let session = {
            let mut conn = self.inner.conn.lock().await;
            if conn.state != ConnectionState::Disconnected {
                return Ok(conn.state);
            }
            conn.state = ConnectionState::Connecting;
            conn.session += 1;
            self.inner.state_tx.send_replace(ConnectionState::Connecting);
            conn.session
        };
        info!(session, "connecting");

        let rx = match self.inner.transport.open().await {
            Ok(rx) => rx,
            Err(e) => {
                {
                    let mut conn = self.inner.conn.lock().await;
                    if conn.session == session {
                        conn.state = ConnectionState::Disconnected;
                        self.inner
                            .state_tx
                            .send_replace(ConnectionState::Disconnected);
                    }
                }
                return self.fail(None, e).await;
            }
        };

        {
            let mut conn = self.inner.conn.lock().await;
            if conn.session != session || conn.state != ConnectionState::Connecting {
                drop(conn);
                self.inner.transport.close().await;
                return self
                    .fail(
                        None,
                        HarnessError::Transport("connection attempt was cancelled".to_string()),
                    )
                    .await;
            }
            conn.state = ConnectionState::Connected;
            conn.connected_at = Some(Utc::now());
            conn.total_messages_received = 0;
            conn.pump = Some(tokio::spawn(run_pump(
                Arc::downgrade(&self.inner),
                session,
                rx,
            )));
            self.inner.state_tx.send_replace(ConnectionState::Connected);
            // Appended under the connection lock so no frame is logged before it.
            self.inner
                .events
                .append(NewEvent::new(
                    EventType::Connected,
                    format!("Connected via {}", self.transport_name()),
                ))
                .await;
        }
        info!(session, "connected");

        self.resubscribe().await;
        Ok(ConnectionState::Connected)
    }

    /// Re-issue every registered channel on a fresh connection.
    async fn resubscribe(&self) {
        let channels = self.inner.subscriptions.channels().await;
        if channels.is_empty() {
            return;
        }
        let mut restored = 0usize;
        for channel in &channels {
            let frame = OutboundFrame::Subscribe {
                channel: channel.clone(),
            };
            match self.inner.transport.send(frame).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    let _ = self.fail::<()>(Some(channel), e).await;
                }
            }
        }
        self.log(NewEvent::new(
            EventType::Info,
            format!("resubscribed {} channel(s)", restored),
        ))
        .await;
    }

    /// Close the connection. A no-op when already disconnected. Every pending
    /// ack is resolved as failed before this returns.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let pump = {
            let mut conn = self.inner.conn.lock().await;
            if conn.state == ConnectionState::Disconnected {
                return;
            }
            conn.state = ConnectionState::Disconnected;
            conn.connected_at = None;
            conn.session += 1;
            self.inner
                .state_tx
                .send_replace(ConnectionState::Disconnected);
            conn.pump.take()
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        self.abort_pending_acks().await;
        self.inner.transport.close().await;
        self.log(NewEvent::new(EventType::Disconnected, "Disconnected"))
            .await;
        info!("disconnected");
    }

    /// Wait until an in-flight connect settles. Errors unless it ends Connected.
    pub async fn wait_connected(&self, timeout: Duration) -> HarnessResult<()> {
        let mut rx = self.inner.state_tx.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| *s != ConnectionState::Connecting),
        )
        .await;
        match settled {
            Ok(Ok(state)) if *state == ConnectionState::Connected => Ok(()),
            _ => Err(HarnessError::not_connected("wait for connection")),
        }
    }

    async fn abort_pending_acks(&self) {
        for (message_id, channel, _) in self.inner.acks.abort_all("connection closed").await {
            self.log(
                NewEvent::new(
                    EventType::Error,
                    format!("ack aborted for {}: connection closed", message_id),
                )
                .channel(channel),
            )
            .await;
        }
    }

    async fn require_connected(&self, operation: &str) -> HarnessResult<()> {
        if self.state().await == ConnectionState::Connected {
            Ok(())
        } else {
            Err(HarnessError::not_connected(operation))
        }
    }

    // ---- Inbound ----

    async fn handle_frame(&self, session: u64, frame: InboundFrame) {
        let mut conn = self.inner.conn.lock().await;
        if conn.session != session || conn.state != ConnectionState::Connected {
            return;
        }
        conn.total_messages_received += 1;
        // Dispatched under the connection lock so a snapshot never sees the
        // frame counted without its registry and ack effects.
        match frame {
            InboundFrame::Publication { channel, data, .. } => {
                match self
                    .inner
                    .subscriptions
                    .record_publication(&channel, data.clone())
                    .await
                {
                    Some(_) => {
                        self.log(
                            NewEvent::new(EventType::Publication, "Message received")
                                .channel(channel)
                                .data(data),
                        )
                        .await;
                    }
                    None => {
                        self.log(
                            NewEvent::new(
                                EventType::Info,
                                format!("publication on unsubscribed channel {}", channel),
                            )
                            .channel(channel)
                            .data(data),
                        )
                        .await;
                    }
                }
            }
            InboundFrame::Ack {
                message_id,
                client_id,
            } => {
                self.deliver_ack(&message_id, client_id.as_deref(), AckSource::Broker)
                    .await;
            }
            InboundFrame::Error { reason } => {
                warn!(reason = %reason, "protocol error from broker");
                self.log(NewEvent::new(
                    EventType::Error,
                    format!("protocol error: {}", reason),
                ))
                .await;
            }
            InboundFrame::Unknown { raw } => {
                self.log(NewEvent::new(
                    EventType::Info,
                    format!("unrecognized frame: {}", raw),
                ))
                .await;
            }
        }
        drop(conn);
    }

    async fn handle_closed(&self, session: u64, reason: Option<String>) {
        {
            let mut conn = self.inner.conn.lock().await;
            if conn.session != session || conn.state != ConnectionState::Connected {
                return;
            }
            conn.state = ConnectionState::Disconnected;
            conn.connected_at = None;
            conn.session += 1;
            // We are running inside the pump; dropping the handle detaches it.
            conn.pump = None;
            self.inner
                .state_tx
                .send_replace(ConnectionState::Disconnected);
        }
        self.abort_pending_acks().await;
        self.inner.transport.close().await;
        match reason {
            Some(reason) => {
                warn!(reason = %reason, "transport closed with error");
                self.log(NewEvent::new(
                    EventType::Error,
                    HarnessError::Transport(reason).to_string(),
                ))
                .await;
            }
            None => {
                info!("transport closed by broker");
                self.log(NewEvent::new(
                    EventType::Disconnected,
                    "Disconnected by broker",
                ))
                .await;
            }
        }
    }

    // ---- Subscriptions ----

    /// Subscribe to `channel`. Returns the existing entry unchanged when already subscribed.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, channel: &str) -> HarnessResult<Subscription> {
        if let Err(e) = validate_channel(channel) {
            return self.fail(Some(channel), e).await;
        }
        if let Some(existing) = self.inner.subscriptions.get(channel).await {
            debug!(channel = %channel, "already subscribed");
            return Ok(existing);
        }
        if let Err(e) = self.require_connected("subscribe").await {
            return self.fail(Some(channel), e).await;
        }

        let (sub, created) = self.inner.subscriptions.get_or_insert(channel).await;
        if !created {
            return Ok(sub);
        }
        let frame = OutboundFrame::Subscribe {
            channel: channel.to_string(),
        };
        if let Err(e) = self.inner.transport.send(frame).await {
            self.inner.subscriptions.remove(channel).await;
            return self.fail(Some(channel), e).await;
        }
        self.log(
            NewEvent::new(EventType::Subscribed, format!("Subscribed to {}", channel))
                .channel(channel),
        )
        .await;
        info!(channel = %channel, "subscribed");
        Ok(sub)
    }

    /// Remove `channel`. Returns false (and logs nothing) when it was not subscribed.
    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, channel: &str) -> bool {
        match self.inner.subscriptions.remove(channel).await {
            Some(sub) => {
                self.release(sub).await;
                true
            }
            None => false,
        }
    }

    /// Remove every subscription, one `unsubscribed` entry per channel.
    #[instrument(skip(self))]
    pub async fn unsubscribe_all(&self) -> usize {
        let drained = self.inner.subscriptions.drain().await;
        let count = drained.len();
        for sub in drained {
            self.release(sub).await;
        }
        count
    }

    async fn release(&self, sub: Subscription) {
        if self.state().await == ConnectionState::Connected {
            let frame = OutboundFrame::Unsubscribe {
                channel: sub.channel.clone(),
            };
            if let Err(e) = self.inner.transport.send(frame).await {
                let _ = self.fail::<()>(Some(&sub.channel), e).await;
            }
        }
        self.log(
            NewEvent::new(
                EventType::Unsubscribed,
                format!(
                    "Unsubscribed from {} after {} message(s)",
                    sub.channel, sub.message_count
                ),
            )
            .channel(sub.channel.clone()),
        )
        .await;
        info!(channel = %sub.channel, "unsubscribed");
    }

    // ---- Publish / ack ----

    /// Publish `data` to `channel`. With `wait_for_ack` this suspends until an
    /// ack arrives, `send_ack` is called, the timeout fires, or the connection closes.
    /// A timeout is a resolved receipt with a `timeout` outcome, not an error.
    #[instrument(skip(self, data, opts), fields(wait_for_ack = opts.wait_for_ack))]
    pub async fn publish(
        &self,
        channel: &str,
        data: serde_json::Value,
        opts: PublishOptions,
    ) -> HarnessResult<PublishReceipt> {
        if let Err(e) = validate_channel(channel) {
            return self.fail(Some(channel), e).await;
        }
        if let Err(e) = self.require_connected("publish").await {
            return self.fail(Some(channel), e).await;
        }

        let message_id = Uuid::new_v4().to_string();
        // Registered before sending so an immediate ack finds its entry.
        let waiter = if opts.wait_for_ack {
            let timeout = self.inner.config.ack_timeout(opts.ack_timeout);
            self.inner
                .acks
                .register(&message_id, channel, opts.client_id.clone(), timeout)
                .await
        } else {
            None
        };

        let frame = OutboundFrame::Publish {
            channel: channel.to_string(),
            data,
            message_id: message_id.clone(),
            wait_for_ack: opts.wait_for_ack,
        };
        if let Err(e) = self.inner.transport.send(frame).await {
            if waiter.is_some() {
                self.inner.acks.cancel(&message_id, &e.to_string()).await;
            }
            return self.fail(Some(channel), e).await;
        }
        info!(channel = %channel, message_id = %message_id, "published");

        let ack = match waiter {
            Some(waiter) => Some(self.await_ack(waiter).await),
            None => None,
        };
        Ok(PublishReceipt {
            message_id,
            channel: channel.to_string(),
            ack,
        })
    }

    async fn await_ack(&self, waiter: acks::AckWaiter) -> AckOutcome {
        let acks::AckWaiter {
            message_id,
            deadline,
            mut rx,
        } = waiter;
        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => dropped_outcome(),
            Err(_) => match self.inner.acks.expire(&message_id).await {
                Some((channel, outcome)) => {
                    warn!(message_id = %message_id, "ack timeout");
                    self.log(
                        NewEvent::new(
                            EventType::Error,
                            HarnessError::AckTimeout {
                                message_id: message_id.clone(),
                            }
                            .to_string(),
                        )
                        .channel(channel),
                    )
                    .await;
                    outcome
                }
                // Resolved between the deadline and the expiry attempt.
                None => rx.await.unwrap_or_else(|_| dropped_outcome()),
            },
        }
    }

    /// Acknowledge `message_id` manually as `client_id`. Returns whether a
    /// pending publish was resolved; late or duplicate acks are only logged.
    #[instrument(skip(self))]
    pub async fn send_ack(&self, message_id: &str, client_id: &str) -> bool {
        self.deliver_ack(message_id, Some(client_id), AckSource::Manual)
            .await
    }

    async fn deliver_ack(&self, message_id: &str, client_id: Option<&str>, source: AckSource) -> bool {
        match self.inner.acks.resolve(message_id, client_id, source).await {
            AckResolution::Resolved { channel, outcome } => {
                let from = outcome.client_id.as_deref().unwrap_or("unknown client");
                let message = format!(
                    "ack received for {} from {} in {:.1} ms",
                    message_id, from, outcome.duration_ms
                );
                let data = serde_json::json!({
                    "message_id": message_id,
                    "client_id": outcome.client_id,
                    "duration_ms": outcome.duration_ms,
                    "source": outcome.source,
                });
                info!(message_id = %message_id, duration_ms = outcome.duration_ms, "ack resolved");
                self.log(NewEvent::new(EventType::Info, message).channel(channel).data(data))
                    .await;
                true
            }
            AckResolution::UnexpectedClient { channel, expected } => {
                self.log(
                    NewEvent::new(
                        EventType::Info,
                        format!(
                            "ignored ack for {} from {} (expected {})",
                            message_id,
                            client_id.unwrap_or("unknown client"),
                            expected
                        ),
                    )
                    .channel(channel),
                )
                .await;
                false
            }
            AckResolution::NotPending => {
                debug!(message_id = %message_id, "ack for message that is not pending");
                self.log(NewEvent::new(
                    EventType::Info,
                    format!("ignored ack for {}: not pending", message_id),
                ))
                .await;
                false
            }
        }
    }

    // ---- Event log ----

    pub async fn events(&self) -> Vec<EventLogEntry> {
        self.inner.events.entries().await
    }

    pub async fn clear_events(&self) {
        self.inner.events.clear().await;
    }

    pub async fn export_events(&self) -> String {
        self.inner.events.export_text().await
    }

    /// Live feed of appended entries.
    pub fn watch_events(&self) -> broadcast::Receiver<EventLogEntry> {
        self.inner.events.watch()
    }

    pub(crate) fn event_log(&self) -> &EventLog {
        &self.inner.events
    }

    async fn log(&self, event: NewEvent) -> EventLogEntry {
        self.inner.events.append(event).await
    }

    /// Record `err` as an `error` entry and return it.
    async fn fail<T>(&self, channel: Option<&str>, err: HarnessError) -> HarnessResult<T> {
        warn!(error = %err, "harness operation failed");
        let mut event = NewEvent::new(EventType::Error, err.to_string());
        if let Some(channel) = channel {
            event = event.channel(channel);
        }
        self.log(event).await;
        Err(err)
    }

    // ---- State accessors ----

    pub async fn state(&self) -> ConnectionState {
        self.inner.conn.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.inner.conn.lock().await.connected_at
    }

    pub async fn total_messages_received(&self) -> u64 {
        self.inner.conn.lock().await.total_messages_received
    }

    pub async fn subscription(&self, channel: &str) -> Option<Subscription> {
        self.inner.subscriptions.get(channel).await
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.subscriptions.snapshot().await
    }

    pub async fn pending_acks(&self) -> Vec<PendingAckInfo> {
        self.inner.acks.pending().await
    }

    pub async fn snapshot(&self) -> HarnessSnapshot {
        let conn = self.inner.conn.lock().await;
        let (state, connected_at, total) =
            (conn.state, conn.connected_at, conn.total_messages_received);
        let subscriptions = self.inner.subscriptions.snapshot().await;
        let pending_acks = self.inner.acks.pending().await;
        drop(conn);
        HarnessSnapshot {
            transport: self.transport_name(),
            state,
            is_connected: state == ConnectionState::Connected,
            is_connecting: state == ConnectionState::Connecting,
            connected_at,
            connection_time_ms: connected_at.map(|t| (Utc::now() - t).num_milliseconds()),
            total_messages_received: total,
            subscriptions,
            pending_acks,
        }
    }
}

fn dropped_outcome() -> AckOutcome {
    AckOutcome {
        status: crate::models::telemetry::PublishStatus::Failed,
        acks_received: 0,
        client_id: None,
        duration_ms: 0.0,
        source: AckSource::Aborted,
        reason: Some("ack tracker dropped the request".to_string()),
    }
}

/// Drain transport events for one session into the harness.
async fn run_pump(
    harness: Weak<HarnessInner>,
    session: u64,
    mut rx: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = harness.upgrade() else {
            return;
        };
        let harness = LiveHarness { inner };
        match event {
            TransportEvent::Frame(frame) => harness.handle_frame(session, frame).await,
            TransportEvent::Closed { reason } => {
                harness.handle_closed(session, reason).await;
                return;
            }
        }
    }
    if let Some(inner) = harness.upgrade() {
        LiveHarness { inner }
            .handle_closed(session, Some("transport stream ended".to_string()))
            .await;
    }
}
