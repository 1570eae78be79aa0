//! Canned one-click sequences: connect, subscribe, publish, observe.

use serde::Serialize;
use serde_json::json;
use std::future::Future;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};

use super::{AckOutcome, ConnectionState, LiveHarness, PublishOptions, PublishReceipt};
use crate::error::{HarnessError, HarnessResult, ScenarioStep};
use crate::models::event::{EventLogEntry, EventType, NewEvent};

/// Static scenario descriptor plus the payload it publishes.
pub struct Scenario {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub channel: &'static str,
    pub color: &'static str,
    pub wait_for_ack: bool,
    pub payload: fn() -> serde_json::Value,
}

/// Serializable view of a [`Scenario`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub channel: &'static str,
    pub color: &'static str,
    pub wait_for_ack: bool,
}

impl Scenario {
    pub fn info(&self) -> ScenarioInfo {
        ScenarioInfo {
            id: self.id,
            name: self.name,
            description: self.description,
            channel: self.channel,
            color: self.color,
            wait_for_ack: self.wait_for_ack,
        }
    }
}

fn basic_echo_payload() -> serde_json::Value {
    json!({ "type": "test" })
}

fn ack_roundtrip_payload() -> serde_json::Value {
    json!({ "type": "ack_test", "requires_ack": true })
}

fn notification_payload() -> serde_json::Value {
    json!({
        "type": "notification",
        "title": "Test notification",
        "message": "Sent from the live testing harness",
        "level": "info"
    })
}

fn broadcast_payload() -> serde_json::Value {
    json!({ "type": "broadcast", "message": "Hello everyone" })
}

pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        id: "basic-echo",
        name: "Basic echo",
        description: "Subscribe to a test channel and publish a message back to it",
        channel: "test:channel",
        color: "blue",
        wait_for_ack: false,
        payload: basic_echo_payload,
    },
    Scenario {
        id: "ack-roundtrip",
        name: "ACK round trip",
        description: "Publish and wait for a subscriber acknowledgment",
        channel: "test:ack",
        color: "green",
        wait_for_ack: true,
        payload: ack_roundtrip_payload,
    },
    Scenario {
        id: "notification",
        name: "Notification",
        description: "Deliver a user-facing notification payload",
        channel: "notifications:demo",
        color: "purple",
        wait_for_ack: false,
        payload: notification_payload,
    },
    Scenario {
        id: "broadcast",
        name: "Broadcast",
        description: "Publish to the channel every client listens on",
        channel: "broadcast:all",
        color: "orange",
        wait_for_ack: false,
        payload: broadcast_payload,
    },
];

pub fn find(id: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.id == id)
}

/// What a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: ScenarioInfo,
    pub message_id: String,
    pub ack: Option<AckOutcome>,
    /// Whether the published message came back on the channel in time.
    pub observed: bool,
    /// Log entries appended during the run.
    pub events: Vec<EventLogEntry>,
}

impl LiveHarness {
    pub fn scenarios(&self) -> Vec<ScenarioInfo> {
        SCENARIOS.iter().map(Scenario::info).collect()
    }

    /// Run the scenario registered under `id`. Side effects of completed steps
    /// are kept when a later step fails.
    pub async fn run_scenario(&self, id: &str) -> HarnessResult<ScenarioReport> {
        self.run_scenario_with(id, |channel, data, opts| self.publish(channel, data, opts))
            .await
    }

    /// Like [`LiveHarness::run_scenario`], with the publish step performed by
    /// `publish` so callers can record it.
    #[instrument(skip(self, publish))]
    pub async fn run_scenario_with<F, Fut>(
        &self,
        id: &str,
        publish: F,
    ) -> HarnessResult<ScenarioReport>
    where
        F: FnOnce(&'static str, serde_json::Value, PublishOptions) -> Fut,
        Fut: Future<Output = HarnessResult<PublishReceipt>>,
    {
        let Some(scenario) = find(id) else {
            return self
                .fail(None, HarnessError::UnknownScenario(id.to_string()))
                .await;
        };
        let first_event = self.event_log().next_id().await;
        info!(scenario = id, channel = scenario.channel, "running scenario");

        if let Err(e) = self.ensure_connected().await {
            return self.scenario_failed(scenario, ScenarioStep::Connect, e).await;
        }
        if let Err(e) = self.subscribe(scenario.channel).await {
            return self.scenario_failed(scenario, ScenarioStep::Subscribe, e).await;
        }

        let mut feed = self.watch_events();
        let opts = PublishOptions {
            wait_for_ack: scenario.wait_for_ack,
            ..Default::default()
        };
        let receipt = match publish(scenario.channel, (scenario.payload)(), opts).await {
            Ok(receipt) => receipt,
            Err(e) => return self.scenario_failed(scenario, ScenarioStep::Publish, e).await,
        };

        let window = self.config().scenario_observe_timeout;
        let observed = tokio::time::timeout(window, async {
            loop {
                match feed.recv().await {
                    Ok(entry)
                        if entry.kind == EventType::Publication
                            && entry.channel.as_deref() == Some(scenario.channel) =>
                    {
                        return true;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);

        if !observed {
            self.event_log()
                .append(
                    NewEvent::new(
                        EventType::Info,
                        format!(
                            "no publication observed on {} within {} ms",
                            scenario.channel,
                            window.as_millis()
                        ),
                    )
                    .channel(scenario.channel),
                )
                .await;
        }

        Ok(ScenarioReport {
            scenario: scenario.info(),
            message_id: receipt.message_id,
            ack: receipt.ack,
            observed,
            events: self.event_log().since(first_event).await,
        })
    }

    async fn ensure_connected(&self) -> HarnessResult<()> {
        match self.connect().await? {
            ConnectionState::Connected => Ok(()),
            _ => self.wait_connected(self.config().max_ack_timeout).await,
        }
    }

    async fn scenario_failed<T>(
        &self,
        scenario: &Scenario,
        step: ScenarioStep,
        source: HarnessError,
    ) -> HarnessResult<T> {
        warn!(scenario = scenario.id, %step, error = %source, "scenario failed");
        let err = HarnessError::Scenario {
            scenario: scenario.id.to_string(),
            step,
            source: Box::new(source),
        };
        // The failing step already logged its own error entry.
        self.event_log()
            .append(NewEvent::new(EventType::Info, err.to_string()).channel(scenario.channel))
            .await;
        Err(err)
    }
}
