//! Server-side publish: drive a harness publish and record its outcome in telemetry.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, HarnessResult};
use crate::harness::{LiveHarness, PublishOptions, PublishReceipt, ScenarioReport};
use crate::models::telemetry::{PublishRecord, PublishStatus};
use crate::services::telemetry::PublishTelemetry;

/// Publishes through the live harness and records every attempt.
#[derive(Clone)]
pub struct PublishService {
    harness: LiveHarness,
    telemetry: Arc<dyn PublishTelemetry>,
}

impl PublishService {
    pub fn new(harness: LiveHarness, telemetry: Arc<dyn PublishTelemetry>) -> Self {
        Self { harness, telemetry }
    }

    /// Publish and record. Errors from the harness are returned after the
    /// failed attempt has been recorded.
    pub async fn publish(
        &self,
        channel: &str,
        data: serde_json::Value,
        opts: PublishOptions,
    ) -> AppResult<PublishReceipt> {
        self.publish_recorded(channel, data, opts)
            .await
            .map_err(AppError::from)
    }

    /// Run a scenario; its publish step is recorded like any other publish.
    #[instrument(skip(self))]
    pub async fn run_scenario(&self, id: &str) -> AppResult<ScenarioReport> {
        self.harness
            .run_scenario_with(id, |channel, data, opts| {
                self.publish_recorded(channel, data, opts)
            })
            .await
            .map_err(AppError::from)
    }

    async fn publish_recorded(
        &self,
        channel: &str,
        data: serde_json::Value,
        opts: PublishOptions,
    ) -> HarnessResult<PublishReceipt> {
        let started = Instant::now();
        let result = self.harness.publish(channel, data, opts).await;
        let record = match &result {
            Ok(receipt) => record_for(receipt, started),
            Err(_) => PublishRecord {
                id: Uuid::new_v4(),
                message_id: String::new(),
                channel: channel.to_string(),
                status: PublishStatus::Failed,
                acks_received: 0,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                created_at: Utc::now(),
            },
        };
        let status = record.status;
        if let Err(e) = self.telemetry.record(record).await {
            // Telemetry is best effort; the publish itself already happened.
            warn!(channel = %channel, error = %e, "failed to record publish");
        }
        info!(channel = %channel, status = status.as_str(), "publish recorded");
        result
    }
}

fn record_for(receipt: &PublishReceipt, started: Instant) -> PublishRecord {
    let (status, acks_received, duration_ms) = match &receipt.ack {
        Some(ack) => (ack.status, ack.acks_received as i32, ack.duration_ms),
        None => (
            PublishStatus::Success,
            0,
            started.elapsed().as_secs_f64() * 1000.0,
        ),
    };
    PublishRecord {
        id: Uuid::new_v4(),
        message_id: receipt.message_id.clone(),
        channel: receipt.channel.clone(),
        status,
        acks_received,
        duration_ms,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HarnessConfig;
    use crate::models::telemetry::PublishQuery;
    use crate::services::telemetry::MemoryTelemetryStore;
    use crate::transport::LoopbackTransport;
    use serde_json::json;
    use std::time::Duration;

    fn service(transport: &LoopbackTransport) -> (PublishService, LiveHarness, Arc<MemoryTelemetryStore>) {
        let harness = LiveHarness::new(Arc::new(transport.clone()), HarnessConfig::default());
        let store = Arc::new(MemoryTelemetryStore::new());
        (PublishService::new(harness.clone(), store.clone()), harness, store)
    }

    #[tokio::test]
    async fn records_acknowledged_publish() {
        let transport = LoopbackTransport::new().with_auto_ack("c1");
        let (svc, harness, store) = service(&transport);
        harness.connect().await.unwrap();
        let receipt = svc
            .publish("a", json!({}), PublishOptions::with_ack(None))
            .await
            .unwrap();
        let page = store.list_publishes(&PublishQuery::default()).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.publishes[0].message_id, receipt.message_id);
        assert_eq!(page.publishes[0].status, PublishStatus::Success);
        assert_eq!(page.publishes[0].acks_received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn records_timeout() {
        let transport = LoopbackTransport::new();
        let (svc, harness, store) = service(&transport);
        harness.connect().await.unwrap();
        svc.publish("a", json!({}), PublishOptions::with_ack(Some(Duration::from_secs(1))))
            .await
            .unwrap();
        let overview = store.overview().await.unwrap();
        assert_eq!(overview.timeout, 1);
        assert_eq!(overview.success_rate, 0.0);
    }

    #[tokio::test]
    async fn records_failed_attempt_and_returns_error() {
        let transport = LoopbackTransport::new();
        let (svc, _harness, store) = service(&transport);
        let err = svc
            .publish("a", json!({}), PublishOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Harness(_)));
        assert_eq!(store.overview().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn scenario_publish_is_recorded() {
        let transport = LoopbackTransport::new();
        let (svc, _harness, store) = service(&transport);
        let report = svc.run_scenario("basic-echo").await.unwrap();
        let page = store.list_publishes(&PublishQuery::default()).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.publishes[0].message_id, report.message_id);
        assert_eq!(page.publishes[0].channel, "test:channel");
        assert_eq!(page.publishes[0].status, PublishStatus::Success);
    }

    #[tokio::test]
    async fn scenario_that_fails_before_publishing_records_nothing() {
        let transport = LoopbackTransport::new();
        transport.refuse_open(Some("refused".into()));
        let (svc, _harness, store) = service(&transport);
        assert!(svc.run_scenario("basic-echo").await.is_err());
        assert_eq!(store.overview().await.unwrap().total, 0);
    }
}
