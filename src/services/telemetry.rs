//! Publish telemetry: records every server-side publish and serves the dashboard aggregates.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::db::{self, DbPool};
use crate::error::AppResult;
use crate::models::telemetry::{
    ChannelStats, ChannelTimeline, PublishOverview, PublishPage, PublishQuery, PublishRecord,
    PublishStatus,
};

/// Read/write contract of the publish telemetry aggregator.
#[async_trait]
pub trait PublishTelemetry: Send + Sync {
    async fn record(&self, record: PublishRecord) -> AppResult<()>;
    async fn list_publishes(&self, query: &PublishQuery) -> AppResult<PublishPage>;
    async fn overview(&self) -> AppResult<PublishOverview>;
    async fn channel_timeline(&self) -> AppResult<ChannelTimeline>;
}

fn page(publishes: Vec<PublishRecord>, offset: i64, total: i64) -> PublishPage {
    let count = publishes.len() as i64;
    PublishPage {
        publishes,
        count,
        total_available: total,
        has_more: offset + count < total,
    }
}

// ---- PostgreSQL ----

/// Telemetry stored in the `publish_log` table.
#[derive(Clone)]
pub struct PgTelemetryStore {
    pool: DbPool,
}

impl PgTelemetryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PublishTelemetry for PgTelemetryStore {
    #[instrument(skip(self, record), fields(channel = %record.channel, status = record.status.as_str()))]
    async fn record(&self, record: PublishRecord) -> AppResult<()> {
        db::publish_insert(&self.pool, &record).await
    }

    async fn list_publishes(&self, query: &PublishQuery) -> AppResult<PublishPage> {
        let offset = query.offset();
        let (rows, total) = db::publishes_list(
            &self.pool,
            query.channel.as_deref(),
            query.status,
            offset,
            query.count(),
        )
        .await?;
        let publishes = rows.into_iter().map(|r| r.into_record()).collect();
        Ok(page(publishes, offset, total))
    }

    async fn overview(&self) -> AppResult<PublishOverview> {
        db::publish_overview(&self.pool).await
    }

    async fn channel_timeline(&self) -> AppResult<ChannelTimeline> {
        Ok(ChannelTimeline {
            channels: db::publish_channel_stats(&self.pool).await?,
        })
    }
}

// ---- In-memory ----

/// Telemetry kept in process memory; used when no database is configured.
#[derive(Default)]
pub struct MemoryTelemetryStore {
    records: RwLock<Vec<PublishRecord>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn mean(sum: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[async_trait]
impl PublishTelemetry for MemoryTelemetryStore {
    async fn record(&self, record: PublishRecord) -> AppResult<()> {
        debug!(channel = %record.channel, status = record.status.as_str(), "publish recorded");
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_publishes(&self, query: &PublishQuery) -> AppResult<PublishPage> {
        let records = self.records.read().await;
        let mut matching: Vec<&PublishRecord> = records
            .iter()
            .filter(|r| query.channel.as_deref().map_or(true, |c| r.channel == c))
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        let offset = query.offset();
        let publishes = matching
            .into_iter()
            .skip(offset as usize)
            .take(query.count() as usize)
            .cloned()
            .collect();
        Ok(page(publishes, offset, total))
    }

    async fn overview(&self) -> AppResult<PublishOverview> {
        let records = self.records.read().await;
        let n = records.len();
        let count = |s: PublishStatus| records.iter().filter(|r| r.status == s).count() as i64;
        let successful = count(PublishStatus::Success);
        Ok(PublishOverview {
            total: n as i64,
            successful,
            failed: count(PublishStatus::Failed),
            timeout: count(PublishStatus::Timeout),
            success_rate: mean(successful as f64 * 100.0, n),
            avg_duration_ms: mean(records.iter().map(|r| r.duration_ms).sum(), n),
            avg_acks_received: mean(records.iter().map(|r| r.acks_received as f64).sum(), n),
        })
    }

    async fn channel_timeline(&self) -> AppResult<ChannelTimeline> {
        let records = self.records.read().await;
        let mut by_channel: HashMap<&str, Vec<&PublishRecord>> = HashMap::new();
        for r in records.iter() {
            by_channel.entry(r.channel.as_str()).or_default().push(r);
        }
        let mut channels: Vec<ChannelStats> = by_channel
            .into_iter()
            .map(|(channel, rs)| {
                let n = rs.len();
                ChannelStats {
                    channel: channel.to_string(),
                    total: n as i64,
                    successful: rs.iter().filter(|r| r.status == PublishStatus::Success).count()
                        as i64,
                    avg_duration_ms: mean(rs.iter().map(|r| r.duration_ms).sum(), n),
                    avg_acks: mean(rs.iter().map(|r| r.acks_received as f64).sum(), n),
                    last_activity_at: rs.iter().map(|r| r.created_at).max(),
                }
            })
            .collect();
        channels.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(ChannelTimeline { channels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record(channel: &str, status: PublishStatus, acks: i32, ms: f64, age_s: i64) -> PublishRecord {
        PublishRecord {
            id: Uuid::new_v4(),
            message_id: Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            status,
            acks_received: acks,
            duration_ms: ms,
            created_at: Utc::now() - Duration::seconds(age_s),
        }
    }

    async fn seeded() -> MemoryTelemetryStore {
        let store = MemoryTelemetryStore::new();
        store.record(record("a", PublishStatus::Success, 1, 10.0, 30)).await.unwrap();
        store.record(record("a", PublishStatus::Timeout, 0, 5000.0, 20)).await.unwrap();
        store.record(record("b", PublishStatus::Success, 2, 20.0, 10)).await.unwrap();
        store.record(record("b", PublishStatus::Failed, 0, 0.0, 5)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn overview_aggregates() {
        let overview = seeded().await.overview().await.unwrap();
        assert_eq!(overview.total, 4);
        assert_eq!(overview.successful, 2);
        assert_eq!(overview.failed, 1);
        assert_eq!(overview.timeout, 1);
        assert_eq!(overview.success_rate, 50.0);
        assert_eq!(overview.avg_duration_ms, 5030.0 / 4.0);
        assert_eq!(overview.avg_acks_received, 0.75);
    }

    #[tokio::test]
    async fn empty_overview_is_zeroed() {
        let overview = MemoryTelemetryStore::new().overview().await.unwrap();
        assert_eq!(overview, PublishOverview::default());
    }

    #[tokio::test]
    async fn list_filters_and_pages() {
        let store = seeded().await;
        let page = store
            .list_publishes(&PublishQuery {
                channel: Some("a".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.total_available, 2);
        assert!(!page.has_more);
        assert_eq!(page.publishes[0].status, PublishStatus::Timeout);

        let page = store
            .list_publishes(&PublishQuery {
                count: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.total_available, 4);
        assert!(page.has_more);
        assert_eq!(page.publishes[0].status, PublishStatus::Success);
        assert_eq!(page.publishes[0].channel, "b");

        let page = store
            .list_publishes(&PublishQuery {
                status: Some(PublishStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_available, 1);
    }

    #[tokio::test]
    async fn timeline_groups_by_channel_latest_first() {
        let timeline = seeded().await.channel_timeline().await.unwrap();
        assert_eq!(timeline.channels.len(), 2);
        let b = &timeline.channels[0];
        assert_eq!(b.channel, "b");
        assert_eq!(b.total, 2);
        assert_eq!(b.successful, 1);
        assert_eq!(b.avg_acks, 1.0);
        assert_eq!(timeline.channels[1].avg_duration_ms, 2505.0);
    }
}
