//! Repositories: publish_log rows and their aggregates.

use crate::error::AppResult;
use crate::models::telemetry::{ChannelStats, PublishOverview, PublishRecord, PublishStatus};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;

// ---- Publish log ----

#[derive(Debug, FromRow)]
pub struct PublishRow {
    pub id: Uuid,
    pub message_id: String,
    pub channel: String,
    pub status: String,
    pub acks_received: i32,
    pub duration_ms: f64,
    pub created_at: DateTime<Utc>,
}

impl PublishRow {
    /// Rows with an unrecognized status are reported as failed.
    pub fn into_record(self) -> PublishRecord {
        PublishRecord {
            id: self.id,
            message_id: self.message_id,
            channel: self.channel,
            status: PublishStatus::parse(&self.status).unwrap_or(PublishStatus::Failed),
            acks_received: self.acks_received,
            duration_ms: self.duration_ms,
            created_at: self.created_at,
        }
    }
}

pub async fn publish_insert(pool: &DbPool, record: &PublishRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO publish_log (id, message_id, channel, status, acks_received, duration_ms, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id)
    .bind(&record.message_id)
    .bind(&record.channel)
    .bind(record.status.as_str())
    .bind(record.acks_received)
    .bind(record.duration_ms)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Page of publishes, newest first, plus the number of rows matching the filter.
pub async fn publishes_list(
    pool: &DbPool,
    channel: Option<&str>,
    status: Option<PublishStatus>,
    offset: i64,
    count: i64,
) -> AppResult<(Vec<PublishRow>, i64)> {
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query_as::<_, PublishRow>(
        r#"
        SELECT id, message_id, channel, status, acks_received, duration_ms, created_at
        FROM publish_log
        WHERE ($1::text IS NULL OR channel = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(channel)
    .bind(status)
    .bind(offset)
    .bind(count)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)::bigint
        FROM publish_log
        WHERE ($1::text IS NULL OR channel = $1)
          AND ($2::text IS NULL OR status = $2)
        "#,
    )
    .bind(channel)
    .bind(status)
    .fetch_one(pool)
    .await?;
    Ok((rows, total.0))
}

#[derive(Debug, FromRow)]
struct OverviewRow {
    total: i64,
    successful: i64,
    failed: i64,
    timeout: i64,
    avg_duration_ms: Option<f64>,
    avg_acks_received: Option<f64>,
}

pub async fn publish_overview(pool: &DbPool) -> AppResult<PublishOverview> {
    let row = sqlx::query_as::<_, OverviewRow>(
        r#"
        SELECT
            COUNT(*)::bigint AS total,
            COUNT(*) FILTER (WHERE status = 'success')::bigint AS successful,
            COUNT(*) FILTER (WHERE status = 'failed')::bigint AS failed,
            COUNT(*) FILTER (WHERE status = 'timeout')::bigint AS timeout,
            AVG(duration_ms)::float8 AS avg_duration_ms,
            AVG(acks_received)::float8 AS avg_acks_received
        FROM publish_log
        "#,
    )
    .fetch_one(pool)
    .await?;
    let success_rate = if row.total > 0 {
        row.successful as f64 * 100.0 / row.total as f64
    } else {
        0.0
    };
    Ok(PublishOverview {
        total: row.total,
        successful: row.successful,
        failed: row.failed,
        timeout: row.timeout,
        success_rate,
        avg_duration_ms: row.avg_duration_ms.unwrap_or(0.0),
        avg_acks_received: row.avg_acks_received.unwrap_or(0.0),
    })
}

#[derive(Debug, FromRow)]
struct ChannelStatsRow {
    channel: String,
    total: i64,
    successful: i64,
    avg_duration_ms: Option<f64>,
    avg_acks: Option<f64>,
    last_activity_at: Option<DateTime<Utc>>,
}

pub async fn publish_channel_stats(pool: &DbPool) -> AppResult<Vec<ChannelStats>> {
    let rows = sqlx::query_as::<_, ChannelStatsRow>(
        r#"
        SELECT
            channel,
            COUNT(*)::bigint AS total,
            COUNT(*) FILTER (WHERE status = 'success')::bigint AS successful,
            AVG(duration_ms)::float8 AS avg_duration_ms,
            AVG(acks_received)::float8 AS avg_acks,
            MAX(created_at) AS last_activity_at
        FROM publish_log
        GROUP BY channel
        ORDER BY MAX(created_at) DESC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| ChannelStats {
            channel: r.channel,
            total: r.total,
            successful: r.successful,
            avg_duration_ms: r.avg_duration_ms.unwrap_or(0.0),
            avg_acks: r.avg_acks.unwrap_or(0.0),
            last_activity_at: r.last_activity_at,
        })
        .collect())
}
