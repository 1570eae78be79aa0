//! Publish telemetry: per-publish records and the aggregates the dashboard polls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final status of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Success,
    Failed,
    Timeout,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Success => "success",
            PublishStatus::Failed => "failed",
            PublishStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(PublishStatus::Success),
            "failed" => Some(PublishStatus::Failed),
            "timeout" => Some(PublishStatus::Timeout),
            _ => None,
        }
    }
}

/// One recorded publish attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub id: Uuid,
    pub message_id: String,
    pub channel: String,
    pub status: PublishStatus,
    pub acks_received: i32,
    pub duration_ms: f64,
    pub created_at: DateTime<Utc>,
}

/// Filter and page for `list_publishes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishQuery {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub status: Option<PublishStatus>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

impl PublishQuery {
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn count(&self) -> i64 {
        self.count.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPage {
    pub publishes: Vec<PublishRecord>,
    pub count: i64,
    pub total_available: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishOverview {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub timeout: i64,
    /// Percentage in 0..=100.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub avg_acks_received: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel: String,
    pub total: i64,
    pub successful: i64,
    pub avg_duration_ms: f64,
    pub avg_acks: f64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelTimeline {
    pub channels: Vec<ChannelStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_count_is_clamped() {
        let q = PublishQuery {
            count: Some(1000),
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(q.count(), MAX_PAGE_SIZE);
        assert_eq!(q.offset(), 0);
        assert_eq!(PublishQuery::default().count(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [PublishStatus::Success, PublishStatus::Failed, PublishStatus::Timeout] {
            assert_eq!(PublishStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(PublishStatus::parse("pending"), None);
    }
}
