//! Append-only event log with a broadcast feed for observers.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::event::{EventLogEntry, NewEvent};

const WATCH_CAPACITY: usize = 256;

struct LogInner {
    entries: Vec<EventLogEntry>,
    next_id: u64,
}

/// Ordered record of everything observable on the connection.
///
/// Entry ids are assigned under the write lock, so id order is insertion order
/// even when several entries share a timestamp.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<LogInner>>,
    watchers: broadcast::Sender<EventLogEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (watchers, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(LogInner {
                entries: Vec::new(),
                next_id: 1,
            })),
            watchers,
        }
    }

    pub async fn append(&self, event: NewEvent) -> EventLogEntry {
        let mut log = self.inner.write().await;
        let entry = EventLogEntry {
            id: log.next_id,
            timestamp: Utc::now(),
            kind: event.kind,
            message: event.message,
            channel: event.channel,
            data: event.data,
        };
        log.next_id += 1;
        log.entries.push(entry.clone());
        // No watchers is fine.
        let _ = self.watchers.send(entry.clone());
        debug!(id = entry.id, kind = entry.kind.as_str(), message = %entry.message, "event");
        entry
    }

    pub async fn entries(&self) -> Vec<EventLogEntry> {
        self.inner.read().await.entries.clone()
    }

    /// Entries with `id >= first_id`, in log order.
    pub async fn since(&self, first_id: u64) -> Vec<EventLogEntry> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .filter(|e| e.id >= first_id)
            .cloned()
            .collect()
    }

    /// Id the next appended entry will get.
    pub async fn next_id(&self) -> u64 {
        self.inner.read().await.next_id
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry. Ids keep increasing afterwards.
    pub async fn clear(&self) {
        self.inner.write().await.entries.clear();
    }

    /// Text export, one `[time] TYPE [channel]: message` line per entry.
    pub async fn export_text(&self) -> String {
        let log = self.inner.read().await;
        let mut out = String::new();
        for entry in &log.entries {
            out.push_str(&entry.export_line());
            out.push('\n');
        }
        out
    }

    /// Receive every entry appended from now on.
    pub fn watch(&self) -> broadcast::Receiver<EventLogEntry> {
        self.watchers.subscribe()
    }
}
