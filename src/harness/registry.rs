//! Registry of active channel subscriptions.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::subscription::Subscription;

/// Channel -> subscription map. A channel appears at most once.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subs: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, channel: &str) -> Option<Subscription> {
        self.subs.read().await.get(channel).cloned()
    }

    /// Insert a fresh subscription unless one exists.
    /// Returns the entry and whether it was created by this call.
    pub async fn get_or_insert(&self, channel: &str) -> (Subscription, bool) {
        let mut subs = self.subs.write().await;
        if let Some(existing) = subs.get(channel) {
            return (existing.clone(), false);
        }
        let sub = Subscription::new(channel);
        subs.insert(channel.to_string(), sub.clone());
        (sub, true)
    }

    pub async fn remove(&self, channel: &str) -> Option<Subscription> {
        self.subs.write().await.remove(channel)
    }

    /// Remove everything, returned in subscription order.
    pub async fn drain(&self) -> Vec<Subscription> {
        let mut drained: Vec<Subscription> = self.subs.write().await.drain().map(|(_, s)| s).collect();
        sort(&mut drained);
        drained
    }

    /// Count one publication on `channel`. `None` when the channel is not subscribed.
    pub async fn record_publication(
        &self,
        channel: &str,
        data: serde_json::Value,
    ) -> Option<Subscription> {
        let mut subs = self.subs.write().await;
        let sub = subs.get_mut(channel)?;
        sub.record(data);
        Some(sub.clone())
    }

    /// Subscriptions ordered by subscription time, then channel name.
    pub async fn snapshot(&self) -> Vec<Subscription> {
        let mut all: Vec<Subscription> = self.subs.read().await.values().cloned().collect();
        sort(&mut all);
        all
    }

    pub async fn channels(&self) -> Vec<String> {
        self.snapshot().await.into_iter().map(|s| s.channel).collect()
    }

    pub async fn len(&self) -> usize {
        self.subs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn sort(subs: &mut [Subscription]) {
    subs.sort_by(|a, b| {
        a.subscribed_at
            .cmp(&b.subscribed_at)
            .then_with(|| a.channel.cmp(&b.channel))
    });
}
