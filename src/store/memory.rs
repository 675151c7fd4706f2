//! In-memory event store for single-process use and testing
//!
//! Emulates the composite `(user_id, timestamp, event_id)` index of a real
//! backend with a `BTreeMap`, so undelivered-event queries and timestamp-
//! bounded clears are genuine range scans. All mutation happens under one
//! write lock, which makes `clear_events` atomic with respect to
//! interleaved `store_event` calls for the same user.

use crate::error::Result;
use crate::store::EventStore;
use crate::types::{Event, EventType, StoreStats, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;

/// Internal scan chunk size, mirroring the paging a real backend would do
const SCAN_PAGE: usize = 500;

#[derive(Default)]
struct Inner {
    /// Primary collection keyed by (user_id, event_id) — fan-out copies
    /// of one event_id to different users are distinct records
    events: HashMap<(String, String), Event>,

    /// Composite index: (user_id, timestamp, event_id) → event_id
    by_user: BTreeMap<(String, DateTime<Utc>, String), String>,

    /// Subscriptions keyed by subscription_id
    subscriptions: HashMap<String, Subscription>,
}

impl Inner {
    /// Index keys for `user_id` with `timestamp ≤ before`, ascending
    fn user_range_keys(
        &self,
        user_id: &str,
        before: DateTime<Utc>,
    ) -> Vec<(String, DateTime<Utc>, String)> {
        let start = Bound::Included((user_id.to_string(), DateTime::<Utc>::MIN_UTC, String::new()));
        self.by_user
            .range((start, Bound::Unbounded))
            .take_while(|((uid, ts, _), _)| uid == user_id && *ts <= before)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// In-memory `EventStore` implementation
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn store_event(&self, event: &Event) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Idempotent per (user_id, event_id): redelivery dedupes, fan-out
        // copies for other users still persist
        let key = (event.user_id.clone(), event.event_id.clone());
        if inner.events.contains_key(&key) {
            tracing::debug!(
                event_id = %event.event_id,
                user = %event.user_id,
                "Duplicate event, store is a no-op"
            );
            return Ok(());
        }

        inner.by_user.insert(
            (
                event.user_id.clone(),
                event.timestamp,
                event.event_id.clone(),
            ),
            event.event_id.clone(),
        );
        inner.events.insert(key, event.clone());

        tracing::debug!(
            event_id = %event.event_id,
            user = %event.user_id,
            event_type = %event.event_type,
            "Event stored"
        );
        Ok(())
    }

    async fn get_event(&self, user_id: &str, event_id: &str) -> Result<Option<Event>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .get(&(user_id.to_string(), event_id.to_string()))
            .cloned())
    }

    async fn get_undelivered_events(
        &self,
        user_id: Option<&str>,
        event_type: Option<EventType>,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.read().await;
        let max = limit.unwrap_or(usize::MAX);
        let mut events = Vec::new();

        match user_id {
            Some(uid) => {
                let start =
                    Bound::Included((uid.to_string(), DateTime::<Utc>::MIN_UTC, String::new()));
                for chunk in inner
                    .by_user
                    .range((start, Bound::Unbounded))
                    .take_while(|((u, _, _), _)| u == uid)
                    .collect::<Vec<_>>()
                    .chunks(SCAN_PAGE)
                {
                    for (_, id) in chunk {
                        let Some(event) = inner.events.get(&(uid.to_string(), (*id).clone()))
                        else {
                            continue;
                        };
                        if event_type.is_some_and(|t| t != event.event_type) {
                            continue;
                        }
                        events.push(event.clone());
                        if events.len() >= max {
                            return Ok(events);
                        }
                    }
                }
            }
            None => {
                // Cross-user query: gather then impose the global ordering
                let mut all: Vec<&Event> = inner
                    .events
                    .values()
                    .filter(|e| event_type.map_or(true, |t| t == e.event_type))
                    .collect();
                all.sort_by(|a, b| {
                    a.timestamp
                        .cmp(&b.timestamp)
                        .then_with(|| a.event_id.cmp(&b.event_id))
                });
                events = all.into_iter().take(max).cloned().collect();
            }
        }

        Ok(events)
    }

    async fn clear_events(&self, user_id: &str, before: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;

        let keys = inner.user_range_keys(user_id, before);
        let cleared = keys.len() as u64;
        for key in keys {
            if let Some(id) = inner.by_user.remove(&key) {
                inner.events.remove(&(user_id.to_string(), id));
            }
        }

        tracing::debug!(
            user = user_id,
            before = %before,
            cleared,
            "Cleared delivered events"
        );
        Ok(cleared)
    }

    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;

        let Some(event) = inner
            .events
            .remove(&(user_id.to_string(), event_id.to_string()))
        else {
            return Ok(false);
        };
        inner.by_user.remove(&(
            event.user_id.clone(),
            event.timestamp,
            event.event_id.clone(),
        ));
        Ok(true)
    }

    async fn user_ids_with_events(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut users: Vec<String> = inner
            .by_user
            .keys()
            .map(|(uid, _, _)| uid.clone())
            .collect();
        users.dedup();
        Ok(users)
    }

    async fn list_subscriptions(&self, user_id: Option<&str>) -> Result<Vec<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| user_id.map_or(true, |u| s.user_id == u))
            .cloned()
            .collect())
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner.subscriptions.get(subscription_id).cloned())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .subscriptions
            .insert(subscription.subscription_id.clone(), subscription.clone());
        Ok(())
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.subscriptions.remove(subscription_id).is_some())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().await;
        let mut stats = StoreStats::default();

        for event in inner.events.values() {
            stats.total_events += 1;
            *stats.per_user.entry(event.user_id.clone()).or_insert(0) += 1;
            *stats
                .per_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats.users = stats.per_user.len() as u64;

        Ok(stats)
    }
}
