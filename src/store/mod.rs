//! Event store — the durable source of truth for undelivered events
//!
//! All backends implement `EventStore` to provide a uniform API for event
//! persistence, subscription CRUD, and undelivered-state queries. An event
//! is *undelivered* iff it is present in the store; presence, not a flag,
//! is the ground truth. Events leave the store only through a delivery
//! confirmation (`clear_events`) or an explicit administrative delete.

use crate::error::Result;
use crate::types::{Event, EventType, StoreStats, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;

pub use memory::MemoryStore;

/// Core trait for event-store backends
///
/// Any backing store must support range scans on timestamp within a user
/// partition; key-value backends emulate with a composite
/// `(user_id, timestamp, event_id)` index.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event keyed by `(user_id, event_id)`
    ///
    /// Idempotent: storing an event whose `(user_id, event_id)` pair
    /// already exists is a no-op success. The pair is the store identity —
    /// pub/sub redelivery of the same user's event dedupes, while fan-out
    /// copies of one `event_id` to different users all persist. Fails with
    /// `StorageUnavailable` on backing-store I/O error.
    async fn store_event(&self, event: &Event) -> Result<()>;

    /// Fetch one event for a user by id
    async fn get_event(&self, user_id: &str, event_id: &str) -> Result<Option<Event>>;

    /// Events currently in the store, optionally filtered
    ///
    /// Ordering: ascending by `timestamp`, ties broken by `event_id` lex
    /// order. `limit = None` means all, paged internally.
    async fn get_undelivered_events(
        &self,
        user_id: Option<&str>,
        event_type: Option<EventType>,
        limit: Option<usize>,
    ) -> Result<Vec<Event>>;

    /// Remove every event for `user_id` with `timestamp ≤ before`
    ///
    /// Returns the count cleared. Atomic with respect to concurrent
    /// `store_event` for the same user: an event with a strictly greater
    /// timestamp is never removed by this call.
    async fn clear_events(&self, user_id: &str, before: DateTime<Utc>) -> Result<u64>;

    /// Remove exactly one event for a user by id; returns whether it
    /// existed
    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool>;

    /// Distinct users with at least one undelivered event
    async fn user_ids_with_events(&self) -> Result<Vec<String>>;

    /// All subscriptions, optionally filtered by user. Set semantics —
    /// callers must not rely on ordering.
    async fn list_subscriptions(&self, user_id: Option<&str>) -> Result<Vec<Subscription>>;

    /// Fetch one subscription by id
    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>>;

    /// Create or replace a subscription keyed by `subscription_id`
    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Remove a subscription; deleting a missing id is a no-op success
    /// (returns whether it existed)
    async fn delete_subscription(&self, subscription_id: &str) -> Result<bool>;

    /// Aggregate undelivered-state counts, derived by scan
    async fn stats(&self) -> Result<StoreStats>;
}
