//! Poison queue — capture inbound messages that must not be redelivered
//!
//! Malformed payloads and permanently-rejected gateway sends are captured
//! here and then acked, so the broker never redelivers known-bad input.
//! The queue is an application-level concern above the source layer; the
//! management API exposes it read-only for inspection.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Stored excerpt cap; whole payloads are not worth keeping
const PAYLOAD_EXCERPT_LEN: usize = 2048;

/// A captured poison message with context about why it was rejected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonEntry {
    /// Lossy UTF-8 excerpt of the raw payload
    pub payload: String,

    /// Why the message was poisoned
    pub reason: String,

    /// When the message was captured
    pub poisoned_at: DateTime<Utc>,
}

/// Trait for poison queue handlers
#[async_trait]
pub trait PoisonQueue: Send + Sync {
    /// Capture a rejected message
    async fn capture(&self, payload: &[u8], reason: &str) -> Result<()>;

    /// Number of entries currently held
    async fn count(&self) -> Result<usize>;

    /// List recent entries, most recent first
    async fn list(&self, limit: usize) -> Result<Vec<PoisonEntry>>;
}

/// In-memory poison queue with bounded capacity
pub struct MemoryPoisonQueue {
    entries: RwLock<Vec<PoisonEntry>>,
    max_entries: usize,
}

impl MemoryPoisonQueue {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries,
        }
    }
}

impl Default for MemoryPoisonQueue {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl PoisonQueue for MemoryPoisonQueue {
    async fn capture(&self, payload: &[u8], reason: &str) -> Result<()> {
        let excerpt: String = String::from_utf8_lossy(payload)
            .chars()
            .take(PAYLOAD_EXCERPT_LEN)
            .collect();

        tracing::warn!(reason = %reason, bytes = payload.len(), "Message poisoned");

        let mut entries = self.entries.write().await;
        entries.push(PoisonEntry {
            payload: excerpt,
            reason: reason.to_string(),
            poisoned_at: Utc::now(),
        });

        // Enforce max capacity
        if self.max_entries > 0 && entries.len() > self.max_entries {
            let drain_count = entries.len() - self.max_entries;
            entries.drain(..drain_count);
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let entries = self.entries.read().await;
        Ok(entries.len())
    }

    async fn list(&self, limit: usize) -> Result<Vec<PoisonEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_and_count() {
        let queue = MemoryPoisonQueue::default();
        assert_eq!(queue.count().await.unwrap(), 0);

        queue.capture(b"{not json", "malformed envelope").await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 1);

        let entries = queue.list(10).await.unwrap();
        assert_eq!(entries[0].payload, "{not json");
        assert_eq!(entries[0].reason, "malformed envelope");
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let queue = MemoryPoisonQueue::default();
        for i in 0..5 {
            queue
                .capture(format!("payload {}", i).as_bytes(), &format!("reason {}", i))
                .await
                .unwrap();
        }

        let entries = queue.list(3).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].reason, "reason 4");
        assert_eq!(entries[2].reason, "reason 2");
    }

    #[tokio::test]
    async fn test_max_capacity_drains_oldest() {
        let queue = MemoryPoisonQueue::new(3);
        for i in 0..5 {
            queue
                .capture(b"payload", &format!("reason {}", i))
                .await
                .unwrap();
        }

        assert_eq!(queue.count().await.unwrap(), 3);
        let entries = queue.list(10).await.unwrap();
        assert_eq!(entries[0].reason, "reason 4");
        assert_eq!(entries[2].reason, "reason 2");
    }

    #[tokio::test]
    async fn test_non_utf8_payload_is_lossy() {
        let queue = MemoryPoisonQueue::default();
        queue.capture(&[0xff, 0xfe, b'a'], "binary").await.unwrap();
        let entries = queue.list(1).await.unwrap();
        assert!(entries[0].payload.contains('a'));
    }
}
