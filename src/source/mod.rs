//! Inbound message source — the pub/sub abstraction for ingestion
//!
//! Backends implement `EventSource` to hand raw messages to the ingestion
//! processor with manual ack control. The processor owns envelope parsing;
//! sources deal only in bytes, so a backend swap never touches routing
//! logic.

use crate::error::Result;
use async_trait::async_trait;

pub mod memory;
pub mod nats;

pub use memory::MemorySource;
pub use nats::NatsSource;

/// Async source of inbound pub/sub messages
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Receive the next message with manual ack control
    ///
    /// Returns `None` when the source is closed and drained.
    async fn next(&mut self) -> Result<Option<PendingMessage>>;

    /// Source name (e.g., "nats", "memory")
    fn name(&self) -> &str;
}

/// A message pending acknowledgement
///
/// Dropping a `PendingMessage` without calling either callback leaves the
/// outcome to the transport's redelivery timeout.
pub struct PendingMessage {
    /// Raw message payload
    pub payload: Vec<u8>,

    /// Number of delivery attempts so far (1 for the first)
    pub num_delivered: u64,

    /// Ack callback — call to confirm processing
    ack_fn: Box<dyn FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send>,

    /// Nak callback — call to request redelivery
    nak_fn: Box<dyn FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send>,
}

impl PendingMessage {
    /// Create a new pending message with ack/nak callbacks
    pub fn new(
        payload: Vec<u8>,
        num_delivered: u64,
        ack_fn: impl FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send + 'static,
        nak_fn: impl FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            payload,
            num_delivered,
            ack_fn: Box::new(ack_fn),
            nak_fn: Box::new(nak_fn),
        }
    }

    /// Acknowledge successful processing
    pub async fn ack(self) -> Result<()> {
        (self.ack_fn)().await
    }

    /// Negative-acknowledge (request redelivery)
    pub async fn nak(self) -> Result<()> {
        (self.nak_fn)().await
    }
}
