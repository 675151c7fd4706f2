//! Channel-backed message source for tests and single-process use
//!
//! Messages are fed through an mpsc sender; ack/nak outcomes are recorded
//! so tests can assert on dispositions.

use crate::error::Result;
use crate::source::{EventSource, PendingMessage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Final disposition of a consumed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    Nacked,
}

/// In-memory `EventSource` implementation
pub struct MemorySource {
    rx: mpsc::Receiver<Vec<u8>>,
    dispositions: Arc<Mutex<Vec<Disposition>>>,
    delivered: u64,
}

impl MemorySource {
    /// Create a source and the sender that feeds it
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx,
                dispositions: Arc::new(Mutex::new(Vec::new())),
                delivered: 0,
            },
        )
    }

    /// Shared handle for asserting on ack/nak outcomes
    pub fn dispositions(&self) -> Arc<Mutex<Vec<Disposition>>> {
        self.dispositions.clone()
    }
}

#[async_trait]
impl EventSource for MemorySource {
    async fn next(&mut self) -> Result<Option<PendingMessage>> {
        let Some(payload) = self.rx.recv().await else {
            return Ok(None);
        };
        self.delivered += 1;

        let ack_log = self.dispositions.clone();
        let nak_log = self.dispositions.clone();
        Ok(Some(PendingMessage::new(
            payload,
            1,
            move || {
                Box::pin(async move {
                    ack_log.lock().await.push(Disposition::Acked);
                    Ok(())
                })
            },
            move || {
                Box::pin(async move {
                    nak_log.lock().await.push(Disposition::Nacked);
                    Ok(())
                })
            },
        )))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
