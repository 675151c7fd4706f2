//! NATS JetStream message source
//!
//! Consumes inbound notification messages through a durable pull consumer
//! with explicit acks. `max_ack_pending` doubles as the flow-control
//! ceiling: the broker stops handing out messages while 100 are
//! unacknowledged, which matches the processor's in-flight cap.

use crate::config::NatsConfig;
use crate::error::{HeraldError, Result};
use crate::source::{EventSource, PendingMessage};
use async_nats::jetstream;
use async_nats::jetstream::AckKind;
use async_trait::async_trait;
use futures::StreamExt;

/// Unacknowledged-message ceiling, aligned with the ingestion cap
const MAX_ACK_PENDING: i64 = 100;

/// NATS JetStream `EventSource` implementation
pub struct NatsSource {
    messages: jetstream::consumer::pull::Stream,
}

impl NatsSource {
    /// Connect to NATS, ensure the stream, and open the durable consumer
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| HeraldError::Source(format!("connect to {}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let js = jetstream::new(client);

        let stream = js
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream.clone(),
                subjects: vec![config.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| {
                HeraldError::Source(format!("create/get stream '{}': {}", config.stream, e))
            })?;

        let consumer = stream
            .get_or_create_consumer(
                &config.consumer,
                jetstream::consumer::pull::Config {
                    durable_name: Some(config.consumer.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_ack_pending: MAX_ACK_PENDING,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                HeraldError::Source(format!(
                    "create durable consumer '{}': {}",
                    config.consumer, e
                ))
            })?;

        let messages = consumer.messages().await.map_err(|e| {
            HeraldError::Source(format!("open message stream for '{}': {}", config.subject, e))
        })?;

        tracing::info!(
            stream = %config.stream,
            consumer = %config.consumer,
            filter = %config.subject,
            "Durable subscription ready"
        );

        Ok(Self { messages })
    }
}

#[async_trait]
impl EventSource for NatsSource {
    async fn next(&mut self) -> Result<Option<PendingMessage>> {
        let Some(msg) = self.messages.next().await else {
            return Ok(None);
        };

        let msg = msg.map_err(|e| HeraldError::Source(format!("receive message: {}", e)))?;
        let num_delivered = msg.info().map(|i| i.delivered as u64).unwrap_or(1);
        let payload = msg.payload.to_vec();

        let ack_msg = msg.clone();
        let nak_msg = msg;
        Ok(Some(PendingMessage::new(
            payload,
            num_delivered,
            move || {
                Box::pin(async move {
                    ack_msg
                        .ack()
                        .await
                        .map_err(|e| HeraldError::Source(format!("ack failed: {}", e)))
                })
            },
            move || {
                Box::pin(async move {
                    nak_msg
                        .ack_with(AckKind::Nak(None))
                        .await
                        .map_err(|e| HeraldError::Source(format!("nak failed: {}", e)))
                })
            },
        )))
    }

    fn name(&self) -> &str {
        "nats"
    }
}
