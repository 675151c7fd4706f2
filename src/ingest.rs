//! Ingestion processor — route inbound pub/sub messages
//!
//! Owns the "parse → expand targets → per-subscription decision → ack"
//! pipeline for one inbound message. IMMEDIATE subscriptions deliver at
//! ingestion time and skip the store; deferred frequencies persist for a
//! later flush. A message is acked only after every target was handled
//! without an uncaught error; anything else is nak'd and the transport
//! redelivers (per-user store idempotency absorbs the duplicates).

use crate::deliver::{DeliveryOutcome, Dispatcher};
use crate::digest;
use crate::error::{HeraldError, Result};
use crate::poison::PoisonQueue;
use crate::source::{EventSource, PendingMessage};
use crate::store::EventStore;
use crate::types::{
    AggregationFrequency, DeliveryErrorStrategy, InboundEnvelope, RoutingTarget,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

/// Flow-control ceiling: concurrent messages in flight
const MAX_IN_FLIGHT: usize = 100;

/// Routes inbound messages to immediate delivery or storage
pub struct Processor {
    store: Arc<dyn EventStore>,
    dispatcher: Arc<Dispatcher>,
    poison: Arc<dyn PoisonQueue>,
    default_sender: String,
}

impl Processor {
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<Dispatcher>,
        poison: Arc<dyn PoisonQueue>,
        default_sender: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            poison,
            default_sender: default_sender.into(),
        }
    }

    /// Consume messages until the source closes or shutdown signals
    ///
    /// On shutdown the loop stops pulling, waits up to `grace` for
    /// in-flight messages, and leaves stragglers to the transport's
    /// redelivery timeout.
    pub async fn run(
        self: Arc<Self>,
        mut source: Box<dyn EventSource>,
        mut shutdown: watch::Receiver<bool>,
        grace: Duration,
    ) {
        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
        tracing::info!(source = source.name(), max_in_flight = MAX_IN_FLIGHT, "Ingestion started");

        loop {
            // Hold a permit before pulling so the in-flight cap backs
            // pressure up into the transport
            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let pending = tokio::select! {
                _ = shutdown.changed() => break,
                next = source.next() => match next {
                    Ok(Some(pending)) => pending,
                    Ok(None) => {
                        tracing::info!("Source closed, ingestion stopping");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Source failure, ingestion stopping");
                        break;
                    }
                },
            };

            let processor = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                processor.dispatch(pending).await;
            });
        }

        // Drain in-flight work up to the grace period
        let drained = tokio::time::timeout(
            grace,
            semaphore.acquire_many(MAX_IN_FLIGHT as u32),
        )
        .await;
        match drained {
            Ok(_) => tracing::info!("Ingestion drained"),
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "Grace period expired with messages still in flight"
            ),
        }
    }

    /// Process one message and settle it with the transport
    pub async fn dispatch(&self, pending: PendingMessage) {
        let payload = pending.payload.clone();
        match self.handle(&payload).await {
            Ok(()) => {
                if let Err(e) = pending.ack().await {
                    tracing::warn!(error = %e, "Failed to ack message");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Message handling failed, requesting redelivery");
                if let Err(e) = pending.nak().await {
                    tracing::warn!(error = %e, "Failed to nak message");
                }
            }
        }
    }

    /// Handle one raw payload
    ///
    /// `Ok` means the message is settled (including poisoned input);
    /// `Err` means redelivery is wanted.
    async fn handle(&self, payload: &[u8]) -> Result<()> {
        let envelope: InboundEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.poison
                    .capture(payload, &format!("malformed envelope: {}", e))
                    .await?;
                return Ok(());
            }
        };

        let routing = match envelope.routing() {
            Ok(routing) => routing,
            Err(e) => {
                self.poison
                    .capture(payload, &format!("invalid envelope: {}", e))
                    .await?;
                return Ok(());
            }
        };

        match routing {
            RoutingTarget::DirectEmail(to) => self.handle_gateway(payload, &envelope, &to).await,
            RoutingTarget::Users(user_ids) => {
                for user_id in &user_ids {
                    self.process_for_user(&envelope, user_id).await?;
                }
                Ok(())
            }
        }
    }

    /// Gateway mode: one direct email, no subscription lookup
    async fn handle_gateway(
        &self,
        payload: &[u8],
        envelope: &InboundEnvelope,
        to: &str,
    ) -> Result<()> {
        let sender = self.sender_for(envelope);
        let outcome = self
            .dispatcher
            .send_direct_email(
                to,
                &envelope.subject,
                &envelope.message,
                "text/plain; charset=utf-8",
                sender,
            )
            .await;

        match outcome {
            DeliveryOutcome::Delivered => Ok(()),
            DeliveryOutcome::TransientFailure(reason) => Err(HeraldError::Delivery {
                destination: to.to_string(),
                reason,
                transient: true,
            }),
            DeliveryOutcome::PermanentFailure(reason) => {
                self.poison
                    .capture(payload, &format!("gateway email rejected: {}", reason))
                    .await?;
                Ok(())
            }
        }
    }

    /// Apply every enabled subscription of one target user
    async fn process_for_user(&self, envelope: &InboundEnvelope, user_id: &str) -> Result<()> {
        let subscriptions: Vec<_> = self
            .store
            .list_subscriptions(Some(user_id))
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .collect();

        let event = envelope.event_for(user_id);

        // No subscribers yet: persist anyway, a later flush picks it up
        if subscriptions.is_empty() {
            tracing::debug!(user = user_id, event_id = %event.event_id, "No subscriptions, deferring event");
            self.store.store_event(&event).await?;
            return Ok(());
        }

        for subscription in &subscriptions {
            if subscription.aggregation_frequency != AggregationFrequency::Immediate {
                self.store.store_event(&event).await?;
                continue;
            }

            let rendered = digest::render(
                user_id,
                std::slice::from_ref(&event),
                subscription.aggregation_method,
            );
            let subject = if event.subject.is_empty() {
                rendered.subject.as_str()
            } else {
                event.subject.as_str()
            };

            let outcome = self
                .dispatcher
                .send(
                    subscription,
                    subject,
                    &rendered.body,
                    &rendered.content_type,
                    self.sender_for(envelope),
                )
                .await;

            match outcome {
                DeliveryOutcome::Delivered => {}
                DeliveryOutcome::TransientFailure(_)
                    if subscription.delivery_error_strategy == DeliveryErrorStrategy::Retry =>
                {
                    // Flush retries later
                    self.store.store_event(&event).await?;
                }
                DeliveryOutcome::TransientFailure(reason) => {
                    tracing::warn!(
                        subscription = %subscription.subscription_id,
                        reason = %reason,
                        "Dropping event after transient failure (IGNORE strategy)"
                    );
                }
                DeliveryOutcome::PermanentFailure(reason) => {
                    tracing::warn!(
                        subscription = %subscription.subscription_id,
                        event_id = %event.event_id,
                        reason = %reason,
                        "Dropping event after permanent delivery failure"
                    );
                }
            }
        }

        Ok(())
    }

    fn sender_for<'a>(&'a self, envelope: &'a InboundEnvelope) -> &'a str {
        if envelope.sender.is_empty() {
            &self.default_sender
        } else {
            &envelope.sender
        }
    }
}
