//! Delivery providers — oblivious senders behind a uniform contract
//!
//! Providers know nothing about events or the store; they take a rendered
//! subject/body and report an outcome. Retry policy is owned by the
//! callers (ingestion and the flush engine) via each subscription's
//! `delivery_error_strategy` — providers never retry internally.

use crate::types::{DeliveryMethod, Subscription};
use async_trait::async_trait;
use std::sync::Arc;

pub mod email;
pub mod webhook;

pub use email::EmailProvider;
pub use webhook::WebhookProvider;

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The remote accepted the message
    Delivered,
    /// Worth retrying on a later attempt (network, 5xx, SMTP 4xx, timeout)
    TransientFailure(String),
    /// Retrying will not help (SMTP 5xx, webhook 4xx other than 408/429)
    PermanentFailure(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryOutcome::TransientFailure(_))
    }

    /// Failure description, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Delivered => None,
            DeliveryOutcome::TransientFailure(r) | DeliveryOutcome::PermanentFailure(r) => Some(r),
        }
    }
}

/// Uniform send contract implemented by every transport
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    /// Deliver a rendered message to the subscription's destination
    ///
    /// `content_type` is a full MIME content-type line; for multipart
    /// bodies it carries the boundary and must be passed through intact.
    async fn send(
        &self,
        subscription: &Subscription,
        subject: &str,
        body: &str,
        content_type: &str,
        sender: &str,
    ) -> DeliveryOutcome;

    /// Provider name (e.g., "email", "webhook")
    fn name(&self) -> &str;
}

/// Routes sends to the provider matching each subscription's method
pub struct Dispatcher {
    email: Arc<dyn DeliveryProvider>,
    webhook: Arc<dyn DeliveryProvider>,
}

impl Dispatcher {
    pub fn new(email: Arc<dyn DeliveryProvider>, webhook: Arc<dyn DeliveryProvider>) -> Self {
        Self { email, webhook }
    }

    pub fn provider_for(&self, method: DeliveryMethod) -> &dyn DeliveryProvider {
        match method {
            DeliveryMethod::Email => self.email.as_ref(),
            DeliveryMethod::Slack => self.webhook.as_ref(),
        }
    }

    /// Send through the provider selected by the subscription
    pub async fn send(
        &self,
        subscription: &Subscription,
        subject: &str,
        body: &str,
        content_type: &str,
        sender: &str,
    ) -> DeliveryOutcome {
        let provider = self.provider_for(subscription.delivery_method);
        let outcome = provider
            .send(subscription, subject, body, content_type, sender)
            .await;

        match &outcome {
            DeliveryOutcome::Delivered => tracing::debug!(
                provider = provider.name(),
                subscription = %subscription.subscription_id,
                "Message delivered"
            ),
            DeliveryOutcome::TransientFailure(reason) => tracing::warn!(
                provider = provider.name(),
                subscription = %subscription.subscription_id,
                reason = %reason,
                "Transient delivery failure"
            ),
            DeliveryOutcome::PermanentFailure(reason) => tracing::warn!(
                provider = provider.name(),
                subscription = %subscription.subscription_id,
                reason = %reason,
                "Permanent delivery failure"
            ),
        }

        outcome
    }

    /// Gateway mode: one direct email bypassing subscription lookup
    pub async fn send_direct_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        content_type: &str,
        sender: &str,
    ) -> DeliveryOutcome {
        let synthetic = gateway_subscription(to);
        self.send(&synthetic, subject, body, content_type, sender)
            .await
    }
}

/// Ephemeral subscription standing in for a gateway recipient
fn gateway_subscription(to: &str) -> Subscription {
    Subscription {
        subscription_id: format!("gateway-{}", to),
        user_id: to.to_string(),
        delivery_method: DeliveryMethod::Email,
        aggregation_frequency: crate::types::AggregationFrequency::Immediate,
        aggregation_method: crate::types::AggregationMethod::Plain,
        delivery_error_strategy: crate::types::DeliveryErrorStrategy::Ignore,
        delivery_time: None,
        timezone: "UTC".to_string(),
        email_address: Some(to.to_string()),
        slack_webhook_url: None,
        aggregated_message_subject: None,
        enabled: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        assert!(DeliveryOutcome::Delivered.is_delivered());
        assert!(DeliveryOutcome::TransientFailure("x".to_string()).is_transient());
        assert!(!DeliveryOutcome::PermanentFailure("x".to_string()).is_transient());
        assert_eq!(
            DeliveryOutcome::PermanentFailure("boom".to_string()).reason(),
            Some("boom")
        );
        assert_eq!(DeliveryOutcome::Delivered.reason(), None);
    }

    #[test]
    fn test_gateway_subscription_shape() {
        let sub = gateway_subscription("direct@example.com");
        assert_eq!(sub.delivery_method, DeliveryMethod::Email);
        assert_eq!(sub.email_address.as_deref(), Some("direct@example.com"));
        assert_eq!(sub.destination(), "direct@example.com");
    }
}
