//! HTTP webhook delivery for chat destinations
//!
//! POSTs the rendered message as JSON to the subscription's webhook URL.
//! A single shared client with a connection pool serves all sends; the
//! per-request timeout is 30 seconds.

use crate::deliver::{DeliveryOutcome, DeliveryProvider};
use crate::types::Subscription;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound webhook payload
#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    subject: &'a str,
    message: &'a str,
    sender: &'a str,
}

/// Webhook delivery provider
pub struct WebhookProvider {
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebhookProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an HTTP response status to a delivery outcome
///
/// 2xx delivered; 408 and 429 retry along with 5xx; remaining 4xx are
/// rejections that will not improve.
fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Delivered
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        DeliveryOutcome::TransientFailure(format!("webhook returned {}", status))
    } else {
        DeliveryOutcome::PermanentFailure(format!("webhook returned {}", status))
    }
}

#[async_trait]
impl DeliveryProvider for WebhookProvider {
    async fn send(
        &self,
        subscription: &Subscription,
        subject: &str,
        body: &str,
        _content_type: &str,
        sender: &str,
    ) -> DeliveryOutcome {
        let url = subscription.destination();
        if url.is_empty() {
            return DeliveryOutcome::PermanentFailure(
                "subscription has no webhook URL".to_string(),
            );
        }

        let payload = WebhookBody {
            subject,
            message: body,
            sender,
        };

        match self.client.post(url).json(&payload).send().await {
            Ok(response) => classify_status(response.status()),
            // Connect errors and timeouts are worth retrying
            Err(e) => DeliveryOutcome::TransientFailure(format!("webhook request failed: {}", e)),
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
