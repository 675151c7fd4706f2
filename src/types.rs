//! Core domain types for the herald notification service
//!
//! All wire types use snake_case JSON field names and SCREAMING_SNAKE_CASE
//! enum variants, matching the inbound pub/sub envelope format.

use crate::error::{HeraldError, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification of a notification event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Notification,
    Alert,
    Warning,
    Info,
}

impl EventType {
    /// All variants, in rendering order
    pub const ALL: [EventType; 4] = [
        EventType::Notification,
        EventType::Alert,
        EventType::Warning,
        EventType::Info,
    ];

    /// Wire name (e.g., "ALERT")
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Notification => "NOTIFICATION",
            EventType::Alert => "ALERT",
            EventType::Warning => "WARNING",
            EventType::Info => "INFO",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification event
///
/// Events are immutable once created. An event present in the store is
/// *undelivered*; deletion is the delivery confirmation. The timestamp is
/// assigned by the publisher and never rewritten by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier; together with `user_id` it keys the events
    /// store. Fan-out copies for different users share it.
    pub event_id: String,

    /// Recipient identifier
    pub user_id: String,

    /// Event classification
    pub event_type: EventType,

    /// Free-form text payload
    pub message: String,

    /// Identity of the producer, by convention an email address
    pub sender: String,

    /// Short subject line
    pub subject: String,

    /// Publisher-assigned UTC instant
    pub timestamp: DateTime<Utc>,

    /// Opaque key-value metadata; never consulted for routing
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Event {
    /// Create a new event with an auto-generated id and current timestamp
    pub fn new(
        user_id: impl Into<String>,
        event_type: EventType,
        message: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            event_id: format!("evt-{}", uuid::Uuid::new_v4()),
            user_id: user_id.into(),
            event_type,
            message: message.into(),
            sender: sender.into(),
            subject: subject.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// How a subscription receives its notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    Email,
    Slack,
}

/// When accumulated events are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationFrequency {
    Immediate,
    Hourly,
    Daily,
    Weekly,
}

/// Rendering format for delivered messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationMethod {
    Plain,
    Html,
    Mime,
}

/// What to do with an event when delivery fails transiently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryErrorStrategy {
    Retry,
    Ignore,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_enabled() -> bool {
    true
}

/// A subscriber's delivery preference
///
/// A user may hold multiple subscriptions; each is evaluated independently.
/// Exactly one of `email_address` / `slack_webhook_url` is populated,
/// selected by `delivery_method` — enforced by [`Subscription::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique subscription identifier
    pub subscription_id: String,

    /// Owning user
    pub user_id: String,

    pub delivery_method: DeliveryMethod,

    pub aggregation_frequency: AggregationFrequency,

    pub aggregation_method: AggregationMethod,

    pub delivery_error_strategy: DeliveryErrorStrategy,

    /// Wall-clock HH:MM; meaningful only for DAILY/WEEKLY, interpreted by
    /// the external scheduler that triggers flushes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<String>,

    /// IANA timezone identifier
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Required iff delivery_method == EMAIL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,

    /// Required iff delivery_method == SLACK
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook_url: Option<String>,

    /// Subject line for aggregated deliveries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_message_subject: Option<String>,

    /// A disabled subscription is invisible to delivery but still listable
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Subscription {
    /// Enforce the subscription invariants
    ///
    /// Exactly one destination field must be populated, matching
    /// `delivery_method`; `delivery_time` must be HH:MM when present;
    /// `timezone` must be a known IANA identifier.
    pub fn validate(&self) -> Result<()> {
        if self.subscription_id.is_empty() {
            return Err(HeraldError::Validation(
                "subscription_id must not be empty".to_string(),
            ));
        }
        if self.user_id.is_empty() {
            return Err(HeraldError::Validation(
                "user_id must not be empty".to_string(),
            ));
        }

        match self.delivery_method {
            DeliveryMethod::Email => {
                if self.email_address.as_deref().unwrap_or("").is_empty() {
                    return Err(HeraldError::Validation(
                        "EMAIL subscription requires email_address".to_string(),
                    ));
                }
                if self.slack_webhook_url.is_some() {
                    return Err(HeraldError::Validation(
                        "EMAIL subscription must not set slack_webhook_url".to_string(),
                    ));
                }
            }
            DeliveryMethod::Slack => {
                if self.slack_webhook_url.as_deref().unwrap_or("").is_empty() {
                    return Err(HeraldError::Validation(
                        "SLACK subscription requires slack_webhook_url".to_string(),
                    ));
                }
                if self.email_address.is_some() {
                    return Err(HeraldError::Validation(
                        "SLACK subscription must not set email_address".to_string(),
                    ));
                }
            }
        }

        if let Some(ref time) = self.delivery_time {
            NaiveTime::parse_from_str(time, "%H:%M").map_err(|_| {
                HeraldError::Validation(format!("delivery_time '{}' is not HH:MM", time))
            })?;
        }

        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| HeraldError::Validation(format!("unknown timezone '{}'", self.timezone)))?;

        Ok(())
    }

    /// Destination address for the active delivery method
    pub fn destination(&self) -> &str {
        match self.delivery_method {
            DeliveryMethod::Email => self.email_address.as_deref().unwrap_or(""),
            DeliveryMethod::Slack => self.slack_webhook_url.as_deref().unwrap_or(""),
        }
    }
}

/// Routing target derived from an inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingTarget {
    /// Deliver per-subscription to these users
    Users(Vec<String>),
    /// Gateway mode: a single direct email, bypassing subscriptions
    DirectEmail(String),
}

/// Inbound pub/sub message envelope
///
/// Exactly one of `user_id`, `user_ids`, `email_to` must be present.
/// Unknown `event_type` values are rejected at parse time rather than
/// coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub event_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,

    pub event_type: EventType,

    pub message: String,

    pub sender: String,

    pub subject: String,

    /// RFC3339 UTC timestamp, publisher-assigned
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_to: Option<String>,
}

impl InboundEnvelope {
    /// Resolve the routing target, enforcing the exactly-one rule
    pub fn routing(&self) -> Result<RoutingTarget> {
        let populated = [
            self.user_id.is_some(),
            self.user_ids.is_some(),
            self.email_to.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();

        if populated != 1 {
            return Err(HeraldError::Validation(format!(
                "exactly one of user_id/user_ids/email_to must be present, got {}",
                populated
            )));
        }

        if self.event_id.is_empty() {
            return Err(HeraldError::Validation(
                "event_id must not be empty".to_string(),
            ));
        }

        if let Some(ref to) = self.email_to {
            return Ok(RoutingTarget::DirectEmail(to.clone()));
        }
        if let Some(ref uid) = self.user_id {
            return Ok(RoutingTarget::Users(vec![uid.clone()]));
        }
        let ids = self.user_ids.clone().unwrap_or_default();
        if ids.is_empty() {
            return Err(HeraldError::Validation(
                "user_ids must not be empty".to_string(),
            ));
        }
        Ok(RoutingTarget::Users(ids))
    }

    /// Materialize the event for one target user
    pub fn event_for(&self, user_id: &str) -> Event {
        Event {
            event_id: self.event_id.clone(),
            user_id: user_id.to_string(),
            event_type: self.event_type,
            message: self.message.clone(),
            sender: self.sender.clone(),
            subject: self.subject.clone(),
            timestamp: self.timestamp,
            metadata: self.metadata.clone(),
        }
    }
}

/// Outcome of a single flush invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlushReport {
    pub users_processed: u64,
    pub messages_delivered: u64,
    pub messages_failed: u64,
    pub events_cleared: u64,
    pub errors: Vec<String>,
    pub dry_run: bool,
    /// Tag attached to every log line of this flush
    pub correlation_id: String,
}

/// Aggregate view of the undelivered-event store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of users with at least one undelivered event
    pub users: u64,
    /// Total undelivered events
    pub total_events: u64,
    /// Undelivered count per user
    pub per_user: HashMap<String, u64>,
    /// Undelivered count per event type (wire name keyed)
    pub per_type: HashMap<String, u64>,
}

/// Per-user summary row for the management API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub subscription_count: u64,
    pub undelivered_count: u64,
    pub enabled_subscriptions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_subscription() -> Subscription {
        Subscription {
            subscription_id: "sub-1".to_string(),
            user_id: "u1".to_string(),
            delivery_method: DeliveryMethod::Email,
            aggregation_frequency: AggregationFrequency::Daily,
            aggregation_method: AggregationMethod::Plain,
            delivery_error_strategy: DeliveryErrorStrategy::Retry,
            delivery_time: Some("09:00".to_string()),
            timezone: "UTC".to_string(),
            email_address: Some("a@example.com".to_string()),
            slack_webhook_url: None,
            aggregated_message_subject: None,
            enabled: true,
        }
    }

    #[test]
    fn test_event_creation() {
        let event = Event::new("u1", EventType::Alert, "disk full", "ops@example.com", "Disk");
        assert!(event.event_id.starts_with("evt-"));
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.event_type, EventType::Alert);
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&EventType::Notification).unwrap();
        assert_eq!(json, "\"NOTIFICATION\"");

        let parsed: EventType = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(parsed, EventType::Warning);
    }

    #[test]
    fn test_event_type_unknown_rejected() {
        let result: std::result::Result<EventType, _> = serde_json::from_str("\"FATAL\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = Event::new("u1", EventType::Info, "hello", "svc@example.com", "Hi")
            .with_metadata("source", serde_json::json!("ci"));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"INFO\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_subscription_valid_email() {
        assert!(email_subscription().validate().is_ok());
    }

    #[test]
    fn test_subscription_email_missing_address() {
        let mut sub = email_subscription();
        sub.email_address = None;
        assert!(matches!(sub.validate(), Err(HeraldError::Validation(_))));
    }

    #[test]
    fn test_subscription_email_with_webhook_rejected() {
        let mut sub = email_subscription();
        sub.slack_webhook_url = Some("https://hooks.example.com/x".to_string());
        assert!(sub.validate().is_err());
    }

    #[test]
    fn test_subscription_slack_requires_webhook() {
        let mut sub = email_subscription();
        sub.delivery_method = DeliveryMethod::Slack;
        sub.email_address = None;
        assert!(sub.validate().is_err());

        sub.slack_webhook_url = Some("https://hooks.example.com/x".to_string());
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_subscription_bad_delivery_time() {
        let mut sub = email_subscription();
        sub.delivery_time = Some("25:99".to_string());
        assert!(sub.validate().is_err());
    }

    #[test]
    fn test_subscription_bad_timezone() {
        let mut sub = email_subscription();
        sub.timezone = "Mars/Olympus".to_string();
        assert!(sub.validate().is_err());

        sub.timezone = "Europe/Berlin".to_string();
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_subscription_defaults_on_deserialize() {
        let json = r#"{
            "subscription_id": "sub-2",
            "user_id": "u1",
            "delivery_method": "EMAIL",
            "aggregation_frequency": "IMMEDIATE",
            "aggregation_method": "PLAIN",
            "delivery_error_strategy": "IGNORE",
            "email_address": "a@example.com"
        }"#;

        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.timezone, "UTC");
        assert!(sub.enabled);
        assert!(sub.delivery_time.is_none());
    }

    #[test]
    fn test_envelope_single_user() {
        let json = r#"{
            "event_id": "e1", "user_id": "u1", "event_type": "ALERT",
            "message": "m", "sender": "s@example.com", "subject": "S",
            "timestamp": "2024-05-01T10:00:00Z", "metadata": {}
        }"#;

        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            env.routing().unwrap(),
            RoutingTarget::Users(vec!["u1".to_string()])
        );

        let event = env.event_for("u1");
        assert_eq!(event.event_id, "e1");
        assert_eq!(event.user_id, "u1");
    }

    #[test]
    fn test_envelope_fan_out() {
        let json = r#"{
            "event_id": "e1", "user_ids": ["u1", "u2"], "event_type": "INFO",
            "message": "m", "sender": "s@example.com", "subject": "S",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;

        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            env.routing().unwrap(),
            RoutingTarget::Users(vec!["u1".to_string(), "u2".to_string()])
        );
    }

    #[test]
    fn test_envelope_gateway() {
        let json = r#"{
            "event_id": "e1", "email_to": "direct@example.com", "event_type": "INFO",
            "message": "m", "sender": "s@example.com", "subject": "S",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;

        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            env.routing().unwrap(),
            RoutingTarget::DirectEmail("direct@example.com".to_string())
        );
    }

    #[test]
    fn test_envelope_conflicting_targets() {
        let json = r#"{
            "event_id": "e1", "user_id": "u1", "user_ids": ["u2"],
            "event_type": "INFO", "message": "m", "sender": "s@example.com",
            "subject": "S", "timestamp": "2024-05-01T10:00:00Z"
        }"#;

        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.routing().is_err());
    }

    #[test]
    fn test_envelope_no_target() {
        let json = r#"{
            "event_id": "e1", "event_type": "INFO", "message": "m",
            "sender": "s@example.com", "subject": "S",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;

        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.routing().is_err());
    }

    #[test]
    fn test_envelope_empty_user_ids() {
        let json = r#"{
            "event_id": "e1", "user_ids": [], "event_type": "INFO",
            "message": "m", "sender": "s@example.com", "subject": "S",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;

        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.routing().is_err());
    }
}
