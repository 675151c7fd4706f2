//! # herald
//!
//! Notification delivery service: pub/sub ingestion, per-subscriber
//! aggregation, and delivery over SMTP or HTTP webhooks.
//!
//! ## Overview
//!
//! Events arrive from a pub/sub stream and are routed per subscription:
//! IMMEDIATE subscriptions deliver at ingestion time, deferred frequencies
//! persist into the event store until a flush. The store is the sole
//! source of truth for "not yet delivered" — events are removed only after
//! a successful delivery confirmation or an explicit administrative
//! delete.
//!
//! ## Architecture
//!
//! - **EventStore** trait — durable persistence of events and
//!   subscriptions (`store::MemoryStore` for single-process use)
//! - **digest** — pure rendering of event batches into PLAIN, HTML, or
//!   MIME digests
//! - **DeliveryProvider** trait — uniform send contract for the SMTP and
//!   webhook transports
//! - **EventSource** trait — pub/sub intake with manual ack control
//!   (`source::NatsSource` for JetStream, `source::MemorySource` for
//!   tests)
//! - **Processor** — bounded-concurrency ingestion pipeline
//! - **FlushEngine** — snapshot, render, deliver, clear
//! - **api** — thin HTTP management surface over store and flush

pub mod api;
pub mod config;
pub mod deliver;
pub mod digest;
pub mod error;
pub mod flush;
pub mod ingest;
pub mod poison;
pub mod service;
pub mod source;
pub mod store;
pub mod types;

// Re-export core types
pub use config::{Config, ServiceMode};
pub use deliver::{DeliveryOutcome, DeliveryProvider, Dispatcher, EmailProvider, WebhookProvider};
pub use digest::{render, Rendered};
pub use error::{HeraldError, Result};
pub use flush::FlushEngine;
pub use ingest::Processor;
pub use poison::{MemoryPoisonQueue, PoisonEntry, PoisonQueue};
pub use source::{EventSource, MemorySource, NatsSource, PendingMessage};
pub use store::{EventStore, MemoryStore};
pub use types::{
    AggregationFrequency, AggregationMethod, DeliveryErrorStrategy, DeliveryMethod, Event,
    EventType, FlushReport, InboundEnvelope, RoutingTarget, StoreStats, Subscription, UserSummary,
};
