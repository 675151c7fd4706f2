//! Flush engine — on-demand delivery of accumulated events
//!
//! A flush snapshots each user's undelivered events, renders one digest
//! per enabled subscription, delivers, and clears the store bounded by the
//! snapshot's maximum timestamp. Events that arrive mid-flush have later
//! timestamps and survive the clear. One user's failure never aborts the
//! pass for other users; the engine never retries inline — retries happen
//! on the next flush call.

use crate::deliver::Dispatcher;
use crate::digest;
use crate::error::Result;
use crate::store::EventStore;
use crate::types::{DeliveryErrorStrategy, FlushReport, Subscription};
use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;

/// Orchestrates flush passes over the store and delivery providers
pub struct FlushEngine {
    store: Arc<dyn EventStore>,
    dispatcher: Arc<Dispatcher>,
    default_sender: String,
}

impl FlushEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<Dispatcher>,
        default_sender: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            default_sender: default_sender.into(),
        }
    }

    /// Deliver and clear accumulated events, per user or globally
    ///
    /// `dry_run` reports planned counts without delivering or clearing.
    /// `force_delivery` clears the snapshot even when every delivery
    /// failed.
    pub async fn flush(
        &self,
        user_id: Option<&str>,
        dry_run: bool,
        force_delivery: bool,
    ) -> Result<FlushReport> {
        let correlation_id = format!(
            "flush-{}-{}",
            user_id.unwrap_or("all"),
            Utc::now().timestamp()
        );
        let span = tracing::info_span!(
            "flush",
            correlation_id = %correlation_id,
            dry_run,
            force_delivery,
        );

        self.flush_inner(user_id, dry_run, force_delivery, correlation_id)
            .instrument(span)
            .await
    }

    async fn flush_inner(
        &self,
        user_id: Option<&str>,
        dry_run: bool,
        force_delivery: bool,
        correlation_id: String,
    ) -> Result<FlushReport> {
        let users = match user_id {
            Some(uid) => vec![uid.to_string()],
            None => self.store.user_ids_with_events().await?,
        };

        let mut report = FlushReport {
            dry_run,
            correlation_id,
            ..Default::default()
        };

        tracing::info!(users = users.len(), "Flush started");

        for user in &users {
            report.users_processed += 1;
            if let Err(e) = self
                .flush_user(user, dry_run, force_delivery, &mut report)
                .await
            {
                tracing::warn!(user = %user, error = %e, "Flush failed for user");
                report.errors.push(format!("user {}: {}", user, e));
            }
        }

        tracing::info!(
            users_processed = report.users_processed,
            delivered = report.messages_delivered,
            failed = report.messages_failed,
            cleared = report.events_cleared,
            "Flush finished"
        );

        Ok(report)
    }

    /// Flush one user from a consistent snapshot
    async fn flush_user(
        &self,
        user_id: &str,
        dry_run: bool,
        force_delivery: bool,
        report: &mut FlushReport,
    ) -> Result<()> {
        // Snapshot; events are ascending, so the last one carries T_u
        let events = self
            .store
            .get_undelivered_events(Some(user_id), None, None)
            .await?;
        let subscriptions: Vec<Subscription> = self
            .store
            .list_subscriptions(Some(user_id))
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .collect();

        let Some(last) = events.last() else {
            return Ok(());
        };
        let snapshot_max = last.timestamp;

        if subscriptions.is_empty() {
            tracing::debug!(user = user_id, "No enabled subscriptions, leaving events in place");
            return Ok(());
        }

        if dry_run {
            // Planned counts assuming every delivery succeeds
            report.messages_delivered += subscriptions.len() as u64;
            report.events_cleared += events.len() as u64;
            tracing::info!(
                user = user_id,
                planned_messages = subscriptions.len(),
                planned_clear = events.len(),
                "Dry run, skipping delivery"
            );
            return Ok(());
        }

        let mut any_success = false;
        for subscription in &subscriptions {
            let rendered = digest::render(user_id, &events, subscription.aggregation_method);
            let subject = subscription
                .aggregated_message_subject
                .as_deref()
                .unwrap_or(&rendered.subject);

            let outcome = self
                .dispatcher
                .send(
                    subscription,
                    subject,
                    &rendered.body,
                    &rendered.content_type,
                    &self.default_sender,
                )
                .await;

            if outcome.is_delivered() {
                any_success = true;
                report.messages_delivered += 1;
            } else {
                report.messages_failed += 1;
                report.errors.push(format!(
                    "subscription {}: {}",
                    subscription.subscription_id,
                    outcome.reason().unwrap_or("unknown failure")
                ));
            }
        }

        // Clear decision: any success clears; an all-RETRY wipeout keeps
        // the snapshot for the next flush; all-IGNORE clears; mixed
        // strategies keep unless forced
        let all_ignore = subscriptions
            .iter()
            .all(|s| s.delivery_error_strategy == DeliveryErrorStrategy::Ignore);
        let should_clear = force_delivery || any_success || all_ignore;

        if should_clear {
            let cleared = self.store.clear_events(user_id, snapshot_max).await?;
            report.events_cleared += cleared;
        } else {
            tracing::info!(
                user = user_id,
                retained = events.len(),
                "All deliveries failed under RETRY, keeping events"
            );
        }

        Ok(())
    }
}
