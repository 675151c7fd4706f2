//! Management API handlers
//!
//! JSON in, JSON out; 2xx on success, 4xx on validation failure, 5xx on
//! storage failure (mapped by `HeraldError::into_response`).

use crate::api::AppState;
use crate::error::{HeraldError, Result};
use crate::poison::PoisonEntry;
use crate::types::{Event, EventType, FlushReport, StoreStats, Subscription, UserSummary};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn default_poison_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub include_empty: bool,
}

/// GET /users?include_empty=bool
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserSummary>>> {
    let stats = state.store.stats().await?;
    let subscriptions = state.store.list_subscriptions(None).await?;

    let mut users: BTreeSet<String> = stats.per_user.keys().cloned().collect();
    if query.include_empty {
        users.extend(subscriptions.iter().map(|s| s.user_id.clone()));
    }

    let summaries = users
        .into_iter()
        .map(|user_id| {
            let subs: Vec<_> = subscriptions
                .iter()
                .filter(|s| s.user_id == user_id)
                .collect();
            UserSummary {
                undelivered_count: stats.per_user.get(&user_id).copied().unwrap_or(0),
                subscription_count: subs.len() as u64,
                enabled_subscriptions: subs.iter().filter(|s| s.enabled).count() as u64,
                user_id,
            }
        })
        .collect();

    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub event_type: Option<EventType>,
    pub limit: Option<usize>,
}

/// GET /users/{uid}/messages?event_type=&limit=
pub async fn list_user_messages(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Event>>> {
    let events = state
        .store
        .get_undelivered_events(Some(&uid), query.event_type, query.limit)
        .await?;
    Ok(Json(events))
}

/// GET /users/{uid}/messages/{mid}
pub async fn get_user_message(
    State(state): State<AppState>,
    Path((uid, mid)): Path<(String, String)>,
) -> Result<Json<Event>> {
    match state.store.get_event(&uid, &mid).await? {
        Some(event) => Ok(Json(event)),
        None => Err(HeraldError::NotFound(format!(
            "event '{}' for user '{}'",
            mid, uid
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub before_timestamp: Option<DateTime<Utc>>,
}

/// DELETE /users/{uid}/messages?before_timestamp=
pub async fn clear_user_messages(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<serde_json::Value>> {
    let before = query.before_timestamp.unwrap_or(DateTime::<Utc>::MAX_UTC);
    let count = state.store.clear_events(&uid, before).await?;
    Ok(Json(serde_json::json!({ "deleted": count })))
}

/// DELETE /users/{uid}/messages/{mid}
pub async fn delete_user_message(
    State(state): State<AppState>,
    Path((uid, mid)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    let count = if state.store.delete_event(&uid, &mid).await? {
        1
    } else {
        0
    };
    Ok(Json(serde_json::json!({ "deleted": count })))
}

/// GET /undelivered?limit=&event_type=
pub async fn list_undelivered(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Event>>> {
    let events = state
        .store
        .get_undelivered_events(None, query.event_type, query.limit)
        .await?;
    Ok(Json(events))
}

/// GET /undelivered/stats
pub async fn undelivered_stats(State(state): State<AppState>) -> Result<Json<StoreStats>> {
    Ok(Json(state.store.stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteUndeliveredBody {
    #[serde(default)]
    pub event_ids: Option<Vec<String>>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// DELETE /undelivered with body {event_ids?, user_id?}
pub async fn delete_undelivered(
    State(state): State<AppState>,
    Json(body): Json<DeleteUndeliveredBody>,
) -> Result<Json<serde_json::Value>> {
    let mut count: u64 = 0;

    match (body.event_ids, body.user_id) {
        (Some(ids), None) => {
            // Bare ids delete every user's copy of each event
            let ids: HashSet<String> = ids.into_iter().collect();
            let all = state.store.get_undelivered_events(None, None, None).await?;
            for event in all {
                if ids.contains(&event.event_id)
                    && state
                        .store
                        .delete_event(&event.user_id, &event.event_id)
                        .await?
                {
                    count += 1;
                }
            }
        }
        (None, Some(user_id)) => {
            count = state
                .store
                .clear_events(&user_id, DateTime::<Utc>::MAX_UTC)
                .await?;
        }
        _ => {
            return Err(HeraldError::Validation(
                "exactly one of event_ids or user_id must be provided".to_string(),
            ));
        }
    }

    Ok(Json(serde_json::json!({ "deleted": count })))
}

/// GET /users/{uid}/subscriptions
pub async fn list_user_subscriptions(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<Subscription>>> {
    Ok(Json(state.store.list_subscriptions(Some(&uid)).await?))
}

/// Reconcile a subscription body with path parameters
///
/// Empty body fields are filled from the path; conflicting non-empty
/// fields are rejected.
fn reconcile(
    mut subscription: Subscription,
    uid: &str,
    sid: Option<&str>,
) -> Result<Subscription> {
    if subscription.user_id.is_empty() {
        subscription.user_id = uid.to_string();
    } else if subscription.user_id != uid {
        return Err(HeraldError::Validation(format!(
            "body user_id '{}' conflicts with path '{}'",
            subscription.user_id, uid
        )));
    }

    if let Some(sid) = sid {
        if subscription.subscription_id.is_empty() {
            subscription.subscription_id = sid.to_string();
        } else if subscription.subscription_id != sid {
            return Err(HeraldError::Validation(format!(
                "body subscription_id '{}' conflicts with path '{}'",
                subscription.subscription_id, sid
            )));
        }
    } else if subscription.subscription_id.is_empty() {
        subscription.subscription_id = format!("sub-{}", uuid::Uuid::new_v4());
    }

    subscription.validate()?;
    Ok(subscription)
}

/// POST /users/{uid}/subscriptions
pub async fn create_subscription(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(body): Json<Subscription>,
) -> Result<Json<Subscription>> {
    let subscription = reconcile(body, &uid, None)?;
    state.store.upsert_subscription(&subscription).await?;
    Ok(Json(subscription))
}

/// GET /users/{uid}/subscriptions/{sid}
pub async fn get_subscription(
    State(state): State<AppState>,
    Path((uid, sid)): Path<(String, String)>,
) -> Result<Json<Subscription>> {
    match state.store.get_subscription(&sid).await? {
        Some(subscription) if subscription.user_id == uid => Ok(Json(subscription)),
        _ => Err(HeraldError::NotFound(format!(
            "subscription '{}' for user '{}'",
            sid, uid
        ))),
    }
}

/// PUT /users/{uid}/subscriptions/{sid}
pub async fn update_subscription(
    State(state): State<AppState>,
    Path((uid, sid)): Path<(String, String)>,
    Json(body): Json<Subscription>,
) -> Result<Json<Subscription>> {
    let subscription = reconcile(body, &uid, Some(&sid))?;
    state.store.upsert_subscription(&subscription).await?;
    Ok(Json(subscription))
}

/// DELETE /users/{uid}/subscriptions/{sid}
pub async fn delete_subscription(
    State(state): State<AppState>,
    Path((_uid, sid)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    let existed = state.store.delete_subscription(&sid).await?;
    Ok(Json(serde_json::json!({ "deleted": existed })))
}

#[derive(Debug, Deserialize)]
pub struct PoisonQuery {
    #[serde(default = "default_poison_limit")]
    pub limit: usize,
}

/// GET /poison?limit=
pub async fn list_poison(
    State(state): State<AppState>,
    Query(query): Query<PoisonQuery>,
) -> Result<Json<Vec<PoisonEntry>>> {
    Ok(Json(state.poison.list(query.limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct FlushBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force_delivery: bool,
}

/// POST /flush
pub async fn trigger_flush(
    State(state): State<AppState>,
    Json(body): Json<FlushBody>,
) -> Result<Json<FlushReport>> {
    let report = state
        .flush
        .flush(body.user_id.as_deref(), body.dry_run, body.force_delivery)
        .await?;
    Ok(Json(report))
}
