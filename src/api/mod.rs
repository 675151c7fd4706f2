//! HTTP management API
//!
//! Thin surface over the store and the flush engine: inspection,
//! subscription CRUD, and flush triggering. Handlers validate input and
//! delegate; no business logic lives here.

pub mod handlers;

use crate::error::{HeraldError, Result};
use crate::flush::FlushEngine;
use crate::poison::PoisonQueue;
use crate::store::EventStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub flush: Arc<FlushEngine>,
    pub poison: Arc<dyn PoisonQueue>,
}

/// Build the complete axum Router with all management routes
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/users", get(handlers::list_users))
        .route(
            "/users/:uid/messages",
            get(handlers::list_user_messages).delete(handlers::clear_user_messages),
        )
        .route(
            "/users/:uid/messages/:mid",
            get(handlers::get_user_message).delete(handlers::delete_user_message),
        )
        .route(
            "/users/:uid/subscriptions",
            get(handlers::list_user_subscriptions).post(handlers::create_subscription),
        )
        .route(
            "/users/:uid/subscriptions/:sid",
            get(handlers::get_subscription)
                .put(handlers::update_subscription)
                .delete(handlers::delete_subscription),
        )
        .route(
            "/undelivered",
            get(handlers::list_undelivered).delete(handlers::delete_undelivered),
        )
        .route("/undelivered/stats", get(handlers::undelivered_stats))
        .route("/poison", get(handlers::list_poison))
        .route("/flush", post(handlers::trigger_flush))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the API until the shutdown signal fires
pub async fn serve(
    state: AppState,
    bind_addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = build(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| HeraldError::Config(format!("failed to bind {}: {}", bind_addr, e)))?;

    tracing::info!(addr = bind_addr, "Management API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(|e| HeraldError::Internal(format!("server error: {}", e)))
}
