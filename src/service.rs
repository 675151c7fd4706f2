//! Service runtime — wire components together and host the long-lived tasks
//!
//! Dependencies are constructed once at startup and injected; nothing is
//! global. The ingestion loop and the HTTP API run as sibling tasks joined
//! at shutdown; neither owns the other. A single shutdown signal fans out
//! to both through a watch channel.

use crate::api::{self, AppState};
use crate::config::Config;
use crate::deliver::{Dispatcher, EmailProvider, WebhookProvider};
use crate::error::{HeraldError, Result};
use crate::flush::FlushEngine;
use crate::ingest::Processor;
use crate::poison::{MemoryPoisonQueue, PoisonQueue};
use crate::source::NatsSource;
use crate::store::{EventStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Run the service until a shutdown signal arrives
pub async fn run(config: Config) -> Result<()> {
    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(EmailProvider::new(config.smtp.clone())),
        Arc::new(WebhookProvider::new()),
    ));
    let poison: Arc<dyn PoisonQueue> = Arc::new(MemoryPoisonQueue::default());
    let flush = Arc::new(FlushEngine::new(
        store.clone(),
        dispatcher.clone(),
        config.smtp.default_sender.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut handles = Vec::new();

    if config.mode.runs_ingest() {
        let nats = config
            .nats
            .as_ref()
            .ok_or_else(|| HeraldError::Config("pub/sub settings missing".to_string()))?;
        let source = NatsSource::connect(nats).await?;
        let processor = Arc::new(Processor::new(
            store.clone(),
            dispatcher.clone(),
            poison.clone(),
            config.smtp.default_sender.clone(),
        ));
        let grace = Duration::from_secs(config.shutdown_grace_secs);
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            processor.run(Box::new(source), rx, grace).await;
        }));
    }

    if config.mode.runs_api() {
        let state = AppState {
            store: store.clone(),
            flush: flush.clone(),
            poison: poison.clone(),
        };
        let bind_addr = config.http.bind_address();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = api::serve(state, &bind_addr, rx).await {
                tracing::error!(error = %e, "Management API exited with error");
            }
        }));
    }

    if handles.is_empty() {
        return Err(HeraldError::Config(
            "service mode selects no tasks".to_string(),
        ));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Service task panicked");
        }
    }

    tracing::info!("Service stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
