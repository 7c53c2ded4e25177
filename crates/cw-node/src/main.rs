//! # CW Node
//!
//! Runs the exchange: HTTP calls in, broker envelopes out, responses
//! correlated back to their callers.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging
//! 2. Load and validate configuration from the environment
//! 3. Build the broker transport, token store and exchange service
//! 4. Start the response listener and the configured digest listeners
//! 5. Serve HTTP until Ctrl+C

mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use cw_bus::InMemoryBroker;
use cw_exchange::{ExchangeConfig, ExchangeService, InMemoryTokenStore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LogConfig::from_env()).context("failed to initialize logging")?;

    let config = ExchangeConfig::from_env();
    info!(
        app_name = %config.app_name,
        api_url = %config.api_url,
        version = cw_exchange::VERSION,
        "Starting CW node"
    );

    // No external broker client is linked into this binary.
    warn!("Using the in-memory loopback broker; calls will time out unless answered");
    let broker = Arc::new(InMemoryBroker::new(config.app_name.clone()));
    let tokens = Arc::new(InMemoryTokenStore::from_env());

    let service = ExchangeService::with_defaults(config, broker.clone(), tokens)
        .context("failed to build exchange service")?;
    let listener = service.start(broker.clone());

    let mut digest_listeners = Vec::new();
    for digest in service.config().digests.clone() {
        match broker.digest_queue(digest) {
            Some(queue) => digest_listeners.push(service.subscribe_digest(digest, queue, None)),
            None => warn!(digest = %digest, "No queue for digest"),
        }
    }

    service
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received shutdown signal");
        })
        .await
        .context("HTTP server failed")?;

    // Graceful shutdown
    broker.close();
    if let Some(listener) = listener {
        join_listener("response", listener).await;
    }
    for handle in digest_listeners {
        join_listener("digest", handle).await;
    }
    info!(pending = service.table().pending_count(), "CW node stopped");

    Ok(())
}

/// Wait for a listener task; returns false if it panicked or was cancelled.
async fn join_listener(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(listener = name, error = %e, "Listener ended abnormally");
            false
        }
    }
}
