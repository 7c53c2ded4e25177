//! Exchange service - main entry point.
//!
//! Built once at process start and handed to whatever needs it; there is
//! no global exchange instance.

use crate::adapters::{LogDigestHandler, StaticItemCatalog};
use crate::domain::{CorrelationTable, ExchangeConfig, ServiceError};
use crate::ipc::{CallGateway, DigestListener, Dispatcher, ResponseListener};
use crate::ports::{DigestHandler, ItemCatalog, TokenStore};
use crate::router::{build_router, AppState};
use axum::Router;
use cw_bus::{BrokerTransport, DeliveryReceiver, Digest, QueueNames};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Wires the correlation table, gateway, dispatcher and HTTP surface.
pub struct ExchangeService {
    config: ExchangeConfig,
    table: Arc<CorrelationTable>,
    gateway: Arc<CallGateway>,
    dispatcher: Arc<Dispatcher>,
    tokens: Arc<dyn TokenStore>,
    transport: Arc<dyn BrokerTransport>,
}

impl ExchangeService {
    /// Create a new exchange service
    pub fn new(
        config: ExchangeConfig,
        transport: Arc<dyn BrokerTransport>,
        catalog: Arc<dyn ItemCatalog>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        let table = Arc::new(CorrelationTable::new());

        let gateway = Arc::new(CallGateway::new(
            Arc::clone(&table),
            Arc::clone(&transport),
            config.timeout,
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&table),
            catalog,
            Arc::clone(&transport),
        ));

        Ok(Self {
            config,
            table,
            gateway,
            dispatcher,
            tokens,
            transport,
        })
    }

    /// Service with the built-in item catalog.
    pub fn with_defaults(
        config: ExchangeConfig,
        transport: Arc<dyn BrokerTransport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ServiceError> {
        Self::new(config, transport, Arc::new(StaticItemCatalog::new()), tokens)
    }

    /// Spawn the response listener on `receiver`.
    ///
    /// Returns `None` when the configuration does not bind the inbound queue.
    pub fn start(&self, receiver: Arc<dyn DeliveryReceiver>) -> Option<JoinHandle<()>> {
        let queues = QueueNames::new(&self.config.app_name);
        if !self.config.bind_io {
            info!(queue = %queues.inbound(), "Inbound queue not bound, listener not started");
            return None;
        }

        info!(
            exchange = %queues.exchange(),
            inbound = %queues.inbound(),
            outbound = %queues.outbound(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Starting exchange"
        );

        let listener = ResponseListener::new(Arc::clone(&self.dispatcher), receiver);
        Some(tokio::spawn(listener.run()))
    }

    /// Spawn a listener feeding `digest` deliveries from `receiver` to
    /// `handler`, or to [`LogDigestHandler`] when no handler is given.
    ///
    /// Digest subscriptions do not depend on `bind_io`.
    pub fn subscribe_digest(
        &self,
        digest: Digest,
        receiver: Arc<dyn DeliveryReceiver>,
        handler: Option<Arc<dyn DigestHandler>>,
    ) -> JoinHandle<()> {
        let queues = QueueNames::new(&self.config.app_name);
        info!(queue = %queues.digest(digest), custom_handler = handler.is_some(), "Subscribing to digest");

        let handler = handler.unwrap_or_else(|| Arc::new(LogDigestHandler));
        let listener = DigestListener::new(
            digest,
            handler,
            receiver,
            Arc::clone(&self.transport),
            self.config.no_ack,
        );
        tokio::spawn(listener.run())
    }

    /// Serve the HTTP surface until `shutdown` completes.
    pub async fn serve<F>(&self, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.config.http.enabled {
            info!("HTTP server disabled");
            shutdown.await;
            return Ok(());
        }

        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::Bind(format!("{}: {}", addr, e)))?;
        info!(addr = %addr, "Starting HTTP server");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server error");
                ServiceError::Internal(e.to_string())
            })?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        build_router(AppState {
            gateway: Arc::clone(&self.gateway),
            tokens: Arc::clone(&self.tokens),
            table: Arc::clone(&self.table),
        })
    }

    pub fn gateway(&self) -> Arc<CallGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn table(&self) -> Arc<CorrelationTable> {
        Arc::clone(&self.table)
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }
}
