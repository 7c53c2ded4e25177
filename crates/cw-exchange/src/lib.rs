// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! CW Exchange - request/response calls over a one-way broker.
//!
//! The broker only knows fire-and-forget publishes and unsolicited
//! deliveries. This crate turns them back into calls: each call is filed
//! in a correlation table before its envelope is published, and each
//! inbound envelope is matched back to the calls it settles.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          CW EXCHANGE                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   HTTP (/api/auth, /api/token, /api/profile, /api/info)           │
//! │                          │                                        │
//! │   ┌──────────────────────┴───────────────────────┐                │
//! │   │                 CallGateway                   │                │
//! │   │   register → arm timeout → publish            │                │
//! │   └───────────┬──────────────────────┬────────────┘                │
//! │               │                      │                             │
//! │   ┌───────────┴──────────┐           │                             │
//! │   │   CorrelationTable   │           │                             │
//! │   │ action→key→call id   │           │                             │
//! │   └───────────┬──────────┘           │                             │
//! │               │                      │                             │
//! │   ┌───────────┴──────────┐           │                             │
//! │   │      Dispatcher      │           │                             │
//! │   │ faults, then actions │           │                             │
//! │   └───────────┬──────────┘           │                             │
//! └───────────────┼──────────────────────┼────────────────────────────┘
//!                 │ <app>_i              │ <app>_o
//!                 └──────── Broker ──────┘
//! ```
//!
//! Fanout digests (`<app>_deals`, `<app>_offers`, ...) bypass the table:
//! each subscribed digest has its own [`DigestListener`] feeding a
//! [`DigestHandler`], acked unless `no_ack` is set.
//!
//! # Fault handling
//!
//! Some result codes describe the user or token rather than one call:
//! `NoSuchUser` rejects every pending call of its action, `InvalidToken`
//! every call carrying that token, `UserIsBusy`/`BattleIsNear` every call
//! of that user. `InsufficientFunds` and `NoOffersFoundByPrice` only reject
//! the one deal they were reported for.
//!
//! # Usage
//!
//! ```ignore
//! use cw_exchange::{ExchangeConfig, ExchangeService, InMemoryTokenStore};
//! use cw_bus::InMemoryBroker;
//!
//! let broker = Arc::new(InMemoryBroker::new("app"));
//! let service = ExchangeService::with_defaults(
//!     ExchangeConfig::default(),
//!     broker.clone(),
//!     Arc::new(InMemoryTokenStore::new()),
//! )?;
//! service.start(broker);
//! let info = service.gateway().get_info().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ipc;
pub mod ports;
pub mod router;
pub mod service;

// Re-exports for public API
pub use adapters::{InMemoryTokenStore, LogDigestHandler, StaticItemCatalog};
pub use domain::config::{ExchangeConfig, HttpConfig};
pub use domain::error::{CallResult, ExchangeError, ServiceError};
pub use domain::pending::{CallFields, CallPredicate, CorrelationTable, PendingCall, PendingReply};
pub use ipc::{
    CallGateway, CallSpec, DigestListener, DispatchOutcome, Dispatcher, ResponseListener, WantToBuy,
};
pub use ports::{DigestAck, DigestHandler, ItemCatalog, TokenStore};
pub use service::ExchangeService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
