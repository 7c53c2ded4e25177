//! Domain types for the exchange.
//!
//! Configuration, errors, call identity and the correlation table itself.
//! Nothing in here performs I/O.

pub mod call_id;
pub mod config;
pub mod error;
pub mod keys;
pub mod pending;

// Re-exports for convenience
pub use call_id::CallId;
pub use config::{ConfigError, ExchangeConfig, HttpConfig, DEFAULT_CALL_TIMEOUT};
pub use error::{CallResult, ExchangeError, ServiceError};
pub use keys::{deal_key, singleton_key, user_key};
pub use pending::{
    CallFields, CallPredicate, CorrelationTable, PendingCall, PendingReply, PendingStats,
};
