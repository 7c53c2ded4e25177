//! Adapters for the exchange.
//!
//! In-memory implementations of the outbound ports, and the default
//! digest consumer.

pub mod catalog;
pub mod digest_log;
pub mod token_store;

pub use catalog::StaticItemCatalog;
pub use digest_log::LogDigestHandler;
pub use token_store::InMemoryTokenStore;
