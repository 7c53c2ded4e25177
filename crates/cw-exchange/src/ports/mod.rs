//! Ports for the exchange.
//!
//! Narrow interfaces to the collaborators the core consumes but does not own.

pub mod inbound;
pub mod outbound;

pub use inbound::{DigestAck, DigestHandler};
pub use outbound::{ItemCatalog, TokenStore};
