//! # CW Bus - Broker Vocabulary and Transport Seam
//!
//! Everything the exchange needs to talk to a one-way publish/subscribe
//! broker, without depending on any particular broker client.
//!
//! ## Message Flow
//!
//! ```text
//! ┌──────────────┐   publish()    ┌──────────────┐
//! │   Exchange   │ ─────────────→ │  <app>_o     │
//! │              │                │              │   Broker
//! │              │ ←───────────── │  <app>_i     │
//! └──────────────┘   receive()    └──────────────┘
//!        │                               ↑
//!        └─────────── ack(tag) ──────────┘
//! ```
//!
//! The broker has no request/reply semantics: every inbound message is an
//! unsolicited event, correlated back to a call by the exchange.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod envelope;
pub mod memory;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use envelope::{Delivery, Digest, InboundEnvelope, OutboundEnvelope, QueueNames};
pub use memory::{InMemoryBroker, InMemoryQueue};
pub use protocol::{Action, CorrelationScope, ResultCode, SystemicFault};
pub use transport::{BrokerTransport, DeliveryReceiver, TransportError};
