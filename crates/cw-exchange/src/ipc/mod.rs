//! Broker-facing side of the exchange.
//!
//! - [`CallGateway`]: registers calls and publishes their envelopes
//! - [`Dispatcher`]: settles calls from inbound envelopes
//! - [`ResponseListener`]: feeds deliveries to the dispatcher, one at a time
//! - [`DigestListener`]: feeds one fanout digest to its handler

pub mod digest;
pub mod dispatcher;
pub mod gateway;

pub use digest::DigestListener;
pub use dispatcher::{DispatchOutcome, Dispatcher, ResponseListener};
pub use gateway::{CallGateway, CallSpec, WantToBuy};
