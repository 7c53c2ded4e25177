//! # Transport Ports
//!
//! The two seams between the exchange and a broker client: publishing and
//! acknowledging on one side, consuming deliveries on the other.

use crate::envelope::{Delivery, OutboundEnvelope};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a broker transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection or delivery stream is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// The broker client refused the publish.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The broker client refused the acknowledgement.
    #[error("ack failed: {0}")]
    AckFailed(String),

    /// The envelope could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Encode(e.to_string())
    }
}

/// Outbound side of the broker connection.
///
/// One instance is shared by every in-flight call.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Publish one envelope to the outbound queue. Fire-and-forget: success
    /// only means the broker client accepted the message.
    async fn publish(&self, envelope: &OutboundEnvelope) -> Result<(), TransportError>;

    /// Acknowledge an inbound delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError>;
}

/// Inbound side of the broker connection.
#[async_trait]
pub trait DeliveryReceiver: Send + Sync {
    /// Wait for the next delivery, in broker order.
    ///
    /// Returns `TransportError::ChannelClosed` once the stream has ended.
    async fn receive(&self) -> Result<Delivery, TransportError>;
}
