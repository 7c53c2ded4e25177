//! Inbound ports for the exchange.
//!
//! Fanout digests are not correlated with any call; each delivery is
//! handed to a [`DigestHandler`] as is.

use async_trait::async_trait;
use cw_bus::{BrokerTransport, Delivery, Digest, TransportError};
use std::fmt;
use std::sync::Arc;

/// Consumer of one or more fanout digests.
#[async_trait]
pub trait DigestHandler: Send + Sync {
    /// Handle one digest delivery.
    ///
    /// `ack` is `None` when the exchange runs with `no_ack`. Otherwise the
    /// delivery stays unacknowledged until the handler calls [`DigestAck::ack`].
    async fn handle(&self, digest: Digest, delivery: Delivery, ack: Option<DigestAck>);
}

/// Acknowledges one digest delivery.
pub struct DigestAck {
    transport: Arc<dyn BrokerTransport>,
    delivery_tag: u64,
}

impl DigestAck {
    pub fn new(transport: Arc<dyn BrokerTransport>, delivery_tag: u64) -> Self {
        Self {
            transport,
            delivery_tag,
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub async fn ack(self) -> Result<(), TransportError> {
        self.transport.ack(self.delivery_tag).await
    }
}

impl fmt::Debug for DigestAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAck")
            .field("delivery_tag", &self.delivery_tag)
            .finish()
    }
}
