//! Digest listener: feeds one fanout digest queue to its handler.

use crate::ports::{DigestAck, DigestHandler};
use cw_bus::{BrokerTransport, DeliveryReceiver, Digest, TransportError};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Consumes one digest queue until it closes.
pub struct DigestListener {
    digest: Digest,
    handler: Arc<dyn DigestHandler>,
    receiver: Arc<dyn DeliveryReceiver>,
    transport: Arc<dyn BrokerTransport>,
    no_ack: bool,
}

impl DigestListener {
    pub fn new(
        digest: Digest,
        handler: Arc<dyn DigestHandler>,
        receiver: Arc<dyn DeliveryReceiver>,
        transport: Arc<dyn BrokerTransport>,
        no_ack: bool,
    ) -> Self {
        Self {
            digest,
            handler,
            receiver,
            transport,
            no_ack,
        }
    }

    /// Run the listener loop
    pub async fn run(self) {
        info!(digest = %self.digest, no_ack = self.no_ack, "Digest listener started");
        loop {
            match self.receiver.receive().await {
                Ok(delivery) => {
                    let ack = (!self.no_ack)
                        .then(|| DigestAck::new(Arc::clone(&self.transport), delivery.delivery_tag));
                    self.handler.handle(self.digest, delivery, ack).await;
                }
                Err(TransportError::ChannelClosed) => {
                    warn!(digest = %self.digest, "Digest channel closed, stopping listener");
                    break;
                }
                Err(e) => {
                    error!(digest = %self.digest, error = %e, "Error receiving digest");
                }
            }
        }
    }
}
