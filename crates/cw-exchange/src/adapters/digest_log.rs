//! Default digest consumer: log each delivery and acknowledge it.

use crate::ports::{DigestAck, DigestHandler};
use async_trait::async_trait;
use cw_bus::{Delivery, Digest};
use tracing::{debug, warn};

/// Logs every digest delivery at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDigestHandler;

#[async_trait]
impl DigestHandler for LogDigestHandler {
    async fn handle(&self, digest: Digest, delivery: Delivery, ack: Option<DigestAck>) {
        debug!(
            digest = %digest,
            delivery_tag = delivery.delivery_tag,
            body = %String::from_utf8_lossy(&delivery.body),
            "Consumed digest"
        );

        if let Some(ack) = ack {
            if let Err(e) = ack.ack().await {
                warn!(digest = %digest, delivery_tag = delivery.delivery_tag, error = %e, "Digest ack failed");
            }
        }
    }
}
