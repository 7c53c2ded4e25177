//! # In-Memory Broker
//!
//! Loopback implementation of both transport ports.
//!
//! Published envelopes are recorded instead of being sent anywhere, and
//! inbound traffic is injected with [`InMemoryBroker::deliver`] (responses)
//! or [`InMemoryBroker::deliver_digest`] (fanout digests). Suitable for
//! tests and for running the exchange without an external broker.

use crate::envelope::{Delivery, Digest, OutboundEnvelope, QueueNames};
use crate::transport::{BrokerTransport, DeliveryReceiver, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Hook answering a publish with an inbound message body.
pub type Responder = Box<dyn Fn(&OutboundEnvelope) -> Option<Value> + Send + Sync>;

/// One consumable queue.
pub struct InMemoryQueue {
    name: String,
    /// `None` once closed.
    tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
}

impl InMemoryQueue {
    fn new(name: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, delivery: Delivery) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        if tx.send(delivery).is_err() {
            warn!(queue = %self.name, "Delivery dropped (no consumer)");
            return false;
        }
        true
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[async_trait]
impl DeliveryReceiver for InMemoryQueue {
    async fn receive(&self) -> Result<Delivery, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ChannelClosed)
    }
}

/// In-memory broker with an outbound log, an inbound queue and one queue
/// per fanout digest.
pub struct InMemoryBroker {
    /// Queue names this broker pretends to serve.
    queues: QueueNames,

    /// Envelopes published and not yet taken.
    published: Mutex<Vec<OutboundEnvelope>>,

    /// Delivery tags acknowledged so far, across all queues.
    acked: Mutex<Vec<u64>>,

    inbound: InMemoryQueue,
    digests: HashMap<Digest, Arc<InMemoryQueue>>,

    /// Optional auto-reply hook.
    responder: RwLock<Option<Responder>>,

    /// Delivery tags are unique across all queues of the broker.
    next_tag: AtomicU64,
    publishes: AtomicU64,
    fail_publishes: AtomicBool,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new(app_name: impl Into<String>) -> Self {
        let queues = QueueNames::new(app_name);
        let digests = Digest::ALL
            .into_iter()
            .map(|digest| (digest, Arc::new(InMemoryQueue::new(queues.digest(digest)))))
            .collect();
        Self {
            inbound: InMemoryQueue::new(queues.inbound()),
            digests,
            queues,
            published: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
            responder: RwLock::new(None),
            next_tag: AtomicU64::new(1),
            publishes: AtomicU64::new(0),
            fail_publishes: AtomicBool::new(false),
        }
    }

    pub fn queues(&self) -> &QueueNames {
        &self.queues
    }

    /// Inject an inbound message. Returns its delivery tag, or `None` when
    /// the inbound queue has been closed.
    pub fn deliver(&self, body: impl Into<Vec<u8>>) -> Option<u64> {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        if !self.inbound.push(Delivery::new(tag, body)) {
            return None;
        }
        debug!(queue = %self.inbound.name(), delivery_tag = tag, "Delivered inbound message");
        Some(tag)
    }

    /// Inject an inbound JSON message.
    pub fn deliver_json(&self, body: &Value) -> Option<u64> {
        self.deliver(body.to_string())
    }

    /// Publish a message on a fanout digest queue.
    pub fn deliver_digest(&self, digest: Digest, body: impl Into<Vec<u8>>) -> Option<u64> {
        let queue = self.digests.get(&digest)?;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        if !queue.push(Delivery::new(tag, body)) {
            return None;
        }
        debug!(queue = %queue.name(), delivery_tag = tag, "Delivered digest message");
        Some(tag)
    }

    /// Consumer side of a digest queue.
    pub fn digest_queue(&self, digest: Digest) -> Option<Arc<InMemoryQueue>> {
        self.digests.get(&digest).cloned()
    }

    /// Close every queue; consumers see `ChannelClosed` once drained.
    pub fn close(&self) {
        self.inbound.close();
        for queue in self.digests.values() {
            queue.close();
        }
    }

    /// Answer every subsequent publish with whatever `responder` returns.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&OutboundEnvelope) -> Option<Value> + Send + Sync + 'static,
    {
        *self.responder.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Box::new(responder));
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::Relaxed);
    }

    /// Drain the envelopes published so far.
    pub fn take_published(&self) -> Vec<OutboundEnvelope> {
        std::mem::take(&mut *self.published.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Total successful publishes since creation.
    pub fn published_count(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }

    /// Delivery tags acknowledged so far, in ack order.
    pub fn acked(&self) -> Vec<u64> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn publish(&self, envelope: &OutboundEnvelope) -> Result<(), TransportError> {
        if self.fail_publishes.load(Ordering::Relaxed) {
            warn!(action = %envelope.action, "Publish rejected by broker");
            return Err(TransportError::PublishFailed(format!(
                "{} refused {}",
                self.queues.exchange(),
                envelope.action
            )));
        }

        // Same encoding a real client would put on the wire.
        envelope.to_bytes()?;

        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());
        self.publishes.fetch_add(1, Ordering::Relaxed);

        debug!(
            queue = %self.queues.outbound(),
            action = %envelope.action,
            "Envelope published"
        );

        let reply = {
            let responder = self.responder.read().unwrap_or_else(PoisonError::into_inner);
            responder.as_ref().and_then(|respond| respond(envelope))
        };
        if let Some(reply) = reply {
            self.deliver_json(&reply);
        }

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delivery_tag);
        Ok(())
    }
}

#[async_trait]
impl DeliveryReceiver for InMemoryBroker {
    async fn receive(&self) -> Result<Delivery, TransportError> {
        self.inbound.receive().await
    }
}
