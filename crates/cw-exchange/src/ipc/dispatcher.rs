//! Dispatcher: the response side of the bridge.
//!
//! Turns each inbound envelope into zero or more settlements, then acks it.
//! Systemic faults are classified by result code first; only messages that
//! are not faults reach per-action dispatch.

use crate::domain::{
    deal_key, singleton_key, user_key, CallPredicate, CallResult, CorrelationTable,
    ExchangeError,
};
use crate::ports::ItemCatalog;
use cw_bus::{
    Action, BrokerTransport, CorrelationScope, Delivery, DeliveryReceiver, InboundEnvelope,
    ResultCode, SystemicFault, TransportError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one inbound envelope did to the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Calls removed from the table
    pub matched: usize,
    /// Of those, calls resolved with a value
    pub resolved: usize,
    /// Of those, calls rejected
    pub rejected: usize,
    /// Result code, when it was handled as a systemic fault
    pub fault: Option<ResultCode>,
}

impl DispatchOutcome {
    fn settled(count: usize, outcome: &CallResult) -> Self {
        let (resolved, rejected) = if outcome.is_ok() { (count, 0) } else { (0, count) };
        Self {
            matched: count,
            resolved,
            rejected,
            fault: None,
        }
    }

    fn with_fault(mut self, code: &ResultCode) -> Self {
        self.fault = Some(code.clone());
        self
    }
}

/// Matches broker responses to pending calls.
pub struct Dispatcher {
    table: Arc<CorrelationTable>,
    catalog: Arc<dyn ItemCatalog>,
    transport: Arc<dyn BrokerTransport>,
}

impl Dispatcher {
    pub fn new(
        table: Arc<CorrelationTable>,
        catalog: Arc<dyn ItemCatalog>,
        transport: Arc<dyn BrokerTransport>,
    ) -> Self {
        Self {
            table,
            catalog,
            transport,
        }
    }

    /// Decode, dispatch and acknowledge one delivery.
    ///
    /// The delivery is acked whether or not it decoded or matched anything;
    /// nothing is ever requeued. Returns `None` for undecodable bodies.
    pub async fn handle(&self, delivery: Delivery) -> Option<DispatchOutcome> {
        let outcome = match InboundEnvelope::from_slice(&delivery.body) {
            Ok(envelope) => Some(self.dispatch(&envelope)),
            Err(e) => {
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Dropping undecodable delivery"
                );
                None
            }
        };

        if let Err(e) = self.transport.ack(delivery.delivery_tag).await {
            warn!(delivery_tag = delivery.delivery_tag, error = %e, "Ack failed");
        }

        outcome
    }

    /// Apply one decoded envelope to the table.
    pub fn dispatch(&self, envelope: &InboundEnvelope) -> DispatchOutcome {
        debug!(
            action = %envelope.action,
            result = %envelope.result,
            user_id = ?envelope.user_id(),
            "Dispatching inbound envelope"
        );

        let outcome = match envelope.result.systemic_fault() {
            Some(fault) => self.dispatch_fault(envelope, fault),
            None => self.dispatch_action(envelope),
        };

        if outcome.matched == 0 && outcome.fault.is_none() {
            warn!(
                action = %envelope.action,
                result = %envelope.result,
                "No pending call matched response"
            );
        }
        outcome
    }

    fn dispatch_fault(&self, envelope: &InboundEnvelope, fault: SystemicFault) -> DispatchOutcome {
        let action = &envelope.action;
        let code = &envelope.result;
        let rejection: CallResult = Err(ExchangeError::rejected(code.clone()));

        let outcome = match fault {
            SystemicFault::ScopedToKey => match envelope.user_id() {
                Some(user_id) => self.settle_key(action, &user_key(user_id), &rejection),
                None => missing_scope(action, code, "userId"),
            },
            SystemicFault::ScopedToUser => match envelope.user_id() {
                Some(user_id) => {
                    self.settle_matching(action, &CallPredicate::user(user_id), &rejection)
                }
                None => missing_scope(action, code, "userId"),
            },
            SystemicFault::ScopedToToken => match envelope.token() {
                Some(token) => self.settle_matching(action, &CallPredicate::token(token), &rejection),
                None => missing_scope(action, code, "token"),
            },
            SystemicFault::Broadcast => self.settle_matching(action, &CallPredicate::any(), &rejection),
            SystemicFault::NotRegistered => {
                let status: CallResult = Ok(json!({ "status": code.as_str() }));
                self.settle_matching(action, &CallPredicate::any(), &status)
            }
            SystemicFault::LogOnly => {
                warn!(action = %action, payload = %envelope.payload, "Broker reported BadFormat");
                DispatchOutcome::default()
            }
        };

        debug!(
            action = %action,
            result = %code,
            fault = ?fault,
            matched = outcome.matched,
            "Applied systemic fault"
        );
        outcome.with_fault(code)
    }

    fn dispatch_action(&self, envelope: &InboundEnvelope) -> DispatchOutcome {
        let action = &envelope.action;

        match action.scope() {
            CorrelationScope::Singleton => {
                self.settle_key(action, &singleton_key(action), &response_outcome(envelope))
            }
            CorrelationScope::User => {
                let Some(user_id) = envelope.user_id() else {
                    debug!(action = %action, "Response without userId");
                    return DispatchOutcome::default();
                };
                let outcome = if action.is_confirmation() {
                    confirmation_outcome(envelope, user_id)
                } else {
                    response_outcome(envelope)
                };
                self.settle_key(action, &user_key(user_id), &outcome)
            }
            CorrelationScope::Deal => self.dispatch_deal(envelope),
            CorrelationScope::Uncorrelated => {
                debug!(action = %action, "Ignoring response to unknown action");
                DispatchOutcome::default()
            }
        }
    }

    fn dispatch_deal(&self, envelope: &InboundEnvelope) -> DispatchOutcome {
        let payload = &envelope.payload;
        let item_name = payload.get("itemName").and_then(Value::as_str);
        let quantity = payload.get("quantity").and_then(as_quantity);

        let (Some(user_id), Some(item_name), Some(quantity)) =
            (envelope.user_id(), item_name, quantity)
        else {
            debug!(payload = %payload, "Deal response without userId, itemName or quantity");
            return DispatchOutcome::default();
        };

        let Some(item_code) = self.catalog.code_for_item_name(item_name) else {
            warn!(item_name = item_name, "Deal response for unknown item");
            return DispatchOutcome::default();
        };

        let domain_key = deal_key(user_id, item_code, quantity);
        self.settle_key(&envelope.action, &domain_key, &response_outcome(envelope))
    }

    fn settle_key(&self, action: &Action, domain_key: &str, outcome: &CallResult) -> DispatchOutcome {
        let count = self.table.complete_by_key(action, domain_key, outcome);
        DispatchOutcome::settled(count, outcome)
    }

    fn settle_matching(
        &self,
        action: &Action,
        predicate: &CallPredicate,
        outcome: &CallResult,
    ) -> DispatchOutcome {
        let count = self.table.complete_by_predicate(action, predicate, outcome);
        DispatchOutcome::settled(count, outcome)
    }
}

/// Resolve with the payload on `Ok`, otherwise reject with code and payload.
fn response_outcome(envelope: &InboundEnvelope) -> CallResult {
    if envelope.result.is_ok() {
        Ok(envelope.payload.clone())
    } else {
        Err(ExchangeError::rejected_with(
            envelope.result.clone(),
            envelope.payload.clone(),
        ))
    }
}

/// Success is the presence of a uuid, not the result code.
fn confirmation_outcome(envelope: &InboundEnvelope, user_id: i64) -> CallResult {
    match envelope.uuid() {
        Some(uuid) => Ok(json!({ "uuid": uuid, "userId": user_id })),
        None => Err(ExchangeError::rejected_with(
            envelope.result.clone(),
            envelope.payload.clone(),
        )),
    }
}

fn as_quantity(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|q| u32::try_from(q).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn missing_scope(action: &Action, code: &ResultCode, field: &str) -> DispatchOutcome {
    warn!(
        action = %action,
        result = %code,
        field = field,
        "Fault without its scoping field, nothing rejected"
    );
    DispatchOutcome::default()
}

/// Single consumer of the inbound queue.
pub struct ResponseListener {
    dispatcher: Arc<Dispatcher>,
    receiver: Arc<dyn DeliveryReceiver>,
}

impl ResponseListener {
    pub fn new(dispatcher: Arc<Dispatcher>, receiver: Arc<dyn DeliveryReceiver>) -> Self {
        Self {
            dispatcher,
            receiver,
        }
    }

    /// Run the listener loop
    pub async fn run(self) {
        info!("Response listener started");
        loop {
            match self.receiver.receive().await {
                Ok(delivery) => {
                    self.dispatcher.handle(delivery).await;
                }
                Err(TransportError::ChannelClosed) => {
                    warn!("Inbound channel closed, stopping listener");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Error receiving delivery");
                }
            }
        }
    }
}
