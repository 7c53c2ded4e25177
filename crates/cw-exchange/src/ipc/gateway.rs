//! Call gateway: the request side of the bridge.
//!
//! Every protocol operation follows the same template:
//! register in the correlation table, arm the timeout, then publish.
//! Registering first means a response dispatched before `publish`
//! returns still finds its call.

use crate::domain::{
    deal_key, singleton_key, user_key, CallFields, CallId, CallResult, CorrelationTable,
    ExchangeError, PendingCall, PendingReply,
};
use cw_bus::{Action, BrokerTransport, OutboundEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// One correlated call: what to publish and where to file it.
#[derive(Debug, Clone)]
pub struct CallSpec {
    envelope: OutboundEnvelope,
    domain_key: String,
    fields: CallFields,
    timeout: Option<Duration>,
}

impl CallSpec {
    /// Call filed under an explicit domain key.
    pub fn keyed(domain_key: impl Into<String>, envelope: OutboundEnvelope) -> Self {
        let fields = CallFields::new(envelope.user_id, envelope.token.as_deref());
        Self {
            envelope,
            domain_key: domain_key.into(),
            fields,
            timeout: None,
        }
    }

    /// Call filed under the action's own name.
    pub fn singleton(envelope: OutboundEnvelope) -> Self {
        let domain_key = singleton_key(&envelope.action);
        Self::keyed(domain_key, envelope)
    }

    /// Call filed under a user id. The user id is recorded for predicate
    /// matching even when the envelope only carries it in its payload.
    pub fn for_user(user_id: i64, envelope: OutboundEnvelope) -> Self {
        Self::keyed(user_key(user_id), envelope).with_user(user_id)
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.fields.user_id = Some(user_id);
        self
    }

    /// Override the gateway's default timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn action(&self) -> &Action {
        &self.envelope.action
    }

    pub fn domain_key(&self) -> &str {
        &self.domain_key
    }

    pub fn envelope(&self) -> &OutboundEnvelope {
        &self.envelope
    }
}

/// Buy order parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WantToBuy {
    pub item_code: String,
    pub quantity: u32,
    pub price: u32,
    #[serde(default = "exact_price_default")]
    pub exact_price: bool,
}

fn exact_price_default() -> bool {
    true
}

impl WantToBuy {
    pub fn new(item_code: impl Into<String>, quantity: u32, price: u32) -> Self {
        Self {
            item_code: item_code.into(),
            quantity,
            price,
            exact_price: true,
        }
    }

    /// Allow the broker to fill at a better price than `price`.
    pub fn inexact(mut self) -> Self {
        self.exact_price = false;
        self
    }
}

/// Turns protocol operations into correlated broker calls.
pub struct CallGateway {
    table: Arc<CorrelationTable>,
    transport: Arc<dyn BrokerTransport>,
    default_timeout: Duration,
}

impl CallGateway {
    pub fn new(
        table: Arc<CorrelationTable>,
        transport: Arc<dyn BrokerTransport>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            table,
            transport,
            default_timeout,
        }
    }

    /// Issue a call and wait for its outcome.
    pub async fn call(&self, spec: CallSpec) -> CallResult {
        self.submit(spec).await.await
    }

    /// Register, arm and publish a call; return the still-pending reply.
    ///
    /// A publish failure settles the reply with `ExchangeError::Transport`
    /// before this returns.
    pub async fn submit(&self, spec: CallSpec) -> PendingReply {
        let CallSpec {
            envelope,
            domain_key,
            fields,
            timeout,
        } = spec;
        let action = envelope.action.clone();
        let timeout = timeout.unwrap_or(self.default_timeout);

        let (call, reply) = PendingCall::new(action.clone(), domain_key.clone(), fields);
        let call_id = self.table.push(call);
        self.arm_timeout(&action, &domain_key, call_id, timeout);

        match self.transport.publish(&envelope).await {
            Ok(()) => {
                debug!(
                    action = %action,
                    domain_key = %domain_key,
                    call_id = %call_id,
                    "Published call"
                );
            }
            Err(e) => {
                warn!(
                    action = %action,
                    call_id = %call_id,
                    error = %e,
                    "Publish failed"
                );
                self.table
                    .complete_by_call_id(&action, call_id, Err(ExchangeError::Transport(e)));
            }
        }

        reply
    }

    fn arm_timeout(&self, action: &Action, domain_key: &str, call_id: CallId, timeout: Duration) {
        let table = Arc::clone(&self.table);
        let alarm_action = action.clone();

        let alarm = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if table.complete_by_call_id(&alarm_action, call_id, Err(ExchangeError::TimedOut)) {
                warn!(
                    action = %alarm_action,
                    call_id = %call_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Call timed out"
                );
            }
        });

        self.table
            .attach_timer(action, domain_key, call_id, alarm.abort_handle());
    }

    /// Request an auth code to be sent to the user.
    #[instrument(skip(self))]
    pub async fn send_auth(&self, user_id: i64) -> CallResult {
        let envelope = OutboundEnvelope::new(Action::CreateAuthCode)
            .with_payload(json!({ "userId": user_id }));
        self.call(CallSpec::for_user(user_id, envelope)).await
    }

    /// Exchange an auth code for a token.
    #[instrument(skip(self, auth_code))]
    pub async fn grant_token(&self, user_id: i64, auth_code: &str) -> CallResult {
        let envelope = OutboundEnvelope::new(Action::GrantToken)
            .with_payload(json!({ "userId": user_id, "authCode": auth_code }));
        self.call(CallSpec::for_user(user_id, envelope)).await
    }

    /// Ask the user to authorize an additional operation.
    #[instrument(skip(self, token))]
    pub async fn auth_additional_operation(
        &self,
        user_id: i64,
        operation: &str,
        token: &str,
    ) -> CallResult {
        let envelope = OutboundEnvelope::new(Action::AuthAdditionalOperation)
            .with_token(token)
            .with_payload(json!({ "operation": operation }));
        self.call(CallSpec::for_user(user_id, envelope)).await
    }

    /// Confirm an additional operation with the code the user received.
    #[instrument(skip(self, auth_code, token))]
    pub async fn grant_additional_operation(
        &self,
        user_id: i64,
        request_id: &str,
        auth_code: &str,
        token: &str,
    ) -> CallResult {
        let envelope = OutboundEnvelope::new(Action::GrantAdditionalOperation)
            .with_token(token)
            .with_payload(json!({ "requestId": request_id, "authCode": auth_code }));
        self.call(CallSpec::for_user(user_id, envelope)).await
    }

    /// Application info (balance, pending operations).
    #[instrument(skip(self))]
    pub async fn get_info(&self) -> CallResult {
        self.call(CallSpec::singleton(OutboundEnvelope::new(Action::GetInfo)))
            .await
    }

    #[instrument(skip(self, token))]
    pub async fn guild_info(&self, user_id: i64, token: Option<&str>) -> CallResult {
        self.protected(Action::GuildInfo, user_id, token).await
    }

    #[instrument(skip(self, token))]
    pub async fn craft_book(&self, user_id: i64, token: Option<&str>) -> CallResult {
        self.protected(Action::ViewCraftbook, user_id, token).await
    }

    #[instrument(skip(self, token))]
    pub async fn gear_info(&self, user_id: i64, token: Option<&str>) -> CallResult {
        self.protected(Action::RequestGearInfo, user_id, token).await
    }

    #[instrument(skip(self, token))]
    pub async fn request_stock(&self, user_id: i64, token: Option<&str>) -> CallResult {
        self.protected(Action::RequestStock, user_id, token).await
    }

    #[instrument(skip(self, token))]
    pub async fn request_profile(&self, user_id: i64, token: Option<&str>) -> CallResult {
        self.protected(Action::RequestProfile, user_id, token).await
    }

    /// Place a buy order and wait for the deal (or its failure).
    #[instrument(skip(self, token))]
    pub async fn want_to_buy(
        &self,
        user_id: i64,
        order: &WantToBuy,
        token: Option<&str>,
    ) -> CallResult {
        let token = require_token(&Action::WantToBuy, token)?;
        let envelope = OutboundEnvelope::new(Action::WantToBuy)
            .with_user_id(user_id)
            .with_token(token)
            .with_payload(serde_json::to_value(order).map_err(cw_bus::TransportError::from)?);
        let domain_key = deal_key(user_id, &order.item_code, order.quantity);
        self.call(CallSpec::keyed(domain_key, envelope)).await
    }

    /// Publish a buy order without waiting for, or correlating, the deal.
    #[instrument(skip(self, payload, token))]
    pub async fn want_to_buy_fast(
        &self,
        user_id: i64,
        payload: Value,
        token: Option<&str>,
    ) -> Result<(), ExchangeError> {
        let mut envelope = OutboundEnvelope::new(Action::WantToBuy)
            .with_user_id(user_id)
            .with_payload(payload);
        envelope.token = token.map(str::to_string);

        self.transport.publish(&envelope).await?;
        Ok(())
    }

    async fn protected(&self, action: Action, user_id: i64, token: Option<&str>) -> CallResult {
        let token = require_token(&action, token)?;
        let envelope = OutboundEnvelope::new(action).with_token(token);
        self.call(CallSpec::for_user(user_id, envelope)).await
    }

    /// Number of calls awaiting a response
    pub fn pending_count(&self) -> usize {
        self.table.pending_count()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

fn require_token<'a>(action: &Action, token: Option<&'a str>) -> Result<&'a str, ExchangeError> {
    match token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => {
            debug!(action = %action, "Protected call without token");
            Err(ExchangeError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_bus::{InMemoryBroker, TransportError};

    fn gateway(broker: &Arc<InMemoryBroker>, timeout: Duration) -> (CallGateway, Arc<CorrelationTable>) {
        let table = Arc::new(CorrelationTable::new());
        let gateway = CallGateway::new(Arc::clone(&table), broker.clone(), timeout);
        (gateway, table)
    }

    #[test]
    fn test_call_spec_keys() {
        let spec = CallSpec::singleton(OutboundEnvelope::new(Action::GetInfo));
        assert_eq!(spec.domain_key(), "getInfo");

        let spec = CallSpec::for_user(
            12,
            OutboundEnvelope::new(Action::RequestStock).with_token("tk"),
        );
        assert_eq!(spec.domain_key(), "12");
        assert_eq!(spec.fields, CallFields::new(Some(12), Some("tk")));
    }

    #[test]
    fn test_want_to_buy_wire_shape() {
        let order = WantToBuy::new("08", 5, 3);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(
            json,
            json!({ "itemCode": "08", "quantity": 5, "price": 3, "exactPrice": true })
        );

        let parsed: WantToBuy =
            serde_json::from_value(json!({ "itemCode": "01", "quantity": 1, "price": 9 }))
                .unwrap();
        assert!(parsed.exact_price);
        assert!(!parsed.inexact().exact_price);
    }

    #[tokio::test]
    async fn test_protected_call_without_token_never_publishes() {
        let broker = Arc::new(InMemoryBroker::new("test"));
        let (gateway, table) = gateway(&broker, Duration::from_secs(1));

        assert_eq!(gateway.request_profile(1, None).await, Err(ExchangeError::Unauthorized));
        assert_eq!(gateway.guild_info(1, Some("")).await, Err(ExchangeError::Unauthorized));
        assert_eq!(
            gateway.want_to_buy(1, &WantToBuy::new("08", 1, 1), None).await,
            Err(ExchangeError::Unauthorized)
        );

        assert_eq!(broker.published_count(), 0);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_rejects_and_unregisters() {
        let broker = Arc::new(InMemoryBroker::new("test"));
        broker.fail_publishes(true);
        let (gateway, table) = gateway(&broker, Duration::from_secs(1));

        let result = gateway.send_auth(5).await;

        assert!(matches!(
            result,
            Err(ExchangeError::Transport(TransportError::PublishFailed(_)))
        ));
        assert_eq!(table.pending_count(), 0);
        assert_eq!(
            table.stats().transport_failed.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_and_unregisters() {
        let broker = Arc::new(InMemoryBroker::new("test"));
        let (gateway, table) = gateway(&broker, Duration::from_millis(5000));

        let result = gateway.get_info().await;

        assert_eq!(result, Err(ExchangeError::TimedOut));
        assert_eq!(table.pending_count(), 0);
        assert_eq!(broker.published_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout_override() {
        let broker = Arc::new(InMemoryBroker::new("test"));
        let (gateway, _table) = gateway(&broker, Duration::from_secs(3600));

        let started = tokio::time::Instant::now();
        let spec = CallSpec::singleton(OutboundEnvelope::new(Action::GetInfo))
            .with_timeout(Duration::from_millis(50));
        assert_eq!(gateway.call(spec).await, Err(ExchangeError::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_want_to_buy_envelope() {
        let broker = Arc::new(InMemoryBroker::new("test"));
        let (gateway, table) = gateway(&broker, Duration::from_secs(1));

        let spec_order = WantToBuy::new("08", 5, 3);
        let reply = {
            let envelope = OutboundEnvelope::new(Action::WantToBuy)
                .with_user_id(42)
                .with_token("tk")
                .with_payload(serde_json::to_value(&spec_order).unwrap());
            gateway
                .submit(CallSpec::keyed(deal_key(42, "08", 5), envelope))
                .await
        };

        assert_eq!(table.pop_by_key(&Action::WantToBuy, "42_08_5").len(), 1);
        drop(reply);

        gateway.want_to_buy_fast(42, json!({ "itemCode": "01" }), Some("tk")).await.unwrap();
        let published = broker.take_published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].user_id, Some(42));
        assert_eq!(published[1].token.as_deref(), Some("tk"));
        assert_eq!(table.pending_count(), 0);
    }
}
