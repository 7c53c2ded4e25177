//! End-to-end correlation tests.
//!
//! Calls go out through the gateway, responses come back through the
//! in-memory broker and the response listener, exactly as in production.

use async_trait::async_trait;
use cw_bus::{
    Action, BrokerTransport, InMemoryBroker, InboundEnvelope, OutboundEnvelope, ResultCode,
    TransportError,
};
use cw_exchange::{
    CallGateway, CallSpec, CorrelationTable, Dispatcher, ExchangeConfig, ExchangeError,
    ExchangeService, InMemoryTokenStore, StaticItemCatalog, WantToBuy,
};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Harness {
    broker: Arc<InMemoryBroker>,
    service: ExchangeService,
    _listener: JoinHandle<()>,
}

impl Harness {
    fn new(timeout: Duration) -> Self {
        let broker = Arc::new(InMemoryBroker::new("test"));
        let config = ExchangeConfig {
            app_name: "test".into(),
            timeout,
            ..Default::default()
        };
        let service = ExchangeService::with_defaults(
            config,
            broker.clone(),
            Arc::new(InMemoryTokenStore::new()),
        )
        .unwrap();
        let listener = service.start(broker.clone()).unwrap();
        Self {
            broker,
            service,
            _listener: listener,
        }
    }

    fn gateway(&self) -> Arc<CallGateway> {
        self.service.gateway()
    }

    fn table(&self) -> Arc<CorrelationTable> {
        self.service.table()
    }

    /// Deliver a response and wait until the listener has acked it.
    async fn respond(&self, body: Value) {
        let tag = self.broker.deliver_json(&body).unwrap();
        while !self.broker.acked().contains(&tag) {
            tokio::task::yield_now().await;
        }
    }
}

fn profile_request(user_id: i64) -> CallSpec {
    CallSpec::for_user(
        user_id,
        OutboundEnvelope::new(Action::RequestProfile).with_token(format!("token-{}", user_id)),
    )
}

#[tokio::test]
async fn test_every_call_settles_once_and_leaves_table() {
    let h = Harness::new(Duration::from_secs(5));
    let gateway = h.gateway();

    let reply = gateway.submit(profile_request(1)).await;
    assert_eq!(h.table().pending_count(), 1);

    h.respond(json!({
        "action": "requestProfile",
        "result": "Ok",
        "payload": { "userId": 1, "profile": { "lvl": 30 } }
    }))
    .await;
    // Duplicate response: nothing left to match
    h.respond(json!({
        "action": "requestProfile",
        "result": "Ok",
        "payload": { "userId": 1, "profile": { "lvl": 31 } }
    }))
    .await;

    assert_eq!(reply.await.unwrap()["profile"]["lvl"], 30);
    assert_eq!(h.table().pending_count(), 0);
    assert_eq!(h.table().stats().resolved.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_concurrent_profiles_resolve_independently() {
    let h = Harness::new(Duration::from_secs(5));
    let gateway = h.gateway();

    let first = gateway.submit(profile_request(1)).await;
    let second = gateway.submit(profile_request(2)).await;

    // Responses arrive in reverse order of the calls
    h.respond(json!({
        "action": "requestProfile",
        "result": "Ok",
        "payload": { "userId": 2, "name": "two" }
    }))
    .await;
    h.respond(json!({
        "action": "requestProfile",
        "result": "Ok",
        "payload": { "userId": 1, "name": "one" }
    }))
    .await;

    assert_eq!(first.await.unwrap()["name"], "one");
    assert_eq!(second.await.unwrap()["name"], "two");
}

#[tokio::test]
async fn test_buy_round_trip() {
    let h = Harness::new(Duration::from_secs(5));
    let gateway = h.gateway();

    let call = tokio::spawn(async move {
        gateway
            .want_to_buy(42, &WantToBuy::new("08", 5, 10), Some("tk"))
            .await
    });

    while h.broker.published_count() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.table().pending_for(&Action::WantToBuy), 1);
    let published = h.broker.take_published();
    assert_eq!(published[0].payload["itemCode"], "08");
    assert_eq!(published[0].user_id, Some(42));

    h.respond(json!({
        "action": "wantToBuy",
        "result": "Ok",
        "payload": { "itemName": "Iron ore", "quantity": 5, "userId": 42 }
    }))
    .await;

    let deal = call.await.unwrap().unwrap();
    assert_eq!(deal["itemName"], "Iron ore");
}

#[tokio::test]
async fn test_no_such_user_broadcasts_within_action() {
    let h = Harness::new(Duration::from_secs(5));
    let gateway = h.gateway();

    let replies = futures::future::join_all((1..=3).map(|user_id| {
        let gateway = Arc::clone(&gateway);
        async move {
            let envelope = OutboundEnvelope::new(Action::GrantToken)
                .with_payload(json!({ "userId": user_id, "authCode": "000" }));
            gateway.submit(CallSpec::for_user(user_id, envelope)).await
        }
    }))
    .await;
    let unrelated = gateway.submit(profile_request(1)).await;

    h.respond(json!({ "action": "grantToken", "result": "NoSuchUser", "payload": {} }))
        .await;

    for reply in replies {
        assert_eq!(reply.await, Err(ExchangeError::rejected(ResultCode::NoSuchUser)));
    }
    assert_eq!(h.table().pending_for(&Action::GrantToken), 0);
    assert_eq!(h.table().pending_for(&Action::RequestProfile), 1);
    drop(unrelated);
}

#[tokio::test]
async fn test_no_offers_scoped_to_one_deal() {
    let h = Harness::new(Duration::from_secs(5));
    let gateway = h.gateway();

    let spec = |code: &str| {
        let order = WantToBuy::new(code, 1, 5);
        CallSpec::keyed(
            cw_exchange::domain::deal_key(7, code, 1),
            OutboundEnvelope::new(Action::WantToBuy)
                .with_user_id(7)
                .with_token("tk")
                .with_payload(serde_json::to_value(order).unwrap()),
        )
    };
    let thread = gateway.submit(spec("01")).await;
    let _stick = gateway.submit(spec("02")).await;

    h.respond(json!({
        "action": "wantToBuy",
        "result": "NoOffersFoundByPrice",
        "payload": { "itemName": "Thread", "quantity": 1, "userId": 7 }
    }))
    .await;

    assert!(matches!(
        thread.await,
        Err(ExchangeError::Rejected { code: ResultCode::NoOffersFoundByPrice, .. })
    ));
    assert_eq!(h.table().pending_for(&Action::WantToBuy), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout_is_ignored() {
    let h = Harness::new(Duration::from_millis(5000));
    let gateway = h.gateway();

    let result = gateway.request_stock(9, Some("tk")).await;
    assert_eq!(result, Err(ExchangeError::TimedOut));
    assert_eq!(h.table().pending_count(), 0);

    h.respond(json!({
        "action": "requestStock",
        "result": "Ok",
        "payload": { "userId": 9, "stock": {} }
    }))
    .await;

    let table = h.table();
    let stats = table.stats();
    assert_eq!(stats.timed_out.load(Ordering::Relaxed), 1);
    assert_eq!(stats.resolved.load(Ordering::Relaxed), 0);
    assert_eq!(h.table().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_response_before_timeout_cancels_alarm() {
    let h = Harness::new(Duration::from_millis(5000));
    let gateway = h.gateway();

    let reply = gateway.submit(profile_request(4)).await;
    tokio::time::sleep(Duration::from_millis(4000)).await;
    h.respond(json!({ "action": "requestProfile", "result": "Ok", "payload": { "userId": 4 } }))
        .await;
    assert!(reply.await.is_ok());

    tokio::time::sleep(Duration::from_millis(10_000)).await;
    assert_eq!(h.table().stats().timed_out.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_unauthorized_call_never_publishes() {
    let h = Harness::new(Duration::from_secs(5));
    let gateway = h.gateway();

    for result in [
        gateway.guild_info(1, None).await,
        gateway.craft_book(1, None).await,
        gateway.gear_info(1, None).await,
        gateway.request_stock(1, None).await,
        gateway.request_profile(1, None).await,
    ] {
        assert_eq!(result, Err(ExchangeError::Unauthorized));
    }

    assert_eq!(h.broker.published_count(), 0);
    assert_eq!(h.table().stats().registered.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_publish_failure_surfaces_to_caller_only() {
    let h = Harness::new(Duration::from_secs(5));
    let gateway = h.gateway();

    let healthy = gateway.submit(profile_request(1)).await;
    h.broker.fail_publishes(true);
    let failed = gateway.submit(profile_request(2)).await;

    assert!(matches!(failed.await, Err(ExchangeError::Transport(_))));
    assert_eq!(h.table().pending_for(&Action::RequestProfile), 1);

    h.broker.fail_publishes(false);
    h.respond(json!({ "action": "requestProfile", "result": "Ok", "payload": { "userId": 1 } }))
        .await;
    assert!(healthy.await.is_ok());
}

#[tokio::test]
async fn test_not_registered_is_a_status() {
    let h = Harness::new(Duration::from_secs(5));
    let broker = Arc::clone(&h.broker);
    broker.set_responder(|envelope| {
        Some(json!({ "action": envelope.action, "result": "NotRegistered", "payload": {} }))
    });

    let info = h.gateway().get_info().await.unwrap();
    assert_eq!(info, json!({ "status": "NotRegistered" }));
}

#[tokio::test]
async fn test_additional_operation_confirmation() {
    let h = Harness::new(Duration::from_secs(5));
    h.broker.set_responder(|envelope| {
        Some(json!({
            "action": envelope.action,
            "result": "Ok",
            "uuid": "op-77",
            "payload": { "userId": 3 }
        }))
    });

    let confirmed = h
        .gateway()
        .auth_additional_operation(3, "GetUserProfile", "tk")
        .await
        .unwrap();
    assert_eq!(confirmed, json!({ "uuid": "op-77", "userId": 3 }));
}

/// Transport that answers a publish by dispatching the reply before
/// `publish` itself returns.
struct SynchronousReplies {
    dispatcher: OnceLock<Arc<Dispatcher>>,
}

#[async_trait]
impl BrokerTransport for SynchronousReplies {
    async fn publish(&self, envelope: &OutboundEnvelope) -> Result<(), TransportError> {
        let reply: InboundEnvelope = serde_json::from_value(json!({
            "action": envelope.action,
            "result": "Ok",
            "payload": { "userId": envelope.payload["userId"], "code": "sent" }
        }))?;
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.dispatch(&reply);
        }
        Ok(())
    }

    async fn ack(&self, _delivery_tag: u64) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_response_dispatched_inside_publish_still_resolves() {
    let table = Arc::new(CorrelationTable::new());
    let transport = Arc::new(SynchronousReplies {
        dispatcher: OnceLock::new(),
    });
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&table),
        Arc::new(StaticItemCatalog::new()),
        Arc::new(InMemoryBroker::new("acks")),
    ));
    assert!(transport.dispatcher.set(dispatcher).is_ok());

    let gateway = CallGateway::new(Arc::clone(&table), transport, Duration::from_secs(5));
    let result = gateway.send_auth(11).await.unwrap();

    assert_eq!(result["code"], "sent");
    assert_eq!(table.pending_count(), 0);
}
