//! # Envelopes
//!
//! JSON message units exchanged with the broker, plus the queue naming
//! convention of the exchange.

use crate::protocol::{Action, ResultCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message published to the outbound queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl OutboundEnvelope {
    /// Envelope with no user id, token or payload.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            user_id: None,
            token: None,
            payload: Value::Null,
        }
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Serialize to the JSON bytes put on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Message delivered on the inbound queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub action: Action,
    pub result: ResultCode,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl InboundEnvelope {
    /// Decode a delivery body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// `payload.userId`; numeric strings are accepted as well.
    pub fn user_id(&self) -> Option<i64> {
        match self.payload.get("userId")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// `payload.token`.
    pub fn token(&self) -> Option<&str> {
        self.payload.get("token").and_then(Value::as_str)
    }

    /// Confirmation uuid: top-level field first, then `payload.uuid`.
    pub fn uuid(&self) -> Option<&str> {
        self.uuid
            .as_deref()
            .or_else(|| self.payload.get("uuid").and_then(Value::as_str))
    }
}

/// One raw broker message plus the tag used to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn new(delivery_tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            body: body.into(),
        }
    }
}

/// Queue names of the exchange: every name is `<app>_<code>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    app_name: String,
}

impl QueueNames {
    pub const EXCHANGE: &'static str = "ex";
    pub const INBOUND: &'static str = "i";
    pub const OUTBOUND: &'static str = "o";

    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    pub fn queue(&self, code: &str) -> String {
        format!("{}_{}", self.app_name, code)
    }

    pub fn exchange(&self) -> String {
        self.queue(Self::EXCHANGE)
    }

    pub fn inbound(&self) -> String {
        self.queue(Self::INBOUND)
    }

    pub fn outbound(&self) -> String {
        self.queue(Self::OUTBOUND)
    }

    pub fn digest(&self, digest: Digest) -> String {
        self.queue(digest.code())
    }
}

/// Fanout digest the broker publishes without any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Digest {
    Deals,
    Offers,
    SexDigest,
    AuDigest,
    YellowPages,
    Duels,
}

impl Digest {
    pub const ALL: [Digest; 6] = [
        Digest::Deals,
        Digest::Offers,
        Digest::SexDigest,
        Digest::AuDigest,
        Digest::YellowPages,
        Digest::Duels,
    ];

    /// Queue suffix, `<app>_<code>`.
    pub fn code(self) -> &'static str {
        match self {
            Digest::Deals => "deals",
            Digest::Offers => "offers",
            Digest::SexDigest => "sex_digest",
            Digest::AuDigest => "au_digest",
            Digest::YellowPages => "yellow_pages",
            Digest::Duels => "duels",
        }
    }

    /// Parse a queue suffix.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|digest| digest.code() == code)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_omits_absent_fields() {
        let envelope = OutboundEnvelope::new(Action::GetInfo);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, json!({ "action": "getInfo" }));
    }

    #[test]
    fn test_outbound_wire_shape() {
        let envelope = OutboundEnvelope::new(Action::WantToBuy)
            .with_user_id(42)
            .with_token("t0k3n")
            .with_payload(json!({ "itemCode": "08", "quantity": 5 }));

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["action"], "wantToBuy");
        assert_eq!(json["userId"], 42);
        assert_eq!(json["token"], "t0k3n");
        assert_eq!(json["payload"]["itemCode"], "08");
    }

    #[test]
    fn test_inbound_defaults_payload() {
        let envelope =
            InboundEnvelope::from_slice(br#"{"action":"grantToken","result":"NoSuchUser"}"#)
                .unwrap();
        assert_eq!(envelope.action, Action::GrantToken);
        assert_eq!(envelope.result, ResultCode::NoSuchUser);
        assert!(envelope.payload.as_object().unwrap().is_empty());
        assert_eq!(envelope.user_id(), None);
    }

    #[test]
    fn test_inbound_field_extraction() {
        let body = json!({
            "action": "authAdditionalOperation",
            "result": "Ok",
            "uuid": "abc-123",
            "payload": { "userId": "77", "token": "tk" }
        });
        let envelope = InboundEnvelope::from_slice(body.to_string().as_bytes()).unwrap();

        assert_eq!(envelope.user_id(), Some(77));
        assert_eq!(envelope.token(), Some("tk"));
        assert_eq!(envelope.uuid(), Some("abc-123"));
    }

    #[test]
    fn test_inbound_uuid_from_payload() {
        let body = json!({
            "action": "authAdditionalOperation",
            "result": "Ok",
            "payload": { "userId": 1, "uuid": "in-payload" }
        });
        let envelope = InboundEnvelope::from_slice(body.to_string().as_bytes()).unwrap();
        assert_eq!(envelope.uuid(), Some("in-payload"));
    }

    #[test]
    fn test_inbound_missing_action_fails() {
        assert!(InboundEnvelope::from_slice(br#"{"result":"Ok"}"#).is_err());
        assert!(InboundEnvelope::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_queue_names() {
        let names = QueueNames::new("bridge");
        assert_eq!(names.exchange(), "bridge_ex");
        assert_eq!(names.inbound(), "bridge_i");
        assert_eq!(names.outbound(), "bridge_o");
        assert_eq!(names.digest(Digest::YellowPages), "bridge_yellow_pages");
    }

    #[test]
    fn test_digest_codes() {
        for digest in Digest::ALL {
            assert_eq!(Digest::from_code(digest.code()), Some(digest));
        }
        assert_eq!(Digest::from_code("weather"), None);

        let parsed: Digest = serde_json::from_value(json!("sex_digest")).unwrap();
        assert_eq!(parsed, Digest::SexDigest);
        assert_eq!(Digest::AuDigest.to_string(), "au_digest");
    }
}
