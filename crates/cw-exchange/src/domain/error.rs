//! Exchange error types.
//!
//! [`ExchangeError`] is the rejection value of a call. Expected protocol
//! faults travel through it; the engine never panics on them.

use cw_bus::{ResultCode, TransportError};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Why a call did not resolve.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    /// The broker client refused the publish. Surfaced to the originating call only.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// No matching response within the configured window.
    #[error("timed out waiting for broker response")]
    TimedOut,

    /// The broker answered with a failure result code.
    #[error("rejected by broker: {code}")]
    Rejected {
        /// Result code of the message that settled the call
        code: ResultCode,
        /// Payload of that message (empty object for systemic faults)
        payload: Value,
    },

    /// A protected call was made without a credential; nothing was published.
    #[error("not authorized")]
    Unauthorized,

    /// The call's outcome was dropped without being settled.
    #[error("call abandoned before settlement")]
    Abandoned,
}

impl ExchangeError {
    /// Rejection carrying only a result code.
    pub fn rejected(code: ResultCode) -> Self {
        Self::Rejected {
            code,
            payload: Value::Object(Default::default()),
        }
    }

    /// Rejection carrying the payload of the message that caused it.
    pub fn rejected_with(code: ResultCode, payload: Value) -> Self {
        Self::Rejected { code, payload }
    }

    /// Broker result code, for protocol rejections.
    pub fn result_code(&self) -> Option<&ResultCode> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Short machine-readable kind, used in logs and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::TimedOut => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Unauthorized => "unauthorized",
            Self::Abandoned => "abandoned",
        }
    }
}

impl Serialize for ExchangeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("ExchangeError", 3)?;
        state.serialize_field("error", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        if let Self::Rejected { code, payload } = self {
            state.serialize_field("result", code)?;
            state.serialize_field("payload", payload)?;
        }
        state.end()
    }
}

/// Result of one call
pub type CallResult = Result<Value, ExchangeError>;

/// Service-level errors (startup and wiring, not per call)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}
