//! # Protocol Vocabulary
//!
//! Action names and result codes exchanged with the broker.
//!
//! Both vocabularies are open on the inbound side: an unrecognised string
//! decodes to `Unknown`/`Other` so a single odd message never fails the
//! whole delivery.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How calls of an action are bucketed in the correlation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationScope {
    /// One bucket per action; the domain key is the action name itself.
    Singleton,
    /// One bucket per user id.
    User,
    /// One bucket per `<userId>_<itemCode>_<quantity>` deal.
    Deal,
    /// Not correlated at all (unknown inbound actions).
    Uncorrelated,
}

/// Protocol operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    CreateAuthCode,
    GrantToken,
    AuthAdditionalOperation,
    GrantAdditionalOperation,
    GetInfo,
    GuildInfo,
    ViewCraftbook,
    RequestGearInfo,
    RequestStock,
    WantToBuy,
    RequestProfile,
    /// Any action name this bridge does not know about.
    Unknown(String),
}

impl Action {
    /// Every action the bridge can issue, in protocol order.
    pub const KNOWN: [Action; 11] = [
        Action::CreateAuthCode,
        Action::GrantToken,
        Action::AuthAdditionalOperation,
        Action::GrantAdditionalOperation,
        Action::GetInfo,
        Action::GuildInfo,
        Action::ViewCraftbook,
        Action::RequestGearInfo,
        Action::RequestStock,
        Action::WantToBuy,
        Action::RequestProfile,
    ];

    /// Wire name of the action.
    pub fn as_str(&self) -> &str {
        match self {
            Action::CreateAuthCode => "createAuthCode",
            Action::GrantToken => "grantToken",
            Action::AuthAdditionalOperation => "authAdditionalOperation",
            Action::GrantAdditionalOperation => "grantAdditionalOperation",
            Action::GetInfo => "getInfo",
            Action::GuildInfo => "guildInfo",
            Action::ViewCraftbook => "viewCraftbook",
            Action::RequestGearInfo => "requestGearInfo",
            Action::RequestStock => "requestStock",
            Action::WantToBuy => "wantToBuy",
            Action::RequestProfile => "requestProfile",
            Action::Unknown(name) => name,
        }
    }

    /// Parse a wire name. Never fails.
    pub fn parse(name: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|action| action.as_str() == name)
            .cloned()
            .unwrap_or_else(|| Action::Unknown(name.to_string()))
    }

    /// Bucketing rule used on both the send and the receive side.
    pub fn scope(&self) -> CorrelationScope {
        match self {
            Action::GetInfo => CorrelationScope::Singleton,
            Action::WantToBuy => CorrelationScope::Deal,
            Action::Unknown(_) => CorrelationScope::Uncorrelated,
            _ => CorrelationScope::User,
        }
    }

    /// Success is signalled by a `uuid` rather than a result code.
    pub fn is_confirmation(&self) -> bool {
        matches!(self, Action::AuthAdditionalOperation)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Action::parse(&name)
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// How a result code affects pending calls before per-action dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemicFault {
    /// Reject the exact `userId` bucket of the action.
    ScopedToKey,
    /// Reject every call of the action issued for the same user.
    ScopedToUser,
    /// Log and leave the table untouched.
    LogOnly,
    /// Reject every pending call of the action.
    Broadcast,
    /// Reject every call of the action carrying the same token.
    ScopedToToken,
    /// Resolve every pending call of the action with a `NotRegistered` status.
    NotRegistered,
}

/// Result code reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResultCode {
    Ok,
    NotRegistered,
    BadFormat,
    InsufficientFunds,
    UserIsBusy,
    BattleIsNear,
    NoSuchUser,
    NoOffersFoundByPrice,
    InvalidCode,
    InvalidToken,
    /// A code outside the known vocabulary.
    Other(String),
}

impl ResultCode {
    const KNOWN: [ResultCode; 10] = [
        ResultCode::Ok,
        ResultCode::NotRegistered,
        ResultCode::BadFormat,
        ResultCode::InsufficientFunds,
        ResultCode::UserIsBusy,
        ResultCode::BattleIsNear,
        ResultCode::NoSuchUser,
        ResultCode::NoOffersFoundByPrice,
        ResultCode::InvalidCode,
        ResultCode::InvalidToken,
    ];

    /// Wire name of the code.
    pub fn as_str(&self) -> &str {
        match self {
            ResultCode::Ok => "Ok",
            ResultCode::NotRegistered => "NotRegistered",
            ResultCode::BadFormat => "BadFormat",
            ResultCode::InsufficientFunds => "InsufficientFunds",
            ResultCode::UserIsBusy => "UserIsBusy",
            ResultCode::BattleIsNear => "BattleIsNear",
            ResultCode::NoSuchUser => "NoSuchUser",
            ResultCode::NoOffersFoundByPrice => "NoOffersFoundByPrice",
            ResultCode::InvalidCode => "InvalidCode",
            ResultCode::InvalidToken => "InvalidToken",
            ResultCode::Other(code) => code,
        }
    }

    /// Parse a wire name. Never fails.
    pub fn parse(code: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str() == code)
            .cloned()
            .unwrap_or_else(|| ResultCode::Other(code.to_string()))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResultCode::Ok)
    }

    /// Classification independent of the action. `None` means the code
    /// falls through to per-action handling.
    ///
    /// `InsufficientFunds` and `NoOffersFoundByPrice` are deliberately not
    /// systemic: they only reject the one deal they were reported for.
    pub fn systemic_fault(&self) -> Option<SystemicFault> {
        match self {
            ResultCode::InvalidCode => Some(SystemicFault::ScopedToKey),
            ResultCode::UserIsBusy | ResultCode::BattleIsNear => Some(SystemicFault::ScopedToUser),
            ResultCode::BadFormat => Some(SystemicFault::LogOnly),
            ResultCode::NoSuchUser => Some(SystemicFault::Broadcast),
            ResultCode::InvalidToken => Some(SystemicFault::ScopedToToken),
            ResultCode::NotRegistered => Some(SystemicFault::NotRegistered),
            _ => None,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ResultCode {
    fn from(code: String) -> Self {
        ResultCode::parse(&code)
    }
}

impl From<ResultCode> for String {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Other(code) => code,
            other => other.as_str().to_string(),
        }
    }
}
