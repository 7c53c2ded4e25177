//! Call identity.

use std::fmt;
use uuid::Uuid;

/// Identifies one in-flight call.
///
/// Two retries sharing a domain key are told apart by their call ids. Only
/// the timeout and publish-failure paths look calls up by id. Backed by a
/// v7 UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
