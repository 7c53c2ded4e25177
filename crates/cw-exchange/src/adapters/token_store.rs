//! In-memory token store.

use crate::ports::TokenStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::env;
use tracing::{debug, warn};

/// Process-local token store. Tokens do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<i64, String>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one user.
    pub fn with_token(user_id: i64, token: impl Into<String>) -> Self {
        let store = Self::new();
        store.tokens.write().insert(user_id, token.into());
        store
    }

    /// Create from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `USER_ID`: User to seed (optional)
    /// - `USER_TOKEN`: Token of that user
    pub fn from_env() -> Self {
        let Ok(user_id) = env::var("USER_ID") else {
            return Self::new();
        };
        let Ok(user_id) = user_id.trim().parse::<i64>() else {
            warn!(user_id = %user_id, "USER_ID is not a number, token store left empty");
            return Self::new();
        };
        match env::var("USER_TOKEN") {
            Ok(token) if !token.is_empty() => {
                debug!(user_id, "Seeded token store from environment");
                Self::with_token(user_id, token)
            }
            _ => Self::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn token_by_user_id(&self, user_id: i64) -> Option<String> {
        self.tokens.read().get(&user_id).cloned()
    }

    async fn set_token(&self, user_id: i64, token: String) {
        self.tokens.write().insert(user_id, token);
    }
}
