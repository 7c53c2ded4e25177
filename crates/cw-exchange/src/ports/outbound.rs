//! Outbound ports for the exchange.

use async_trait::async_trait;

/// Credential lookup for protected calls.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Bearer token granted to `user_id`, if any.
    async fn token_by_user_id(&self, user_id: i64) -> Option<String>;

    /// Remember the token granted to `user_id`.
    async fn set_token(&self, user_id: i64, token: String);
}

/// Static item-name to item-code catalog.
///
/// Buy responses name the item; buy requests use its code.
pub trait ItemCatalog: Send + Sync {
    fn code_for_item_name(&self, name: &str) -> Option<&str>;
}
