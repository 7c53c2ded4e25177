//! Domain key construction.
//!
//! The gateway builds a key when it registers a call and the dispatcher
//! rebuilds it from the response payload. Both sides go through these
//! functions so the two can never drift apart.

use cw_bus::Action;

/// Key of a singleton action: the action's own name.
pub fn singleton_key(action: &Action) -> String {
    action.as_str().to_string()
}

/// Key of a user-scoped call.
pub fn user_key(user_id: i64) -> String {
    user_id.to_string()
}

/// Key of a buy call: `<userId>_<itemCode>_<quantity>`.
pub fn deal_key(user_id: i64, item_code: &str, quantity: u32) -> String {
    format!("{}_{}_{}", user_id, item_code, quantity)
}
