//! HTTP surface.
//!
//! Thin axum handlers over the [`CallGateway`]: parse the path, make the
//! call, map the outcome to a status code.

use crate::domain::{CorrelationTable, ExchangeError};
use crate::ipc::CallGateway;
use crate::ports::TokenStore;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<CallGateway>,
    pub tokens: Arc<dyn TokenStore>,
    pub table: Arc<CorrelationTable>,
}

/// Build the HTTP router: `/api/*` plus `/health`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/:user_id", post(handle_auth))
        .route("/token/:user_id", post(handle_token))
        .route("/profile/:user_id", get(handle_profile))
        .route("/info", get(handle_info));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .with_state(state)
}

impl ExchangeError {
    /// HTTP status a failed call maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExchangeError::Unauthorized => StatusCode::UNAUTHORIZED,
            ExchangeError::TimedOut => StatusCode::GATEWAY_TIMEOUT,
            ExchangeError::Transport(_) => StatusCode::BAD_GATEWAY,
            ExchangeError::Rejected { .. } => StatusCode::BAD_REQUEST,
            ExchangeError::Abandoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

type CallResponse = Result<Json<Value>, ExchangeError>;

async fn handle_auth(State(state): State<AppState>, Path(user_id): Path<i64>) -> CallResponse {
    debug!(user_id, "auth");
    state.gateway.send_auth(user_id).await.map(Json)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenQuery {
    auth_code: String,
}

async fn handle_token(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<TokenQuery>,
) -> CallResponse {
    debug!(user_id, "token");
    let granted = state.gateway.grant_token(user_id, &query.auth_code).await?;

    if let Some(token) = granted.get("token").and_then(Value::as_str) {
        state.tokens.set_token(user_id, token.to_string()).await;
        info!(user_id, "Stored granted token");
    }
    Ok(Json(granted))
}

async fn handle_profile(State(state): State<AppState>, Path(user_id): Path<i64>) -> CallResponse {
    debug!(user_id, "profile");
    let token = state.tokens.token_by_user_id(user_id).await;
    state
        .gateway
        .request_profile(user_id, token.as_deref())
        .await
        .map(Json)
}

async fn handle_info(State(state): State<AppState>) -> CallResponse {
    state.gateway.get_info().await.map(Json)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.table.stats();
    Json(json!({
        "status": "ok",
        "pending": state.table.pending_count(),
        "stats": {
            "registered": stats.registered.load(Ordering::Relaxed),
            "resolved": stats.resolved.load(Ordering::Relaxed),
            "rejected": stats.rejected.load(Ordering::Relaxed),
            "timedOut": stats.timed_out.load(Ordering::Relaxed),
            "transportFailed": stats.transport_failed.load(Ordering::Relaxed),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_bus::{ResultCode, TransportError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(ExchangeError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ExchangeError::TimedOut.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ExchangeError::Transport(TransportError::ChannelClosed).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ExchangeError::rejected(ResultCode::NoSuchUser).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ExchangeError::Abandoned.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
