//! `/api/admin/settings/orders-enabled` proxy.
//!
//! Reading the flag is public. Changing or clearing it needs the admin's
//! token, taken from the bearer header or the `auth-token` cookie.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

use crate::api::{bearer_token, cookie, AppState, AUTH_COOKIE};
use crate::backend::client::BackendCall;
use crate::error::AppError;

const SETTINGS_PATH: &str = "/settings/orders-enabled";

fn admin_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie(headers, AUTH_COOKIE))
}

/// Relays the backend reply: its JSON on success, its JSON (or
/// `{error: "Unknown error"}`) with its status otherwise.
async fn forward(call: BackendCall) -> Response {
    let reply = match call.send().await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "orders-enabled proxy failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    if reply.is_success() {
        return (StatusCode::OK, Json(reply.body)).into_response();
    }

    warn!(status = reply.status, "orders-enabled backend call rejected");
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = if reply.body.is_null() {
        json!({ "error": "Unknown error" })
    } else {
        reply.body
    };
    (status, Json(body)).into_response()
}

/// GET /api/admin/settings/orders-enabled
pub async fn get_orders_enabled(State(state): State<AppState>) -> Response {
    forward(state.backend.get(SETTINGS_PATH)).await
}

/// POST /api/admin/settings/orders-enabled
pub async fn set_orders_enabled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(token) = admin_token(&headers) else {
        return AppError::unauthorized().into_response();
    };

    let payload: JsonValue = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        }
    };

    info!(enabled = ?payload.get("enabled"), "orders-enabled override requested");
    forward(
        state
            .backend
            .post(SETTINGS_PATH)
            .bearer(Some(&token))
            .json(payload),
    )
    .await
}

/// DELETE /api/admin/settings/orders-enabled
///
/// Drops the admin override so the schedule applies again.
pub async fn clear_orders_enabled(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = admin_token(&headers) else {
        return AppError::unauthorized().into_response();
    };

    info!("orders-enabled override cleared");
    forward(state.backend.delete(SETTINGS_PATH).bearer(Some(&token))).await
}
