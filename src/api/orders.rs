use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value as JsonValue;
use tracing::error;

use crate::api::{bearer_token, path_segment, AppState};
use crate::error::{AppError, AppResult};

/// GET /api/orders/{id}
///
/// The backend order (items included) is returned as-is.
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<JsonValue>> {
    let id = path_segment(&id, "Order ID is required")?;

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .get(&format!("/orders/{}", id))
        .bearer(token.as_deref())
        .send()
        .await?;

    if !reply.is_success() {
        error!(order_id = %id, status = reply.status, "Backend order fetch failed");
        return Err(AppError::upstream(
            reply.status,
            reply.message_or("Failed to fetch order"),
        ));
    }

    Ok(Json(reply.body))
}
