use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

use crate::api::AppState;
use crate::payments::gateway::string_field;

const WEBHOOK_FAILED: &str = "Webhook processing failed";

fn failed(status: StatusCode) -> Response {
    (status, Json(json!({ "error": WEBHOOK_FAILED }))).into_response()
}

/// POST /api/webhooks/kpay
///
/// KPay expects a literal `OK` once the backend has accepted the callback.
/// The payload is forwarded byte for byte.
pub async fn relay_kpay_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: JsonValue = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Invalid KPay webhook payload");
            return failed(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let tid = string_field(&payload, "tid");
    let refid = string_field(&payload, "refid");
    info!(
        tid = ?tid,
        refid = ?refid,
        statusid = ?string_field(&payload, "statusid"),
        statusdesc = ?string_field(&payload, "statusdesc"),
        "KPay webhook received"
    );

    let result = state
        .backend
        .post("/webhooks/kpay")
        .raw_json(body)
        .send_text()
        .await;

    match result {
        Ok((status, _)) if (200..300).contains(&status) => {
            info!(tid = ?tid, refid = ?refid, "Webhook forwarded to backend");
            (StatusCode::OK, "OK").into_response()
        }
        Ok((status, text)) => {
            error!(status, response = %text, "Backend webhook processing failed");
            failed(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY))
        }
        Err(e) => {
            error!(error = %e, "Webhook relay failed");
            failed(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
