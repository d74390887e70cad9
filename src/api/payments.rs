//! Storefront payment routes proxied to the backend `/payments` API.
//!
//! POST-only routes answer failures with the payment envelope
//! `{success: false, error, technicalError?}`; lookups answer with `{error}`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::adapters::is_truthy;
use crate::adapters::payment::{adapt_payment, adapt_payment_list, adapt_payment_session};
use crate::api::{bearer_token, parse_json, path_segment, public_base_url, AppState};
use crate::backend::client::{BackendError, BackendReply};
use crate::error::{AppError, AppResult};
use crate::logging::mask_email;
use crate::payments::gateway::{
    extract_checkout_url, extract_reference, kpay_status, normalize_status, string_field,
};
use crate::payments::types::{InitiatePaymentRequest, PaymentStatus, RetryPaymentRequest};
use crate::services::idempotency::{ledger_key, LedgerEntry};

const DEFAULT_TIMEOUT_REASON: &str = "Client-side timeout after 5 minutes";
const DEFAULT_CURRENCY: &str = "RWF";

fn enveloped(err: BackendError) -> AppError {
    AppError::from(err).enveloped()
}

fn relay(reply: &BackendReply, fallback: &str) -> AppError {
    AppError::upstream(reply.status, reply.message_or(fallback))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `body.data` as an object, or `{}` when the backend left it out.
fn reply_data(reply: &BackendReply) -> JsonValue {
    reply
        .body
        .get("data")
        .filter(|d| d.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}))
}

/// Success body shared by initiate and retry.
fn initiation_body(reply: &BackendReply, message: &str) -> JsonValue {
    let data = reply_data(reply);
    json!({
        "success": true,
        "checkoutUrl": extract_checkout_url(&reply.body),
        "transactionId": data.get("tid").cloned().unwrap_or(JsonValue::Null),
        "reference": extract_reference(&reply.body),
        "sessionId": string_field(&reply.body, "sessionId"),
        "data": data,
        "status": PaymentStatus::Pending,
        "message": message,
    })
}

// ============================================================================
// Initiate
// ============================================================================

/// POST /api/payments/kpay/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    let request: InitiatePaymentRequest = parse_json(&body).map_err(AppError::enveloped)?;
    let order_id = non_empty(&request.order_id).map(str::to_string);
    let has_order_data = request.order_data.as_ref().map(is_truthy).unwrap_or(false);

    info!(
        order_id = ?order_id,
        amount = ?request.amount,
        payment_method = ?request.payment_method.as_ref().map(|m| m.as_str()),
        customer_email = %request.customer_email.as_deref().map(mask_email).unwrap_or_default(),
        "Payment initiation request received"
    );

    if order_id.is_none() && !has_order_data {
        return Err(AppError::validation("orderId or orderData is required"));
    }

    let amount = request.amount.filter(|a| !a.is_zero());
    let method = request
        .payment_method
        .clone()
        .filter(|m| !m.as_str().is_empty());
    let (Some(amount), Some(method)) = (amount, method) else {
        return Err(AppError::validation("Amount and payment method are required"));
    };

    let order_details = non_empty(&request.order_details)
        .map(str::to_string)
        .unwrap_or_else(|| match &order_id {
            Some(id) => format!("Order {}", id),
            None => format!(
                "Order for {}",
                non_empty(&request.customer_name).unwrap_or("customer")
            ),
        });

    let forwarded = InitiatePaymentRequest {
        order_id: order_id.clone(),
        order_data: request.order_data.clone().filter(is_truthy),
        amount: Some(amount),
        customer_number: non_empty(&request.customer_number)
            .map(str::to_string)
            .or_else(|| request.customer_phone.clone()),
        payment_method: Some(method),
        order_details: Some(order_details),
        ..request
    };
    let payload = serde_json::to_value(&forwarded)
        .map_err(|e| AppError::internal(e.to_string()).enveloped())?;

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .post("/payments/initiate")
        .bearer(token.as_deref())
        .json(payload)
        .send()
        .await
        .map_err(enveloped)?;

    if !reply.is_success() {
        error!(
            order_id = ?order_id,
            status = reply.status,
            error = %reply.message_or("-"),
            "Backend payment initiation failed"
        );
        return Err(relay(&reply, "Payment initiation failed").enveloped());
    }

    let body = initiation_body(&reply, "Payment initiated successfully");
    info!(
        order_id = ?order_id,
        transaction_id = %body["transactionId"],
        has_checkout_url = !body["checkoutUrl"].is_null(),
        "Payment initiated successfully"
    );
    Ok(Json(body))
}

// ============================================================================
// Status and finalize
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusLookup {
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
}

impl StatusLookup {
    fn from_json(body: &JsonValue) -> Self {
        Self {
            payment_id: string_field(body, "paymentId"),
            transaction_id: string_field(body, "transactionId"),
            reference: string_field(body, "reference"),
        }
    }

    fn from_query(params: &HashMap<String, String>) -> Self {
        let field = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            payment_id: field("paymentId"),
            transaction_id: field("transactionId"),
            reference: field("reference"),
        }
    }

    fn is_empty(&self) -> bool {
        self.payment_id.is_none() && self.transaction_id.is_none() && self.reference.is_none()
    }
}

/// POST /api/payments/kpay/status
pub async fn check_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    let body: JsonValue = parse_json(&body).map_err(AppError::enveloped)?;
    lookup_status(&state, bearer_token(&headers), StatusLookup::from_json(&body)).await
}

/// GET /api/payments/kpay/status?paymentId=&transactionId=&reference=
pub async fn check_status_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<JsonValue>> {
    lookup_status(&state, bearer_token(&headers), StatusLookup::from_query(&params)).await
}

async fn lookup_status(
    state: &AppState,
    token: Option<String>,
    lookup: StatusLookup,
) -> AppResult<Json<JsonValue>> {
    if lookup.is_empty() {
        return Err(AppError::validation(
            "Payment ID, transaction ID, or reference is required",
        ));
    }

    let reply = state
        .backend
        .post("/payments/status")
        .bearer(token.as_deref())
        .json(json!({
            "transactionId": lookup.transaction_id,
            "reference": lookup.reference,
        }))
        .send_with(&state.status_policy)
        .await
        .map_err(enveloped)?;

    if !reply.is_success() {
        error!(
            payment_id = ?lookup.payment_id,
            transaction_id = ?lookup.transaction_id,
            status = reply.status,
            error = %reply.message_or("-"),
            "Backend payment status check failed"
        );
        return Err(relay(&reply, "Failed to check payment status").enveloped());
    }

    let data = reply_data(&reply);
    let status = normalize_status(&data);
    info!(
        payment_id = ?lookup.payment_id,
        transaction_id = ?lookup.transaction_id,
        reference = ?lookup.reference,
        status = %status,
        "Payment status checked"
    );

    Ok(Json(json!({
        "success": true,
        "paymentId": lookup.payment_id,
        "transactionId": string_field(&data, "tid").or(lookup.transaction_id),
        "reference": lookup.reference.or_else(|| string_field(&data, "reference")),
        "status": status,
        "amount": data.get("amount").filter(|v| is_truthy(v)).cloned().unwrap_or(json!(0)),
        "currency": string_field(&data, "currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        "message": string_field(&data, "statusdesc")
            .unwrap_or_else(|| format!("Payment is {}", status)),
        "needsUpdate": status == PaymentStatus::Completed,
        "kpayStatus": kpay_status(&data),
    })))
}

fn finalize_message(order_created: bool, completed: bool) -> &'static str {
    if order_created {
        "Payment completed and order created."
    } else if completed {
        "Payment completed."
    } else {
        "Payment is not completed yet"
    }
}

/// POST /api/payments/kpay/finalize
///
/// Asks the backend for the gateway status (the backend creates the order on
/// completion) and reports whether the caller may still create one. A
/// reference that already produced an order never answers `canCreateOrder`.
pub async fn finalize_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    let body: JsonValue = parse_json(&body).map_err(AppError::enveloped)?;
    let reference = string_field(&body, "reference");
    let transaction_id = string_field(&body, "transactionId");

    let Some(key) = ledger_key(reference.as_deref(), transaction_id.as_deref()) else {
        return Err(AppError::validation("reference or transactionId required"));
    };

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .post("/payments/status")
        .bearer(token.as_deref())
        .json(json!({ "transactionId": transaction_id, "reference": reference }))
        .send()
        .await
        .map_err(enveloped)?;

    if !reply.is_success() {
        error!(
            reference = ?reference,
            transaction_id = ?transaction_id,
            status = reply.status,
            error = %reply.message_or("-"),
            "Backend payment status check failed in finalize"
        );
        return Err(relay(&reply, "Failed to finalize payment").enveloped());
    }

    let data = reply_data(&reply);
    let completed = data.get("statusid").and_then(|v| v.as_str()) == Some("01");
    let created_by_backend = reply.body.get("orderCreated").and_then(|v| v.as_bool()) == Some(true);
    let mut order_id = string_field(&reply.body, "orderId");
    let mut order_number = string_field(&reply.body, "orderNumber");

    let mut recorded = None;
    if created_by_backend {
        let entry = LedgerEntry::new(order_id.clone(), order_number.clone());
        if let Err(e) = state.ledger.record(&key, entry).await {
            warn!(key = %key, error = %e, "failed to record finalized order");
        }
    } else {
        match state.ledger.order_for(&key).await {
            Ok(entry) => recorded = entry,
            Err(e) => warn!(key = %key, error = %e, "failed to read order ledger"),
        }
    }

    if let Some(entry) = &recorded {
        order_id = order_id.or_else(|| entry.order_id.clone());
        order_number = order_number.or_else(|| entry.order_number.clone());
    }
    let order_created = created_by_backend || recorded.is_some();

    info!(
        reference = ?reference,
        transaction_id = ?transaction_id,
        order_created,
        order_id = ?order_id,
        "Payment finalized"
    );

    let status = if completed {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Pending
    };
    Ok(Json(json!({
        "success": true,
        "orderCreated": order_created,
        "orderId": order_id,
        "orderNumber": order_number,
        "canCreateOrder": !order_created && completed,
        "status": status,
        "message": finalize_message(order_created, completed),
    })))
}

// ============================================================================
// Timeout and retry
// ============================================================================

/// POST /api/payments/timeout
pub async fn record_timeout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    let body: JsonValue = parse_json(&body).map_err(AppError::enveloped)?;
    let payment_id = string_field(&body, "paymentId");
    let reason = string_field(&body, "reason");

    info!(payment_id = ?payment_id, reason = ?reason, "Payment timeout request received");

    let Some(payment_id) = payment_id else {
        return Err(AppError::validation("Payment ID is required"));
    };

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .post("/payments/timeout")
        .bearer(token.as_deref())
        .json(json!({
            "paymentId": payment_id,
            "reason": reason.unwrap_or_else(|| DEFAULT_TIMEOUT_REASON.to_string()),
        }))
        .send()
        .await
        .map_err(enveloped)?;

    if !reply.is_success() {
        error!(
            payment_id = %payment_id,
            status = reply.status,
            error = %reply.message_or("-"),
            "Backend payment timeout failed"
        );
        return Err(relay(&reply, "Failed to record payment timeout").enveloped());
    }

    let status = string_field(&reply.body, "status")
        .unwrap_or_else(|| PaymentStatus::Timeout.as_str().to_string());
    info!(payment_id = %payment_id, status = %status, "Payment timeout recorded");

    Ok(Json(json!({
        "success": true,
        "message": "Payment timeout recorded. Order remains available for retry.",
        "status": status,
        "payment": reply.body.get("payment").filter(|p| is_truthy(p)).cloned(),
    })))
}

/// POST /api/payments/retry
pub async fn retry_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    let request: RetryPaymentRequest = parse_json(&body).map_err(AppError::enveloped)?;

    let order_id = non_empty(&request.order_id).map(str::to_string);
    let amount = request.amount.filter(|a| !a.is_zero());
    let method = request
        .payment_method
        .clone()
        .filter(|m| !m.as_str().is_empty());
    let (Some(order_id), Some(amount), Some(method)) = (order_id, amount, method) else {
        return Err(AppError::validation("Missing required fields"));
    };

    info!(
        order_id = %order_id,
        amount = %amount,
        payment_method = %method,
        "Payment retry request received"
    );

    let redirect_url = non_empty(&request.redirect_url)
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "{}/payment/{}",
                public_base_url(state.public_base_url.as_deref(), &headers),
                order_id
            )
        });

    let forwarded = InitiatePaymentRequest {
        order_id: Some(order_id.clone()),
        amount: Some(amount),
        customer_name: request.customer_name,
        customer_email: request.customer_email,
        customer_number: request.customer_phone.clone(),
        customer_phone: request.customer_phone,
        payment_method: Some(method),
        redirect_url: Some(redirect_url),
        order_details: Some(format!("Order {} retry payment", order_id)),
        ..Default::default()
    };
    let payload = serde_json::to_value(&forwarded)
        .map_err(|e| AppError::internal(e.to_string()).enveloped())?;

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .post("/payments/initiate")
        .bearer(token.as_deref())
        .json(payload)
        .send()
        .await
        .map_err(enveloped)?;

    if !reply.is_success() {
        error!(
            order_id = %order_id,
            status = reply.status,
            error = %reply.message_or("-"),
            "Backend payment retry failed"
        );
        return Err(relay(&reply, "Payment retry failed").enveloped());
    }

    let body = initiation_body(&reply, "Payment retry initiated successfully");
    info!(
        order_id = %order_id,
        transaction_id = %body["transactionId"],
        has_checkout_url = !body["checkoutUrl"].is_null(),
        "Payment retry initiated"
    );
    Ok(Json(body))
}

// ============================================================================
// Lookups
// ============================================================================

/// GET /api/payments/{paymentId}
///
/// `PAY-` ids are session references and are read from the session store.
pub async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> AppResult<Json<JsonValue>> {
    let payment_id = path_segment(&payment_id, "Payment ID is required")?;

    let is_reference = payment_id.starts_with("PAY-");
    let path = if is_reference {
        format!("/payments/session/{}", payment_id)
    } else {
        format!("/payments/{}", payment_id)
    };

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .get(&path)
        .bearer(token.as_deref())
        .send()
        .await?;

    if !reply.is_success() {
        error!(
            payment_id = %payment_id,
            is_reference,
            status = reply.status,
            "Backend payment fetch failed"
        );
        return Err(relay(&reply, "Payment not found"));
    }

    let payment = match reply.body.get("session").filter(|s| is_reference && s.is_object()) {
        Some(session) => adapt_payment_session(session, reply.body.get("orderId")),
        None => adapt_payment(reply.data()),
    };

    info!(
        payment_id = %payment_id,
        is_reference,
        order_id = %payment["order_id"],
        status = %payment["status"],
        "Payment details retrieved"
    );
    Ok(Json(payment))
}

/// PATCH /api/payments/{paymentId}
///
/// Payments are created against their order, so linking is acknowledged
/// without touching the backend.
pub async fn link_payment(
    Path(payment_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    let payment_id = path_segment(&payment_id, "Payment ID is required")?;
    let body: JsonValue = parse_json(&body)?;
    let Some(order_id) = string_field(&body, "order_id") else {
        return Err(AppError::validation("order_id is required"));
    };

    warn!(
        payment_id = %payment_id,
        order_id = %order_id,
        "legacy payment link endpoint called"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Payment already linked to order (one-way flow)",
        "paymentId": payment_id,
        "orderId": order_id,
    })))
}

/// GET /api/payments/order/{orderId}
pub async fn payments_for_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> AppResult<Json<Vec<JsonValue>>> {
    let order_id = path_segment(&order_id, "Order ID is required")?;

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .get(&format!("/payments/order/{}", order_id))
        .bearer(token.as_deref())
        .send()
        .await?;

    if !reply.is_success() {
        error!(order_id = %order_id, status = reply.status, "Backend payment list fetch failed");
        return Err(relay(&reply, "Failed to fetch payments"));
    }

    let payments = adapt_payment_list(&reply.body);
    info!(order_id = %order_id, count = payments.len(), "Payments retrieved");
    Ok(Json(payments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_message() {
        assert_eq!(
            finalize_message(true, true),
            "Payment completed and order created."
        );
        assert_eq!(finalize_message(false, true), "Payment completed.");
        assert_eq!(finalize_message(false, false), "Payment is not completed yet");
    }

    #[test]
    fn test_status_lookup_sources() {
        let lookup = StatusLookup::from_json(&json!({ "transactionId": 42, "reference": "" }));
        assert_eq!(lookup.transaction_id.as_deref(), Some("42"));
        assert_eq!(lookup.reference, None);

        let mut params = HashMap::new();
        params.insert("reference".to_string(), "PAY-1".to_string());
        params.insert("paymentId".to_string(), String::new());
        let lookup = StatusLookup::from_query(&params);
        assert_eq!(lookup.reference.as_deref(), Some("PAY-1"));
        assert_eq!(lookup.payment_id, None);
        assert!(!lookup.is_empty());
        assert!(StatusLookup::default().is_empty());
    }

    #[test]
    fn test_initiation_body_shape() {
        let reply = BackendReply {
            status: 200,
            body: json!({
                "sessionId": "S-1",
                "data": { "tid": "T-1", "url": "https://pay", "reference": "PAY-1" }
            }),
        };
        let body = initiation_body(&reply, "Payment initiated successfully");
        assert_eq!(body["checkoutUrl"], "https://pay");
        assert_eq!(body["transactionId"], "T-1");
        assert_eq!(body["reference"], "PAY-1");
        assert_eq!(body["sessionId"], "S-1");
        assert_eq!(body["status"], "pending");

        let reply = BackendReply {
            status: 200,
            body: json!({ "success": true }),
        };
        let body = initiation_body(&reply, "m");
        assert_eq!(body["data"], json!({}));
        assert!(body["checkoutUrl"].is_null());
    }
}
