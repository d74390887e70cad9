use serde_json::{json, Map, Value as JsonValue};

use crate::adapters::remap;
use crate::payments::types::PaymentStatus;

const PAYMENT_FIELDS: &[(&str, &str)] = &[
    ("orderId", "order_id"),
    ("kpayTransactionId", "kpay_transaction_id"),
    ("kpayAuthKey", "kpay_auth_key"),
    ("kpayReturnCode", "kpay_return_code"),
    ("kpayResponse", "kpay_response"),
    ("kpayWebhookData", "kpay_webhook_data"),
    ("kpayMomTransactionId", "kpay_mom_transaction_id"),
    ("kpayPayAccount", "kpay_pay_account"),
    ("failureReason", "failure_reason"),
    ("clientTimeout", "client_timeout"),
    ("clientTimeoutReason", "client_timeout_reason"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("completedAt", "completed_at"),
];

const REPORTING_FIELDS: &[(&str, &str)] = &[
    ("paymentMethod", "payment_method"),
    ("customerName", "customer_name"),
    ("customerEmail", "customer_email"),
    ("customerPhone", "customer_phone"),
];

/// Backend payment record with snake_case twins for every known field.
pub fn adapt_payment(payment: &JsonValue) -> JsonValue {
    remap(payment, PAYMENT_FIELDS, &[])
}

/// Like [`adapt_payment`], plus the customer fields used by admin reporting.
pub fn adapt_payment_for_reporting(payment: &JsonValue) -> JsonValue {
    remap(&adapt_payment(payment), REPORTING_FIELDS, &[])
}

/// `data` or the whole body, mapped when it is an array.
pub fn adapt_payment_list(body: &JsonValue) -> Vec<JsonValue> {
    let list = match body.get("data") {
        Some(data) if !data.is_null() => data,
        _ => body,
    };
    list.as_array()
        .map(|items| items.iter().map(adapt_payment).collect())
        .unwrap_or_default()
}

/// A payment session (looked up by `PAY-` reference) in payment-record form.
pub fn adapt_payment_session(session: &JsonValue, order_id: Option<&JsonValue>) -> JsonValue {
    let text = |field: &str| {
        session
            .get(field)
            .filter(|v| crate::adapters::is_truthy(v))
            .cloned()
            .unwrap_or_else(|| json!(""))
    };
    let or_null = |field: &str| {
        session
            .get(field)
            .filter(|v| crate::adapters::is_truthy(v))
            .cloned()
            .unwrap_or(JsonValue::Null)
    };

    let checkout_url = session
        .get("kpayResponse")
        .and_then(|kpay| {
            ["url", "redirecturl", "redirectUrl"]
                .iter()
                .find_map(|f| kpay.get(*f).filter(|v| crate::adapters::is_truthy(v)))
        })
        .cloned()
        .unwrap_or(JsonValue::Null);

    let status = session.get("status").cloned().unwrap_or(JsonValue::Null);
    let completed_at = if status.as_str() == Some(PaymentStatus::Completed.as_str()) {
        session.get("updatedAt").cloned().unwrap_or(JsonValue::Null)
    } else {
        JsonValue::Null
    };

    let mut out = Map::new();
    out.insert("id".into(), session.get("id").cloned().unwrap_or(JsonValue::Null));
    out.insert(
        "order_id".into(),
        order_id
            .filter(|v| crate::adapters::is_truthy(v))
            .cloned()
            .unwrap_or(JsonValue::Null),
    );
    for (src, dst) in [
        ("amount", "amount"),
        ("currency", "currency"),
        ("paymentMethod", "payment_method"),
    ] {
        if let Some(v) = session.get(src) {
            out.insert(dst.into(), v.clone());
        }
    }
    out.insert("status".into(), status);
    if let Some(v) = session.get("reference") {
        out.insert("reference".into(), v.clone());
    }
    out.insert("kpay_transaction_id".into(), or_null("kpayTransactionId"));
    out.insert("customer_name".into(), text("customerName"));
    out.insert("customer_email".into(), text("customerEmail"));
    out.insert("customer_phone".into(), text("customerPhone"));
    for (src, dst) in [("createdAt", "created_at"), ("updatedAt", "updated_at")] {
        if let Some(v) = session.get(src) {
            out.insert(dst.into(), v.clone());
        }
    }
    out.insert("completed_at".into(), completed_at);
    out.insert("checkout_url".into(), checkout_url);
    JsonValue::Object(out)
}
