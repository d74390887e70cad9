//! Reading KPay responses relayed by the backend.

use serde_json::Value as JsonValue;

use crate::payments::types::{KpayStatus, PaymentStatus};

/// Non-empty string field, or a number rendered as text.
pub fn string_field(value: &JsonValue, field: &str) -> Option<String> {
    match value.get(field)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Maps a KPay status payload onto [`PaymentStatus`].
///
/// `statusid` `"01"` or a numeric `retcode` of 0 is completed, `"02"` is
/// pending, `"03"` is failed. Anything else stays pending.
pub fn normalize_status(data: &JsonValue) -> PaymentStatus {
    let status_id = data.get("statusid").and_then(|v| v.as_str());
    let retcode_ok = data
        .get("retcode")
        .and_then(|v| v.as_i64())
        .map(|code| code == 0)
        .unwrap_or(false);

    if status_id == Some("01") || retcode_ok {
        return PaymentStatus::Completed;
    }
    match status_id {
        Some("03") => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Checkout URL from an initiate response, in priority order:
/// `checkoutUrl`, `data.url`, `data.redirecturl`, `data.redirectUrl`,
/// `data.checkout_url`, then `url` when `useurl` is `"Y"`.
pub fn extract_checkout_url(response: &JsonValue) -> Option<String> {
    if let Some(url) = string_field(response, "checkoutUrl") {
        return Some(url);
    }

    if let Some(data) = response.get("data") {
        let found = ["url", "redirecturl", "redirectUrl", "checkout_url"]
            .iter()
            .find_map(|field| string_field(data, field));
        if found.is_some() {
            return found;
        }
    }

    if response.get("useurl").and_then(|v| v.as_str()) == Some("Y") {
        return string_field(response, "url");
    }

    None
}

/// Session reference from a backend initiate reply.
pub fn extract_reference(response: &JsonValue) -> Option<String> {
    response
        .get("data")
        .and_then(|data| {
            ["reference", "orderReference", "refid"]
                .iter()
                .find_map(|field| string_field(data, field))
        })
        .or_else(|| string_field(response, "sessionId"))
}

pub fn kpay_status(data: &JsonValue) -> KpayStatus {
    let field = |name: &str| data.get(name).filter(|v| !v.is_null()).cloned();
    KpayStatus {
        status_id: field("statusid"),
        status_description: field("statusdesc"),
        return_code: field("retcode"),
        mom_transaction_id: field("momtransactionid"),
    }
}
