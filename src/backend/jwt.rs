//! Unverified JWT payload inspection, used to decide when to refresh.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

/// Refresh tokens that expire within this many seconds.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 3600;

/// Decodes the payload segment. Returns `None` for anything malformed.
pub fn decode_claims(token: &str) -> Option<JsonValue> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_claims(token)?.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Seconds until expiry, clamped at zero. `None` when the token has no `exp`.
pub fn time_until_expiration(token: &str, now: DateTime<Utc>) -> Option<i64> {
    expires_at(token).map(|exp| (exp - now).num_seconds().max(0))
}

/// A token without a readable `exp` counts as expiring.
pub fn is_token_expiring_soon(token: &str, buffer_secs: i64, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => exp.timestamp() - now.timestamp() <= buffer_secs,
        None => true,
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
