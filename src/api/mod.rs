//! HTTP surface of the gateway: payment proxies, the KPay webhook relay,
//! admin reporting and listings, and the settings/order proxies.

pub mod directory;
pub mod orders;
pub mod payments;
pub mod settings;
pub mod transactions;
pub mod webhooks;

use axum::{
    body::Bytes,
    http::{header, HeaderMap},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::backend::client::BackendClient;
use crate::backend::retry::RetryPolicy;
use crate::error::{AppError, AppResult};
use crate::services::idempotency::OrderLedger;

pub const LOCAL_ORIGIN: &str = "http://localhost:3000";
pub const AUTH_COOKIE: &str = "auth-token";

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub backend: BackendClient,
    pub ledger: Arc<dyn OrderLedger>,
    /// Applied to the backend status lookup behind `/api/payments/kpay/status`
    pub status_policy: RetryPolicy,
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(backend: BackendClient, ledger: Arc<dyn OrderLedger>) -> Self {
        Self {
            backend,
            ledger,
            status_policy: RetryPolicy::gateway_status(3),
            public_base_url: None,
        }
    }

    pub fn with_status_policy(mut self, policy: RetryPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    pub fn with_public_base_url(mut self, url: Option<String>) -> Self {
        self.public_base_url = url.map(|u| u.trim_end_matches('/').to_string());
        self
    }
}

/// All `/api/*` routes, ready to be merged with the health routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/payments/kpay/initiate",
            post(payments::initiate_payment).get(method_not_allowed),
        )
        .route(
            "/api/payments/kpay/status",
            post(payments::check_status).get(payments::check_status_query),
        )
        .route(
            "/api/payments/kpay/finalize",
            post(payments::finalize_payment).get(method_not_allowed),
        )
        .route(
            "/api/payments/timeout",
            post(payments::record_timeout).get(method_not_allowed),
        )
        .route(
            "/api/payments/retry",
            post(payments::retry_payment).get(method_not_allowed),
        )
        .route(
            "/api/payments/order/{orderId}",
            get(payments::payments_for_order),
        )
        .route(
            "/api/payments/{paymentId}",
            get(payments::get_payment).patch(payments::link_payment),
        )
        .route(
            "/api/webhooks/kpay",
            post(webhooks::relay_kpay_webhook).get(method_not_allowed),
        )
        .route("/api/admin/transactions", get(transactions::list_transactions))
        .route(
            "/api/admin/transactions/stats",
            get(transactions::transaction_stats),
        )
        .route(
            "/api/admin/transactions/counts",
            get(transactions::transaction_counts),
        )
        .route(
            "/api/admin/settings/orders-enabled",
            get(settings::get_orders_enabled)
                .post(settings::set_orders_enabled)
                .delete(settings::clear_orders_enabled),
        )
        .route("/api/admin/riders", get(directory::list_riders))
        .route("/api/admin/users", get(directory::list_users))
        .route("/api/orders/{id}", get(orders::get_order))
        .with_state(state)
}

/// Answers GET on the POST-only payment and webhook routes.
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

/// Origin the storefront is served from, for payment return URLs.
///
/// `PUBLIC_BASE_URL` wins, then the forwarded proto/host pair, then `Host`.
pub fn public_base_url(configured: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = configured.filter(|u| !u.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }

    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let host = value("x-forwarded-host").or_else(|| value(header::HOST.as_str()));
    match host {
        Some(host) => {
            let proto = value("x-forwarded-proto").unwrap_or_else(|| {
                if host.starts_with("localhost") || host.starts_with("127.0.0.1") {
                    "http".to_string()
                } else {
                    "https".to_string()
                }
            });
            format!("{}://{}", proto, host)
        }
        None => LOCAL_ORIGIN.to_string(),
    }
}

/// A path parameter that is safe to place in a backend path.
///
/// `Path` has already percent-decoded the value, so separators and parent
/// segments are refused here.
pub fn path_segment<'a>(value: &'a str, required: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(required));
    }
    if value.contains('/') || value.contains('\\') || value.contains("..") {
        return Err(AppError::validation("Invalid identifier"));
    }
    Ok(value)
}

/// Decodes a JSON request body; an unreadable body is an internal error.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| AppError::internal(format!("invalid JSON body: {}", e)))
}
