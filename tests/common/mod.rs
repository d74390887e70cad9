#![allow(dead_code)]

use axum::{body::Body, Router};
use http::{Request, StatusCode};
use httpmock::MockServer;
use nihemart_gateway::api::{self, AppState};
use nihemart_gateway::backend::{Backoff, BackendClient, RetryPolicy};
use nihemart_gateway::config::BackendConfig;
use nihemart_gateway::services::idempotency::{MemoryOrderLedger, OrderLedger};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub fn backend(server: &MockServer) -> BackendClient {
    BackendClient::new(&BackendConfig::new(server.base_url())).unwrap()
}

pub fn state_with_ledger(server: &MockServer, ledger: Arc<dyn OrderLedger>) -> AppState {
    AppState::new(backend(server), ledger).with_status_policy(
        RetryPolicy::gateway_status(3).with_backoff(Backoff::Fixed(Duration::from_millis(1))),
    )
}

pub fn app(server: &MockServer) -> Router {
    api::router(state_with_ledger(server, Arc::new(MemoryOrderLedger::new())))
}

pub fn json_request(method: &str, uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, JsonValue) {
    let (status, text) = send(app, request).await;
    (status, serde_json::from_str(&text).unwrap())
}
