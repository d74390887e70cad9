//! Order creation and the order/refund mutations, with the query-cache
//! bookkeeping each mutation owes the storefront.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::order::{adapt_order, CreatedOrder};
use crate::backend::authorized::AuthorizedClient;
use crate::backend::client::{message_from, BackendError};
use crate::payments::types::PaymentMethod;
use crate::services::query_cache::{order_keys, QueryCache, Snapshot};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Delivered,
    Canceled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Requested,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundDecision {
    Approved,
    Rejected,
}

/// Header of an order about to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    /// Transport fee.
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub customer_email: String,
    pub customer_first_name: String,
    pub customer_last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub delivery_address: String,
    pub delivery_city: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_variation_id: Option<String>,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_name: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl OrderLineItem {
    pub fn line_total(price: Decimal, quantity: u32) -> Decimal {
        price * Decimal::from(quantity)
    }
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order: OrderHeader,
    pub items: Vec<OrderLineItem>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum OrderServiceError {
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{message}")]
    Transport { message: String },

    #[error("Unexpected order response: {message}")]
    Decode { message: String },
}

impl From<BackendError> for OrderServiceError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Transport { message, .. } => OrderServiceError::Transport { message },
            BackendError::Decode { message } => OrderServiceError::Decode { message },
            BackendError::Status { status, body } => OrderServiceError::Rejected {
                status,
                message: message_from(&body).unwrap_or_else(|| format!("HTTP {}", status)),
            },
        }
    }
}

pub type OrderResult<T> = Result<T, OrderServiceError>;

/// Order creation as the checkout sees it.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn create_order(&self, draft: &OrderDraft) -> OrderResult<CreatedOrder>;
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct OrderClient {
    client: AuthorizedClient,
    cache: Arc<QueryCache>,
}

impl OrderClient {
    pub fn new(client: AuthorizedClient, cache: Arc<QueryCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub async fn fetch_order(&self, id: &str) -> OrderResult<JsonValue> {
        let body = self
            .client
            .request_json(Method::GET, &format!("/orders/{}", id), None)
            .await?;
        let order = adapt_order(&body);
        self.cache.set(order_keys::detail(id), order.clone()).await;
        Ok(order)
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: OrderStatus,
        extra: &Map<String, JsonValue>,
    ) -> OrderResult<JsonValue> {
        let snapshot = self.cache.apply_order_status(id, status.as_str(), extra).await;
        let updated = self
            .mutate(
                Method::PATCH,
                &format!("/orders/admin/{}/status", id),
                Some(json!({ "status": status })),
                snapshot,
            )
            .await?;

        let order = adapt_order(&updated);
        let key_id = crate::payments::gateway::string_field(&order, "id")
            .unwrap_or_else(|| id.to_string());
        self.cache.set(order_keys::detail(&key_id), order.clone()).await;
        self.cache.invalidate(&order_keys::lists()).await;
        self.cache.invalidate(&order_keys::stats()).await;

        info!(order_id = id, status = status.as_str(), "order status updated");
        Ok(order)
    }

    pub async fn request_item_refund(&self, item_id: &str, reason: &str) -> OrderResult<JsonValue> {
        let fields = refund_fields(true, Some(reason), RefundStatus::Requested);
        let snapshot = self.cache.patch_order_item(item_id, &fields).await;
        let reply = self
            .mutate(
                Method::POST,
                &format!("/orders/items/{}/refund", item_id),
                Some(json!({ "reason": reason })),
                snapshot,
            )
            .await?;
        self.cache.invalidate(&order_keys::lists()).await;
        Ok(reply)
    }

    pub async fn cancel_item_refund(&self, item_id: &str) -> OrderResult<JsonValue> {
        let fields = refund_fields(false, None, RefundStatus::Cancelled);
        let snapshot = self.cache.patch_order_item(item_id, &fields).await;
        let reply = self
            .mutate(
                Method::POST,
                &format!("/orders/items/{}/refund/cancel", item_id),
                None,
                snapshot,
            )
            .await?;
        self.cache.invalidate(&order_keys::lists()).await;
        Ok(reply)
    }

    pub async fn respond_item_refund(
        &self,
        item_id: &str,
        decision: RefundDecision,
        response: Option<&str>,
    ) -> OrderResult<JsonValue> {
        let reply = self
            .mutate(
                Method::POST,
                &format!("/orders/admin/items/{}/refund/respond", item_id),
                Some(json!({ "action": decision, "response": response })),
                Snapshot::new(),
            )
            .await?;
        self.cache.invalidate(&order_keys::details()).await;
        self.cache.invalidate(&order_keys::lists()).await;
        Ok(reply)
    }

    pub async fn request_order_refund(
        &self,
        order_id: &str,
        reason: &str,
    ) -> OrderResult<JsonValue> {
        let fields = refund_fields(true, Some(reason), RefundStatus::Requested);
        let snapshot = self.cache.patch_order(order_id, &fields).await;
        let reply = self
            .mutate(
                Method::POST,
                &format!("/orders/{}/refund", order_id),
                Some(json!({ "reason": reason })),
                snapshot,
            )
            .await?;
        self.settle_order(order_id, &reply).await
    }

    pub async fn cancel_order_refund(&self, order_id: &str) -> OrderResult<JsonValue> {
        let fields = refund_fields(false, None, RefundStatus::Cancelled);
        let snapshot = self.cache.patch_order(order_id, &fields).await;
        let reply = self
            .mutate(
                Method::POST,
                &format!("/orders/{}/refund/cancel", order_id),
                None,
                snapshot,
            )
            .await?;
        self.settle_order(order_id, &reply).await
    }

    pub async fn respond_order_refund(
        &self,
        order_id: &str,
        decision: RefundDecision,
        response: Option<&str>,
    ) -> OrderResult<JsonValue> {
        let reply = self
            .mutate(
                Method::POST,
                &format!("/orders/admin/{}/refund/respond", order_id),
                Some(json!({ "action": decision, "response": response })),
                Snapshot::new(),
            )
            .await?;
        self.settle_order(order_id, &reply).await
    }

    /// Sends a mutation and puts `snapshot` back if it fails.
    async fn mutate(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        snapshot: Snapshot,
    ) -> OrderResult<JsonValue> {
        match self.client.request_json(method, path, body).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                if !snapshot.is_empty() {
                    warn!(path, entries = snapshot.len(), error = %e, "mutation failed, rolling back cache");
                    self.cache.restore(snapshot).await;
                }
                Err(e.into())
            }
        }
    }

    async fn settle_order(&self, order_id: &str, reply: &JsonValue) -> OrderResult<JsonValue> {
        let order = adapt_order(reply);
        if order.get("id").is_some() {
            self.cache.set(order_keys::detail(order_id), order.clone()).await;
        } else {
            self.cache.invalidate(&order_keys::detail(order_id)).await;
        }
        self.cache.invalidate(&order_keys::lists()).await;
        Ok(order)
    }
}

fn refund_fields(requested: bool, reason: Option<&str>, status: RefundStatus) -> Map<String, JsonValue> {
    let mut fields = Map::new();
    fields.insert("refund_requested".into(), JsonValue::Bool(requested));
    fields.insert(
        "refund_reason".into(),
        reason.map(|r| JsonValue::String(r.to_string())).unwrap_or(JsonValue::Null),
    );
    fields.insert("refund_status".into(), json!(status));
    fields.insert(
        "refund_requested_at".into(),
        if requested {
            JsonValue::String(Utc::now().to_rfc3339())
        } else {
            JsonValue::Null
        },
    );
    fields
}

#[async_trait]
impl OrderService for OrderClient {
    async fn create_order(&self, draft: &OrderDraft) -> OrderResult<CreatedOrder> {
        let payload = serde_json::to_value(draft).map_err(|e| OrderServiceError::Decode {
            message: e.to_string(),
        })?;
        let body = self
            .client
            .request_json(Method::POST, "/orders", Some(payload))
            .await?;

        let created = CreatedOrder::from_response(&body).ok_or_else(|| OrderServiceError::Decode {
            message: "order id missing from response".to_string(),
        })?;

        let order = body
            .get("order")
            .or_else(|| body.get("data").filter(|d| d.is_object()))
            .unwrap_or(&body);
        self.cache.invalidate(&order_keys::lists()).await;
        self.cache
            .set(order_keys::detail(&created.id), adapt_order(order))
            .await;
        if let Some(user) = self.client.session().user().await {
            self.cache.invalidate(&order_keys::user_orders(&user.id)).await;
        }

        info!(
            order_id = %created.id,
            order_number = created.order_number.as_deref().unwrap_or(""),
            items = draft.items.len(),
            "order created"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::client::BackendClient;
    use crate::backend::session::MemorySessionStore;
    use crate::config::BackendConfig;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;

    fn client(server: &MockServer, cache: Arc<QueryCache>) -> OrderClient {
        let backend = BackendClient::new(&BackendConfig::new(server.base_url())).unwrap();
        let session = Arc::new(MemorySessionStore::new());
        OrderClient::new(AuthorizedClient::new(backend, session), cache)
    }

    fn draft() -> OrderDraft {
        OrderDraft {
            order: OrderHeader {
                user_id: None,
                subtotal: Decimal::new(3000, 0),
                tax: Decimal::new(1000, 0),
                total: Decimal::new(4000, 0),
                customer_email: "guest-250788000000@nihemart.rw".into(),
                customer_first_name: "Aline".into(),
                customer_last_name: "Uwase".into(),
                customer_phone: Some("0788000000".into()),
                delivery_address: "KG 11 Ave".into(),
                delivery_city: "Kigali".into(),
                status: OrderStatus::Pending,
                payment_method: PaymentMethod::CashOnDelivery,
                delivery_notes: None,
                schedule_notes: None,
            },
            items: vec![OrderLineItem {
                product_id: "p1".into(),
                product_variation_id: None,
                product_name: "Rice".into(),
                product_sku: None,
                variation_name: None,
                price: Decimal::new(1500, 0),
                quantity: 2,
                total: OrderLineItem::line_total(Decimal::new(1500, 0), 2),
            }],
        }
    }

    #[test]
    fn test_draft_serializes_numbers_and_skips_empty_fields() {
        let value = serde_json::to_value(draft()).unwrap();
        assert_eq!(value["order"]["total"], json!(4000.0));
        assert_eq!(value["order"]["status"], "pending");
        assert_eq!(value["order"]["payment_method"], "cash_on_delivery");
        assert!(value["order"].get("schedule_notes").is_none());
        assert_eq!(value["items"][0]["total"], json!(3000.0));
    }

    #[tokio::test]
    async fn test_create_order_primes_detail_and_drops_lists() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/orders");
                then.status(201)
                    .json_body(json!({ "id": "o1", "orderNumber": "NM-1001", "items": [] }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        cache.set(order_keys::list(&json!({})), json!({ "data": [] })).await;

        let created = client(&server, cache.clone()).create_order(&draft()).await.unwrap();

        assert_eq!(created.id, "o1");
        assert_eq!(created.order_number.as_deref(), Some("NM-1001"));
        assert!(cache.get(&order_keys::list(&json!({}))).await.is_none());
        let detail = cache.get(&order_keys::detail("o1")).await.unwrap();
        assert_eq!(detail["order_number"], "NM-1001");
    }

    #[tokio::test]
    async fn test_create_order_surfaces_backend_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/orders");
                then.status(400).json_body(json!({ "message": "invalid input syntax for type uuid" }));
            })
            .await;

        let err = client(&server, Arc::new(QueryCache::new()))
            .create_order(&draft())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("uuid"));
    }

    #[tokio::test]
    async fn test_status_update_rolls_back_on_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/orders/admin/o1/status");
                then.status(500).json_body(json!({ "error": "boom" }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        cache.set(order_keys::detail("o1"), json!({ "id": "o1", "status": "pending" })).await;

        let result = client(&server, cache.clone())
            .update_status("o1", OrderStatus::Delivered, &Map::new())
            .await;

        assert!(result.is_err());
        let detail = cache.get(&order_keys::detail("o1")).await.unwrap();
        assert_eq!(detail["status"], "pending");
    }

    #[tokio::test]
    async fn test_status_update_success_invalidates_stats() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/orders/admin/o1/status")
                    .json_body(json!({ "status": "processing" }));
                then.status(200).json_body(json!({ "id": "o1", "status": "processing" }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        cache.set(order_keys::stats(), json!({ "total": 1 })).await;

        let order = client(&server, cache.clone())
            .update_status("o1", OrderStatus::Processing, &Map::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(order["status"], "processing");
        assert!(cache.get(&order_keys::stats()).await.is_none());
        assert_eq!(
            cache.get(&order_keys::detail("o1")).await.unwrap()["status"],
            "processing"
        );
    }

    #[tokio::test]
    async fn test_item_refund_request_projects_state() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/orders/items/i1/refund")
                    .json_body(json!({ "reason": "damaged" }));
                then.status(200).json_body(json!({ "success": true }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        cache
            .set(order_keys::detail("o1"), json!({ "id": "o1", "items": [{ "id": "i1" }] }))
            .await;

        client(&server, cache.clone())
            .request_item_refund("i1", "damaged")
            .await
            .unwrap();

        let item = cache.get(&order_keys::detail("o1")).await.unwrap()["items"][0].clone();
        assert_eq!(item["refund_requested"], true);
        assert_eq!(item["refund_status"], "requested");
        assert_eq!(item["refund_reason"], "damaged");
        assert!(item["refund_requested_at"].is_string());
    }

    #[tokio::test]
    async fn test_refund_response_sends_action() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/orders/admin/items/i1/refund/respond")
                    .json_body(json!({ "action": "rejected", "response": "used item" }));
                then.status(200).json_body(json!({ "id": "r1" }));
            })
            .await;

        client(&server, Arc::new(QueryCache::new()))
            .respond_item_refund("i1", RefundDecision::Rejected, Some("used item"))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_order_adapts_and_caches() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/orders/o7");
                then.status(200)
                    .json_body(json!({ "id": "o7", "orderNumber": "NM-7", "items": [] }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        let order = client(&server, cache.clone()).fetch_order("o7").await.unwrap();

        assert_eq!(order["order_number"], "NM-7");
        assert_eq!(cache.get(&order_keys::detail("o7")).await, Some(order));
    }

    #[tokio::test]
    async fn test_item_refund_cancel_projects_cancelled() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/orders/items/i1/refund/cancel");
                then.status(200).json_body(json!({ "success": true }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        cache
            .set(
                order_keys::detail("o1"),
                json!({ "id": "o1", "items": [{ "id": "i1", "refund_status": "requested" }] }),
            )
            .await;

        client(&server, cache.clone())
            .cancel_item_refund("i1")
            .await
            .unwrap();

        let item = cache.get(&order_keys::detail("o1")).await.unwrap()["items"][0].clone();
        assert_eq!(item["refund_status"], "cancelled");
        assert_eq!(item["refund_requested"], false);
        assert!(item["refund_reason"].is_null());
    }

    #[tokio::test]
    async fn test_order_refund_request_settles_detail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/orders/o1/refund")
                    .json_body(json!({ "reason": "late delivery" }));
                then.status(200).json_body(json!({
                    "id": "o1",
                    "refundStatus": "requested",
                    "refundRequested": true
                }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        cache.set(order_keys::list(&json!({})), json!({ "data": [{ "id": "o1" }] })).await;

        let order = client(&server, cache.clone())
            .request_order_refund("o1", "late delivery")
            .await
            .unwrap();

        assert_eq!(order["id"], "o1");
        assert_eq!(cache.get(&order_keys::detail("o1")).await, Some(order));
        assert!(cache.get(&order_keys::list(&json!({}))).await.is_none());
    }

    #[tokio::test]
    async fn test_order_refund_cancel_rolls_back_on_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/orders/o1/refund/cancel");
                then.status(409).json_body(json!({ "message": "Refund already processed" }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        let before = json!({ "id": "o1", "refund_status": "approved", "refund_requested": true });
        cache.set(order_keys::detail("o1"), before.clone()).await;

        let err = client(&server, cache.clone())
            .cancel_order_refund("o1")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Refund already processed");
        assert_eq!(cache.get(&order_keys::detail("o1")).await, Some(before));
    }

    #[tokio::test]
    async fn test_order_refund_response_without_order_drops_detail() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/orders/admin/o1/refund/respond")
                    .json_body(json!({ "action": "approved", "response": null }));
                then.status(200).json_body(json!({ "success": true }));
            })
            .await;

        let cache = Arc::new(QueryCache::new());
        cache.set(order_keys::detail("o1"), json!({ "id": "o1" })).await;

        client(&server, cache.clone())
            .respond_order_refund("o1", RefundDecision::Approved, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(cache.get(&order_keys::detail("o1")).await.is_none());
    }
}
