use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::adapters::remap;

const ORDER_FIELDS: &[(&str, &str)] = &[
    ("orderNumber", "order_number"),
    ("userId", "user_id"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("shippedAt", "shipped_at"),
    ("deliveredAt", "delivered_at"),
    ("customerEmail", "customer_email"),
    ("customerFirstName", "customer_first_name"),
    ("customerLastName", "customer_last_name"),
    ("customerPhone", "customer_phone"),
    ("deliveryAddress", "delivery_address"),
    ("deliveryCity", "delivery_city"),
    ("deliveryNotes", "delivery_notes"),
    ("scheduleNotes", "schedule_notes"),
    ("deliveryTime", "delivery_time"),
    ("paymentMethod", "payment_method"),
    ("refundReason", "refund_reason"),
    ("refundStatus", "refund_status"),
    ("refundRequestedAt", "refund_requested_at"),
];

const ORDER_FLAGS: &[(&str, &str)] = &[
    ("isPaid", "is_paid"),
    ("isExternal", "is_external"),
    ("refundRequested", "refund_requested"),
];

const ITEM_FIELDS: &[(&str, &str)] = &[
    ("orderId", "order_id"),
    ("productId", "product_id"),
    ("productVariationId", "product_variation_id"),
    ("productName", "product_name"),
    ("productSku", "product_sku"),
    ("variationName", "variation_name"),
    ("productImageUrl", "product_image_url"),
    ("createdAt", "created_at"),
    ("refundReason", "refund_reason"),
    ("refundStatus", "refund_status"),
    ("refundRequestedAt", "refund_requested_at"),
];

const ITEM_FLAGS: &[(&str, &str)] = &[("refundRequested", "refund_requested")];

pub fn adapt_order(order: &JsonValue) -> JsonValue {
    let mut out = remap(order, ORDER_FIELDS, ORDER_FLAGS);
    if let Some(items) = out.get_mut("items").and_then(|v| v.as_array_mut()) {
        for item in items.iter_mut() {
            *item = remap(item, ITEM_FIELDS, ITEM_FLAGS);
        }
    }
    out
}

/// Accepts a paginated `{data: [...]}` body, a bare array or a single order.
pub fn adapt_order_list(body: &JsonValue) -> JsonValue {
    if let Some(list) = body.get("data").and_then(|v| v.as_array()) {
        let mut out = body.clone();
        out["data"] = JsonValue::Array(list.iter().map(adapt_order).collect());
        return out;
    }
    if let Some(list) = body.as_array() {
        return JsonValue::Array(list.iter().map(adapt_order).collect());
    }
    if body.is_null() {
        return JsonValue::Null;
    }
    adapt_order(body)
}

/// Identity of an order returned by `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: String,
    #[serde(default)]
    pub order_number: Option<String>,
}

impl CreatedOrder {
    /// Reads `{order: {...}}`, `{data: {...}}` or the order itself.
    pub fn from_response(body: &JsonValue) -> Option<Self> {
        let order = body
            .get("order")
            .or_else(|| body.get("data").filter(|d| d.is_object()))
            .unwrap_or(body);
        let adapted = adapt_order(order);
        let id = crate::payments::gateway::string_field(&adapted, "id")?;
        let order_number = crate::payments::gateway::string_field(&adapted, "order_number");
        Some(Self { id, order_number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adapt_order_maps_header_and_items() {
        let order = json!({
            "id": "o1",
            "orderNumber": "NM-1001",
            "isPaid": false,
            "is_paid": true,
            "deliveryCity": "Kigali",
            "items": [
                { "productId": "p1", "productName": "Rice 5kg", "refundRequested": true }
            ]
        });

        let out = adapt_order(&order);

        assert_eq!(out["order_number"], "NM-1001");
        assert_eq!(out["is_paid"], false);
        assert_eq!(out["delivery_city"], "Kigali");
        assert_eq!(out["items"][0]["product_id"], "p1");
        assert_eq!(out["items"][0]["refund_requested"], true);
    }

    #[test]
    fn test_adapt_order_list_shapes() {
        let paginated = json!({ "data": [{ "orderNumber": "1" }], "total": 1 });
        let out = adapt_order_list(&paginated);
        assert_eq!(out["data"][0]["order_number"], "1");
        assert_eq!(out["total"], 1);

        let bare = json!([{ "orderNumber": "2" }]);
        assert_eq!(adapt_order_list(&bare)[0]["order_number"], "2");

        let single = json!({ "orderNumber": "3" });
        assert_eq!(adapt_order_list(&single)["order_number"], "3");
    }

    #[test]
    fn test_created_order_from_wrapped_response() {
        let body = json!({ "order": { "id": "o9", "orderNumber": 1042 } });
        let created = CreatedOrder::from_response(&body).unwrap();
        assert_eq!(created.id, "o9");
        assert_eq!(created.order_number.as_deref(), Some("1042"));

        let body = json!({ "id": "o10", "order_number": "NM-10" });
        assert_eq!(
            CreatedOrder::from_response(&body).unwrap().order_number.as_deref(),
            Some("NM-10")
        );

        assert!(CreatedOrder::from_response(&json!({ "success": true })).is_none());
    }
}
