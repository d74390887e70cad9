//! Hierarchical query keys and the in-memory query cache behind the order
//! hooks. Lists are invalidated by prefix, and mutations project their
//! effect onto cached entries before the backend answers.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn root(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

pub mod order_keys {
    use super::QueryKey;
    use serde_json::Value as JsonValue;

    pub fn all() -> QueryKey {
        QueryKey::root("orders")
    }

    pub fn lists() -> QueryKey {
        all().child("list")
    }

    /// List key for a set of query options, rendered as compact JSON.
    pub fn list(options: &JsonValue) -> QueryKey {
        lists().child(options.to_string())
    }

    pub fn details() -> QueryKey {
        all().child("detail")
    }

    pub fn detail(id: &str) -> QueryKey {
        details().child(id)
    }

    pub fn stats() -> QueryKey {
        all().child("stats")
    }

    pub fn user_orders(user_id: &str) -> QueryKey {
        all().child("user").child(user_id)
    }
}

pub mod rider_keys {
    use super::QueryKey;

    pub fn all() -> QueryKey {
        QueryKey::root("riders")
    }

    pub fn lists() -> QueryKey {
        all().child("list")
    }

    pub fn list(active_only: bool) -> QueryKey {
        lists().child(format!("activeOnly={}", active_only))
    }

    pub fn details() -> QueryKey {
        all().child("detail")
    }

    pub fn detail(id: &str) -> QueryKey {
        details().child(id)
    }

    pub fn by_user(user_id: &str) -> QueryKey {
        all().child("byUser").child(user_id)
    }

    pub fn my_profile() -> QueryKey {
        all().child("myProfile")
    }

    pub fn assignments(rider_id: &str) -> QueryKey {
        all().child("assignments").child(rider_id)
    }

    pub fn my_assignments() -> QueryKey {
        all().child("myAssignments")
    }
}

pub mod payment_keys {
    use super::QueryKey;

    pub fn all() -> QueryKey {
        QueryKey::root("payments")
    }

    pub fn details() -> QueryKey {
        all().child("detail")
    }

    pub fn detail(id: &str) -> QueryKey {
        details().child(id)
    }

    pub fn by_order(order_id: &str) -> QueryKey {
        all().child("order").child(order_id)
    }

    pub fn status(reference: &str) -> QueryKey {
        all().child("status").child(reference)
    }
}

pub mod user_keys {
    use super::QueryKey;

    pub fn all() -> QueryKey {
        QueryKey::root("users")
    }

    pub fn lists() -> QueryKey {
        all().child("list")
    }

    pub fn detail(id: &str) -> QueryKey {
        all().child("detail").child(id)
    }

    pub fn current() -> QueryKey {
        all().child("current")
    }
}

/// Previous values of the entries a projection changed.
pub type Snapshot = Vec<(QueryKey, JsonValue)>;

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, JsonValue>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &QueryKey) -> Option<JsonValue> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: QueryKey, value: JsonValue) {
        self.entries.write().await.insert(key, value);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops every entry under `prefix` and returns how many went.
    pub async fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub async fn restore(&self, snapshot: Snapshot) {
        let mut entries = self.entries.write().await;
        for (key, value) in snapshot {
            entries.insert(key, value);
        }
    }

    /// Merges `fields` into the order `order_id`, whether cached on its own
    /// or inside the `data` array of a paginated list.
    pub async fn patch_order(&self, order_id: &str, fields: &Map<String, JsonValue>) -> Snapshot {
        self.project(None, |value| {
            if id_matches(value, order_id) {
                return Some(merged(value, fields));
            }
            let list = value.get("data")?.as_array()?;
            if !list.iter().any(|order| id_matches(order, order_id)) {
                return None;
            }
            let mut updated = value.clone();
            updated["data"] = JsonValue::Array(
                list.iter()
                    .map(|order| {
                        if id_matches(order, order_id) {
                            merged(order, fields)
                        } else {
                            order.clone()
                        }
                    })
                    .collect(),
            );
            Some(updated)
        })
        .await
    }

    pub async fn apply_order_status(
        &self,
        order_id: &str,
        status: &str,
        extra: &Map<String, JsonValue>,
    ) -> Snapshot {
        let mut fields = extra.clone();
        fields.insert("status".to_string(), JsonValue::String(status.to_string()));
        self.patch_order(order_id, &fields).await
    }

    /// Merges `fields` into the order item `item_id` in cached order details
    /// and order lists.
    pub async fn patch_order_item(
        &self,
        item_id: &str,
        fields: &Map<String, JsonValue>,
    ) -> Snapshot {
        let details = order_keys::details();
        let lists = order_keys::lists();
        let in_scope: &(dyn Fn(&QueryKey) -> bool + Send + Sync) =
            &move |key: &QueryKey| key.starts_with(&details) || key.starts_with(&lists);

        self.project(Some(in_scope), |value| {
            if let Some(order) = patch_items(value, item_id, fields) {
                return Some(order);
            }
            let list = value.get("data")?.as_array()?;
            let mut touched = false;
            let patched: Vec<JsonValue> = list
                .iter()
                .map(|order| match patch_items(order, item_id, fields) {
                    Some(updated) => {
                        touched = true;
                        updated
                    }
                    None => order.clone(),
                })
                .collect();
            if !touched {
                return None;
            }
            let mut updated = value.clone();
            updated["data"] = JsonValue::Array(patched);
            Some(updated)
        })
        .await
    }

    async fn project<F>(
        &self,
        scope: Option<&(dyn Fn(&QueryKey) -> bool + Send + Sync)>,
        transform: F,
    ) -> Snapshot
    where
        F: Fn(&JsonValue) -> Option<JsonValue>,
    {
        let mut entries = self.entries.write().await;
        let mut previous = Vec::new();
        for (key, value) in entries.iter_mut() {
            if let Some(scope) = scope {
                if !scope(key) {
                    continue;
                }
            }
            if let Some(updated) = transform(value) {
                previous.push((key.clone(), std::mem::replace(value, updated)));
            }
        }
        previous
    }
}

fn id_matches(value: &JsonValue, id: &str) -> bool {
    value.get("id").and_then(|v| v.as_str()) == Some(id)
}

fn merged(value: &JsonValue, fields: &Map<String, JsonValue>) -> JsonValue {
    let mut out = value.clone();
    if let Some(object) = out.as_object_mut() {
        for (k, v) in fields {
            object.insert(k.clone(), v.clone());
        }
    }
    out
}

fn patch_items(order: &JsonValue, item_id: &str, fields: &Map<String, JsonValue>) -> Option<JsonValue> {
    let items = order.get("items")?.as_array()?;
    if !items.iter().any(|item| id_matches(item, item_id)) {
        return None;
    }
    let mut updated = order.clone();
    updated["items"] = JsonValue::Array(
        items
            .iter()
            .map(|item| {
                if id_matches(item, item_id) {
                    merged(item, fields)
                } else {
                    item.clone()
                }
            })
            .collect(),
    );
    Some(updated)
}
