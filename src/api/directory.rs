//! Admin rider and user listings.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::adapters::rider::{adapt_riders, RiderView};
use crate::adapters::user::{summarize_users, UserSummary};
use crate::api::{bearer_token, AppState};
use crate::error::{AppError, AppResult};

/// Entries of a list reply: the body itself, or its `key` or `data` array.
fn list_items(body: &JsonValue, key: &str) -> Vec<JsonValue> {
    [Some(body), body.get(key), body.get("data")]
        .into_iter()
        .flatten()
        .find_map(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// GET /api/admin/riders
///
/// `active=true` narrows the listing to riders on duty.
pub async fn list_riders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Vec<RiderView>>> {
    let active_only = params.get("active").map(|v| v == "true").unwrap_or(false);

    let token = bearer_token(&headers);
    let reply = state
        .backend
        .get("/riders")
        .bearer(token.as_deref())
        .query("active", active_only.to_string())
        .send()
        .await?;

    if !reply.is_success() {
        error!(status = reply.status, "Backend rider list fetch failed");
        return Err(AppError::upstream(
            reply.status,
            reply.message_or("Failed to fetch riders"),
        ));
    }

    let riders = adapt_riders(&reply.body);
    info!(active_only, count = riders.len(), "Riders retrieved");
    Ok(Json(riders))
}

/// GET /api/admin/users
///
/// Users are joined with the admin order list for per-user order counts
/// and spend. An unreadable order list leaves the aggregates at zero.
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let token = bearer_token(&headers);
    let reply = state
        .backend
        .get("/users")
        .bearer(token.as_deref())
        .query_opt("page", params.get("page").map(String::as_str))
        .query_opt("limit", params.get("limit").map(String::as_str))
        .query_opt("role", params.get("role").map(String::as_str))
        .query_opt("search", params.get("search").map(String::as_str))
        .send()
        .await?;

    if !reply.is_success() {
        error!(status = reply.status, "Backend user list fetch failed");
        return Err(AppError::upstream(
            reply.status,
            reply.message_or("Failed to fetch users"),
        ));
    }
    let users = list_items(&reply.body, "users");

    let orders = match state
        .backend
        .get("/orders/admin/all")
        .bearer(token.as_deref())
        .send()
        .await
        .and_then(|reply| reply.into_result())
    {
        Ok(body) => list_items(&body, "orders"),
        Err(e) => {
            warn!(error = %e, "Failed to fetch orders for user stats");
            Vec::new()
        }
    };

    let summary = summarize_users(&users, &orders);
    info!(users = summary.len(), orders = orders.len(), "Users retrieved");
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_items_shapes() {
        assert_eq!(list_items(&json!([{ "id": 1 }]), "users").len(), 1);
        assert_eq!(list_items(&json!({ "users": [{}, {}] }), "users").len(), 2);
        assert_eq!(list_items(&json!({ "data": [{}] }), "users").len(), 1);
        assert!(list_items(&json!({ "data": null }), "users").is_empty());
    }
}
