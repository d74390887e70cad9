//! Integration tests for the /api/admin rider and user listings

mod common;

use axum::body::Body;
use common::{app, get, send_json};
use http::{Request, StatusCode};
use httpmock::prelude::*;
use serde_json::json;

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", "Bearer admin-tok")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_riders_are_adapted_to_snake_case() {
    let server = MockServer::start_async().await;
    let backend = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/riders")
                .query_param("active", "true")
                .header("authorization", "Bearer admin-tok");
            then.status(200).json_body(json!({
                "data": [
                    { "id": "r1", "fullName": "Eric Niyonzima", "imageUrl": "https://img/r1", "active": true },
                    { "id": "r2", "full_name": "Divine Ingabire", "vehicle": "moto" },
                    { "fullName": "no id" }
                ]
            }));
        })
        .await;

    let (status, body) = send_json(app(&server), admin_get("/api/admin/riders?active=true")).await;

    backend.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    let riders = body.as_array().unwrap();
    assert_eq!(riders.len(), 2);
    assert_eq!(riders[0]["full_name"], "Eric Niyonzima");
    assert_eq!(riders[0]["image_url"], "https://img/r1");
    assert_eq!(riders[0]["active"], true);
    assert_eq!(riders[1]["vehicle"], "moto");
    assert_eq!(riders[1]["active"], false);
}

#[tokio::test]
async fn test_riders_default_to_all() {
    let server = MockServer::start_async().await;
    let backend = server
        .mock_async(|when, then| {
            when.method(GET).path("/riders").query_param("active", "false");
            then.status(200).json_body(json!([{ "id": "r9" }]));
        })
        .await;

    let (status, body) = send_json(app(&server), get("/api/admin/riders")).await;

    backend.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "r9");
}

#[tokio::test]
async fn test_rider_rejection_is_relayed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/riders");
            then.status(403).json_body(json!({ "message": "Admin only" }));
        })
        .await;

    let (status, body) = send_json(app(&server), get("/api/admin/riders")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Admin only");
}

#[tokio::test]
async fn test_users_carry_order_aggregates() {
    let server = MockServer::start_async().await;
    let users = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/users")
                .query_param("page", "2")
                .header("authorization", "Bearer admin-tok");
            then.status(200).json_body(json!({
                "users": [
                    { "id": "u1", "email": "aline@nihemart.rw", "fullName": "Aline Uwase", "roles": ["admin"] },
                    { "id": "u2", "email": "eric@nihemart.rw", "role": "rider" }
                ]
            }));
        })
        .await;
    let orders = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/orders/admin/all")
                .header("authorization", "Bearer admin-tok");
            then.status(200).json_body(json!({
                "data": [
                    { "userId": "u1", "total": 12000 },
                    { "user_id": "u1", "total": "3500" },
                    { "userId": "someone-else", "total": 100 }
                ]
            }));
        })
        .await;

    let (status, body) = send_json(app(&server), admin_get("/api/admin/users?page=2")).await;

    users.assert_async().await;
    orders.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["full_name"], "Aline Uwase");
    assert_eq!(body[0]["role"], "admin");
    assert_eq!(body[0]["orderCount"], 2);
    assert_eq!(body[0]["totalSpend"], json!(15500.0));
    assert_eq!(body[1]["role"], "rider");
    assert_eq!(body[1]["orderCount"], 0);
}

#[tokio::test]
async fn test_users_survive_order_list_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users");
            then.status(200).json_body(json!([{ "id": "u1", "email": "a@b.rw" }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/admin/all");
            then.status(500).json_body(json!({ "error": "db down" }));
        })
        .await;

    let (status, body) = send_json(app(&server), get("/api/admin/users")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["email"], "a@b.rw");
    assert_eq!(body[0]["orderCount"], 0);
    assert_eq!(body[0]["totalSpend"], json!(0.0));
}

#[tokio::test]
async fn test_user_rejection_skips_order_list() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users");
            then.status(401).json_body(json!({ "error": "Unauthorized" }));
        })
        .await;
    let orders = server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/admin/all");
            then.status(200).json_body(json!([]));
        })
        .await;

    let (status, body) = send_json(app(&server), get("/api/admin/users")).await;

    orders.assert_hits_async(0).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}
