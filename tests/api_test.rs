//! REST API behaviour tests.
//!
//! Tests:
//! - CRUD round trips for users, products and configs
//! - Validation failures return 400
//! - Fallback returns 404
//! - Performance-test counter cycle

mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_server_status_and_health() {
    let app = common::TestApp::new();

    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Server running");
    assert!(body["timestamp"].is_string());

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_create_and_list_users() {
    let app = common::TestApp::new();

    let (status, created) = app.post_json("/api/users", json!({ "name": "Ada" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Ada");
    assert!(created["id"].is_i64());
    assert!(created["createdAt"].is_string());

    let (status, listed) = app.get("/api/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "Ada");
}

#[tokio::test]
async fn test_missing_user_name_is_rejected() {
    let app = common::TestApp::new();

    let (status, body) = app.post_json("/api/users", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Name is required" }));

    let (_, listed) = app.get("/api/users").await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_products_default_available_and_hide_deleted() {
    let app = common::TestApp::new();

    let (status, lamp) = app
        .post_json("/api/products", json!({ "name": "Lamp", "price": 25 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lamp["isAvailable"], true);
    assert_eq!(lamp["deleted"], false);

    let (status, _) = app
        .post_json(
            "/api/products",
            json!({ "name": "Desk", "price": 120, "description": "oak", "isAvailable": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    app.db
        .get()
        .unwrap()
        .execute("UPDATE products SET deleted = 1 WHERE name = 'Lamp'", [])
        .unwrap();

    let (_, listed) = app.get("/api/products").await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "Desk");
    assert_eq!(listed[0]["isAvailable"], false);
}

#[tokio::test]
async fn test_product_requires_name_and_price() {
    let app = common::TestApp::new();

    let (status, body) = app.post_json("/api/products", json!({ "name": "Lamp" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Name and price are required");
}

#[tokio::test]
async fn test_configs_round_trip() {
    let app = common::TestApp::new();

    let (status, body) = app.post_json("/api/configs", json!({ "value": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Key is required");

    let (status, created) = app
        .post_json("/api/configs", json!({ "key": "app_name", "value": "Beacon" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["key"], "app_name");

    let (_, listed) = app.get("/api/configs").await;
    assert_eq!(listed[0]["value"], "Beacon");
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = common::TestApp::new();

    let (status, body) = app.get("/api/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Route not found" }));
}

#[tokio::test]
async fn test_system_metrics_endpoint() {
    let app = common::TestApp::new();

    let (status, body) = app.get("/api/metrics/system").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["metrics"]["memory"]["rssMb"].is_u64());
    assert!(body["metrics"]["cpu"]["loadAverage"].is_array());
    assert!(body["metrics"]["process"]["pid"].is_u64());
    assert!(["healthy", "warning"].contains(&body["health"]["status"].as_str().unwrap()));
}

#[tokio::test]
async fn test_performance_test_cycle() {
    let app = common::TestApp::new();

    let (status, first) = app.get("/api/products/performance-test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["callNumber"], 1);
    assert_eq!(first["performance"], "OPTIMIZED");
    assert_eq!(first["totalProducts"], 3);

    let (_, counter) = app.get("/api/products/performance-test/status").await;
    assert_eq!(counter, json!({ "currentCount": 1, "nextBehavior": "HEAVY" }));

    let (status, second) = app.get("/api/products/performance-test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["performance"], "HEAVY");

    let (status, third) = app.get("/api/products/performance-test").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(third["callNumber"], 3);

    let (_, fourth) = app.get("/api/products/performance-test").await;
    assert_eq!(fourth["performance"], "OPTIMIZED");

    let (status, reset) = app.post_json("/api/products/performance-test/reset", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["counter"], 0);
    let (_, counter) = app.get("/api/products/performance-test/status").await;
    assert_eq!(counter["currentCount"], 0);
}
