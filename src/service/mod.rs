//! REST handlers for Beacon.
//!
//! Handlers run inside the request's server span; data access goes through
//! the traced repositories held in [`AppState`].

pub mod configs;
pub mod health;
pub mod performance;
pub mod products;
pub mod system;
pub mod users;

pub use performance::PerformanceLab;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::server::AppState;

/// All API routes, without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health::server_status))
        .route("/health", get(health::health_check))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/api/configs", get(configs::list_configs).post(configs::create_config))
        .route("/api/metrics/system", get(system::system_metrics))
        .route(
            "/api/products/performance-test",
            get(performance::performance_test),
        )
        .route(
            "/api/products/performance-test/reset",
            post(performance::reset_counter),
        )
        .route(
            "/api/products/performance-test/status",
            get(performance::counter_status),
        )
        .fallback(route_not_found)
}

async fn route_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}
