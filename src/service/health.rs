//! Liveness and readiness handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use opentelemetry::KeyValue;
use serde_json::json;

use crate::error::RequestFailure;
use crate::observability::{add_attributes, SpanOptions};
use crate::server::AppState;

/// `GET /`
pub async fn server_status() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Server running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /health`: checks that the database answers.
///
/// The `health.check` span also carries the pool's connection counts.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let outcome = state
        .tracer
        .with_span(
            "health.check",
            SpanOptions::new().with_attribute("operation.type", "health"),
            || {
                let pool = state.db.state();
                add_attributes([
                    KeyValue::new("db.pool.connections", i64::from(pool.connections)),
                    KeyValue::new("db.pool.idle_connections", i64::from(pool.idle_connections)),
                ]);
                state.db.ping()
            },
        )
        .await;

    match outcome {
        Ok(()) => Json(json!({ "status": "healthy" })).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            let message = err.to_string();
            RequestFailure {
                kind: err.kind(),
                message: message.clone(),
                status: StatusCode::INTERNAL_SERVER_ERROR,
            }
            .into_response_with(json!({ "status": "unhealthy", "error": message }))
        }
    }
}
