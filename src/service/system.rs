//! `/api/metrics/system` handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use opentelemetry::KeyValue;
use serde_json::json;

use crate::error::ApiError;
use crate::observability::{add_attributes, add_system_metrics_to_span, SpanOptions};
use crate::server::AppState;

/// `GET /api/metrics/system`: a fresh snapshot plus a health verdict.
pub async fn system_metrics(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = state.tracer.with_span_sync(
        "metrics.system",
        SpanOptions::new().with_attribute("operation.type", "system.monitoring"),
        || {
            add_attributes([
                KeyValue::new("http.method", "GET"),
                KeyValue::new("http.route", "/api/metrics/system"),
            ]);

            let snapshot = state.sampler.sample();
            add_system_metrics_to_span(&snapshot);
            add_attributes([KeyValue::new("operation.success", true)]);

            Ok::<_, ApiError>(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "health": snapshot.health(),
                "metrics": snapshot,
            }))
        },
    )?;
    Ok(Json(body))
}
