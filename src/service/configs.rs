//! `/api/configs` handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::observability::SpanOptions;
use crate::server::AppState;
use crate::storage::{ConfigEntry, Filter, NewConfigEntry};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateConfigRequest {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// `GET /api/configs`
pub async fn list_configs(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConfigEntry>>, ApiError> {
    let configs = state
        .tracer
        .with_counted_span(
            "configs.list",
            SpanOptions::new().with_attribute("operation.type", "read"),
            || state.configs.find_all(Filter::all()),
        )
        .await?;
    Ok(Json(configs))
}

/// `POST /api/configs`
pub async fn create_config(
    State(state): State<AppState>,
    Json(body): Json<CreateConfigRequest>,
) -> Result<(StatusCode, Json<ConfigEntry>), ApiError> {
    let key = body
        .key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ApiError::validation("Key is required"))?;

    let entry = state
        .tracer
        .with_counted_span(
            "configs.create",
            SpanOptions::new().with_attribute("operation.type", "write"),
            || {
                state.configs.create(NewConfigEntry {
                    key,
                    value: body.value,
                })
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
