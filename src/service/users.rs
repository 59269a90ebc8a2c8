//! `/api/users` handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::observability::SpanOptions;
use crate::server::AppState;
use crate::storage::{Filter, NewUser, User};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub name: Option<String>,
}

/// `GET /api/users`
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = state
        .tracer
        .with_counted_span(
            "users.list",
            SpanOptions::new().with_attribute("operation.type", "read"),
            || state.users.find_all(Filter::all()),
        )
        .await?;
    Ok(Json(users))
}

/// `POST /api/users`
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let name = body
        .name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::validation("Name is required"))?;

    let user = state
        .tracer
        .with_counted_span(
            "users.create",
            SpanOptions::new().with_attribute("operation.type", "write"),
            || state.users.create(NewUser { name }),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}
