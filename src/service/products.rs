//! `/api/products` handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::observability::SpanOptions;
use crate::server::AppState;
use crate::storage::{Filter, NewProduct, Product};

/// Availability flag accepted as a boolean or as `0`/`1`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Availability {
    Flag(bool),
    Number(i64),
}

impl Availability {
    fn is_available(self) -> bool {
        match self {
            Self::Flag(flag) => flag,
            Self::Number(n) => n != 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub is_available: Option<Availability>,
}

/// `GET /api/products`: products not marked deleted.
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .tracer
        .with_counted_span(
            "products.list",
            SpanOptions::new().with_attribute("operation.type", "read"),
            || state.products.find_all(Filter::eq("deleted", false)),
        )
        .await?;
    Ok(Json(products))
}

/// `POST /api/products`
pub async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let (Some(name), Some(price)) = (body.name.filter(|name| !name.is_empty()), body.price) else {
        return Err(ApiError::validation("Name and price are required"));
    };

    let draft = NewProduct {
        name,
        price,
        description: body.description,
        is_available: body.is_available.map_or(true, Availability::is_available),
    };
    let product = state
        .tracer
        .with_counted_span(
            "products.create",
            SpanOptions::new().with_attribute("operation.type", "write"),
            || state.products.create(draft),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}
