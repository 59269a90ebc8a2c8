//! Demo models persisted by the API.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::Row;
use serde::Serialize;

use crate::observability::ResultCount;

/// A row type stored in its own table.
///
/// `COLUMNS` lists every selected column; `id`, `created_at` and
/// `updated_at` are managed by the repository.
pub trait Model: Serialize + ResultCount + Send + Sized + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// Caller-supplied fields for a new row.
    type Draft: Send + 'static;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Column/value pairs to insert for `draft`.
    fn into_values(draft: Self::Draft) -> Vec<(&'static str, SqlValue)>;
}

macro_rules! single_result {
    ($($model:ty),+) => {
        $(
            impl ResultCount for $model {
                fn result_count(&self) -> Option<usize> {
                    Some(1)
                }
            }
        )+
    };
}

single_result!(User, Product, ConfigEntry);

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
}

impl Model for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &["id", "name", "created_at", "updated_at"];
    type Draft = NewUser;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_values(draft: NewUser) -> Vec<(&'static str, SqlValue)> {
        vec![("name", SqlValue::Text(draft.name))]
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub description: Option<String>,
    pub is_available: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
    pub description: Option<String>,
    pub is_available: bool,
}

impl Model for Product {
    const TABLE: &'static str = "products";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "price",
        "description",
        "is_available",
        "deleted",
        "created_at",
        "updated_at",
    ];
    type Draft = NewProduct;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            price: row.get("price")?,
            description: row.get("description")?,
            is_available: row.get("is_available")?,
            deleted: row.get("deleted")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_values(draft: NewProduct) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("name", SqlValue::Text(draft.name)),
            ("price", SqlValue::Integer(draft.price)),
            ("description", SqlValue::from(draft.description)),
            ("is_available", SqlValue::from(draft.is_available)),
            ("deleted", SqlValue::from(false)),
        ]
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub id: i64,
    pub key: Option<String>,
    pub value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConfigEntry {
    pub key: String,
    pub value: Option<String>,
}

impl Model for ConfigEntry {
    const TABLE: &'static str = "configs";
    const COLUMNS: &'static [&'static str] = &["id", "key", "value", "created_at", "updated_at"];
    type Draft = NewConfigEntry;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            key: row.get("key")?,
            value: row.get("value")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_values(draft: NewConfigEntry) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("key", SqlValue::Text(draft.key)),
            ("value", SqlValue::from(draft.value)),
        ]
    }
}
