//! Generic CRUD access over a [`Model`] table.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, OptionalExtension};
use std::fmt::Write as _;
use std::marker::PhantomData;

use super::model::Model;
use super::pool::Database;
use super::StorageError;

/// Equality conditions joined with `AND`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(&'static str, SqlValue)>,
}

impl Filter {
    /// Match every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::all().and(column, value)
    }

    pub fn and(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.conditions.push((column, value.into()));
        self
    }

    /// ` WHERE ...` clause with placeholders starting at `?{first}`.
    fn where_clause(&self, first: usize) -> String {
        let mut sql = String::new();
        for (i, (column, _)) in self.conditions.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            let _ = write!(sql, "\"{column}\" = ?{}", first + i);
        }
        sql
    }

    fn into_params(self) -> Vec<SqlValue> {
        self.conditions.into_iter().map(|(_, value)| value).collect()
    }
}

fn select_list<M: Model>() -> String {
    M::COLUMNS
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn timestamp() -> SqlValue {
    SqlValue::Text(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false))
}

/// CRUD operations for one model type.
pub struct Repository<M> {
    db: Database,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for Repository<M>
where
    M: Model,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &M::TABLE)
            .finish()
    }
}

impl<M: Model> Repository<M> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _model: PhantomData,
        }
    }

    /// Rows matching `filter`, ordered by id.
    pub async fn find_all(&self, filter: Filter) -> Result<Vec<M>, StorageError> {
        let sql = format!(
            "SELECT {} FROM \"{}\"{} ORDER BY \"id\" ASC",
            select_list::<M>(),
            M::TABLE,
            filter.where_clause(1)
        );
        let params = filter.into_params();

        self.db
            .run(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| M::from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// First row matching `filter`.
    pub async fn find_one(&self, filter: Filter) -> Result<Option<M>, StorageError> {
        let sql = format!(
            "SELECT {} FROM \"{}\"{} ORDER BY \"id\" ASC LIMIT 1",
            select_list::<M>(),
            M::TABLE,
            filter.where_clause(1)
        );
        let params = filter.into_params();

        self.db
            .run(move |conn| {
                conn.query_row(&sql, params_from_iter(params.iter()), |row| M::from_row(row))
                    .optional()
            })
            .await
    }

    pub async fn find_by_pk(&self, id: i64) -> Result<Option<M>, StorageError> {
        self.find_one(Filter::eq("id", id)).await
    }

    /// Insert a row and return it as stored.
    pub async fn create(&self, draft: M::Draft) -> Result<M, StorageError> {
        let mut values = M::into_values(draft);
        let now = timestamp();
        values.push(("created_at", now.clone()));
        values.push(("updated_at", now));

        let columns = values
            .iter()
            .map(|(column, _)| format!("\"{column}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders})",
            M::TABLE
        );
        let select = format!(
            "SELECT {} FROM \"{}\" WHERE \"id\" = ?1",
            select_list::<M>(),
            M::TABLE
        );
        let params: Vec<SqlValue> = values.into_iter().map(|(_, value)| value).collect();

        self.db
            .run(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(&insert, params_from_iter(params.iter()))?;
                let id = tx.last_insert_rowid();
                let row = tx.query_row(&select, [id], |row| M::from_row(row))?;
                tx.commit()?;
                Ok(row)
            })
            .await
    }

    /// Apply `changes` to the row with `id`. Returns the number of rows changed.
    pub async fn update(
        &self,
        id: i64,
        changes: Vec<(&'static str, SqlValue)>,
    ) -> Result<u64, StorageError> {
        let mut changes = changes;
        changes.push(("updated_at", timestamp()));

        let mut sql = format!("UPDATE \"{}\" SET ", M::TABLE);
        for (i, (column, _)) in changes.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "\"{column}\" = ?{}", i + 1);
        }
        let _ = write!(sql, " WHERE \"id\" = ?{}", changes.len() + 1);

        let mut params: Vec<SqlValue> = changes.into_iter().map(|(_, value)| value).collect();
        params.push(SqlValue::Integer(id));

        self.db
            .run(move |conn| conn.execute(&sql, params_from_iter(params.iter())))
            .await
            .map(|changed| changed as u64)
    }

    /// Delete rows matching `filter`. Returns the number of rows deleted.
    pub async fn destroy(&self, filter: Filter) -> Result<u64, StorageError> {
        let sql = format!("DELETE FROM \"{}\"{}", M::TABLE, filter.where_clause(1));
        let params = filter.into_params();

        self.db
            .run(move |conn| conn.execute(&sql, params_from_iter(params.iter())))
            .await
            .map(|deleted| deleted as u64)
    }

    pub async fn count(&self, filter: Filter) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"{}", M::TABLE, filter.where_clause(1));
        let params = filter.into_params();

        self.db
            .run(move |conn| {
                conn.query_row(&sql, params_from_iter(params.iter()), |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await
            .map(|count| count as u64)
    }
}
