//! Repository access wrapped in database spans.
//!
//! Each call runs inside `db.<operation>` for the model's table, so data
//! access shows up as a child of whatever operation span issued it.

use rusqlite::types::Value as SqlValue;

use super::model::Model;
use super::pool::Database;
use super::repository::{Filter, Repository};
use super::StorageError;
use crate::observability::{DbOperation, Tracer};

/// [`Repository`] with every entry point traced.
pub struct TracedRepository<M> {
    inner: Repository<M>,
    tracer: Tracer,
}

impl<M> Clone for TracedRepository<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tracer: self.tracer.clone(),
        }
    }
}

impl<M: Model> std::fmt::Debug for TracedRepository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedRepository")
            .field("table", &M::TABLE)
            .finish()
    }
}

impl<M: Model> TracedRepository<M> {
    pub fn new(db: Database, tracer: Tracer) -> Self {
        Self {
            inner: Repository::new(db),
            tracer,
        }
    }

    pub async fn find_all(&self, filter: Filter) -> Result<Vec<M>, StorageError> {
        self.tracer
            .with_db_span(DbOperation::Select, M::TABLE, self.inner.find_all(filter))
            .await
    }

    pub async fn find_one(&self, filter: Filter) -> Result<Option<M>, StorageError> {
        self.tracer
            .with_db_span(DbOperation::Select, M::TABLE, self.inner.find_one(filter))
            .await
    }

    pub async fn find_by_pk(&self, id: i64) -> Result<Option<M>, StorageError> {
        self.tracer
            .with_db_span(DbOperation::Select, M::TABLE, self.inner.find_by_pk(id))
            .await
    }

    pub async fn create(&self, draft: M::Draft) -> Result<M, StorageError> {
        self.tracer
            .with_db_span(DbOperation::Insert, M::TABLE, self.inner.create(draft))
            .await
    }

    pub async fn update(
        &self,
        id: i64,
        changes: Vec<(&'static str, SqlValue)>,
    ) -> Result<u64, StorageError> {
        self.tracer
            .with_db_span(DbOperation::Update, M::TABLE, self.inner.update(id, changes))
            .await
    }

    pub async fn destroy(&self, filter: Filter) -> Result<u64, StorageError> {
        self.tracer
            .with_db_span(DbOperation::Delete, M::TABLE, self.inner.destroy(filter))
            .await
    }

    pub async fn count(&self, filter: Filter) -> Result<u64, StorageError> {
        self.tracer
            .with_db_span(DbOperation::Count, M::TABLE, self.inner.count(filter))
            .await
    }
}
