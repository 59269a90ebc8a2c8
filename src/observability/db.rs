//! Database operation spans.
//!
//! Every persistence call runs inside a `db.<operation>` client span carrying
//! `db.operation`, `db.table` and `db.system`, plus duration and row
//! accounting once the call settles.

use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use std::fmt::{self, Display};
use std::future::Future;
use std::time::Instant;

use super::decorator::{error_kind, ResultCount};
use super::metrics::record_db_operation;
use super::span::{SpanGuard, SpanStatus, Tracer};
use crate::now_millis;

/// Identifier of the backing store reported as `db.system`.
pub const DB_SYSTEM: &str = "sqlite";

/// Kind of data access being traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbOperation {
    Select,
    Insert,
    Update,
    Delete,
    Count,
}

impl DbOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Count => "count",
        }
    }
}

impl Display for DbOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tracer {
    /// Run a data-access future inside a `db.<operation>` span.
    ///
    /// The span is active while `query` runs and is ended before returning.
    /// Errors are annotated and returned unchanged.
    pub async fn with_db_span<T, E, Fut>(
        &self,
        operation: DbOperation,
        table: &'static str,
        query: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        T: ResultCount,
        E: Display,
    {
        let op = operation.as_str();
        let span = SpanGuard::new(self.start_span(
            format!("db.{op}"),
            SpanKind::Client,
            vec![
                KeyValue::new("db.operation", op),
                KeyValue::new("db.table", table),
                KeyValue::new("db.system", DB_SYSTEM),
            ],
        ));

        let started = Instant::now();
        span.add_event(
            format!("db.{op}.start"),
            vec![
                KeyValue::new("table", table),
                KeyValue::new("timestamp", now_millis()),
            ],
        );

        let outcome = span.scope(query).await;
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as i64;

        match &outcome {
            Ok(rows) => {
                let rows_affected = rows.result_count().unwrap_or(0) as i64;
                span.set_attributes([
                    KeyValue::new("db.duration_ms", duration_ms),
                    KeyValue::new("db.success", true),
                    KeyValue::new("db.rows_affected", rows_affected),
                ]);
                span.add_event(
                    format!("db.{op}.complete"),
                    vec![
                        KeyValue::new("duration_ms", duration_ms),
                        KeyValue::new("rows_affected", rows_affected),
                    ],
                );
                span.set_status(SpanStatus::Ok);
            }
            Err(err) => {
                let message = err.to_string();
                span.set_attributes([
                    KeyValue::new("db.duration_ms", duration_ms),
                    KeyValue::new("db.success", false),
                    KeyValue::new("db.error", message.clone()),
                ]);
                span.add_event(
                    format!("db.{op}.error"),
                    vec![
                        KeyValue::new("duration_ms", duration_ms),
                        KeyValue::new("error", message.clone()),
                    ],
                );
                span.record_exception(error_kind::<E>(), &message);
                span.set_status(SpanStatus::error(message));
                tracing::warn!(operation = op, table, error = %err, "Database operation failed");
            }
        }
        drop(span);

        record_db_operation(op, table, outcome.is_ok(), elapsed.as_secs_f64());
        outcome
    }
}
