//! OpenTelemetry observability infrastructure.
//!
//! Provides:
//! - Structured logging and OTLP trace export setup
//! - Request-scoped spans with ambient attribute/event recording
//! - Span decorators for operations and database calls
//! - Process/host resource sampling
//! - OTel metric instruments for requests and data access

pub mod db;
pub mod decorator;
pub mod metrics;
pub mod span;
pub mod system;
pub mod tracing;

pub use db::DbOperation;
pub use decorator::{ResultCount, SpanOptions, Traced};
pub use span::{
    add_attributes, record_event, InMemorySink, LogSink, SpanEvent, SpanGuard, SpanHandle,
    SpanRecord, SpanSink, SpanStatus, Tracer,
};
pub use system::{add_system_metrics_to_span, MetricsSnapshot, SystemSampler};
