//! Request-scoped span runtime bridged to OpenTelemetry.
//!
//! Provides:
//! - [`Tracer`]: starts spans, parented on the span active in the calling task
//! - [`SpanHandle`]: a live span whose writes go both to an inspectable
//!   [`SpanRecord`] and to the exported OpenTelemetry span
//! - Ambient helpers ([`add_attributes`], [`record_event`]) that target the
//!   active span and do nothing when there is none
//! - [`SpanSink`] consumers notified once per ended span
//!
//! The active span lives in a tokio task-local slot. It is set for the
//! duration of [`SpanHandle::scope`] and is not inherited by spawned tasks.

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

tokio::task_local! {
    static ACTIVE_SPAN: SpanHandle;
}

/// Outcome classification of a span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error { message: String },
}

impl SpanStatus {
    /// Error status carrying the failure message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    fn to_otel(&self) -> Status {
        match self {
            Self::Unset => Status::Unset,
            Self::Ok => Status::Ok,
            Self::Error { message } => Status::error(message.clone()),
        }
    }
}

/// A timestamped, named note attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: SystemTime,
    pub attributes: Vec<KeyValue>,
}

impl SpanEvent {
    /// Look up one of the event's attributes.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }
}

/// Inspectable state of a span.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub status: SpanStatus,
    pub attributes: HashMap<String, Value>,
    pub events: Vec<SpanEvent>,
}

impl SpanRecord {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// First event with the given name.
    pub fn event(&self, name: &str) -> Option<&SpanEvent> {
        self.events.iter().find(|event| event.name == name)
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// Wall-clock duration, if the span has ended.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time
            .and_then(|end| end.duration_since(self.start_time).ok())
    }
}

/// Local consumer of ended spans.
pub trait SpanSink: Send + Sync + 'static {
    fn on_end(&self, span: &SpanRecord);
}

/// Keeps every ended span in memory, in end order.
#[derive(Debug, Default)]
pub struct InMemorySink {
    spans: Mutex<Vec<SpanRecord>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All ended spans so far.
    pub fn finished(&self) -> Vec<SpanRecord> {
        self.spans.lock().clone()
    }

    /// Ended spans with the given name.
    pub fn named(&self, name: &str) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    /// Most recently ended span with the given name.
    pub fn last_named(&self, name: &str) -> Option<SpanRecord> {
        self.spans
            .lock()
            .iter()
            .rev()
            .find(|span| span.name == name)
            .cloned()
    }

    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl SpanSink for InMemorySink {
    fn on_end(&self, span: &SpanRecord) {
        self.spans.lock().push(span.clone());
    }
}

/// Emits one debug log line per ended span.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SpanSink for LogSink {
    fn on_end(&self, span: &SpanRecord) {
        let duration_ms = span.duration().map_or(0, |d| d.as_millis() as u64);
        match &span.status {
            SpanStatus::Error { message } => tracing::debug!(
                span_id = span.id,
                parent_id = ?span.parent_id,
                span_name = %span.name,
                duration_ms,
                error = %message,
                "Span ended with error"
            ),
            status => tracing::debug!(
                span_id = span.id,
                parent_id = ?span.parent_id,
                span_name = %span.name,
                duration_ms,
                status = ?status,
                attributes = span.attributes.len(),
                events = span.events.len(),
                "Span ended"
            ),
        }
    }
}

struct TracerInner {
    otel: BoxedTracer,
    sinks: Vec<Arc<dyn SpanSink>>,
    next_id: AtomicU64,
}

/// Starts spans. Cheap to clone; clones share id allocation and sinks.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("sinks", &self.inner.sinks.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Tracer`].
pub struct TracerBuilder {
    name: &'static str,
    sinks: Vec<Arc<dyn SpanSink>>,
}

impl TracerBuilder {
    /// Deliver ended spans to `sink` as well as to OpenTelemetry.
    pub fn with_sink(mut self, sink: Arc<dyn SpanSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Bind to the OpenTelemetry tracer provider installed at this point.
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                otel: global::tracer(self.name),
                sinks: self.sinks,
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl Tracer {
    pub fn builder(name: &'static str) -> TracerBuilder {
        TracerBuilder {
            name,
            sinks: Vec::new(),
        }
    }

    /// Start a span as a child of the active span, or as a root if none.
    ///
    /// The span is not made active; use [`SpanHandle::scope`] for that.
    pub fn start_span(
        &self,
        name: impl Into<String>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> SpanHandle {
        self.start(name.into(), kind, attributes, None)
    }

    /// Start a span whose exported parent is `remote` when no local span is active.
    pub fn start_span_with_remote_parent(
        &self,
        name: impl Into<String>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        remote: &Context,
    ) -> SpanHandle {
        self.start(name.into(), kind, attributes, Some(remote))
    }

    fn start(
        &self,
        name: String,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        remote: Option<&Context>,
    ) -> SpanHandle {
        let parent = SpanHandle::current();
        let parent_cx = match (&parent, remote) {
            (Some(parent), _) => parent.inner.otel.clone(),
            (None, Some(remote)) => remote.clone(),
            (None, None) => Context::new(),
        };

        let otel_span = self
            .inner
            .otel
            .span_builder(name.clone())
            .with_kind(kind.clone())
            .with_attributes(attributes.clone())
            .start_with_context(&self.inner.otel, &parent_cx);

        let record = SpanRecord {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            parent_id: parent.as_ref().map(SpanHandle::id),
            name,
            kind,
            start_time: SystemTime::now(),
            end_time: None,
            status: SpanStatus::Unset,
            attributes: attributes
                .into_iter()
                .map(|kv| (kv.key.as_str().to_owned(), kv.value))
                .collect(),
            events: Vec::new(),
        };

        SpanHandle {
            inner: Arc::new(SpanInner {
                id: record.id,
                record: Mutex::new(record),
                otel: parent_cx.with_span(otel_span),
                tracer: Arc::clone(&self.inner),
            }),
        }
    }
}

struct SpanInner {
    id: u64,
    record: Mutex<SpanRecord>,
    otel: Context,
    tracer: Arc<TracerInner>,
}

/// Handle to a live span. Clones refer to the same span.
///
/// All writes are ignored once the span has ended.
#[derive(Clone)]
pub struct SpanHandle {
    inner: Arc<SpanInner>,
}

impl fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.inner.record.lock();
        f.debug_struct("SpanHandle")
            .field("id", &record.id)
            .field("name", &record.name)
            .field("ended", &record.is_ended())
            .finish()
    }
}

impl SpanHandle {
    /// The span active in the calling task, if any.
    pub fn current() -> Option<SpanHandle> {
        ACTIVE_SPAN.try_with(SpanHandle::clone).ok()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// OpenTelemetry context carrying the exported span.
    pub fn otel_context(&self) -> &Context {
        &self.inner.otel
    }

    /// Run `future` with this span active.
    pub async fn scope<F: Future>(&self, future: F) -> F::Output {
        ACTIVE_SPAN.scope(self.clone(), future).await
    }

    /// Run `f` with this span active.
    pub fn sync_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        ACTIVE_SPAN.sync_scope(self.clone(), f)
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        let mut record = self.inner.record.lock();
        if record.is_ended() {
            return;
        }
        record
            .attributes
            .insert(attribute.key.as_str().to_owned(), attribute.value.clone());
        self.inner.otel.span().set_attribute(attribute);
    }

    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    pub fn add_event(&self, name: impl Into<String>, attributes: Vec<KeyValue>) {
        let name = name.into();
        let mut record = self.inner.record.lock();
        if record.is_ended() {
            return;
        }
        record.events.push(SpanEvent {
            name: name.clone(),
            timestamp: SystemTime::now(),
            attributes: attributes.clone(),
        });
        self.inner.otel.span().add_event(name, attributes);
    }

    /// Record a failure as an `exception` event using the OpenTelemetry
    /// semantic-convention keys.
    pub fn record_exception(&self, kind: &str, message: &str) {
        self.add_event(
            "exception",
            vec![
                KeyValue::new("exception.type", kind.to_owned()),
                KeyValue::new("exception.message", message.to_owned()),
            ],
        );
    }

    pub fn set_status(&self, status: SpanStatus) {
        let mut record = self.inner.record.lock();
        if record.is_ended() {
            return;
        }
        self.inner.otel.span().set_status(status.to_otel());
        record.status = status;
    }

    pub fn status(&self) -> SpanStatus {
        self.inner.record.lock().status.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.record.lock().is_ended()
    }

    /// End the span. Returns false if it had already ended.
    pub fn end(&self) -> bool {
        let finished = {
            let mut record = self.inner.record.lock();
            if record.is_ended() {
                return false;
            }
            record.end_time = Some(SystemTime::now());
            record.clone()
        };

        self.inner.otel.span().end();
        for sink in &self.inner.tracer.sinks {
            sink.on_end(&finished);
        }
        true
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> SpanRecord {
        self.inner.record.lock().clone()
    }
}

/// Owns a span for a lexical scope and ends it when dropped.
///
/// Covers every exit path of the owning frame, including `?` returns,
/// panics and cancellation of the enclosing future.
#[derive(Debug)]
pub struct SpanGuard {
    span: SpanHandle,
}

impl SpanGuard {
    pub fn new(span: SpanHandle) -> Self {
        Self { span }
    }

    pub fn span(&self) -> &SpanHandle {
        &self.span
    }
}

impl Deref for SpanGuard {
    type Target = SpanHandle;

    fn deref(&self) -> &SpanHandle {
        &self.span
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.span.end();
    }
}

/// Merge attributes into the active span. No-op without one.
pub fn add_attributes(attributes: impl IntoIterator<Item = KeyValue>) {
    if let Some(span) = SpanHandle::current() {
        span.set_attributes(attributes);
    }
}

/// Append a timestamped event to the active span. No-op without one.
pub fn record_event(name: impl Into<String>, attributes: impl IntoIterator<Item = KeyValue>) {
    if let Some(span) = SpanHandle::current() {
        span.add_event(name, attributes.into_iter().collect());
    }
}
