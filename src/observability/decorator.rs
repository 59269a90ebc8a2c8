//! Operation span decorator.
//!
//! Wraps an operation returning `Result<T, E>` in a span:
//! 1. start the span (child of the active span) and make it active for the
//!    whole call, including any work the operation does before its first await
//! 2. run the operation
//! 3. on `Ok`, mark the span OK. The `*_counted` variants also attach
//!    `operation.result.count` / `operation.success` for a non-empty result
//! 4. on `Err`, record an `exception` event, mark the span ERROR with the
//!    error's message, and hand the same error back
//! 5. end the span exactly once, on every exit path
//!
//! The decorated call has the same inputs and outputs as the original. Any
//! result type can be decorated; only the counted variants need
//! [`ResultCount`].

use opentelemetry::trace::SpanKind;
use opentelemetry::{Key, KeyValue, Value};
use std::any::type_name;
use std::fmt::Display;
use std::future::Future;

use super::span::{SpanGuard, SpanHandle, SpanStatus, Tracer};

/// How a decorated operation's span is created.
#[derive(Debug, Clone)]
pub struct SpanOptions {
    attributes: Vec<KeyValue>,
    kind: SpanKind,
}

impl Default for SpanOptions {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            kind: SpanKind::Internal,
        }
    }
}

impl SpanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute applied when the span is created.
    pub fn with_attribute(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Number of items an operation produced, for span accounting.
///
/// `None` means "no result" and suppresses the count attributes.
pub trait ResultCount {
    fn result_count(&self) -> Option<usize>;
}

impl<T> ResultCount for Vec<T> {
    fn result_count(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<T> ResultCount for [T] {
    fn result_count(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<T: ResultCount> ResultCount for Option<T> {
    fn result_count(&self) -> Option<usize> {
        self.as_ref().and_then(ResultCount::result_count)
    }
}

/// Scalar counts are a single result; zero is no result.
impl ResultCount for u64 {
    fn result_count(&self) -> Option<usize> {
        (*self != 0).then_some(1)
    }
}

impl ResultCount for () {
    fn result_count(&self) -> Option<usize> {
        None
    }
}

impl ResultCount for serde_json::Value {
    fn result_count(&self) -> Option<usize> {
        match self {
            serde_json::Value::Null => None,
            serde_json::Value::Array(items) => Some(items.len()),
            _ => Some(1),
        }
    }
}

/// Unqualified type name of an error, for `exception.type`.
pub(crate) fn error_kind<E>() -> &'static str {
    let full = type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

type Counter<T> = Option<fn(&T) -> Option<usize>>;

fn classify<T, E>(span: &SpanHandle, counter: Counter<T>, outcome: &Result<T, E>)
where
    E: Display,
{
    match outcome {
        Ok(value) => {
            if let Some(count) = counter.and_then(|count| count(value)) {
                span.set_attributes([
                    KeyValue::new("operation.result.count", count as i64),
                    KeyValue::new("operation.success", true),
                ]);
            }
            span.set_status(SpanStatus::Ok);
        }
        Err(err) => {
            let message = err.to_string();
            span.record_exception(error_kind::<E>(), &message);
            span.set_status(SpanStatus::error(message));
        }
    }
}

impl Tracer {
    /// Run an asynchronous operation inside a new active span.
    pub async fn with_span<T, E, F, Fut>(
        &self,
        name: impl Into<String>,
        options: SpanOptions,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_span(name.into(), options, None, operation).await
    }

    /// Like [`Tracer::with_span`], and attaches the result count on success.
    pub async fn with_counted_span<T, E, F, Fut>(
        &self,
        name: impl Into<String>,
        options: SpanOptions,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: ResultCount,
        E: Display,
    {
        self.run_span(name.into(), options, Some(T::result_count), operation)
            .await
    }

    /// Run a synchronous operation inside a new active span.
    pub fn with_span_sync<T, E, F>(
        &self,
        name: impl Into<String>,
        options: SpanOptions,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        self.run_span_sync(name.into(), options, None, operation)
    }

    /// Like [`Tracer::with_span_sync`], and attaches the result count on success.
    pub fn with_counted_span_sync<T, E, F>(
        &self,
        name: impl Into<String>,
        options: SpanOptions,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        T: ResultCount,
        E: Display,
    {
        self.run_span_sync(name.into(), options, Some(T::result_count), operation)
    }

    /// Decorate `operation` once and call it many times.
    pub fn wrap<F>(&self, name: impl Into<String>, options: SpanOptions, operation: F) -> Traced<F> {
        Traced {
            tracer: self.clone(),
            name: name.into(),
            options,
            operation,
        }
    }

    async fn run_span<T, E, F, Fut>(
        &self,
        name: String,
        options: SpanOptions,
        counter: Counter<T>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let SpanOptions { attributes, kind } = options;
        let guard = SpanGuard::new(self.start_span(name, kind, attributes));

        // The operation is invoked inside the scope so its eager part sees the span.
        let outcome = guard.scope(async move { operation().await }).await;
        classify(guard.span(), counter, &outcome);
        drop(guard);

        outcome
    }

    fn run_span_sync<T, E, F>(
        &self,
        name: String,
        options: SpanOptions,
        counter: Counter<T>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let SpanOptions { attributes, kind } = options;
        let guard = SpanGuard::new(self.start_span(name, kind, attributes));

        let outcome = guard.sync_scope(operation);
        classify(guard.span(), counter, &outcome);
        drop(guard);

        outcome
    }
}

/// An operation bound to a span name and options.
///
/// [`Traced::call`] takes the same argument and returns the same result as
/// the wrapped operation.
#[derive(Debug, Clone)]
pub struct Traced<F> {
    tracer: Tracer,
    name: String,
    options: SpanOptions,
    operation: F,
}

impl<F> Traced<F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.tracer
            .with_span(self.name.clone(), self.options.clone(), || {
                (self.operation)(args)
            })
            .await
    }

    /// Call and attach the result count on success.
    pub async fn call_counted<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: ResultCount,
        E: Display,
    {
        self.tracer
            .with_counted_span(self.name.clone(), self.options.clone(), || {
                (self.operation)(args)
            })
            .await
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::span::{add_attributes, record_event, InMemorySink};
    use std::sync::Arc;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    #[error("{0}")]
    struct Boom(String);

    fn test_tracer() -> (Tracer, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let tracer = Tracer::builder("beacon-test").with_sink(sink.clone()).build();
        (tracer, sink)
    }

    #[tokio::test]
    async fn test_success_sets_result_count_and_ok() {
        let (tracer, sink) = test_tracer();

        let result: Result<Vec<i32>, Boom> = tracer
            .with_counted_span("list", SpanOptions::new(), || async {
                Ok(vec![1, 2, 3])
            })
            .await;

        assert_eq!(result, Ok(vec![1, 2, 3]));
        let spans = sink.named("list");
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert!(span.is_ended());
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.attribute("operation.result.count"), Some(&Value::I64(3)));
        assert_eq!(span.attribute("operation.success"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_uncounted_span_has_no_count() {
        let (tracer, sink) = test_tracer();

        let _: Result<Vec<i32>, Boom> = tracer
            .with_span("plain", SpanOptions::new(), || async { Ok(vec![1]) })
            .await;

        let span = sink.last_named("plain").unwrap();
        assert_eq!(span.status, SpanStatus::Ok);
        assert!(span.attribute("operation.result.count").is_none());
    }

    #[tokio::test]
    async fn test_none_result_is_not_counted() {
        let (tracer, sink) = test_tracer();

        let _: Result<Option<Vec<u8>>, Boom> = tracer
            .with_counted_span("lookup", SpanOptions::new(), || async { Ok(None) })
            .await;

        let span = sink.last_named("lookup").unwrap();
        assert!(span.attribute("operation.success").is_none());
        assert_eq!(span.status, SpanStatus::Ok);
    }

    #[tokio::test]
    async fn test_failure_marks_error_and_returns_same_error() {
        let (tracer, sink) = test_tracer();

        let result: Result<(), Boom> = tracer
            .with_counted_span("explode", SpanOptions::new(), || async {
                Err(Boom("boom".into()))
            })
            .await;

        assert_eq!(result, Err(Boom("boom".into())));
        let spans = sink.named("explode");
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.status, SpanStatus::error("boom"));
        let exception = span.event("exception").expect("exception recorded");
        assert_eq!(exception.attribute("exception.message"), Some(&Value::from("boom")));
        assert_eq!(exception.attribute("exception.type"), Some(&Value::from("Boom")));
        assert!(span.attribute("operation.success").is_none());
    }

    #[tokio::test]
    async fn test_creation_attributes_and_nested_recording() {
        let (tracer, sink) = test_tracer();

        let _: Result<(), Boom> = tracer
            .with_span(
                "annotated",
                SpanOptions::new().with_attribute("operation.type", "test"),
                || async {
                    add_attributes([KeyValue::new("inner", true)]);
                    Ok(())
                },
            )
            .await;

        let span = sink.last_named("annotated").unwrap();
        assert_eq!(span.attribute("operation.type"), Some(&Value::from("test")));
        assert_eq!(span.attribute("inner"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_eager_work_in_wrapped_operation_targets_new_span() {
        let (tracer, sink) = test_tracer();
        let child = tracer.wrap("child", SpanOptions::new(), |n: i64| {
            add_attributes([KeyValue::new("arg", n)]);
            record_event("child.started", []);
            async move { Ok::<_, Boom>(n) }
        });

        let _: Result<i64, Boom> = tracer
            .with_span("parent", SpanOptions::new(), || async { child.call(7).await })
            .await;

        let parent = sink.last_named("parent").unwrap();
        let child = sink.last_named("child").unwrap();
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(child.attribute("arg"), Some(&Value::I64(7)));
        assert!(child.event("child.started").is_some());
        assert!(parent.attribute("arg").is_none());
        assert!(parent.event("child.started").is_none());
    }

    #[tokio::test]
    async fn test_eager_child_span_nests_under_new_span() {
        let (tracer, sink) = test_tracer();

        let _: Result<u64, Boom> = tracer
            .with_span("outer", SpanOptions::new(), || {
                // Started before the returned future is first polled.
                let inner = SpanGuard::new(tracer.start_span("inner", SpanKind::Internal, vec![]));
                async move {
                    drop(inner);
                    Ok(1_u64)
                }
            })
            .await;

        let outer = sink.last_named("outer").unwrap();
        let inner = sink.last_named("inner").unwrap();
        assert_eq!(inner.parent_id, Some(outer.id));
    }

    #[derive(Debug, PartialEq)]
    struct Receipt {
        id: String,
        paid: bool,
    }

    #[tokio::test]
    async fn test_any_result_type_can_be_decorated() {
        let (tracer, sink) = test_tracer();

        let receipt: Result<Receipt, Boom> = tracer
            .with_span("checkout", SpanOptions::new(), || async {
                Ok(Receipt {
                    id: "r-1".into(),
                    paid: true,
                })
            })
            .await;
        let label: Result<String, Boom> =
            tracer.with_span_sync("label", SpanOptions::new(), || Ok("ready".to_string()));
        let flag = tracer.wrap("flag", SpanOptions::new(), |on: bool| async move {
            Ok::<_, Boom>(on)
        });

        assert_eq!(
            receipt,
            Ok(Receipt {
                id: "r-1".into(),
                paid: true
            })
        );
        assert_eq!(label, Ok("ready".to_string()));
        assert_eq!(flag.call(true).await, Ok(true));
        for name in ["checkout", "label", "flag"] {
            let span = sink.last_named(name).unwrap();
            assert_eq!(span.status, SpanStatus::Ok);
            assert!(span.attribute("operation.result.count").is_none());
        }
    }

    #[tokio::test]
    async fn test_wrapped_counted_call() {
        let (tracer, sink) = test_tracer();
        let list = tracer.wrap("list", SpanOptions::new(), |n: usize| async move {
            Ok::<_, Boom>(vec![0_u8; n])
        });

        assert_eq!(list.call_counted(3).await.map(|v| v.len()), Ok(3));
        assert_eq!(
            sink.last_named("list").unwrap().attribute("operation.result.count"),
            Some(&Value::I64(3))
        );
    }

    #[tokio::test]
    async fn test_nested_decorators_contain_child_lifetime() {
        let (tracer, sink) = test_tracer();

        let _: Result<u64, Boom> = tracer
            .with_span("outer", SpanOptions::new(), || async {
                tracer
                    .with_span("inner", SpanOptions::new(), || async { Ok(7_u64) })
                    .await
            })
            .await;

        let spans = sink.finished();
        assert_eq!(spans.len(), 2);
        let (inner, outer) = (&spans[0], &spans[1]);
        assert_eq!(inner.name, "inner");
        assert_eq!(inner.parent_id, Some(outer.id));
        assert!(inner.start_time >= outer.start_time);
        assert!(inner.end_time <= outer.end_time);
    }

    #[test]
    fn test_sync_operation() {
        let (tracer, sink) = test_tracer();

        let ok: Result<Vec<&str>, Boom> =
            tracer.with_counted_span_sync("sync.ok", SpanOptions::new(), || Ok(vec!["a"]));
        let err: Result<(), Boom> =
            tracer.with_span_sync("sync.err", SpanOptions::new(), || Err(Boom("bad".into())));

        assert!(ok.is_ok());
        assert!(err.is_err());
        assert_eq!(
            sink.last_named("sync.ok").unwrap().attribute("operation.result.count"),
            Some(&Value::I64(1))
        );
        assert_eq!(sink.last_named("sync.err").unwrap().status, SpanStatus::error("bad"));
    }

    #[tokio::test]
    async fn test_wrapped_operation_is_drop_in() {
        let (tracer, sink) = test_tracer();
        let double = tracer.wrap("double", SpanOptions::new(), |n: u64| async move {
            if n == 0 {
                Err(Boom("zero".into()))
            } else {
                Ok(n * 2)
            }
        });

        assert_eq!(double.call(4).await, Ok(8));
        assert_eq!(double.call(0).await, Err(Boom("zero".into())));
        assert_eq!(double.name(), "double");

        let spans = sink.named("double");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].status, SpanStatus::Ok);
        assert!(spans[1].status.is_error());
    }

    #[tokio::test]
    async fn test_cancelled_operation_still_ends_span() {
        let (tracer, sink) = test_tracer();

        let pending = tracer.with_span("cancelled", SpanOptions::new(), || async {
            std::future::pending::<Result<(), Boom>>().await
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;

        assert!(timed_out.is_err());
        let spans = sink.named("cancelled");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Unset);
    }

    #[test]
    fn test_error_kind_strips_path_and_generics() {
        assert_eq!(error_kind::<std::io::Error>(), "Error");
        assert_eq!(error_kind::<Boom>(), "Boom");
        assert_eq!(error_kind::<Box<dyn std::error::Error>>(), "Box");
    }
}
