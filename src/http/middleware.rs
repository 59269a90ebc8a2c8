//! Request tracing middleware.
//!
//! Three stages, outermost first:
//! - [`server_span`]: continues an incoming W3C trace and opens the
//!   `SERVER` span that is active for the rest of the request
//! - [`request_tracing`]: annotates that span with request and response
//!   facts and records the HTTP metric instruments
//! - [`error_tracing`]: annotates the span when a handler reports a
//!   [`RequestFailure`]
//!
//! The annotating stages write through the ambient recorder, so they do
//! nothing when no span is active.

use axum::body::HttpBody;
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use std::net::SocketAddr;
use std::time::Instant;

use crate::error::RequestFailure;
use crate::observability::metrics::record_http_request;
use crate::observability::{add_attributes, record_event, SpanGuard, SpanHandle, SpanStatus, Tracer};
use crate::{generate_request_id, now_millis};

/// Header carrying the request id, read from requests and echoed on responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|key| key.as_str()).collect()
    }
}

/// Route template when routing matched, otherwise the raw path.
fn route_of(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_owned(), |path| path.as_str().to_owned())
}

/// Open the `SERVER` span for a request and keep it active downstream.
pub async fn server_span(State(tracer): State<Tracer>, request: Request, next: Next) -> Response {
    let remote = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    let method = request.method().as_str().to_owned();
    let route = route_of(&request);

    let span = SpanGuard::new(tracer.start_span_with_remote_parent(
        format!("{method} {route}"),
        SpanKind::Server,
        vec![
            KeyValue::new("http.request.method", method),
            KeyValue::new("http.route", route),
            KeyValue::new("url.path", request.uri().path().to_owned()),
        ],
        &remote,
    ));

    let response = span.scope(next.run(request)).await;

    let status = response.status();
    span.set_attribute(KeyValue::new(
        "http.response.status_code",
        i64::from(status.as_u16()),
    ));
    if span.status() == SpanStatus::Unset {
        span.set_status(if status.is_server_error() {
            SpanStatus::error(format!("HTTP {}", status.as_u16()))
        } else {
            SpanStatus::Ok
        });
    }
    response
}

/// Annotate the active span with request facts before the handler runs and
/// response facts after it, and echo the request id.
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().as_str().to_owned();
    let url = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_owned(), |pq| pq.as_str().to_owned());
    let route = route_of(&request);
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(generate_request_id, str::to_owned);

    let mut attributes = vec![
        KeyValue::new("http.method", method.clone()),
        KeyValue::new("http.url", url.clone()),
        KeyValue::new("http.route", route.clone()),
        KeyValue::new("request.id", request_id.clone()),
    ];
    if let Some(user_agent) = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
    {
        attributes.push(KeyValue::new("http.user_agent", user_agent.to_owned()));
    }
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        attributes.push(KeyValue::new("http.remote_addr", addr.ip().to_string()));
    }
    add_attributes(attributes);
    record_event(
        "http.request.start",
        [
            KeyValue::new("method", method.clone()),
            KeyValue::new("url", url),
            KeyValue::new("timestamp", now_millis()),
        ],
    );

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let duration_ms = elapsed.as_millis() as i64;
    let status = response.status().as_u16();
    let response_size = response.body().size_hint().exact().unwrap_or(0) as i64;

    add_attributes([
        KeyValue::new("http.status_code", i64::from(status)),
        KeyValue::new("http.response_size", response_size),
        KeyValue::new("http.duration_ms", duration_ms),
        KeyValue::new("http.success", status < 400),
    ]);
    record_event(
        "http.request.complete",
        [
            KeyValue::new("status_code", i64::from(status)),
            KeyValue::new("duration_ms", duration_ms),
            KeyValue::new("response_size", response_size),
        ],
    );
    record_http_request(&method, &route, status, elapsed.as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Record a handler's [`RequestFailure`] on the active span. The response is
/// forwarded unchanged.
pub async fn error_tracing(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let Some(failure) = response.extensions().get::<RequestFailure>() else {
        return response;
    };
    let status_code = i64::from(failure.status.as_u16());

    if let Some(span) = SpanHandle::current() {
        span.set_attributes([
            KeyValue::new("error.occurred", true),
            KeyValue::new("error.type", failure.kind),
            KeyValue::new("error.message", failure.message.clone()),
            KeyValue::new("http.status_code", status_code),
        ]);
        span.add_event(
            "http.request.error",
            vec![
                KeyValue::new("error_type", failure.kind),
                KeyValue::new("error_message", failure.message.clone()),
                KeyValue::new("status_code", status_code),
            ],
        );
        span.record_exception(failure.kind, &failure.message);
        span.set_status(SpanStatus::error(failure.message.clone()));
    }
    response
}
