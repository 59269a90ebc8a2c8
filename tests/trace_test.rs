//! End-to-end span tests through the full middleware stack.
//!
//! Tests:
//! - Server span carries request annotations and is parent of handler spans
//! - DB spans nest under the operation span that issued them
//! - Storage failures mark the request span ERROR
//! - Validation failures are annotated but not ERROR
//! - Health check span carries pool connection counts

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use beacon::observability::SpanStatus;
use opentelemetry::trace::SpanKind;
use opentelemetry::Value;
use serde_json::json;

#[tokio::test]
async fn test_list_users_span_tree() {
    let app = common::TestApp::new();
    app.post_json("/api/users", json!({ "name": "Ada" })).await;
    app.post_json("/api/users", json!({ "name": "Grace" })).await;
    app.spans.clear();

    let (status, _) = app.get("/api/users").await;
    assert_eq!(status, StatusCode::OK);

    let server = app.spans.last_named("GET /api/users").expect("server span");
    let operation = app.spans.last_named("users.list").expect("operation span");
    let select = app.spans.last_named("db.select").expect("db span");

    assert_eq!(server.kind, SpanKind::Server);
    assert_eq!(server.parent_id, None);
    assert_eq!(operation.parent_id, Some(server.id));
    assert_eq!(select.parent_id, Some(operation.id));

    assert_eq!(server.status, SpanStatus::Ok);
    assert_eq!(server.attribute("http.route"), Some(&Value::from("/api/users")));
    assert_eq!(server.attribute("http.status_code"), Some(&Value::I64(200)));
    assert_eq!(server.attribute("http.success"), Some(&Value::Bool(true)));
    assert!(server.attribute("request.id").is_some());

    assert_eq!(operation.attribute("operation.result.count"), Some(&Value::I64(2)));
    assert_eq!(select.attribute("db.rows_affected"), Some(&Value::I64(2)));
    assert_eq!(select.attribute("db.table"), Some(&Value::from("users")));

    // Children end before their parents.
    let order: Vec<String> = app.spans.finished().into_iter().map(|s| s.name).collect();
    assert_eq!(order, ["db.select", "users.list", "GET /api/users"]);
}

#[tokio::test]
async fn test_storage_failure_marks_request_error() {
    let app = common::TestApp::new();
    app.db.get().unwrap().execute_batch("DROP TABLE users").unwrap();

    let (status, body) = app.get("/api/users").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("no such table"));

    let server = app.spans.last_named("GET /api/users").unwrap();
    assert!(server.status.is_error());
    assert_eq!(server.attribute("error.occurred"), Some(&Value::Bool(true)));
    assert_eq!(server.attribute("error.type"), Some(&Value::from("DatabaseError")));
    assert_eq!(server.attribute("http.success"), Some(&Value::Bool(false)));
    assert!(server.event("http.request.error").is_some());

    let operation = app.spans.last_named("users.list").unwrap();
    assert!(operation.status.is_error());
    assert!(operation.event("exception").is_some());

    let select = app.spans.last_named("db.select").unwrap();
    assert_eq!(select.attribute("db.success"), Some(&Value::Bool(false)));
}

#[tokio::test]
async fn test_validation_failure_is_not_span_error() {
    let app = common::TestApp::new();

    let (status, _) = app.post_json("/api/users", json!({ "name": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let server = app.spans.last_named("POST /api/users").unwrap();
    assert_eq!(server.status, SpanStatus::Ok);
    assert_eq!(server.attribute("validation.failed"), Some(&Value::Bool(true)));
    assert_eq!(server.attribute("http.status_code"), Some(&Value::I64(400)));
    assert_eq!(server.attribute("http.success"), Some(&Value::Bool(false)));
    assert!(app.spans.last_named("db.insert").is_none());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = common::TestApp::new();

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-from-client")
        .body(Body::empty())
        .unwrap();
    let (status, response) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-from-client");
    let server = app.spans.last_named("GET /health").unwrap();
    assert_eq!(server.attribute("request.id"), Some(&Value::from("req-from-client")));
}

#[tokio::test]
async fn test_health_span_carries_pool_state() {
    let app = common::TestApp::new();

    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);

    let server = app.spans.last_named("GET /health").unwrap();
    let check = app.spans.last_named("health.check").unwrap();
    assert_eq!(check.parent_id, Some(server.id));
    assert_eq!(check.status, SpanStatus::Ok);
    assert!(matches!(
        check.attribute("db.pool.connections"),
        Some(Value::I64(n)) if *n >= 1
    ));
    assert!(check.attribute("db.pool.idle_connections").is_some());
    assert!(server.attribute("db.pool.connections").is_none());
}

#[tokio::test]
async fn test_fallback_uses_raw_path_as_route() {
    let app = common::TestApp::new();

    let (status, _) = app.get("/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let server = app.spans.last_named("GET /nope").expect("server span for fallback");
    assert_eq!(server.status, SpanStatus::Ok);
    assert_eq!(server.attribute("http.status_code"), Some(&Value::I64(404)));
}

#[tokio::test]
async fn test_system_metrics_span() {
    let app = common::TestApp::new();

    app.get("/api/metrics/system").await;

    let server = app.spans.last_named("GET /api/metrics/system").unwrap();
    let metrics = app.spans.last_named("metrics.system").unwrap();
    assert_eq!(metrics.parent_id, Some(server.id));
    assert_eq!(metrics.status, SpanStatus::Ok);
    assert_eq!(
        metrics.attribute("operation.type"),
        Some(&Value::from("system.monitoring"))
    );
    assert!(metrics.attribute("system.memory.rss_mb").is_some());
    assert!(metrics.event("system.metrics.collected").is_some());
}

#[tokio::test]
async fn test_performance_unavailable_is_not_error() {
    let app = common::TestApp::new();
    for _ in 0..3 {
        app.get("/api/products/performance-test").await;
    }

    let spans = app.spans.named("GET /api/products/performance-test");
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[2].attribute("performance.mode"), Some(&Value::from("UNAVAILABLE")));
    assert_eq!(spans[2].status, SpanStatus::Ok);
    assert!(spans[2].event("performance.counter.reset").is_some());
}
