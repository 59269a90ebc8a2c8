//! Test utilities and app harness for Beacon tests.
//!
//! Provides:
//! - In-process router over a temporary database
//! - In-memory span sink for asserting on recorded spans
//! - Request helpers driving the router with `oneshot`

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use beacon::observability::{InMemorySink, Tracer};
use beacon::server::{build_router, AppState};
use beacon::service::PerformanceLab;
use beacon::storage::Database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Fully wired app with spans captured in memory.
pub struct TestApp {
    pub fixture: TestFixture,
    pub db: Database,
    pub spans: Arc<InMemorySink>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let fixture = TestFixture::new();
        let db = Database::open(&fixture.db_path, 2).expect("failed to open database");
        let spans = Arc::new(InMemorySink::new());
        let tracer = Tracer::builder("beacon-test").with_sink(spans.clone()).build();

        let state = AppState::new(db.clone(), tracer)
            .with_performance_lab(PerformanceLab::with_workload(3, 10, Duration::ZERO));
        let router = build_router(state, Duration::from_secs(5));

        Self {
            fixture,
            db,
            spans,
            router,
        }
    }

    /// Send a request and return status and parsed JSON body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Response<Body>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        (response.status(), response)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("valid request");
        let (status, response) = self.send(request).await;
        (status, body_json(response).await)
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        let (status, response) = self.send(request).await;
        (status, body_json(response).await)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}
