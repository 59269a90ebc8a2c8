//! HTTP server setup and lifecycle.
//!
//! Configures the axum router with:
//! - REST handlers over traced repositories
//! - Request tracing middleware (server span, request annotation, error annotation)
//! - Per-request timeout and request logging
//! - Graceful shutdown support

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::http::{error_tracing, request_tracing, server_span};
use crate::observability::tracing::SERVICE_NAME;
use crate::observability::{LogSink, SystemSampler, Tracer};
use crate::service::{self, PerformanceLab};
use crate::storage::{ConfigEntry, Database, Product, TracedRepository, User};

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tracer: Tracer,
    pub db: Database,
    pub users: TracedRepository<User>,
    pub products: TracedRepository<Product>,
    pub configs: TracedRepository<ConfigEntry>,
    pub sampler: Arc<SystemSampler>,
    pub performance: Arc<PerformanceLab>,
}

impl AppState {
    pub fn new(db: Database, tracer: Tracer) -> Self {
        Self {
            users: TracedRepository::new(db.clone(), tracer.clone()),
            products: TracedRepository::new(db.clone(), tracer.clone()),
            configs: TracedRepository::new(db.clone(), tracer.clone()),
            sampler: Arc::new(SystemSampler::new()),
            performance: Arc::new(PerformanceLab::new()),
            tracer,
            db,
        }
    }

    /// Replace the performance lab, e.g. with a lighter workload.
    pub fn with_performance_lab(mut self, lab: PerformanceLab) -> Self {
        self.performance = Arc::new(lab);
        self
    }
}

/// Build the router with all middleware layers.
///
/// Layers run outermost first: request log, server span, request
/// annotation, error annotation, timeout, handler.
#[allow(deprecated)]
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let tracer = state.tracer.clone();
    service::routes()
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(from_fn(error_tracing))
        .layer(from_fn(request_tracing))
        .layer(from_fn_with_state(tracer, server_span))
        .layer(TraceLayer::new_for_http())
}

/// Run the Beacon HTTP server.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns when the server has shut down.
pub async fn run_server(
    config: Config,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let db = Database::open(&config.database, config.pool_size)?;
    tracing::info!(path = %config.database.display(), "Database ready");

    let tracer = Tracer::builder(SERVICE_NAME)
        .with_sink(Arc::new(LogSink))
        .build();
    let app = build_router(AppState::new(db, tracer), config.request_timeout());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting Beacon HTTP server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        // Wait for shutdown signal
        let _ = shutdown_rx.changed().await;
        tracing::info!("Shutdown signal received, stopping server");
    })
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
