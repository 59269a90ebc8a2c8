//! Logging and OpenTelemetry trace pipeline setup.
//!
//! Configures:
//! - Structured console logging with an env-based filter
//! - W3C Trace Context propagation
//! - OTLP span export when a collector endpoint is configured

use opentelemetry::global;
use opentelemetry::trace::TraceError;
use opentelemetry::KeyValue;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Service name reported in the OpenTelemetry resource and tracer scope.
pub const SERVICE_NAME: &str = "beacon";

/// Error type for telemetry pipeline setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install OTLP trace pipeline: {0}")]
    Trace(#[from] TraceError),
}

/// Identity attached to every exported span.
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    pub name: &'static str,
    pub version: &'static str,
    pub namespace: String,
}

impl ServiceIdentity {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            name: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            namespace: namespace.into(),
        }
    }

    fn resource(&self) -> Resource {
        Resource::new(vec![
            KeyValue::new("service.name", self.name),
            KeyValue::new("service.version", self.version),
            KeyValue::new("service.namespace", self.namespace.clone()),
        ])
    }
}

/// Initialize logging with the given default level.
///
/// This sets up:
/// - Console logging with structured format
/// - Environment-based filter (via RUST_LOG), falling back to `log_level`
///
/// # Panics
///
/// Panics if tracing has already been initialized.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},tower_http=info")));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::info!(service = SERVICE_NAME, "Tracing initialized");
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}

/// Install the global propagator and, when `otel_endpoint` is set, a batch
/// OTLP tracer provider.
///
/// Without an endpoint the global provider stays a no-op: spans still reach
/// local sinks but are not exported.
pub fn init_otel_tracing(
    otel_endpoint: Option<&str>,
    identity: &ServiceIdentity,
) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let Some(endpoint) = otel_endpoint else {
        tracing::info!("No OTLP endpoint configured, spans are not exported");
        return Ok(());
    };

    use opentelemetry_otlp::WithExportConfig;

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default().with_resource(identity.resource()),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    global::set_tracer_provider(provider);
    tracing::info!(
        endpoint,
        service = identity.name,
        namespace = %identity.namespace,
        "OTLP trace exporter configured"
    );
    Ok(())
}

/// Flush and shut down the global tracer provider.
pub fn shutdown_otel_tracing() {
    global::shutdown_tracer_provider();
}
