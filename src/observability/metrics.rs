//! OpenTelemetry metric instruments.
//!
//! Key metrics:
//! - http_requests_total: Counter of served requests by method, route, status
//! - http_request_duration_seconds: Histogram of request latency
//! - db_operations_total: Counter of data-access calls by operation, table, outcome
//! - db_operation_duration_seconds: Histogram of data-access latency
//! - process_memory_rss_mb: Gauge of resident memory at the last system sample

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Beacon metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of HTTP requests served.
    pub http_requests_total: Counter<u64>,
    /// Histogram of HTTP request latency in seconds.
    pub http_request_duration: Histogram<f64>,
    /// Total number of database operations.
    pub db_operations_total: Counter<u64>,
    /// Histogram of database operation latency in seconds.
    pub db_operation_duration: Histogram<f64>,
    /// Resident set size in megabytes at the last sample.
    pub memory_rss: Gauge<i64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            http_requests_total: meter
                .u64_counter("http_requests_total")
                .with_description("Total number of HTTP requests served")
                .with_unit("1")
                .init(),
            http_request_duration: meter
                .f64_histogram("http_request_duration_seconds")
                .with_description("HTTP request latency from first byte to response")
                .with_unit("s")
                .init(),
            db_operations_total: meter
                .u64_counter("db_operations_total")
                .with_description("Total number of database operations")
                .with_unit("1")
                .init(),
            db_operation_duration: meter
                .f64_histogram("db_operation_duration_seconds")
                .with_description("Database operation latency")
                .with_unit("s")
                .init(),
            memory_rss: meter
                .i64_gauge("process_memory_rss_mb")
                .with_description("Resident set size at the last system sample")
                .with_unit("MiBy")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            // Use OTLP exporter when endpoint is configured
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    let reader = ManualReader::builder().build();
                    let provider = SdkMeterProvider::builder().with_reader(reader).build();
                    global::set_meter_provider(provider);
                }
            }
        } else {
            // No endpoint configured, use manual reader (metrics are recorded but not exported)
            let reader = ManualReader::builder().build();
            let provider = SdkMeterProvider::builder().with_reader(reader).build();
            global::set_meter_provider(provider);
        }

        let meter = global::meter("beacon");
        Metrics::new(&meter)
    });
}

/// Initialize the metrics system without OTLP export.
///
/// This should be called once at startup. Subsequent calls are ignored.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance.
///
/// Panics if metrics have not been initialized.
pub fn metrics() -> &'static Metrics {
    METRICS
        .get()
        .expect("metrics not initialized - call init_metrics() first")
}

/// Record a served HTTP request.
pub fn record_http_request(method: &str, route: &str, status: u16, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("http.method", method.to_string()),
            KeyValue::new("http.route", route.to_string()),
            KeyValue::new("http.status_code", i64::from(status)),
        ];
        m.http_requests_total.add(1, &attrs);
        m.http_request_duration.record(latency_seconds, &attrs);
    }
}

/// Record a completed database operation.
pub fn record_db_operation(operation: &str, table: &str, success: bool, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("db.operation", operation.to_string()),
            KeyValue::new("db.table", table.to_string()),
            KeyValue::new("db.success", success),
        ];
        m.db_operations_total.add(1, &attrs);
        m.db_operation_duration.record(latency_seconds, &attrs);
    }
}

/// Record resident memory from a system sample.
pub fn record_memory_rss(rss_mb: u64) {
    if let Some(m) = METRICS.get() {
        m.memory_rss.record(rss_mb as i64, &[]);
    }
}
