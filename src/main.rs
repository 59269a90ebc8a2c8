//! Beacon: a demo REST API instrumented with OpenTelemetry.
//!
//! # Usage
//!
//! ```bash
//! beacon --port 3000 --database ./data/beacon.db --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `SERVER_PORT`: Port to listen on
//! - `BEACON_DATABASE`: Path of the SQLite database
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector for traces and metrics
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use beacon::config::Config;
use beacon::observability::metrics::init_metrics_with_endpoint;
use beacon::observability::tracing::{
    init_otel_tracing, init_tracing, shutdown_otel_tracing, ServiceIdentity,
};
use beacon::server::run_server;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
   ____
  | __ )  ___  __ _  ___ ___  _ __
  |  _ \ / _ \/ _` |/ __/ _ \| '_ \
  | |_) |  __/ (_| | (_| (_) | | | |
  |____/ \___|\__,_|\___\___/|_| |_|

  Beacon v{} - Traced REST API

  Configuration:
    Address:    {}:{}
    Database:   {}
    Namespace:  {}
    OTLP:       {}
    Log Level:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.host,
        config.port,
        config.database.display(),
        config.service_namespace,
        config.otel_endpoint.as_deref().unwrap_or("disabled"),
        config.log_level
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level);

    // Install the trace pipeline before any tracer is built
    let identity = ServiceIdentity::new(config.service_namespace.clone());
    if let Err(e) = init_otel_tracing(config.otel_endpoint.as_deref(), &identity) {
        tracing::warn!(error = %e, "Failed to install OTLP trace pipeline, spans stay local");
    }

    // Initialize metrics (with optional OTLP export)
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    // Print startup banner
    print_banner(&config);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    tokio::spawn(async move {
        // Wait for SIGTERM or SIGINT (Ctrl+C)
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        // Signal shutdown
        let _ = shutdown_tx.send(true);
    });

    // Run the server
    let result = run_server(config, shutdown_rx).await;

    // Flush pending spans before exit
    shutdown_otel_tracing();

    result?;
    tracing::info!("Beacon shutdown complete");
    Ok(())
}
