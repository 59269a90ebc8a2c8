//! Configuration parsing for the Beacon server.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Beacon: a traced demo REST API.
#[derive(Parser, Debug, Clone)]
#[command(name = "beacon")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "BEACON_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Path of the SQLite database file
    #[arg(short, long, env = "BEACON_DATABASE", default_value = "./data/beacon.db")]
    pub database: PathBuf,

    /// Size of the database connection pool
    #[arg(long, env = "BEACON_POOL_SIZE", default_value_t = 8)]
    pub pool_size: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for trace and metric export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Reported as `service.namespace` on exported telemetry
    #[arg(long, env = "BEACON_SERVICE_NAMESPACE", default_value = "development")]
    pub service_namespace: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "BEACON_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config(database: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0, // Random port
            database,
            pool_size: 2,
            log_level: "debug".into(),
            otel_endpoint: None,
            service_namespace: "test".into(),
            request_timeout_secs: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            database: PathBuf::from("./data/beacon.db"),
            pool_size: 8,
            log_level: "info".into(),
            otel_endpoint: None,
            service_namespace: "development".into(),
            request_timeout_secs: 30,
        }
    }
}
