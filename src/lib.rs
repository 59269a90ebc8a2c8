//! Beacon: a demo REST API wrapped in a request-scoped observability envelope.
//!
//! Every request gets a server span; handlers run their work inside operation
//! spans; every database call gets its own client span. Spans are exported via
//! OTLP when a collector is configured and are always visible to local sinks.
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`error`]: API error type and its HTTP mapping
//! - [`http`]: Request tracing middleware
//! - [`observability`]: Spans, decorators, system sampling, telemetry setup
//! - [`server`]: Router assembly and server lifecycle
//! - [`service`]: REST handlers
//! - [`storage`]: SQLite persistence layer

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // storage::StorageError is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::cast_possible_truncation,   // Millisecond and MB conversions
    clippy::cast_precision_loss,        // Percentages are approximate
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod server;
pub mod service;
pub mod storage;

use rand::Rng;

const REQUEST_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a request id of the form `req_<millis>_<9 base36 chars>`.
///
/// # Example
///
/// ```
/// let id = beacon::generate_request_id();
/// assert!(id.starts_with("req_"));
/// assert_eq!(id.rsplit('_').next().unwrap().len(), 9);
/// ```
#[must_use]
pub fn generate_request_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| REQUEST_ID_ALPHABET[rng.gen_range(0..REQUEST_ID_ALPHABET.len())] as char)
        .collect();
    format!("req_{}_{suffix}", now_millis())
}

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as i64
}
