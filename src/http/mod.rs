//! HTTP request instrumentation.

pub mod middleware;

pub use middleware::{error_tracing, request_tracing, server_span, REQUEST_ID_HEADER};
