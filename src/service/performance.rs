//! Three-state performance demo endpoint.
//!
//! Calls cycle through a fast in-memory catalog, a deliberately expensive
//! catalog and a 404 that resets the cycle. The counter is shared by every
//! request hitting the same [`PerformanceLab`].

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::observability::{add_attributes, record_event};
use crate::server::AppState;

/// Behaviour of a performance-test call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Behavior {
    Optimized,
    Heavy,
    Unavailable,
}

impl Behavior {
    /// Behaviour of call number `call` within a cycle (1-based).
    fn for_call(call: u32) -> Self {
        match call {
            1 => Self::Optimized,
            2 => Self::Heavy,
            _ => Self::Unavailable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimized => "OPTIMIZED",
            Self::Heavy => "HEAVY",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

/// Counter state reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterStatus {
    pub current_count: u32,
    pub next_behavior: Behavior,
}

/// Synthetic product returned by the performance endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoProduct {
    pub id: u32,
    pub name: String,
    pub price: i64,
    pub description: String,
    pub is_available: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heavy_calculation: Option<f64>,
}

/// Workload and call counter of the performance endpoint.
#[derive(Debug)]
pub struct PerformanceLab {
    calls: AtomicU32,
    catalog_size: u32,
    heavy_iterations: u32,
    heavy_pause: Duration,
}

impl Default for PerformanceLab {
    fn default() -> Self {
        Self::with_workload(1000, 10_000, Duration::from_millis(2))
    }
}

impl PerformanceLab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lab producing `catalog_size` products, spending `heavy_iterations`
    /// trig steps and a `heavy_pause` sleep per product on heavy calls.
    pub fn with_workload(catalog_size: u32, heavy_iterations: u32, heavy_pause: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            catalog_size,
            heavy_iterations,
            heavy_pause,
        }
    }

    /// Count a call and return its number and behaviour. The third call of a
    /// cycle resets the counter.
    pub fn next_call(&self) -> (u32, Behavior) {
        let previous = self
            .calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(if count + 1 >= 3 { 0 } else { count + 1 })
            })
            .unwrap_or_else(|count| count);
        let call = (previous + 1).min(3);
        (call, Behavior::for_call(call))
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::Release);
    }

    pub fn status(&self) -> CounterStatus {
        let current_count = self.calls.load(Ordering::Acquire);
        CounterStatus {
            current_count,
            next_behavior: Behavior::for_call(current_count + 1),
        }
    }

    /// In-memory catalog built without any extra work.
    pub fn optimized_catalog(&self) -> Vec<DemoProduct> {
        let mut rng = rand::thread_rng();
        let now = Utc::now();
        (1..=self.catalog_size)
            .map(|id| DemoProduct {
                id,
                name: format!("Optimized Product {id}"),
                price: rng.gen_range(10..1010),
                description: format!("Quick description of product {id}"),
                is_available: true,
                deleted: false,
                created_at: now,
                updated_at: now,
                heavy_calculation: None,
            })
            .collect()
    }

    /// Catalog built with pointless computation and a pause per product.
    pub async fn heavy_catalog(&self) -> Vec<DemoProduct> {
        let mut products = Vec::with_capacity(self.catalog_size as usize);

        for id in 1..=self.catalog_size {
            let heavy_calculation: f64 = (0..self.heavy_iterations)
                .map(|j| {
                    let j = f64::from(j);
                    j.sin() * j.cos() * j.sqrt()
                })
                .sum();

            tokio::time::sleep(self.heavy_pause).await;

            let mut description = String::new();
            for step in 0..100 {
                description.push_str(&format!(
                    "Very detailed and costly description of product {id} with processing step {step}. "
                ));
            }
            description.truncate(255);

            let now = Utc::now();
            products.push(DemoProduct {
                id,
                name: format!("Heavy Product {id}"),
                price: (heavy_calculation % 1000.0).floor() as i64 + 10,
                description,
                is_available: rand::thread_rng().gen_bool(0.5),
                deleted: false,
                created_at: now,
                updated_at: now,
                heavy_calculation: Some(heavy_calculation),
            });
        }
        products
    }
}

fn execution_time(started: Instant) -> String {
    format!("{}ms", started.elapsed().as_millis())
}

/// `GET /api/products/performance-test`
pub async fn performance_test(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let (call, behavior) = state.performance.next_call();

    add_attributes([
        KeyValue::new("performance.call_number", i64::from(call)),
        KeyValue::new("performance.mode", behavior.as_str()),
    ]);

    let (products, message) = match behavior {
        Behavior::Optimized => (
            state.performance.optimized_catalog(),
            "Fast response served from in-memory data",
        ),
        Behavior::Heavy => (
            state.performance.heavy_catalog().await,
            "Heavy processing with unnecessary calculations",
        ),
        Behavior::Unavailable => {
            record_event("performance.counter.reset", [KeyValue::new("call_number", 3_i64)]);
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "Endpoint temporarily unavailable",
                    "callNumber": call,
                    "performance": behavior,
                    "executionTime": execution_time(started),
                    "message": "Counter reset. The next call will be optimized again.",
                    "nextCall": "The next call will be the first (optimized)",
                })),
            )
                .into_response();
        }
    };

    add_attributes([KeyValue::new("performance.total_products", products.len() as i64)]);
    Json(json!({
        "callNumber": call,
        "performance": behavior,
        "executionTime": execution_time(started),
        "totalProducts": products.len(),
        "products": products,
        "message": message,
    }))
    .into_response()
}

/// `POST /api/products/performance-test/reset`
pub async fn reset_counter(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.performance.reset();
    Json(json!({
        "message": "Counter reset successfully",
        "counter": 0,
    }))
}

/// `GET /api/products/performance-test/status`
pub async fn counter_status(State(state): State<AppState>) -> Json<CounterStatus> {
    Json(state.performance.status())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_cycle_and_reset() {
        let lab = PerformanceLab::with_workload(1, 1, Duration::ZERO);

        assert_eq!(lab.next_call(), (1, Behavior::Optimized));
        assert_eq!(lab.status().next_behavior, Behavior::Heavy);
        assert_eq!(lab.next_call(), (2, Behavior::Heavy));
        assert_eq!(lab.next_call(), (3, Behavior::Unavailable));
        assert_eq!(lab.status().current_count, 0);
        assert_eq!(lab.next_call(), (1, Behavior::Optimized));
    }

    #[test]
    fn test_reset_restarts_cycle() {
        let lab = PerformanceLab::with_workload(1, 1, Duration::ZERO);
        lab.next_call();
        lab.reset();
        assert_eq!(
            lab.status(),
            CounterStatus {
                current_count: 0,
                next_behavior: Behavior::Optimized
            }
        );
    }

    #[tokio::test]
    async fn test_catalogs_have_requested_size() {
        let lab = PerformanceLab::with_workload(5, 10, Duration::ZERO);

        let optimized = lab.optimized_catalog();
        assert_eq!(optimized.len(), 5);
        assert!(optimized.iter().all(|p| (10..1010).contains(&p.price)));

        let heavy = lab.heavy_catalog().await;
        assert_eq!(heavy.len(), 5);
        assert!(heavy.iter().all(|p| p.description.len() <= 255));
        assert!(heavy.iter().all(|p| p.heavy_calculation.is_some()));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_value(CounterStatus {
            current_count: 1,
            next_behavior: Behavior::Heavy,
        })
        .unwrap();
        assert_eq!(json, json!({ "currentCount": 1, "nextBehavior": "HEAVY" }));
    }
}
