//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define API metrics (requests, latency, throttling, store faults, cache)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `api_requests_total` (counter): total requests by endpoint, status
//! - `api_request_duration_seconds` (histogram): latency distribution
//! - `api_rate_limited_total` (counter): requests rejected for quota
//! - `api_query_retries_total` (counter): store operations retried
//! - `api_query_failures_total` (counter): store failures by error kind
//! - `api_cache_hits_total` / `api_cache_misses_total` (counters)
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so tests need no setup
//! - Labels stay low-cardinality: endpoint name, status code, error kind

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::ErrorKind;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(error = %e, address = %addr, "Failed to install metrics recorder");
        }
    }
}

fn describe() {
    describe_counter!("api_requests_total", "Total API requests by endpoint and status");
    describe_histogram!(
        "api_request_duration_seconds",
        "API request duration in seconds"
    );
    describe_counter!("api_rate_limited_total", "Requests rejected by the rate limiter");
    describe_counter!("api_query_retries_total", "Store operations retried after a fault");
    describe_counter!("api_query_failures_total", "Store operations that failed, by kind");
    describe_counter!("api_cache_hits_total", "Query cache hits");
    describe_counter!("api_cache_misses_total", "Query cache misses");
}

pub fn record_request(endpoint: &str, status: u16, start: Instant) {
    counter!(
        "api_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("api_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(endpoint: &str) {
    counter!("api_rate_limited_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_query_retry() {
    counter!("api_query_retries_total").increment(1);
}

pub fn record_query_failure(kind: ErrorKind) {
    counter!("api_query_failures_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!("api_cache_hits_total").increment(1);
    } else {
        counter!("api_cache_misses_total").increment(1);
    }
}
