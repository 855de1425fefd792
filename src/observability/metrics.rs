//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define edge metrics (requests, latency, rewrites, cache writes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by class, cache outcome, status
//! - `edge_request_duration_seconds` (histogram): latency by class
//! - `edge_rewrite_duration_seconds` (histogram): HTML rewrite time by mode
//! - `edge_cache_stores_total` (counter): background writes by result
//! - `edge_cache_entries` (gauge): entries held by the memory store

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(class: &'static str, cache: &'static str, status: u16, start: Instant) {
    counter!(
        "edge_requests_total",
        "class" => class,
        "cache" => cache,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("edge_request_duration_seconds", "class" => class)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rewrite(mode: &'static str, start: Instant) {
    histogram!("edge_rewrite_duration_seconds", "mode" => mode)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_store(result: &'static str) {
    counter!("edge_cache_stores_total", "result" => result).increment(1);
}

pub fn record_cache_entries(entries: usize) {
    gauge!("edge_cache_entries").set(entries as f64);
}
