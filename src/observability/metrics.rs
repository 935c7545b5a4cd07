//! Metrics collection and exposition.
//!
//! # Metrics
//! - `engine_cache_hits_total` / `engine_cache_misses_total` (counter)
//! - `engine_cache_evictions_total` (counter, by policy)
//! - `engine_cache_entries` / `engine_cache_bytes` (gauge)
//! - `engine_breaker_state` (gauge per dependency: 0=closed, 1=open, 2=half-open)
//! - `engine_retry_attempts_total` (counter, by dependency)
//! - `engine_failover_switches_total` (counter, by dependency)
//! - `engine_probe_results_total` (counter, by check and outcome)
//! - `engine_probe_latency_seconds` (histogram, by check)

use metrics::{counter, gauge, histogram};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    if let Err(e) = builder.install() {
        tracing::error!(error = %e, "Failed to install Prometheus exporter");
    } else {
        tracing::info!(address = %addr, "Metrics exporter listening");
    }
}

pub fn record_cache_hit() {
    counter!("engine_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    counter!("engine_cache_misses_total").increment(1);
}

pub fn record_cache_eviction(policy: &'static str) {
    counter!("engine_cache_evictions_total", "policy" => policy).increment(1);
}

pub fn record_cache_size(entries: usize, bytes: usize) {
    gauge!("engine_cache_entries").set(entries as f64);
    gauge!("engine_cache_bytes").set(bytes as f64);
}

pub fn record_cache_rejected_entry() {
    counter!("engine_cache_rejected_entries_total").increment(1);
}

pub fn record_breaker_state(dependency: &str, state: u8) {
    gauge!("engine_breaker_state", "dependency" => dependency.to_string()).set(state as f64);
}

pub fn record_retry_attempt(dependency: &str) {
    counter!("engine_retry_attempts_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_failover_switch(dependency: &str) {
    counter!("engine_failover_switches_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_probe_result(check: &str, healthy: bool, latency: Duration) {
    let outcome = if healthy { "success" } else { "failure" };
    counter!("engine_probe_results_total", "check" => check.to_string(), "outcome" => outcome)
        .increment(1);
    if healthy {
        histogram!("engine_probe_latency_seconds", "check" => check.to_string())
            .record(latency.as_secs_f64());
    }
}
