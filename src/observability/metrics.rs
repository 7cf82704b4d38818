//! Metrics helpers.
//!
//! The crate records through the `metrics` facade only; installing an
//! exporter is the host's decision.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Update the health gauge for a backend.
pub fn record_backend_health(pool: &str, backend: &str, healthy: bool) {
    let labels = [
        ("pool", pool.to_string()),
        ("backend", backend.to_string()),
    ];
    gauge!("balancer_backend_healthy", &labels).set(if healthy { 1.0 } else { 0.0 });
}

/// Record a successful probe round-trip.
pub fn record_probe(pool: &str, backend: &str, latency: Duration) {
    let labels = [
        ("pool", pool.to_string()),
        ("backend", backend.to_string()),
    ];
    histogram!("balancer_probe_latency_seconds", &labels).record(latency.as_secs_f64());
}

/// Count a dial attempt against a pool.
pub fn record_dial(pool: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    let labels = [("pool", pool.to_string()), ("outcome", outcome.to_string())];
    counter!("balancer_dials_total", &labels).increment(1);
}
