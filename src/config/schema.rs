//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Field names
//! are camelCase on disk, matching the host proxy's configuration style.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the load balancing layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct BalancerConfig {
    /// Master switch.
    pub load_balancer: LoadBalancerSwitch,

    /// Health check cadence and thresholds, shared by all pools.
    pub health_check: HealthCheckConfig,

    /// Pool definitions, keyed by the logical server name.
    pub servers: BTreeMap<String, ServerConfig>,
}

/// Master switch section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadBalancerSwitch {
    /// Whether pools are registered and health checking runs.
    pub enabled: bool,
}

impl Default for LoadBalancerSwitch {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthCheckConfig {
    /// Probe interval in seconds. 0 degrades to 5.
    pub interval_seconds: u64,

    /// Latency samples retained per backend.
    pub window_size: usize,

    /// Consecutive probe failures before a backend is marked unhealthy.
    pub unhealthy_after_failures: u32,

    /// Consecutive probe successes before an unhealthy backend recovers.
    pub healthy_after_successes: u32,

    /// Reserved; handed to strategies but not consumed by any of them.
    pub jitter_threshold: f64,

    /// Deadline in seconds for probes and player dials. 0 degrades to
    /// defaults (3 s for probes, 5 s for dials).
    pub dial_timeout_seconds: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            window_size: 30,
            unhealthy_after_failures: 3,
            healthy_after_successes: 3,
            jitter_threshold: 0.0,
            dial_timeout_seconds: 3,
        }
    }
}

/// One load balanced pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Strategy name: round-robin, least-connections, health-score,
    /// sequential or random. Anything else falls back to health-score.
    pub strategy: String,

    /// Backend endpoints in declaration order.
    pub backends: Vec<BackendConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            strategy: "health-score".to_string(),
            backends: Vec::new(),
        }
    }
}

/// One backend endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// host:port of the backend server.
    pub addr: String,

    /// Maximum concurrent players. 0 = unbounded.
    #[serde(default)]
    pub max_connections: u32,
}
