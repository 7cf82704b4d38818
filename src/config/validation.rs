//! Configuration validation logic.
//!
//! Nothing here is fatal. A configuration problem degrades to a documented
//! default, and validation only names what will be degraded so operators can
//! see it in the log.

use crate::config::schema::BalancerConfig;

const KNOWN_STRATEGIES: [&str; 5] = [
    "round-robin",
    "least-connections",
    "health-score",
    "sequential",
    "random",
];

/// A degradation the balancer will apply to this configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning(pub String);

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collect every degradation the given configuration will trigger.
pub fn validate_config(config: &BalancerConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if config.health_check.interval_seconds == 0 {
        warnings.push(ValidationWarning(
            "healthCheck.intervalSeconds is 0, using 5s".to_string(),
        ));
    }
    if config.health_check.dial_timeout_seconds == 0 {
        warnings.push(ValidationWarning(
            "healthCheck.dialTimeoutSeconds is 0, using 3s probes and 5s dials".to_string(),
        ));
    }
    if config.health_check.window_size == 0 {
        warnings.push(ValidationWarning(
            "healthCheck.windowSize is 0, no latency samples will be retained".to_string(),
        ));
    }
    if config.health_check.unhealthy_after_failures == 0 {
        warnings.push(ValidationWarning(
            "healthCheck.unhealthyAfterFailures is 0, every probe failure marks a backend unhealthy"
                .to_string(),
        ));
    }

    for (name, server) in &config.servers {
        if !server.strategy.is_empty() && !KNOWN_STRATEGIES.contains(&server.strategy.as_str()) {
            warnings.push(ValidationWarning(format!(
                "server '{}' names unknown strategy '{}', falling back to health-score",
                name, server.strategy
            )));
        }
        if server.backends.is_empty() {
            warnings.push(ValidationWarning(format!(
                "server '{}' has no backends, every dial will fail",
                name
            )));
        }
        for backend in &server.backends {
            if backend.addr.is_empty() || !backend.addr.contains(':') {
                warnings.push(ValidationWarning(format!(
                    "server '{}' backend address '{}' is not host:port, backend will be skipped",
                    name, backend.addr
                )));
            }
        }
    }

    warnings
}
