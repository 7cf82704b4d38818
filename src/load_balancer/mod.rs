//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Host proxy dial → server.rs (LogicalServer)
//!     → Strategy::select over the pool's backends:
//!         - round_robin.rs   (rotating counter)
//!         - least_conn.rs    (fewest active players)
//!         - health_score.rs  (relative scoring, the default)
//!         - sequential.rs    (first available in declaration order)
//!         - random.rs        (uniform over available)
//!     → backend.rs (record latency, attach player)
//!     → TrackedConn returned to the host
//!
//! In parallel, manager.rs probes every backend each tick and drives
//! health transitions through hysteresis thresholds.
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless beyond a round-robin counter and never
//!   mutate backend state
//! - Scores are relative to the best peer, not absolute thresholds
//! - Unhealthy and disabled backends are excluded before selection

pub mod backend;
pub mod health_score;
pub mod least_conn;
pub mod manager;
pub mod random;
pub mod round_robin;
pub mod sequential;
pub mod server;
pub mod window;

use std::sync::Arc;

use crate::history::HistoryManager;
use backend::Backend;

/// A backend selection policy.
///
/// `jitter_threshold` comes from the health-check configuration and is
/// currently consumed by no strategy; it is carried so policies can be
/// tuned without changing this interface.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pick one backend for a new connection, or `None` when no backend
    /// is available. Must not mutate backend state.
    fn select(
        &self,
        backends: &[Arc<Backend>],
        jitter_threshold: f64,
        history: &HistoryManager,
    ) -> Option<Arc<Backend>>;
}

/// Resolve a configured strategy name. Unknown names fall back to
/// health-score.
pub fn strategy_for(name: &str) -> Box<dyn Strategy> {
    match name {
        "round-robin" => Box::new(round_robin::RoundRobin::new()),
        "least-connections" => Box::new(least_conn::LeastConnections),
        "health-score" => Box::new(health_score::HealthScore),
        "sequential" => Box::new(sequential::Sequential),
        "random" => Box::new(random::Random),
        _ => Box::new(health_score::HealthScore),
    }
}

pub(crate) fn filter_available(backends: &[Arc<Backend>]) -> Vec<Arc<Backend>> {
    backends
        .iter()
        .filter(|backend| backend.is_available())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        for name in [
            "round-robin",
            "least-connections",
            "health-score",
            "sequential",
            "random",
        ] {
            assert_eq!(strategy_for(name).name(), name);
        }
    }

    #[test]
    fn unknown_name_falls_back_to_health_score() {
        assert_eq!(strategy_for("fastest").name(), "health-score");
        assert_eq!(strategy_for("").name(), "health-score");
    }

    #[test]
    fn filter_excludes_unavailable() {
        let healthy = Arc::new(Backend::new("127.0.0.1:1", 0, 4));
        let unhealthy = Arc::new(Backend::new("127.0.0.1:2", 0, 4));
        unhealthy.set_healthy(false);
        let disabled = Arc::new(Backend::new("127.0.0.1:3", 0, 4));
        disabled.set_disabled(true);

        let available = filter_available(&[healthy.clone(), unhealthy, disabled]);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].addr(), healthy.addr());
    }
}
