//! Relative health scoring, the default strategy.
//!
//! Scores are computed against the current best peer rather than against
//! absolute latency thresholds: a pool on a slow link should still prefer
//! its best member. The live score is then adjusted by the time-of-day
//! history, so a backend running worse than it usually does at this hour
//! loses ground even if its absolute numbers look fine.

use std::sync::Arc;

use crate::history::HistoryManager;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::{filter_available, Strategy};

/// Composite scoring over latency, jitter, utilization, stability, trend,
/// trust and history. See [`Backend::relative_health_score`].
#[derive(Debug, Default)]
pub struct HealthScore;

impl Strategy for HealthScore {
    fn name(&self) -> &'static str {
        "health-score"
    }

    fn select(
        &self,
        backends: &[Arc<Backend>],
        _jitter_threshold: f64,
        history: &HistoryManager,
    ) -> Option<Arc<Backend>> {
        let available = filter_available(backends);
        if available.is_empty() {
            return None;
        }

        let (min_latency, min_jitter) = pool_minimums(&available);

        let mut best: Option<&Arc<Backend>> = None;
        let mut best_score = i32::MIN;
        for backend in &available {
            let score = score_backend(backend, min_latency, min_jitter, history);
            if best.is_none() || score > best_score {
                best_score = score;
                best = Some(backend);
            }
        }
        best.cloned()
    }
}

/// Minimum positive average latency and jitter across `backends`,
/// defaulting to 1 where no backend has data yet.
pub(crate) fn pool_minimums(backends: &[Arc<Backend>]) -> (f64, f64) {
    let mut min_latency = f64::INFINITY;
    let mut min_jitter = f64::INFINITY;
    for backend in backends {
        let avg = backend.avg_latency();
        let jitter = backend.jitter();
        if avg > 0.0 && avg < min_latency {
            min_latency = avg;
        }
        if jitter > 0.0 && jitter < min_jitter {
            min_jitter = jitter;
        }
    }
    (
        if min_latency.is_finite() { min_latency } else { 1.0 },
        if min_jitter.is_finite() { min_jitter } else { 1.0 },
    )
}

/// Relative score plus the historical adjustment for one backend.
/// Disabled and unhealthy backends score a flat 0.
pub(crate) fn score_backend(
    backend: &Backend,
    min_latency: f64,
    min_jitter: f64,
    history: &HistoryManager,
) -> i32 {
    if backend.is_disabled() || !backend.is_healthy() {
        return 0;
    }
    let base = backend.relative_health_score(min_latency, min_jitter);
    base + history.historical_score(backend.addr(), backend.avg_latency(), backend.jitter())
}
