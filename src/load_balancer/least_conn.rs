//! Least-connections selection.

use std::sync::Arc;

use crate::history::HistoryManager;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::{filter_available, Strategy};

/// Picks the available backend with the fewest active players.
/// Ties go to the first backend encountered, for stability.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl Strategy for LeastConnections {
    fn name(&self) -> &'static str {
        "least-connections"
    }

    fn select(
        &self,
        backends: &[Arc<Backend>],
        _jitter_threshold: f64,
        _history: &HistoryManager,
    ) -> Option<Arc<Backend>> {
        let available = filter_available(backends);
        available
            .iter()
            .min_by_key(|backend| backend.current_conns())
            .cloned()
    }
}
