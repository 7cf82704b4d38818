//! Sequential selection.

use std::sync::Arc;

use crate::history::HistoryManager;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::Strategy;

/// Picks the first available backend in declaration order, giving
/// operators a primary/spillover layout.
#[derive(Debug, Default)]
pub struct Sequential;

impl Strategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn select(
        &self,
        backends: &[Arc<Backend>],
        _jitter_threshold: f64,
        _history: &HistoryManager,
    ) -> Option<Arc<Backend>> {
        backends.iter().find(|backend| backend.is_available()).cloned()
    }
}
