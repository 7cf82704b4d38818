//! Round-robin selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::history::HistoryManager;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::{filter_available, Strategy};

/// Rotates through the available backends with a lock-free counter.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicU64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select(
        &self,
        backends: &[Arc<Backend>],
        _jitter_threshold: f64,
        _history: &HistoryManager,
    ) -> Option<Arc<Backend>> {
        let available = filter_available(backends);
        if available.is_empty() {
            return None;
        }

        let turn = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let index = (turn % available.len() as u64) as usize;
        Some(Arc::clone(&available[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_available_backends() {
        let history = HistoryManager::in_memory();
        let backends = vec![
            Arc::new(Backend::new("127.0.0.1:1", 0, 4)),
            Arc::new(Backend::new("127.0.0.1:2", 0, 4)),
        ];
        let strategy = RoundRobin::new();

        let first = strategy.select(&backends, 0.0, &history).unwrap();
        let second = strategy.select(&backends, 0.0, &history).unwrap();
        let third = strategy.select(&backends, 0.0, &history).unwrap();

        assert_ne!(first.addr(), second.addr());
        assert_eq!(first.addr(), third.addr());
    }

    #[test]
    fn skips_unavailable_backends() {
        let history = HistoryManager::in_memory();
        let down = Arc::new(Backend::new("127.0.0.1:1", 0, 4));
        down.set_healthy(false);
        let up = Arc::new(Backend::new("127.0.0.1:2", 0, 4));
        let strategy = RoundRobin::new();

        for _ in 0..4 {
            let picked = strategy
                .select(&[down.clone(), up.clone()], 0.0, &history)
                .unwrap();
            assert_eq!(picked.addr(), up.addr());
        }
    }

    #[test]
    fn empty_pool_yields_none() {
        let history = HistoryManager::in_memory();
        let strategy = RoundRobin::new();
        assert!(strategy.select(&[], 0.0, &history).is_none());
    }
}
