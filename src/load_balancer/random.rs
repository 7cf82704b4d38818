//! Uniform random selection.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::history::HistoryManager;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::{filter_available, Strategy};

/// Picks uniformly over the available backends from the OS entropy source.
/// If the source fails, the first available backend is used.
#[derive(Debug, Default)]
pub struct Random;

impl Strategy for Random {
    fn name(&self) -> &'static str {
        "random"
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

        let mut buf = [0u8; 8];
        let index = match OsRng.try_fill_bytes(&mut buf) {
            Ok(()) => (u64::from_le_bytes(buf) % available.len() as u64) as usize,
            Err(_) => 0,
        };
        Some(Arc::clone(&available[index]))
    }
}
