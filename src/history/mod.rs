//! Per-period latency history.
//!
//! Each backend gets 96 fifteen-minute buckets tiling a local day. Probe
//! results update the current bucket's latency and jitter through an EMA
//! (alpha = 0.1), and scoring asks the bucket for a small adjustment: a
//! backend running better than it usually does at this time of day earns up
//! to +12 points, one running worse loses up to -12. Buckets stay silent
//! until they have seen 20 samples.
//!
//! The in-memory cache serves every read; SQLite (`store`) is the model of
//! record. Dirty buckets are flushed in one transaction per health sweep
//! and once more on shutdown. The bucket index is local-timezone-dependent:
//! a database moved across timezones should be rebuilt, not migrated.

pub mod store;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::Timelike;
use serde::Serialize;

use store::{HistoryError, HistoryStore};

/// EMA smoothing factor: 10% new data, 90% history.
const EMA_ALPHA: f64 = 0.1;

/// Minimum samples in a bucket before history influences scoring.
const MIN_SAMPLES_FOR_USE: u32 = 20;

/// Fifteen-minute buckets per local day.
pub const PERIODS_PER_DAY: usize = 96;

/// Statistics for one backend in one 15-minute period.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PeriodStats {
    pub avg_latency: f64,
    pub avg_jitter: f64,
    pub samples: u32,
    pub period_index: usize,
    pub period_label: String,
}

/// Historical statistics for all backends.
pub struct HistoryManager {
    cache: RwLock<HashMap<String, Vec<PeriodStats>>>,
    dirty: Mutex<HashSet<(String, usize)>>,
    store: Option<HistoryStore>,
}

impl HistoryManager {
    /// Open (or create) the history database under `data_dir` and load it
    /// into the cache. A storage failure degrades to a memory-only manager.
    pub fn open(data_dir: &Path) -> Self {
        if let Err(err) = std::fs::create_dir_all(data_dir) {
            tracing::warn!(error = %err, "Failed to create history data directory");
        }
        let store = match HistoryStore::open(&data_dir.join("lb_history.db")) {
            Ok(store) => Some(store),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "Failed to open history store, continuing without persistence"
                );
                None
            }
        };

        let cache = match &store {
            Some(store) => match store.load_all() {
                Ok(cache) => cache,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to load history, starting fresh");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        Self {
            cache: RwLock::new(cache),
            dirty: Mutex::new(HashSet::new()),
            store,
        }
    }

    /// A manager with no persistent store.
    pub fn in_memory() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            store: None,
        }
    }

    /// Record a sample into the current period.
    pub fn record(&self, addr: &str, latency_ms: f64, jitter: f64) {
        self.record_at(addr, current_period_index(), latency_ms, jitter);
    }

    /// Record a sample into a specific period bucket.
    pub fn record_at(&self, addr: &str, period: usize, latency_ms: f64, jitter: f64) {
        if period >= PERIODS_PER_DAY {
            return;
        }

        {
            let mut cache = self.cache.write().unwrap();
            let periods = cache
                .entry(addr.to_string())
                .or_insert_with(new_backend_periods);
            let stats = &mut periods[period];
            if stats.samples == 0 {
                stats.avg_latency = latency_ms;
                stats.avg_jitter = jitter;
            } else {
                stats.avg_latency = EMA_ALPHA * latency_ms + (1.0 - EMA_ALPHA) * stats.avg_latency;
                stats.avg_jitter = EMA_ALPHA * jitter + (1.0 - EMA_ALPHA) * stats.avg_jitter;
            }
            stats.samples += 1;
        }

        self.dirty.lock().unwrap().insert((addr.to_string(), period));
    }

    /// Snapshot of one backend's bucket, if the backend has history.
    pub fn period_stats(&self, addr: &str, period: usize) -> Option<PeriodStats> {
        if period >= PERIODS_PER_DAY {
            return None;
        }
        let cache = self.cache.read().unwrap();
        cache.get(addr).map(|periods| periods[period].clone())
    }

    pub fn current_period_stats(&self, addr: &str) -> Option<PeriodStats> {
        self.period_stats(addr, current_period_index())
    }

    /// Score adjustment in [-12, +12] comparing the current measurements to
    /// this time of day's history. 0 until the bucket has 20 samples.
    pub fn historical_score(&self, addr: &str, current_latency: f64, current_jitter: f64) -> i32 {
        self.historical_score_at(addr, current_period_index(), current_latency, current_jitter)
    }

    pub fn historical_score_at(
        &self,
        addr: &str,
        period: usize,
        current_latency: f64,
        current_jitter: f64,
    ) -> i32 {
        let Some(stats) = self.period_stats(addr, period) else {
            return 0;
        };
        if stats.samples < MIN_SAMPLES_FOR_USE {
            return 0;
        }

        let mut score = 0;

        // Latency comparison (max +/- 8 points).
        if stats.avg_latency > 0.0 && current_latency > 0.0 {
            let ratio = current_latency / stats.avg_latency;
            if ratio < 0.7 {
                score += 8;
            } else if ratio < 0.85 {
                score += 4;
            } else if ratio > 1.5 {
                score -= 8;
            } else if ratio > 1.2 {
                score -= 4;
            }
        }

        // Jitter comparison (max +/- 4 points).
        if stats.avg_jitter > 0.0 && current_jitter > 0.0 {
            let ratio = current_jitter / stats.avg_jitter;
            if ratio < 0.7 {
                score += 4;
            } else if ratio > 1.5 {
                score -= 4;
            }
        }

        score
    }

    /// Write every dirty bucket to the store in one transaction. Buckets
    /// that fail to write stay dirty and are retried on the next flush;
    /// nothing propagates to the dial path.
    pub fn flush(&self) -> Result<(), HistoryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let pending: Vec<(String, usize)> = {
            let mut dirty = self.dirty.lock().unwrap();
            dirty.drain().collect()
        };
        if pending.is_empty() {
            return Ok(());
        }

        let rows: Vec<(String, PeriodStats)> = {
            let cache = self.cache.read().unwrap();
            pending
                .iter()
                .filter_map(|(addr, period)| {
                    cache
                        .get(addr)
                        .map(|periods| (addr.clone(), periods[*period].clone()))
                })
                .collect()
        };

        if let Err(err) = store.upsert(&rows) {
            let mut dirty = self.dirty.lock().unwrap();
            for key in pending {
                dirty.insert(key);
            }
            return Err(err);
        }
        Ok(())
    }
}

pub(crate) fn new_backend_periods() -> Vec<PeriodStats> {
    (0..PERIODS_PER_DAY)
        .map(|index| PeriodStats {
            period_index: index,
            period_label: period_label(index),
            ..Default::default()
        })
        .collect()
}

/// Current 15-minute period index (0-95) in local time.
pub fn current_period_index() -> usize {
    let now = chrono::Local::now();
    (now.hour() * 4 + now.minute() / 15) as usize
}

/// "HH:MM-HH:MM" label for a period index, in local time.
pub fn period_label(period: usize) -> String {
    if period >= PERIODS_PER_DAY {
        return String::new();
    }
    let start_min = period * 15;
    let end_min = (start_min + 15) % (24 * 60);
    format!(
        "{:02}:{:02}-{:02}:{:02}",
        start_min / 60,
        start_min % 60,
        end_min / 60,
        end_min % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_taken_verbatim() {
        let history = HistoryManager::in_memory();
        history.record_at("b:1", 10, 42.0, 7.0);

        let stats = history.period_stats("b:1", 10).unwrap();
        assert_eq!(stats.avg_latency, 42.0);
        assert_eq!(stats.avg_jitter, 7.0);
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.period_label, "02:30-02:45");
    }

    #[test]
    fn later_samples_are_ema_smoothed() {
        let history = HistoryManager::in_memory();
        history.record_at("b:1", 0, 100.0, 10.0);
        history.record_at("b:1", 0, 50.0, 20.0);

        let stats = history.period_stats("b:1", 0).unwrap();
        // 0.1 * 50 + 0.9 * 100
        assert!((stats.avg_latency - 95.0).abs() < 1e-9);
        // 0.1 * 20 + 0.9 * 10
        assert!((stats.avg_jitter - 11.0).abs() < 1e-9);
        assert_eq!(stats.samples, 2);
    }

    #[test]
    fn score_is_gated_until_twenty_samples() {
        let history = HistoryManager::in_memory();
        for _ in 0..19 {
            history.record_at("b:1", 37, 50.0, 5.0);
        }
        assert_eq!(history.historical_score_at("b:1", 37, 10.0, 5.0), 0);

        history.record_at("b:1", 37, 50.0, 5.0);
        assert_eq!(history.historical_score_at("b:1", 37, 10.0, 5.0), 8);
    }

    #[test]
    fn latency_ratio_bands() {
        let history = HistoryManager::in_memory();
        for _ in 0..50 {
            history.record_at("b:1", 37, 50.0, 5.0);
        }

        // Much better / somewhat better / unchanged / somewhat worse / much worse.
        assert_eq!(history.historical_score_at("b:1", 37, 25.0, 0.0), 8);
        assert_eq!(history.historical_score_at("b:1", 37, 40.0, 0.0), 4);
        assert_eq!(history.historical_score_at("b:1", 37, 50.0, 0.0), 0);
        assert_eq!(history.historical_score_at("b:1", 37, 80.0, 0.0), -4);
        assert_eq!(history.historical_score_at("b:1", 37, 100.0, 0.0), -8);
    }

    #[test]
    fn jitter_ratio_bands_combine_with_latency() {
        let history = HistoryManager::in_memory();
        for _ in 0..25 {
            history.record_at("b:1", 5, 50.0, 10.0);
        }

        assert_eq!(history.historical_score_at("b:1", 5, 25.0, 5.0), 12);
        assert_eq!(history.historical_score_at("b:1", 5, 100.0, 20.0), -12);
        assert_eq!(history.historical_score_at("b:1", 5, 50.0, 20.0), -4);
    }

    #[test]
    fn unknown_backend_scores_zero() {
        let history = HistoryManager::in_memory();
        assert_eq!(history.historical_score_at("nope:1", 0, 10.0, 1.0), 0);
        assert!(history.period_stats("nope:1", 0).is_none());
    }

    #[test]
    fn out_of_range_period_is_ignored() {
        let history = HistoryManager::in_memory();
        history.record_at("b:1", PERIODS_PER_DAY, 10.0, 1.0);
        assert!(history.period_stats("b:1", 0).is_none());
    }

    #[test]
    fn period_labels() {
        assert_eq!(period_label(0), "00:00-00:15");
        assert_eq!(period_label(37), "09:15-09:30");
        assert_eq!(period_label(95), "23:45-00:00");
        assert_eq!(period_label(96), "");
    }

    #[test]
    fn current_period_index_is_in_range() {
        assert!(current_period_index() < PERIODS_PER_DAY);
    }

    #[test]
    fn flush_without_store_is_a_noop() {
        let history = HistoryManager::in_memory();
        history.record_at("b:1", 0, 10.0, 1.0);
        history.flush().unwrap();
    }
}
