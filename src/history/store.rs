//! SQLite persistence for period statistics.
//!
//! One table keyed by `(backend_addr, period_index)`; the in-memory cache
//! in the parent module serves all reads, so the store only sees bulk
//! loads at startup and transactional upserts of dirty buckets.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::history::{new_backend_periods, period_label, PeriodStats, PERIODS_PER_DAY};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS period_stats (
    backend_addr TEXT NOT NULL,
    period_index INTEGER NOT NULL,
    period_label TEXT NOT NULL,
    avg_latency REAL NOT NULL,
    avg_jitter REAL NOT NULL,
    samples INTEGER NOT NULL,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (backend_addr, period_index)
);
CREATE INDEX IF NOT EXISTS idx_period_stats_backend_addr
    ON period_stats (backend_addr);
";

pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load every stored bucket into per-backend period vectors. Rows with
    /// an out-of-range period index are skipped; missing labels are
    /// backfilled from the index.
    pub fn load_all(&self) -> Result<HashMap<String, Vec<PeriodStats>>, HistoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT backend_addr, period_index, period_label, avg_latency, avg_jitter, samples
             FROM period_stats",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut cache: HashMap<String, Vec<PeriodStats>> = HashMap::new();
        for row in rows {
            let (addr, period, label, avg_latency, avg_jitter, samples) = row?;
            if period < 0 || period >= PERIODS_PER_DAY as i64 {
                continue;
            }
            let period = period as usize;
            let periods = cache.entry(addr).or_insert_with(new_backend_periods);
            periods[period] = PeriodStats {
                avg_latency,
                avg_jitter,
                samples: samples.max(0) as u32,
                period_index: period,
                period_label: if label.is_empty() {
                    period_label(period)
                } else {
                    label
                },
            };
        }
        Ok(cache)
    }

    /// Upsert the given buckets in one transaction.
    pub fn upsert(&self, rows: &[(String, PeriodStats)]) -> Result<(), HistoryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO period_stats
                 (backend_addr, period_index, period_label, avg_latency, avg_jitter, samples, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)",
            )?;
            for (addr, stats) in rows {
                stmt.execute(params![
                    addr,
                    stats.period_index as i64,
                    stats.period_label,
                    stats.avg_latency,
                    stats.avg_jitter,
                    stats.samples as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
