//! Backend state tracking.
//!
//! # Responsibilities
//! - Represent a single backend server of a pool
//! - Track connections, probe streaks, health and trust
//! - Score itself relative to the best peer in the pool
//!
//! Counters and flags are atomics; only the latency window and the player
//! set take short locks. `current_conns` moves only when player-set
//! membership actually changes, under the set's lock, so the two can never
//! drift apart.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::load_balancer::window::LatencyWindow;

/// Trust floor a freshly recovered backend restarts from (percent).
const TRUST_FLOOR: u32 = 50;
const TRUST_CEIL: u32 = 100;
const TRUST_STEP: u32 = 10;

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    addr: String,
    max_connections: u32,

    current_conns: AtomicU32,
    fail_count: AtomicU32,
    success_count: AtomicU32,
    healthy: AtomicBool,
    disabled: AtomicBool,

    /// Trust coefficient stored as a percentage (50-100).
    trust: AtomicU32,

    /// Unix millis of the last probe attempt, 0 = never probed.
    last_check_ms: AtomicI64,

    window: RwLock<LatencyWindow>,
    players: Mutex<HashSet<String>>,
}

impl Backend {
    pub fn new(addr: impl Into<String>, max_connections: u32, window_size: usize) -> Self {
        Self {
            addr: addr.into(),
            max_connections,
            current_conns: AtomicU32::new(0),
            fail_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
            disabled: AtomicBool::new(false),
            trust: AtomicU32::new(TRUST_CEIL),
            last_check_ms: AtomicI64::new(0),
            window: RwLock::new(LatencyWindow::new(window_size)),
            players: Mutex::new(HashSet::new()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn current_conns(&self) -> u32 {
        self.current_conns.load(Ordering::Relaxed)
    }

    /// A backend takes traffic iff it is healthy, not administratively
    /// disabled, and not at its connection cap.
    pub fn is_available(&self) -> bool {
        if self.disabled.load(Ordering::Relaxed) {
            return false;
        }
        if !self.healthy.load(Ordering::Relaxed) {
            return false;
        }
        if self.max_connections > 0 && self.current_conns() >= self.max_connections {
            return false;
        }
        true
    }

    pub fn record_latency(&self, latency: Duration) {
        self.window
            .write()
            .unwrap()
            .record(latency.as_millis() as u64);
    }

    pub fn avg_latency(&self) -> f64 {
        self.window.read().unwrap().avg()
    }

    pub fn jitter(&self) -> f64 {
        self.window.read().unwrap().jitter()
    }

    pub fn trend(&self) -> f64 {
        self.window.read().unwrap().trend()
    }

    pub fn window_len(&self) -> usize {
        self.window.read().unwrap().len()
    }

    /// Attach a player. Idempotent per name: the connection count only moves
    /// when the player was not already attached.
    pub fn attach_player(&self, name: &str) {
        let mut players = self.players.lock().unwrap();
        if players.insert(name.to_string()) {
            self.current_conns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Detach a player. A second detach for the same name is a no-op.
    pub fn detach_player(&self, name: &str) {
        let mut players = self.players.lock().unwrap();
        if players.remove(name) {
            self.current_conns.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn players(&self) -> Vec<String> {
        let players = self.players.lock().unwrap();
        let mut names: Vec<String> = players.iter().cloned().collect();
        names.sort();
        names
    }

    /// Successful player dial: the failure streak ends.
    pub fn record_success(&self) {
        self.fail_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful health probe: also advances the recovery streak.
    pub fn record_check_success(&self) {
        self.fail_count.store(0, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Failed health probe: the recovery streak restarts.
    pub fn record_check_failure(&self) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count.load(Ordering::Relaxed)
    }

    pub fn success_count(&self) -> u32 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn reset_success_count(&self) {
        self.success_count.store(0, Ordering::Relaxed);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Trust coefficient in [0.5, 1.0].
    pub fn trust(&self) -> f64 {
        self.trust.load(Ordering::Relaxed) as f64 / 100.0
    }

    /// Raise trust one step, saturating at 1.0.
    pub fn increase_trust(&self) {
        let mut current = self.trust.load(Ordering::Relaxed);
        while current < TRUST_CEIL {
            let next = (current + TRUST_STEP).min(TRUST_CEIL);
            match self.trust.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop back to the trust floor; called on recovery.
    pub fn reset_trust(&self) {
        self.trust.store(TRUST_FLOOR, Ordering::Relaxed);
    }

    pub fn set_last_check(&self, at: SystemTime) {
        let millis = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        self.last_check_ms.store(millis, Ordering::Relaxed);
    }

    pub fn last_check(&self) -> Option<SystemTime> {
        match self.last_check_ms.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(UNIX_EPOCH + Duration::from_millis(millis as u64)),
        }
    }

    /// Score this backend against the best peers of its pool.
    ///
    /// `min_latency` and `min_jitter` are the pool's best positive averages
    /// (1 when no peer has data). The subtotal is scaled by trust and
    /// clamped to [0, 100]; disabled or unhealthy backends score 0.
    pub fn relative_health_score(&self, min_latency: f64, min_jitter: f64) -> i32 {
        if self.is_disabled() || !self.is_healthy() {
            return 0;
        }

        let mut score = 0.0_f64;

        // Latency (40 points max), relative to the best peer.
        let avg = self.avg_latency();
        if avg > 0.0 && min_latency > 0.0 {
            score += 40.0 * (min_latency / avg);
        } else if avg == 0.0 {
            score += 40.0;
        }

        // Jitter (30 points max), relative to the best peer.
        let jitter = self.jitter();
        if jitter > 0.0 && min_jitter > 0.0 {
            score += 30.0 * (min_jitter / jitter);
        } else if jitter == 0.0 {
            score += 30.0;
        }

        // Utilization (20 points max).
        if self.max_connections > 0 {
            let ratio = self.current_conns() as f64 / self.max_connections as f64;
            score += 20.0 * (1.0 - ratio);
        } else {
            score += 20.0;
        }

        // Stability (10 points): any active failure streak forfeits it.
        if self.fail_count() == 0 {
            score += 10.0;
        }

        // Trend adjustment (-10 to +10).
        let trend = self.trend();
        if trend > 20.0 {
            score -= 10.0;
        } else if trend > 10.0 {
            score -= 5.0;
        } else if trend < -20.0 {
            score += 10.0;
        } else if trend < -10.0 {
            score += 5.0;
        }

        score *= self.trust();
        score.clamp(0.0, 100.0) as i32
    }

    /// Atomic snapshot for monitoring and the admin surface.
    pub fn stats(&self) -> BackendStats {
        BackendStats {
            addr: self.addr.clone(),
            current_conns: self.current_conns(),
            max_connections: self.max_connections,
            avg_latency: self.avg_latency(),
            jitter: self.jitter(),
            fail_count: self.fail_count(),
            healthy: self.is_healthy(),
            disabled: self.is_disabled(),
            players: self.players(),
        }
    }
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStats {
    pub addr: String,
    pub current_conns: u32,
    pub max_connections: u32,
    pub avg_latency: f64,
    pub jitter: f64,
    pub fail_count: u32,
    pub healthy: bool,
    pub disabled: bool,
    pub players: Vec<String>,
}
