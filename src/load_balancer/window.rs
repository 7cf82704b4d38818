//! Sliding latency window.

use std::collections::VecDeque;

/// A bounded ring of latency samples in whole milliseconds.
///
/// The window feeds live scoring only; long-term context lives in the
/// per-period history and is never derived from this window.
#[derive(Debug)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full. A zero-capacity
    /// window retains nothing.
    pub fn record(&mut self, ms: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic mean, 0 when empty.
    pub fn avg(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }

    /// Population standard deviation, 0 below two samples.
    pub fn jitter(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let avg = self.avg();
        let variance = self
            .samples
            .iter()
            .map(|&v| {
                let diff = v as f64 - avg;
                diff * diff
            })
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt()
    }

    /// Percent change of the most recent quarter of samples against the
    /// older three quarters. Positive = degrading, negative = improving.
    /// 0 until eight samples have accumulated.
    pub fn trend(&self) -> f64 {
        let n = self.samples.len();
        if n < 8 {
            return 0.0;
        }

        let recent_start = (n - n / 4).max(1);
        let older: u64 = self.samples.iter().take(recent_start).sum();
        let recent: u64 = self.samples.iter().skip(recent_start).sum();

        let older_avg = older as f64 / recent_start as f64;
        let recent_avg = recent as f64 / (n - recent_start) as f64;
        if older_avg == 0.0 {
            return 0.0;
        }
        (recent_avg - older_avg) / older_avg * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut window = LatencyWindow::new(3);
        for ms in [10, 20, 30, 40] {
            window.record(ms);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.avg(), 30.0);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut window = LatencyWindow::new(0);
        window.record(10);
        assert!(window.is_empty());
        assert_eq!(window.avg(), 0.0);
        assert_eq!(window.jitter(), 0.0);
    }

    #[test]
    fn avg_and_jitter() {
        let mut window = LatencyWindow::new(10);
        assert_eq!(window.avg(), 0.0);

        window.record(1);
        assert_eq!(window.avg(), 1.0);
        // A single sample has no spread.
        assert_eq!(window.jitter(), 0.0);

        window.record(5);
        assert_eq!(window.avg(), 3.0);
        assert_eq!(window.jitter(), 2.0);
    }

    #[test]
    fn jitter_is_zero_for_constant_latency() {
        let mut window = LatencyWindow::new(10);
        for _ in 0..5 {
            window.record(25);
        }
        assert_eq!(window.jitter(), 0.0);
    }

    #[test]
    fn trend_requires_eight_samples() {
        let mut window = LatencyWindow::new(10);
        for _ in 0..7 {
            window.record(10);
        }
        assert_eq!(window.trend(), 0.0);
        window.record(100);
        assert!(window.trend() > 0.0);
    }

    #[test]
    fn trend_compares_recent_quarter_to_older_rest() {
        let mut window = LatencyWindow::new(10);
        for _ in 0..6 {
            window.record(10);
        }
        window.record(20);
        window.record(20);
        // Older six average 10, recent two average 20: +100%.
        assert_eq!(window.trend(), 100.0);
    }

    #[test]
    fn improving_trend_is_negative() {
        let mut window = LatencyWindow::new(10);
        for _ in 0..6 {
            window.record(20);
        }
        window.record(10);
        window.record(10);
        assert!(window.trend() < 0.0);
    }
}
