//! Consistency Confidence Score: five weighted health components read from
//! sliding windows of real samples, smoothed over a sixth window.

use parking_lot::Mutex;
use std::collections::VecDeque;

const RTT_CAP_SEC: f64 = 0.200;
const VARIANCE_CAP_SEC2: f64 = 0.050 * 0.050;
const CLOCK_DRIFT_CAP_SEC: f64 = 0.100;

const W_RTT: f64 = 0.20;
const W_AVAIL: f64 = 0.40;
const W_VAR: f64 = 0.15;
const W_ERROR: f64 = 0.15;
const W_CLOCK: f64 = 0.10;

/// Fixed-capacity ring buffer holding real samples only; an under-filled
/// window reports `None` ("no signal") rather than padding with zeroes.
struct Window {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, sample: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcsComponents {
    pub rtt_health: f64,
    pub avail_health: f64,
    pub var_health: f64,
    pub error_health: f64,
    pub clock_health: f64,
}

impl CcsComponents {
    pub fn score(&self) -> f64 {
        W_RTT * self.rtt_health
            + W_AVAIL * self.avail_health
            + W_VAR * self.var_health
            + W_ERROR * self.error_health
            + W_CLOCK * self.clock_health
    }
}

struct Windows {
    rtt: Window,
    success_rate: Window,
    rtt_variance: Window,
    error_rate: Window,
    clock_drift: Window,
    ccs_history: Window,
}

/// Holds the five health-signal windows plus the smoothing window for
/// computed CCS outputs.
pub struct CcsComputer {
    windows: Mutex<Windows>,
}

impl CcsComputer {
    pub fn new(window_size: usize) -> Self {
        Self {
            windows: Mutex::new(Windows {
                rtt: Window::new(window_size),
                success_rate: Window::new(window_size),
                rtt_variance: Window::new(window_size),
                error_rate: Window::new(window_size),
                clock_drift: Window::new(window_size),
                ccs_history: Window::new(window_size),
            }),
        }
    }

    pub fn record_metrics(
        &self,
        avg_rtt_sec: f64,
        success_rate: f64,
        rtt_variance_sec2: f64,
        error_rate: f64,
        clock_drift_sec: f64,
    ) {
        let mut w = self.windows.lock();
        w.rtt.push(avg_rtt_sec);
        w.success_rate.push(success_rate);
        w.rtt_variance.push(rtt_variance_sec2);
        w.error_rate.push(error_rate);
        w.clock_drift.push(clock_drift_sec);
    }

    /// Compute the current CCS components and raw score from per-window
    /// means; windows with no samples yet contribute a neutral component
    /// value (1.0, "fully healthy") rather than skewing the composite.
    pub fn compute_ccs(&self) -> CcsComponents {
        let w = self.windows.lock();
        let rtt_health = w.rtt.mean().map(|rtt| 1.0 - (rtt / RTT_CAP_SEC).min(1.0)).unwrap_or(1.0);
        let avail_health = w.success_rate.mean().unwrap_or(1.0);
        let var_health = w
            .rtt_variance
            .mean()
            .map(|v| 1.0 - (v / VARIANCE_CAP_SEC2).min(1.0))
            .unwrap_or(1.0);
        let error_health = w.error_rate.mean().map(|e| 1.0 - e).unwrap_or(1.0);
        let clock_health = w
            .clock_drift
            .mean()
            .map(|d| 1.0 - (d / CLOCK_DRIFT_CAP_SEC).min(1.0))
            .unwrap_or(1.0);

        CcsComponents { rtt_health, avail_health, var_health, error_health, clock_health }
    }

    /// Append `compute_ccs().score()` to the smoothing window and return
    /// its mean. Call once per adjuster tick.
    pub fn smoothed_ccs(&self) -> f64 {
        let raw = self.compute_ccs().score();
        let mut w = self.windows.lock();
        w.ccs_history.push(raw);
        w.ccs_history.mean().unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_windows_are_fully_healthy() {
        let c = CcsComputer::new(10);
        let comp = c.compute_ccs();
        assert_eq!(comp.rtt_health, 1.0);
        assert_eq!(comp.avail_health, 1.0);
        assert_eq!(comp.score(), 1.0);
    }

    #[test]
    fn degraded_availability_lowers_score() {
        let c = CcsComputer::new(10);
        for _ in 0..10 {
            c.record_metrics(0.01, 0.5, 0.0001, 0.5, 0.0);
        }
        let comp = c.compute_ccs();
        assert!(comp.score() < 0.7);
    }

    #[test]
    fn rtt_beyond_cap_saturates_at_zero_health() {
        let c = CcsComputer::new(10);
        for _ in 0..10 {
            c.record_metrics(1.0, 1.0, 0.0, 0.0, 0.0);
        }
        let comp = c.compute_ccs();
        assert_eq!(comp.rtt_health, 0.0);
    }

    #[test]
    fn smoothing_window_averages_across_ticks() {
        let c = CcsComputer::new(2);
        for _ in 0..10 {
            c.record_metrics(0.0, 1.0, 0.0, 0.0, 0.0);
        }
        let first = c.smoothed_ccs();
        assert_eq!(first, 1.0);

        for _ in 0..10 {
            c.record_metrics(1.0, 0.0, 1.0, 1.0, 1.0);
        }
        let second = c.smoothed_ccs();
        // averages the previous 1.0 score with the new ~0 score
        assert!(second < 1.0 && second > 0.0);
    }

    #[test]
    fn weights_sum_to_one() {
        let comp = CcsComponents { rtt_health: 1.0, avail_health: 1.0, var_health: 1.0, error_health: 1.0, clock_health: 1.0 };
        assert!((comp.score() - 1.0).abs() < 1e-9);
    }
}
