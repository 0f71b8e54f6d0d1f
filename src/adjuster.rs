//! Adjuster control loop: samples health every `adaptiveIntervalMs`, feeds
//! the CCS computer, and relaxes/tightens the adaptive quorum based on
//! the smoothed score against fixed thresholds.

use crate::ccs::CcsComputer;
use crate::config::Config;
use crate::metrics_reader::MetricsReader;
use crate::quorum::{AdaptiveQuorum, QuorumSetOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the adjuster decided to do on a given tick, independent of
/// whether the proposal actually committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustDecision {
    Relax,
    Tighten,
    Hold,
}

pub struct Adjuster {
    ccs: Arc<CcsComputer>,
    metrics_reader: Arc<MetricsReader>,
    quorum: Arc<AdaptiveQuorum>,
    configured_peer_count: usize,
    interval: Duration,
    relax_threshold: f64,
    tighten_threshold: f64,
    running: Arc<AtomicBool>,
}

impl Adjuster {
    pub fn new(config: &Config, ccs: Arc<CcsComputer>, metrics_reader: Arc<MetricsReader>, quorum: Arc<AdaptiveQuorum>, configured_peer_count: usize) -> Self {
        Self {
            ccs,
            metrics_reader,
            quorum,
            configured_peer_count,
            interval: Duration::from_millis(config.adaptive_interval_ms),
            relax_threshold: config.relax_threshold,
            tighten_threshold: config.tighten_threshold,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the periodic control loop. Only meant to be called when
    /// `adaptiveEnabled=true`; the caller is responsible for that gate.
    pub fn spawn(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                self.tick();
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// One control-loop iteration: sample, score, decide, validate, commit.
    fn tick(&self) {
        let success_rate = self.metrics_reader.success_rate();
        let (avg_rtt, p95_rtt, peer_availability) = self.metrics_reader.peer_avg_p95(self.configured_peer_count);
        let combined_availability = success_rate * peer_availability;
        let error_rate = 1.0 - combined_availability;
        let variance = (p95_rtt - avg_rtt).powi(2);
        let clock_drift = self.metrics_reader.mean_clock_drift();

        self.ccs.record_metrics(avg_rtt, success_rate, variance, error_rate, clock_drift);
        let components = self.ccs.compute_ccs();
        let raw = components.score();
        let smoothed = self.ccs.smoothed_ccs();

        crate::metrics::update_ccs_gauges(raw, smoothed, &components);
        crate::metrics::record_peer_clock_drift("mean", clock_drift);

        if self.quorum.is_locked_out() {
            crate::metrics::update_hysteresis_gauge(true);
            debug!(smoothed_ccs = smoothed, "adjuster tick skipped: hysteresis locked");
            return;
        }
        crate::metrics::update_hysteresis_gauge(false);

        let current_r = self.quorum.r();
        let current_w = self.quorum.w();

        let (decision, proposed_r, proposed_w) = if smoothed < self.relax_threshold {
            (AdjustDecision::Relax, current_r + 1, current_w.saturating_sub(1))
        } else if smoothed > self.tighten_threshold {
            (AdjustDecision::Tighten, current_r.saturating_sub(1), current_w + 1)
        } else {
            (AdjustDecision::Hold, current_r, current_w)
        };

        if decision == AdjustDecision::Hold {
            debug!(smoothed_ccs = smoothed, "adjuster tick holding");
            return;
        }

        if self.quorum.validate(proposed_r, proposed_w) != QuorumSetOutcome::Committed {
            debug!(?decision, proposed_r, proposed_w, "adjuster proposal would not validate, holding");
            return;
        }

        let reason = match decision {
            AdjustDecision::Relax => "relax",
            AdjustDecision::Tighten => "tighten",
            AdjustDecision::Hold => unreachable!(),
        };

        match self.quorum.set_quorum(proposed_r, proposed_w) {
            QuorumSetOutcome::Committed => {
                crate::metrics::record_quorum_adjustment(reason);
                info!(reason, r = proposed_r, w = proposed_w, smoothed_ccs = smoothed, "quorum adjusted");
            }
            QuorumSetOutcome::HysteresisLocked => {
                debug!(reason, "proposal raced the lockout window, holding");
            }
            other => {
                warn!(?other, reason, proposed_r, proposed_w, "quorum commit unexpectedly rejected after validation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            adaptive_interval_ms: 2000,
            relax_threshold: 0.45,
            tighten_threshold: 0.75,
            ..Config::default()
        }
    }

    #[test]
    fn degraded_health_proposes_relax() {
        let cfg = test_config();
        let ccs = Arc::new(CcsComputer::new(10));
        let metrics_reader = Arc::new(MetricsReader::new());
        let quorum = Arc::new(AdaptiveQuorum::new(5, 2, 4, 1, 5, 1, 5, 0));
        for _ in 0..3 {
            metrics_reader.record_write(false);
        }
        let adjuster = Adjuster::new(&cfg, ccs, metrics_reader, Arc::clone(&quorum), 4);
        adjuster.tick();
        assert_eq!(quorum.r(), 3);
        assert_eq!(quorum.w(), 3);
    }

    #[test]
    fn healthy_cluster_holds() {
        let cfg = test_config();
        let ccs = Arc::new(CcsComputer::new(10));
        let metrics_reader = Arc::new(MetricsReader::new());
        let quorum = Arc::new(AdaptiveQuorum::new(5, 2, 4, 1, 5, 1, 5, 0));
        for _ in 0..10 {
            metrics_reader.record_write(true);
        }
        let adjuster = Adjuster::new(&cfg, ccs, metrics_reader, Arc::clone(&quorum), 0);
        adjuster.tick();
        assert_eq!(quorum.r(), 2);
        assert_eq!(quorum.w(), 4);
    }

    #[test]
    fn lockout_prevents_commit() {
        let cfg = test_config();
        let ccs = Arc::new(CcsComputer::new(10));
        let metrics_reader = Arc::new(MetricsReader::new());
        let quorum = Arc::new(AdaptiveQuorum::new(5, 2, 4, 1, 5, 1, 5, 60_000_000_000));
        quorum.set_quorum(3, 3);
        for _ in 0..3 {
            metrics_reader.record_write(false);
        }
        let adjuster = Adjuster::new(&cfg, ccs, metrics_reader, Arc::clone(&quorum), 4);
        adjuster.tick();
        assert_eq!(quorum.r(), 3);
        assert_eq!(quorum.w(), 3);
    }
}
