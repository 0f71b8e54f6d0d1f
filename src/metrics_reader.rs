//! Metrics reader: the internal counters and per-peer sample buffers the
//! adjuster samples each tick. Distinct from `metrics.rs`, which records
//! to the external `metrics` facade for scraping — that facade has no
//! read-back API, so the control loop needs its own small registry of
//! the same underlying events. Same ring-buffer discipline as the CCS
//! windows: real samples only, bounded capacity.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

const PEER_SAMPLE_CAPACITY: usize = 32;

/// Write outcomes and per-peer replication latency/drift samples, read by
/// the adjuster to derive success rate, peer availability, avg/p95
/// latency, and mean clock drift.
pub struct MetricsReader {
    write_success: AtomicU64,
    write_failure: AtomicU64,
    peer_latencies: RwLock<HashMap<SocketAddr, VecDeque<f64>>>,
    peer_drift: RwLock<HashMap<SocketAddr, f64>>,
}

impl MetricsReader {
    pub fn new() -> Self {
        Self {
            write_success: AtomicU64::new(0),
            write_failure: AtomicU64::new(0),
            peer_latencies: RwLock::new(HashMap::new()),
            peer_drift: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_write(&self, success: bool) {
        if success {
            self.write_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_peer_latency(&self, peer: SocketAddr, secs: f64) {
        let mut peers = self.peer_latencies.write();
        let samples = peers.entry(peer).or_insert_with(|| VecDeque::with_capacity(PEER_SAMPLE_CAPACITY));
        if samples.len() >= PEER_SAMPLE_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(secs);
    }

    /// Only non-negative drift is meaningful (a peer reporting a physical
    /// clock behind ours is not "drift" for this purpose).
    pub fn record_peer_drift(&self, peer: SocketAddr, drift_secs: f64) {
        if drift_secs < 0.0 {
            return;
        }
        self.peer_drift.write().insert(peer, drift_secs);
    }

    /// Rate of successful writes vs. all attempted; 1.0 ("no signal yet")
    /// before any write has been attempted.
    pub fn success_rate(&self) -> f64 {
        let success = self.write_success.load(Ordering::Relaxed) as f64;
        let failure = self.write_failure.load(Ordering::Relaxed) as f64;
        let total = success + failure;
        if total == 0.0 {
            1.0
        } else {
            success / total
        }
    }

    /// `(avg RTT seconds, p95 RTT seconds, peer availability)` across every
    /// peer with at least one latency sample, where peer availability is
    /// peers-with-samples / `configured_peer_count`.
    pub fn peer_avg_p95(&self, configured_peer_count: usize) -> (f64, f64, f64) {
        let peers = self.peer_latencies.read();
        let mut all_samples: Vec<f64> = peers.values().flat_map(|v| v.iter().copied()).collect();
        if all_samples.is_empty() {
            return (0.0, 0.0, 1.0);
        }
        all_samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let avg = all_samples.iter().sum::<f64>() / all_samples.len() as f64;
        let p95_idx = ((all_samples.len() as f64) * 0.95).ceil() as usize;
        let p95 = all_samples[p95_idx.saturating_sub(1).min(all_samples.len() - 1)];
        let peers_with_samples = peers.len();
        let availability = if configured_peer_count == 0 {
            1.0
        } else {
            (peers_with_samples as f64 / configured_peer_count as f64).min(1.0)
        };
        (avg, p95, availability)
    }

    /// Mean of the last recorded non-negative drift across every peer that
    /// has reported one; 0.0 ("no signal") if none has yet.
    pub fn mean_clock_drift(&self) -> f64 {
        let drift = self.peer_drift.read();
        if drift.is_empty() {
            0.0
        } else {
            drift.values().sum::<f64>() / drift.len() as f64
        }
    }
}

impl Default for MetricsReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn success_rate_defaults_to_healthy() {
        let m = MetricsReader::new();
        assert_eq!(m.success_rate(), 1.0);
    }

    #[test]
    fn success_rate_reflects_writes() {
        let m = MetricsReader::new();
        m.record_write(true);
        m.record_write(true);
        m.record_write(false);
        assert!((m.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn peer_latency_ring_evicts_oldest() {
        let m = MetricsReader::new();
        let a = addr(9001);
        for i in 0..(PEER_SAMPLE_CAPACITY + 5) {
            m.record_peer_latency(a, i as f64);
        }
        let (avg, _, _) = m.peer_avg_p95(1);
        assert!(avg > 4.0);
    }

    #[test]
    fn peer_availability_counts_peers_with_samples() {
        let m = MetricsReader::new();
        m.record_peer_latency(addr(9001), 0.01);
        let (_, _, avail) = m.peer_avg_p95(4);
        assert_eq!(avail, 0.25);
    }

    #[test]
    fn negative_drift_is_ignored() {
        let m = MetricsReader::new();
        m.record_peer_drift(addr(9001), -1.0);
        assert_eq!(m.mean_clock_drift(), 0.0);
    }

    #[test]
    fn mean_drift_averages_peers() {
        let m = MetricsReader::new();
        m.record_peer_drift(addr(9001), 0.1);
        m.record_peer_drift(addr(9002), 0.3);
        assert!((m.mean_clock_drift() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn no_samples_reports_no_signal_defaults() {
        let m = MetricsReader::new();
        let (avg, p95, avail) = m.peer_avg_p95(3);
        assert_eq!(avg, 0.0);
        assert_eq!(p95, 0.0);
        assert_eq!(avail, 1.0);
    }
}
