//! Adaptive quorum controller: thread-safe current (R,W), bounds and
//! intersection invariants, hysteresis lockout against oscillation.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// Outcome of a quorum-set attempt, modelled as a sum type per the
/// adjuster's control-loop design rather than as a single bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumSetOutcome {
    Committed,
    HysteresisLocked,
    IntersectionViolation,
    BoundsViolation,
}

struct Bounds {
    n: usize,
    min_r: usize,
    max_r: usize,
    min_w: usize,
    max_w: usize,
}

struct State {
    current_r: usize,
    current_w: usize,
    last_adjust_ns: i64,
}

/// Holds (currentR, currentW, N, bounds, lastAdjustNs) under a mutex.
pub struct AdaptiveQuorum {
    bounds: Bounds,
    lockout_ns: i64,
    state: Mutex<State>,
}

impl AdaptiveQuorum {
    pub fn new(
        n: usize,
        initial_r: usize,
        initial_w: usize,
        min_r: usize,
        max_r: usize,
        min_w: usize,
        max_w: usize,
        lockout_ns: i64,
    ) -> Self {
        Self {
            bounds: Bounds { n, min_r, max_r, min_w, max_w },
            lockout_ns,
            state: Mutex::new(State {
                current_r: initial_r,
                current_w: initial_w,
                last_adjust_ns: 0,
            }),
        }
    }

    pub fn r(&self) -> usize {
        self.state.lock().current_r
    }

    pub fn w(&self) -> usize {
        self.state.lock().current_w
    }

    pub fn n(&self) -> usize {
        self.bounds.n
    }

    /// Same predicate as `set_quorum` without the lockout check; used by
    /// the adjuster to short-circuit proposals that could never commit.
    pub fn validate(&self, new_r: usize, new_w: usize) -> QuorumSetOutcome {
        if new_r + new_w <= self.bounds.n {
            return QuorumSetOutcome::IntersectionViolation;
        }
        if new_r < self.bounds.min_r
            || new_r > self.bounds.max_r
            || new_w < self.bounds.min_w
            || new_w > self.bounds.max_w
        {
            return QuorumSetOutcome::BoundsViolation;
        }
        QuorumSetOutcome::Committed
    }

    /// Attempt to commit `(new_r, new_w)`. `reason` is used only for the
    /// caller's metrics label, not consulted here.
    pub fn set_quorum(&self, new_r: usize, new_w: usize) -> QuorumSetOutcome {
        let mut state = self.state.lock();
        let now = now_ns();

        if now - state.last_adjust_ns < self.lockout_ns {
            return QuorumSetOutcome::HysteresisLocked;
        }
        if new_r + new_w <= self.bounds.n {
            return QuorumSetOutcome::IntersectionViolation;
        }
        if new_r < self.bounds.min_r
            || new_r > self.bounds.max_r
            || new_w < self.bounds.min_w
            || new_w > self.bounds.max_w
        {
            return QuorumSetOutcome::BoundsViolation;
        }

        state.current_r = new_r;
        state.current_w = new_w;
        state.last_adjust_ns = now;

        metrics::gauge!("aqkv_current_r").set(new_r as f64);
        metrics::gauge!("aqkv_current_w").set(new_w as f64);

        QuorumSetOutcome::Committed
    }

    pub fn is_locked_out(&self) -> bool {
        let state = self.state.lock();
        now_ns() - state.last_adjust_ns < self.lockout_ns
    }
}

/// Static vs. adaptive quorum sourcing, so request handlers hold a
/// capability (`Arc<dyn QuorumProvider>`) rather than a concrete type.
pub trait QuorumProvider: Send + Sync {
    fn r(&self) -> usize;
    fn w(&self) -> usize;
    fn n(&self) -> usize;
}

pub struct StaticQuorumProvider {
    r: usize,
    w: usize,
    n: usize,
}

impl StaticQuorumProvider {
    pub fn new(r: usize, w: usize, n: usize) -> Self {
        Self { r, w, n }
    }
}

impl QuorumProvider for StaticQuorumProvider {
    fn r(&self) -> usize {
        self.r
    }
    fn w(&self) -> usize {
        self.w
    }
    fn n(&self) -> usize {
        self.n
    }
}

impl QuorumProvider for AdaptiveQuorum {
    fn r(&self) -> usize {
        AdaptiveQuorum::r(self)
    }
    fn w(&self) -> usize {
        AdaptiveQuorum::w(self)
    }
    fn n(&self) -> usize {
        AdaptiveQuorum::n(self)
    }
}

/// Convert a validated/committed outcome into an `Error`, for call sites
/// that need to surface a failure rather than branch on the enum.
pub fn outcome_to_result(outcome: QuorumSetOutcome, r: usize, w: usize, n: usize, lockout_ns: i64) -> Result<()> {
    match outcome {
        QuorumSetOutcome::Committed => Ok(()),
        QuorumSetOutcome::HysteresisLocked => Err(Error::HysteresisLocked { remaining_ns: lockout_ns }),
        QuorumSetOutcome::IntersectionViolation => Err(Error::IntersectionViolation { r, w, n }),
        QuorumSetOutcome::BoundsViolation => Err(Error::BoundsViolation { r, w }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_returns_configured_values() {
        let p = StaticQuorumProvider::new(2, 2, 3);
        assert_eq!(p.r(), 2);
        assert_eq!(p.w(), 2);
        assert_eq!(p.n(), 3);
    }

    #[test]
    fn set_quorum_enforces_intersection() {
        let q = AdaptiveQuorum::new(5, 2, 4, 1, 5, 1, 5, 0);
        assert_eq!(q.set_quorum(2, 2), QuorumSetOutcome::IntersectionViolation);
    }

    #[test]
    fn set_quorum_enforces_bounds() {
        let q = AdaptiveQuorum::new(5, 2, 4, 1, 3, 1, 5, 0);
        assert_eq!(q.set_quorum(4, 4), QuorumSetOutcome::BoundsViolation);
    }

    #[test]
    fn set_quorum_commits_valid_proposal() {
        let q = AdaptiveQuorum::new(5, 2, 4, 1, 5, 1, 5, 0);
        assert_eq!(q.set_quorum(3, 3), QuorumSetOutcome::Committed);
        assert_eq!(q.r(), 3);
        assert_eq!(q.w(), 3);
    }

    #[test]
    fn lockout_blocks_rapid_successive_commits() {
        let q = AdaptiveQuorum::new(5, 2, 4, 1, 5, 1, 5, 60_000_000_000);
        assert_eq!(q.set_quorum(3, 3), QuorumSetOutcome::Committed);
        assert_eq!(q.set_quorum(2, 4), QuorumSetOutcome::HysteresisLocked);
    }

    #[test]
    fn validate_ignores_lockout() {
        let q = AdaptiveQuorum::new(5, 2, 4, 1, 5, 1, 5, 60_000_000_000);
        q.set_quorum(3, 3);
        // validate() never consults lastAdjustNs.
        assert_eq!(q.validate(3, 3), QuorumSetOutcome::Committed);
    }
}
