//! Hybrid Logical Clock: monotone local timestamps, merged against remote
//! stamps while preserving happens-before.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single HLC timestamp: (physical ns, logical counter, node id).
///
/// Total order by (physical, logical); `node_id` is carried for LWW
/// tiebreaks elsewhere but never participates in ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub physical: i64,
    pub logical: i64,
    pub node_id: String,
}

impl Timestamp {
    pub fn zero(node_id: impl Into<String>) -> Self {
        Self {
            physical: 0,
            logical: 0,
            node_id: node_id.into(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.physical == 0 && self.logical == 0
    }

    /// `self` happens-before `other` under HLC ordering. Ignores node id.
    pub fn happens_before(&self, other: &Timestamp) -> bool {
        self.physical < other.physical || (self.physical == other.physical && self.logical < other.logical)
    }

    /// Two timestamps are concurrent iff neither happens-before the other
    /// and they are not equal in (physical, logical).
    pub fn concurrent_with(&self, other: &Timestamp) -> bool {
        !self.happens_before(other) && !other.happens_before(self) && !self.order_eq(other)
    }

    /// True iff `physical` and `logical` both match, ignoring `node_id`.
    /// This is the HLC notion of "equal" (distinct from `PartialEq`, which
    /// also compares `node_id`) and is what the reconciler's tiebreak
    /// branch keys off.
    pub fn order_eq(&self, other: &Timestamp) -> bool {
        self.physical == other.physical && self.logical == other.logical
    }

    /// Ordering by (physical, logical) only, for sorting/max-scans.
    pub fn order_cmp(&self, other: &Timestamp) -> Ordering {
        (self.physical, self.logical).cmp(&(other.physical, other.logical))
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

struct ClockState {
    physical: i64,
    logical: i64,
}

/// Process-wide hybrid logical clock singleton. Injected by owned `Arc`
/// reference into every component that stamps or merges timestamps; never
/// reached for as ambient/thread-local state.
pub struct Clock {
    node_id: String,
    max_drift_ns: i64,
    state: Mutex<ClockState>,
}

impl Clock {
    pub fn new(node_id: impl Into<String>, max_drift_ns: i64) -> Self {
        Self {
            node_id: node_id.into(),
            max_drift_ns,
            state: Mutex::new(ClockState {
                physical: 0,
                logical: 0,
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Produce a strictly monotone local timestamp.
    pub fn now(&self) -> Timestamp {
        let mut state = self.state.lock();
        let p = now_ns();
        if p > state.physical {
            state.physical = p;
            state.logical = 0;
        } else {
            state.logical += 1;
        }
        Timestamp {
            physical: state.physical,
            logical: state.logical,
            node_id: self.node_id.clone(),
        }
    }

    /// Merge a remote timestamp, preserving happens-before. `CLOCK_DRIFT`
    /// is non-fatal: the caller must continue processing the message that
    /// carried `remote`.
    pub fn update(&self, remote: &Timestamp) -> Result<Timestamp> {
        let mut state = self.state.lock();
        let p = now_ns();

        let drift = remote.physical - p;
        if drift > self.max_drift_ns {
            return Err(Error::ClockDrift {
                drift_ns: drift,
                max_ns: self.max_drift_ns,
            });
        }

        if remote.physical > state.physical {
            state.physical = remote.physical;
            state.logical = remote.logical + 1;
        } else if remote.physical == state.physical {
            state.logical = state.logical.max(remote.logical) + 1;
        } else {
            state.logical += 1;
        }

        if p > state.physical {
            state.physical = p;
            state.logical = 0;
        }

        Ok(Timestamp {
            physical: state.physical,
            logical: state.logical,
            node_id: self.node_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotone() {
        let clock = Clock::new("n1", 500_000_000);
        let a = clock.now();
        let b = clock.now();
        assert!(a.happens_before(&b) || a == b);
    }

    #[test]
    fn update_rejects_excessive_drift() {
        let clock = Clock::new("n1", 100_000_000);
        let future = Timestamp {
            physical: now_ns() + 1_000_000_000,
            logical: 0,
            node_id: "n2".into(),
        };
        let err = clock.update(&future).unwrap_err();
        assert_eq!(err.error_type(), "clock_drift");
    }

    #[test]
    fn update_advances_past_local_on_newer_remote() {
        let clock = Clock::new("n1", 10_000_000_000);
        let local = clock.now();
        let remote = Timestamp {
            physical: local.physical + 1000,
            logical: 5,
            node_id: "n2".into(),
        };
        let merged = clock.update(&remote).unwrap();
        assert_eq!(merged.physical, remote.physical);
        assert_eq!(merged.logical, 6);
    }

    #[test]
    fn equal_physical_takes_max_logical_plus_one() {
        let clock = Clock::new("n1", 10_000_000_000);
        // Drive physical forward deterministically via a remote update.
        let seed = Timestamp {
            physical: now_ns() + 10_000,
            logical: 3,
            node_id: "n2".into(),
        };
        let merged = clock.update(&seed).unwrap();
        let same_physical = Timestamp {
            physical: merged.physical,
            logical: 9,
            node_id: "n3".into(),
        };
        let merged2 = clock.update(&same_physical).unwrap();
        assert_eq!(merged2.physical, merged.physical);
        assert_eq!(merged2.logical, 10);
    }

    #[test]
    fn happens_before_ignores_node_id() {
        let a = Timestamp { physical: 100, logical: 0, node_id: "z".into() };
        let b = Timestamp { physical: 100, logical: 1, node_id: "a".into() };
        assert!(a.happens_before(&b));
        assert!(!b.happens_before(&a));
    }

    #[test]
    fn zero_timestamp() {
        let z = Timestamp::zero("n1");
        assert!(z.is_zero());
    }
}
