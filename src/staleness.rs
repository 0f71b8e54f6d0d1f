//! Bounded-staleness read guard.

use crate::clock::Timestamp;
use crate::error::{Error, Result};
use crate::store::VersionedValue;

/// `isStale(hlc, nowNs) := (nowNs - hlc.physical) > maxAgeNs`, clamped at
/// zero for timestamps in the future (never considered stale).
pub fn is_stale(hlc: &Timestamp, now_ns: i64, max_age_ns: i64) -> bool {
    let age = (now_ns - hlc.physical).max(0);
    age > max_age_ns
}

/// Fail with `STALENESS_EXCEEDED` if `value` is stale; used only on the
/// client-visible read path.
pub fn check_strict(value: &VersionedValue, now_ns: i64, max_age_ns: i64) -> Result<()> {
    if is_stale(&value.hlc, now_ns, max_age_ns) {
        metrics::counter!("aqkv_staleness_rejected_total").increment(1);
        Err(Error::StalenessExceeded)
    } else {
        Ok(())
    }
}

/// Partition `values` into `(fresh, stale)`; used by read-repair and
/// reconciliation paths, which tolerate stale entries rather than reject.
pub fn check_multiple(
    values: Vec<VersionedValue>,
    now_ns: i64,
    max_age_ns: i64,
) -> (Vec<VersionedValue>, Vec<VersionedValue>) {
    let mut fresh = Vec::new();
    let mut stale = Vec::new();
    for v in values {
        if is_stale(&v.hlc, now_ns, max_age_ns) {
            stale.push(v);
        } else {
            fresh.push(v);
        }
    }
    (fresh, stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;

    fn value_at(physical: i64) -> VersionedValue {
        VersionedValue {
            payload: b"v".to_vec(),
            version: physical,
            hlc: Timestamp { physical, logical: 0, node_id: "n1".into() },
            originating_node_id: "n1".into(),
            received_at_ns: physical,
            is_local: true,
        }
    }

    #[test]
    fn future_timestamp_is_never_stale() {
        let hlc = Timestamp { physical: 1_000_000, logical: 0, node_id: "n1".into() };
        assert!(!is_stale(&hlc, 0, 100));
    }

    #[test]
    fn exceeding_bound_is_stale() {
        let hlc = Timestamp { physical: 0, logical: 0, node_id: "n1".into() };
        assert!(is_stale(&hlc, 4_000_000_000, 3_000_000_000));
        assert!(!is_stale(&hlc, 2_000_000_000, 3_000_000_000));
    }

    #[test]
    fn check_strict_rejects_stale() {
        let v = value_at(0);
        let err = check_strict(&v, 10_000_000_000, 3_000_000_000).unwrap_err();
        assert_eq!(err.error_type(), "staleness_exceeded");
    }

    #[test]
    fn check_strict_accepts_fresh() {
        let v = value_at(9_000_000_000);
        assert!(check_strict(&v, 10_000_000_000, 3_000_000_000).is_ok());
    }

    #[test]
    fn check_multiple_partitions() {
        let values = vec![value_at(0), value_at(9_000_000_000)];
        let (fresh, stale) = check_multiple(values, 10_000_000_000, 3_000_000_000);
        assert_eq!(fresh.len(), 1);
        assert_eq!(stale.len(), 1);
    }
}
