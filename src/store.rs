//! Per-key in-memory store: key -> latest versioned value. No deletes.

use crate::clock::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A value plus the HLC it was written with, and local bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedValue {
    pub payload: Vec<u8>,
    /// Equal to `hlc.physical`; carried separately since the wire contract
    /// exposes it as its own field.
    pub version: i64,
    pub hlc: Timestamp,
    pub originating_node_id: String,
    pub received_at_ns: i64,
    pub is_local: bool,
}

fn wall_clock_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// Thread-safe key -> versioned value map. Mutations exclusively through
/// `put`; readers never observe a torn value.
pub struct Store {
    inner: RwLock<HashMap<String, VersionedValue>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Unconditionally replace the entry for `key` and return the stored
    /// value. LWW is enforced by the reconciler, not here: in-order RPC
    /// delivery combined with HLC stamping on the write path is adequate
    /// for the hot path by design.
    pub fn put(
        &self,
        key: impl Into<String>,
        payload: Vec<u8>,
        originating_node_id: impl Into<String>,
        hlc: Timestamp,
        is_local: bool,
    ) -> VersionedValue {
        let value = VersionedValue {
            payload,
            version: hlc.physical,
            hlc,
            originating_node_id: originating_node_id.into(),
            received_at_ns: wall_clock_ns(),
            is_local,
        };
        self.inner.write().insert(key.into(), value.clone());
        value
    }

    pub fn get(&self, key: &str) -> Option<VersionedValue> {
        self.inner.read().get(key).cloned()
    }

    /// Returns `(value, found, is_stale)`. `is_stale` is only meaningful
    /// when `found` is true.
    pub fn get_with_staleness(&self, key: &str, now_ns: i64, max_age_ns: i64) -> (Option<VersionedValue>, bool, bool) {
        match self.get(key) {
            Some(v) => {
                let stale = crate::staleness::is_stale(&v.hlc, now_ns, max_age_ns);
                (Some(v), true, stale)
            }
            None => (None, false, false),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.read().len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;

    fn ts(physical: i64, logical: i64) -> Timestamp {
        Timestamp { physical, logical, node_id: "n1".into() }
    }

    #[test]
    fn put_then_get_returns_written_value() {
        let store = Store::new();
        store.put("k", b"v1".to_vec(), "n1", ts(100, 0), true);
        let v = store.get("k").unwrap();
        assert_eq!(v.payload, b"v1");
    }

    #[test]
    fn get_missing_key_is_none() {
        let store = Store::new();
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn put_replaces_unconditionally() {
        let store = Store::new();
        store.put("k", b"old".to_vec(), "n1", ts(100, 0), true);
        store.put("k", b"new".to_vec(), "n1", ts(50, 0), true);
        // No CAS on the hot path: the later put always wins regardless of HLC.
        assert_eq!(store.get("k").unwrap().payload, b"new");
    }

    #[test]
    fn size_reflects_distinct_keys() {
        let store = Store::new();
        store.put("a", b"1".to_vec(), "n1", ts(1, 0), true);
        store.put("b", b"2".to_vec(), "n1", ts(2, 0), true);
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn get_with_staleness_flags_old_values() {
        let store = Store::new();
        store.put("k", b"v".to_vec(), "n1", ts(1_000_000_000, 0), true);
        let (v, found, stale) = store.get_with_staleness("k", 1_000_000_000 + 5_000_000_000, 3_000_000_000);
        assert!(found);
        assert!(stale);
        assert!(v.is_some());
    }
}
