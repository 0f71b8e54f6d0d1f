//! Anti-entropy reconciler: on a peer healing event, scan the write log
//! and resolve any conflicts against the local store by LWW, with a
//! deterministic nodeId tiebreak on exact HLC ties.

use crate::health::HealingEvent;
use crate::store::Store;
use crate::writelog::WriteLog;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::{debug, info};

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// Runs only when constructed with `reconciliationEnabled=true`; the
/// healing-event channel exists and is fed regardless, but nothing here
/// subscribes to it unless a reconciler is built.
pub struct Reconciler {
    store: Arc<Store>,
    write_log: Arc<WriteLog>,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
}

impl Reconciler {
    pub fn new(store: Arc<Store>, write_log: Arc<WriteLog>) -> Self {
        Self {
            store,
            write_log,
            conflicts_detected: AtomicU64::new(0),
            conflicts_resolved: AtomicU64::new(0),
        }
    }

    pub fn conflicts_detected(&self) -> u64 {
        self.conflicts_detected.load(Ordering::Relaxed)
    }

    pub fn conflicts_resolved(&self) -> u64 {
        self.conflicts_resolved.load(Ordering::Relaxed)
    }

    /// Subscribe to a health probe's healing channel and run reconciliation
    /// on every event until the channel closes.
    pub fn spawn_listener(self: Arc<Self>, mut healing_rx: broadcast::Receiver<HealingEvent>) {
        tokio::spawn(async move {
            loop {
                match healing_rx.recv().await {
                    Ok(event) => {
                        info!(peer = %event.peer_id, address = %event.address, "healing event received, reconciling");
                        self.reconcile().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "reconciler lagged behind healing events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Scan the write log and apply LWW against the local store. Entries
    /// for keys absent locally are skipped: this node never held the key,
    /// so the log alone gives no basis to create it.
    pub async fn reconcile(&self) {
        let start = std::time::Instant::now();
        let now = now_ns();
        let entries = self.write_log.snapshot(now);
        let mut keys_changed = 0usize;

        for entry in entries {
            let Some(local) = self.store.get(&entry.key) else {
                continue;
            };

            if entry.hlc.happens_before(&local.hlc) {
                continue;
            }

            let entry_wins = if local.hlc.order_eq(&entry.hlc) {
                if local.hlc.node_id == entry.hlc.node_id {
                    false
                } else {
                    self.conflicts_detected.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_conflict_detected();
                    entry.hlc.node_id > local.hlc.node_id
                }
            } else {
                true
            };

            if entry_wins {
                self.store.put(entry.key.clone(), entry.payload.clone(), entry.originating_node_id.clone(), entry.hlc.clone(), false);
                self.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_conflict_resolved();
                keys_changed += 1;
            }
        }

        crate::metrics::record_reconciliation_run();
        crate::metrics::record_reconciliation_latency(start.elapsed().as_secs_f64());
        debug!(keys_changed, "reconciliation run complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;

    fn ts(physical: i64, logical: i64, node_id: &str) -> Timestamp {
        Timestamp { physical, logical, node_id: node_id.into() }
    }

    fn log_entry(key: &str, payload: &[u8], hlc: Timestamp) -> crate::writelog::WriteLogEntry {
        crate::writelog::WriteLogEntry {
            key: key.into(),
            payload: payload.to_vec(),
            originating_node_id: hlc.node_id.clone(),
            hlc,
            local_receipt_ns: now_ns(),
        }
    }

    #[tokio::test]
    async fn skips_keys_absent_locally() {
        let store = Arc::new(Store::new());
        let log = Arc::new(WriteLog::new(10, i64::MAX));
        log.add(log_entry("missing", b"v", ts(100, 0, "n2")));
        let r = Reconciler::new(store.clone(), log);
        r.reconcile().await;
        assert!(store.get("missing").is_none());
        assert_eq!(r.conflicts_resolved(), 0);
    }

    #[tokio::test]
    async fn applies_newer_remote_write() {
        let store = Arc::new(Store::new());
        store.put("k", b"old".to_vec(), "n1", ts(100, 0, "n1"), true);
        let log = Arc::new(WriteLog::new(10, i64::MAX));
        log.add(log_entry("k", b"new", ts(200, 0, "n2")));
        let r = Reconciler::new(store.clone(), log);
        r.reconcile().await;
        assert_eq!(store.get("k").unwrap().payload, b"new");
        assert_eq!(r.conflicts_resolved(), 1);
    }

    #[tokio::test]
    async fn ignores_older_remote_write() {
        let store = Arc::new(Store::new());
        store.put("k", b"current".to_vec(), "n1", ts(200, 0, "n1"), true);
        let log = Arc::new(WriteLog::new(10, i64::MAX));
        log.add(log_entry("k", b"stale", ts(100, 0, "n2")));
        let r = Reconciler::new(store.clone(), log);
        r.reconcile().await;
        assert_eq!(store.get("k").unwrap().payload, b"current");
        assert_eq!(r.conflicts_resolved(), 0);
    }

    #[tokio::test]
    async fn concurrent_tie_breaks_on_larger_node_id() {
        let store = Arc::new(Store::new());
        store.put("k", b"a".to_vec(), "a", ts(100, 0, "a"), true);
        let log = Arc::new(WriteLog::new(10, i64::MAX));
        log.add(log_entry("k", b"b", ts(100, 0, "b")));
        let r = Reconciler::new(store.clone(), log);
        r.reconcile().await;
        assert_eq!(store.get("k").unwrap().payload, b"b");
        assert_eq!(r.conflicts_detected(), 1);
        assert_eq!(r.conflicts_resolved(), 1);
    }

    #[tokio::test]
    async fn exact_same_origin_tie_is_a_noop() {
        let store = Arc::new(Store::new());
        store.put("k", b"a".to_vec(), "a", ts(100, 0, "a"), true);
        let log = Arc::new(WriteLog::new(10, i64::MAX));
        log.add(log_entry("k", b"a-again", ts(100, 0, "a")));
        let r = Reconciler::new(store.clone(), log);
        r.reconcile().await;
        assert_eq!(store.get("k").unwrap().payload, b"a");
        assert_eq!(r.conflicts_detected(), 0);
    }
}
