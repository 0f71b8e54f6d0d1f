//! Bounded circular buffer of recent writes, kept for anti-entropy
//! reconciliation. Not a durable journal.

use crate::clock::Timestamp;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct WriteLogEntry {
    pub key: String,
    pub payload: Vec<u8>,
    pub originating_node_id: String,
    pub hlc: Timestamp,
    pub local_receipt_ns: i64,
}

struct Inner {
    entries: VecDeque<WriteLogEntry>,
    capacity: usize,
}

/// Bounded by both entry count (`capacity`) and age (`max_age_ns`).
/// Entries older than the age cap are filtered out on query and may be
/// physically compacted.
pub struct WriteLog {
    inner: Mutex<Inner>,
    max_age_ns: i64,
}

impl WriteLog {
    pub fn new(capacity: usize, max_age_ns: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                capacity,
            }),
            max_age_ns,
        }
    }

    pub fn add(&self, entry: WriteLogEntry) {
        let mut inner = self.inner.lock();
        if inner.entries.len() >= inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    /// Snapshot of entries not older than the age cap, relative to `now_ns`.
    pub fn snapshot(&self, now_ns: i64) -> Vec<WriteLogEntry> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|e| now_ns - e.local_receipt_ns <= self.max_age_ns)
            .cloned()
            .collect()
    }

    /// Physically drop entries older than the age cap.
    pub fn compact(&self, now_ns: i64) {
        let mut inner = self.inner.lock();
        inner
            .entries
            .retain(|e| now_ns - e.local_receipt_ns <= self.max_age_ns);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
