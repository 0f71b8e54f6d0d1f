//! Request handler: the Put/Get/GetLocal/Replicate/HealthCheck glue that
//! ties the clock, store, write log, coordinator and quorum provider
//! together into the public node operations.

use crate::clock::Clock;
use crate::coordinator::{build_replicate_request, Coordinator};
use crate::metrics_reader::MetricsReader;
use crate::quorum::QuorumProvider;
use crate::store::Store;
use crate::types::{GetResponse, HealthCheckRequest, HealthCheckResponse, PutResponse, ReplicateRequest, ReplicateResponse};
use crate::writelog::{WriteLog, WriteLogEntry};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// Implements the five node operations named in the service contract.
/// Owns no network state itself; delegates fan-out to the coordinator.
pub struct RequestHandler {
    self_id: String,
    clock: Arc<Clock>,
    store: Arc<Store>,
    write_log: Option<Arc<WriteLog>>,
    coordinator: Arc<Coordinator>,
    quorum: Arc<dyn QuorumProvider>,
    metrics_reader: Arc<MetricsReader>,
    max_staleness_ns: AtomicI64,
}

impl RequestHandler {
    pub fn new(
        self_id: impl Into<String>,
        clock: Arc<Clock>,
        store: Arc<Store>,
        write_log: Option<Arc<WriteLog>>,
        coordinator: Arc<Coordinator>,
        quorum: Arc<dyn QuorumProvider>,
        metrics_reader: Arc<MetricsReader>,
        max_staleness_ns: i64,
    ) -> Self {
        Self {
            self_id: self_id.into(),
            clock,
            store,
            write_log,
            coordinator,
            quorum,
            metrics_reader,
            max_staleness_ns: AtomicI64::new(max_staleness_ns),
        }
    }

    fn record_write_log(&self, key: &str, value: &[u8], hlc: &crate::clock::Timestamp) {
        if let Some(log) = &self.write_log {
            log.add(WriteLogEntry {
                key: key.to_string(),
                payload: value.to_vec(),
                originating_node_id: self.self_id.clone(),
                hlc: hlc.clone(),
                local_receipt_ns: now_ns(),
            });
        }
    }

    pub async fn put(&self, key: String, value: Vec<u8>) -> PutResponse {
        let ts = self.clock.now();
        let stored = self.store.put(key.clone(), value.clone(), self.self_id.clone(), ts.clone(), true);
        self.record_write_log(&key, &value, &ts);

        let required_acks = self.quorum.w();
        let req = build_replicate_request(key, value, stored.version, self.self_id.clone(), &ts);

        let result = self.coordinator.replicate(req, required_acks).await;
        crate::metrics::record_put(result.is_ok());

        match result {
            Ok(outcome) => {
                self.metrics_reader.record_write(true);
                debug!(ack_count = outcome.ack_count, "put succeeded");
                PutResponse { success: true, version: stored.version, timestamp: ts.physical, hlc: (&ts).into(), error: None }
            }
            Err(e) => {
                self.metrics_reader.record_write(false);
                crate::metrics::record_error(e.error_type());
                warn!(error = %e, "put failed to reach required acks");
                PutResponse { success: false, version: stored.version, timestamp: ts.physical, hlc: (&ts).into(), error: Some(e.to_string()) }
            }
        }
    }

    pub async fn get(&self, key: String) -> GetResponse {
        let r = self.quorum.r();
        let now = now_ns();
        let max_age = self.max_staleness_ns.load(Ordering::Relaxed);

        if r == 1 {
            let (value, found, is_stale) = self.store.get_with_staleness(&key, now, max_age);
            crate::metrics::record_get(found);
            if is_stale {
                crate::metrics::record_staleness_violation();
            }
            return match (found, value) {
                (true, Some(v)) => {
                    let error = if is_stale { Some("staleness bound exceeded".to_string()) } else { None };
                    GetResponse::from_versioned(&v, is_stale, error)
                }
                _ => GetResponse::not_found(),
            };
        }

        let local = self.store.get(&key);
        let mut values: Vec<GetResponse> = Vec::new();
        if let Some(ref v) = local {
            values.push(GetResponse::from_versioned(v, false, None));
        }

        match self.coordinator.query_replicas(key, r).await {
            Ok(outcome) => {
                values.extend(outcome.values);
            }
            Err(e) => {
                crate::metrics::record_error(e.error_type());
                crate::metrics::record_get(false);
                return GetResponse { found: false, value: None, version: None, timestamp: None, hlc: None, is_stale: false, error: Some(e.to_string()) };
            }
        }

        match Coordinator::most_recent(&values) {
            None => {
                crate::metrics::record_get(false);
                GetResponse::not_found()
            }
            Some(winner) => {
                let stale = winner
                    .hlc
                    .as_ref()
                    .map(|h| {
                        let ts: crate::clock::Timestamp = h.clone().into();
                        crate::staleness::is_stale(&ts, now, max_age)
                    })
                    .unwrap_or(false);
                crate::metrics::record_get(true);
                let mut response = winner.clone();
                response.is_stale = stale;
                if stale {
                    crate::metrics::record_staleness_violation();
                    response.error = Some("staleness bound exceeded".to_string());
                }
                response
            }
        }
    }

    /// Never performs quorum; used only by peers querying each other.
    /// Annotates `is_stale` but never rejects.
    pub async fn get_local(&self, key: String) -> GetResponse {
        let now = now_ns();
        let max_age = self.max_staleness_ns.load(Ordering::Relaxed);
        match self.store.get(&key) {
            Some(v) => {
                let stale = crate::staleness::is_stale(&v.hlc, now, max_age);
                GetResponse::from_versioned(&v, stale, None)
            }
            None => GetResponse::not_found(),
        }
    }

    pub async fn replicate(&self, req: ReplicateRequest) -> ReplicateResponse {
        let remote_hlc: crate::clock::Timestamp = req.hlc.clone().into();
        if let Err(e) = self.clock.update(&remote_hlc) {
            crate::metrics::record_error(e.error_type());
            warn!(error = %e, source = %req.source_node_id, "clock drift on replicate, continuing");
        }

        self.store.put(req.key.clone(), req.value.clone(), req.source_node_id.clone(), remote_hlc.clone(), false);
        self.record_write_log(&req.key, &req.value, &remote_hlc);

        ReplicateResponse { success: true, node_id: self.self_id.clone(), error: None }
    }

    pub async fn health_check(&self, req: HealthCheckRequest) -> HealthCheckResponse {
        if let Some(wire_hlc) = req.hlc {
            let remote_hlc: crate::clock::Timestamp = wire_hlc.into();
            if let Err(e) = self.clock.update(&remote_hlc) {
                debug!(error = %e, source = %req.source_node_id, "clock drift on health check, continuing");
            }
        }
        let now = self.clock.now();
        HealthCheckResponse { healthy: true, node_id: self.self_id.clone(), timestamp: now.physical, hlc: (&now).into() }
    }
}
