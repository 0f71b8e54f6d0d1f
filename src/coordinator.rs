//! Replication coordinator: pooled fan-out of Replicate/GetLocal calls to
//! the connected peer set, and the `mostRecent` conflict pick for reads.
//!
//! Keeps its own discovery-synced peer set rather than depending on the
//! health probe's up/down view — the two stay one-directional, per the
//! no-back-references rule for this component pair.

use crate::clock::Timestamp;
use crate::config::Config;
use crate::discovery::{ClusterEvent, NodeDiscovery};
use crate::error::{Error, Result};
use crate::metrics_reader::MetricsReader;
use crate::rpc_client::RpcClient;
use crate::types::{GetResponse, ReplicateRequest};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a per-peer attempt, kept alongside the aggregate result so
/// callers can inspect latency/success per peer if they want to.
#[derive(Debug, Clone)]
pub struct PeerOutcome {
    pub address: SocketAddr,
    pub success: bool,
}

/// Result of a `replicate` fan-out.
#[derive(Debug)]
pub struct ReplicateOutcome {
    pub ack_count: usize,
    pub per_peer: Vec<PeerOutcome>,
}

/// Result of a `query_replicas` fan-out.
#[derive(Debug)]
pub struct QueryOutcome {
    pub values: Vec<GetResponse>,
    pub response_count: usize,
}

/// Snapshot of connected peers, exposed so the reconciler can resolve a
/// healed peer's address without depending on the health probe directly.
pub trait PeerDirectory: Send + Sync {
    fn connected_peers(&self) -> Vec<SocketAddr>;
}

/// Owns the immutable configured-peer list (the denominator for N) and
/// the mutable connected-peer set used for fan-out, plus a pooled RPC
/// client shared across both.
pub struct Coordinator {
    self_id: String,
    configured_peer_count: usize,
    rpc_client: Arc<RpcClient>,
    discovery: Arc<dyn NodeDiscovery>,
    connected: RwLock<HashMap<SocketAddr, Option<String>>>,
    replication_timeout: Duration,
    running: Arc<AtomicBool>,
    metrics_reader: Arc<MetricsReader>,
}

impl Coordinator {
    pub fn new(config: &Config, rpc_client: Arc<RpcClient>, discovery: Arc<dyn NodeDiscovery>, metrics_reader: Arc<MetricsReader>) -> Self {
        Self {
            self_id: config.node_id.clone(),
            configured_peer_count: config.configured_peers.len(),
            rpc_client,
            discovery,
            connected: RwLock::new(HashMap::new()),
            replication_timeout: Duration::from_millis(config.replication_timeout_ms),
            running: Arc::new(AtomicBool::new(false)),
            metrics_reader,
        }
    }

    pub fn configured_peer_count(&self) -> usize {
        self.configured_peer_count
    }

    pub fn connected_peers(&self) -> Vec<SocketAddr> {
        self.connected.read().keys().copied().collect()
    }

    /// Sync the connected set from discovery once and spawn a loop that
    /// keeps it in sync as discovery emits join/leave events.
    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        self.sync_peers().await;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut events = this.discovery.subscribe();
            while this.running.load(Ordering::SeqCst) {
                match events.recv().await {
                    Ok(ClusterEvent::NodeJoined(node)) => {
                        this.connected.write().insert(node.address, node.node_id);
                        debug!(peer = %node.address, "coordinator peer joined");
                    }
                    Ok(ClusterEvent::NodeLeft(addr)) => {
                        this.connected.write().remove(&addr);
                        this.rpc_client.remove_connection(addr);
                        debug!(peer = %addr, "coordinator peer left");
                    }
                    Ok(ClusterEvent::RefreshComplete { .. }) => {}
                    Err(_) => break,
                }
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn sync_peers(&self) {
        match self.discovery.get_nodes().await {
            Ok(nodes) => {
                let mut connected = self.connected.write();
                connected.clear();
                for node in nodes {
                    connected.insert(node.address, node.node_id);
                }
            }
            Err(e) => warn!(error = %e, "coordinator failed to sync peer set from discovery"),
        }
    }

    /// Fan out a replicate call to every connected peer, each under its
    /// own per-attempt deadline. Waits for every task (not just the first
    /// `requiredAcks`) so latency and variance data stays complete.
    pub async fn replicate(&self, req: ReplicateRequest, required_acks: usize) -> Result<ReplicateOutcome> {
        let peers: Vec<SocketAddr> = self.connected_peers();

        if peers.is_empty() {
            let outcome = ReplicateOutcome { ack_count: 1, per_peer: Vec::new() };
            return if outcome.ack_count >= required_acks {
                Ok(outcome)
            } else {
                Err(Error::InsufficientAcks { got: outcome.ack_count, required: required_acks })
            };
        }

        let tasks = peers.into_iter().map(|addr| {
            let rpc_client = Arc::clone(&self.rpc_client);
            let metrics_reader = Arc::clone(&self.metrics_reader);
            let req = req.clone();
            let deadline = self.replication_timeout;
            async move {
                let start = std::time::Instant::now();
                let timer = crate::metrics::OpTimer::new("aqkv_replicate_latency_seconds");
                let result = tokio::time::timeout(deadline, rpc_client.replicate(addr, req)).await;
                match result {
                    Ok(Ok(resp)) if resp.success => {
                        timer.success();
                        metrics_reader.record_peer_latency(addr, start.elapsed().as_secs_f64());
                        crate::metrics::record_replication_ack("success");
                        PeerOutcome { address: addr, success: true }
                    }
                    Ok(Ok(_)) => {
                        timer.error();
                        crate::metrics::record_replication_ack("rejected");
                        PeerOutcome { address: addr, success: false }
                    }
                    Ok(Err(e)) => {
                        timer.error();
                        crate::metrics::record_error(e.error_type());
                        crate::metrics::record_replication_ack("failure");
                        PeerOutcome { address: addr, success: false }
                    }
                    Err(_) => {
                        timer.error();
                        let timeout_err = Error::RpcTimeout(deadline.as_millis() as u64);
                        crate::metrics::record_error(timeout_err.error_type());
                        crate::metrics::record_replication_ack("timeout");
                        PeerOutcome { address: addr, success: false }
                    }
                }
            }
        });

        let per_peer: Vec<PeerOutcome> = futures::future::join_all(tasks).await;
        let ack_count = 1 + per_peer.iter().filter(|o| o.success).count();

        if ack_count < required_acks {
            return Err(Error::InsufficientAcks { got: ack_count, required: required_acks });
        }

        Ok(ReplicateOutcome { ack_count, per_peer })
    }

    /// Fan out a local-get call to every connected peer; self's value is
    /// the caller's responsibility to fold in.
    pub async fn query_replicas(&self, key: String, required_responses: usize) -> Result<QueryOutcome> {
        let peers = self.connected_peers();
        let deadline = self.replication_timeout;

        let tasks = peers.into_iter().map(|addr| {
            let rpc_client = Arc::clone(&self.rpc_client);
            let key = key.clone();
            async move { tokio::time::timeout(deadline, rpc_client.get_local(addr, key)).await }
        });

        let results = futures::future::join_all(tasks).await;
        let mut values = Vec::new();
        for result in results {
            match result {
                Ok(Ok(resp)) if resp.found => values.push(resp),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    crate::metrics::record_error(e.error_type());
                }
                Err(_) => {
                    let timeout_err = Error::RpcTimeout(deadline.as_millis() as u64);
                    crate::metrics::record_error(timeout_err.error_type());
                }
            }
        }

        let response_count = values.len() + 1;
        if response_count < required_responses {
            return Err(Error::InsufficientReplicas { got: response_count, required: required_responses });
        }

        Ok(QueryOutcome { values, response_count })
    }

    /// Pick the most recent replica by HLC happens-before; stable
    /// first-wins on exact (physical, logical) equality.
    pub fn most_recent(values: &[GetResponse]) -> Option<&GetResponse> {
        values.iter().fold(None, |winner, candidate| match winner {
            None => Some(candidate),
            Some(current) => {
                let current_hlc = current.hlc.as_ref();
                let candidate_hlc = candidate.hlc.as_ref();
                match (current_hlc, candidate_hlc) {
                    (Some(c), Some(n)) if n.physical > c.physical || (n.physical == c.physical && n.logical > c.logical) => {
                        Some(candidate)
                    }
                    _ => Some(current),
                }
            }
        })
    }
}

impl PeerDirectory for Coordinator {
    fn connected_peers(&self) -> Vec<SocketAddr> {
        Coordinator::connected_peers(self)
    }
}

/// Build a `ReplicateRequest` from a local write, for the handler to hand
/// to `Coordinator::replicate` after storing locally.
pub fn build_replicate_request(key: String, value: Vec<u8>, version: i64, source_node_id: String, hlc: &Timestamp) -> ReplicateRequest {
    ReplicateRequest { key, value, version, timestamp: hlc.physical, source_node_id, hlc: hlc.into() }
}
