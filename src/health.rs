//! Health probe: per-peer liveness + RTT, partition-healing detection, and
//! dynamic peer membership via a pluggable discovery backend.

use crate::clock::Clock;
use crate::discovery::{ClusterEvent, NodeDiscovery};
use crate::rpc_client::RpcClient;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const HEALTH_RPC_DEADLINE: Duration = Duration::from_secs(2);
const HEALING_CHANNEL_CAPACITY: usize = 100;
const DISCOVERY_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// UP or DOWN per the data model, plus an `Unknown` starting state for a
/// peer that has never been probed. Per the reconciler's state machine
/// (spec §4.9), `UNKNOWN -> UP` emits no healing event — only a genuine
/// `DOWN -> UP` transition does — so a freshly discovered peer's first
/// successful probe must not look like a healed partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown,
    Up,
    Down,
}

impl Default for HealthState {
    fn default() -> Self {
        HealthState::Unknown
    }
}

#[derive(Debug, Clone)]
pub struct NodeHealthInfo {
    pub state: HealthState,
    pub last_rtt_secs: f64,
    pub last_check: Option<Instant>,
}

impl Default for NodeHealthInfo {
    fn default() -> Self {
        Self { state: HealthState::Unknown, last_rtt_secs: 0.0, last_check: None }
    }
}

/// A peer transitioning DOWN -> UP, driving anti-entropy reconciliation.
#[derive(Debug, Clone)]
pub struct HealingEvent {
    pub peer_id: String,
    pub address: SocketAddr,
}

struct PeerEntry {
    address: SocketAddr,
    info: RwLock<NodeHealthInfo>,
    task: Option<JoinHandle<()>>,
}

/// Owns one cooperative probe task per peer plus the discovery
/// reconciliation loop. Emits healing events on a bounded broadcast
/// channel that the reconciler subscribes to.
pub struct HealthProbe {
    self_id: String,
    clock: Arc<Clock>,
    rpc_client: Arc<RpcClient>,
    probe_interval: Duration,
    discovery: Arc<dyn NodeDiscovery>,
    peers: Arc<RwLock<HashMap<SocketAddr, Arc<RwLock<NodeHealthInfo>>>>>,
    peer_tasks: RwLock<HashMap<SocketAddr, JoinHandle<()>>>,
    healing_tx: broadcast::Sender<HealingEvent>,
    running: Arc<AtomicBool>,
}

impl HealthProbe {
    pub fn new(
        self_id: impl Into<String>,
        clock: Arc<Clock>,
        rpc_client: Arc<RpcClient>,
        probe_interval: Duration,
        discovery: Arc<dyn NodeDiscovery>,
    ) -> Self {
        let (healing_tx, _) = broadcast::channel(HEALING_CHANNEL_CAPACITY);
        Self {
            self_id: self_id.into(),
            clock,
            rpc_client,
            probe_interval,
            discovery,
            peers: Arc::new(RwLock::new(HashMap::new())),
            peer_tasks: RwLock::new(HashMap::new()),
            healing_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe_healing(&self) -> broadcast::Receiver<HealingEvent> {
        self.healing_tx.subscribe()
    }

    pub fn node_health(&self, address: &SocketAddr) -> Option<NodeHealthInfo> {
        self.peers.read().get(address).map(|i| i.read().clone())
    }

    pub fn connected_peers(&self) -> Vec<SocketAddr> {
        self.peers
            .read()
            .iter()
            .filter(|(_, info)| info.read().state == HealthState::Up)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Spawn the discovery-reconciliation loop and perform an initial
    /// sync of the peer set. Each peer gets its own probe task.
    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);

        if let Err(e) = self.discovery.start().await {
            warn!(error = %e, "initial discovery start failed");
        }
        self.reconcile_peers().await;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(DISCOVERY_RECONCILE_INTERVAL);
            interval.tick().await;
            let mut events = this.discovery.subscribe();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !this.running.load(Ordering::SeqCst) {
                            break;
                        }
                        if let Err(e) = this.discovery.refresh().await {
                            warn!(error = %e, "discovery refresh failed");
                        }
                        this.reconcile_peers().await;
                    }
                    event = events.recv() => {
                        if !this.running.load(Ordering::SeqCst) {
                            break;
                        }
                        if let Ok(ClusterEvent::NodeJoined(_)) | Ok(ClusterEvent::NodeLeft(_)) = event {
                            this.reconcile_peers().await;
                        }
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for (_, task) in self.peer_tasks.write().drain() {
            task.abort();
        }
    }

    /// Diff discovered nodes against the current peer set: cancel probe
    /// tasks for peers discovery no longer lists, spawn tasks for new ones.
    async fn reconcile_peers(self: &Arc<Self>) {
        let discovered = match self.discovery.get_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "failed to list discovered peers");
                return;
            }
        };

        let discovered_addrs: Vec<SocketAddr> = discovered.iter().map(|n| n.address).collect();

        let stale: Vec<SocketAddr> = {
            let peers = self.peers.read();
            peers.keys().filter(|a| !discovered_addrs.contains(a)).copied().collect()
        };
        for addr in stale {
            self.peers.write().remove(&addr);
            if let Some(task) = self.peer_tasks.write().remove(&addr) {
                task.abort();
            }
            info!(peer = %addr, "peer removed from discovery, probe cancelled");
        }

        for addr in discovered_addrs {
            let already_known = self.peers.read().contains_key(&addr);
            if already_known {
                continue;
            }
            let info = Arc::new(RwLock::new(NodeHealthInfo::default()));
            self.peers.write().insert(addr, Arc::clone(&info));
            let task = self.spawn_probe_task(addr, info);
            self.peer_tasks.write().insert(addr, task);
        }
    }

    fn spawn_probe_task(self: &Arc<Self>, addr: SocketAddr, info: Arc<RwLock<NodeHealthInfo>>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.probe_interval);
            loop {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                this.probe_once(addr, &info).await;
            }
        })
    }

    async fn probe_once(&self, addr: SocketAddr, info: &Arc<RwLock<NodeHealthInfo>>) {
        let start = Instant::now();
        let local_hlc = self.clock.now();

        let result = tokio::time::timeout(HEALTH_RPC_DEADLINE, self.rpc_client.health_check(addr, &self.self_id, &local_hlc)).await;

        let rtt = start.elapsed().as_secs_f64();
        let previously_down = { info.read().state == HealthState::Down };

        match result {
            Ok(Ok(resp)) if resp.healthy => {
                crate::metrics::record_peer_rtt(&addr.to_string(), rtt);
                {
                    let mut guard = info.write();
                    guard.state = HealthState::Up;
                    guard.last_rtt_secs = rtt;
                    guard.last_check = Some(Instant::now());
                }
                debug!(peer = %addr, rtt_ms = rtt * 1000.0, "health probe succeeded");

                if previously_down {
                    let peer_id = resp.node_id.clone();
                    if self.healing_tx.send(HealingEvent { peer_id, address: addr }).is_err() {
                        debug!(peer = %addr, "no reconciler subscribed to healing event");
                    }
                    crate::metrics::record_partition_healing();
                }
            }
            Ok(Ok(_unhealthy)) => {
                crate::metrics::record_error(crate::error::Error::RpcTransport("peer reported unhealthy".into()).error_type());
                let mut guard = info.write();
                guard.state = HealthState::Down;
                guard.last_check = Some(Instant::now());
                debug!(peer = %addr, "health probe reported unhealthy, marking DOWN");
            }
            Ok(Err(e)) => {
                crate::metrics::record_error(e.error_type());
                let mut guard = info.write();
                guard.state = HealthState::Down;
                guard.last_check = Some(Instant::now());
                debug!(peer = %addr, error = %e, "health probe rpc failed, marking DOWN");
            }
            Err(_elapsed) => {
                let timeout_err = crate::error::Error::RpcTimeout(HEALTH_RPC_DEADLINE.as_millis() as u64);
                crate::metrics::record_error(timeout_err.error_type());
                let mut guard = info.write();
                guard.state = HealthState::Down;
                guard.last_check = Some(Instant::now());
                debug!(peer = %addr, "health probe timed out, marking DOWN");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_defaults_to_unknown() {
        assert_eq!(HealthState::default(), HealthState::Unknown);
    }

    #[test]
    fn node_health_info_defaults_are_sane() {
        let info = NodeHealthInfo::default();
        assert_eq!(info.state, HealthState::Unknown);
        assert_eq!(info.last_rtt_secs, 0.0);
        assert!(info.last_check.is_none());
    }

    #[test]
    fn unknown_is_not_down() {
        // A freshly discovered peer must not look like a healed partition
        // on its first successful probe.
        assert_ne!(HealthState::Unknown, HealthState::Down);
    }
}
