//! DNS-based node discovery: periodic A/AAAA resolution of a configured
//! name, diffing the resolved set against the previous one to emit
//! join/leave events. Suitable for orchestrator headless services.

use super::{ClusterEvent, DiscoveredNode, NodeDiscovery};
use crate::error::Error;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct DnsDiscovery {
    dns_name: String,
    refresh_interval: Duration,
    #[allow(dead_code)]
    dns_server: Option<String>,
    default_port: u16,
    nodes: Arc<RwLock<Vec<DiscoveredNode>>>,
    event_tx: broadcast::Sender<ClusterEvent>,
    running: Arc<AtomicBool>,
    task_handle: RwLock<Option<JoinHandle<()>>>,
}

impl DnsDiscovery {
    pub fn new(dns_name: String, refresh_interval_secs: u64, dns_server: Option<String>, default_port: u16) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            dns_name,
            refresh_interval: Duration::from_secs(refresh_interval_secs),
            dns_server,
            default_port,
            nodes: Arc::new(RwLock::new(Vec::new())),
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            task_handle: RwLock::new(None),
        }
    }

    async fn resolve(&self) -> Result<Vec<DiscoveredNode>, Error> {
        let dns_name = self.dns_name.clone();
        let default_port = self.default_port;

        let result = tokio::task::spawn_blocking(move || {
            let lookup_addr = if dns_name.contains(':') {
                dns_name.clone()
            } else {
                format!("{}:{}", dns_name, default_port)
            };
            lookup_addr.to_socket_addrs().map(|addrs| addrs.map(DiscoveredNode::new).collect::<Vec<_>>())
        })
        .await
        .map_err(|e| Error::Discovery(format!("DNS task failed: {}", e)))?;

        result.map_err(|e| Error::Discovery(format!("DNS resolution failed: {}", e)))
    }

    fn emit_changes(&self, new_nodes: &[DiscoveredNode]) {
        let old_nodes = self.nodes.read();
        let old_addrs: HashSet<SocketAddr> = old_nodes.iter().map(|n| n.address).collect();
        let new_addrs: HashSet<SocketAddr> = new_nodes.iter().map(|n| n.address).collect();

        for node in new_nodes {
            if !old_addrs.contains(&node.address) {
                debug!(address = %node.address, "peer joined via DNS discovery");
                let _ = self.event_tx.send(ClusterEvent::NodeJoined(node.clone()));
            }
        }
        for addr in &old_addrs {
            if !new_addrs.contains(addr) {
                debug!(address = %addr, "peer left (no longer in DNS)");
                let _ = self.event_tx.send(ClusterEvent::NodeLeft(*addr));
            }
        }
    }
}

#[async_trait]
impl NodeDiscovery for DnsDiscovery {
    async fn get_nodes(&self) -> Result<Vec<DiscoveredNode>, Error> {
        Ok(self.nodes.read().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.event_tx.subscribe()
    }

    async fn refresh(&self) -> Result<(), Error> {
        match self.resolve().await {
            Ok(new_nodes) => {
                self.emit_changes(&new_nodes);
                *self.nodes.write() = new_nodes;
                let node_count = self.nodes.read().len();
                let _ = self.event_tx.send(ClusterEvent::RefreshComplete { node_count });
                Ok(())
            }
            Err(e) => {
                warn!(dns_name = %self.dns_name, error = %e, "DNS refresh failed");
                Err(e)
            }
        }
    }

    async fn start(&self) -> Result<(), Error> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "initial DNS refresh failed");
        }

        let nodes = self.nodes.clone();
        let running = self.running.clone();
        let event_tx = self.event_tx.clone();
        let dns_name = self.dns_name.clone();
        let default_port = self.default_port;
        let refresh_interval = self.refresh_interval;

        let handle = tokio::spawn(async move {
            info!(dns_name = %dns_name, interval_secs = refresh_interval.as_secs(), "starting DNS discovery background refresh");

            let mut interval = tokio::time::interval(refresh_interval);
            interval.tick().await;

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let lookup_addr = format!("{}:{}", dns_name, default_port);
                match tokio::task::spawn_blocking(move || lookup_addr.to_socket_addrs().map(|addrs| addrs.collect::<Vec<_>>())).await {
                    Ok(Ok(addrs)) => {
                        let new_nodes: Vec<DiscoveredNode> = addrs.into_iter().map(DiscoveredNode::new).collect();

                        let old_addrs: HashSet<SocketAddr> = nodes.read().iter().map(|n| n.address).collect();
                        let new_addrs: HashSet<SocketAddr> = new_nodes.iter().map(|n| n.address).collect();

                        for node in &new_nodes {
                            if !old_addrs.contains(&node.address) {
                                let _ = event_tx.send(ClusterEvent::NodeJoined(node.clone()));
                            }
                        }
                        for addr in &old_addrs {
                            if !new_addrs.contains(addr) {
                                let _ = event_tx.send(ClusterEvent::NodeLeft(*addr));
                            }
                        }

                        *nodes.write() = new_nodes;
                        let node_count = nodes.read().len();
                        let _ = event_tx.send(ClusterEvent::RefreshComplete { node_count });
                    }
                    Ok(Err(e)) => warn!(error = %e, "DNS refresh failed"),
                    Err(e) => error!(error = %e, "DNS task panicked"),
                }
            }

            info!("DNS discovery background refresh stopped");
        });

        *self.task_handle.write() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task_handle.write().take() {
            handle.abort();
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "dns"
    }
}

impl Drop for DnsDiscovery {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task_handle.write().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discovery_resolves_localhost_without_error() {
        let discovery = DnsDiscovery::new("localhost".into(), 30, None, 9090);
        discovery.start().await.unwrap();
        let _nodes = discovery.get_nodes().await.unwrap();
        discovery.stop().await.unwrap();
    }

    #[test]
    fn backend_name_is_dns() {
        let discovery = DnsDiscovery::new("test.local".into(), 30, None, 9090);
        assert_eq!(discovery.backend_name(), "dns");
    }

    #[tokio::test]
    async fn subscribe_does_not_panic() {
        let discovery = DnsDiscovery::new("localhost".into(), 30, None, 9090);
        let _rx = discovery.subscribe();
    }
}
