//! Static node discovery from configuration.
//!
//! Fixed list of node addresses from configuration. Best for development
//! and small, fixed deployments.

use super::{ClusterEvent, DiscoveredNode, NodeDiscovery};
use crate::error::Error;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::net::{SocketAddr, ToSocketAddrs};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_PORT: u16 = 9090;

pub struct StaticDiscovery {
    nodes: RwLock<Vec<DiscoveredNode>>,
    hostnames: Vec<String>,
    event_tx: broadcast::Sender<ClusterEvent>,
}

impl StaticDiscovery {
    /// Addresses may be "host:port"; if port is omitted, 9090 is used.
    pub fn new(addresses: Vec<String>) -> Result<Self, Error> {
        let (event_tx, _) = broadcast::channel(64);

        let mut nodes = Vec::new();
        let mut hostnames = Vec::new();

        for addr_str in addresses {
            let addr_with_port = if addr_str.contains(':') {
                addr_str.clone()
            } else {
                format!("{}:{}", addr_str, DEFAULT_PORT)
            };

            hostnames.push(addr_with_port.clone());

            match addr_with_port.to_socket_addrs() {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        debug!(address = %addr, hostname = %addr_with_port, "resolved peer address");
                        nodes.push(DiscoveredNode::new(addr));
                    }
                }
                Err(e) => {
                    warn!(hostname = %addr_with_port, error = %e, "failed to resolve peer address, will retry on refresh");
                }
            }
        }

        Ok(Self { nodes: RwLock::new(nodes), hostnames, event_tx })
    }

    pub fn add_node(&self, address: SocketAddr) {
        let node = DiscoveredNode::new(address);
        let mut nodes = self.nodes.write();
        if nodes.iter().any(|n| n.address == address) {
            return;
        }
        nodes.push(node.clone());
        let _ = self.event_tx.send(ClusterEvent::NodeJoined(node));
    }

    pub fn remove_node(&self, address: SocketAddr) {
        let mut nodes = self.nodes.write();
        if let Some(pos) = nodes.iter().position(|n| n.address == address) {
            nodes.remove(pos);
            let _ = self.event_tx.send(ClusterEvent::NodeLeft(address));
        }
    }
}

#[async_trait]
impl NodeDiscovery for StaticDiscovery {
    async fn get_nodes(&self) -> Result<Vec<DiscoveredNode>, Error> {
        Ok(self.nodes.read().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.event_tx.subscribe()
    }

    async fn refresh(&self) -> Result<(), Error> {
        let mut new_nodes = Vec::new();
        let old_nodes: Vec<SocketAddr> = self.nodes.read().iter().map(|n| n.address).collect();

        for hostname in &self.hostnames {
            match hostname.to_socket_addrs() {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        new_nodes.push(DiscoveredNode::new(addr));
                    }
                }
                Err(e) => {
                    warn!(hostname = %hostname, error = %e, "failed to resolve peer address during refresh");
                }
            }
        }

        for node in &new_nodes {
            if !old_nodes.contains(&node.address) {
                let _ = self.event_tx.send(ClusterEvent::NodeJoined(node.clone()));
            }
        }

        let new_addrs: Vec<SocketAddr> = new_nodes.iter().map(|n| n.address).collect();
        for addr in &old_nodes {
            if !new_addrs.contains(addr) {
                let _ = self.event_tx.send(ClusterEvent::NodeLeft(*addr));
            }
        }

        *self.nodes.write() = new_nodes;

        let node_count = self.nodes.read().len();
        let _ = self.event_tx.send(ClusterEvent::RefreshComplete { node_count });

        Ok(())
    }

    async fn start(&self) -> Result<(), Error> {
        self.refresh().await
    }

    async fn stop(&self) -> Result<(), Error> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creation_resolves_loopback_addresses() {
        let discovery = StaticDiscovery::new(vec!["127.0.0.1:9090".into(), "127.0.0.1:9091".into()]).unwrap();
        let nodes = discovery.get_nodes().await.unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn missing_port_uses_default() {
        let discovery = StaticDiscovery::new(vec!["127.0.0.1".into()]).unwrap();
        let nodes = discovery.get_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].address.port(), DEFAULT_PORT);
    }

    #[tokio::test]
    async fn add_and_remove_node() {
        let discovery = StaticDiscovery::new(vec!["127.0.0.1:9090".into()]).unwrap();
        let addr: SocketAddr = "127.0.0.1:9091".parse().unwrap();
        discovery.add_node(addr);
        assert_eq!(discovery.get_nodes().await.unwrap().len(), 2);
        discovery.remove_node(addr);
        assert_eq!(discovery.get_nodes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_join_events() {
        let discovery = StaticDiscovery::new(vec!["127.0.0.1:9090".into()]).unwrap();
        let mut rx = discovery.subscribe();
        let addr: SocketAddr = "127.0.0.1:9091".parse().unwrap();
        discovery.add_node(addr);
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, ClusterEvent::NodeJoined(_)));
    }

    #[test]
    fn backend_name_is_static() {
        let discovery = StaticDiscovery::new(vec![]).unwrap();
        assert_eq!(discovery.backend_name(), "static");
    }
}
