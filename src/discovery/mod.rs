//! Pluggable peer discovery for dynamic cluster membership.
//!
//! Two backends: a static configured address list, and DNS-based
//! resolution suitable for orchestrator-managed headless services. Both
//! implement one `NodeDiscovery` trait so the health probe and the
//! coordinator can consume either without knowing which is in use.

mod dns;
mod r#static;

pub use dns::DnsDiscovery;
pub use r#static::StaticDiscovery;

use crate::config::DiscoveryConfig;
use crate::error::Error;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// A peer address resolved by discovery; may not yet be known to the
/// application layer (no `node_id` until the first successful RPC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredNode {
    pub address: SocketAddr,
    pub node_id: Option<String>,
}

impl DiscoveredNode {
    pub fn new(address: SocketAddr) -> Self {
        Self { address, node_id: None }
    }
}

/// Events emitted by a discovery backend as the peer set changes.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    NodeJoined(DiscoveredNode),
    NodeLeft(SocketAddr),
    RefreshComplete { node_count: usize },
}

#[async_trait]
pub trait NodeDiscovery: Send + Sync {
    async fn get_nodes(&self) -> Result<Vec<DiscoveredNode>, Error>;
    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent>;
    async fn refresh(&self) -> Result<(), Error>;
    async fn start(&self) -> Result<(), Error>;
    async fn stop(&self) -> Result<(), Error>;
    fn backend_name(&self) -> &'static str;
}

/// Construct the discovery backend named by a `DiscoveryConfig`.
pub fn create_discovery(config: &DiscoveryConfig) -> Result<Box<dyn NodeDiscovery>, Error> {
    match config {
        DiscoveryConfig::Static { nodes } => Ok(Box::new(StaticDiscovery::new(nodes.clone())?)),
        DiscoveryConfig::Dns { name, refresh_interval_secs, server, default_port } => Ok(Box::new(
            DnsDiscovery::new(name.clone(), *refresh_interval_secs, server.clone(), *default_port),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_node_starts_without_id() {
        let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
        let node = DiscoveredNode::new(addr);
        assert_eq!(node.address, addr);
        assert!(node.node_id.is_none());
    }

    #[test]
    fn create_discovery_dispatches_on_backend() {
        let config = DiscoveryConfig::Static { nodes: vec!["127.0.0.1:9090".into()] };
        let discovery = create_discovery(&config).unwrap();
        assert_eq!(discovery.backend_name(), "static");
    }
}
