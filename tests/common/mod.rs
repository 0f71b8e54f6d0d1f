//! Shared harness for the multi-node loopback integration suites: a
//! self-signed cert pair per node (QUIC mandates TLS even on loopback)
//! and a `Config` builder wiring a fixed-port static cluster together.

use aqkv::{Config, DiscoveryConfig, Node, RpcClient, TlsConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Generates a self-signed cert/key pair on loopback and writes it to a
/// temp dir, returning the `TlsConfig` pointing at the written files. The
/// `TempDir` must outlive the `Node` that reads from it.
pub fn self_signed_tls(dir: &TempDir) -> TlsConfig {
    let cert = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).expect("self-signed cert generation");
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    std::fs::write(&cert_path, cert.cert.pem()).expect("write cert");
    std::fs::write(&key_path, cert.signing_key.serialize_pem()).expect("write key");

    TlsConfig {
        enabled: true,
        cert_path: Some(cert_path.to_string_lossy().to_string()),
        key_path: Some(key_path.to_string_lossy().to_string()),
        ca_cert_path: None,
        skip_verify: true,
    }
}

pub struct TestNode {
    pub node: Arc<Node>,
    pub addr: SocketAddr,
    _tls_dir: TempDir,
}

/// Build a node's `Config` for a fixed-port loopback cluster. `port` is
/// this node's listen port; `peer_ports` are the other members'.
pub fn test_config(node_id: &str, port: u16, peer_ports: &[u16], n: usize, r: usize, w: usize) -> (Config, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let tls = self_signed_tls(&dir);
    let peers: Vec<String> = peer_ports.iter().map(|p| format!("127.0.0.1:{}", p)).collect();

    let cfg = Config {
        node_id: node_id.to_string(),
        listen_address: format!("127.0.0.1:{}", port),
        configured_peers: peers.clone(),
        n,
        initial_r: r,
        initial_w: w,
        replication_timeout_ms: 1000,
        probe_interval_ms: 100,
        adaptive_enabled: false,
        reconciliation_enabled: false,
        hlc_max_drift_ms: 5000,
        max_staleness_ms: 3000,
        hysteresis_lockout_ms: 5000,
        connect_timeout_ms: 1000,
        tls,
        discovery: DiscoveryConfig::Static { nodes: peers },
        ..Config::default()
    };

    (cfg, dir)
}

/// Construct and start a node, returning a handle once its server socket
/// is confirmed bound (`local_addr` succeeds).
pub async fn spawn_node(cfg: Config, tls_dir: TempDir) -> TestNode {
    let node = Arc::new(Node::new(cfg).await.expect("node construction"));
    let addr = node.local_addr().expect("bound listen address");
    let node_for_run = Arc::clone(&node);
    tokio::spawn(async move {
        node_for_run.run().await;
    });
    // Give the accept loop and background tasks a moment to come up.
    tokio::time::sleep(Duration::from_millis(150)).await;
    TestNode { node, addr, _tls_dir: tls_dir }
}

impl TestNode {
    pub fn stop(&self) {
        self.node.stop();
    }
}

pub async fn settle(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

/// A bare RPC client, independent of any node, for driving Put/Get calls
/// against a cluster from outside as a test would.
pub async fn test_client() -> RpcClient {
    let cfg = Config {
        tls: TlsConfig { skip_verify: true, ..TlsConfig::default() },
        connect_timeout_ms: 1000,
        ..Config::default()
    };
    RpcClient::new(&cfg).await.expect("client endpoint")
}
