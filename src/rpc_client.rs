//! Pooled QUIC client for the `NodeRpc` service contract.
//!
//! Mirrors the grounding source's `ClusterClient`: QUIC connections are
//! pooled per peer address (expensive TLS handshake, established lazily
//! and reused); each RPC call opens a fresh bidirectional stream on the
//! pooled connection and builds a one-shot tarpc client over it (cheap,
//! matching QUIC's stream-multiplexing design). Deadlines are the
//! caller's responsibility (`tokio::time::timeout` around each call) so
//! this client stays a thin, deadline-agnostic transport.

use crate::clock::Timestamp;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::service::NodeRpcClient;
use crate::transport::{make_client_endpoint, QuicBiStream};
use crate::types::{
    GetResponse, HealthCheckRequest, HealthCheckResponse, PutResponse, ReplicateRequest, ReplicateResponse,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tarpc::client::Config as TarpcConfig;
use tarpc::context;
use tracing::{debug, warn};

struct PooledConnection {
    connection: quinn::Connection,
}

/// Connection-pooled client for the node-to-node RPC contract.
pub struct RpcClient {
    endpoint: quinn::Endpoint,
    connect_timeout: Duration,
    connections: RwLock<HashMap<SocketAddr, PooledConnection>>,
}

impl RpcClient {
    pub async fn new(config: &Config) -> Result<Self> {
        let endpoint = make_client_endpoint(config).await?;
        Ok(Self {
            endpoint,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            connections: RwLock::new(HashMap::new()),
        })
    }

    async fn get_connection(&self, addr: SocketAddr) -> Result<quinn::Connection> {
        {
            let connections = self.connections.read();
            if let Some(pooled) = connections.get(&addr) {
                if pooled.connection.close_reason().is_none() {
                    return Ok(pooled.connection.clone());
                }
            }
        }

        // SNI is only load-bearing with TLS enabled; loopback/dev clusters
        // run without it, so the peer's own address is an adequate name.
        let server_name = addr.ip().to_string();
        let connecting = self
            .endpoint
            .connect(addr, &server_name)
            .map_err(|e| Error::NodeUnavailable(format!("connect to {}: {}", addr, e)))?;

        let connection = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| Error::NodeUnavailable(format!("connect to {} timed out", addr)))?
            .map_err(|e| Error::NodeUnavailable(format!("handshake with {} failed: {}", addr, e)))?;

        self.connections.write().insert(addr, PooledConnection { connection: connection.clone() });
        debug!(peer = %addr, "QUIC connection established");
        Ok(connection)
    }

    fn evict(&self, addr: SocketAddr) {
        self.connections.write().remove(&addr);
    }

    /// Open a fresh bidirectional stream and build a one-shot tarpc client.
    /// Retries once against a freshly established connection if the
    /// pooled one has gone stale between the liveness check and use.
    async fn new_rpc_client(&self, addr: SocketAddr) -> Result<NodeRpcClient> {
        let connection = self.get_connection(addr).await?;

        let (send, recv) = match connection.open_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                warn!(peer = %addr, error = %e, "stream open failed on pooled connection, reconnecting");
                self.evict(addr);
                let connection = self.get_connection(addr).await?;
                connection
                    .open_bi()
                    .await
                    .map_err(|e| Error::RpcTransport(format!("open stream to {}: {}", addr, e)))?
            }
        };

        let transport = tarpc::serde_transport::new(
            tokio_util::codec::Framed::new(QuicBiStream { send, recv }, tokio_util::codec::LengthDelimitedCodec::new()),
            tarpc::tokio_serde::formats::Bincode::default(),
        );

        Ok(NodeRpcClient::new(TarpcConfig::default(), transport).spawn())
    }

    fn context() -> context::Context {
        context::current()
    }

    pub async fn put(&self, addr: SocketAddr, key: String, value: Vec<u8>) -> Result<PutResponse> {
        let client = self.new_rpc_client(addr).await?;
        client.put(Self::context(), key, value).await.map_err(|e| Error::RpcTransport(e.to_string()))
    }

    pub async fn get(&self, addr: SocketAddr, key: String) -> Result<GetResponse> {
        let client = self.new_rpc_client(addr).await?;
        client.get(Self::context(), key).await.map_err(|e| Error::RpcTransport(e.to_string()))
    }

    pub async fn get_local(&self, addr: SocketAddr, key: String) -> Result<GetResponse> {
        let client = self.new_rpc_client(addr).await?;
        client.get_local(Self::context(), key).await.map_err(|e| Error::RpcTransport(e.to_string()))
    }

    pub async fn replicate(&self, addr: SocketAddr, req: ReplicateRequest) -> Result<ReplicateResponse> {
        let client = self.new_rpc_client(addr).await?;
        client.replicate(Self::context(), req).await.map_err(|e| Error::RpcTransport(e.to_string()))
    }

    pub async fn health_check(&self, addr: SocketAddr, source_node_id: &str, hlc: &Timestamp) -> Result<HealthCheckResponse> {
        let client = self.new_rpc_client(addr).await?;
        let req = HealthCheckRequest {
            source_node_id: source_node_id.to_string(),
            timestamp: hlc.physical,
            hlc: Some(hlc.into()),
        };
        client.health_check(Self::context(), req).await.map_err(|e| Error::RpcTransport(e.to_string()))
    }

    pub fn remove_connection(&self, addr: SocketAddr) {
        self.evict(addr);
    }

    pub fn clear_connections(&self) {
        self.connections.write().clear();
    }
}
