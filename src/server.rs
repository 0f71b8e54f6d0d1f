//! QUIC accept loop and the `NodeRpc` handler that dispatches onto the
//! shared `RequestHandler`.

use crate::error::{Error, Result};
use crate::handler::RequestHandler;
use crate::service::NodeRpc;
use crate::transport::QuicBiStream;
use crate::types::{GetResponse, HealthCheckRequest, HealthCheckResponse, PutResponse, ReplicateRequest, ReplicateResponse};
use futures::StreamExt;
use std::sync::Arc;
use tarpc::server::{BaseChannel, Channel};
use tokio_util::codec::LengthDelimitedCodec;
use tracing::{debug, error, info, warn};

/// Owns the QUIC server endpoint and accepts connections, spawning one
/// task per connection and one task per bidirectional stream on it —
/// mirroring the grounding source's accept-loop shape.
pub struct NodeServer {
    endpoint: quinn::Endpoint,
    handler: Arc<RequestHandler>,
}

impl NodeServer {
    pub fn new(endpoint: quinn::Endpoint, handler: Arc<RequestHandler>) -> Self {
        Self { endpoint, handler }
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.endpoint.local_addr().map_err(Error::from)
    }

    /// Runs forever, accepting connections until the endpoint is closed.
    pub async fn serve(&self) {
        info!("node server accepting connections");
        while let Some(connecting) = self.endpoint.accept().await {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                match connecting.await {
                    Ok(connection) => handle_connection(connection, handler).await,
                    Err(e) => warn!(error = %e, "incoming connection handshake failed"),
                }
            });
        }
        info!("node server endpoint closed");
    }
}

async fn handle_connection(connection: quinn::Connection, handler: Arc<RequestHandler>) {
    let peer = connection.remote_address();
    debug!(peer = %peer, "connection accepted");
    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handle_stream(send, recv, handler).await;
                });
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "connection closed");
                break;
            }
        }
    }
}

async fn handle_stream(send: quinn::SendStream, recv: quinn::RecvStream, handler: Arc<RequestHandler>) {
    let framed = tokio_util::codec::Framed::new(QuicBiStream { send, recv }, LengthDelimitedCodec::new());
    let transport = tarpc::serde_transport::new(framed, tarpc::tokio_serde::formats::Bincode::default());

    let node_handler = NodeHandler { handler };
    BaseChannel::with_defaults(transport)
        .execute(node_handler.serve())
        .for_each(|response| async move {
            tokio::spawn(response);
        })
        .await;
}

/// Bridges the generated `NodeRpc` trait to the plain-async `RequestHandler`.
#[derive(Clone)]
struct NodeHandler {
    handler: Arc<RequestHandler>,
}

impl NodeRpc for NodeHandler {
    async fn put(self, _ctx: tarpc::context::Context, key: String, value: Vec<u8>) -> PutResponse {
        let timer = crate::metrics::OpTimer::new("aqkv_put_latency_seconds");
        let resp = self.handler.put(key, value).await;
        if resp.success {
            timer.success();
        } else {
            timer.error();
        }
        resp
    }

    async fn get(self, _ctx: tarpc::context::Context, key: String) -> GetResponse {
        let timer = crate::metrics::OpTimer::new("aqkv_get_latency_seconds");
        let resp = self.handler.get(key).await;
        if resp.found {
            timer.success();
        } else {
            timer.error();
        }
        resp
    }

    async fn get_local(self, _ctx: tarpc::context::Context, key: String) -> GetResponse {
        self.handler.get_local(key).await
    }

    async fn replicate(self, _ctx: tarpc::context::Context, req: ReplicateRequest) -> ReplicateResponse {
        let timer = crate::metrics::OpTimer::new("aqkv_replicate_handler_latency_seconds");
        let resp = self.handler.replicate(req).await;
        if resp.success {
            timer.success();
        } else {
            error!(node_id = %resp.node_id, "replicate handler reported failure");
            timer.error();
        }
        resp
    }

    async fn health_check(self, _ctx: tarpc::context::Context, req: HealthCheckRequest) -> HealthCheckResponse {
        self.handler.health_check(req).await
    }
}
