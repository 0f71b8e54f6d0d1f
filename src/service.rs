//! RPC service contract between nodes, as a `#[tarpc::service]` trait.

use crate::types::{
    GetResponse, HealthCheckRequest, HealthCheckResponse, PutResponse, ReplicateRequest, ReplicateResponse,
};

#[tarpc::service]
pub trait NodeRpc {
    /// Coordinated write: stamps an HLC, stores locally, fans out to peers.
    async fn put(key: String, value: Vec<u8>) -> PutResponse;

    /// Coordinated read: may query peers up to the current R.
    async fn get(key: String) -> GetResponse;

    /// Local-only read, never performs quorum. Used by peers querying
    /// each other during `queryReplicas` fan-out.
    async fn get_local(key: String) -> GetResponse;

    /// Applies a replicated write from a peer.
    async fn replicate(req: ReplicateRequest) -> ReplicateResponse;

    /// Lightweight liveness probe, piggybacking the caller's HLC.
    async fn health_check(req: HealthCheckRequest) -> HealthCheckResponse;
}
