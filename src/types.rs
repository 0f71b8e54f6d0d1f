//! Wire types for the RPC service contract: the HLC wire shape and the
//! Put/Get/GetLocal/Replicate/HealthCheck request/response structs.

use crate::clock::Timestamp as HlcTimestamp;
use crate::store::VersionedValue;
use serde::{Deserialize, Serialize};

/// Three-field HLC wire shape: physical, logical, node id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireHlc {
    pub physical: i64,
    pub logical: i64,
    pub node_id: String,
}

impl From<&HlcTimestamp> for WireHlc {
    fn from(t: &HlcTimestamp) -> Self {
        Self { physical: t.physical, logical: t.logical, node_id: t.node_id.clone() }
    }
}

impl From<WireHlc> for HlcTimestamp {
    fn from(w: WireHlc) -> Self {
        HlcTimestamp { physical: w.physical, logical: w.logical, node_id: w.node_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
    pub version: i64,
    pub timestamp: i64,
    pub hlc: WireHlc,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub found: bool,
    pub value: Option<Vec<u8>>,
    pub version: Option<i64>,
    pub timestamp: Option<i64>,
    pub hlc: Option<WireHlc>,
    pub is_stale: bool,
    pub error: Option<String>,
}

impl GetResponse {
    pub fn not_found() -> Self {
        Self {
            found: false,
            value: None,
            version: None,
            timestamp: None,
            hlc: None,
            is_stale: false,
            error: Some("not found".into()),
        }
    }

    pub fn from_versioned(v: &VersionedValue, is_stale: bool, error: Option<String>) -> Self {
        Self {
            found: true,
            value: Some(v.payload.clone()),
            version: Some(v.version),
            timestamp: Some(v.hlc.physical),
            hlc: Some((&v.hlc).into()),
            is_stale,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub key: String,
    pub value: Vec<u8>,
    pub version: i64,
    pub timestamp: i64,
    pub source_node_id: String,
    pub hlc: WireHlc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateResponse {
    pub success: bool,
    pub node_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    pub source_node_id: String,
    pub timestamp: i64,
    pub hlc: Option<WireHlc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub healthy: bool,
    pub node_id: String,
    pub timestamp: i64,
    pub hlc: WireHlc,
}
