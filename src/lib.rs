//! Adaptive-quorum distributed key-value store.
//!
//! A node hosts an in-memory, HLC-versioned key-value store, replicated
//! to its peers with a Dynamo-style R+W>N quorum. Unlike a fixed quorum,
//! R and W are continuously re-tuned by an adjuster control loop driven
//! off a Consistency Confidence Score computed from observed peer health,
//! while the intersection invariant is preserved on every transition.
//!
//! # Architecture
//!
//! - **Clock**: hybrid logical clock for causally meaningful write order
//! - **Store**: per-key in-memory map of the latest versioned value
//! - **Staleness**: bounded-age guard on reads
//! - **Write log**: bounded recent-write buffer feeding reconciliation
//! - **Health probe**: per-peer liveness/RTT, partition-healing detection
//! - **Coordinator**: pooled QUIC fan-out for replication and reads
//! - **Quorum**: thread-safe adaptive (R,W) with bounds and hysteresis
//! - **CCS computer**: weighted health score from sliding windows
//! - **Adjuster**: periodic control loop relaxing/tightening the quorum
//! - **Reconciler**: LWW anti-entropy on partition healing
//! - **Request handler**: Put/Get/GetLocal/Replicate/HealthCheck glue
//! - **Server**: QUIC accept loop dispatching onto the request handler

pub mod adjuster;
pub mod ccs;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod metrics_reader;
pub mod node;
pub mod quorum;
pub mod reconciler;
pub mod rpc_client;
pub mod server;
pub mod service;
pub mod staleness;
pub mod store;
pub mod transport;
pub mod types;
pub mod writelog;

pub use adjuster::{Adjuster, AdjustDecision};
pub use ccs::{CcsComponents, CcsComputer};
pub use clock::{Clock, Timestamp};
pub use config::{Config, DiscoveryConfig, TlsConfig};
pub use coordinator::{Coordinator, PeerDirectory, QueryOutcome, ReplicateOutcome};
pub use discovery::{ClusterEvent, DiscoveredNode, DnsDiscovery, NodeDiscovery, StaticDiscovery};
pub use error::{Error, Result};
pub use handler::RequestHandler;
pub use health::{HealingEvent, HealthProbe, HealthState, NodeHealthInfo};
pub use metrics_reader::MetricsReader;
pub use node::Node;
pub use quorum::{AdaptiveQuorum, QuorumProvider, QuorumSetOutcome, StaticQuorumProvider};
pub use reconciler::Reconciler;
pub use rpc_client::RpcClient;
pub use server::NodeServer;
pub use service::{NodeRpc, NodeRpcClient};
pub use store::{Store, VersionedValue};
pub use writelog::{WriteLog, WriteLogEntry};
