//! Crate-wide error type and result alias.

use thiserror::Error;

/// Every failure kind a node can produce, on the wire or internally.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum Error {
    /// A write did not collect enough peer acknowledgements.
    #[error("insufficient acks: got {got}, required {required}")]
    InsufficientAcks { got: usize, required: usize },

    /// A read did not collect enough replica responses.
    #[error("insufficient replicas: got {got}, required {required}")]
    InsufficientReplicas { got: usize, required: usize },

    /// A value's age exceeded the configured staleness bound.
    #[error("staleness bound exceeded")]
    StalenessExceeded,

    /// A remote HLC's physical clock diverged too far from ours. Non-fatal.
    #[error("clock drift {drift_ns}ns exceeds bound {max_ns}ns")]
    ClockDrift { drift_ns: i64, max_ns: i64 },

    /// A quorum change was attempted before the hysteresis lockout elapsed.
    #[error("hysteresis lockout active, {remaining_ns}ns remaining")]
    HysteresisLocked { remaining_ns: i64 },

    /// A proposed (R,W) violates the intersection invariant R+W>N.
    #[error("intersection violation: R={r} W={w} N={n}")]
    IntersectionViolation { r: usize, w: usize, n: usize },

    /// A proposed R or W fell outside its configured bounds.
    #[error("bounds violation: R={r} W={w}")]
    BoundsViolation { r: usize, w: usize },

    /// A per-peer RPC did not complete within its deadline.
    #[error("rpc timeout after {0}ms")]
    RpcTimeout(u64),

    /// A per-peer RPC failed at the transport layer.
    #[error("rpc transport error: {0}")]
    RpcTransport(String),

    /// No value was found for the requested key.
    #[error("not found")]
    NotFound,

    /// TLS certificate/key loading or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Serialization/deserialization failure on the wire.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration failed startup validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No pooled connection could be established to a peer.
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    /// Peer discovery backend failed.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Catch-all for invariant violations that should terminate the node.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable label for metrics, independent of the Display message.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InsufficientAcks { .. } => "insufficient_acks",
            Error::InsufficientReplicas { .. } => "insufficient_replicas",
            Error::StalenessExceeded => "staleness_exceeded",
            Error::ClockDrift { .. } => "clock_drift",
            Error::HysteresisLocked { .. } => "hysteresis_locked",
            Error::IntersectionViolation { .. } => "intersection_violation",
            Error::BoundsViolation { .. } => "bounds_violation",
            Error::RpcTimeout(_) => "rpc_timeout",
            Error::RpcTransport(_) => "rpc_transport",
            Error::NotFound => "not_found",
            Error::Tls(_) => "tls",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::NodeUnavailable(_) => "node_unavailable",
            Error::Discovery(_) => "discovery",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::RpcTransport(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_is_stable() {
        assert_eq!(Error::NotFound.error_type(), "not_found");
        assert_eq!(
            Error::InsufficientAcks { got: 1, required: 2 }.error_type(),
            "insufficient_acks"
        );
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let e: Error = io_err.into();
        assert_eq!(e.error_type(), "rpc_transport");
    }
}
