//! Node configuration: every key in the service's external configuration
//! surface, with the same serde `#[serde(default = "...")]` pattern used
//! throughout so a partial document still deserializes completely.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// TLS configuration for the QUIC transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Skip certificate verification. Development only; never the default.
    #[serde(default)]
    pub skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: None,
            key_path: None,
            ca_cert_path: None,
            skip_verify: false,
        }
    }
}

/// Peer discovery backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DiscoveryConfig {
    Static {
        #[serde(default)]
        nodes: Vec<String>,
    },
    Dns {
        name: String,
        #[serde(default = "default_discovery_refresh_secs")]
        refresh_interval_secs: u64,
        #[serde(default)]
        server: Option<String>,
        #[serde(default = "default_listen_port")]
        default_port: u16,
    },
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig::Static { nodes: Vec::new() }
    }
}

fn default_discovery_refresh_secs() -> u64 {
    30
}

fn default_listen_port() -> u16 {
    9090
}

fn default_node_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_n() -> usize {
    3
}

fn default_initial_r() -> usize {
    2
}

fn default_initial_w() -> usize {
    2
}

fn default_replication_timeout_ms() -> u64 {
    500
}

fn default_probe_interval_ms() -> u64 {
    500
}

fn default_min_r() -> usize {
    1
}

/// Sentinel meaning "not present in the document": per spec §6, `maxR`
/// defaults to `N`, but a field-level serde default has no access to a
/// sibling field's deserialized value. `validate()` resolves this against
/// `self.n` before checking bounds.
fn default_max_r() -> usize {
    usize::MAX
}

fn default_min_w() -> usize {
    1
}

/// Same sentinel as `default_max_r`, resolved against `N` in `validate()`.
fn default_max_w() -> usize {
    usize::MAX
}

fn default_adaptive_interval_ms() -> u64 {
    2000
}

fn default_relax_threshold() -> f64 {
    0.45
}

fn default_tighten_threshold() -> f64 {
    0.75
}

fn default_hlc_max_drift_ms() -> i64 {
    500
}

fn default_max_staleness_ms() -> i64 {
    3000
}

fn default_write_log_capacity() -> usize {
    1000
}

fn default_write_log_max_age_ms() -> i64 {
    300_000
}

fn default_hysteresis_lockout_ms() -> i64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

/// Node-wide configuration. Every field has a spec-mandated default so a
/// partial configuration document still deserializes to something valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default)]
    pub configured_peers: Vec<String>,

    #[serde(default = "default_n")]
    pub n: usize,

    #[serde(default = "default_initial_r")]
    pub initial_r: usize,

    #[serde(default = "default_initial_w")]
    pub initial_w: usize,

    #[serde(default = "default_replication_timeout_ms")]
    pub replication_timeout_ms: u64,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    #[serde(default)]
    pub adaptive_enabled: bool,

    #[serde(default = "default_min_r")]
    pub min_r: usize,

    #[serde(default = "default_max_r")]
    pub max_r: usize,

    #[serde(default = "default_min_w")]
    pub min_w: usize,

    #[serde(default = "default_max_w")]
    pub max_w: usize,

    #[serde(default = "default_adaptive_interval_ms")]
    pub adaptive_interval_ms: u64,

    #[serde(default = "default_relax_threshold")]
    pub relax_threshold: f64,

    #[serde(default = "default_tighten_threshold")]
    pub tighten_threshold: f64,

    #[serde(default = "default_hlc_max_drift_ms")]
    pub hlc_max_drift_ms: i64,

    #[serde(default = "default_max_staleness_ms")]
    pub max_staleness_ms: i64,

    #[serde(default)]
    pub reconciliation_enabled: bool,

    #[serde(default = "default_write_log_capacity")]
    pub write_log_capacity: usize,

    #[serde(default = "default_write_log_max_age_ms")]
    pub write_log_max_age_ms: i64,

    #[serde(default = "default_hysteresis_lockout_ms")]
    pub hysteresis_lockout_ms: i64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Default for Config {
    fn default() -> Self {
        let n = default_n();
        Self {
            node_id: default_node_id(),
            listen_address: default_listen_address(),
            configured_peers: Vec::new(),
            n,
            initial_r: default_initial_r(),
            initial_w: default_initial_w(),
            replication_timeout_ms: default_replication_timeout_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            adaptive_enabled: false,
            min_r: default_min_r(),
            max_r: n,
            min_w: default_min_w(),
            max_w: n,
            adaptive_interval_ms: default_adaptive_interval_ms(),
            relax_threshold: default_relax_threshold(),
            tighten_threshold: default_tighten_threshold(),
            hlc_max_drift_ms: default_hlc_max_drift_ms(),
            max_staleness_ms: default_max_staleness_ms(),
            reconciliation_enabled: false,
            write_log_capacity: default_write_log_capacity(),
            write_log_max_age_ms: default_write_log_max_age_ms(),
            hysteresis_lockout_ms: default_hysteresis_lockout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            tls: TlsConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Config {
    /// Resolves `maxR`/`maxW` to `N` when a partial config document left
    /// them at the serde sentinel (see `default_max_r`/`default_max_w`).
    /// A no-op for any document that set them explicitly.
    fn resolve_bound_defaults(&mut self) {
        if self.max_r == usize::MAX {
            self.max_r = self.n;
        }
        if self.max_w == usize::MAX {
            self.max_w = self.n;
        }
    }

    /// Startup validation: `N >= 3`, R/W within `[1,N]`, intersection holds,
    /// and the initial values sit within their configured bounds. Fatal
    /// before the server accepts requests if violated. Also resolves the
    /// `maxR=N`/`maxW=N` defaults that serde's per-field defaults can't
    /// express on their own.
    pub fn validate(&mut self) -> Result<()> {
        self.resolve_bound_defaults();

        if self.n < 3 {
            return Err(Error::Config(format!("N must be >= 3, got {}", self.n)));
        }
        if self.initial_r < 1 || self.initial_r > self.n {
            return Err(Error::Config(format!(
                "R must be in [1,{}], got {}",
                self.n, self.initial_r
            )));
        }
        if self.initial_w < 1 || self.initial_w > self.n {
            return Err(Error::Config(format!(
                "W must be in [1,{}], got {}",
                self.n, self.initial_w
            )));
        }
        if self.initial_r + self.initial_w <= self.n {
            return Err(Error::Config(format!(
                "R+W must be > N: R={} W={} N={}",
                self.initial_r, self.initial_w, self.n
            )));
        }
        if !(self.min_r <= self.initial_r && self.initial_r <= self.max_r) {
            return Err(Error::Config(format!(
                "initialR {} outside bounds [{},{}]",
                self.initial_r, self.min_r, self.max_r
            )));
        }
        if !(self.min_w <= self.initial_w && self.initial_w <= self.max_w) {
            return Err(Error::Config(format!(
                "initialW {} outside bounds [{},{}]",
                self.initial_w, self.min_w, self.max_w
            )));
        }
        Ok(())
    }

    pub fn parse_listen_addr(&self) -> Result<SocketAddr> {
        self.listen_address
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address '{}': {}", self.listen_address, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_small_cluster() {
        let mut cfg = Config::default();
        cfg.n = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_intersection_violation() {
        let mut cfg = Config {
            n: 5,
            initial_r: 2,
            initial_w: 2,
            max_r: 5,
            max_w: 5,
            ..Config::default()
        };
        cfg.n = 5;
        cfg.initial_r = 2;
        cfg.initial_w = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_deserializes_with_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.initial_r, 2);
        assert_eq!(cfg.hysteresis_lockout_ms, 5000);
    }

    #[test]
    fn partial_json_max_r_max_w_resolve_to_n_after_validate() {
        // A document that omits maxR/maxW gets the serde sentinel, not
        // N itself; validate() must resolve it against N=3 (the default)
        // rather than leaving it effectively unbounded.
        let mut cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_r, usize::MAX);
        assert_eq!(cfg.max_w, usize::MAX);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_r, cfg.n);
        assert_eq!(cfg.max_w, cfg.n);
    }

    #[test]
    fn explicit_max_r_max_w_survive_validate_untouched() {
        let mut cfg: Config = serde_json::from_str(r#"{"n": 5, "max_r": 5, "max_w": 5}"#).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_r, 5);
        assert_eq!(cfg.max_w, 5);
    }

    #[test]
    fn discovery_config_tag_roundtrips() {
        let cfg = DiscoveryConfig::Static {
            nodes: vec!["127.0.0.1:9090".into()],
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("static"));
        let back: DiscoveryConfig = serde_json::from_str(&json).unwrap();
        matches!(back, DiscoveryConfig::Static { .. });
    }
}
