//! Top-level node: wires every component together from a validated
//! `Config` and drives the server accept loop plus background tasks.

use crate::adjuster::Adjuster;
use crate::ccs::CcsComputer;
use crate::clock::Clock;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::discovery::create_discovery;
use crate::error::Result;
use crate::handler::RequestHandler;
use crate::health::HealthProbe;
use crate::metrics_reader::MetricsReader;
use crate::quorum::{AdaptiveQuorum, QuorumProvider, StaticQuorumProvider};
use crate::reconciler::Reconciler;
use crate::rpc_client::RpcClient;
use crate::server::NodeServer;
use crate::store::Store;
use crate::transport::make_server_endpoint;
use crate::writelog::WriteLog;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CCS_WINDOW_SIZE: usize = 10;

/// Owns every long-lived component for a single node and the handles
/// needed to start or stop its background tasks.
pub struct Node {
    config: Config,
    server: Arc<NodeServer>,
    coordinator: Arc<Coordinator>,
    health_probe: Arc<HealthProbe>,
    reconciler: Option<Arc<Reconciler>>,
    adjuster: Option<Arc<Adjuster>>,
}

impl Node {
    /// Build a node from a validated configuration. Calls `config.validate()`
    /// itself; no background task is spawned before validation succeeds.
    pub async fn new(mut config: Config) -> Result<Self> {
        config.validate()?;

        let clock = Arc::new(Clock::new(config.node_id.clone(), config.hlc_max_drift_ms * 1_000_000));
        let store = Arc::new(Store::new());
        let metrics_reader = Arc::new(MetricsReader::new());

        let write_log = if config.reconciliation_enabled {
            Some(Arc::new(WriteLog::new(config.write_log_capacity, config.write_log_max_age_ms * 1_000_000)))
        } else {
            None
        };

        let rpc_client = Arc::new(RpcClient::new(&config).await?);
        let discovery: Arc<dyn crate::discovery::NodeDiscovery> = Arc::from(create_discovery(&config.discovery)?);

        let coordinator = Arc::new(Coordinator::new(&config, Arc::clone(&rpc_client), Arc::clone(&discovery), Arc::clone(&metrics_reader)));

        let health_probe = Arc::new(HealthProbe::new(
            config.node_id.clone(),
            Arc::clone(&clock),
            Arc::clone(&rpc_client),
            Duration::from_millis(config.probe_interval_ms),
            Arc::clone(&discovery),
        ));

        let adaptive_quorum: Option<Arc<AdaptiveQuorum>> = if config.adaptive_enabled {
            Some(Arc::new(AdaptiveQuorum::new(
                config.n,
                config.initial_r,
                config.initial_w,
                config.min_r,
                config.max_r,
                config.min_w,
                config.max_w,
                config.hysteresis_lockout_ms * 1_000_000,
            )))
        } else {
            None
        };

        let quorum_provider: Arc<dyn QuorumProvider> = match &adaptive_quorum {
            Some(q) => Arc::clone(q) as Arc<dyn QuorumProvider>,
            None => Arc::new(StaticQuorumProvider::new(config.initial_r, config.initial_w, config.n)),
        };

        let handler = Arc::new(RequestHandler::new(
            config.node_id.clone(),
            Arc::clone(&clock),
            Arc::clone(&store),
            write_log.clone(),
            Arc::clone(&coordinator),
            Arc::clone(&quorum_provider),
            Arc::clone(&metrics_reader),
            config.max_staleness_ms * 1_000_000,
        ));

        let endpoint = make_server_endpoint(&config).await?;
        let server = Arc::new(NodeServer::new(endpoint, handler));

        let reconciler = if config.reconciliation_enabled {
            let log = write_log.clone().expect("write log present when reconciliation enabled");
            Some(Arc::new(Reconciler::new(Arc::clone(&store), log)))
        } else {
            None
        };

        let adjuster = adaptive_quorum.map(|q| {
            let ccs = Arc::new(CcsComputer::new(CCS_WINDOW_SIZE));
            Arc::new(Adjuster::new(&config, ccs, Arc::clone(&metrics_reader), q, config.configured_peers.len()))
        });

        Ok(Self { config, server, coordinator, health_probe, reconciler, adjuster })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Start every background task (discovery sync, health probing,
    /// reconciliation listener, adjuster loop) and then run the server
    /// accept loop until the endpoint closes.
    pub async fn run(self: Arc<Self>) {
        self.coordinator.start().await;
        self.health_probe.start().await;

        if let Some(reconciler) = &self.reconciler {
            let healing_rx = self.health_probe.subscribe_healing();
            Arc::clone(reconciler).spawn_listener(healing_rx);
        }

        if let Some(adjuster) = &self.adjuster {
            Arc::clone(adjuster).spawn();
        }

        info!(node_id = %self.config.node_id, "node started");
        self.server.serve().await;
    }

    pub fn stop(&self) {
        self.health_probe.stop();
        self.coordinator.stop();
        if let Some(adjuster) = &self.adjuster {
            adjuster.stop();
        }
    }
}
