//! Lumen SONiC Agent
//!
//! Per-switch daemon:
//! - consumes commands from `config_<vop>` (consumer group = agent id)
//! - drives coherent transceivers through the CMIS capability
//! - publishes telemetry and acks on `monitoring_<vop>`
//! - heartbeats on `health_<vop>`
//! - resumes telemetry sessions from LinkDB records on restart

mod commands;
mod health;
mod kafka;
mod telemetry;
mod transceiver;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use lumen_common::config::AgentConfig;
use lumen_common::linkdb::LinkDbClient;

use kafka::EventSink;
use transceiver::Transceiver;

/// Lumen per-switch optical agent.
#[derive(Parser, Debug)]
#[command(name = "lumen-agent", about = "Lumen per-switch optical agent")]
struct Cli {
    /// POP this switch belongs to.
    #[arg(long)]
    pop_id: String,

    /// Router identity within the POP.
    #[arg(long)]
    router_id: String,

    /// Agent id override (defaults to agt-<pop>-<router>).
    #[arg(long)]
    agent_id: Option<String>,
}

/// Who this agent is, stamped on every published event.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub pop_id: String,
    pub router_id: String,
}

/// Shared agent state accessible from all tasks.
pub struct AgentState {
    pub identity: AgentIdentity,
    pub config: AgentConfig,
    pub transceiver: Arc<dyn Transceiver>,
    pub sink: Arc<dyn EventSink>,
    pub sessions: telemetry::SessionManager,
    pub started_at: std::time::Instant,
    /// Optical interfaces on this router, per LinkDB topology.
    pub interface_count: u32,
    /// Hardware access is serialized per interface.
    interface_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Interfaces that failed a hardware operation, with the last error.
    pub unhealthy: DashMap<String, String>,
}

impl AgentState {
    pub fn lock_for(&self, interface: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.interface_locks
            .entry(interface.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn uptime_s(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let cli = Cli::parse();
    let config = match AgentConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        tracing::error!("fatal: {e:#}");
        std::process::exit(2);
    }
}

async fn run(cli: Cli, config: AgentConfig) -> anyhow::Result<()> {
    let identity = AgentIdentity {
        agent_id: cli
            .agent_id
            .unwrap_or_else(|| format!("agt-{}-{}", cli.pop_id, cli.router_id)),
        pop_id: cli.pop_id,
        router_id: cli.router_id,
    };
    tracing::info!(
        agent = %identity.agent_id,
        pop = %identity.pop_id,
        vop = %config.tenant.vop_id,
        mock = config.mock_hardware,
        "lumen-agent starting"
    );

    let transceiver: Arc<dyn Transceiver> = if config.mock_hardware {
        Arc::new(transceiver::MockTransceiver::new())
    } else {
        Arc::new(transceiver::SonicCliTransceiver::new())
    };

    let publisher = Arc::new(kafka::KafkaPublisher::new(&config)?);
    let consumer = kafka::config_consumer(&config, &identity.agent_id)?;
    let linkdb = LinkDbClient::new(&config.linkdb);

    let sink: Arc<dyn EventSink> = publisher.clone();
    let sessions = telemetry::SessionManager::new(
        transceiver.clone(),
        sink.clone(),
        identity.clone(),
        config.telemetry_interval,
    );

    let interface_count = count_interfaces(&linkdb, &identity).await;
    let state = Arc::new(AgentState {
        identity,
        config,
        transceiver,
        sink,
        sessions,
        started_at: std::time::Instant::now(),
        interface_count,
        interface_locks: DashMap::new(),
        unhealthy: DashMap::new(),
    });

    resume_sessions(&state, &linkdb).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let command_state = state.clone();
    let command_handle = tokio::spawn(commands::run(command_state, consumer, shutdown_rx.clone()));

    let health_state = state.clone();
    let _health_handle = tokio::spawn(health::run(health_state, shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            let _ = shutdown_tx.send(true);
        }
        result = command_handle => {
            if let Err(e) = result {
                tracing::error!("command loop failed: {e}");
            }
        }
    }

    // Stop sampling, then drain acks and telemetry still in flight.
    state.sessions.stop_all().await;
    publisher.flush(Duration::from_secs(5));

    tracing::info!("lumen-agent stopped");
    Ok(())
}

/// Interfaces on this router, per LinkDB topology. Zero when unreachable;
/// the heartbeat is advisory.
async fn count_interfaces(linkdb: &LinkDbClient, identity: &AgentIdentity) -> u32 {
    match linkdb.topology().await {
        Ok(topo) => topo
            .pops
            .iter()
            .filter(|p| p.id == identity.pop_id)
            .flat_map(|p| &p.routers)
            .filter(|r| r.id == identity.router_id)
            .map(|r| r.interfaces.len() as u32)
            .sum(),
        Err(e) => {
            tracing::warn!(error = %e, "topology lookup failed");
            0
        }
    }
}

/// Restart telemetry for every live connection with an endpoint on this
/// switch. Agents hold no durable state; LinkDB records are the truth.
async fn resume_sessions(state: &Arc<AgentState>, linkdb: &LinkDbClient) {
    let connections = match linkdb.list_connections().await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "connection lookup failed; no sessions resumed");
            return;
        }
    };

    for conn in connections {
        if conn.vop_id != state.config.tenant.vop_id || !conn.status.is_live() {
            continue;
        }
        for ep in &conn.endpoints {
            if ep.pop_id == state.identity.pop_id && ep.node_id == state.identity.router_id {
                tracing::info!(connection = %conn.id, interface = %ep.port_id, "resuming telemetry session");
                state.sessions.start(&conn.id, &ep.port_id).await;
            }
        }
    }
}
