//! Lumen per-vOp controller
//!
//! One instance runs per tenant slice:
//! - computes paths and spectrum needs from LinkDB
//! - drives connection setup/reconfigure/teardown over `config_<vop>`
//! - consumes telemetry and acks from `monitoring_<vop>`
//! - runs the QoT closed loop with persistency and cooldown pacing

mod api;
mod engine;
mod kafka;
mod path;
mod qot;
mod sink;
mod state;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lumen_common::config::ControllerConfig;
use lumen_common::linkdb::LinkDbClient;

#[tokio::main]
async fn main() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match ControllerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!("fatal: {e:#}");
        std::process::exit(2);
    }
}

async fn run(config: ControllerConfig) -> anyhow::Result<()> {
    let vop_id = config.tenant.vop_id.clone();
    tracing::info!(vop = %vop_id, "lumen-controller starting");

    let linkdb = LinkDbClient::new(&config.linkdb);
    let sink = Arc::new(kafka::KafkaSink::new(
        &config.kafka,
        &config.tenant.topics.config,
    )?);

    // Unique group per instance: every controller sees the full monitoring
    // stream for its tenant.
    let instance = format!("{}-{}", vop_id, uuid::Uuid::now_v7().as_simple());
    let monitoring = kafka::subscribe(&config.kafka, &config.tenant.topics.monitoring, &instance)?;
    let health = kafka::subscribe(&config.kafka, &config.tenant.topics.health, &instance)?;

    let listen_addr = config.listen_addr;
    let (engine, engine_tx) = engine::Engine::new(config, linkdb.clone(), sink);

    tokio::spawn(kafka::pump_monitoring(monitoring, engine_tx.clone()));
    tokio::spawn(kafka::pump_health(health, engine_tx.clone()));
    let engine_handle = tokio::spawn(engine.run());

    let app_state = state::AppState::new(engine_tx, linkdb, vop_id);
    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("lumen-controller listening on {listen_addr}");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        result = engine_handle => {
            if let Err(e) = result {
                tracing::error!("engine task failed: {e}");
            }
        }
    }

    Ok(())
}
