//! Lumen Slice Manager
//!
//! Activates tenant slices (vOps): validates requests, reserves optical
//! interfaces in LinkDB, provisions the per-tenant Kafka topic triple, and
//! records the vOp in the registry. Deactivation reverses the sequence.

mod activation;
mod api;
mod state;
mod topics;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lumen_common::config::SliceConfig;
use lumen_common::linkdb::LinkDbClient;

#[tokio::main]
async fn main() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match SliceConfig::from_env() {
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

async fn run(config: SliceConfig) -> anyhow::Result<()> {
    let linkdb = LinkDbClient::new(&config.linkdb);
    let provisioner = topics::KafkaTopicProvisioner::new(
        &config.kafka,
        config.topic_partitions,
        config.topic_replication,
    )?;

    let listen_addr = config.listen_addr;
    let state = state::AppState::new(config, linkdb, Arc::new(provisioner));

    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("lumen-slice listening on {listen_addr}");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
