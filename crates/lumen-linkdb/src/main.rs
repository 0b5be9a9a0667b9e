//! Lumen LinkDB
//!
//! Holds all durable control-plane state:
//! - physical topology (POPs, routers, links)
//! - spectrum slot occupancy with first-fit allocation
//! - interface ownership per vOp
//! - vOp and connection registries

mod api;
mod store;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lumen_common::config::LinkDbConfig;

#[tokio::main]
async fn main() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match LinkDbConfig::from_env() {
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

async fn run(config: LinkDbConfig) -> anyhow::Result<()> {
    let state = api::AppState {
        store: store::Store::new(),
        default_slot_count: config.default_slot_count,
    };

    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("lumen-linkdb listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
