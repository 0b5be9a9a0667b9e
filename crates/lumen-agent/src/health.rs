//! Heartbeats on the tenant's health topic.

use std::sync::Arc;

use tokio::sync::watch;

use lumen_common::protocol::{HealthEvent, Heartbeat};

use crate::AgentState;

/// Publish a heartbeat every `HEALTH_INTERVAL_SEC` until shutdown.
pub async fn run(state: Arc<AgentState>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(state.config.health_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let event = HealthEvent::Heartbeat(Heartbeat {
                    agent_id: state.identity.agent_id.clone(),
                    pop_id: state.identity.pop_id.clone(),
                    router_id: state.identity.router_id.clone(),
                    uptime_s: state.uptime_s(),
                    interfaces: state.interface_count,
                    active_sessions: state.sessions.active_count(),
                    capabilities: vec!["cmis".into(), "coherent-telemetry".into()],
                });
                if let Err(e) = state
                    .sink
                    .publish_health(&state.identity.agent_id, &event)
                    .await
                {
                    tracing::warn!(error = %e, "heartbeat publish failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
