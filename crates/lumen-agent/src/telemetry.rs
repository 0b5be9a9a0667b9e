//! Per-connection telemetry sessions.
//!
//! One task per active connection samples the transceiver every
//! `TELEMETRY_INTERVAL_SEC` and publishes on the monitoring topic, keyed by
//! connection id. Sessions cancel within one sampling interval via a watch
//! channel; a hardware read failure logs and keeps the session alive so the
//! controller keeps seeing the endpoint once it recovers.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use lumen_common::protocol::{MonitoringEvent, TelemetryReport, TelemetrySample};

use crate::kafka::EventSink;
use crate::transceiver::Transceiver;
use crate::AgentIdentity;

struct Shared {
    transceiver: Arc<dyn Transceiver>,
    sink: Arc<dyn EventSink>,
    identity: AgentIdentity,
    interval: Duration,
}

struct Session {
    interface: String,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct SessionManager {
    shared: Arc<Shared>,
    sessions: DashMap<String, Session>,
}

impl SessionManager {
    pub fn new(
        transceiver: Arc<dyn Transceiver>,
        sink: Arc<dyn EventSink>,
        identity: AgentIdentity,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transceiver,
                sink,
                identity,
                interval,
            }),
            sessions: DashMap::new(),
        }
    }

    pub fn active_count(&self) -> u32 {
        self.sessions.len() as u32
    }

    pub fn interface_for(&self, connection_id: &str) -> Option<String> {
        self.sessions
            .get(connection_id)
            .map(|s| s.interface.clone())
    }

    /// Start (or restart) the session for a connection.
    pub async fn start(&self, connection_id: &str, interface: &str) {
        self.stop(connection_id).await;

        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run_session(
            self.shared.clone(),
            connection_id.to_string(),
            interface.to_string(),
            cancel_rx,
        ));
        self.sessions.insert(
            connection_id.to_string(),
            Session {
                interface: interface.to_string(),
                cancel,
                handle,
            },
        );
        tracing::info!(connection = %connection_id, interface, "telemetry session started");
    }

    /// Stop the session for a connection. Returns its interface, or `None`
    /// when this agent never held a session for it.
    pub async fn stop(&self, connection_id: &str) -> Option<String> {
        let (_, session) = self.sessions.remove(connection_id)?;
        let Session {
            interface,
            cancel,
            handle,
        } = session;
        let _ = cancel.send(true);
        // Cancellation completes within one sampling interval.
        if tokio::time::timeout(self.shared.interval, handle).await.is_err() {
            tracing::warn!(connection = %connection_id, "telemetry session did not stop in time");
        }
        tracing::info!(connection = %connection_id, interface = %interface, "telemetry session stopped");
        Some(interface)
    }

    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.stop(&id).await;
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    connection_id: String,
    interface: String,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(shared.interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match shared.transceiver.read_sample(&interface).await {
                    Ok(fields) => {
                        let event = MonitoringEvent::Telemetry(TelemetryReport {
                            agent_id: shared.identity.agent_id.clone(),
                            pop_id: shared.identity.pop_id.clone(),
                            router_id: shared.identity.router_id.clone(),
                            data: TelemetrySample {
                                connection_id: connection_id.clone(),
                                interface: interface.clone(),
                                timestamp: unix_now(),
                                fields,
                            },
                        });
                        if let Err(e) = shared.sink.publish_monitoring(&connection_id, &event).await {
                            tracing::warn!(connection = %connection_id, error = %e, "telemetry publish failed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(connection = %connection_id, interface = %interface, error = %e, "sample read failed");
                    }
                }
            }
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return;
                }
            }
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
