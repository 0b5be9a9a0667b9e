//! The connection engine.
//!
//! A single task owns every connection of this vOp: the typed connection
//! map, per-connection QoT state, and the pending-command ack maps. REST
//! handlers and the Kafka consumers talk to it exclusively over the event
//! channel; replies travel back over oneshots. Command timeouts are timer
//! tasks that post a [`EngineEvent::CommandTimeout`] back into the channel,
//! so every state transition happens on the owner task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use lumen_common::config::{AdjustMode, ControllerConfig};
use lumen_common::ids;
use lumen_common::linkdb::{LinkDbClient, LinkDbError};
use lumen_common::models::{
    Connection, ConnectionStatus, EndpointConfig, InterfaceRef, TelemetryFields, VirtualOperator,
};
use lumen_common::protocol::{
    AckStatus, Command, CommandAction, CommandAck, HealthEvent, Heartbeat, MonitoringEvent,
    ReconfigParameters, SetupParameters, TargetPop, TeardownParameters, TelemetryReport,
};

use crate::path;
use crate::qot::{QotAction, QotMonitor, QotState};
use crate::sink::CommandSink;

/// Initial commanded tx-power when the operator doesn't specify one.
pub const DEFAULT_TX_DBM: f64 = -2.0;

const EVENT_CHANNEL_CAP: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("connection {0} not found")]
    NotFound(String),
    #[error("{0}")]
    NoSpectrum(String),
    #[error("{0}")]
    PathInfeasible(String),
    #[error("no free reserved interface in pop {0}")]
    NoEndpoint(String),
    #[error("connection {id} is {status}, cannot {op}")]
    InvalidState {
        id: String,
        status: ConnectionStatus,
        op: &'static str,
    },
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<LinkDbError> for EngineError {
    fn from(e: LinkDbError) -> Self {
        match e.kind() {
            "no_spectrum" => EngineError::NoSpectrum(e.to_string()),
            "path_infeasible" => EngineError::PathInfeasible(e.to_string()),
            _ => EngineError::Infrastructure(e.to_string()),
        }
    }
}

/// Operator request to plan a new connection.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConnectionRequest {
    pub src_pop: String,
    pub dst_pop: String,
    pub bandwidth_gbps: u32,
    #[serde(default)]
    pub modulation: Option<String>,
    #[serde(default)]
    pub initial_tx_dbm: Option<f64>,
}

/// Connection plus live QoT context, returned by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionView {
    #[serde(flatten)]
    pub connection: Connection,
    pub bad_count: u32,
    pub last_telemetry: Option<TelemetryFields>,
}

/// Agent presence derived from health heartbeats.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub agent_id: String,
    pub pop_id: String,
    pub router_id: String,
    pub active_sessions: u32,
    pub last_seen: DateTime<Utc>,
}

/// Requests from REST handlers, replied to over oneshots.
#[derive(Debug)]
pub enum ApiRequest {
    Create {
        request: CreateConnectionRequest,
        reply: oneshot::Sender<Result<Connection, EngineError>>,
    },
    Setup {
        id: String,
        reply: oneshot::Sender<Result<Connection, EngineError>>,
    },
    Reconfigure {
        id: String,
        reply: oneshot::Sender<Result<Connection, EngineError>>,
    },
    Teardown {
        id: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Status {
        reply: oneshot::Sender<Vec<ConnectionView>>,
    },
    Agents {
        reply: oneshot::Sender<Vec<AgentView>>,
    },
}

/// Everything the engine reacts to.
#[derive(Debug)]
pub enum EngineEvent {
    Api(ApiRequest),
    Monitoring(MonitoringEvent),
    Health(HealthEvent),
    CommandTimeout { command_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Setup,
    Reconfig,
    Teardown,
}

struct Pending {
    connection_id: String,
    kind: CommandKind,
    expected: usize,
    acked: HashSet<String>,
}

struct Managed {
    conn: Connection,
    qot: QotState,
}

pub struct Engine<S> {
    cfg: ControllerConfig,
    linkdb: LinkDbClient,
    sink: Arc<S>,
    monitor: QotMonitor,
    connections: HashMap<String, Managed>,
    pending: HashMap<String, Pending>,
    agents: HashMap<String, AgentView>,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: mpsc::Receiver<EngineEvent>,
}

impl<S: CommandSink> Engine<S> {
    pub fn new(
        cfg: ControllerConfig,
        linkdb: LinkDbClient,
        sink: Arc<S>,
    ) -> (Self, mpsc::Sender<EngineEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAP);
        let monitor = QotMonitor::new(cfg.qot.clone());
        let engine = Self {
            cfg,
            linkdb,
            sink,
            monitor,
            connections: HashMap::new(),
            pending: HashMap::new(),
            agents: HashMap::new(),
            events_tx: tx.clone(),
            events_rx: rx,
        };
        (engine, tx)
    }

    /// Rebuild the connection map from LinkDB records, then process events
    /// until every sender is dropped.
    pub async fn run(mut self) {
        if let Err(e) = self.bootstrap().await {
            tracing::warn!(error = %e, "bootstrap from linkdb failed; starting empty");
        }
        while let Some(event) = self.events_rx.recv().await {
            self.handle(event).await;
        }
        tracing::info!("engine stopped");
    }

    /// Connections and agents are stateless process-side: anything durable
    /// was mirrored to LinkDB. In-flight commands from a previous run are
    /// unresolvable, so those connections fail out with their slots freed.
    async fn bootstrap(&mut self) -> Result<(), LinkDbError> {
        let records = self.linkdb.list_connections().await?;
        for mut conn in records
            .into_iter()
            .filter(|c| c.vop_id == self.cfg.tenant.vop_id)
        {
            match conn.status {
                ConnectionStatus::SetupPending
                | ConnectionStatus::ReconfigPending
                | ConnectionStatus::Teardown => {
                    tracing::warn!(
                        connection = %conn.id,
                        status = %conn.status,
                        "failing in-flight connection from previous run"
                    );
                    let _ = self.linkdb.release(&conn.id).await;
                    conn.status = ConnectionStatus::Failed;
                    conn.slot_range = None;
                    let _ = self.linkdb.upsert_connection(&conn).await;
                }
                ConnectionStatus::Deleted | ConnectionStatus::Failed => {}
                _ => {
                    self.connections.insert(
                        conn.id.clone(),
                        Managed {
                            conn,
                            qot: QotState::default(),
                        },
                    );
                }
            }
        }
        tracing::info!(connections = self.connections.len(), "engine bootstrapped");
        Ok(())
    }

    pub async fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Api(request) => self.handle_api(request).await,
            EngineEvent::Monitoring(MonitoringEvent::Telemetry(report)) => {
                self.handle_telemetry(report).await;
            }
            EngineEvent::Monitoring(MonitoringEvent::Ack(ack)) => self.handle_ack(ack).await,
            EngineEvent::Health(HealthEvent::Heartbeat(hb)) => self.handle_heartbeat(hb),
            EngineEvent::CommandTimeout { command_id } => self.handle_timeout(&command_id).await,
        }
    }

    async fn handle_api(&mut self, request: ApiRequest) {
        match request {
            ApiRequest::Create { request, reply } => {
                let _ = reply.send(self.create(request).await);
            }
            ApiRequest::Setup { id, reply } => {
                let _ = reply.send(self.setup(&id).await);
            }
            ApiRequest::Reconfigure { id, reply } => {
                let _ = reply.send(self.reconfigure(&id).await);
            }
            ApiRequest::Teardown { id, reply } => {
                let _ = reply.send(self.teardown(&id).await);
            }
            ApiRequest::Status { reply } => {
                let _ = reply.send(self.views());
            }
            ApiRequest::Agents { reply } => {
                let _ = reply.send(self.agents.values().cloned().collect());
            }
        }
    }

    // ── Lifecycle operations ────────────────────────────────────

    async fn create(
        &mut self,
        request: CreateConnectionRequest,
    ) -> Result<Connection, EngineError> {
        if request.src_pop == request.dst_pop {
            return Err(EngineError::Validation(
                "source and destination pop must differ".into(),
            ));
        }
        let modulation = request
            .modulation
            .clone()
            .unwrap_or_else(|| path::default_modulation(request.bandwidth_gbps).to_string());
        let slots = path::required_slots(request.bandwidth_gbps, &modulation).ok_or_else(|| {
            EngineError::Validation(format!(
                "unsupported service: {} Gb/s over {modulation}",
                request.bandwidth_gbps
            ))
        })?;

        let route = self
            .linkdb
            .paths(&request.src_pop, &request.dst_pop, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::PathInfeasible(format!(
                    "no route between {} and {}",
                    request.src_pop, request.dst_pop
                ))
            })?;

        let vop = self
            .linkdb
            .get_vop(&self.cfg.tenant.vop_id)
            .await?
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "vOp {} is not registered",
                    self.cfg.tenant.vop_id
                ))
            })?;

        let in_use: HashSet<(String, String)> = self
            .connections
            .values()
            .flat_map(|m| {
                m.conn
                    .endpoints
                    .iter()
                    .map(|e| (e.pop_id.clone(), e.port_id.clone()))
            })
            .collect();
        let src_if = select_endpoint(&vop, &request.src_pop, &in_use)
            .ok_or_else(|| EngineError::NoEndpoint(request.src_pop.clone()))?;
        let dst_if = select_endpoint(&vop, &request.dst_pop, &in_use)
            .ok_or_else(|| EngineError::NoEndpoint(request.dst_pop.clone()))?;

        let id = ids::connection_id();
        let alloc = self.linkdb.allocate(&id, &route.links, slots).await?;
        let frequency = path::center_frequency(alloc.range);
        let tx = self
            .monitor
            .clamp_tx(request.initial_tx_dbm.unwrap_or(DEFAULT_TX_DBM));

        let endpoints = vec![
            endpoint(&src_if, frequency, tx),
            endpoint(&dst_if, frequency, tx),
        ];
        let last_tx_dbm = endpoints.iter().map(|e| (e.key(), tx)).collect();
        let conn = Connection {
            id: id.clone(),
            vop_id: self.cfg.tenant.vop_id.clone(),
            src_pop: request.src_pop,
            dst_pop: request.dst_pop,
            endpoints,
            path: route.links,
            slot_range: Some(alloc.range),
            status: ConnectionStatus::Planned,
            last_tx_dbm,
            created_at: Utc::now(),
        };

        tracing::info!(
            connection = %id,
            path = ?conn.path,
            slots = slots,
            frequency_thz = frequency,
            "connection planned"
        );
        self.mirror(&conn).await;
        self.connections.insert(
            id,
            Managed {
                conn: conn.clone(),
                qot: QotState::default(),
            },
        );
        Ok(conn)
    }

    async fn setup(&mut self, id: &str) -> Result<Connection, EngineError> {
        let conn = {
            let managed = self
                .connections
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            if managed.conn.status != ConnectionStatus::Planned {
                return Err(EngineError::InvalidState {
                    id: id.to_string(),
                    status: managed.conn.status,
                    op: "setup",
                });
            }
            managed.conn.status = ConnectionStatus::SetupPending;
            managed.conn.clone()
        };

        let command = Command::new(
            TargetPop::All,
            CommandAction::Setup(SetupParameters {
                connection_id: conn.id.clone(),
                endpoint_config: conn.endpoints.clone(),
            }),
        );
        tracing::info!(connection = %conn.id, command = %command.command_id, "issuing setup");
        self.dispatch(command, &conn.id, CommandKind::Setup, conn.endpoints.len())
            .await?;
        self.mirror(&conn).await;
        Ok(conn)
    }

    /// Operator-triggered reconfiguration: one tx-power step on every
    /// endpoint, same pipeline as the QoT loop.
    async fn reconfigure(&mut self, id: &str) -> Result<Connection, EngineError> {
        let (status, sample, first_port) = {
            let managed = self
                .connections
                .get(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            (
                managed.conn.status,
                managed.qot.last_sample().copied(),
                managed.conn.endpoints[0].port_id.clone(),
            )
        };
        if !matches!(
            status,
            ConnectionStatus::Active | ConnectionStatus::Degraded
        ) {
            return Err(EngineError::InvalidState {
                id: id.to_string(),
                status,
                op: "reconfigure",
            });
        }

        let action = QotAction {
            bad_count: 0,
            osnr: sample.map(|f| f.osnr).unwrap_or_default(),
            pre_fec_ber: sample.map(|f| f.pre_fec_ber).unwrap_or_default(),
            agent_id: "operator".into(),
            interface: first_port,
        };
        self.issue_reconfig(id, action, AdjustMode::Both).await;

        self.connections
            .get(id)
            .map(|m| m.conn.clone())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    async fn teardown(&mut self, id: &str) -> Result<(), EngineError> {
        let status = {
            let managed = self
                .connections
                .get(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            managed.conn.status
        };

        match status {
            // Nothing was ever sent to the agents; free the plan locally.
            ConnectionStatus::Idle | ConnectionStatus::Planned | ConnectionStatus::Failed => {
                self.connections.remove(id);
                if let Err(e) = self.linkdb.release(id).await {
                    tracing::warn!(connection = %id, error = %e, "release failed");
                }
                tracing::info!(connection = %id, "planned connection discarded");
                return Ok(());
            }
            ConnectionStatus::Teardown => return Ok(()),
            _ => {}
        }

        let conn = {
            let managed = self.connections.get_mut(id).expect("checked above");
            managed.conn.status = ConnectionStatus::Teardown;
            managed.conn.clone()
        };
        let command = Command::new(
            TargetPop::All,
            CommandAction::Teardown(TeardownParameters {
                connection_id: id.to_string(),
            }),
        );
        tracing::info!(connection = %id, command = %command.command_id, "issuing teardown");
        self.dispatch(command, id, CommandKind::Teardown, conn.endpoints.len())
            .await?;
        self.mirror(&conn).await;
        Ok(())
    }

    // ── Command plumbing ────────────────────────────────────────

    /// Publish a command, register its ack map, and arm the timeout timer.
    async fn dispatch(
        &mut self,
        command: Command,
        connection_id: &str,
        kind: CommandKind,
        expected: usize,
    ) -> Result<(), EngineError> {
        if let Err(e) = self.sink.publish(&command).await {
            tracing::error!(connection = %connection_id, error = %e, "command publish failed");
            match kind {
                CommandKind::Teardown => self.finalize_teardown(connection_id).await,
                _ => self.fail_connection(connection_id, "command publish failed").await,
            }
            return Err(EngineError::Infrastructure(e.to_string()));
        }

        self.pending.insert(
            command.command_id.clone(),
            Pending {
                connection_id: connection_id.to_string(),
                kind,
                expected,
                acked: HashSet::new(),
            },
        );

        let tx = self.events_tx.clone();
        let command_id = command.command_id;
        let timeout = self.cfg.command_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(EngineEvent::CommandTimeout { command_id }).await;
        });
        Ok(())
    }

    async fn handle_ack(&mut self, ack: CommandAck) {
        let Some(pending) = self.pending.get_mut(&ack.command_id) else {
            tracing::debug!(command = %ack.command_id, agent = %ack.agent_id, "ack for unknown command ignored");
            return;
        };
        let connection_id = pending.connection_id.clone();

        match ack.status {
            AckStatus::Error => {
                let kind = pending.kind;
                self.pending.remove(&ack.command_id);
                tracing::warn!(
                    command = %ack.command_id,
                    agent = %ack.agent_id,
                    details = %ack.details,
                    "command nacked"
                );
                match kind {
                    CommandKind::Teardown => self.finalize_teardown(&connection_id).await,
                    _ => self.fail_connection(&connection_id, "agent nack").await,
                }
            }
            AckStatus::Ok => {
                pending.acked.insert(ack.agent_id.clone());
                if pending.acked.len() < pending.expected {
                    return;
                }
                let kind = pending.kind;
                self.pending.remove(&ack.command_id);
                match kind {
                    CommandKind::Setup => self.complete_setup(&connection_id).await,
                    CommandKind::Reconfig => self.complete_reconfig(&connection_id).await,
                    CommandKind::Teardown => self.finalize_teardown(&connection_id).await,
                }
            }
        }
    }

    async fn handle_timeout(&mut self, command_id: &str) {
        // Resolved commands have no entry left; stale timers are no-ops.
        let Some(pending) = self.pending.remove(command_id) else {
            return;
        };
        tracing::warn!(
            command = %command_id,
            connection = %pending.connection_id,
            acked = pending.acked.len(),
            expected = pending.expected,
            "command timed out"
        );
        match pending.kind {
            CommandKind::Teardown => self.finalize_teardown(&pending.connection_id).await,
            _ => {
                self.fail_connection(&pending.connection_id, "command timeout")
                    .await;
            }
        }
    }

    async fn complete_setup(&mut self, id: &str) {
        let conn = {
            let Some(managed) = self.connections.get_mut(id) else {
                return;
            };
            managed.conn.status = ConnectionStatus::Active;
            managed.conn.clone()
        };
        tracing::info!(connection = %id, "connection active");
        self.mirror(&conn).await;
        if let Err(e) = self
            .linkdb
            .set_connection_status(id, ConnectionStatus::Active)
            .await
        {
            tracing::warn!(connection = %id, error = %e, "slot activation failed");
        }
    }

    async fn complete_reconfig(&mut self, id: &str) {
        let conn = {
            let Some(managed) = self.connections.get_mut(id) else {
                return;
            };
            managed.conn.status = ConnectionStatus::Active;
            managed.conn.clone()
        };
        tracing::info!(connection = %id, "reconfiguration applied");
        self.mirror(&conn).await;
    }

    async fn finalize_teardown(&mut self, id: &str) {
        self.connections.remove(id);
        if let Err(e) = self.linkdb.release(id).await {
            tracing::warn!(connection = %id, error = %e, "release failed");
        }
        tracing::info!(connection = %id, "connection deleted");
    }

    async fn fail_connection(&mut self, id: &str, reason: &str) {
        let conn = {
            let Some(managed) = self.connections.get_mut(id) else {
                return;
            };
            managed.conn.status = ConnectionStatus::Failed;
            managed.conn.slot_range = None;
            managed.conn.clone()
        };
        tracing::warn!(connection = %id, reason, "connection failed");
        if let Err(e) = self.linkdb.release(id).await {
            tracing::warn!(connection = %id, error = %e, "release failed");
        }
        self.mirror(&conn).await;
    }

    // ── Telemetry & QoT ─────────────────────────────────────────

    async fn handle_telemetry(&mut self, report: TelemetryReport) {
        let id = report.data.connection_id.clone();
        let (action, bad_count, status) = {
            let Some(managed) = self.connections.get_mut(&id) else {
                tracing::debug!(connection = %id, "telemetry for unknown connection ignored");
                return;
            };
            if !managed.conn.status.is_live() {
                tracing::debug!(
                    connection = %id,
                    status = %managed.conn.status,
                    "telemetry outside live states ignored"
                );
                return;
            }
            let action = self
                .monitor
                .observe(&mut managed.qot, &report, Instant::now());
            (action, managed.qot.bad_count(), managed.conn.status)
        };

        let may_act = matches!(
            status,
            ConnectionStatus::Active | ConnectionStatus::Degraded
        );
        if let Some(action) = action {
            if self.cfg.qot.enabled && may_act {
                tracing::warn!(
                    connection = %id,
                    osnr = action.osnr,
                    pre_fec_ber = action.pre_fec_ber,
                    bad_count = action.bad_count,
                    "persistent QoT degradation"
                );
                self.issue_reconfig(&id, action, self.cfg.qot.adjust_mode)
                    .await;
                return;
            }
        }

        // No action fired: keep the ACTIVE <-> DEGRADED pair in sync with
        // the bad streak (a streak can sit above the persistency threshold
        // while the cooldown holds reconfiguration back).
        if status == ConnectionStatus::Active && bad_count >= self.cfg.qot.persistency_samples {
            self.transition(&id, ConnectionStatus::Degraded).await;
        } else if status == ConnectionStatus::Degraded && bad_count == 0 {
            tracing::info!(connection = %id, "QoT recovered");
            self.transition(&id, ConnectionStatus::Active).await;
        }
    }

    async fn issue_reconfig(&mut self, id: &str, action: QotAction, mode: AdjustMode) {
        let (command, conn, expected) = {
            let Some(managed) = self.connections.get_mut(id) else {
                return;
            };
            let selected: Vec<usize> = match mode {
                AdjustMode::Both => (0..managed.conn.endpoints.len()).collect(),
                AdjustMode::One => vec![managed
                    .conn
                    .endpoints
                    .iter()
                    .position(|e| e.port_id == action.interface)
                    .unwrap_or(0)],
            };

            let mut updated = Vec::with_capacity(selected.len());
            let mut headroom = false;
            for i in selected {
                let ep = &mut managed.conn.endpoints[i];
                let key = ep.key();
                let last = managed
                    .conn
                    .last_tx_dbm
                    .get(&key)
                    .copied()
                    .unwrap_or(ep.tx_power_level);
                let new_tx = self.monitor.step_tx(last);
                headroom |= new_tx > last;
                ep.tx_power_level = new_tx;
                managed.conn.last_tx_dbm.insert(key, new_tx);
                updated.push(ep.clone());
            }
            if !headroom {
                // Keep reconfiguring per policy, but the operator needs to
                // know power adjustments have stopped helping.
                tracing::warn!(
                    connection = %id,
                    "tx-power at upper bound, reconfiguration exhausted; operator intervention needed"
                );
            }

            let command = Command::new(
                TargetPop::All,
                CommandAction::Reconfig(ReconfigParameters {
                    connection_id: id.to_string(),
                    endpoint_config: updated.clone(),
                    reason: action.reason(),
                }),
            );
            managed.conn.status = ConnectionStatus::ReconfigPending;
            (command, managed.conn.clone(), updated.len())
        };

        tracing::info!(
            connection = %id,
            command = %command.command_id,
            endpoints = expected,
            "issuing reconfiguration"
        );
        if self
            .dispatch(command, id, CommandKind::Reconfig, expected)
            .await
            .is_ok()
        {
            self.mirror(&conn).await;
        }
    }

    async fn transition(&mut self, id: &str, status: ConnectionStatus) {
        let conn = {
            let Some(managed) = self.connections.get_mut(id) else {
                return;
            };
            managed.conn.status = status;
            managed.conn.clone()
        };
        self.mirror(&conn).await;
    }

    fn handle_heartbeat(&mut self, hb: Heartbeat) {
        self.agents.insert(
            hb.agent_id.clone(),
            AgentView {
                agent_id: hb.agent_id,
                pop_id: hb.pop_id,
                router_id: hb.router_id,
                active_sessions: hb.active_sessions,
                last_seen: Utc::now(),
            },
        );
    }

    // ── Introspection ───────────────────────────────────────────

    fn views(&self) -> Vec<ConnectionView> {
        self.connections
            .values()
            .map(|m| ConnectionView {
                connection: m.conn.clone(),
                bad_count: m.qot.bad_count(),
                last_telemetry: m.qot.last_sample().copied(),
            })
            .collect()
    }

    /// Current status of one connection, if the engine still tracks it.
    pub fn connection_status(&self, id: &str) -> Option<ConnectionStatus> {
        self.connections.get(id).map(|m| m.conn.status)
    }

    /// Mirror the connection record into LinkDB; controllers stay stateless.
    async fn mirror(&self, conn: &Connection) {
        if let Err(e) = self.linkdb.upsert_connection(conn).await {
            tracing::warn!(connection = %conn.id, error = %e, "failed to mirror connection record");
        }
    }
}

fn select_endpoint(
    vop: &VirtualOperator,
    pop: &str,
    in_use: &HashSet<(String, String)>,
) -> Option<InterfaceRef> {
    vop.interfaces
        .iter()
        .find(|r| {
            r.pop_id == pop && !in_use.contains(&(r.pop_id.clone(), r.interface_id.clone()))
        })
        .cloned()
}

fn endpoint(iface: &InterfaceRef, frequency: f64, tx_power_level: f64) -> EndpointConfig {
    EndpointConfig {
        pop_id: iface.pop_id.clone(),
        node_id: iface.router_id.clone(),
        port_id: iface.interface_id.clone(),
        frequency,
        tx_power_level,
    }
}
