//! Command execution.
//!
//! The consumer loop parses each message on the config topic, filters by
//! `target_pop`, consults the idempotence cache, executes against the
//! transceiver, and acks on the monitoring topic. Duplicate command ids
//! replay the prior ack without touching hardware. An agent only acks
//! commands that address one of its own endpoints, so the controller's ack
//! count matches the endpoint count.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::StreamConsumer;
use rdkafka::Message;
use tokio::sync::watch;

use lumen_common::protocol::{
    AckStatus, Command, CommandAck, CommandAction, ReconfigParameters, SetupParameters,
};

use crate::AgentState;

/// Recently processed command ids kept for duplicate suppression.
const ACK_CACHE_CAPACITY: usize = 256;

/// Bounded LRU of command id → emitted ack.
pub struct AckCache {
    capacity: usize,
    order: VecDeque<String>,
    acks: HashMap<String, CommandAck>,
}

impl AckCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            acks: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, command_id: &str) -> Option<&CommandAck> {
        self.acks.get(command_id)
    }

    pub fn insert(&mut self, ack: CommandAck) {
        if self.acks.contains_key(&ack.command_id) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.acks.remove(&oldest);
            }
        }
        self.order.push_back(ack.command_id.clone());
        self.acks.insert(ack.command_id.clone(), ack);
    }
}

/// Consume the config topic until shutdown.
pub async fn run(
    state: Arc<AgentState>,
    consumer: StreamConsumer,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cache = AckCache::new(ACK_CACHE_CAPACITY);
    loop {
        tokio::select! {
            result = consumer.recv() => match result {
                Err(e) => {
                    tracing::warn!(error = %e, "config consumer error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok(msg) => {
                    let Some(payload) = msg.payload() else { continue };
                    handle_message(&state, &mut cache, payload).await;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("command loop stopped");
                    return;
                }
            }
        }
    }
}

/// Process one raw config-topic message.
pub async fn handle_message(state: &AgentState, cache: &mut AckCache, payload: &[u8]) {
    let command: Command = match serde_json::from_slice(payload) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "malformed command");
            // Schema rejections still ack when the id is recoverable, so the
            // controller can fail the command instead of waiting it out.
            if let Some(command_id) = extract_command_id(payload) {
                let ack = CommandAck {
                    command_id: command_id.clone(),
                    agent_id: state.identity.agent_id.clone(),
                    status: AckStatus::Error,
                    details: serde_json::json!({"reason": "schema", "error": e.to_string()}),
                };
                publish_ack(state, &command_id, &ack).await;
            }
            return;
        }
    };

    if !command.target_pop.matches(&state.identity.pop_id) {
        tracing::debug!(command = %command.command_id, "command for another pop ignored");
        return;
    }

    let ack_key = command
        .connection_id()
        .unwrap_or(&command.command_id)
        .to_string();

    if let Some(prior) = cache.get(&command.command_id) {
        tracing::info!(command = %command.command_id, "duplicate command, replaying ack");
        let prior = prior.clone();
        publish_ack(state, &ack_key, &prior).await;
        return;
    }

    let Some(ack) = execute(state, &command).await else {
        tracing::debug!(command = %command.command_id, "command addresses no local endpoint");
        return;
    };
    cache.insert(ack.clone());
    publish_ack(state, &ack_key, &ack).await;
}

/// Execute a command against the hardware. Returns `None` when the command
/// addresses no endpoint on this agent.
async fn execute(state: &AgentState, command: &Command) -> Option<CommandAck> {
    match &command.action {
        CommandAction::Setup(params) => setup(state, command, params).await,
        CommandAction::Reconfig(params) => reconfig(state, command, params).await,
        CommandAction::Teardown(params) => {
            let interface = state.sessions.stop(&params.connection_id).await?;
            let lock = state.lock_for(&interface);
            let _guard = lock.lock().await;
            match state.transceiver.disable(&interface).await {
                Ok(()) => Some(ok_ack(
                    state,
                    command,
                    serde_json::json!({
                        "connection_id": params.connection_id,
                        "interface": interface,
                    }),
                )),
                Err(e) => {
                    state.unhealthy.insert(interface.clone(), e.to_string());
                    Some(error_ack(
                        state,
                        command,
                        serde_json::json!({
                            "reason": "hardware",
                            "interface": interface,
                            "error": e.to_string(),
                        }),
                    ))
                }
            }
        }
        CommandAction::HealthCheck(_) => Some(ok_ack(
            state,
            command,
            serde_json::json!({
                "agent_id": state.identity.agent_id,
                "pop_id": state.identity.pop_id,
                "router_id": state.identity.router_id,
                "uptime_s": state.uptime_s(),
                "interfaces": state.interface_count,
                "active_sessions": state.sessions.active_count(),
                "unhealthy": state.unhealthy.iter().map(|e| e.key().clone()).collect::<Vec<_>>(),
            }),
        )),
    }
}

async fn setup(
    state: &AgentState,
    command: &Command,
    params: &SetupParameters,
) -> Option<CommandAck> {
    let local = local_endpoints(state, &params.endpoint_config);
    if local.is_empty() {
        return None;
    }

    let mut applied = 0;
    let mut errors = Vec::new();
    for ep in local {
        let lock = state.lock_for(&ep.port_id);
        let _guard = lock.lock().await;

        if !state.transceiver.presence(&ep.port_id).await {
            errors.push(format!("{}: transceiver absent", ep.port_id));
            continue;
        }
        match state
            .transceiver
            .configure(&ep.port_id, ep.frequency, ep.tx_power_level)
            .await
        {
            Ok(()) => {
                state.unhealthy.remove(&ep.port_id);
                state.sessions.start(&params.connection_id, &ep.port_id).await;
                applied += 1;
            }
            Err(e) => {
                state.unhealthy.insert(ep.port_id.clone(), e.to_string());
                errors.push(format!("{}: {e}", ep.port_id));
            }
        }
    }

    Some(finish(state, command, &params.connection_id, applied, errors))
}

async fn reconfig(
    state: &AgentState,
    command: &Command,
    params: &ReconfigParameters,
) -> Option<CommandAck> {
    let local = local_endpoints(state, &params.endpoint_config);
    if local.is_empty() {
        return None;
    }
    tracing::info!(
        connection = %params.connection_id,
        reason = %params.reason,
        "applying reconfiguration"
    );

    let mut applied = 0;
    let mut errors = Vec::new();
    for ep in local {
        let lock = state.lock_for(&ep.port_id);
        let _guard = lock.lock().await;
        match state
            .transceiver
            .configure(&ep.port_id, ep.frequency, ep.tx_power_level)
            .await
        {
            Ok(()) => {
                state.unhealthy.remove(&ep.port_id);
                // The sampling task restarts; the carrier stays up.
                state.sessions.start(&params.connection_id, &ep.port_id).await;
                applied += 1;
            }
            Err(e) => {
                state.unhealthy.insert(ep.port_id.clone(), e.to_string());
                errors.push(format!("{}: {e}", ep.port_id));
            }
        }
    }

    Some(finish(state, command, &params.connection_id, applied, errors))
}

fn finish(
    state: &AgentState,
    command: &Command,
    connection_id: &str,
    applied: usize,
    errors: Vec<String>,
) -> CommandAck {
    if errors.is_empty() {
        ok_ack(
            state,
            command,
            serde_json::json!({"connection_id": connection_id, "applied": applied}),
        )
    } else {
        error_ack(
            state,
            command,
            serde_json::json!({
                "reason": "hardware",
                "connection_id": connection_id,
                "applied": applied,
                "errors": errors,
            }),
        )
    }
}

/// Endpoints this switch owns: same POP and same router.
fn local_endpoints<'a>(
    state: &AgentState,
    endpoints: &'a [lumen_common::models::EndpointConfig],
) -> Vec<&'a lumen_common::models::EndpointConfig> {
    endpoints
        .iter()
        .filter(|e| {
            e.pop_id == state.identity.pop_id && e.node_id == state.identity.router_id
        })
        .collect()
}

fn ok_ack(state: &AgentState, command: &Command, details: serde_json::Value) -> CommandAck {
    CommandAck {
        command_id: command.command_id.clone(),
        agent_id: state.identity.agent_id.clone(),
        status: AckStatus::Ok,
        details,
    }
}

fn error_ack(state: &AgentState, command: &Command, details: serde_json::Value) -> CommandAck {
    CommandAck {
        command_id: command.command_id.clone(),
        agent_id: state.identity.agent_id.clone(),
        status: AckStatus::Error,
        details,
    }
}

async fn publish_ack(state: &AgentState, key: &str, ack: &CommandAck) {
    let event = lumen_common::protocol::MonitoringEvent::Ack(ack.clone());
    if let Err(e) = state.sink.publish_monitoring(key, &event).await {
        tracing::error!(command = %ack.command_id, error = %e, "ack publish failed");
    }
}

/// Best-effort command id recovery from an unparseable payload.
fn extract_command_id(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value["command_id"].as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dashmap::DashMap;

    use lumen_common::config::{AgentConfig, KafkaConfig, LinkDbEndpoint, TenantConfig};
    use lumen_common::models::{EndpointConfig, TopicSet};
    use lumen_common::protocol::{HealthCheckParameters, TargetPop, TeardownParameters};

    use crate::kafka::RecordingSink;
    use crate::telemetry::SessionManager;
    use crate::transceiver::MockTransceiver;
    use crate::{AgentIdentity, AgentState};

    struct TestAgent {
        state: AgentState,
        transceiver: Arc<MockTransceiver>,
        sink: Arc<RecordingSink>,
        cache: AckCache,
    }

    fn test_agent() -> TestAgent {
        let identity = AgentIdentity {
            agent_id: "agt-pop1-router1".into(),
            pop_id: "pop1".into(),
            router_id: "router1".into(),
        };
        let config = AgentConfig {
            kafka: KafkaConfig {
                broker: "unused:9092".into(),
            },
            tenant: TenantConfig {
                vop_id: "vOp2".into(),
                topics: TopicSet::for_vop("vOp2"),
            },
            linkdb: LinkDbEndpoint {
                host: "localhost".into(),
                port: 8081,
            },
            telemetry_interval: Duration::from_secs(60),
            health_interval: Duration::from_secs(60),
            mock_hardware: true,
        };
        let transceiver = Arc::new(MockTransceiver::new());
        let sink = Arc::new(RecordingSink::default());
        let sessions = SessionManager::new(
            transceiver.clone(),
            sink.clone(),
            identity.clone(),
            config.telemetry_interval,
        );
        let state = AgentState {
            identity,
            config,
            transceiver: transceiver.clone(),
            sink: sink.clone(),
            sessions,
            started_at: std::time::Instant::now(),
            interface_count: 2,
            interface_locks: DashMap::new(),
            unhealthy: DashMap::new(),
        };
        TestAgent {
            state,
            transceiver,
            sink,
            cache: AckCache::new(8),
        }
    }

    fn endpoint(pop: &str, router: &str, port: &str) -> EndpointConfig {
        EndpointConfig {
            pop_id: pop.into(),
            node_id: router.into(),
            port_id: port.into(),
            frequency: 191.5,
            tx_power_level: -2.0,
        }
    }

    fn setup_command(target: TargetPop) -> Vec<u8> {
        let command = Command::new(
            target,
            CommandAction::Setup(SetupParameters {
                connection_id: "con_1".into(),
                endpoint_config: vec![
                    endpoint("pop1", "router1", "Ethernet56"),
                    endpoint("pop2", "router1", "Ethernet56"),
                ],
            }),
        );
        serde_json::to_vec(&command).unwrap()
    }

    #[tokio::test]
    async fn setup_configures_local_endpoint_and_starts_session() {
        let mut a = test_agent();
        handle_message(&a.state, &mut a.cache, &setup_command(TargetPop::All)).await;

        // Only the pop1 endpoint was touched.
        assert_eq!(a.transceiver.configure_calls(), 1);
        assert!(a.transceiver.carrier_enabled("Ethernet56"));
        assert_eq!(a.state.sessions.active_count(), 1);

        let acks = a.sink.acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].status, AckStatus::Ok);
        assert_eq!(acks[0].details["applied"], 1);

        // The session publishes its first sample right away.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a.sink.telemetry_count("con_1") >= 1);
    }

    #[tokio::test]
    async fn duplicate_setup_applies_hardware_once() {
        let mut a = test_agent();
        let payload = setup_command(TargetPop::All);

        handle_message(&a.state, &mut a.cache, &payload).await;
        handle_message(&a.state, &mut a.cache, &payload).await;

        // Exactly one hardware mutation, two identical acks.
        assert_eq!(a.transceiver.configure_calls(), 1);
        let acks = a.sink.acks();
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].command_id, acks[1].command_id);
        assert_eq!(acks[0].details, acks[1].details);
        assert_eq!(a.state.sessions.active_count(), 1);
    }

    #[tokio::test]
    async fn command_for_other_pop_is_ignored() {
        let mut a = test_agent();
        handle_message(
            &a.state,
            &mut a.cache,
            &setup_command(TargetPop::Pop("pop9".into())),
        )
        .await;

        assert_eq!(a.transceiver.configure_calls(), 0);
        assert!(a.sink.acks().is_empty());
    }

    #[tokio::test]
    async fn single_pop_target_applies_only_matching_endpoints() {
        let mut a = test_agent();
        handle_message(
            &a.state,
            &mut a.cache,
            &setup_command(TargetPop::Pop("pop1".into())),
        )
        .await;

        assert_eq!(a.transceiver.configure_calls(), 1);
        let acks = a.sink.acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].details["applied"], 1);
    }

    #[tokio::test]
    async fn command_with_no_local_endpoint_is_not_acked() {
        let mut a = test_agent();
        let command = Command::new(
            TargetPop::All,
            CommandAction::Setup(SetupParameters {
                connection_id: "con_1".into(),
                endpoint_config: vec![endpoint("pop2", "router1", "Ethernet56")],
            }),
        );
        handle_message(
            &a.state,
            &mut a.cache,
            &serde_json::to_vec(&command).unwrap(),
        )
        .await;

        assert_eq!(a.transceiver.configure_calls(), 0);
        assert!(a.sink.acks().is_empty());
    }

    #[tokio::test]
    async fn malformed_command_acks_schema_error() {
        let mut a = test_agent();
        let raw = br#"{"action":"setupConnection","command_id":"cmd_bad","target_pop":"all","issued_at":"2026-01-01T00:00:00Z","parameters":{"connection_id":42}}"#;
        handle_message(&a.state, &mut a.cache, raw).await;

        let acks = a.sink.acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].command_id, "cmd_bad");
        assert_eq!(acks[0].status, AckStatus::Error);
        assert_eq!(acks[0].details["reason"], "schema");
        assert_eq!(a.transceiver.configure_calls(), 0);
    }

    #[tokio::test]
    async fn reconfig_applies_delta_and_keeps_session() {
        let mut a = test_agent();
        handle_message(&a.state, &mut a.cache, &setup_command(TargetPop::All)).await;
        assert_eq!(a.state.sessions.active_count(), 1);

        let command = Command::new(
            TargetPop::All,
            CommandAction::Reconfig(ReconfigParameters {
                connection_id: "con_1".into(),
                endpoint_config: vec![EndpointConfig {
                    tx_power_level: -1.0,
                    ..endpoint("pop1", "router1", "Ethernet56")
                }],
                reason: "{\"bad_count\":3}".into(),
            }),
        );
        handle_message(
            &a.state,
            &mut a.cache,
            &serde_json::to_vec(&command).unwrap(),
        )
        .await;

        assert_eq!(a.transceiver.tx_power("Ethernet56"), Some(-1.0));
        assert!(a.transceiver.carrier_enabled("Ethernet56"));
        assert_eq!(a.state.sessions.active_count(), 1);
        let acks = a.sink.acks();
        assert_eq!(acks.last().unwrap().status, AckStatus::Ok);
    }

    #[tokio::test]
    async fn teardown_stops_session_and_disables_laser() {
        let mut a = test_agent();
        handle_message(&a.state, &mut a.cache, &setup_command(TargetPop::All)).await;

        let command = Command::new(
            TargetPop::All,
            CommandAction::Teardown(TeardownParameters {
                connection_id: "con_1".into(),
            }),
        );
        handle_message(
            &a.state,
            &mut a.cache,
            &serde_json::to_vec(&command).unwrap(),
        )
        .await;

        assert_eq!(a.state.sessions.active_count(), 0);
        assert!(!a.transceiver.carrier_enabled("Ethernet56"));
        let acks = a.sink.acks();
        assert_eq!(acks.last().unwrap().status, AckStatus::Ok);
        assert_eq!(acks.last().unwrap().details["interface"], "Ethernet56");

        // Teardown for a connection this agent never held: no ack.
        let foreign = Command::new(
            TargetPop::All,
            CommandAction::Teardown(TeardownParameters {
                connection_id: "con_unknown".into(),
            }),
        );
        let before = a.sink.acks().len();
        handle_message(
            &a.state,
            &mut a.cache,
            &serde_json::to_vec(&foreign).unwrap(),
        )
        .await;
        assert_eq!(a.sink.acks().len(), before);
    }

    #[tokio::test]
    async fn health_check_reports_snapshot_without_hardware_access() {
        let mut a = test_agent();
        handle_message(&a.state, &mut a.cache, &setup_command(TargetPop::All)).await;
        let calls_before = a.transceiver.configure_calls();

        let command = Command::new(
            TargetPop::All,
            CommandAction::HealthCheck(HealthCheckParameters::default()),
        );
        handle_message(
            &a.state,
            &mut a.cache,
            &serde_json::to_vec(&command).unwrap(),
        )
        .await;

        assert_eq!(a.transceiver.configure_calls(), calls_before);
        let ack = a.sink.acks().last().unwrap().clone();
        assert_eq!(ack.status, AckStatus::Ok);
        assert_eq!(ack.details["pop_id"], "pop1");
        assert_eq!(ack.details["active_sessions"], 1);
        assert_eq!(ack.details["interfaces"], 2);
    }

    #[test]
    fn ack_cache_evicts_oldest() {
        let mut cache = AckCache::new(2);
        for n in 0..3 {
            cache.insert(CommandAck {
                command_id: format!("cmd_{n}"),
                agent_id: "agt".into(),
                status: AckStatus::Ok,
                details: serde_json::json!({}),
            });
        }
        assert!(cache.get("cmd_0").is_none());
        assert!(cache.get("cmd_1").is_some());
        assert!(cache.get("cmd_2").is_some());
    }
}
