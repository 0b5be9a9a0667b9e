//! Kafka protocol messages between controllers and agents.
//!
//! All messages are JSON-encoded. Commands flow on `config_<vop>`, telemetry
//! and acks on `monitoring_<vop>`, heartbeats on `health_<vop>`. Payloads are
//! parsed at the boundary into these tagged sums and rejected on mismatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;
use crate::models::{EndpointConfig, TelemetryFields};

// ── Commands (controller → agents) ──────────────────────────────────

/// A command published on the tenant's config topic.
///
/// Wire shape:
/// `{"action":"setupConnection","command_id":"cmd_…","target_pop":"all",
///   "issued_at":"…","parameters":{…}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    pub target_pop: TargetPop,
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: CommandAction,
}

impl Command {
    /// Create a command with a fresh `cmd_` id and current timestamp.
    pub fn new(target_pop: TargetPop, action: CommandAction) -> Self {
        Self {
            command_id: ids::command_id(),
            target_pop,
            issued_at: Utc::now(),
            action,
        }
    }

    /// The connection this command concerns, if any.
    pub fn connection_id(&self) -> Option<&str> {
        match &self.action {
            CommandAction::Setup(p) => Some(&p.connection_id),
            CommandAction::Reconfig(p) => Some(&p.connection_id),
            CommandAction::Teardown(p) => Some(&p.connection_id),
            CommandAction::HealthCheck(_) => None,
        }
    }
}

/// Action tag + parameters, adjacently tagged on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "parameters")]
pub enum CommandAction {
    #[serde(rename = "setupConnection")]
    Setup(SetupParameters),
    #[serde(rename = "reconfigConnection")]
    Reconfig(ReconfigParameters),
    #[serde(rename = "teardownConnection")]
    Teardown(TeardownParameters),
    #[serde(rename = "healthCheck")]
    HealthCheck(HealthCheckParameters),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupParameters {
    pub connection_id: String,
    pub endpoint_config: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconfigParameters {
    pub connection_id: String,
    pub endpoint_config: Vec<EndpointConfig>,
    /// Why the reconfiguration was issued (QoT verdict payload).
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownParameters {
    pub connection_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheckParameters {}

/// Command target selector: every agent, or a single POP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetPop {
    All,
    Pop(String),
}

impl TargetPop {
    /// Whether an agent in `pop_id` should process the command.
    pub fn matches(&self, pop_id: &str) -> bool {
        match self {
            TargetPop::All => true,
            TargetPop::Pop(p) => p == pop_id,
        }
    }
}

impl From<String> for TargetPop {
    fn from(s: String) -> Self {
        if s == "all" {
            TargetPop::All
        } else {
            TargetPop::Pop(s)
        }
    }
}

impl From<TargetPop> for String {
    fn from(t: TargetPop) -> Self {
        match t {
            TargetPop::All => "all".into(),
            TargetPop::Pop(p) => p,
        }
    }
}

// ── Monitoring (agents → controller) ────────────────────────────────

/// Events published on the tenant's monitoring topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitoringEvent {
    Telemetry(TelemetryReport),
    Ack(CommandAck),
}

/// One telemetry sample with its publishing agent's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub agent_id: String,
    pub pop_id: String,
    pub router_id: String,
    pub data: TelemetrySample,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub connection_id: String,
    pub interface: String,
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    pub fields: TelemetryFields,
}

/// Acknowledgement of a command, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    pub command_id: String,
    pub agent_id: String,
    pub status: AckStatus,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok,
    Error,
}

// ── Health (agents → controller) ────────────────────────────────────

/// Events published on the tenant's health topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthEvent {
    Heartbeat(Heartbeat),
}

/// Periodic agent liveness report with capability advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub agent_id: String,
    pub pop_id: String,
    pub router_id: String,
    pub uptime_s: u64,
    pub interfaces: u32,
    pub active_sessions: u32,
    pub capabilities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            pop_id: "pop1".into(),
            node_id: "router1".into(),
            port_id: "Ethernet56".into(),
            frequency: 193.1,
            tx_power_level: -2.0,
        }
    }

    #[test]
    fn setup_command_wire_shape() {
        let cmd = Command::new(
            TargetPop::All,
            CommandAction::Setup(SetupParameters {
                connection_id: "con_abc".into(),
                endpoint_config: vec![endpoint()],
            }),
        );

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"action\":\"setupConnection\""));
        assert!(json.contains("\"target_pop\":\"all\""));
        assert!(json.contains("\"parameters\""));
        assert!(json.contains("\"tx_power_level\":-2.0"));

        let recovered: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered.connection_id(), Some("con_abc"));
        match recovered.action {
            CommandAction::Setup(p) => assert_eq!(p.endpoint_config.len(), 1),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn reconfig_carries_reason() {
        let cmd = Command::new(
            TargetPop::Pop("pop2".into()),
            CommandAction::Reconfig(ReconfigParameters {
                connection_id: "con_abc".into(),
                endpoint_config: vec![endpoint()],
                reason: "osnr below threshold".into(),
            }),
        );

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"action\":\"reconfigConnection\""));
        assert!(json.contains("\"target_pop\":\"pop2\""));
        assert!(json.contains("osnr below threshold"));
    }

    #[test]
    fn health_check_has_empty_parameters() {
        let cmd = Command::new(
            TargetPop::All,
            CommandAction::HealthCheck(HealthCheckParameters::default()),
        );
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["action"], "healthCheck");
        assert!(value["parameters"].as_object().unwrap().is_empty());
    }

    #[test]
    fn target_pop_matching() {
        assert!(TargetPop::All.matches("pop1"));
        assert!(TargetPop::Pop("pop1".into()).matches("pop1"));
        assert!(!TargetPop::Pop("pop1".into()).matches("pop2"));
    }

    #[test]
    fn telemetry_event_round_trip() {
        let event = MonitoringEvent::Telemetry(TelemetryReport {
            agent_id: "agt-1".into(),
            pop_id: "pop1".into(),
            router_id: "router1".into(),
            data: TelemetrySample {
                connection_id: "con_abc".into(),
                interface: "Ethernet56".into(),
                timestamp: 1_700_000_000.5,
                fields: TelemetryFields {
                    rx_power: -12.3,
                    tx_power: -2.0,
                    osnr: 21.4,
                    pre_fec_ber: 2.0e-5,
                },
            },
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"telemetry\""));
        assert!(json.contains("\"pre_fec_ber\""));

        match serde_json::from_str::<MonitoringEvent>(&json).unwrap() {
            MonitoringEvent::Telemetry(report) => {
                assert_eq!(report.data.connection_id, "con_abc");
                assert_eq!(report.data.fields.osnr, 21.4);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ack_round_trip() {
        let event = MonitoringEvent::Ack(CommandAck {
            command_id: "cmd_1".into(),
            agent_id: "agt-1".into(),
            status: AckStatus::Error,
            details: serde_json::json!({"reason": "schema"}),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ack\""));
        assert!(json.contains("\"status\":\"error\""));

        match serde_json::from_str::<MonitoringEvent>(&json).unwrap() {
            MonitoringEvent::Ack(ack) => {
                assert_eq!(ack.status, AckStatus::Error);
                assert_eq!(ack.details["reason"], "schema");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let raw = r#"{"action":"setupConnection","command_id":"cmd_1","target_pop":"all","issued_at":"2026-01-01T00:00:00Z","parameters":{"connection_id":42}}"#;
        assert!(serde_json::from_str::<Command>(raw).is_err());

        let raw = r#"{"type":"telemetry","agent_id":"a"}"#;
        assert!(serde_json::from_str::<MonitoringEvent>(raw).is_err());
    }

    #[test]
    fn heartbeat_round_trip() {
        let event = HealthEvent::Heartbeat(Heartbeat {
            agent_id: "agt-1".into(),
            pop_id: "pop1".into(),
            router_id: "router1".into(),
            uptime_s: 42,
            interfaces: 4,
            active_sessions: 1,
            capabilities: vec!["cmis".into(), "coherent".into()],
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"heartbeat\""));
        let HealthEvent::Heartbeat(hb) = serde_json::from_str(&json).unwrap();
        assert_eq!(hb.capabilities.len(), 2);
    }
}
