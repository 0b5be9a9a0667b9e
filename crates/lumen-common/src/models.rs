//! Data models for the Lumen platform.
//!
//! These types represent the durable state held by LinkDB and are shared
//! between the slice manager (which writes vOp records), the controllers
//! (which own connection records), and the agents (which read connection
//! records on restart to resume telemetry).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Topology ────────────────────────────────────────────────────────

/// A Point-of-Presence: a site hosting one or more routers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pop {
    pub id: String,
    pub name: String,
    pub location: String,
    pub routers: Vec<Router>,
}

/// A router inside a POP, carrying optical interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    pub pop_id: String,
    pub interfaces: Vec<Interface>,
}

/// An optical interface on a router (e.g. `Ethernet48`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub id: String,
    pub port: u32,
    /// The vOp that reserved this interface, if any.
    pub owner: Option<String>,
    pub admin_up: bool,
    pub oper_up: bool,
    pub transceiver_present: bool,
}

/// An optical link between two POPs with its spectrum slot grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub pop_a: String,
    pub pop_b: String,
    pub distance_km: f64,
    pub slots: Vec<SlotState>,
}

impl Link {
    /// Whether this link touches the given POP.
    pub fn connects(&self, pop: &str) -> bool {
        self.pop_a == pop || self.pop_b == pop
    }

    /// The POP on the other side of the link.
    pub fn peer_of(&self, pop: &str) -> Option<&str> {
        if self.pop_a == pop {
            Some(&self.pop_b)
        } else if self.pop_b == pop {
            Some(&self.pop_a)
        } else {
            None
        }
    }
}

/// State of a single fixed-width frequency slot on a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    Free,
    Reserved { connection_id: String },
    Active { connection_id: String },
}

impl SlotState {
    pub fn is_free(&self) -> bool {
        matches!(self, SlotState::Free)
    }

    /// The connection holding this slot, if any.
    pub fn holder(&self) -> Option<&str> {
        match self {
            SlotState::Free => None,
            SlotState::Reserved { connection_id } | SlotState::Active { connection_id } => {
                Some(connection_id)
            }
        }
    }
}

/// A contiguous range of slot indices, identical on every link of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: usize,
    pub count: usize,
}

impl SlotRange {
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.count
    }
}

/// Complete topology snapshot exchanged with LinkDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub pops: Vec<Pop>,
    pub links: Vec<Link>,
}

/// One candidate path: ordered link ids, POPs traversed, total fiber distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedPath {
    pub links: Vec<String>,
    pub pops: Vec<String>,
    pub total_km: f64,
}

/// A granted spectrum allocation, kept per connection for release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub connection_id: String,
    pub path: Vec<String>,
    pub range: SlotRange,
}

// ── Virtual operator ────────────────────────────────────────────────

/// A tenant slice with dedicated topics and reserved interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualOperator {
    pub id: String,
    pub tenant: String,
    pub description: String,
    pub status: VopStatus,
    pub interfaces: Vec<InterfaceRef>,
    pub topics: TopicSet,
    pub created_at: DateTime<Utc>,
}

/// Fully qualified reference to an interface on a router in a POP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceRef {
    pub pop_id: String,
    pub router_id: String,
    pub interface_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VopStatus {
    Requested,
    Active,
    Deactivating,
    Deleted,
}

impl std::fmt::Display for VopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VopStatus::Requested => write!(f, "requested"),
            VopStatus::Active => write!(f, "active"),
            VopStatus::Deactivating => write!(f, "deactivating"),
            VopStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// The Kafka topic triple owned by one vOp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSet {
    pub config: String,
    pub monitoring: String,
    pub health: String,
}

impl TopicSet {
    pub fn for_vop(vop_id: &str) -> Self {
        Self {
            config: format!("config_{vop_id}"),
            monitoring: format!("monitoring_{vop_id}"),
            health: format!("health_{vop_id}"),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.config, &self.monitoring, &self.health]
    }
}

// ── Connection ──────────────────────────────────────────────────────

/// Per-endpoint transceiver configuration, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub pop_id: String,
    pub node_id: String,
    pub port_id: String,
    /// Center frequency in THz.
    pub frequency: f64,
    /// Commanded transmit power in dBm.
    pub tx_power_level: f64,
}

impl EndpointConfig {
    /// Stable key for per-endpoint bookkeeping (ack maps, last tx-power).
    pub fn key(&self) -> String {
        format!("{}/{}", self.pop_id, self.port_id)
    }
}

/// An end-to-end optical connection owned by one vOp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub vop_id: String,
    pub src_pop: String,
    pub dst_pop: String,
    pub endpoints: Vec<EndpointConfig>,
    /// Ordered link ids of the computed path.
    pub path: Vec<String>,
    pub slot_range: Option<SlotRange>,
    pub status: ConnectionStatus,
    /// Last commanded tx-power per endpoint key.
    #[serde(default)]
    pub last_tx_dbm: HashMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Planned,
    SetupPending,
    Active,
    Degraded,
    ReconfigPending,
    Teardown,
    Deleted,
    Failed,
}

impl ConnectionStatus {
    /// States in which the connection holds spectrum and carries traffic.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Active
                | ConnectionStatus::Degraded
                | ConnectionStatus::ReconfigPending
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Planned => "planned",
            ConnectionStatus::SetupPending => "setup_pending",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Degraded => "degraded",
            ConnectionStatus::ReconfigPending => "reconfig_pending",
            ConnectionStatus::Teardown => "teardown",
            ConnectionStatus::Deleted => "deleted",
            ConnectionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ConnectionStatus::Idle),
            "planned" => Ok(ConnectionStatus::Planned),
            "setup_pending" => Ok(ConnectionStatus::SetupPending),
            "active" => Ok(ConnectionStatus::Active),
            "degraded" => Ok(ConnectionStatus::Degraded),
            "reconfig_pending" => Ok(ConnectionStatus::ReconfigPending),
            "teardown" => Ok(ConnectionStatus::Teardown),
            "deleted" => Ok(ConnectionStatus::Deleted),
            "failed" => Ok(ConnectionStatus::Failed),
            other => Err(format!("unknown connection status: {other}")),
        }
    }
}

// ── Telemetry ───────────────────────────────────────────────────────

/// Coherent-optics readings for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFields {
    /// Received power in dBm.
    pub rx_power: f64,
    /// Transmit power in dBm.
    pub tx_power: f64,
    /// Optical signal-to-noise ratio in dB.
    pub osnr: f64,
    /// Pre-FEC bit error rate.
    pub pre_fec_ber: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_set_naming() {
        let topics = TopicSet::for_vop("vOp2");
        assert_eq!(topics.config, "config_vOp2");
        assert_eq!(topics.monitoring, "monitoring_vOp2");
        assert_eq!(topics.health, "health_vOp2");
    }

    #[test]
    fn slot_state_holder() {
        assert_eq!(SlotState::Free.holder(), None);
        let r = SlotState::Reserved {
            connection_id: "con_1".into(),
        };
        assert_eq!(r.holder(), Some("con_1"));
        assert!(!r.is_free());
    }

    #[test]
    fn slot_state_serializes_tagged() {
        let json = serde_json::to_string(&SlotState::Reserved {
            connection_id: "con_9".into(),
        })
        .unwrap();
        assert!(json.contains("\"state\":\"reserved\""));
        assert!(json.contains("con_9"));

        let free: SlotState = serde_json::from_str(r#"{"state":"free"}"#).unwrap();
        assert!(free.is_free());
    }

    #[test]
    fn connection_status_round_trip() {
        for s in [
            ConnectionStatus::Planned,
            ConnectionStatus::SetupPending,
            ConnectionStatus::ReconfigPending,
            ConnectionStatus::Failed,
        ] {
            let parsed: ConnectionStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("nonsense".parse::<ConnectionStatus>().is_err());
    }

    #[test]
    fn link_peer_lookup() {
        let link = Link {
            id: "link-pop1-pop2".into(),
            pop_a: "pop1".into(),
            pop_b: "pop2".into(),
            distance_km: 80.0,
            slots: vec![SlotState::Free; 8],
        };
        assert_eq!(link.peer_of("pop1"), Some("pop2"));
        assert_eq!(link.peer_of("pop3"), None);
        assert!(link.connects("pop2"));
    }
}
