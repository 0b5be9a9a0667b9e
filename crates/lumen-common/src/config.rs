//! Typed service configuration built from the environment.
//!
//! Each binary builds its config record once in `main` and passes it into
//! components at construction. Nothing below `main` reads the environment.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::models::TopicSet;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

fn var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    var(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn parsed_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = var(name).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::Invalid { name, value: raw })
}

// ── Shared pieces ───────────────────────────────────────────────────

/// Kafka bootstrap configuration.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub broker: String,
}

impl KafkaConfig {
    pub fn from_env() -> Self {
        Self {
            broker: var("KAFKA_BROKER").unwrap_or_else(|| "localhost:9092".into()),
        }
    }
}

/// Where to reach the LinkDB service.
#[derive(Debug, Clone)]
pub struct LinkDbEndpoint {
    pub host: String,
    pub port: u16,
}

impl LinkDbEndpoint {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: var("LINKDB_HOST").unwrap_or_else(|| "localhost".into()),
            port: parsed("LINKDB_PORT", 8081)?,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Tenant identity plus topic names, overridable individually.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub vop_id: String,
    pub topics: TopicSet,
}

impl TenantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vop_id = required("VIRTUAL_OPERATOR")?;
        let defaults = TopicSet::for_vop(&vop_id);
        Ok(Self {
            topics: TopicSet {
                config: var("CONFIG_TOPIC").unwrap_or(defaults.config),
                monitoring: var("MONITORING_TOPIC").unwrap_or(defaults.monitoring),
                health: var("HEALTH_TOPIC").unwrap_or(defaults.health),
            },
            vop_id,
        })
    }
}

// ── QoT loop ────────────────────────────────────────────────────────

/// Which endpoints a QoT reconfiguration adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustMode {
    /// Raise tx-power on every endpoint of the connection.
    Both,
    /// Raise tx-power only on the endpoint that reported degradation.
    One,
}

impl std::str::FromStr for AdjustMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(AdjustMode::Both),
            "one" => Ok(AdjustMode::One),
            other => Err(format!("unknown adjust mode: {other}")),
        }
    }
}

/// Thresholds and pacing for the QoT closed loop.
#[derive(Debug, Clone)]
pub struct QotConfig {
    pub enabled: bool,
    pub persistency_samples: u32,
    pub cooldown: Duration,
    pub osnr_threshold_db: f64,
    pub ber_threshold: f64,
    pub tx_step_db: f64,
    pub tx_min_dbm: f64,
    pub tx_max_dbm: f64,
    pub adjust_mode: AdjustMode,
}

impl QotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parsed("ENABLE_QOT_MONITORING", true)?,
            persistency_samples: parsed("QOT_SAMPLES", 3)?,
            cooldown: Duration::from_secs_f64(parsed("QOT_COOLDOWN_SEC", 20.0)?),
            osnr_threshold_db: parsed("OSNR_THRESHOLD_DB", 18.0)?,
            ber_threshold: parsed("BER_THRESHOLD", 1e-3)?,
            tx_step_db: parsed("TX_STEP_DB", 1.0)?,
            tx_min_dbm: parsed("TX_MIN_DBM", -15.0)?,
            tx_max_dbm: parsed("TX_MAX_DBM", 0.0)?,
            adjust_mode: parsed("ADJUST_MODE", AdjustMode::Both)?,
        })
    }
}

impl Default for QotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persistency_samples: 3,
            cooldown: Duration::from_secs(20),
            osnr_threshold_db: 18.0,
            ber_threshold: 1e-3,
            tx_step_db: 1.0,
            tx_min_dbm: -15.0,
            tx_max_dbm: 0.0,
            adjust_mode: AdjustMode::Both,
        }
    }
}

// ── Per-service records ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LinkDbConfig {
    pub listen_addr: SocketAddr,
    /// Slots per link when a creation request doesn't specify a grid size.
    pub default_slot_count: usize,
}

impl LinkDbConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: parsed_addr("LISTEN_ADDR", "0.0.0.0:8081")?,
            default_slot_count: parsed("LINKDB_SLOT_COUNT", 64)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SliceConfig {
    pub listen_addr: SocketAddr,
    pub kafka: KafkaConfig,
    pub linkdb: LinkDbEndpoint,
    pub topic_partitions: i32,
    pub topic_replication: i32,
    /// Optional deployment hook POSTed after activation/deactivation.
    pub controller_hook_url: Option<String>,
}

impl SliceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: parsed_addr("LISTEN_ADDR", "0.0.0.0:8080")?,
            kafka: KafkaConfig::from_env(),
            linkdb: LinkDbEndpoint::from_env()?,
            topic_partitions: parsed("TOPIC_PARTITIONS", 4)?,
            topic_replication: parsed("TOPIC_REPLICATION", 1)?,
            controller_hook_url: var("CONTROLLER_HOOK_URL"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub listen_addr: SocketAddr,
    pub kafka: KafkaConfig,
    pub tenant: TenantConfig,
    pub linkdb: LinkDbEndpoint,
    pub command_timeout: Duration,
    pub qot: QotConfig,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: parsed_addr("LISTEN_ADDR", "0.0.0.0:8082")?,
            kafka: KafkaConfig::from_env(),
            tenant: TenantConfig::from_env()?,
            linkdb: LinkDbEndpoint::from_env()?,
            command_timeout: Duration::from_secs_f64(parsed("COMMAND_TIMEOUT_SEC", 30.0)?),
            qot: QotConfig::from_env()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub kafka: KafkaConfig,
    pub tenant: TenantConfig,
    pub linkdb: LinkDbEndpoint,
    pub telemetry_interval: Duration,
    pub health_interval: Duration,
    pub mock_hardware: bool,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            kafka: KafkaConfig::from_env(),
            tenant: TenantConfig::from_env()?,
            linkdb: LinkDbEndpoint::from_env()?,
            telemetry_interval: Duration::from_secs_f64(parsed("TELEMETRY_INTERVAL_SEC", 3.0)?),
            health_interval: Duration::from_secs_f64(parsed("HEALTH_INTERVAL_SEC", 10.0)?),
            mock_hardware: parsed("MOCK_HARDWARE", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_mode_parses() {
        assert_eq!("both".parse::<AdjustMode>().unwrap(), AdjustMode::Both);
        assert_eq!("one".parse::<AdjustMode>().unwrap(), AdjustMode::One);
        assert!("all".parse::<AdjustMode>().is_err());
    }

    #[test]
    fn qot_defaults_match_documented_values() {
        let qot = QotConfig::default();
        assert_eq!(qot.persistency_samples, 3);
        assert_eq!(qot.cooldown, Duration::from_secs(20));
        assert_eq!(qot.osnr_threshold_db, 18.0);
        assert_eq!(qot.ber_threshold, 1e-3);
        assert_eq!(qot.tx_step_db, 1.0);
        assert_eq!(qot.tx_min_dbm, -15.0);
        assert_eq!(qot.tx_max_dbm, 0.0);
    }

    #[test]
    fn linkdb_endpoint_url() {
        let ep = LinkDbEndpoint {
            host: "linkdb".into(),
            port: 8081,
        };
        assert_eq!(ep.base_url(), "http://linkdb:8081");
    }
}
