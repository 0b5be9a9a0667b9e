//! Kafka plumbing for the agent: the monitoring/health publisher and the
//! config-topic consumer.
//!
//! Telemetry and acks are keyed by connection id so the controller sees them
//! in order per connection. The consumer group is the agent id: each agent
//! reads the full command stream for its tenant exactly once.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use lumen_common::config::AgentConfig;
use lumen_common::protocol::{HealthEvent, MonitoringEvent};
use lumen_common::retry::{self, Backoff};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Seam for event publishing so command handling is testable without a
/// broker.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish_monitoring(&self, key: &str, event: &MonitoringEvent) -> anyhow::Result<()>;
    async fn publish_health(&self, key: &str, event: &HealthEvent) -> anyhow::Result<()>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    monitoring_topic: String,
    health_topic: String,
}

impl KafkaPublisher {
    pub fn new(config: &AgentConfig) -> anyhow::Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka.broker)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self {
            producer,
            monitoring_topic: config.tenant.topics.monitoring.clone(),
            health_topic: config.tenant.topics.health.clone(),
        })
    }

    /// Drain in-flight messages before shutdown.
    pub fn flush(&self, timeout: Duration) {
        if let Err(e) = self.producer.flush(timeout) {
            tracing::warn!(error = %e, "producer flush failed");
        }
    }

    async fn publish(&self, topic: &str, key: &str, payload: String) -> anyhow::Result<()> {
        retry::with_backoff(Backoff::default(), "kafka publish", || {
            let record = FutureRecord::to(topic).key(key).payload(&payload);
            async move {
                self.producer
                    .send(record, SEND_TIMEOUT)
                    .await
                    .map_err(|(e, _)| e)
            }
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for KafkaPublisher {
    async fn publish_monitoring(&self, key: &str, event: &MonitoringEvent) -> anyhow::Result<()> {
        self.publish(&self.monitoring_topic, key, serde_json::to_string(event)?)
            .await
    }

    async fn publish_health(&self, key: &str, event: &HealthEvent) -> anyhow::Result<()> {
        self.publish(&self.health_topic, key, serde_json::to_string(event)?)
            .await
    }
}

/// Consumer on the tenant's config topic, `group.id = agent_id`.
pub fn config_consumer(config: &AgentConfig, agent_id: &str) -> anyhow::Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka.broker)
        .set("group.id", agent_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "latest")
        .set("enable.partition.eof", "false")
        .create()?;
    consumer.subscribe(&[config.tenant.topics.config.as_str()])?;
    Ok(consumer)
}

/// In-memory sink used by tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    pub monitoring: std::sync::Mutex<Vec<(String, MonitoringEvent)>>,
    pub health: std::sync::Mutex<Vec<(String, HealthEvent)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn acks(&self) -> Vec<lumen_common::protocol::CommandAck> {
        self.monitoring
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, e)| match e {
                MonitoringEvent::Ack(ack) => Some(ack.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn telemetry_count(&self, connection_id: &str) -> usize {
        self.monitoring
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| match e {
                MonitoringEvent::Telemetry(report) => report.data.connection_id == connection_id,
                _ => false,
            })
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl EventSink for RecordingSink {
    async fn publish_monitoring(&self, key: &str, event: &MonitoringEvent) -> anyhow::Result<()> {
        self.monitoring
            .lock()
            .unwrap()
            .push((key.to_string(), event.clone()));
        Ok(())
    }

    async fn publish_health(&self, key: &str, event: &HealthEvent) -> anyhow::Result<()> {
        self.health
            .lock()
            .unwrap()
            .push((key.to_string(), event.clone()));
        Ok(())
    }
}
