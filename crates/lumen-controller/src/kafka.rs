//! Kafka plumbing: the command producer and the monitoring/health consumers.
//!
//! Commands are keyed by connection id so per-connection ordering holds
//! within a partition. Consumers join a group unique to this controller
//! instance and start from the latest offset: telemetry history is not
//! replayed into a cold engine.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use tokio::sync::mpsc;

use lumen_common::config::KafkaConfig;
use lumen_common::protocol::{Command, HealthEvent, MonitoringEvent};
use lumen_common::retry::{self, Backoff};

use crate::engine::EngineEvent;
use crate::sink::CommandSink;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer on the tenant's `config_<vop>` topic.
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaSink {
    pub fn new(kafka: &KafkaConfig, topic: &str) -> anyhow::Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.broker)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl CommandSink for KafkaSink {
    async fn publish(&self, command: &Command) -> anyhow::Result<()> {
        let payload = serde_json::to_string(command)?;
        let key = command
            .connection_id()
            .unwrap_or(&command.command_id)
            .to_string();

        retry::with_backoff(Backoff::default(), "kafka publish", || {
            let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);
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

/// Consumer subscribed to one topic, group unique per controller instance.
pub fn subscribe(
    kafka: &KafkaConfig,
    topic: &str,
    instance: &str,
) -> anyhow::Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &kafka.broker)
        .set("group.id", format!("controller-{instance}"))
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "latest")
        .set("enable.partition.eof", "false")
        .create()?;
    consumer.subscribe(&[topic])?;
    Ok(consumer)
}

/// Forward monitoring events (telemetry, acks) into the engine channel.
pub async fn pump_monitoring(consumer: StreamConsumer, tx: mpsc::Sender<EngineEvent>) {
    loop {
        match consumer.recv().await {
            Err(e) => {
                tracing::warn!(error = %e, "monitoring consumer error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Ok(msg) => {
                let Some(payload) = msg.payload() else {
                    continue;
                };
                match serde_json::from_slice::<MonitoringEvent>(payload) {
                    Ok(event) => {
                        if tx.send(EngineEvent::Monitoring(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable monitoring message dropped");
                    }
                }
            }
        }
    }
}

/// Forward agent heartbeats into the engine channel.
pub async fn pump_health(consumer: StreamConsumer, tx: mpsc::Sender<EngineEvent>) {
    loop {
        match consumer.recv().await {
            Err(e) => {
                tracing::warn!(error = %e, "health consumer error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Ok(msg) => {
                let Some(payload) = msg.payload() else {
                    continue;
                };
                match serde_json::from_slice::<HealthEvent>(payload) {
                    Ok(event) => {
                        if tx.send(EngineEvent::Health(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable health message dropped");
                    }
                }
            }
        }
    }
}
