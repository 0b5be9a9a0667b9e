//! Kafka topic provisioning for tenant slices.
//!
//! Each vOp owns three topics: `config_<id>`, `monitoring_<id>`,
//! `health_<id>`. Provisioning is idempotent: topics that already exist are
//! left untouched. The health topic is compacted (latest heartbeat per
//! agent matters), config/monitoring use time-based retention.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::RDKafkaErrorCode;

use lumen_common::config::KafkaConfig;
use lumen_common::models::TopicSet;
use lumen_common::retry::{self, Backoff};

/// Seam for topic provisioning so activation is testable without a broker.
#[async_trait]
pub trait TopicProvisioner: Send + Sync {
    /// Ensure the tenant's topic triple exists. Must be idempotent.
    async fn ensure_topics(&self, topics: &TopicSet) -> anyhow::Result<()>;
}

/// 6 hours, in line with command/telemetry replay needs.
const RETENTION_MS: &str = "21600000";

pub struct KafkaTopicProvisioner {
    admin: AdminClient<DefaultClientContext>,
    partitions: i32,
    replication: i32,
}

impl KafkaTopicProvisioner {
    pub fn new(kafka: &KafkaConfig, partitions: i32, replication: i32) -> anyhow::Result<Self> {
        let admin = ClientConfig::new()
            .set("bootstrap.servers", &kafka.broker)
            .create()?;
        Ok(Self {
            admin,
            partitions,
            replication,
        })
    }
}

#[async_trait]
impl TopicProvisioner for KafkaTopicProvisioner {
    async fn ensure_topics(&self, topics: &TopicSet) -> anyhow::Result<()> {
        let specs = [
            NewTopic::new(
                &topics.config,
                self.partitions,
                TopicReplication::Fixed(self.replication),
            )
            .set("cleanup.policy", "delete")
            .set("retention.ms", RETENTION_MS),
            NewTopic::new(
                &topics.monitoring,
                self.partitions,
                TopicReplication::Fixed(self.replication),
            )
            .set("cleanup.policy", "delete")
            .set("retention.ms", RETENTION_MS),
            NewTopic::new(
                &topics.health,
                self.partitions,
                TopicReplication::Fixed(self.replication),
            )
            .set("cleanup.policy", "compact"),
        ];

        let options = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));
        let results = retry::with_backoff(Backoff::default(), "create kafka topics", || {
            self.admin.create_topics(&specs, &options)
        })
        .await?;

        for result in results {
            match result {
                Ok(name) => tracing::info!(topic = %name, "topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::debug!(topic = %name, "topic already exists");
                }
                Err((name, code)) => {
                    anyhow::bail!("creating topic {name} failed: {code}");
                }
            }
        }
        Ok(())
    }
}
