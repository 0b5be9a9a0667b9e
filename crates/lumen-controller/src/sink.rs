//! Command publishing seam.
//!
//! The engine publishes through this trait so connection-lifecycle and QoT
//! behavior can be tested against an in-memory sink. The production
//! implementation lives in [`crate::kafka`].

use async_trait::async_trait;

use lumen_common::protocol::Command;

#[async_trait]
pub trait CommandSink: Send + Sync + 'static {
    /// Publish one command on the tenant's config topic.
    async fn publish(&self, command: &Command) -> anyhow::Result<()>;
}

/// Records published commands; used by tests.
#[derive(Default)]
pub struct RecordingSink {
    commands: std::sync::Mutex<Vec<Command>>,
}

impl RecordingSink {
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Command> {
        self.commands.lock().unwrap().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn publish(&self, command: &Command) -> anyhow::Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}
