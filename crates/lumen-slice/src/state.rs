//! Shared application state.

use std::sync::Arc;

use lumen_common::config::SliceConfig;
use lumen_common::linkdb::LinkDbClient;

use crate::topics::TopicProvisioner;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: SliceConfig,
    linkdb: LinkDbClient,
    topics: Arc<dyn TopicProvisioner>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: SliceConfig, linkdb: LinkDbClient, topics: Arc<dyn TopicProvisioner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                linkdb,
                topics,
                http: reqwest::Client::new(),
            }),
        }
    }

    pub fn linkdb(&self) -> &LinkDbClient {
        &self.inner.linkdb
    }

    pub fn topics(&self) -> &dyn TopicProvisioner {
        self.inner.topics.as_ref()
    }

    /// Notify the external controller deployment hook, if configured.
    ///
    /// The hook is advisory: deployment is handled outside the slice
    /// manager, so failures are logged and activation proceeds.
    pub async fn notify_hook(&self, vop_id: &str, action: &str) {
        let Some(url) = &self.inner.config.controller_hook_url else {
            return;
        };
        let body = serde_json::json!({"vop_id": vop_id, "action": action});
        match self.inner.http.post(url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(vop = %vop_id, action, "controller hook notified");
            }
            Ok(resp) => {
                tracing::warn!(vop = %vop_id, action, status = %resp.status(), "controller hook rejected");
            }
            Err(e) => {
                tracing::warn!(vop = %vop_id, action, error = %e, "controller hook unreachable");
            }
        }
    }
}
