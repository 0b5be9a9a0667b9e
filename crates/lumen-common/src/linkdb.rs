//! HTTP client for the LinkDB service.
//!
//! Used by the slice manager (interface reservation, vOp registry), the
//! controllers (topology, allocation, connection records), and the agents
//! (connection records on restart). Transport failures retry with the
//! platform backoff policy; HTTP-level rejections surface immediately with
//! the machine-readable `kind` from the error body.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::LinkDbEndpoint;
use crate::models::{
    Allocation, ComputedPath, Connection, ConnectionStatus, InterfaceRef, Topology,
    VirtualOperator,
};
use crate::retry::{self, Backoff};

#[derive(Debug, Error)]
pub enum LinkDbError {
    #[error("linkdb unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("linkdb rejected request ({kind}): {message}")]
    Rejected {
        status: u16,
        kind: String,
        message: String,
    },
}

impl LinkDbError {
    pub fn kind(&self) -> &str {
        match self {
            LinkDbError::Unreachable(_) => "unreachable",
            LinkDbError::Rejected { kind, .. } => kind,
        }
    }

    pub fn is_no_spectrum(&self) -> bool {
        self.kind() == "no_spectrum"
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == "not_found"
    }
}

/// Client handle. Cheap to clone.
#[derive(Clone)]
pub struct LinkDbClient {
    http: reqwest::Client,
    base: String,
    backoff: Backoff,
}

impl LinkDbClient {
    pub fn new(endpoint: &LinkDbEndpoint) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: endpoint.base_url(),
            backoff: Backoff::default(),
        }
    }

    pub async fn health(&self) -> Result<(), LinkDbError> {
        self.request_empty(Method::GET, "/health", None::<&()>).await
    }

    // ── Topology ────────────────────────────────────────────────

    pub async fn topology(&self) -> Result<Topology, LinkDbError> {
        self.request_json(Method::GET, "/api/topology", None::<&()>)
            .await
    }

    pub async fn paths(
        &self,
        src: &str,
        dst: &str,
        k: usize,
    ) -> Result<Vec<ComputedPath>, LinkDbError> {
        self.request_json(
            Method::GET,
            &format!("/api/paths/{src}/{dst}?k={k}"),
            None::<&()>,
        )
        .await
    }

    // ── Spectrum ────────────────────────────────────────────────

    pub async fn allocate(
        &self,
        connection_id: &str,
        path: &[String],
        slots_required: usize,
    ) -> Result<Allocation, LinkDbError> {
        self.request_json(
            Method::POST,
            "/api/connections/allocate",
            Some(&serde_json::json!({
                "connection_id": connection_id,
                "path": path,
                "slots_required": slots_required,
            })),
        )
        .await
    }

    pub async fn release(&self, connection_id: &str) -> Result<(), LinkDbError> {
        self.request_empty(
            Method::DELETE,
            &format!("/api/connections/{connection_id}"),
            None::<&()>,
        )
        .await
    }

    // ── Interfaces ──────────────────────────────────────────────

    pub async fn reserve_interfaces(
        &self,
        vop_id: &str,
        interfaces: &[InterfaceRef],
    ) -> Result<(), LinkDbError> {
        self.request_empty(
            Method::POST,
            "/api/interfaces/reserve",
            Some(&serde_json::json!({"vop_id": vop_id, "interfaces": interfaces})),
        )
        .await
    }

    pub async fn release_interfaces(&self, vop_id: &str) -> Result<(), LinkDbError> {
        self.request_empty(
            Method::POST,
            "/api/interfaces/release",
            Some(&serde_json::json!({"vop_id": vop_id})),
        )
        .await
    }

    // ── vOp registry ────────────────────────────────────────────

    pub async fn put_vop(&self, vop: &VirtualOperator) -> Result<(), LinkDbError> {
        self.request_empty(Method::PUT, &format!("/api/vops/{}", vop.id), Some(vop))
            .await
    }

    pub async fn get_vop(&self, id: &str) -> Result<Option<VirtualOperator>, LinkDbError> {
        match self
            .request_json(Method::GET, &format!("/api/vops/{id}"), None::<&()>)
            .await
        {
            Ok(vop) => Ok(Some(vop)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_vops(&self) -> Result<Vec<VirtualOperator>, LinkDbError> {
        self.request_json(Method::GET, "/api/vops", None::<&()>)
            .await
    }

    pub async fn delete_vop(&self, id: &str) -> Result<(), LinkDbError> {
        self.request_empty(Method::DELETE, &format!("/api/vops/{id}"), None::<&()>)
            .await
    }

    // ── Connection records ──────────────────────────────────────

    pub async fn upsert_connection(&self, conn: &Connection) -> Result<(), LinkDbError> {
        self.request_empty(Method::POST, "/api/connections", Some(conn))
            .await
    }

    pub async fn get_connection(&self, id: &str) -> Result<Option<Connection>, LinkDbError> {
        match self
            .request_json(Method::GET, &format!("/api/connections/{id}"), None::<&()>)
            .await
        {
            Ok(conn) => Ok(Some(conn)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_connections(&self) -> Result<Vec<Connection>, LinkDbError> {
        self.request_json(Method::GET, "/api/connections", None::<&()>)
            .await
    }

    pub async fn set_connection_status(
        &self,
        id: &str,
        status: ConnectionStatus,
    ) -> Result<(), LinkDbError> {
        self.request_empty(
            Method::POST,
            &format!("/api/connections/{id}/status"),
            Some(&serde_json::json!({"status": status})),
        )
        .await
    }

    // ── Plumbing ────────────────────────────────────────────────

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, LinkDbError> {
        let url = format!("{}{}", self.base, path);
        // Only transport failures retry; HTTP rejections are not transient.
        let resp = retry::with_backoff(self.backoff, "linkdb request", || {
            let mut req = self.http.request(method.clone(), url.as_str());
            if let Some(b) = body {
                req = req.json(b);
            }
            async move { req.send().await }
        })
        .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let (kind, message) = match resp.json::<serde_json::Value>().await {
            Ok(v) => (
                v["kind"].as_str().unwrap_or("unknown").to_string(),
                v["error"].as_str().unwrap_or("unknown error").to_string(),
            ),
            Err(_) => ("unknown".into(), format!("http status {status}")),
        };
        Err(LinkDbError::Rejected {
            status: status.as_u16(),
            kind: normalize_kind(status, &kind),
            message,
        })
    }

    async fn request_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, LinkDbError> {
        let resp = self.send(method, path, body).await?;
        Ok(resp.json().await?)
    }

    async fn request_empty<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), LinkDbError> {
        self.send(method, path, body).await.map(|_| ())
    }
}

/// Some endpoints answer with a bare status and no error body.
fn normalize_kind(status: StatusCode, kind: &str) -> String {
    if kind != "unknown" {
        return kind.to_string();
    }
    match status {
        StatusCode::NOT_FOUND => "not_found".into(),
        StatusCode::CONFLICT => "conflict".into(),
        _ => "unknown".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_kind_helpers() {
        let err = LinkDbError::Rejected {
            status: 409,
            kind: "no_spectrum".into(),
            message: "no contiguous block".into(),
        };
        assert!(err.is_no_spectrum());
        assert!(!err.is_not_found());
        assert_eq!(err.kind(), "no_spectrum");
    }

    #[test]
    fn bare_status_normalization() {
        assert_eq!(normalize_kind(StatusCode::NOT_FOUND, "unknown"), "not_found");
        assert_eq!(normalize_kind(StatusCode::CONFLICT, "unknown"), "conflict");
        assert_eq!(
            normalize_kind(StatusCode::CONFLICT, "no_spectrum"),
            "no_spectrum"
        );
    }
}
