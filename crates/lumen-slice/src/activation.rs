//! vOp activation and deactivation.
//!
//! Activation runs a strict sequence: validate, reserve interfaces, ensure
//! topics, store the vOp record, notify the deployment hook. Any failure
//! after the reservation step releases the reservations before returning, so
//! a failed activation leaves no partial state behind.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use lumen_common::ids;
use lumen_common::linkdb::LinkDbError;
use lumen_common::models::{InterfaceRef, TopicSet, VirtualOperator, VopStatus};

use crate::state::AppState;

/// Operator request to activate a tenant slice.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivationRequest {
    pub vop_id: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub interface_assignments: Vec<InterfaceAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceAssignment {
    pub pop: String,
    pub router: String,
    pub interfaces: Vec<String>,
}

impl ActivationRequest {
    fn interface_refs(&self) -> Vec<InterfaceRef> {
        self.interface_assignments
            .iter()
            .flat_map(|a| {
                a.interfaces.iter().map(|iface| InterfaceRef {
                    pop_id: a.pop.clone(),
                    router_id: a.router.clone(),
                    interface_id: iface.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("invalid vOp id {0:?}")]
    InvalidVopId(String),
    #[error("vOp {0} is already active")]
    AlreadyActive(String),
    #[error("interfaces unavailable: {0}")]
    InterfaceUnavailable(String),
    #[error("vOp {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl From<LinkDbError> for ActivationError {
    fn from(e: LinkDbError) -> Self {
        ActivationError::Infrastructure(anyhow::anyhow!(e))
    }
}

/// Activate a vOp. Returns the stored record on success.
pub async fn activate(
    state: &AppState,
    request: ActivationRequest,
) -> Result<VirtualOperator, ActivationError> {
    if !ids::valid_vop_id(&request.vop_id) {
        return Err(ActivationError::InvalidVopId(request.vop_id));
    }
    let vop_id = request.vop_id.clone();

    if let Some(existing) = state.linkdb().get_vop(&vop_id).await? {
        if existing.status == VopStatus::Active {
            return Err(ActivationError::AlreadyActive(vop_id));
        }
    }

    // Reservation is atomic in LinkDB: every interface must exist, be
    // unowned, and have a transceiver, or the full failure list comes back.
    let refs = request.interface_refs();
    if let Err(e) = state.linkdb().reserve_interfaces(&vop_id, &refs).await {
        return Err(match e {
            LinkDbError::Rejected { ref message, .. } if e.kind() == "interface_unavailable" => {
                ActivationError::InterfaceUnavailable(message.clone())
            }
            other => other.into(),
        });
    }

    let vop = VirtualOperator {
        id: vop_id.clone(),
        tenant: request.tenant_name.unwrap_or_else(|| vop_id.clone()),
        description: request.description,
        status: VopStatus::Active,
        interfaces: refs,
        topics: TopicSet::for_vop(&vop_id),
        created_at: Utc::now(),
    };

    if let Err(e) = state.topics().ensure_topics(&vop.topics).await {
        rollback_reservation(state, &vop_id).await;
        return Err(ActivationError::Infrastructure(e));
    }

    if let Err(e) = state.linkdb().put_vop(&vop).await {
        rollback_reservation(state, &vop_id).await;
        return Err(e.into());
    }

    state.notify_hook(&vop_id, "deploy").await;

    tracing::info!(
        vop = %vop_id,
        interfaces = vop.interfaces.len(),
        "vOp activated"
    );
    Ok(vop)
}

async fn rollback_reservation(state: &AppState, vop_id: &str) {
    if let Err(e) = state.linkdb().release_interfaces(vop_id).await {
        tracing::error!(vop = %vop_id, error = %e, "rollback failed; interfaces may leak");
    }
}

/// Deactivate a vOp: stop the controller, release interfaces, mark deleted.
///
/// Topics are retained by operator policy.
pub async fn deactivate(state: &AppState, vop_id: &str) -> Result<(), ActivationError> {
    let mut vop = state
        .linkdb()
        .get_vop(vop_id)
        .await?
        .ok_or_else(|| ActivationError::NotFound(vop_id.to_string()))?;

    vop.status = VopStatus::Deactivating;
    state.linkdb().put_vop(&vop).await?;

    state.notify_hook(vop_id, "stop").await;
    state.linkdb().release_interfaces(vop_id).await?;

    vop.status = VopStatus::Deleted;
    vop.interfaces.clear();
    state.linkdb().put_vop(&vop).await?;

    tracing::info!(vop = %vop_id, "vOp deactivated");
    Ok(())
}
