//! REST API of the slice manager.
//!
//! POST   /api/v1/vops      — activate a vOp
//! GET    /api/v1/vops      — list vOps
//! GET    /api/v1/vops/{id} — vOp details
//! DELETE /api/v1/vops/{id} — deactivate
//! GET    /health

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use lumen_common::models::VirtualOperator;

use crate::activation::{self, ActivationError, ActivationRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/vops", get(list_vops).post(activate_vop))
        .route("/api/v1/vops/{id}", get(get_vop).delete(deactivate_vop))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "lumen-slice"}))
}

async fn activate_vop(
    State(state): State<AppState>,
    Json(body): Json<ActivationRequest>,
) -> Result<(StatusCode, Json<VirtualOperator>), ApiError> {
    let vop = activation::activate(&state, body).await?;
    Ok((StatusCode::CREATED, Json(vop)))
}

async fn list_vops(
    State(state): State<AppState>,
) -> Result<Json<Vec<VirtualOperator>>, ApiError> {
    let vops = state
        .linkdb()
        .list_vops()
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    Ok(Json(vops))
}

async fn get_vop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VirtualOperator>, ApiError> {
    state
        .linkdb()
        .get_vop(&id)
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("vop not found"))
}

async fn deactivate_vop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    activation::deactivate(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: msg.into(),
        }
    }
}

impl From<ActivationError> for ApiError {
    fn from(err: ActivationError) -> Self {
        let status = match &err {
            ActivationError::InvalidVopId(_) => StatusCode::BAD_REQUEST,
            ActivationError::AlreadyActive(_) | ActivationError::InterfaceUnavailable(_) => {
                StatusCode::CONFLICT
            }
            ActivationError::NotFound(_) => StatusCode::NOT_FOUND,
            ActivationError::Infrastructure(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
