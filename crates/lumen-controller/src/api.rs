//! REST API of the per-vOp controller.
//!
//! GET    /api/v1/status                        — connections with QoT context
//! GET    /api/v1/topology/path/{src}/{dst}     — candidate paths from LinkDB
//! POST   /api/v1/connections                   — plan a connection
//! POST   /api/v1/connections/{id}/setup        — push it to the agents
//! POST   /api/v1/connections/{id}/reconfigure  — operator-triggered tx-power step
//! DELETE /api/v1/connections/{id}              — tear it down
//! GET    /api/v1/agents                        — agents seen on the health topic
//! GET    /health

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use lumen_common::models::{ComputedPath, Connection};

use crate::engine::{AgentView, ConnectionView, CreateConnectionRequest, EngineError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/topology/path/{src}/{dst}", get(topology_path))
        .route("/api/v1/connections", post(create_connection))
        .route("/api/v1/connections/{id}/setup", post(setup_connection))
        .route(
            "/api/v1/connections/{id}/reconfigure",
            post(reconfigure_connection),
        )
        .route("/api/v1/connections/{id}", delete(teardown_connection))
        .route("/api/v1/agents", get(agents))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "lumen-controller"}))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub vop_id: String,
    pub connections: Vec<ConnectionView>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let connections = state.status().await?;
    Ok(Json(StatusResponse {
        vop_id: state.vop_id().to_string(),
        connections,
    }))
}

async fn topology_path(
    State(state): State<AppState>,
    Path((src, dst)): Path<(String, String)>,
) -> Result<Json<Vec<ComputedPath>>, ApiError> {
    let paths = state
        .linkdb()
        .paths(&src, &dst, 3)
        .await
        .map_err(|e| ApiError::from(EngineError::from(e)))?;
    Ok(Json(paths))
}

async fn create_connection(
    State(state): State<AppState>,
    Json(body): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<Connection>), ApiError> {
    let conn = state.create(body).await?;
    Ok((StatusCode::CREATED, Json(conn)))
}

async fn setup_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Connection>, ApiError> {
    Ok(Json(state.setup(id).await?))
}

async fn reconfigure_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Connection>, ApiError> {
    Ok(Json(state.reconfigure(id).await?))
}

async fn teardown_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.teardown(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn agents(State(state): State<AppState>) -> Result<Json<Vec<AgentView>>, ApiError> {
    Ok(Json(state.agents().await?))
}

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::NoSpectrum(_)
            | EngineError::NoEndpoint(_)
            | EngineError::InvalidState { .. } => StatusCode::CONFLICT,
            EngineError::PathInfeasible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Infrastructure(_) => StatusCode::BAD_GATEWAY,
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
