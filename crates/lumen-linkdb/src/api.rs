//! REST surface of LinkDB.
//!
//! Topology provisioning, spectrum allocation, interface reservation, and
//! the vOp/connection registries all pass through this router. Controllers
//! and agents are stateless; everything they reconstruct on restart comes
//! from these endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lumen_common::models::{
    Allocation, ComputedPath, Connection, ConnectionStatus, Interface, InterfaceRef, Link, Pop,
    Router as TopoRouter, SlotState, Topology, VirtualOperator,
};

use crate::store::{Store, StoreError};

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub default_slot_count: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/topology", get(get_topology))
        .route("/api/pops", get(list_pops).post(create_pop))
        .route("/api/pops/{id}", delete(delete_pop))
        .route("/api/pops/{id}/routers", post(create_router))
        .route("/api/pops/{id}/routers/{router_id}", delete(delete_router))
        .route("/api/links", post(create_link))
        .route("/api/links/{id}", delete(delete_link))
        .route("/api/frequencies/{link_id}", get(get_frequencies))
        .route("/api/paths/{src}/{dst}", get(get_paths))
        .route("/api/connections/allocate", post(allocate))
        .route("/api/connections", get(list_connections).post(upsert_connection))
        .route("/api/connections/{id}", get(get_connection).delete(release_connection))
        .route("/api/connections/{id}/status", post(set_connection_status))
        .route("/api/interfaces/reserve", post(reserve_interfaces))
        .route("/api/interfaces/release", post(release_interfaces))
        .route("/api/vops", get(list_vops))
        .route("/api/vops/{id}", get(get_vop).put(put_vop).delete(delete_vop))
}

// ── Health & topology ───────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "lumen-linkdb"}))
}

async fn get_topology(State(state): State<AppState>) -> Json<Topology> {
    Json(state.store.topology().await)
}

async fn list_pops(State(state): State<AppState>) -> Json<Vec<Pop>> {
    Json(state.store.topology().await.pops)
}

// ── POPs ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InterfaceSpec {
    pub id: String,
    pub port: u32,
    #[serde(default = "default_true")]
    pub transceiver_present: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RouterSpec {
    pub id: String,
    #[serde(default)]
    pub interfaces: Vec<InterfaceSpec>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePopRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub routers: Vec<RouterSpec>,
}

async fn create_pop(
    State(state): State<AppState>,
    Json(body): Json<CreatePopRequest>,
) -> Result<(StatusCode, Json<Pop>), ApiError> {
    if body.id.is_empty() {
        return Err(ApiError::bad_request("pop id must not be empty"));
    }
    let pop = Pop {
        routers: body
            .routers
            .into_iter()
            .map(|r| TopoRouter {
                id: r.id,
                pop_id: body.id.clone(),
                interfaces: r
                    .interfaces
                    .into_iter()
                    .map(|i| Interface {
                        id: i.id,
                        port: i.port,
                        owner: None,
                        admin_up: true,
                        oper_up: true,
                        transceiver_present: i.transceiver_present,
                    })
                    .collect(),
            })
            .collect(),
        id: body.id,
        name: body.name,
        location: body.location,
    };
    state.store.add_pop(pop.clone()).await?;
    tracing::info!(pop = %pop.id, routers = pop.routers.len(), "pop created");
    Ok((StatusCode::CREATED, Json(pop)))
}

async fn delete_pop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_pop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_router(
    State(state): State<AppState>,
    Path(pop_id): Path<String>,
    Json(body): Json<RouterSpec>,
) -> Result<StatusCode, ApiError> {
    let router = TopoRouter {
        id: body.id,
        pop_id: pop_id.clone(),
        interfaces: body
            .interfaces
            .into_iter()
            .map(|i| Interface {
                id: i.id,
                port: i.port,
                owner: None,
                admin_up: true,
                oper_up: true,
                transceiver_present: i.transceiver_present,
            })
            .collect(),
    };
    state.store.add_router(&pop_id, router).await?;
    Ok(StatusCode::CREATED)
}

async fn delete_router(
    State(state): State<AppState>,
    Path((pop_id, router_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_router(&pop_id, &router_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Links ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub id: Option<String>,
    pub pop_a: String,
    pub pop_b: String,
    pub distance_km: f64,
    pub slot_count: Option<usize>,
}

async fn create_link(
    State(state): State<AppState>,
    Json(body): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<Link>), ApiError> {
    let id = body
        .id
        .unwrap_or_else(|| format!("link-{}-{}", body.pop_a, body.pop_b));
    let link = Link {
        id,
        pop_a: body.pop_a,
        pop_b: body.pop_b,
        distance_km: body.distance_km,
        slots: Vec::new(),
    };
    let slot_count = body.slot_count.unwrap_or(state.default_slot_count);
    let link = state.store.add_link(link, slot_count).await?;
    tracing::info!(link = %link.id, slots = link.slots.len(), "link created");
    Ok((StatusCode::CREATED, Json(link)))
}

async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_link(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_frequencies(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
) -> Result<Json<Vec<SlotState>>, ApiError> {
    Ok(Json(state.store.frequencies(&link_id).await?))
}

// ── Paths ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PathParams {
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    3
}

async fn get_paths(
    State(state): State<AppState>,
    Path((src, dst)): Path<(String, String)>,
    Query(params): Query<PathParams>,
) -> Result<Json<Vec<ComputedPath>>, ApiError> {
    Ok(Json(state.store.paths(&src, &dst, params.k).await?))
}

// ── Spectrum allocation ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub connection_id: String,
    pub path: Vec<String>,
    pub slots_required: usize,
}

async fn allocate(
    State(state): State<AppState>,
    Json(body): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<Allocation>), ApiError> {
    let range = state
        .store
        .allocate(&body.connection_id, &body.path, body.slots_required)
        .await?;
    tracing::info!(
        connection = %body.connection_id,
        start = range.start,
        count = range.count,
        "spectrum allocated"
    );
    Ok((
        StatusCode::CREATED,
        Json(Allocation {
            connection_id: body.connection_id,
            path: body.path,
            range,
        }),
    ))
}

async fn release_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.store.release(&id).await {
        tracing::info!(connection = %id, "spectrum released");
    }
    StatusCode::NO_CONTENT
}

// ── Connection records ──────────────────────────────────────────────

async fn upsert_connection(
    State(state): State<AppState>,
    Json(conn): Json<Connection>,
) -> StatusCode {
    state.store.upsert_connection(conn).await;
    StatusCode::NO_CONTENT
}

async fn list_connections(State(state): State<AppState>) -> Json<Vec<Connection>> {
    Json(state.store.list_connections().await)
}

async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Connection>, ApiError> {
    state
        .store
        .get_connection(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("connection not found"))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
}

async fn set_connection_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> Result<StatusCode, ApiError> {
    state.store.set_connection_status(&id, body.status).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Interface reservation ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub vop_id: String,
    pub interfaces: Vec<InterfaceRef>,
}

async fn reserve_interfaces(
    State(state): State<AppState>,
    Json(body): Json<ReserveRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .reserve_interfaces(&body.vop_id, &body.interfaces)
        .await?;
    tracing::info!(vop = %body.vop_id, count = body.interfaces.len(), "interfaces reserved");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub vop_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: usize,
}

async fn release_interfaces(
    State(state): State<AppState>,
    Json(body): Json<ReleaseRequest>,
) -> Json<ReleaseResponse> {
    let released = state.store.release_interfaces(&body.vop_id).await;
    tracing::info!(vop = %body.vop_id, released, "interfaces released");
    Json(ReleaseResponse { released })
}

// ── vOp registry ────────────────────────────────────────────────────

async fn list_vops(State(state): State<AppState>) -> Json<Vec<VirtualOperator>> {
    Json(state.store.list_vops().await)
}

async fn get_vop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VirtualOperator>, ApiError> {
    state
        .store
        .get_vop(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("vop not found"))
}

async fn put_vop(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(vop): Json<VirtualOperator>,
) -> Result<StatusCode, ApiError> {
    if vop.id != id {
        return Err(ApiError::bad_request("vop id mismatch"));
    }
    state.store.put_vop(vop).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_vop(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.store.delete_vop(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "validation",
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: msg.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NoSpectrum { .. }
            | StoreError::Conflict(_)
            | StoreError::InterfaceUnavailable(_) => StatusCode::CONFLICT,
            StoreError::PathInfeasible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message, "kind": self.kind });
        (self.status, Json(body)).into_response()
    }
}
