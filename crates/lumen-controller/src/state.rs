//! Shared application state: the handle REST handlers use to reach the
//! engine task.

use tokio::sync::{mpsc, oneshot};

use lumen_common::linkdb::LinkDbClient;
use lumen_common::models::Connection;

use crate::engine::{
    AgentView, ApiRequest, ConnectionView, CreateConnectionRequest, EngineError, EngineEvent,
};

#[derive(Clone)]
pub struct AppState {
    engine_tx: mpsc::Sender<EngineEvent>,
    linkdb: LinkDbClient,
    vop_id: String,
}

impl AppState {
    pub fn new(engine_tx: mpsc::Sender<EngineEvent>, linkdb: LinkDbClient, vop_id: String) -> Self {
        Self {
            engine_tx,
            linkdb,
            vop_id,
        }
    }

    pub fn linkdb(&self) -> &LinkDbClient {
        &self.linkdb
    }

    pub fn vop_id(&self) -> &str {
        &self.vop_id
    }

    pub async fn create(
        &self,
        request: CreateConnectionRequest,
    ) -> Result<Connection, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ApiRequest::Create { request, reply }).await?;
        Self::recv(rx).await?
    }

    pub async fn setup(&self, id: String) -> Result<Connection, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ApiRequest::Setup { id, reply }).await?;
        Self::recv(rx).await?
    }

    pub async fn reconfigure(&self, id: String) -> Result<Connection, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ApiRequest::Reconfigure { id, reply }).await?;
        Self::recv(rx).await?
    }

    pub async fn teardown(&self, id: String) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ApiRequest::Teardown { id, reply }).await?;
        Self::recv(rx).await?
    }

    pub async fn status(&self) -> Result<Vec<ConnectionView>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ApiRequest::Status { reply }).await?;
        Self::recv(rx).await
    }

    pub async fn agents(&self) -> Result<Vec<AgentView>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ApiRequest::Agents { reply }).await?;
        Self::recv(rx).await
    }

    async fn send(&self, request: ApiRequest) -> Result<(), EngineError> {
        self.engine_tx
            .send(EngineEvent::Api(request))
            .await
            .map_err(|_| EngineError::Infrastructure("engine unavailable".into()))
    }

    async fn recv<T>(rx: oneshot::Receiver<T>) -> Result<T, EngineError> {
        rx.await
            .map_err(|_| EngineError::Infrastructure("engine dropped reply".into()))
    }
}
