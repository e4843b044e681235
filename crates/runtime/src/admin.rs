//! Admin HTTP API in front of the supervisor.
//!
//! Step services call `ensure-service` to have their successor spawned;
//! operators use the listing, stop and simulate routes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bizobs_supervisor::{ServiceSummary, Supervisor, SupervisorError};
use bizobs_types::{ChainResponse, EnsureServiceRequest, EnsureServiceResponse, JourneyRequest};
use bizobs_util::TraceHeaders;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::journey::{JourneyError, JourneyOrchestrator};
use crate::provision::ENSURE_SERVICE_PATH;
use crate::server::RunningServer;

#[derive(Debug, Clone)]
struct AdminState {
    supervisor: Arc<Supervisor>,
    orchestrator: JourneyOrchestrator,
}

/// Routes of the admin API.
pub fn admin_router(orchestrator: JourneyOrchestrator) -> Router {
    let state = AdminState {
        supervisor: Arc::clone(orchestrator.supervisor()),
        orchestrator,
    };
    Router::new()
        .route(ENSURE_SERVICE_PATH, post(ensure_service))
        .route("/api/admin/services", get(list_services))
        .route("/api/admin/stop-all", post(stop_all))
        .route("/api/health", get(health))
        .route("/api/journey/simulate", post(simulate_journey))
        .with_state(state)
}

/// Binds the admin API and tells the supervisor where it listens, so every
/// child spawned afterwards can reach it.
pub async fn start_admin_server(bind_address: SocketAddr, orchestrator: JourneyOrchestrator) -> Result<RunningServer> {
    let supervisor = Arc::clone(orchestrator.supervisor());
    let server = RunningServer::bind(bind_address, admin_router(orchestrator)).await?;
    supervisor.set_admin_url(Some(server.url()));
    info!(address = %server.bound_address(), "admin server listening");
    Ok(server)
}

async fn ensure_service(State(state): State<AdminState>, Json(request): Json<EnsureServiceRequest>) -> Result<Json<EnsureServiceResponse>, ApiError> {
    let identity = state.supervisor.ensure(&request.step, &request.context).await?;
    Ok(Json(EnsureServiceResponse {
        service_name: identity.service_name,
        port: identity.port,
        pid: identity.pid,
        running: true,
    }))
}

async fn list_services(State(state): State<AdminState>) -> Json<Vec<ServiceSummary>> {
    Json(state.supervisor.services().await)
}

async fn stop_all(State(state): State<AdminState>) -> Json<Value> {
    let stopped = state.supervisor.services().await.len();
    state.supervisor.stop_all().await;
    Json(json!({ "stopped": stopped }))
}

async fn health(State(state): State<AdminState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "services": state.supervisor.services().await.len(),
        "timestamp": Utc::now(),
    }))
}

async fn simulate_journey(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Json(request): Json<JourneyRequest>,
) -> Result<Json<ChainResponse>, ApiError> {
    let headers = TraceHeaders::from_pairs(headers.iter().filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))));
    let response = state.orchestrator.run(request, headers).await?;
    Ok(Json(response))
}

/// Error body `{ "error": ..., "kind": ... }` with a matching status code.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, kind = self.kind, error = %self.message, "admin request failed");
        (self.status, Json(json!({ "error": self.message, "kind": self.kind }))).into_response()
    }
}

impl From<SupervisorError> for ApiError {
    fn from(error: SupervisorError) -> Self {
        let (status, kind) = match &error {
            SupervisorError::UnresolvableName { .. } => (StatusCode::BAD_REQUEST, "unresolvable_name"),
            SupervisorError::PortRangeExhausted { .. } => (StatusCode::SERVICE_UNAVAILABLE, "port_range_exhausted"),
            SupervisorError::SpawnFailure { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "spawn"),
            SupervisorError::ReadinessTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "readiness"),
            SupervisorError::NotAllocated { .. } => (StatusCode::NOT_FOUND, "not_allocated"),
        };
        Self {
            status,
            kind,
            message: error.to_string(),
        }
    }
}

impl From<JourneyError> for ApiError {
    fn from(error: JourneyError) -> Self {
        match error {
            JourneyError::EmptyJourney => Self {
                status: StatusCode::BAD_REQUEST,
                kind: "empty_journey",
                message: error.to_string(),
            },
            JourneyError::Supervisor(error) => error.into(),
            JourneyError::Chain(error) => Self {
                status: StatusCode::BAD_GATEWAY,
                kind: error.kind.as_str(),
                message: error.to_string(),
            },
        }
    }
}
