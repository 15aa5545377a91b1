//! HTTP request handlers for the REST API.
//!
//! Every handler delegates to the fleet supervisor held in the server state.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::{
    state::ServerState,
    types::{HealthResponse, MachineStatus, RunResponse, StandardError},
};
use crate::fleet::WorkloadRequest;

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for the POST /vm/run endpoint
///
/// Starts one machine and returns its id and address
pub async fn run_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match state.fleet().start_machine().await {
        Ok(metadata) => (StatusCode::OK, Json(RunResponse::from(metadata))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to run machine");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("machine start error: {e}"),
            )
        }
    }
}

/// Handler for the POST /service/invoke endpoint
///
/// Relays the request to a ready machine
pub async fn invoke_handler(
    State(state): State<ServerState>,
    Json(request): Json<WorkloadRequest>,
) -> impl IntoResponse {
    match state.fleet().invoke(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("HTTP invocation error: {e}"),
        ),
    }
}

/// Handler for the GET /vm endpoint
///
/// Lists every registered machine
pub async fn list_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let mut machines: Vec<MachineStatus> = state
        .fleet()
        .registry()
        .snapshot()
        .iter()
        .map(MachineStatus::from)
        .collect();
    machines.sort_by(|a, b| a.id.cmp(&b.id));

    (StatusCode::OK, Json(machines))
}

/// Handler for the GET /health/ready endpoint
pub async fn ready_handler(State(state): State<ServerState>) -> impl IntoResponse {
    health_response(state.fleet().health().is_accepting())
}

/// Handler for the GET /health/alive endpoint
pub async fn alive_handler(State(state): State<ServerState>) -> impl IntoResponse {
    health_response(state.fleet().health().is_healthy())
}

//-------------------------------------------------------------------------------------------------
// Functions: Helpers
//-------------------------------------------------------------------------------------------------

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (
        status,
        Json(StandardError {
            code: status.as_u16(),
            message,
        }),
    )
        .into_response()
}

fn health_response(up: bool) -> axum::response::Response {
    if up {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable".into(),
            }),
        )
            .into_response()
    }
}
