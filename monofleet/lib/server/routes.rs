//! Route definitions for the HTTP server.

use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers, state::ServerState};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates a new router with all API endpoints configured
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/vm", get(handlers::list_handler))
        .route("/vm/run", post(handlers::run_handler))
        .route("/service/invoke", post(handlers::invoke_handler))
        .route("/health/ready", get(handlers::ready_handler))
        .route("/health/alive", get(handlers::alive_handler))
        .with_state(state)
}
