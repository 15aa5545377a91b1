//! A minimal workload that runs inside a machine.
//!
//! It answers the health probe and echoes every other request back as JSON, which is enough to
//! exercise the probe and relay paths end to end.

use std::{collections::BTreeMap, future::Future, net::SocketAddr};

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::MonofleetResult;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// The body returned for every echoed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    /// The request method
    pub method: String,

    /// The request path
    pub path: String,

    /// The query string, empty if there was none
    pub query: String,

    /// The request headers; repeated headers are joined with `, `
    pub headers: BTreeMap<String, String>,

    /// The request body, lossily decoded as UTF-8
    pub body: String,
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates the router of the echo workload
pub fn create_echo_router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(echo_handler)
}

/// Serves the echo workload on `addr` until `shutdown` resolves
pub async fn serve_echo(
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> MonofleetResult<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "echo workload listening");

    axum::serve(listener, create_echo_router())
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("echo workload stopped");
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn echo_handler(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let mut joined: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        joined
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }

    Json(EchoResponse {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        headers: joined,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
