use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};

use crate::MonofleetResult;

use super::Signal;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The user agent sent with every probe request.
pub const PROBE_USER_AGENT: &str = concat!("monofleet/", env!("CARGO_PKG_VERSION"));

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Performs a single health check against a machine.
///
/// Implementations must not retry. The next tick is the retry.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    /// Checks `url` once, giving up after `timeout`.
    async fn probe(&self, url: &Url, timeout: Duration) -> Signal;
}

/// The default prober. Issues one `GET` per check.
///
/// Any 2xx response is positive. Transport errors, timeouts and every other status are
/// negative.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HttpProber {
    /// Creates a prober with the default user agent.
    pub fn new() -> MonofleetResult<Self> {
        Self::with_user_agent(PROBE_USER_AGENT)
    }

    /// Creates a prober sending a custom user agent.
    pub fn with_user_agent(user_agent: &str) -> MonofleetResult<Self> {
        let client = Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &Url, timeout: Duration) -> Signal {
        let response = self
            .client
            .get(url.clone())
            .header(header::CONNECTION, "close")
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => Signal::Ready,
            Ok(response) => {
                tracing::debug!(url = %url, status = %response.status(), "probe failed");
                Signal::Unready
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "probe failed");
                Signal::Unready
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(router: Router) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(addr)
    }

    #[tokio::test]
    async fn test_http_prober_classifies_status() -> anyhow::Result<()> {
        let router = Router::new()
            .route("/ok", get(|| async { StatusCode::NO_CONTENT }))
            .route("/fail", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/moved", get(|| async { StatusCode::NOT_MODIFIED }));
        let addr = serve(router).await?;
        let prober = HttpProber::new()?;
        let timeout = Duration::from_secs(2);

        let url = Url::parse(&format!("http://{addr}/ok"))?;
        assert_eq!(prober.probe(&url, timeout).await, Signal::Ready);

        let url = Url::parse(&format!("http://{addr}/fail"))?;
        assert_eq!(prober.probe(&url, timeout).await, Signal::Unready);

        let url = Url::parse(&format!("http://{addr}/moved"))?;
        assert_eq!(prober.probe(&url, timeout).await, Signal::Unready);

        let url = Url::parse(&format!("http://{addr}/missing"))?;
        assert_eq!(prober.probe(&url, timeout).await, Signal::Unready);

        Ok(())
    }

    #[tokio::test]
    async fn test_http_prober_times_out() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        );
        let addr = serve(router).await?;
        let prober = HttpProber::new()?;

        let url = Url::parse(&format!("http://{addr}/slow"))?;
        let started = tokio::time::Instant::now();
        assert_eq!(
            prober.probe(&url, Duration::from_millis(100)).await,
            Signal::Unready
        );
        assert!(started.elapsed() < Duration::from_secs(2));

        Ok(())
    }

    #[tokio::test]
    async fn test_http_prober_connection_refused_is_negative() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let prober = HttpProber::new()?;
        let url = Url::parse(&format!("http://{addr}/health"))?;
        assert_eq!(
            prober.probe(&url, Duration::from_secs(1)).await,
            Signal::Unready
        );

        Ok(())
    }
}
