use std::{net::IpAddr, time::Duration};

use getset::Getters;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    config::{
        DEFAULT_PROBE_FAILURE_THRESHOLD, DEFAULT_PROBE_PATH, DEFAULT_PROBE_PERIOD_MS,
        DEFAULT_PROBE_SCHEME, DEFAULT_PROBE_SUCCESS_THRESHOLD, DEFAULT_PROBE_TIMEOUT_MS,
        DEFAULT_WORKLOAD_PORT,
    },
    MonofleetError, MonofleetResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The HTTP GET a probe issues on every tick.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Getters, Serialize, Deserialize)]
#[getset(get = "pub with_prefix")]
pub struct HttpGetAction {
    /// `http` or `https`.
    #[builder(default = DEFAULT_PROBE_SCHEME.to_string(), setter(into))]
    scheme: String,

    /// The machine address.
    host: IpAddr,

    /// The port the workload answers on.
    #[builder(default = DEFAULT_WORKLOAD_PORT)]
    port: u16,

    /// The health endpoint.
    #[builder(default = DEFAULT_PROBE_PATH.to_string(), setter(into))]
    path: String,
}

/// How one machine is probed for readiness.
///
/// A spec is fixed once the probe driver for the machine has started.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Getters, Serialize, Deserialize)]
#[getset(get = "pub with_prefix")]
pub struct ProbeSpec {
    /// The probe target.
    http_get: HttpGetAction,

    /// Delay before the first probe.
    #[builder(default = Duration::ZERO)]
    initial_delay: Duration,

    /// Interval between probes.
    #[builder(default = Duration::from_millis(DEFAULT_PROBE_PERIOD_MS))]
    period: Duration,

    /// Timeout of a single probe request.
    #[builder(default = Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS))]
    timeout: Duration,

    /// Consecutive positive outcomes needed to become ready.
    #[builder(default = DEFAULT_PROBE_SUCCESS_THRESHOLD)]
    success_threshold: u32,

    /// Consecutive negative outcomes needed to become unready.
    #[builder(default = DEFAULT_PROBE_FAILURE_THRESHOLD)]
    failure_threshold: u32,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HttpGetAction {
    /// Builds `scheme://host:port/path`, bracketing IPv6 hosts.
    pub fn url(&self) -> MonofleetResult<Url> {
        let host = match self.host {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        let raw = format!("{}://{}:{}{}", self.scheme, host, self.port, path);
        Url::parse(&raw).map_err(|e| MonofleetError::InvalidUrl(format!("{raw}: {e}")))
    }
}

impl ProbeSpec {
    /// The URL probed on every tick.
    pub fn url(&self) -> MonofleetResult<Url> {
        self.http_get.url()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
