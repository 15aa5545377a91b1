use std::{
    error::Error,
    fmt::{self, Display},
    time::Duration,
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a monofleet-related operation.
pub type MonofleetResult<T> = Result<T, MonofleetError>;

/// An error that occurred while managing the fleet.
#[derive(pretty_error_debug::Debug, Error)]
pub enum MonofleetError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred while (de)serializing JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred while (de)serializing YAML.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A request or response body was not valid base64.
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// A system call failed.
    #[error("system error: {0}")]
    Nix(#[from] nix::Error),

    /// An argument violated a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A machine with the same identity is already registered.
    #[error("machine already exists: {0}")]
    AlreadyExists(String),

    /// No registered machine is currently ready to receive work.
    #[error("no ready machine found")]
    NoReadyBackend,

    /// A machine did not report back within the start deadline.
    #[error("machine did not start within {0:?}")]
    StartTimeout(Duration),

    /// The machine driver failed to start a machine.
    #[error("machine start failed: {0}")]
    MachineStart(String),

    /// The machine exited with a failure.
    #[error("machine exited with failure: {0}")]
    MachineExit(String),

    /// A machine controller is no longer accepting messages.
    #[error("machine controller unavailable")]
    ControllerUnavailable,

    /// A machine did not acknowledge a stop request in time.
    #[error("machine {0} did not stop within {1:?}")]
    ShutdownTimeout(String, Duration),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A URL could not be built from its parts.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The configured subnet has no free addresses left.
    #[error("no free address left in subnet {0}")]
    IpPoolExhausted(String),

    /// A workload request named an HTTP method that does not exist.
    #[error("invalid http method: {0}")]
    InvalidHttpMethod(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MonofleetError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> MonofleetError {
        MonofleetError::Custom(AnyError {
            error: error.into(),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
