use std::{
    borrow::Borrow,
    fmt::{self, Display},
    net::IpAddr,
    path::PathBuf,
    sync::Arc,
};

use async_trait::async_trait;
use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::MonofleetResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The unique identity of a machine. Assigned by the driver when the machine starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

/// What the fleet knows about a running machine.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[getset(get = "pub with_prefix")]
pub struct MachineMetadata {
    /// The identity of the machine.
    id: MachineId,

    /// The address the machine is reachable at.
    address: IpAddr,
}

/// Creates, supervises and destroys one machine process.
///
/// A driver instance is owned by exactly one lifecycle controller and is used for a single
/// machine. The controller calls `start` once and, after it succeeds, races `wait` against
/// its own shutdown requests.
#[async_trait]
pub trait MachineDriver: Send + Sync + 'static {
    /// Creates the machine and returns once it is running and addressable.
    async fn start(&self) -> MonofleetResult<MachineMetadata>;

    /// Resolves when the machine process exits for any reason.
    async fn wait(&self) -> MonofleetResult<()>;

    /// Asks the machine to power off and resolves once it has.
    ///
    /// The caller bounds this with its own deadline.
    async fn shutdown(&self) -> MonofleetResult<()>;

    /// Terminates the machine process unconditionally.
    async fn kill(&self) -> MonofleetResult<()>;

    /// Tears down the network attachment of the machine.
    async fn release_network(&self, id: &MachineId) -> MonofleetResult<()>;

    /// The isolated filesystem root the machine ran in, if any.
    fn isolated_root(&self) -> Option<PathBuf> {
        None
    }
}

/// Creates a fresh driver for every machine the fleet starts.
pub trait DriverFactory: Send + Sync + 'static {
    /// Creates a new, not yet started, driver.
    fn create(&self) -> MonofleetResult<Arc<dyn MachineDriver>>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MachineId {
    /// Creates a new machine id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl MachineMetadata {
    /// Creates new machine metadata.
    pub fn new(id: impl Into<MachineId>, address: IpAddr) -> Self {
        Self {
            id: id.into(),
            address,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MachineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for MachineId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for MachineId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<F> DriverFactory for F
where
    F: Fn() -> MonofleetResult<Arc<dyn MachineDriver>> + Send + Sync + 'static,
{
    fn create(&self) -> MonofleetResult<Arc<dyn MachineDriver>> {
        self()
    }
}
