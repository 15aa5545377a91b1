//! Request and response bodies of the REST API.

use serde::{Deserialize, Serialize};

use crate::{fleet::RegistryEntry, machine::MachineMetadata};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Response body for `POST /vm/run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    /// The id of the started machine
    pub id: String,

    /// The address of the started machine
    pub ip: String,
}

/// One machine in the response of `GET /vm`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatus {
    /// The id of the machine
    pub id: String,

    /// The address of the machine
    pub ip: String,

    /// Whether the machine receives work
    pub ready: bool,
}

/// Error body returned when an operation fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardError {
    /// The HTTP status code
    pub code: u16,

    /// What went wrong
    pub message: String,
}

/// Body of the health endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `unavailable`
    pub status: String,
}

//-------------------------------------------------------------------------------------------------
// Trait Implementations
//-------------------------------------------------------------------------------------------------

impl From<MachineMetadata> for RunResponse {
    fn from(metadata: MachineMetadata) -> Self {
        Self {
            id: metadata.get_id().to_string(),
            ip: metadata.get_address().to_string(),
        }
    }
}

impl From<&RegistryEntry> for MachineStatus {
    fn from(entry: &RegistryEntry) -> Self {
        Self {
            id: entry.get_id().to_string(),
            ip: entry.get_address().to_string(),
            ready: *entry.get_ready(),
        }
    }
}
