//! Shared state of the HTTP server.

use std::sync::Arc;

use crate::fleet::FleetSupervisor;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared server state containing the fleet supervisor
///
/// Cloned into every request handler.
#[derive(Clone)]
pub struct ServerState {
    /// The fleet every request is served by
    fleet: Arc<FleetSupervisor>,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ServerState {
    /// Creates a new ServerState instance
    pub fn new(fleet: Arc<FleetSupervisor>) -> Self {
        Self { fleet }
    }

    /// Gets the fleet supervisor
    pub fn fleet(&self) -> &Arc<FleetSupervisor> {
        &self.fleet
    }
}
