//! HTTP surface of the fleet.
//!
//! The REST API lets clients start machines, list them, relay work to ready ones and check the
//! health of the supervisor. The echo workload is a stand-in service meant to run inside a
//! machine.

mod echo;
mod handlers;
mod routes;
mod state;
mod types;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use echo::*;
pub use handlers::*;
pub use routes::*;
pub use state::*;
pub use types::*;
