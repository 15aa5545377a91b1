//! The fleet: machine registry, request routing and the supervisor tying them together.

mod health;
mod registry;
mod selector;
mod supervisor;
mod workload;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use health::*;
pub use registry::*;
pub use selector::*;
pub use supervisor::*;
pub use workload::*;
