//! Per-machine lifecycle management.

mod controller;
mod messages;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use controller::*;
pub use messages::*;
