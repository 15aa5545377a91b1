//! Runtime building blocks shared by the state machines.

mod ticker;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use ticker::*;
