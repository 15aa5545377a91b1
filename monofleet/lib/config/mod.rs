//! Configuration types and defaults.

mod defaults;
mod fleet;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use fleet::*;
