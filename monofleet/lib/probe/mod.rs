//! Readiness probing of running machines.

mod driver;
mod http;
mod readiness;
mod spec;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use driver::*;
pub use http::*;
pub use readiness::*;
pub use spec::*;
