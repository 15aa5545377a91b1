//! The machine driver contract and the process-backed driver.

mod driver;
mod ip_pool;
mod process;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use driver::*;
pub use ip_pool::*;
pub use process::*;
