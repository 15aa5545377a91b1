//! `monofleet` supervises a fleet of microVM workers, probes their health and routes work to the
//! ready ones.
//!
//! # Overview
//!
//! Every machine is owned by a controller actor that starts it through a [`machine::MachineDriver`],
//! probes it over HTTP and tears it down again. The [`fleet::FleetSupervisor`] starts machines on
//! demand, keeps a registry of the live ones and relays work only to machines whose readiness
//! probe currently passes.
//!
//! # Architecture
//!
//! - **Machine**: the driver abstraction, the shipped process driver and the address pool
//! - **Probe**: HTTP health checks, readiness hysteresis and the periodic probe driver
//! - **Lifecycle**: the per-machine controller actor and its messages
//! - **Fleet**: registry, backend selection, workload relay and the supervisor
//! - **Server**: REST API over the supervisor, plus an echo workload for machines
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use monofleet::{
//!     config::FleetConfig,
//!     fleet::{FleetOptions, FleetSupervisor, WorkloadRequest},
//!     machine::ProcessDriverFactory,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = FleetConfig::default();
//!     config.machine_mut().set_exec_path("/usr/local/bin/monofleet");
//!     config.machine_mut().set_args(vec!["echo".into()]);
//!
//!     let factory = ProcessDriverFactory::new(config.get_machine().clone());
//!     let fleet = FleetSupervisor::start(
//!         FleetOptions::builder()
//!             .config(config)
//!             .driver_factory(Arc::new(factory))
//!             .build(),
//!     )?;
//!
//!     let machine = fleet.start_machine().await?;
//!     println!("started {} at {}", machine.get_id(), machine.get_address());
//!
//!     let response = fleet.invoke(WorkloadRequest::default()).await?;
//!     println!("status {}", response.status_code);
//!
//!     fleet.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration types and defaults
//! - [`fleet`] - The fleet supervisor and its collaborators
//! - [`lifecycle`] - Per-machine controller actors
//! - [`log`] - Logging setup and machine console logs
//! - [`machine`] - Machine drivers
//! - [`probe`] - Health probing
//! - [`runtime`] - Periodic task helpers
//! - [`server`] - REST API server implementation
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod fleet;
pub mod lifecycle;
pub mod log;
pub mod machine;
pub mod probe;
pub mod runtime;
pub mod server;
pub mod utils;

pub use error::*;
