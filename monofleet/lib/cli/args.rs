use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand};

use crate::{
    config::{DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT, DEFAULT_WORKLOAD_PORT},
    log::LogFormat,
};

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// monofleet - supervises a fleet of microVM workers and routes work to the ready ones
#[derive(Debug, Parser)]
#[command(name = "monofleet", author, about, version, styles=styles::styles())]
pub struct MonofleetArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<MonofleetSubcommand>,

    /// Log filter directive, overridden by `RUST_LOG`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// How log lines are rendered
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum MonofleetSubcommand {
    /// Run the fleet supervisor and its HTTP API
    #[command(name = "server")]
    Server {
        /// Address to listen on
        #[arg(long, default_value = DEFAULT_SERVER_HOST)]
        host: IpAddr,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,

        /// Fleet configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// How long a machine gets to exit after being asked to, in milliseconds
        #[arg(long)]
        shutdown_timeout_ms: Option<u64>,

        /// Program that runs a machine
        #[arg(long)]
        exec_path: Option<PathBuf>,

        /// Argument passed to the machine program, may be repeated
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the echo workload that answers probes and reflects requests
    #[command(name = "echo")]
    Echo {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_WORKLOAD_PORT)]
        port: u16,
    },
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
