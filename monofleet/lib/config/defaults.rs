use std::{path::PathBuf, sync::LazyLock};

use crate::utils::MONOFLEET_HOME_DIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long `start_machine` waits for a controller to report back, in milliseconds.
pub const DEFAULT_START_TIMEOUT_MS: u64 = 30_000;

/// How long `close` waits for each machine to acknowledge a stop, in milliseconds.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 1_000;

/// How long a machine gets to power off gracefully before it is killed, in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

/// The port the workload listens on inside every machine.
pub const DEFAULT_WORKLOAD_PORT: u16 = 8080;

/// The scheme used to probe a machine.
pub const DEFAULT_PROBE_SCHEME: &str = "http";

/// The path probed for readiness.
pub const DEFAULT_PROBE_PATH: &str = "/health";

/// Delay before the first probe, in milliseconds.
pub const DEFAULT_PROBE_INITIAL_DELAY_MS: u64 = 0;

/// Interval between probes, in milliseconds.
pub const DEFAULT_PROBE_PERIOD_MS: u64 = 1_000;

/// Timeout of a single probe request, in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;

/// Consecutive successful probes needed to become ready.
pub const DEFAULT_PROBE_SUCCESS_THRESHOLD: u32 = 1;

/// Consecutive failed probes needed to become unready.
pub const DEFAULT_PROBE_FAILURE_THRESHOLD: u32 = 3;

/// The subnet machine addresses are allocated from.
pub const DEFAULT_MACHINE_SUBNET: &str = "10.0.0.0/24";

/// The directory holding per-machine network plugin state.
pub const DEFAULT_CNI_CACHE_DIR: &str = "/var/lib/cni";

/// Jailed roots may only be removed below this prefix.
pub const JAILER_CHROOT_PREFIX: &str = "/srv/";

/// Default host for the HTTP server.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default port for the HTTP server.
pub const DEFAULT_SERVER_PORT: u16 = 3456;

/// The path where all monofleet global data is stored.
pub static DEFAULT_MONOFLEET_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(MONOFLEET_HOME_DIR)
});
