use std::{
    collections::BTreeMap,
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use getset::Getters;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    probe::{HttpGetAction, ProbeSpec},
    utils, MonofleetError, MonofleetResult,
};

use super::{
    DEFAULT_CNI_CACHE_DIR, DEFAULT_MACHINE_SUBNET,
    DEFAULT_PROBE_FAILURE_THRESHOLD, DEFAULT_PROBE_INITIAL_DELAY_MS, DEFAULT_PROBE_PATH,
    DEFAULT_PROBE_PERIOD_MS, DEFAULT_PROBE_SCHEME, DEFAULT_PROBE_SUCCESS_THRESHOLD,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_START_TIMEOUT_MS,
    DEFAULT_STOP_TIMEOUT_MS, DEFAULT_WORKLOAD_PORT, JAILER_CHROOT_PREFIX,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The fleet configuration.
///
/// Usually loaded from a YAML file:
///
/// ```yaml
/// start_timeout_ms: 30000
/// workload_port: 8080
/// probe:
///   path: /health
///   failure_threshold: 3
/// machine:
///   exec_path: /usr/local/bin/firecracker
///   args: ["--id", "{id}", "--config-file", "/etc/monofleet/vm.json"]
///   network:
///     subnet: 10.0.0.0/24
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters, PartialEq)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct FleetConfig {
    /// How long to wait for a machine to start, in milliseconds.
    #[builder(default = DEFAULT_START_TIMEOUT_MS)]
    #[getset(skip)]
    start_timeout_ms: u64,

    /// How long to wait for each machine to stop when draining, in milliseconds.
    #[builder(default = DEFAULT_STOP_TIMEOUT_MS)]
    #[getset(skip)]
    stop_timeout_ms: u64,

    /// The port workloads listen on inside the machines.
    #[builder(default = DEFAULT_WORKLOAD_PORT)]
    workload_port: u16,

    /// The readiness probe applied to every machine.
    #[builder(default)]
    probe: ProbeConfig,

    /// How machines are launched.
    #[builder(default)]
    machine: MachineConfig,
}

/// The readiness probe template. The host is filled in per machine.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters, PartialEq, Eq)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct ProbeConfig {
    /// The scheme of the probe URL.
    #[builder(default = DEFAULT_PROBE_SCHEME.to_string(), setter(into))]
    scheme: String,

    /// The port of the probe URL.
    #[builder(default = DEFAULT_WORKLOAD_PORT)]
    port: u16,

    /// The path of the probe URL.
    #[builder(default = DEFAULT_PROBE_PATH.to_string(), setter(into))]
    path: String,

    /// Delay before the first probe, in milliseconds.
    #[builder(default = DEFAULT_PROBE_INITIAL_DELAY_MS)]
    initial_delay_ms: u64,

    /// Interval between probes, in milliseconds.
    #[builder(default = DEFAULT_PROBE_PERIOD_MS)]
    period_ms: u64,

    /// Timeout of a single probe, in milliseconds.
    #[builder(default = DEFAULT_PROBE_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Consecutive successes before a machine is ready.
    #[builder(default = DEFAULT_PROBE_SUCCESS_THRESHOLD)]
    success_threshold: u32,

    /// Consecutive failures before a machine is unready.
    #[builder(default = DEFAULT_PROBE_FAILURE_THRESHOLD)]
    failure_threshold: u32,
}

/// How a machine process is launched and torn down.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters, PartialEq)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct MachineConfig {
    /// The executable that runs one machine.
    #[builder(default = PathBuf::from("firecracker"), setter(into))]
    exec_path: PathBuf,

    /// Arguments passed to the executable. `{id}` and `{ip}` are substituted.
    #[builder(default)]
    args: Vec<String>,

    /// Extra environment variables for the executable.
    #[builder(default)]
    env: BTreeMap<String, String>,

    /// Graceful shutdown deadline, in milliseconds.
    #[builder(default = DEFAULT_SHUTDOWN_TIMEOUT_MS)]
    #[getset(skip)]
    shutdown_timeout_ms: u64,

    /// Where machine console logs are written.
    #[builder(default = utils::get_monofleet_home_path().join("log"), setter(into))]
    log_dir: PathBuf,

    /// Network attachment settings.
    #[builder(default)]
    network: NetworkConfig,

    /// Runs each machine inside its own jailed root when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    jailer: Option<JailerConfig>,
}

/// Network attachment settings.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters, PartialEq, Eq)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct NetworkConfig {
    /// The subnet machine addresses are allocated from.
    #[builder(default = default_subnet())]
    subnet: Ipv4Network,

    /// Per-machine network plugin state lives in `<cni_cache_dir>/<machine id>`.
    #[builder(default = PathBuf::from(DEFAULT_CNI_CACHE_DIR), setter(into))]
    cni_cache_dir: PathBuf,
}

/// Jailed root settings.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters, PartialEq, Eq)]
#[getset(get = "pub with_prefix")]
pub struct JailerConfig {
    /// The binary executed inside the jail. Its file name is part of the jail path.
    #[builder(setter(into))]
    exec_file: PathBuf,

    /// The base directory jails are created in. Must live under `/srv/`.
    #[builder(setter(into))]
    chroot_base_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FleetConfig {
    /// Loads and validates a configuration from a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> MonofleetResult<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: FleetConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// How long to wait for a machine to start.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// How long to wait for each machine to stop when draining.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Returns a mutable reference to the machine settings.
    pub fn machine_mut(&mut self) -> &mut MachineConfig {
        &mut self.machine
    }

    /// Checks the configuration for values that can never work.
    pub fn validate(&self) -> MonofleetResult<()> {
        if self.start_timeout_ms == 0 {
            return Err(MonofleetError::InvalidConfig(
                "start_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.stop_timeout_ms == 0 {
            return Err(MonofleetError::InvalidConfig(
                "stop_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.workload_port == 0 {
            return Err(MonofleetError::InvalidConfig(
                "workload_port must be greater than zero".into(),
            ));
        }

        self.probe.validate()?;
        self.machine.validate()
    }
}

impl ProbeConfig {
    /// Builds the probe spec for a machine reachable at `host`.
    pub fn to_spec(&self, host: IpAddr) -> ProbeSpec {
        let http_get = HttpGetAction::builder()
            .scheme(self.scheme.clone())
            .host(host)
            .port(self.port)
            .path(self.path.clone())
            .build();

        ProbeSpec::builder()
            .http_get(http_get)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .period(Duration::from_millis(self.period_ms))
            .timeout(Duration::from_millis(self.timeout_ms))
            .success_threshold(self.success_threshold)
            .failure_threshold(self.failure_threshold)
            .build()
    }

    fn validate(&self) -> MonofleetResult<()> {
        if self.period_ms == 0 {
            return Err(MonofleetError::InvalidConfig(
                "probe.period_ms must be greater than zero".into(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(MonofleetError::InvalidConfig(
                "probe.timeout_ms must be greater than zero".into(),
            ));
        }

        if self.port == 0 {
            return Err(MonofleetError::InvalidConfig(
                "probe.port must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

impl MachineConfig {
    /// Graceful shutdown deadline.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Overrides the graceful shutdown deadline.
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
    }

    /// Overrides the machine executable.
    pub fn set_exec_path(&mut self, exec_path: impl Into<PathBuf>) {
        self.exec_path = exec_path.into();
    }

    /// Overrides the machine arguments.
    pub fn set_args(&mut self, args: Vec<String>) {
        self.args = args;
    }

    fn validate(&self) -> MonofleetResult<()> {
        if self.shutdown_timeout_ms == 0 {
            return Err(MonofleetError::InvalidConfig(
                "machine.shutdown_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.network.subnet.size() < 4 {
            return Err(MonofleetError::InvalidConfig(format!(
                "machine.network.subnet {} is too small",
                self.network.subnet
            )));
        }

        if let Some(jailer) = &self.jailer {
            let base = jailer.chroot_base_dir.to_string_lossy();
            if !base.starts_with(JAILER_CHROOT_PREFIX) || base.contains("..") {
                return Err(MonofleetError::InvalidConfig(format!(
                    "machine.jailer.chroot_base_dir must be below {JAILER_CHROOT_PREFIX}, got {base}"
                )));
            }

            if jailer.exec_file.file_name().is_none() {
                return Err(MonofleetError::InvalidConfig(
                    "machine.jailer.exec_file must name a file".into(),
                ));
            }
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn default_subnet() -> Ipv4Network {
    DEFAULT_MACHINE_SUBNET
        .parse()
        .unwrap_or_else(|_| Ipv4Network::from(std::net::Ipv4Addr::new(10, 0, 0, 0)))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for FleetConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_fleet_config_defaults() {
        let config = FleetConfig::default();

        assert_eq!(config.start_timeout(), Duration::from_secs(30));
        assert_eq!(config.stop_timeout(), Duration::from_secs(1));
        assert_eq!(*config.get_workload_port(), 8080);
        assert_eq!(config.get_probe().get_path(), "/health");
        assert_eq!(*config.get_probe().get_failure_threshold(), 3);
        assert_eq!(
            config.get_machine().shutdown_timeout(),
            Duration::from_secs(30)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fleet_config_partial_yaml_keeps_defaults() -> anyhow::Result<()> {
        let yaml = r#"
            start_timeout_ms: 5000
            probe:
              path: /ready
              success_threshold: 2
            machine:
              exec_path: /usr/bin/vm
              args: ["--id", "{id}"]
              network:
                subnet: 192.168.10.0/24
        "#;

        let config: FleetConfig = serde_yaml::from_str(yaml)?;

        assert_eq!(config.start_timeout(), Duration::from_secs(5));
        assert_eq!(config.stop_timeout(), Duration::from_secs(1));
        assert_eq!(config.get_probe().get_path(), "/ready");
        assert_eq!(*config.get_probe().get_success_threshold(), 2);
        assert_eq!(*config.get_probe().get_failure_threshold(), 3);
        assert_eq!(config.get_machine().get_exec_path(), Path::new("/usr/bin/vm"));
        assert_eq!(config.get_machine().get_args(), &["--id", "{id}"]);
        assert_eq!(
            config.get_machine().get_network().get_subnet().to_string(),
            "192.168.10.0/24"
        );
        assert!(config.get_machine().get_jailer().is_none());

        Ok(())
    }

    #[test]
    fn test_fleet_config_rejects_zero_probe_period() {
        let config = FleetConfig::builder()
            .probe(ProbeConfig::builder().period_ms(0).build())
            .build();

        assert!(matches!(
            config.validate(),
            Err(MonofleetError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fleet_config_rejects_jail_outside_srv() {
        let jailer = JailerConfig::builder()
            .exec_file("/usr/local/bin/firecracker")
            .chroot_base_dir("/var/jail")
            .build();
        let config = FleetConfig::builder()
            .machine(MachineConfig::builder().jailer(jailer).build())
            .build();

        assert!(matches!(
            config.validate(),
            Err(MonofleetError::InvalidConfig(_))
        ));

        let jailer = JailerConfig::builder()
            .exec_file("/usr/local/bin/firecracker")
            .chroot_base_dir("/srv/../etc")
            .build();
        let config = FleetConfig::builder()
            .machine(MachineConfig::builder().jailer(jailer).build())
            .build();

        assert!(config.validate().is_err());

        let jailer = JailerConfig::builder()
            .exec_file("/usr/local/bin/firecracker")
            .chroot_base_dir("/srv/jailer")
            .build();
        let config = FleetConfig::builder()
            .machine(MachineConfig::builder().jailer(jailer).build())
            .build();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_probe_config_to_spec() {
        let spec = ProbeConfig::default().to_spec(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        assert_eq!(spec.get_period(), &Duration::from_secs(1));
        assert_eq!(spec.get_timeout(), &Duration::from_secs(3));
        assert_eq!(spec.get_initial_delay(), &Duration::ZERO);
        assert_eq!(spec.url().unwrap().as_str(), "http://10.0.0.2:8080/health");
    }
}
