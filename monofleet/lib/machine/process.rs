use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    fs,
    process::{Child, Command},
    sync::{oneshot, watch},
};
use uuid::Uuid;

use crate::{
    config::MachineConfig,
    log::MachineLog,
    utils::LOG_SUFFIX,
    MonofleetError, MonofleetResult,
};

use super::{DriverFactory, IpPool, MachineDriver, MachineId, MachineMetadata};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable carrying the machine id into the machine process.
pub const MACHINE_ID_ENV_VAR: &str = "MONOFLEET_MACHINE_ID";

/// Environment variable carrying the machine address into the machine process.
pub const MACHINE_IP_ENV_VAR: &str = "MONOFLEET_MACHINE_IP";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Creates a [`ProcessDriver`] per machine. All drivers share one address pool.
#[derive(Debug, Clone)]
pub struct ProcessDriverFactory {
    config: Arc<MachineConfig>,
    pool: IpPool,
}

/// Runs a machine as a child process of the fleet.
///
/// The configured executable is spawned with `{id}` and `{ip}` substituted in its arguments
/// and with [`MACHINE_ID_ENV_VAR`] and [`MACHINE_IP_ENV_VAR`] set. Its stdout and stderr go to
/// `<log_dir>/<id>.log`.
///
/// A graceful shutdown sends `SIGTERM`. Killing sends `SIGKILL`.
#[derive(Debug)]
pub struct ProcessDriver {
    config: Arc<MachineConfig>,
    pool: IpPool,
    jail_root: Option<PathBuf>,
    process: Mutex<Option<ProcessHandle>>,
}

#[derive(Debug)]
struct ProcessHandle {
    pid: Option<u32>,
    ip: Ipv4Addr,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<Exit>>,
}

#[derive(Debug, Clone)]
enum Exit {
    Success,
    Failure(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProcessDriverFactory {
    /// Creates a factory for machines described by `config`.
    pub fn new(config: MachineConfig) -> Self {
        let pool = IpPool::new(*config.get_network().get_subnet());
        Self {
            config: Arc::new(config),
            pool,
        }
    }

    /// The address pool shared by the drivers of this factory.
    pub fn pool(&self) -> &IpPool {
        &self.pool
    }
}

impl ProcessDriver {
    /// Creates a driver that has not started its machine yet.
    pub fn new(config: Arc<MachineConfig>, pool: IpPool) -> Self {
        let jail_root = config.get_jailer().as_ref().and_then(|jailer| {
            let exec_name = jailer.get_exec_file().file_name()?;
            Some(
                jailer
                    .get_chroot_base_dir()
                    .join(exec_name)
                    .join(Uuid::new_v4().to_string()),
            )
        });

        Self {
            config,
            pool,
            jail_root,
            process: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProcessHandle>> {
        self.process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn exit_rx(&self) -> MonofleetResult<watch::Receiver<Option<Exit>>> {
        self.lock()
            .as_ref()
            .map(|process| process.exit_rx.clone())
            .ok_or_else(|| MonofleetError::InvalidArgument("machine was never started".into()))
    }

    async fn spawn(&self, id: &str, ip: Ipv4Addr) -> MonofleetResult<ProcessHandle> {
        let ip_str = ip.to_string();
        let args = self
            .config
            .get_args()
            .iter()
            .map(|arg| arg.replace("{id}", id).replace("{ip}", &ip_str));

        let mut command = Command::new(self.config.get_exec_path());
        command
            .args(args)
            .envs(self.config.get_env())
            .env(MACHINE_ID_ENV_VAR, id)
            .env(MACHINE_IP_ENV_VAR, &ip_str)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(root) = &self.jail_root {
            fs::create_dir_all(root).await?;
            command.current_dir(root);
        }

        let mut child = command.spawn().map_err(|e| {
            MonofleetError::MachineStart(format!(
                "failed to spawn {}: {e}",
                self.config.get_exec_path().display()
            ))
        })?;

        let log_path = self.config.get_log_dir().join(format!("{id}.{LOG_SUFFIX}"));
        match MachineLog::new(&log_path, None).await {
            Ok(log) => {
                if let Some(stdout) = child.stdout.take() {
                    log.pipe(stdout);
                }
                if let Some(stderr) = child.stderr.take() {
                    log.pipe(stderr);
                }
            }
            Err(e) => tracing::warn!(
                machine_id = %id,
                path = %log_path.display(),
                error = %e,
                "failed to open machine log, output is discarded"
            ),
        }

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(child, kill_rx, exit_tx));

        Ok(ProcessHandle {
            pid,
            ip,
            kill_tx: Some(kill_tx),
            exit_rx,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<Exit>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "failed to send kill to machine process");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) if status.success() => Exit::Success,
        Ok(status) => Exit::Failure(status.to_string()),
        Err(e) => Exit::Failure(e.to_string()),
    };

    let _ = exit_tx.send(Some(exit));
}

async fn wait_exit(mut exit_rx: watch::Receiver<Option<Exit>>) -> MonofleetResult<()> {
    let exit = exit_rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| MonofleetError::MachineExit("machine supervisor stopped".into()))?
        .clone();

    match exit {
        Some(Exit::Failure(reason)) => Err(MonofleetError::MachineExit(reason)),
        _ => Ok(()),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl DriverFactory for ProcessDriverFactory {
    fn create(&self) -> MonofleetResult<Arc<dyn MachineDriver>> {
        Ok(Arc::new(ProcessDriver::new(
            self.config.clone(),
            self.pool.clone(),
        )))
    }
}

#[async_trait]
impl MachineDriver for ProcessDriver {
    async fn start(&self) -> MonofleetResult<MachineMetadata> {
        if self.lock().is_some() {
            return Err(MonofleetError::InvalidArgument(
                "machine has already been started".into(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let ip = self.pool.allocate()?;

        let process = match self.spawn(&id, ip).await {
            Ok(process) => process,
            Err(e) => {
                self.pool.release(ip);
                return Err(e);
            }
        };

        tracing::info!(machine_id = %id, address = %ip, pid = ?process.pid, "machine process spawned");
        *self.lock() = Some(process);

        Ok(MachineMetadata::new(id, IpAddr::V4(ip)))
    }

    async fn wait(&self) -> MonofleetResult<()> {
        wait_exit(self.exit_rx()?).await
    }

    async fn shutdown(&self) -> MonofleetResult<()> {
        let exit_rx = self.exit_rx()?;
        if exit_rx.borrow().is_some() {
            return Ok(());
        }

        let pid = self.lock().as_ref().and_then(|process| process.pid);
        if let Some(pid) = pid {
            signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;
        }

        // The exit status after SIGTERM does not matter, only that the process is gone.
        let _ = wait_exit(exit_rx).await;
        Ok(())
    }

    async fn kill(&self) -> MonofleetResult<()> {
        let exit_rx = self.exit_rx()?;
        let kill_tx = self.lock().as_mut().and_then(|process| process.kill_tx.take());
        if let Some(kill_tx) = kill_tx {
            let _ = kill_tx.send(());
        }

        let _ = wait_exit(exit_rx).await;
        Ok(())
    }

    async fn release_network(&self, id: &MachineId) -> MonofleetResult<()> {
        let lease = self
            .lock()
            .as_ref()
            .map(|process| (process.ip, process.exit_rx.borrow().is_some()));

        // An address stays leased while its process may still be using it.
        match lease {
            Some((ip, true)) => {
                self.pool.release(ip);
            }
            Some((ip, false)) => tracing::warn!(
                machine_id = %id,
                address = %ip,
                "machine process is still running, keeping its address leased"
            ),
            None => {}
        }

        let cache = self.config.get_network().get_cni_cache_dir().join(id.as_str());
        match fs::metadata(&cache).await {
            Ok(metadata) if metadata.is_dir() => {
                fs::remove_dir_all(&cache).await?;
                Ok(())
            }
            Ok(_) => Err(MonofleetError::InvalidArgument(format!(
                "network cache {} is not a directory",
                cache.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn isolated_root(&self) -> Option<PathBuf> {
        self.jail_root.clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
