#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use monofleet::{
    config::{FleetConfig, MachineConfig, ProbeConfig},
    fleet::{WorkloadClient, WorkloadRequest, WorkloadResponse},
    machine::{DriverFactory, MachineDriver, MachineId, MachineMetadata},
    probe::{Prober, Signal},
    MonofleetError, MonofleetResult,
};
use reqwest::Url;
use tokio::{sync::watch, time};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How a [`MockDriver`] answers `start`.
#[derive(Debug, Clone)]
pub enum StartBehavior {
    Succeed,
    Fail,
    Delay(Duration),
}

/// How a [`MockDriver`] answers `shutdown`.
#[derive(Debug, Clone, Copy)]
pub enum ShutdownBehavior {
    Ack,
    Hang,
    Fail,
}

/// A machine driver that records every call and exits on command.
#[derive(Debug)]
pub struct MockDriver {
    metadata: MachineMetadata,
    start: StartBehavior,
    shutdown: ShutdownBehavior,
    release_fails: bool,
    isolated_root: Option<PathBuf>,
    exit_tx: watch::Sender<Option<bool>>,
    calls: Mutex<Vec<&'static str>>,
}

/// Hands out prepared drivers in order.
#[derive(Debug, Default)]
pub struct MockFactory {
    pending: Mutex<VecDeque<Arc<MockDriver>>>,
}

/// Answers probes per machine address. Unknown addresses are unready.
#[derive(Debug, Default)]
pub struct ScriptedProber {
    signals: Mutex<HashMap<IpAddr, Signal>>,
}

/// Records relayed requests and answers with a canned response.
#[derive(Debug)]
pub struct RecordingWorkloadClient {
    response: WorkloadResponse,
    requests: Mutex<Vec<(SocketAddr, WorkloadRequest)>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MockDriver {
    pub fn new(id: &str, address: Ipv4Addr) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            metadata: MachineMetadata::new(id, IpAddr::V4(address)),
            start: StartBehavior::Succeed,
            shutdown: ShutdownBehavior::Ack,
            release_fails: false,
            isolated_root: None,
            exit_tx,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_start(mut self, start: StartBehavior) -> Self {
        self.start = start;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownBehavior) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_failing_release(mut self) -> Self {
        self.release_fails = true;
        self
    }

    pub fn with_isolated_root(mut self, root: PathBuf) -> Self {
        self.isolated_root = Some(root);
        self
    }

    pub fn metadata(&self) -> &MachineMetadata {
        &self.metadata
    }

    /// Makes the machine exit on its own.
    pub fn exit(&self, success: bool) {
        self.exit_tx.send_replace(Some(success));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MockFactory {
    pub fn new(drivers: impl IntoIterator<Item = Arc<MockDriver>>) -> Self {
        Self {
            pending: Mutex::new(drivers.into_iter().collect()),
        }
    }
}

impl ScriptedProber {
    pub fn set(&self, address: Ipv4Addr, signal: Signal) {
        self.signals
            .lock()
            .unwrap()
            .insert(IpAddr::V4(address), signal);
    }
}

impl RecordingWorkloadClient {
    pub fn new(response: WorkloadResponse) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(SocketAddr, WorkloadRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl MachineDriver for MockDriver {
    async fn start(&self) -> MonofleetResult<MachineMetadata> {
        self.record("start");
        match &self.start {
            StartBehavior::Succeed => Ok(self.metadata.clone()),
            StartBehavior::Fail => Err(MonofleetError::MachineStart("no capacity".into())),
            StartBehavior::Delay(delay) => {
                time::sleep(*delay).await;
                Ok(self.metadata.clone())
            }
        }
    }

    async fn wait(&self) -> MonofleetResult<()> {
        let mut exit_rx = self.exit_tx.subscribe();
        let success = match exit_rx.wait_for(|exit| exit.is_some()).await {
            Ok(exit) => (*exit).unwrap_or(true),
            Err(_) => true,
        };

        if success {
            Ok(())
        } else {
            Err(MonofleetError::MachineExit("exit status 1".into()))
        }
    }

    async fn shutdown(&self) -> MonofleetResult<()> {
        self.record("shutdown");
        match self.shutdown {
            ShutdownBehavior::Ack => {
                self.exit(true);
                Ok(())
            }
            ShutdownBehavior::Hang => std::future::pending::<MonofleetResult<()>>().await,
            ShutdownBehavior::Fail => Err(MonofleetError::custom(anyhow::anyhow!(
                "machine refused to power off"
            ))),
        }
    }

    async fn kill(&self) -> MonofleetResult<()> {
        self.record("kill");
        self.exit(false);
        Ok(())
    }

    async fn release_network(&self, id: &MachineId) -> MonofleetResult<()> {
        if id != self.metadata.get_id() {
            return Err(MonofleetError::InvalidArgument(format!("unknown machine {id}")));
        }

        self.record("release_network");
        if self.release_fails {
            Err(MonofleetError::InvalidArgument(
                "network state is not a directory".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn isolated_root(&self) -> Option<PathBuf> {
        self.isolated_root.clone()
    }
}

impl DriverFactory for MockFactory {
    fn create(&self) -> MonofleetResult<Arc<dyn MachineDriver>> {
        let driver = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| MonofleetError::MachineStart("no more mock drivers".into()))?;
        Ok(driver)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, url: &Url, _timeout: Duration) -> Signal {
        let host = url
            .host_str()
            .and_then(|host| host.parse::<IpAddr>().ok());

        host.and_then(|host| self.signals.lock().unwrap().get(&host).copied())
            .unwrap_or(Signal::Unready)
    }
}

#[async_trait]
impl WorkloadClient for RecordingWorkloadClient {
    async fn invoke(
        &self,
        address: SocketAddr,
        request: WorkloadRequest,
    ) -> MonofleetResult<WorkloadResponse> {
        self.requests.lock().unwrap().push((address, request));
        Ok(self.response.clone())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// A probe that ticks every 10ms so readiness settles quickly.
pub fn fast_probe() -> ProbeConfig {
    ProbeConfig::builder()
        .period_ms(10)
        .timeout_ms(50)
        .build()
}

/// A fleet configuration with short timeouts.
pub fn fast_config(start_timeout_ms: u64, shutdown_timeout_ms: u64) -> FleetConfig {
    FleetConfig::builder()
        .start_timeout_ms(start_timeout_ms)
        .stop_timeout_ms(1_000)
        .probe(fast_probe())
        .machine(
            MachineConfig::builder()
                .shutdown_timeout_ms(shutdown_timeout_ms)
                .build(),
        )
        .build()
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = time::Instant::now() + Duration::from_secs(2);
    while time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        time::sleep(Duration::from_millis(5)).await;
    }

    false
}
