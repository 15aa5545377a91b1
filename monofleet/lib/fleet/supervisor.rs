use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    task::JoinHandle,
    time,
};
use typed_builder::TypedBuilder;

use crate::{
    config::FleetConfig,
    lifecycle::{ControllerRef, FleetEvent, MachineController, StartOutcome, SupervisorRef},
    machine::{DriverFactory, MachineMetadata},
    probe::{HttpProber, Prober},
    MonofleetError, MonofleetResult,
};

use super::{
    BackendSelector, FleetHealth, HttpWorkloadClient, RandomSelector, Registry, WorkloadClient,
    WorkloadRequest, WorkloadResponse,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The collaborators of a [`FleetSupervisor`].
#[derive(TypedBuilder)]
pub struct FleetOptions {
    /// Timeouts, probe template and machine settings.
    #[builder(default)]
    config: FleetConfig,

    /// Creates one driver per machine.
    driver_factory: Arc<dyn DriverFactory>,

    /// Checks machine health. Defaults to [`HttpProber`].
    #[builder(default, setter(strip_option))]
    prober: Option<Arc<dyn Prober>>,

    /// Relays work to machines. Defaults to [`HttpWorkloadClient`].
    #[builder(default, setter(strip_option))]
    workload_client: Option<Arc<dyn WorkloadClient>>,

    /// Picks the machine that receives work. Defaults to [`RandomSelector`].
    #[builder(default = Arc::new(RandomSelector))]
    selector: Arc<dyn BackendSelector>,
}

/// Starts machines, keeps the registry in step with their lifecycle and routes work to the
/// ready ones.
///
/// Every machine is owned by a [`MachineController`]. Controllers report readiness changes and
/// unexpected exits through the supervisor event loop, which is the only writer of readiness
/// and the only remover of machines that died on their own.
pub struct FleetSupervisor {
    config: FleetConfig,
    driver_factory: Arc<dyn DriverFactory>,
    prober: Arc<dyn Prober>,
    workload_client: Arc<dyn WorkloadClient>,
    selector: Arc<dyn BackendSelector>,
    registry: Arc<Registry>,
    health: Arc<FleetHealth>,
    events: SupervisorRef,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FleetSupervisor {
    /// Starts the event loop and marks the supervisor as accepting work.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(options: FleetOptions) -> MonofleetResult<Self> {
        let FleetOptions {
            config,
            driver_factory,
            prober,
            workload_client,
            selector,
        } = options;

        let prober = match prober {
            Some(prober) => prober,
            None => Arc::new(HttpProber::new()?),
        };

        let workload_client = match workload_client {
            Some(client) => client,
            None => Arc::new(HttpWorkloadClient::new()?),
        };

        let registry = Arc::new(Registry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let event_loop = tokio::spawn(handle_events(rx, registry.clone()));

        let health = Arc::new(FleetHealth::default());
        health.set_up();
        tracing::info!("fleet supervisor started");

        Ok(Self {
            config,
            driver_factory,
            prober,
            workload_client,
            selector,
            registry,
            health,
            events: SupervisorRef::new(tx),
            event_loop: Mutex::new(Some(event_loop)),
        })
    }

    /// Starts a new machine and registers it once it runs. Readiness probing begins after
    /// registration.
    ///
    /// ## Errors
    /// - The driver error if the machine could not be started.
    /// - `StartTimeout` if the machine did not report back within the start timeout. Its
    ///   controller is retired so the machine does not leak.
    pub async fn start_machine(&self) -> MonofleetResult<MachineMetadata> {
        let driver = self.driver_factory.create()?;
        let controller = MachineController::builder()
            .driver(driver)
            .prober(self.prober.clone())
            .probe(self.config.get_probe().clone())
            .shutdown_timeout(self.config.get_machine().shutdown_timeout())
            .build()
            .spawn();

        let reply = controller.start(self.events.clone())?;
        let start_timeout = self.config.start_timeout();

        let metadata = match time::timeout(start_timeout, reply).await {
            Ok(Ok(StartOutcome::Started(metadata))) => metadata,
            Ok(Ok(StartOutcome::Failure(e))) => return Err(e),
            Ok(Err(_)) => return Err(MonofleetError::ControllerUnavailable),
            Err(_) => {
                tracing::warn!(
                    timeout = ?start_timeout,
                    "machine did not start in time, retiring it"
                );
                controller.retire();
                return Err(MonofleetError::StartTimeout(start_timeout));
            }
        };

        self.register(&metadata, controller)?;
        Ok(metadata)
    }

    /// Relays `request` to one of the ready machines and returns its response unchanged.
    ///
    /// ## Errors
    /// `NoReadyBackend` if no machine is ready, or the error of the relay itself.
    pub async fn invoke(&self, request: WorkloadRequest) -> MonofleetResult<WorkloadResponse> {
        let ready = self.registry.ready_entries();
        if ready.is_empty() {
            return Err(MonofleetError::NoReadyBackend);
        }

        let entry = ready
            .get(self.selector.select(&ready))
            .ok_or(MonofleetError::NoReadyBackend)?;
        let address = SocketAddr::new(*entry.get_address(), *self.config.get_workload_port());

        tracing::debug!(machine_id = %entry.get_id(), %address, "routing workload request");
        self.workload_client.invoke(address, request).await
    }

    /// Stops every machine and shuts the event loop down.
    ///
    /// Machines are stopped one after the other, each bounded by the stop timeout. A machine
    /// that fails to stop is logged and removed anyway.
    pub async fn close(&self) {
        self.health.set_down();

        let entries = self.registry.snapshot();
        let stop_timeout = self.config.stop_timeout();
        tracing::info!(machines = entries.len(), "draining fleet");

        for entry in entries {
            let id = entry.get_id();
            match time::timeout(stop_timeout, entry.get_controller().stop()).await {
                Ok(Ok(_)) => tracing::info!(machine_id = %id, "machine stopped"),
                Ok(Err(e)) => {
                    tracing::warn!(machine_id = %id, error = %e, "failed to stop machine")
                }
                Err(_) => tracing::warn!(
                    machine_id = %id,
                    error = %MonofleetError::ShutdownTimeout(id.to_string(), stop_timeout),
                    "failed to stop machine"
                ),
            }

            self.registry.remove(id);
        }

        if let Some(event_loop) = self.take_event_loop() {
            event_loop.abort();
        }

        tracing::info!("fleet supervisor stopped");
    }

    /// The directory of live machines.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The health flags of the supervisor.
    pub fn health(&self) -> &Arc<FleetHealth> {
        &self.health
    }

    /// The fleet configuration.
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    fn register(
        &self,
        metadata: &MachineMetadata,
        controller: ControllerRef,
    ) -> MonofleetResult<()> {
        let id = metadata.get_id();
        if let Err(e) = self
            .registry
            .add(id.clone(), controller.clone(), *metadata.get_address())
        {
            tracing::error!(machine_id = %id, error = %e, "failed to register started machine");
            controller.retire();
            return Err(e);
        }

        tracing::info!(
            machine_id = %id,
            address = %metadata.get_address(),
            "machine registered"
        );

        // Probing starts only now so the first readiness change always finds the entry.
        if controller.registered().is_err() {
            tracing::debug!(machine_id = %id, "machine exited before probing began");
        }

        Ok(())
    }

    fn take_event_loop(&self) -> Option<JoinHandle<()>> {
        self.event_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn handle_events(mut events: UnboundedReceiver<FleetEvent>, registry: Arc<Registry>) {
    while let Some(event) = events.recv().await {
        match event {
            FleetEvent::Stopped { id } => {
                if registry.remove(&id).is_some() {
                    tracing::info!(machine_id = %id, "removed stopped machine from fleet");
                }
            }
            FleetEvent::Ready(metadata) => {
                tracing::info!(machine_id = %metadata.get_id(), "machine is ready");
                registry.set_ready(metadata.get_id(), true);
            }
            FleetEvent::Unready(metadata) => {
                tracing::info!(machine_id = %metadata.get_id(), "machine is unready");
                registry.set_ready(metadata.get_id(), false);
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for FleetSupervisor {
    fn drop(&mut self) {
        if let Some(event_loop) = self.take_event_loop() {
            event_loop.abort();
        }
    }
}
