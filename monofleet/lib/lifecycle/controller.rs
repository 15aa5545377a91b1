use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, WeakUnboundedSender},
    task::JoinHandle,
    time,
};
use typed_builder::TypedBuilder;

use crate::{
    config::ProbeConfig,
    machine::{MachineDriver, MachineId, MachineMetadata},
    probe::{ProbeDriver, Prober},
    utils,
};

use super::{ControllerMessage, ControllerRef, FleetEvent, StartOutcome, SupervisorRef};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Owns one machine driver and walks the machine through its lifecycle.
///
/// The controller runs as its own task and processes its mailbox one message at a time:
///
/// - `Start` while stopped starts the machine, begins watching for its exit, then replies
///   `Started` or `Failure`. A failed start ends the controller.
/// - `Registered` while started begins probing the machine. Readiness is only ever reported
///   for a machine the supervisor already knows about.
/// - `Stop` while started runs the shutdown protocol, replies with the machine id and ends the
///   controller.
/// - `Retire`, or the last [`ControllerRef`] going away, runs the shutdown protocol without a
///   reply.
/// - The machine exiting on its own is reported to the supervisor as
///   [`FleetEvent::Stopped`]. Only cleanup runs since the process is already gone.
/// - Readiness changes are forwarded to the supervisor unchanged.
///
/// The shutdown protocol stops probing, asks the driver for a graceful shutdown bounded by
/// `shutdown_timeout` and kills the machine if that fails or times out. Cleanup then runs
/// regardless: the network attachment is released and the isolated root, if any, is removed.
/// Cleanup failures are logged and never stop the controller from finishing.
#[derive(TypedBuilder)]
pub struct MachineController {
    /// The driver of the one machine this controller manages.
    driver: Arc<dyn MachineDriver>,

    /// Checks machine health for the readiness probe.
    prober: Arc<dyn Prober>,

    /// The probe template. The host is the machine address.
    #[builder(default)]
    probe: ProbeConfig,

    /// Deadline for a graceful shutdown.
    shutdown_timeout: Duration,

    #[builder(default, setter(skip))]
    state: ControllerState,
}

#[derive(Default)]
enum ControllerState {
    #[default]
    Stopped,
    Started(Running),
    Terminated,
}

struct Running {
    metadata: MachineMetadata,
    supervisor: SupervisorRef,
    probe: Option<ProbeDriver>,
    probing: bool,
    waiter: JoinHandle<()>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MachineController {
    /// Runs the controller in a new task and returns a handle to its mailbox.
    pub fn spawn(self) -> ControllerRef {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = ControllerRef::new(tx);
        tokio::spawn(self.run(rx, controller.downgrade()));
        controller
    }

    async fn run(
        mut self,
        mut mailbox: UnboundedReceiver<ControllerMessage>,
        me: WeakUnboundedSender<ControllerMessage>,
    ) {
        loop {
            let message = mailbox.recv().await;
            self.state = match std::mem::take(&mut self.state) {
                ControllerState::Stopped => self.handle_stopped(message, &me).await,
                ControllerState::Started(running) => {
                    self.handle_started(running, message, &mut mailbox, &me).await
                }
                ControllerState::Terminated => ControllerState::Terminated,
            };

            if matches!(self.state, ControllerState::Terminated) {
                break;
            }
        }

        tracing::trace!("machine controller exited");
    }

    async fn handle_stopped(
        &mut self,
        message: Option<ControllerMessage>,
        me: &WeakUnboundedSender<ControllerMessage>,
    ) -> ControllerState {
        let (supervisor, reply) = match message {
            Some(ControllerMessage::Start { supervisor, reply }) => (supervisor, reply),
            None => return ControllerState::Terminated,
            Some(other) => {
                tracing::debug!(message = ?other, "ignoring message while stopped");
                return ControllerState::Stopped;
            }
        };

        let metadata = match self.driver.start().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::error!(error = %e, "machine failed to start");
                let _ = reply.send(StartOutcome::Failure(e));
                return ControllerState::Terminated;
            }
        };

        tracing::info!(
            machine_id = %metadata.get_id(),
            address = %metadata.get_address(),
            "machine started"
        );

        let running = Running {
            probe: None,
            probing: false,
            waiter: self.spawn_waiter(me.clone()),
            metadata: metadata.clone(),
            supervisor,
        };

        if reply.send(StartOutcome::Started(metadata)).is_err() {
            tracing::warn!(
                machine_id = %running.metadata.get_id(),
                "start requester went away, shutting machine down"
            );
            self.shutdown(running).await;
            return ControllerState::Terminated;
        }

        ControllerState::Started(running)
    }

    async fn handle_started(
        &mut self,
        mut running: Running,
        message: Option<ControllerMessage>,
        mailbox: &mut UnboundedReceiver<ControllerMessage>,
        me: &WeakUnboundedSender<ControllerMessage>,
    ) -> ControllerState {
        match message {
            Some(ControllerMessage::Registered) => {
                if !running.probing {
                    running.probe = self.spawn_probe(&running.metadata, me.clone());
                    running.probing = true;
                }
                ControllerState::Started(running)
            }
            Some(ControllerMessage::Stop { reply }) => {
                let id = running.metadata.get_id().clone();
                tracing::info!(machine_id = %id, "stopping machine");
                self.shutdown(running).await;
                if reply.send(id).is_err() {
                    tracing::debug!("stop requester went away before the machine stopped");
                }
                ControllerState::Terminated
            }
            Some(ControllerMessage::Retire) | None => {
                tracing::info!(
                    machine_id = %running.metadata.get_id(),
                    "controller retired, stopping machine"
                );
                self.shutdown(running).await;
                ControllerState::Terminated
            }
            Some(ControllerMessage::RunFinished(result)) => {
                let id = running.metadata.get_id().clone();
                match result {
                    Ok(()) => tracing::warn!(machine_id = %id, "machine exited unexpectedly"),
                    Err(e) => tracing::warn!(
                        machine_id = %id,
                        error = %e,
                        "machine exited unexpectedly"
                    ),
                }

                // Close first so the supervisor can never register a controller that is
                // about to report itself stopped.
                mailbox.close();
                running.supervisor.send(FleetEvent::Stopped { id: id.clone() });
                if let Some(probe) = running.probe.as_mut() {
                    probe.stop();
                }

                self.cleanup(&id).await;
                ControllerState::Terminated
            }
            Some(ControllerMessage::Ready(metadata)) => {
                running.supervisor.send(FleetEvent::Ready(metadata));
                ControllerState::Started(running)
            }
            Some(ControllerMessage::Unready(metadata)) => {
                running.supervisor.send(FleetEvent::Unready(metadata));
                ControllerState::Started(running)
            }
            Some(other @ ControllerMessage::Start { .. }) => {
                tracing::debug!(message = ?other, "ignoring start while started");
                ControllerState::Started(running)
            }
        }
    }

    fn spawn_probe(
        &self,
        metadata: &MachineMetadata,
        me: WeakUnboundedSender<ControllerMessage>,
    ) -> Option<ProbeDriver> {
        let spec = self.probe.to_spec(*metadata.get_address());
        match ProbeDriver::spawn(spec, metadata.clone(), self.prober.clone(), me) {
            Ok(probe) => Some(probe),
            Err(e) => {
                tracing::error!(
                    machine_id = %metadata.get_id(),
                    error = %e,
                    "failed to start readiness probe, machine will never become ready"
                );
                None
            }
        }
    }

    fn spawn_waiter(&self, me: WeakUnboundedSender<ControllerMessage>) -> JoinHandle<()> {
        let driver = self.driver.clone();
        tokio::spawn(async move {
            let result = driver.wait().await;
            if let Some(controller) = me.upgrade() {
                let _ = controller.send(ControllerMessage::RunFinished(result));
            }
        })
    }

    async fn shutdown(&self, running: Running) {
        let Running {
            metadata,
            mut probe,
            waiter,
            ..
        } = running;
        let id = metadata.get_id();

        if let Some(probe) = probe.as_mut() {
            probe.stop();
        }

        match time::timeout(self.shutdown_timeout, self.driver.shutdown()).await {
            Ok(Ok(())) => tracing::info!(machine_id = %id, "machine shut down gracefully"),
            Ok(Err(e)) => {
                tracing::warn!(
                    machine_id = %id,
                    error = %e,
                    "graceful shutdown failed, killing machine"
                );
                self.kill(id).await;
            }
            Err(_) => {
                tracing::warn!(
                    machine_id = %id,
                    timeout = ?self.shutdown_timeout,
                    "graceful shutdown timed out, killing machine"
                );
                self.kill(id).await;
            }
        }

        waiter.abort();
        self.cleanup(id).await;
    }

    async fn kill(&self, id: &MachineId) {
        if let Err(e) = self.driver.kill().await {
            tracing::error!(machine_id = %id, error = %e, "failed to kill machine");
        }
    }

    async fn cleanup(&self, id: &MachineId) {
        if let Err(e) = self.driver.release_network(id).await {
            tracing::error!(machine_id = %id, error = %e, "failed to release machine network");
        }

        if let Some(root) = self.driver.isolated_root() {
            if let Err(e) = utils::remove_isolated_root(&root).await {
                tracing::error!(
                    machine_id = %id,
                    root = %root.display(),
                    error = %e,
                    "failed to remove machine root"
                );
            }
        }
    }
}
