use tokio::sync::{
    mpsc::{UnboundedSender, WeakUnboundedSender},
    oneshot,
};

use crate::{
    machine::{MachineId, MachineMetadata},
    MonofleetError, MonofleetResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The mailbox of a machine controller.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Start the machine and report back on `reply`.
    Start {
        /// Where lifecycle events are delivered once the machine runs.
        supervisor: SupervisorRef,

        /// Receives the outcome of the start.
        reply: oneshot::Sender<StartOutcome>,
    },

    /// Shut the machine down and report its id on `reply` once it is gone.
    Stop {
        /// Receives the id of the stopped machine.
        reply: oneshot::Sender<MachineId>,
    },

    /// Shut the machine down without reporting back. Sent when the controller is retired.
    Retire,

    /// The supervisor has registered the started machine. Readiness probing begins.
    Registered,

    /// The readiness probe confirmed the machine ready.
    Ready(MachineMetadata),

    /// The readiness probe confirmed the machine unready.
    Unready(MachineMetadata),

    /// The machine process exited on its own.
    RunFinished(MonofleetResult<()>),
}

/// The reply to a [`ControllerMessage::Start`].
#[derive(Debug)]
pub enum StartOutcome {
    /// The machine is running and addressable.
    Started(MachineMetadata),

    /// The driver could not start the machine.
    Failure(MonofleetError),
}

/// The mailbox of the fleet supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    /// A machine stopped without being asked to.
    Stopped {
        /// The machine that stopped.
        id: MachineId,
    },

    /// A machine became ready.
    Ready(MachineMetadata),

    /// A machine became unready.
    Unready(MachineMetadata),
}

/// A handle to a running machine controller.
///
/// The controller shuts its machine down and exits once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct ControllerRef {
    tx: UnboundedSender<ControllerMessage>,
}

/// A handle to the fleet supervisor event loop.
#[derive(Debug, Clone)]
pub struct SupervisorRef {
    tx: UnboundedSender<FleetEvent>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ControllerRef {
    /// Wraps the sending half of a controller mailbox.
    pub fn new(tx: UnboundedSender<ControllerMessage>) -> Self {
        Self { tx }
    }

    /// Asks the controller to start its machine.
    ///
    /// The returned receiver resolves with the outcome. It closes without a value if the
    /// controller exits first.
    pub fn start(
        &self,
        supervisor: SupervisorRef,
    ) -> MonofleetResult<oneshot::Receiver<StartOutcome>> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerMessage::Start { supervisor, reply })?;
        Ok(rx)
    }

    /// Asks the controller to stop its machine and waits until it has.
    ///
    /// The caller is expected to bound this with a deadline.
    pub async fn stop(&self) -> MonofleetResult<MachineId> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerMessage::Stop { reply })?;
        rx.await.map_err(|_| MonofleetError::ControllerUnavailable)
    }

    /// Tells the controller that its machine is registered and may be probed.
    pub fn registered(&self) -> MonofleetResult<()> {
        self.send(ControllerMessage::Registered)
    }

    /// Tells the controller to shut its machine down and exit. Nobody waits for it.
    pub fn retire(&self) {
        if self.send(ControllerMessage::Retire).is_err() {
            tracing::debug!("retired controller had already exited");
        }
    }

    /// Delivers a message to the controller.
    pub fn send(&self, message: ControllerMessage) -> MonofleetResult<()> {
        self.tx
            .send(message)
            .map_err(|_| MonofleetError::ControllerUnavailable)
    }

    /// Whether the controller has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Returns a handle that does not keep the controller alive.
    pub fn downgrade(&self) -> WeakUnboundedSender<ControllerMessage> {
        self.tx.downgrade()
    }
}

impl SupervisorRef {
    /// Wraps the sending half of the supervisor mailbox.
    pub fn new(tx: UnboundedSender<FleetEvent>) -> Self {
        Self { tx }
    }

    /// Delivers an event. Events sent after the supervisor is gone are dropped.
    pub fn send(&self, event: FleetEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!(event = ?e.0, "supervisor is gone, dropping event");
        }
    }
}
