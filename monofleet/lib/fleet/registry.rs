use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Mutex, MutexGuard},
};

use getset::Getters;

use crate::{
    lifecycle::ControllerRef,
    machine::MachineId,
    MonofleetError, MonofleetResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One live machine as seen by the fleet.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct RegistryEntry {
    /// The identity of the machine.
    id: MachineId,

    /// The controller that owns the machine.
    controller: ControllerRef,

    /// The address of the machine.
    address: IpAddr,

    /// Whether the machine may receive work.
    ready: bool,
}

/// The directory of live machines, keyed by identity.
///
/// Every operation takes a single lock for a short, non-blocking critical section. Callers
/// only ever get copies of entries, so the registry stays the only place entries change.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<MachineId, RegistryEntry>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a started machine as not ready.
    ///
    /// ## Errors
    /// - `InvalidArgument` if `id` is empty or the controller has already exited.
    /// - `AlreadyExists` if `id` is registered. The existing entry is left untouched.
    pub fn add(
        &self,
        id: MachineId,
        controller: ControllerRef,
        address: IpAddr,
    ) -> MonofleetResult<()> {
        if id.is_empty() {
            return Err(MonofleetError::InvalidArgument(
                "machine id must not be empty".into(),
            ));
        }

        let mut entries = self.lock();

        if controller.is_closed() {
            return Err(MonofleetError::InvalidArgument(format!(
                "controller of machine {id} has already exited"
            )));
        }

        if entries.contains_key(&id) {
            return Err(MonofleetError::AlreadyExists(id.to_string()));
        }

        entries.insert(
            id.clone(),
            RegistryEntry {
                id,
                controller,
                address,
                ready: false,
            },
        );

        Ok(())
    }

    /// Removes a machine and returns its controller. Removing an unknown id returns `None`.
    pub fn remove(&self, id: &MachineId) -> Option<ControllerRef> {
        self.lock().remove(id).map(|entry| entry.controller)
    }

    /// Updates the readiness of a machine. Unknown ids are ignored.
    pub fn set_ready(&self, id: &MachineId, ready: bool) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.ready = ready;
        }
    }

    /// A copy of a single entry.
    pub fn get(&self, id: &MachineId) -> Option<RegistryEntry> {
        self.lock().get(id).cloned()
    }

    /// A point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.lock().values().cloned().collect()
    }

    /// A point-in-time copy of the ready entries.
    pub fn ready_entries(&self) -> Vec<RegistryEntry> {
        self.lock()
            .values()
            .filter(|entry| entry.ready)
            .cloned()
            .collect()
    }

    /// The number of registered machines.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no machine is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MachineId, RegistryEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
