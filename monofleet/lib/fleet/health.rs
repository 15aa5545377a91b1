use std::sync::atomic::{AtomicBool, Ordering};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Whether the supervisor itself takes work. Independent of the readiness of any machine.
#[derive(Debug, Default)]
pub struct FleetHealth {
    accepting: AtomicBool,
    healthy: AtomicBool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FleetHealth {
    /// Marks the supervisor as up.
    pub fn set_up(&self) {
        self.healthy.store(true, Ordering::SeqCst);
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Marks the supervisor as going away.
    pub fn set_down(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// Whether new work is accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Whether the supervisor is alive.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
