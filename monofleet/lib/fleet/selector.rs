use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use super::RegistryEntry;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Picks the backend that receives the next piece of work.
pub trait BackendSelector: Send + Sync + 'static {
    /// Returns the index of the chosen entry. `ready` is never empty.
    fn select(&self, ready: &[RegistryEntry]) -> usize;
}

/// Picks a ready backend uniformly at random.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

/// Cycles through the ready backends in order.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl BackendSelector for RandomSelector {
    fn select(&self, ready: &[RegistryEntry]) -> usize {
        rand::thread_rng().gen_range(0..ready.len())
    }
}

impl BackendSelector for RoundRobinSelector {
    fn select(&self, ready: &[RegistryEntry]) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % ready.len()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
