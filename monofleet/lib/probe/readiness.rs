//! Hysteresis over raw probe outcomes.

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A raw probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The probe succeeded.
    Ready,

    /// The probe failed.
    Unready,
}

/// The stable readiness state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    /// Not confirmed ready. The initial state.
    #[default]
    Unready,

    /// Confirmed ready.
    Ready,
}

/// A confirmed change of readiness. Emitted once per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The machine became ready.
    BecameReady,

    /// The machine became unready.
    BecameUnready,
}

/// Turns a stream of raw probe outcomes into a stable ready/unready state.
///
/// Only consecutive signals pointing away from the current state count. Reaching the
/// threshold for that direction flips the state and emits exactly one [`Transition`]. A
/// signal agreeing with the current state resets the count.
///
/// A threshold of zero behaves as one.
#[derive(Debug, Clone)]
pub struct ReadinessTracker {
    state: Readiness,
    consecutive: u32,
    success_threshold: u32,
    failure_threshold: u32,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ReadinessTracker {
    /// Creates an unready tracker.
    pub fn new(success_threshold: u32, failure_threshold: u32) -> Self {
        Self {
            state: Readiness::Unready,
            consecutive: 0,
            success_threshold: success_threshold.max(1),
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Feeds one outcome to the tracker.
    pub fn observe(&mut self, signal: Signal) -> Option<Transition> {
        match (self.state, signal) {
            (Readiness::Unready, Signal::Ready) => {
                self.consecutive += 1;
                if self.consecutive >= self.success_threshold {
                    self.state = Readiness::Ready;
                    self.consecutive = 0;
                    return Some(Transition::BecameReady);
                }
                None
            }
            (Readiness::Ready, Signal::Unready) => {
                self.consecutive += 1;
                if self.consecutive >= self.failure_threshold {
                    self.state = Readiness::Unready;
                    self.consecutive = 0;
                    return Some(Transition::BecameUnready);
                }
                None
            }
            (Readiness::Unready, Signal::Unready) | (Readiness::Ready, Signal::Ready) => {
                self.consecutive = 0;
                None
            }
        }
    }

    /// The current stable state.
    pub fn state(&self) -> Readiness {
        self.state
    }

    /// Whether the tracker is in the ready state.
    pub fn is_ready(&self) -> bool {
        self.state == Readiness::Ready
    }

    /// Consecutive signals counted toward the opposite state.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
