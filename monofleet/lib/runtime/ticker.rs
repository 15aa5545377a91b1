use std::{fmt, future::Future, time::Duration};

use futures::future::BoxFuture;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{MonofleetError, MonofleetResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The callback fired on every tick.
pub type TickHandler = Box<dyn FnMut() -> BoxFuture<'static, ()> + Send + Sync>;

/// A periodic callback scheduler.
///
/// The handler fires once after the initial delay (immediately when there is none) and then
/// every `period` until the ticker is stopped. Each firing is awaited before the next one is
/// scheduled, so a slow handler delays the following ticks instead of overlapping with them.
///
/// A stopped ticker cannot be restarted. Dropping a running ticker stops it.
///
/// ## Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use monofleet::runtime::Ticker;
///
/// # async fn example() -> monofleet::MonofleetResult<()> {
/// let mut ticker = Ticker::new(Duration::from_secs(1), || async {
///     tracing::info!("tick");
/// })?
/// .with_initial_delay(Duration::from_millis(500));
///
/// ticker.start()?;
/// tokio::time::sleep(Duration::from_secs(3)).await;
/// ticker.stop();
/// # Ok(())
/// # }
/// ```
pub struct Ticker {
    /// Delay before the first firing.
    initial_delay: Duration,

    /// Interval between firings.
    period: Duration,

    /// Current state of the ticker.
    state: TickerState,
}

enum TickerState {
    /// Constructed but not started yet.
    Idle(TickHandler),

    /// Firing in the background.
    Running {
        stop_tx: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    },

    /// Stopped for good.
    Stopped,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Ticker {
    /// Creates a new ticker that fires `handler` every `period`.
    ///
    /// ## Errors
    /// Returns `InvalidArgument` if `period` is zero.
    pub fn new<F, Fut>(period: Duration, mut handler: F) -> MonofleetResult<Self>
    where
        F: FnMut() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(MonofleetError::InvalidArgument(
                "ticker period must be greater than zero".into(),
            ));
        }

        Ok(Self {
            initial_delay: Duration::ZERO,
            period,
            state: TickerState::Idle(Box::new(move || Box::pin(handler()))),
        })
    }

    /// Sets the delay before the first firing.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Starts firing in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// ## Errors
    /// Returns `InvalidArgument` if the ticker is already running or has been stopped.
    pub fn start(&mut self) -> MonofleetResult<()> {
        let handler = match std::mem::replace(&mut self.state, TickerState::Stopped) {
            TickerState::Idle(handler) => handler,
            state @ TickerState::Running { .. } => {
                self.state = state;
                return Err(MonofleetError::InvalidArgument(
                    "ticker is already running".into(),
                ));
            }
            TickerState::Stopped => {
                return Err(MonofleetError::InvalidArgument(
                    "ticker has been stopped and cannot be restarted".into(),
                ));
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run(handler, self.initial_delay, self.period, stop_rx));
        self.state = TickerState::Running { stop_tx, handle };

        Ok(())
    }

    /// Stops firing permanently. A firing that is in progress is cancelled.
    pub fn stop(&mut self) {
        if let TickerState::Running { stop_tx, handle } =
            std::mem::replace(&mut self.state, TickerState::Stopped)
        {
            // The loop may already be gone if the runtime is shutting down.
            let _ = stop_tx.send(());
            drop(handle);
        }
    }

    /// Whether the ticker is currently firing.
    pub fn is_running(&self) -> bool {
        matches!(self.state, TickerState::Running { .. })
    }

    /// The interval between firings.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The delay before the first firing.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn run(
    mut handler: TickHandler,
    initial_delay: Duration,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut interval = time::interval_at(Instant::now() + initial_delay, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = handler() => {}
        }
    }

    tracing::trace!("ticker stopped");
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            TickerState::Idle(_) => "idle",
            TickerState::Running { .. } => "running",
            TickerState::Stopped => "stopped",
        };

        f.debug_struct("Ticker")
            .field("initial_delay", &self.initial_delay)
            .field("period", &self.period)
            .field("state", &state)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
