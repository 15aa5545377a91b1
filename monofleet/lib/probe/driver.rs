use std::{sync::Arc, time::Duration};

use reqwest::Url;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
    task::JoinHandle,
};

use crate::{
    lifecycle::ControllerMessage, machine::MachineMetadata, runtime::Ticker, MonofleetResult,
};

use super::{Prober, ProbeSpec, ReadinessTracker, Signal, Transition};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Probes one machine on a fixed period and reports confirmed readiness changes to its
/// controller.
///
/// Every tick issues one check through the [`Prober`]. The outcome goes to a readiness
/// tracker running in its own task, which sends [`ControllerMessage::Ready`] or
/// [`ControllerMessage::Unready`] whenever the hysteresis confirms a change. Failed checks
/// never do anything else.
///
/// The driver only holds a weak handle to the controller, so it never keeps the controller
/// alive. Dropping the driver stops probing.
#[derive(Debug)]
pub struct ProbeDriver {
    url: Url,
    ticker: Ticker,
    tracker: JoinHandle<()>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProbeDriver {
    /// Starts probing the machine described by `metadata`.
    ///
    /// ## Errors
    /// Fails if the probe target is not a valid URL or the period is zero.
    pub fn spawn(
        spec: ProbeSpec,
        metadata: MachineMetadata,
        prober: Arc<dyn Prober>,
        controller: WeakUnboundedSender<ControllerMessage>,
    ) -> MonofleetResult<Self> {
        let url = spec.url()?;
        let timeout = *spec.get_timeout();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let mut ticker = Ticker::new(
            *spec.get_period(),
            probe_handler(prober, url.clone(), timeout, signal_tx),
        )?
        .with_initial_delay(*spec.get_initial_delay());

        let tracker = ReadinessTracker::new(
            *spec.get_success_threshold(),
            *spec.get_failure_threshold(),
        );
        let tracker = tokio::spawn(track(tracker, signal_rx, metadata, controller));

        ticker.start()?;
        tracing::debug!(url = %url, period = ?spec.get_period(), "probe started");

        Ok(Self {
            url,
            ticker,
            tracker,
        })
    }

    /// Stops probing. A check in flight is abandoned.
    pub fn stop(&mut self) {
        if self.ticker.is_running() {
            tracing::debug!(url = %self.url, "probe stopped");
        }

        self.ticker.stop();
        self.tracker.abort();
    }

    /// The URL being probed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether probing is still going on.
    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn probe_handler(
    prober: Arc<dyn Prober>,
    url: Url,
    timeout: Duration,
    signals: UnboundedSender<Signal>,
) -> impl FnMut() -> futures::future::BoxFuture<'static, ()> + Send + Sync + 'static {
    move || {
        let prober = prober.clone();
        let url = url.clone();
        let signals = signals.clone();
        Box::pin(async move {
            let signal = prober.probe(&url, timeout).await;
            let _ = signals.send(signal);
        })
    }
}

async fn track(
    mut tracker: ReadinessTracker,
    mut signals: UnboundedReceiver<Signal>,
    metadata: MachineMetadata,
    controller: WeakUnboundedSender<ControllerMessage>,
) {
    while let Some(signal) = signals.recv().await {
        let message = match tracker.observe(signal) {
            Some(Transition::BecameReady) => ControllerMessage::Ready(metadata.clone()),
            Some(Transition::BecameUnready) => ControllerMessage::Unready(metadata.clone()),
            None => continue,
        };

        tracing::info!(
            machine_id = %metadata.get_id(),
            ready = tracker.is_ready(),
            "machine readiness changed"
        );

        let Some(controller) = controller.upgrade() else {
            break;
        };

        if controller.send(message).is_err() {
            break;
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for ProbeDriver {
    fn drop(&mut self) {
        self.tracker.abort();
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
