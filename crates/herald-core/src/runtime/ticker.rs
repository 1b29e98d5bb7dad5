//! Periodic tick loops and their single-flight guards.

use std::{
    any::Any,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Allows at most one run of a tick kind at a time. Overlapping attempts are skipped.
#[derive(Debug, Clone)]
pub struct SingleFlight {
    name: &'static str,
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, running: Arc::new(AtomicBool::new(false)) }
    }

    /// Claims the guard. Returns `None` if a run is already in flight.
    #[must_use]
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            Some(FlightPermit { running: Arc::clone(&self.running) })
        } else {
            debug!(tick = self.name, "previous run still in flight, skipping");
            None
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of a run; releases the guard on drop, including during a panic.
#[derive(Debug)]
pub struct FlightPermit {
    running: Arc<AtomicBool>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Renders a caught panic payload for logs and error messages.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns a loop that starts `work` every `period` until shutdown is broadcast.
///
/// Each run is spawned as its own task so a panic is caught at the task boundary and logged
/// instead of killing the loop. The loop does not wait for a run before the next tick; the work
/// itself is expected to hold a [`SingleFlight`] guard. On shutdown the loop stops ticking and
/// waits for runs still in flight, so the returned handle completes only once they are done.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    work: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!(tick = name, period_secs = period.as_secs_f64(), "starting tick loop");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    in_flight.retain(|run| !run.is_finished());
                    let run = tokio::spawn(work());
                    in_flight.push(tokio::spawn(async move {
                        if let Err(e) = run.await {
                            if e.is_panic() {
                                error!(tick = name, error = ?e, "tick panicked, recovering");
                            } else if e.is_cancelled() {
                                warn!(tick = name, "tick task was cancelled");
                            }
                        }
                    }));
                }
                _ = shutdown_rx.recv() => {
                    info!(tick = name, "tick loop shutting down");
                    break;
                }
            }
        }

        in_flight.retain(|run| !run.is_finished());
        if !in_flight.is_empty() {
            info!(tick = name, runs = in_flight.len(), "waiting for in-flight runs");
            for run in in_flight {
                // The watcher only logs, so a join error here carries nothing new.
                let _ = run.await;
            }
        }
    })
}
