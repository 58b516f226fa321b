//! Debug helper that waits on a wait-group while logging progress.
//!
//! The wait-group is a [`TaskTracker`]: every task spawned on it is a party
//! that has to finish, and it releases once it is closed and empty. Any other
//! barrier can be watched through [`WaitGroupMonitor::wait_for`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::config::{BarkerConfig, DEFAULT_POLL_INTERVAL, MaxCycles};
use crate::ticker::delayed_interval;

/// Why the monitor stopped waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The barrier released
    Released,
    /// The poll cycle limit was reached first; the barrier wait continues in the background
    CycleLimit,
}

#[derive(Debug, Clone)]
pub struct WaitGroupMonitor {
    name: String,
    id: String,
    interval: Duration,
    max_cycles: MaxCycles,
}

impl Default for WaitGroupMonitor {
    fn default() -> Self {
        Self {
            name: String::new(),
            id: String::new(),
            interval: DEFAULT_POLL_INTERVAL,
            max_cycles: MaxCycles::Unlimited,
        }
    }
}

impl WaitGroupMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor using the poll interval and cycle limit from `config`
    pub fn from_config(config: &BarkerConfig) -> Self {
        Self::new()
            .with_interval(config.poll_interval)
            .with_max_cycles(config.max_poll_cycles)
    }

    /// Name of the wait-group, used in log lines
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Identifier of the waiter, used in log lines
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Time between progress lines; zero is raised to [`MIN_INTERVAL`](crate::MIN_INTERVAL)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: impl Into<MaxCycles>) -> Self {
        self.max_cycles = max_cycles.into();
        self
    }

    /// Wait until `tracker` is closed and all its tasks finished.
    ///
    /// See [`wait_for`](Self::wait_for) for the logging and completion behaviour.
    pub async fn wait(
        &self,
        tracker: &TaskTracker,
        done: Option<oneshot::Sender<MonitorOutcome>>,
    ) -> MonitorOutcome {
        let tracker = tracker.clone();
        self.wait_for(async move { tracker.wait().await }, done)
            .await
    }

    /// Wait until `barrier` completes, logging every interval.
    ///
    /// The barrier is awaited in its own task. Reaching the cycle limit only
    /// stops this monitor; the barrier task keeps running until it completes.
    /// `done` receives the outcome exactly once.
    pub async fn wait_for<F>(
        &self,
        barrier: F,
        done: Option<oneshot::Sender<MonitorOutcome>>,
    ) -> MonitorOutcome
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = label(&self.id);
        let name = label(&self.name);
        debug!("WG:{} waiting for wg{}", id, name);

        let (released_tx, mut released_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            barrier.await;
            let _ = released_tx.send(());
        });

        let mut ticker = delayed_interval(self.interval);
        let mut cycles: u32 = 0;

        let outcome = loop {
            tokio::select! {
                result = &mut released_rx => {
                    if result.is_err() {
                        debug!("WG:{} barrier wait dropped before release", id);
                    }
                    break MonitorOutcome::Released;
                }

                _ = ticker.tick() => {
                    cycles = cycles.saturating_add(1);
                    debug!("WG:{} waiting for wg{} (cycle {})", id, name, cycles);
                    if self.max_cycles.exceeded_by(cycles) {
                        break MonitorOutcome::CycleLimit;
                    }
                }
            }
        };

        match outcome {
            MonitorOutcome::Released => debug!("WG: waitgroup{} finished{}", name, id),
            MonitorOutcome::CycleLimit => debug!(
                "WG: stopped monitoring waitgroup{}{} after {} cycles",
                name, id, cycles
            ),
        }

        if let Some(done) = done {
            let _ = done.send(outcome);
        }

        outcome
    }
}

/// Prefix non-empty labels with a space so they can be appended to a message
fn label(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!(" {}", value)
    }
}
