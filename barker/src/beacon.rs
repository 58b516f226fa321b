//! Liveness beacons: periodic "still running" reports for one unit of work.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregator::BarkerHandle;
use crate::event::ActivityEvent;
use crate::ticker::delayed_interval;

/// Reports `activity` under `path` to the aggregator on every heartbeat,
/// and removes it once the finish signal fires.
///
/// Delivery is fire-and-forget. If the event channel is full the beacon waits
/// for capacity; if the aggregator is gone the beacon stops.
#[derive(Debug, Clone)]
pub struct Beacon {
    handle: BarkerHandle,
    activity: String,
    path: String,
    interval: Duration,
}

impl Beacon {
    pub fn new(
        handle: BarkerHandle,
        activity: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let interval = handle.heartbeat_interval();
        Self {
            handle,
            activity: activity.into(),
            path: path.into(),
            interval,
        }
    }

    /// Override the heartbeat interval taken from the handle.
    ///
    /// A zero interval is raised to [`MIN_INTERVAL`](crate::MIN_INTERVAL).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Report until `finish` is cancelled, then send the final remove event.
    ///
    /// The first heartbeat goes out one interval after the start.
    pub async fn run(self, finish: CancellationToken) {
        let mut ticker = delayed_interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("BARKER: running {} {}", self.activity, self.path);
                    let event = ActivityEvent::add(self.activity.clone(), self.path.clone());
                    if self.handle.send(event).await.is_err() {
                        debug!("BARKER: aggregator gone, stopping {} {}", self.activity, self.path);
                        return;
                    }
                }

                _ = finish.cancelled() => {
                    debug!("BARKER: execution ended for {} with {}", self.activity, self.path);
                    let event = ActivityEvent::remove(self.activity, self.path);
                    if let Err(err) = self.handle.send(event).await {
                        debug!("BARKER: final event not delivered: {}", err);
                    }
                    return;
                }
            }
        }
    }

    /// Run the beacon on the tokio runtime
    pub fn spawn(self, finish: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(finish))
    }

    /// Spawn the beacon with its own finish signal wrapped in a guard
    pub fn start(self) -> BeaconGuard {
        let finish = CancellationToken::new();
        let task = self.spawn(finish.clone());
        BeaconGuard {
            finish,
            task: Some(task),
        }
    }
}

/// Keeps a beacon running for as long as it is alive.
///
/// Dropping the guard fires the finish signal; the final remove event is sent
/// in the background. Use [`finish`](Self::finish) to wait until it was sent.
#[must_use = "Beacon finishes immediately if the guard is dropped"]
#[derive(Debug)]
pub struct BeaconGuard {
    finish: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BeaconGuard {
    /// Token that finishes the beacon when cancelled
    pub fn finish_token(&self) -> CancellationToken {
        self.finish.clone()
    }

    /// Finish the beacon and wait for its final event to be sent
    pub async fn finish(mut self) {
        self.finish.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                debug!("BARKER: beacon task failed: {}", err);
            }
        }
    }
}

impl Drop for BeaconGuard {
    fn drop(&mut self) {
        self.finish.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, Snapshot};
    use crate::config::BarkerConfig;
    use crate::ticker::MIN_INTERVAL;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn handle_with_receiver() -> (Aggregator, BarkerHandle, mpsc::Receiver<Snapshot>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(8);
        let config = BarkerConfig::default().with_heartbeat_interval(Duration::from_secs(30));
        let (aggregator, handle) = Aggregator::new(&config, snapshot_tx).unwrap();
        (aggregator, handle, snapshot_rx)
    }

    /// Drain events straight from the aggregator's channel
    async fn next_event(aggregator: &mut Aggregator) -> Option<ActivityEvent> {
        aggregator.recv_event().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_then_remove() {
        let (mut aggregator, handle, _rx) = handle_with_receiver();
        let finish = CancellationToken::new();
        let task = Beacon::new(handle, "scan", "/jobs/1").spawn(finish.clone());

        let start = Instant::now();
        let first = next_event(&mut aggregator).await.unwrap();
        assert_eq!(first, ActivityEvent::add("scan", "/jobs/1"));
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        let second = next_event(&mut aggregator).await.unwrap();
        assert_eq!(second, ActivityEvent::add("scan", "/jobs/1"));
        assert_eq!(start.elapsed(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(5)).await;
        finish.cancel();

        let last = next_event(&mut aggregator).await.unwrap();
        assert_eq!(last, ActivityEvent::remove("scan", "/jobs/1"));

        task.await.unwrap();
        // The beacon held the only handle
        assert!(next_event(&mut aggregator).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_before_first_heartbeat() {
        let (mut aggregator, handle, _rx) = handle_with_receiver();
        let finish = CancellationToken::new();
        finish.cancel();

        Beacon::new(handle, "scan", "/jobs/1")
            .spawn(finish)
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut aggregator).await,
            Some(ActivityEvent::remove("scan", "/jobs/1"))
        );
        assert!(next_event(&mut aggregator).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_interval() {
        let (mut aggregator, handle, _rx) = handle_with_receiver();
        let finish = CancellationToken::new();
        let _task = Beacon::new(handle, "scan", "/jobs/1")
            .with_interval(Duration::from_secs(2))
            .spawn(finish.clone());

        let start = Instant::now();
        next_event(&mut aggregator).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        finish.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_finish_sends_remove() {
        let (mut aggregator, handle, _rx) = handle_with_receiver();
        let guard = handle.beacon("scan", "/jobs/1");
        drop(handle);

        guard.finish().await;

        assert_eq!(
            next_event(&mut aggregator).await,
            Some(ActivityEvent::remove("scan", "/jobs/1"))
        );
        assert!(next_event(&mut aggregator).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_drop_fires_finish() {
        let (mut aggregator, handle, _rx) = handle_with_receiver();
        let guard = handle.beacon("scan", "/jobs/1");
        let token = guard.finish_token();
        drop(handle);

        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());

        assert_eq!(
            next_event(&mut aggregator).await,
            Some(ActivityEvent::remove("scan", "/jobs/1"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_aggregator_gone() {
        let (aggregator, handle, _rx) = handle_with_receiver();
        drop(aggregator);

        let finish = CancellationToken::new();
        let task = Beacon::new(handle, "scan", "/jobs/1").spawn(finish);

        // Returns after the first heartbeat fails to deliver
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_does_not_panic() {
        let (mut aggregator, handle, _rx) = handle_with_receiver();
        let finish = CancellationToken::new();
        let task = Beacon::new(handle, "scan", "/jobs/1")
            .with_interval(Duration::ZERO)
            .spawn(finish.clone());

        let start = Instant::now();
        assert_eq!(
            next_event(&mut aggregator).await,
            Some(ActivityEvent::add("scan", "/jobs/1"))
        );
        assert_eq!(start.elapsed(), MIN_INTERVAL);

        finish.cancel();
        while let Some(event) = next_event(&mut aggregator).await {
            if !event.add {
                break;
            }
        }
        task.await.unwrap();
    }
}
