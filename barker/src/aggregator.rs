//! The central collector that owns the activity tree.
//!
//! # Usage
//!
//! ```rust,ignore
//! use barker::{Aggregator, BarkerConfig};
//!
//! let (snapshot_tx, mut snapshot_rx) = tokio::sync::mpsc::channel(16);
//! let (aggregator, handle) = Aggregator::new(&BarkerConfig::default(), snapshot_tx)?;
//! let shutdown = aggregator.shutdown_token();
//! let task = aggregator.spawn();
//!
//! // Hand clones of `handle` to beacons...
//! let guard = handle.beacon("scan", "/jobs/123");
//!
//! // Either drop every handle, or close explicitly even if beacons are still alive
//! shutdown.cancel();
//! ```
//!
//! The event channel is closed either when the last [`BarkerHandle`] is
//! dropped or when the owner cancels the [shutdown token](Aggregator::shutdown_token).
//! On an explicit shutdown the events already queued are still applied; beacons
//! still running see their next send fail and stop, and their activities stay
//! in the final snapshot.
//!
//! Events and render ticks are selected fairly, so a busy event stream does
//! not starve snapshots. A tick that is due once the channel has been closed
//! is skipped, the final snapshot replaces it.
//!
//! The snapshot receiver must be drained: while a snapshot send is pending the
//! aggregator does not read events, so beacons eventually block once the event
//! channel is full.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::beacon::{Beacon, BeaconGuard};
use crate::config::{BarkerConfig, ConfigError};
use crate::event::ActivityEvent;
use crate::ticker::delayed_interval;
use crate::tree::ActivityTree;

const BANNER_FOOTER: &str = "===========================================";

/// Which kind of report a snapshot is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Emitted on every render tick
    Active,
    /// Emitted once, after the event channel closed
    Final,
}

impl SnapshotKind {
    fn banner(self) -> &'static str {
        match self {
            SnapshotKind::Active => "=========== ACTIVE BARKERS TREE ===========",
            SnapshotKind::Final => "=========== FINAL BARKERS TREE ===========",
        }
    }
}

/// A rendered, point-in-time view of the activity tree.
///
/// `Display` frames the tree between the banner and footer lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub tree: String,
}

impl Snapshot {
    fn capture(kind: SnapshotKind, tree: &ActivityTree) -> Self {
        Self {
            kind,
            tree: tree.render(),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind.banner())?;
        writeln!(f, "{}", self.tree)?;
        writeln!(f, "{}", BANNER_FOOTER)
    }
}

/// Error returned when an event cannot be handed to the aggregator
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("activity event channel is full")]
    Full(ActivityEvent),
    #[error("aggregator is no longer running")]
    Closed(ActivityEvent),
}

/// Sending side of the aggregator's event channel.
///
/// Cloning is cheap. The channel closes when the last clone is dropped,
/// which makes the aggregator emit its final snapshot and stop.
#[derive(Debug, Clone)]
pub struct BarkerHandle {
    tx: mpsc::Sender<ActivityEvent>,
    heartbeat_interval: Duration,
}

impl BarkerHandle {
    /// Send an event, waiting for channel capacity.
    ///
    /// Fails with [`SendError::Closed`] if the aggregator is gone.
    pub async fn send(&self, event: ActivityEvent) -> Result<(), SendError> {
        event.trace();
        self.tx
            .send(event)
            .await
            .map_err(|err| SendError::Closed(err.0))
    }

    /// Send an event without waiting.
    pub fn try_send(&self, event: ActivityEvent) -> Result<(), SendError> {
        event.trace();
        self.tx.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(event) => SendError::Full(event),
            mpsc::error::TrySendError::Closed(event) => SendError::Closed(event),
        })
    }

    /// Whether the aggregator has stopped receiving
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Heartbeat interval beacons created from this handle use
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Spawn a beacon for `activity` under `path`.
    ///
    /// The beacon reports until the returned guard is dropped or finished.
    pub fn beacon(&self, activity: impl Into<String>, path: impl Into<String>) -> BeaconGuard {
        Beacon::new(self.clone(), activity, path).start()
    }
}

/// Owns the activity tree and turns events into periodic snapshots.
pub struct Aggregator {
    rx: mpsc::Receiver<ActivityEvent>,
    snapshot_tx: mpsc::Sender<Snapshot>,
    render_interval: Duration,
    shutdown: CancellationToken,
    tree: ActivityTree,
}

impl Aggregator {
    /// Create the aggregator and the handle beacons send to.
    ///
    /// Fails if `config` does not pass [`BarkerConfig::validate`].
    pub fn new(
        config: &BarkerConfig,
        snapshot_tx: mpsc::Sender<Snapshot>,
    ) -> Result<(Self, BarkerHandle), ConfigError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_capacity);
        let aggregator = Self {
            rx,
            snapshot_tx,
            render_interval: config.render_interval,
            shutdown: CancellationToken::new(),
            tree: ActivityTree::new(),
        };
        let handle = BarkerHandle {
            tx,
            heartbeat_interval: config.heartbeat_interval,
        };
        Ok((aggregator, handle))
    }

    /// Token that closes the event channel when cancelled, whether or not
    /// handles are still alive
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current state of the tree
    pub fn tree(&self) -> &ActivityTree {
        &self.tree
    }

    /// Apply a single event to the tree
    pub fn apply_event(&mut self, event: &ActivityEvent) {
        self.tree.update(&event.path, &event.activity, event.add);
    }

    #[cfg(test)]
    pub(crate) async fn recv_event(&mut self) -> Option<ActivityEvent> {
        self.rx.recv().await
    }

    /// Run until the event channel is closed and drained, then emit the final snapshot.
    ///
    /// Returns the tree as it was when the final snapshot was taken.
    pub async fn run(mut self) -> ActivityTree {
        let mut ticker = delayed_interval(self.render_interval);
        let mut consumer_gone = false;
        let mut closing = false;

        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    self.apply_event(&event);
                }

                _ = self.shutdown.cancelled(), if !closing => {
                    debug!("Aggregator shutdown requested, draining queued events");
                    self.rx.close();
                    closing = true;
                }

                _ = ticker.tick() => {
                    if self.rx.is_closed() {
                        continue;
                    }
                    let snapshot = Snapshot::capture(SnapshotKind::Active, &self.tree);
                    if self.snapshot_tx.send(snapshot).await.is_err() && !consumer_gone {
                        warn!("Snapshot receiver dropped, activity tree is no longer reported");
                        consumer_gone = true;
                    }
                }
            }
        }

        let snapshot = Snapshot::capture(SnapshotKind::Final, &self.tree);
        if self.snapshot_tx.send(snapshot).await.is_err() {
            debug!("Snapshot receiver dropped before the final snapshot");
        }

        self.tree
    }

    /// Run the aggregator on the tokio runtime
    pub fn spawn(self) -> JoinHandle<ActivityTree> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    fn config(render_interval: Duration) -> BarkerConfig {
        BarkerConfig::default().with_render_interval(render_interval)
    }

    #[test]
    fn test_snapshot_framing() {
        let mut tree = ActivityTree::new();
        tree.update("/jobs/123", "scan", true);

        let snapshot = Snapshot::capture(SnapshotKind::Active, &tree);
        assert_eq!(
            snapshot.to_string(),
            "=========== ACTIVE BARKERS TREE ===========\n\
             /\n  jobs\n    123 [scan]\n\n\
             ===========================================\n"
        );

        let snapshot = Snapshot::capture(SnapshotKind::Final, &ActivityTree::new());
        assert_eq!(
            snapshot.to_string(),
            "=========== FINAL BARKERS TREE ===========\n/\n\n\
             ===========================================\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_emits_single_final_snapshot() {
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel(8);
        let (aggregator, handle) =
            Aggregator::new(&config(Duration::from_secs(10)), snapshot_tx).unwrap();
        let task = aggregator.spawn();

        handle.send(ActivityEvent::add("scan", "/jobs/1")).await.unwrap();
        drop(handle);

        let snapshot = snapshot_rx.recv().await.unwrap();
        assert_eq!(snapshot.kind, SnapshotKind::Final);
        assert_eq!(snapshot.tree, "/\n  jobs\n    1 [scan]\n");

        // The aggregator dropped its sender, nothing else follows
        assert!(snapshot_rx.recv().await.is_none());

        let tree = task.await.unwrap();
        assert_eq!(tree.activities_at("/jobs/1"), Some(vec!["scan".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_snapshots() {
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel(8);
        let (aggregator, handle) =
            Aggregator::new(&config(Duration::from_secs(10)), snapshot_tx).unwrap();
        let _task = aggregator.spawn();

        handle.send(ActivityEvent::add("x", "/a")).await.unwrap();

        let first = snapshot_rx.recv().await.unwrap();
        assert_eq!(first.kind, SnapshotKind::Active);
        assert_eq!(first.tree, "/\n  a [x]\n");

        handle.send(ActivityEvent::add("y", "/a")).await.unwrap();

        let second = snapshot_rx.recv().await.unwrap();
        assert_eq!(second.kind, SnapshotKind::Active);
        assert_eq!(second.tree, "/\n  a [x, y]\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_interval() {
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel(8);
        let (aggregator, _handle) =
            Aggregator::new(&config(Duration::from_secs(10)), snapshot_tx).unwrap();
        let _task = aggregator.spawn();

        let start = Instant::now();
        let snapshot = snapshot_rx.recv().await.unwrap();
        assert_eq!(snapshot.kind, SnapshotKind::Active);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_running_without_consumer() {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
        drop(snapshot_rx);
        let (aggregator, handle) =
            Aggregator::new(&config(Duration::from_secs(1)), snapshot_tx).unwrap();
        let task = aggregator.spawn();

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.send(ActivityEvent::add("scan", "/jobs/1")).await.unwrap();
        drop(handle);

        let tree = task.await.unwrap();
        assert!(!tree.is_empty());
    }

    #[tokio::test]
    async fn test_try_send_reports_closed() {
        let (snapshot_tx, _snapshot_rx) = mpsc::channel(1);
        let (aggregator, handle) = Aggregator::new(&BarkerConfig::default(), snapshot_tx).unwrap();
        drop(aggregator);

        assert!(handle.is_closed());
        let err = handle.try_send(ActivityEvent::add("x", "/")).unwrap_err();
        assert!(matches!(err, SendError::Closed(_)));
        assert!(handle.send(ActivityEvent::add("x", "/")).await.is_err());
    }

    #[tokio::test]
    async fn test_try_send_reports_full() {
        let (snapshot_tx, _snapshot_rx) = mpsc::channel(1);
        let config = BarkerConfig {
            event_capacity: 1,
            ..BarkerConfig::default()
        };
        let (_aggregator, handle) = Aggregator::new(&config, snapshot_tx).unwrap();

        handle.try_send(ActivityEvent::add("x", "/")).unwrap();
        let err = handle.try_send(ActivityEvent::add("y", "/")).unwrap_err();
        assert!(matches!(err, SendError::Full(event) if event.activity == "y"));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let (snapshot_tx, _snapshot_rx) = mpsc::channel(1);
        let result = Aggregator::new(&config(Duration::ZERO), snapshot_tx.clone());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let config = BarkerConfig {
            event_capacity: 0,
            ..BarkerConfig::default()
        };
        assert!(Aggregator::new(&config, snapshot_tx).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_with_live_handle() {
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel(8);
        let (aggregator, handle) =
            Aggregator::new(&config(Duration::from_secs(10)), snapshot_tx).unwrap();
        let shutdown = aggregator.shutdown_token();
        let task = aggregator.spawn();

        handle.send(ActivityEvent::add("scan", "/jobs/1")).await.unwrap();
        shutdown.cancel();

        let snapshot = snapshot_rx.recv().await.unwrap();
        assert_eq!(snapshot.kind, SnapshotKind::Final);
        assert_eq!(snapshot.tree, "/\n  jobs\n    1 [scan]\n");
        assert!(snapshot_rx.recv().await.is_none());

        task.await.unwrap();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(ActivityEvent::remove("scan", "/jobs/1")).await,
            Err(SendError::Closed(_))
        ));
    }
}
