//! Live "what is still running" tracking for long-running concurrent programs.
//!
//! - [`Beacon`]s periodically report an activity under a path while their unit
//!   of work runs, and remove it when it finishes.
//! - The [`Aggregator`] is the single owner of the [`ActivityTree`]: it applies
//!   the beacons' events and periodically emits a rendered [`Snapshot`].
//! - [`WaitGroupMonitor`] blocks on a wait-group while logging progress.
//!
//! This is a debugging aid, not a metrics pipeline: events are best effort and
//! nothing is recorded while no aggregator is running.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use barker::{Aggregator, BarkerConfig};
//!
//! let config = BarkerConfig::default();
//! let (snapshot_tx, mut snapshot_rx) = tokio::sync::mpsc::channel(config.snapshot_capacity);
//! let (aggregator, handle) = Aggregator::new(&config, snapshot_tx)?;
//! aggregator.spawn();
//!
//! tokio::spawn(async move {
//!     while let Some(snapshot) = snapshot_rx.recv().await {
//!         tracing::info!("{}", snapshot);
//!     }
//! });
//!
//! let guard = handle.beacon("scan", "/jobs/123");
//! do_the_scan().await;
//! guard.finish().await;
//! ```

mod aggregator;
mod beacon;
mod config;
mod event;
mod ticker;
mod tree;
mod waitgroup;

pub use aggregator::{Aggregator, BarkerHandle, SendError, Snapshot, SnapshotKind};
pub use beacon::{Beacon, BeaconGuard};
pub use config::{
    BarkerConfig, ConfigError, DEFAULT_EVENT_CAPACITY, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_POLL_INTERVAL, DEFAULT_RENDER_INTERVAL, DEFAULT_SNAPSHOT_CAPACITY, MaxCycles,
};
pub use event::ActivityEvent;
pub use ticker::MIN_INTERVAL;
pub use tree::{ActivityNode, ActivityTree, ROOT_NAME, split_path};
pub use waitgroup::{MonitorOutcome, WaitGroupMonitor};

// Re-exported so callers can drive beacons and wait-groups without a direct dependency
pub use tokio_util::sync::CancellationToken;
pub use tokio_util::task::TaskTracker;
