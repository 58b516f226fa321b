use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Shortest period a timer runs at; zero periods are raised to this
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Interval whose first tick is one `period` from now.
///
/// Missed ticks are delayed rather than bursted.
pub(crate) fn delayed_interval(period: Duration) -> Interval {
    let period = period.max(MIN_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
