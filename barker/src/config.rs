use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Default interval between periodic snapshots
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_secs(30);
/// Default interval between beacon heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default interval between wait-group progress lines
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Default number of events that can queue up before senders wait
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
/// Default number of snapshots that can queue up before the aggregator waits
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 16;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    #[diagnostic(code(barker::config::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    #[diagnostic(code(barker::config::parse))]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    #[diagnostic(code(barker::config::invalid))]
    Invalid(String),
}

/// Upper bound on wait-group poll cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxCycles {
    #[default]
    Unlimited,
    Limit(u32),
}

impl MaxCycles {
    /// Whether `cycles` elapsed ticks exceed this limit
    pub fn exceeded_by(&self, cycles: u32) -> bool {
        match self {
            MaxCycles::Unlimited => false,
            MaxCycles::Limit(max) => cycles > *max,
        }
    }
}

/// Negative values (conventionally `-1`) mean unlimited.
impl From<i64> for MaxCycles {
    fn from(value: i64) -> Self {
        if value < 0 {
            MaxCycles::Unlimited
        } else {
            MaxCycles::Limit(u32::try_from(value).unwrap_or(u32::MAX))
        }
    }
}

impl From<MaxCycles> for i64 {
    fn from(value: MaxCycles) -> Self {
        match value {
            MaxCycles::Unlimited => -1,
            MaxCycles::Limit(max) => i64::from(max),
        }
    }
}

impl fmt::Display for MaxCycles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxCycles::Unlimited => write!(f, "unlimited"),
            MaxCycles::Limit(max) => write!(f, "{}", max),
        }
    }
}

impl Serialize for MaxCycles {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(i64::from(*self))
    }
}

impl<'de> Deserialize<'de> for MaxCycles {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(MaxCycles::from)
    }
}

/// Humantime (de)serialization for `Duration` fields ("30s", "1m 30s").
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(D::Error::custom)
    }
}

/// Intervals and capacities for the aggregator, beacons and wait-group monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BarkerConfig {
    /// How often the aggregator emits an "ACTIVE" snapshot
    #[serde(with = "humantime_duration")]
    pub render_interval: Duration,
    /// How often a beacon reports that its activity is still running
    #[serde(with = "humantime_duration")]
    pub heartbeat_interval: Duration,
    /// How often the wait-group monitor logs while waiting
    #[serde(with = "humantime_duration")]
    pub poll_interval: Duration,
    /// How many poll cycles the wait-group monitor logs for (`-1` for unlimited)
    pub max_poll_cycles: MaxCycles,
    /// Capacity of the inbound event channel
    pub event_capacity: usize,
    /// Capacity of the outbound snapshot channel
    pub snapshot_capacity: usize,
}

impl Default for BarkerConfig {
    fn default() -> Self {
        Self {
            render_interval: DEFAULT_RENDER_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_cycles: MaxCycles::Unlimited,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
        }
    }
}

impl BarkerConfig {
    /// Read and validate a YAML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        contents.parse()
    }

    pub fn with_render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_poll_cycles(mut self, max: impl Into<MaxCycles>) -> Self {
        self.max_poll_cycles = max.into();
        self
    }

    /// Reject values that would make timers or channels unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("render_interval", self.render_interval),
            ("heartbeat_interval", self.heartbeat_interval),
            ("poll_interval", self.poll_interval),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if self.snapshot_capacity == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromStr for BarkerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // An empty document means "all defaults"
        let config: BarkerConfig = if s.trim().is_empty() {
            BarkerConfig::default()
        } else {
            serde_yaml::from_str(s)?
        };
        config.validate()?;
        Ok(config)
    }
}
