//! Events sent by beacons to the aggregator.

use serde::{Deserialize, Serialize};

/// A single add/remove instruction for the activity tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// `true` installs the activity, `false` removes it
    pub add: bool,
    /// Name of the activity (e.g. "scan")
    pub activity: String,
    /// Slash-delimited path the activity lives under (e.g. "/jobs/123")
    pub path: String,
}

impl ActivityEvent {
    /// Event that marks `activity` as running under `path`
    pub fn add(activity: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            add: true,
            activity: activity.into(),
            path: path.into(),
        }
    }

    /// Event that marks `activity` under `path` as finished
    pub fn remove(activity: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            add: false,
            activity: activity.into(),
            path: path.into(),
        }
    }

    /// Emit this event to tracing for JSON export
    pub(crate) fn trace(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            tracing::trace!(target: "barker::event", event = json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let add = ActivityEvent::add("scan", "/jobs/123");
        assert!(add.add);
        assert_eq!(add.activity, "scan");
        assert_eq!(add.path, "/jobs/123");

        let remove = ActivityEvent::remove("scan", "/jobs/123");
        assert!(!remove.add);
        assert_eq!(remove.activity, add.activity);
        assert_eq!(remove.path, add.path);
    }

    #[test]
    fn test_json_shape() {
        let event = ActivityEvent::add("scan", "/jobs/123");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"add": true, "activity": "scan", "path": "/jobs/123"})
        );
    }
}
