//! Event — an immutable record of a trigger that fired.
//!
//! Events are published on the event bus whenever a change watcher or a
//! schedule invokes its callback.

use serde::{Deserialize, Serialize};

use crate::id::EventId;
use crate::time::Timestamp;

/// What produced an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WatcherFired,
    ScheduleFired,
}

/// A trigger firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    /// Entity key for watchers, schedule name for schedules.
    pub source: String,
    /// Free-form payload (new and previous state, fire time, …).
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create an event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(kind: EventKind, source: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            kind,
            source: source.into(),
            data,
            timestamp: crate::time::now(),
        }
    }

    /// Override the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}
