//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `last_changed`, `last_updated`, event times, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Convert a signed chrono delta into a std duration, clamping negatives to zero.
#[must_use]
pub fn non_negative(delta: chrono::TimeDelta) -> std::time::Duration {
    delta.to_std().unwrap_or_default()
}
