//! Clock port — where "now" comes from.

use tripwire_domain::time::Timestamp;

/// Wall-clock time source used for calendar arithmetic.
///
/// Sleeping always goes through `tokio::time`; the clock only answers
/// "what time is it", so implementations must agree with tokio's notion
/// of elapsed time for schedules to fire on the right instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
