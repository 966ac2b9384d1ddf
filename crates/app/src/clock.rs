//! Clock implementations.

use tokio::time::Instant;
use tripwire_domain::time::{self, Timestamp};

use crate::ports::Clock;

/// The host's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        time::now()
    }
}

/// Wall time derived from tokio's monotonic clock.
///
/// Reports `origin + elapsed`, where elapsed is measured with
/// [`tokio::time::Instant`]. Under a paused tokio runtime the wall clock
/// therefore advances exactly with `tokio::time::advance`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Timestamp,
    started: Instant,
}

impl TokioClock {
    /// Start the clock at `origin`, now.
    #[must_use]
    pub fn starting_at(origin: Timestamp) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::starting_at(time::now())
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.started.elapsed();
        chrono::TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|delta| self.origin.checked_add_signed(delta))
            .unwrap_or(self.origin)
    }
}
