//! Virtual device implementations — light, motion sensor, sun.
//!
//! Each device is a pure function of the feed's tick counter, so a feed
//! replays the same sequence of states every run.

mod light;
mod motion;
mod sun;

pub use light::VirtualLight;
pub use motion::VirtualMotionSensor;
pub use sun::{SunError, VirtualSun};

use tripwire_domain::entity::{Entity, EntityBuilder};
use tripwire_domain::error::TripwireError;
use tripwire_domain::time::Timestamp;

/// Wrapper enum for the concrete virtual device types.
#[derive(Debug)]
pub enum VirtualDevice {
    Light(VirtualLight),
    Motion(VirtualMotionSensor),
    Sun(VirtualSun),
}

impl VirtualDevice {
    /// Produce this device's record for `tick`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails.
    pub fn observe(&mut self, tick: u64, now: Timestamp) -> Result<Entity, TripwireError> {
        match self {
            Self::Light(d) => d.observe(tick, now),
            Self::Motion(d) => d.observe(tick, now),
            Self::Sun(d) => d.observe(tick, now),
        }
    }
}

/// Stamp `builder` with `last_updated = now`, keeping `last_changed` from
/// `previous` unless the state moved.
pub(crate) fn stamp(
    builder: EntityBuilder,
    state: &str,
    previous: Option<&Entity>,
    now: Timestamp,
) -> Result<Entity, TripwireError> {
    let changed = previous
        .filter(|p| p.state == state)
        .and_then(|p| p.last_changed)
        .unwrap_or(now);
    builder
        .state(state)
        .last_changed(changed)
        .last_updated(now)
        .build()
}
