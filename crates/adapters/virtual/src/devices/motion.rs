//! Virtual motion sensor — short bursts of detection.

use tripwire_domain::entity::Entity;
use tripwire_domain::error::TripwireError;
use tripwire_domain::time::Timestamp;

use super::stamp;

/// A simulated motion sensor: detects for two ticks out of every six.
///
/// The `detections` attribute counts bursts seen so far, which gives
/// watchers an attribute that changes without the state changing.
#[derive(Debug, Default)]
pub struct VirtualMotionSensor {
    last: Option<Entity>,
}

impl VirtualMotionSensor {
    pub const ENTITY_ID: &'static str = "binary_sensor.virtual_motion";
    const CYCLE: u64 = 6;
    const ACTIVE: u64 = 2;

    /// Produce the record for `tick`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails.
    pub fn observe(&mut self, tick: u64, now: Timestamp) -> Result<Entity, TripwireError> {
        let detected = tick % Self::CYCLE < Self::ACTIVE;
        let builder = Entity::builder()
            .entity_id(Self::ENTITY_ID)
            .attribute("friendly_name", "Virtual Motion")
            .attribute("device_class", "motion")
            .attribute("detections", tick / Self::CYCLE + 1);
        let state = if detected { "on" } else { "off" };
        let entity = stamp(builder, state, self.last.as_ref(), now)?;
        self.last = Some(entity.clone());
        Ok(entity)
    }
}
