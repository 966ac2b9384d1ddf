//! Virtual light — toggles on and off on a fixed period.

use serde_json::Value;
use tripwire_domain::entity::Entity;
use tripwire_domain::error::TripwireError;
use tripwire_domain::time::Timestamp;

use super::stamp;

/// A simulated light that flips state every `period` ticks.
#[derive(Debug)]
pub struct VirtualLight {
    period: u64,
    last: Option<Entity>,
}

impl Default for VirtualLight {
    fn default() -> Self {
        Self::new(4)
    }
}

impl VirtualLight {
    pub const ENTITY_ID: &'static str = "light.virtual_light";

    #[must_use]
    pub fn new(period: u64) -> Self {
        Self {
            period: period.max(1),
            last: None,
        }
    }

    /// Produce the record for `tick`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails.
    pub fn observe(&mut self, tick: u64, now: Timestamp) -> Result<Entity, TripwireError> {
        let on = (tick / self.period) % 2 == 1;
        let builder = Entity::builder()
            .entity_id(Self::ENTITY_ID)
            .attribute("friendly_name", "Virtual Light")
            .attribute("brightness", if on { Value::from(255) } else { Value::Null });
        let entity = stamp(builder, if on { "on" } else { "off" }, self.last.as_ref(), now)?;
        self.last = Some(entity.clone());
        Ok(entity)
    }
}
