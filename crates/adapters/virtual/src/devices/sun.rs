//! Virtual sun — a compressed day with a `next_rising` timestamp.

use chrono::TimeDelta;
use tripwire_domain::entity::Entity;
use tripwire_domain::error::TripwireError;
use tripwire_domain::time::Timestamp;

use super::stamp;

/// The simulated calendar ran past what a timestamp can represent.
#[derive(Debug, thiserror::Error)]
#[error("simulated sunrise for day {day} is out of range")]
pub struct SunError {
    pub day: u64,
}

impl From<SunError> for TripwireError {
    fn from(err: SunError) -> Self {
        TripwireError::Runtime(Box::new(err))
    }
}

/// A simulated `sun.sun` entity.
///
/// One simulated day lasts `day_ticks` ticks of `tick_length`; the sun is
/// above the horizon for the first half. `next_rising` is the RFC 3339
/// instant of the next simulated sunrise, constant for the whole day.
#[derive(Debug)]
pub struct VirtualSun {
    origin: Timestamp,
    tick_length: TimeDelta,
    day_ticks: u64,
    last: Option<Entity>,
}

impl VirtualSun {
    pub const ENTITY_ID: &'static str = "sun.sun";

    #[must_use]
    pub fn new(origin: Timestamp, tick_length: TimeDelta, day_ticks: u64) -> Self {
        Self {
            origin,
            tick_length,
            day_ticks: day_ticks.max(2),
            last: None,
        }
    }

    /// Instant of the sunrise that starts simulated day `day`.
    fn sunrise(&self, day: u64) -> Result<Timestamp, SunError> {
        day.checked_mul(self.day_ticks)
            .and_then(|ticks| i32::try_from(ticks).ok())
            .and_then(|ticks| self.tick_length.checked_mul(ticks))
            .and_then(|offset| self.origin.checked_add_signed(offset))
            .ok_or(SunError { day })
    }

    /// Produce the record for `tick`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails, or [`SunError`] when
    /// the next sunrise cannot be represented.
    pub fn observe(&mut self, tick: u64, now: Timestamp) -> Result<Entity, TripwireError> {
        let day = tick / self.day_ticks;
        let above = tick % self.day_ticks < self.day_ticks / 2;
        let next_rising = self.sunrise(day + 1)?.to_rfc3339();
        let builder = Entity::builder()
            .entity_id(Self::ENTITY_ID)
            .attribute("friendly_name", "Sun")
            .attribute("next_rising", next_rising);
        let state = if above {
            "above_horizon"
        } else {
            "below_horizon"
        };
        let entity = stamp(builder, state, self.last.as_ref(), now)?;
        self.last = Some(entity.clone());
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn origin() -> Timestamp {
        chrono::DateTime::parse_from_rfc3339("2021-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc)
    }

    #[test]
    fn should_rise_for_first_half_of_day() {
        let mut sun = VirtualSun::new(origin(), TimeDelta::seconds(1), 4);
        let states: Vec<String> = (0..5)
            .map(|tick| sun.observe(tick, origin()).unwrap().state)
            .collect();
        assert_eq!(
            states,
            vec![
                "above_horizon",
                "above_horizon",
                "below_horizon",
                "below_horizon",
                "above_horizon"
            ]
        );
    }

    #[test]
    fn should_keep_next_rising_constant_within_a_day() {
        let mut sun = VirtualSun::new(origin(), TimeDelta::seconds(10), 4);
        let rising = |sun: &mut VirtualSun, tick| {
            sun.observe(tick, origin())
                .unwrap()
                .get_attribute("next_rising")
                .cloned()
        };

        let first = rising(&mut sun, 0);
        assert_eq!(first, Some(Value::from("2021-01-01T00:00:40+00:00")));
        assert_eq!(rising(&mut sun, 3), first);
        assert_eq!(
            rising(&mut sun, 4),
            Some(Value::from("2021-01-01T00:01:20+00:00"))
        );
    }

    #[test]
    fn should_fail_instead_of_overflowing_on_huge_ticks() {
        let mut sun = VirtualSun::new(origin(), TimeDelta::MAX, 60);
        let err = sun.observe(0, origin()).unwrap_err();
        assert!(matches!(err, TripwireError::Runtime(_)));
        assert!(sun.observe(0, origin()).is_err());
    }
}
