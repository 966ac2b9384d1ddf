//! Sustain timer — the anchored, re-evaluating state behind `for`.
//!
//! The timer never stores a deadline. It keeps the instant the qualifying
//! transition happened (the anchor) and derives `anchor + sustain` every
//! time it is polled, so changing the duration while armed moves the
//! deadline relative to the original transition.

use std::time::Duration;

use tokio::time::Instant;
use tripwire_domain::entity::Entity;

/// The transition waiting for its sustain period to elapse.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub anchor: Instant,
    pub entity: Entity,
    pub previous: Option<Entity>,
}

/// Explicit timer state owned by a change watcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SustainState {
    #[default]
    Idle,
    Armed(Pending),
}

/// Outcome of polling an armed timer.
#[derive(Debug, PartialEq)]
pub enum Wakeup {
    /// Nothing pending.
    Idle,
    /// The deadline has passed; the timer is now idle.
    Fire(Pending),
    /// Poll again at this instant.
    WaitUntil(Instant),
}

impl SustainState {
    /// Arm (or re-arm) with a new anchor, superseding any pending transition.
    pub fn arm(&mut self, anchor: Instant, entity: Entity, previous: Option<Entity>) {
        *self = Self::Armed(Pending {
            anchor,
            entity,
            previous,
        });
    }

    /// Drop any pending transition. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        matches!(std::mem::take(self), Self::Armed(_))
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed(_))
    }

    /// Re-evaluate against `now` using the current `sustain` duration.
    pub fn poll(&mut self, now: Instant, sustain: Duration) -> Wakeup {
        let Self::Armed(pending) = self else {
            return Wakeup::Idle;
        };
        let deadline = pending.anchor + sustain;
        if now >= deadline {
            match std::mem::take(self) {
                Self::Armed(pending) => Wakeup::Fire(pending),
                Self::Idle => Wakeup::Idle,
            }
        } else {
            Wakeup::WaitUntil(deadline)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(state: &str) -> Entity {
        Entity::builder()
            .entity_id("switch.washer")
            .state(state)
            .build()
            .unwrap()
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn should_stay_idle_when_never_armed() {
        let mut timer = SustainState::default();
        assert_eq!(timer.poll(Instant::now(), secs(1)), Wakeup::Idle);
    }

    #[test]
    fn should_wait_until_anchor_plus_sustain() {
        let t0 = Instant::now();
        let mut timer = SustainState::default();
        timer.arm(t0, entity("off"), Some(entity("on")));

        assert_eq!(timer.poll(t0, secs(60)), Wakeup::WaitUntil(t0 + secs(60)));
        assert!(timer.is_armed());
    }

    #[test]
    fn should_fire_and_clear_once_deadline_passed() {
        let t0 = Instant::now();
        let mut timer = SustainState::default();
        timer.arm(t0, entity("off"), Some(entity("on")));

        let Wakeup::Fire(pending) = timer.poll(t0 + secs(60), secs(60)) else {
            panic!("expected fire");
        };
        assert_eq!(pending.entity.state, "off");
        assert_eq!(pending.previous.unwrap().state, "on");
        assert!(!timer.is_armed());
    }

    #[test]
    fn should_move_deadline_when_sustain_grows() {
        let t0 = Instant::now();
        let mut timer = SustainState::default();
        timer.arm(t0, entity("off"), None);

        assert_eq!(
            timer.poll(t0 + secs(60), secs(180)),
            Wakeup::WaitUntil(t0 + secs(180))
        );
    }

    #[test]
    fn should_fire_immediately_when_sustain_shrinks_below_elapsed() {
        let t0 = Instant::now();
        let mut timer = SustainState::default();
        timer.arm(t0, entity("off"), None);

        assert!(matches!(
            timer.poll(t0 + secs(100), secs(60)),
            Wakeup::Fire(_)
        ));
    }

    #[test]
    fn should_reset_anchor_on_rearm() {
        let t0 = Instant::now();
        let mut timer = SustainState::default();
        timer.arm(t0, entity("off"), None);
        timer.arm(t0 + secs(30), entity("off"), None);

        assert_eq!(
            timer.poll(t0 + secs(60), secs(60)),
            Wakeup::WaitUntil(t0 + secs(90))
        );
    }

    #[test]
    fn should_report_cancellation() {
        let mut timer = SustainState::default();
        assert!(!timer.cancel());
        timer.arm(Instant::now(), entity("off"), None);
        assert!(timer.cancel());
        assert!(!timer.is_armed());
    }
}
