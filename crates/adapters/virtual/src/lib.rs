//! # tripwire-adapter-virtual
//!
//! Virtual snapshot source that simulates a small home so the engine can
//! run, and be demonstrated, without a vendor transport.
//!
//! ## Provided entities
//!
//! | Device | Entity ID | Behaviour |
//! |--------|-----------|-----------|
//! | Virtual Light | `light.virtual_light` | Toggles every few ticks |
//! | Virtual Motion | `binary_sensor.virtual_motion` | Short detection bursts, `detections` counter |
//! | Sun | `sun.sun` | Compressed day, `next_rising` timestamp attribute |
//!
//! ## Dependency rule
//!
//! Depends on `tripwire-app` (port traits) and `tripwire-domain` only.

mod devices;

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;
use tripwire_app::ports::SnapshotSource;
use tripwire_domain::error::TripwireError;
use tripwire_domain::snapshot::Snapshot;
use tripwire_domain::time;

pub use devices::{SunError, VirtualDevice, VirtualLight, VirtualMotionSensor, VirtualSun};

/// Ticks in one simulated day.
const SUN_DAY_TICKS: u64 = 60;

/// A [`SnapshotSource`] emitting one full snapshot per tick.
#[derive(Debug)]
pub struct VirtualFeed {
    period: Duration,
    limit: Option<u64>,
    tick: u64,
    ticker: Option<Interval>,
    devices: Vec<VirtualDevice>,
}

impl VirtualFeed {
    /// A feed ticking every `period` (at least one millisecond), forever.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let tick_length = chrono::TimeDelta::from_std(period).unwrap_or(chrono::TimeDelta::MAX);
        Self {
            period,
            limit: None,
            tick: 0,
            ticker: None,
            devices: vec![
                VirtualDevice::Light(VirtualLight::default()),
                VirtualDevice::Motion(VirtualMotionSensor::default()),
                VirtualDevice::Sun(VirtualSun::new(time::now(), tick_length, SUN_DAY_TICKS)),
            ],
        }
    }

    /// Stop after `ticks` snapshots.
    #[must_use]
    pub fn with_limit(mut self, ticks: u64) -> Self {
        self.limit = Some(ticks);
        self
    }

    /// Number of snapshots produced so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    fn observe(&mut self) -> Result<Snapshot, TripwireError> {
        let now = time::now();
        let tick = self.tick;
        self.devices
            .iter_mut()
            .map(|device| device.observe(tick, now))
            .collect()
    }
}

impl SnapshotSource for VirtualFeed {
    async fn next_snapshot(&mut self) -> Result<Option<Snapshot>, TripwireError> {
        if self.limit.is_some_and(|limit| self.tick >= limit) {
            return Ok(None);
        }
        let period = self.period;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;

        let snapshot = self.observe()?;
        debug!(tick = self.tick, entities = snapshot.len(), "virtual snapshot");
        self.tick += 1;
        Ok(Some(snapshot))
    }
}
