//! End-to-end tests for the tripwired wiring.
//!
//! Each test builds a [`Daemon`] from TOML on a paused tokio clock, drives
//! the entity store (directly or through the virtual feed) and observes the
//! events published on the bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tripwire_app::clock::TokioClock;
use tripwire_app::ports::Clock;
use tripwire_domain::entity::Entity;
use tripwire_domain::event::{Event, EventKind};
use tripwire_domain::snapshot::Snapshot;
use tripwired::config::Config;
use tripwired::daemon::Daemon;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clock() -> Arc<dyn Clock> {
    let origin = chrono::DateTime::parse_from_rfc3339("2021-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    Arc::new(TokioClock::starting_at(origin))
}

fn light(state: &str) -> Snapshot {
    Snapshot::new().with(
        Entity::builder()
            .entity_id("light.hall")
            .state(state)
            .build()
            .unwrap(),
    )
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Watchers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_publish_event_when_sustained_watcher_fires() {
    let config = Config::from_toml(
        r#"
        [virtual]
        enabled = false

        [[watchers]]
        entity = "light.hall"
        to = "off"
        for_ms = 1000
        "#,
    )
    .unwrap();
    let daemon = Daemon::start(&config, clock()).unwrap();
    let mut events = daemon.events();

    daemon.store().set_snapshot(light("on")).unwrap();
    daemon.store().set_snapshot(light("off")).unwrap();
    advance(999).await;
    assert!(drain(&mut events).is_empty());

    advance(1).await;
    let fired = drain(&mut events);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].kind, EventKind::WatcherFired);
    assert_eq!(fired[0].source, "light.hall");
    assert_eq!(fired[0].data["state"], "off");
    assert_eq!(fired[0].data["previous"], "on");

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn should_stop_firing_after_shutdown() {
    let config = Config::from_toml(
        r#"
        [virtual]
        enabled = false

        [[watchers]]
        entity = "light.hall"
        "#,
    )
    .unwrap();
    let daemon = Daemon::start(&config, clock()).unwrap();
    let store = daemon.store().clone();
    let mut events = daemon.events();

    store.set_snapshot(light("on")).unwrap();
    daemon.shutdown().await;
    store.set_snapshot(light("off")).unwrap();

    assert!(drain(&mut events).is_empty());
    assert_eq!(store.listener_count(), 0);
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_publish_event_for_daily_schedule() {
    let config = Config::from_toml(
        r#"
        [scheduler]
        timezone = "utc"

        [virtual]
        enabled = false

        [[schedules]]
        name = "one_am"
        at = "01:00"
        "#,
    )
    .unwrap();
    let daemon = Daemon::start(&config, clock()).unwrap();
    let mut events = daemon.events();

    advance(60 * 60 * 1000).await;
    let fired = drain(&mut events);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].kind, EventKind::ScheduleFired);
    assert_eq!(fired[0].source, "one_am");
    assert_eq!(fired[0].data["scheduled_for"], "2021-01-01T01:00:00+00:00");

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn should_follow_dynamic_schedule_source() {
    let config = Config::from_toml(
        r#"
        [scheduler]
        timezone = "utc"

        [virtual]
        enabled = false

        [[dynamic_schedules]]
        name = "sunrise"
        entity = "sun.sun"
        path = "attributes.next_rising"
        "#,
    )
    .unwrap();
    let daemon = Daemon::start(&config, clock()).unwrap();
    let mut events = daemon.events();
    let sun = |at: &str| {
        Snapshot::new().with(
            Entity::builder()
                .entity_id("sun.sun")
                .state("below_horizon")
                .attribute("next_rising", at)
                .build()
                .unwrap(),
        )
    };

    daemon
        .store()
        .set_snapshot(sun("2021-01-01T00:00:10Z"))
        .unwrap();
    advance(5_000).await;
    daemon
        .store()
        .set_snapshot(sun("2021-01-01T00:00:20Z"))
        .unwrap();

    advance(10_000).await;
    assert!(drain(&mut events).is_empty());

    advance(5_000).await;
    let fired = drain(&mut events);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].source, "sunrise");

    daemon.shutdown().await;
}

#[test]
fn should_reject_invalid_schedule_in_config() {
    let config = Config::from_toml(
        r#"
        [[schedules]]
        name = "broken"
        at = "sometime soon"
        "#,
    )
    .unwrap();
    assert!(config.validate().is_err());
}

// ---------------------------------------------------------------------------
// Virtual feed
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_drive_watchers_from_virtual_feed() {
    let config = Config::from_toml(
        r#"
        [virtual]
        enabled = true
        interval_ms = 1000

        [[watchers]]
        entity = "light.virtual_light"
        to = "on"
        "#,
    )
    .unwrap();
    let daemon = Daemon::start(&config, clock()).unwrap();
    let mut events = daemon.events();

    advance(0).await;
    for _ in 0..5 {
        advance(1000).await;
    }

    let fired = drain(&mut events);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].source, "light.virtual_light");
    assert_eq!(fired[0].data["state"], "on");
    assert_eq!(fired[0].data["previous"], "off");
    assert_eq!(daemon.store().snapshot().len(), 3);

    daemon.shutdown().await;
}
