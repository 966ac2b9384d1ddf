//! Wiring — turns a [`Config`] into live triggers.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tripwire_adapter_virtual::VirtualFeed;
use tripwire_app::change_watcher::{ChangeWatcher, WatchHandle};
use tripwire_app::dynamic_schedule::DynamicSchedule;
use tripwire_app::entity_store::EntityStore;
use tripwire_app::event_bus::InProcessEventBus;
use tripwire_app::ports::Clock;
use tripwire_app::pump::pump;
use tripwire_app::scheduler::{ScheduleHandle, Scheduler};
use tripwire_domain::entity::Entity;
use tripwire_domain::error::TripwireError;
use tripwire_domain::event::{Event, EventKind};

use crate::config::Config;

/// A running set of triggers plus the tasks feeding them.
///
/// Dropping the daemon cancels every trigger.
pub struct Daemon {
    store: EntityStore,
    bus: InProcessEventBus,
    watchers: Vec<WatchHandle>,
    schedules: Vec<ScheduleHandle>,
    dynamic_schedules: Vec<DynamicSchedule>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Register every configured trigger, then start the event logger and,
    /// when enabled, the virtual snapshot feed.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the first registration failure.
    pub fn start(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, TripwireError> {
        let store = EntityStore::new();
        let bus = InProcessEventBus::new(config.events.capacity);
        let scheduler = Scheduler::new(clock, config.scheduler.timezone)?;

        let watchers = config
            .watchers
            .iter()
            .map(|watcher| {
                let bus = bus.clone();
                ChangeWatcher::register(
                    &store,
                    watcher.entity.clone(),
                    move |entity: &Entity, previous: Option<&Entity>| {
                        bus.emit(watcher_event(entity, previous));
                    },
                    watcher.options(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let schedules = config
            .schedules
            .iter()
            .map(|schedule| {
                let (bus, name) = (bus.clone(), schedule.name.clone());
                scheduler.schedule(&schedule.at, move |at| {
                    bus.emit(schedule_event(&name, at));
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let dynamic_schedules = config
            .dynamic_schedules
            .iter()
            .map(|dynamic| {
                let (bus, name) = (bus.clone(), dynamic.name.clone());
                DynamicSchedule::bind(
                    &store,
                    scheduler.clone(),
                    dynamic.entity.clone(),
                    dynamic.path.clone(),
                    move |at| {
                        bus.emit(schedule_event(&name, at));
                    },
                )
            })
            .collect::<Vec<_>>();

        info!(
            watchers = watchers.len(),
            schedules = schedules.len(),
            dynamic_schedules = dynamic_schedules.len(),
            zone = %scheduler.zone(),
            "triggers registered"
        );

        let mut tasks = vec![tokio::spawn(log_events(bus.subscribe()))];
        if config.virtual_feed.enabled {
            let feed = VirtualFeed::new(config.virtual_feed.interval());
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = pump(feed, &store).await {
                    error!(error = %err, "virtual feed stopped");
                }
            }));
            info!(interval_ms = config.virtual_feed.interval_ms, "virtual feed started");
        }

        Ok(Self {
            store,
            bus,
            watchers,
            schedules,
            dynamic_schedules,
            tasks,
        })
    }

    /// The entity store fed by the snapshot source.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Subscribe to fired-trigger events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Unregister every trigger and stop background tasks.
    pub async fn shutdown(mut self) {
        self.watchers.clear();
        self.schedules.clear();
        self.dynamic_schedules.clear();
        for task in self.tasks.drain(..) {
            task.abort();
            // A cancelled task reports JoinError::Cancelled; nothing to do.
            let _ = task.await;
        }
        info!("triggers stopped");
    }
}

fn watcher_event(entity: &Entity, previous: Option<&Entity>) -> Event {
    Event::new(
        EventKind::WatcherFired,
        entity.entity_id.clone(),
        json!({
            "state": entity.state,
            "previous": previous.map(|p| p.state.as_str()),
            "attributes": entity.attributes,
        }),
    )
}

fn schedule_event(name: &str, at: tripwire_domain::time::Timestamp) -> Event {
    Event::new(
        EventKind::ScheduleFired,
        name,
        json!({ "scheduled_for": at.to_rfc3339() }),
    )
}

async fn log_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(
                kind = ?event.kind,
                source = %event.source,
                data = %event.data,
                "trigger fired"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
