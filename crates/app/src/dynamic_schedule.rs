//! Dynamic schedules — a schedule whose spec lives in entity state.
//!
//! The bound path (for example `attributes.next_rising` on `sun.sun`) is
//! read on every store update and fed to a [`ScheduleSlot`], which only
//! reschedules when the derived spec string actually changes.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::warn;
use tripwire_domain::dependency::DependencyPath;
use tripwire_domain::snapshot::Snapshot;
use tripwire_domain::time::Timestamp;

use crate::entity_store::{EntityStore, Subscription};
use crate::lock;
use crate::scheduler::{ScheduleSlot, Scheduler};

/// A [`ScheduleSlot`] driven by an entity path.
///
/// Dropping it unsubscribes from the store and cancels the live schedule.
pub struct DynamicSchedule {
    slot: Arc<Mutex<ScheduleSlot>>,
    _subscription: Subscription,
}

impl DynamicSchedule {
    /// Bind `path` on `entity_id` to a new schedule running `action`.
    ///
    /// The current snapshot is read immediately, so an already-present
    /// value is scheduled right away. A concurrent `set_snapshot` is
    /// delivered after that initial read, never before it.
    pub fn bind<F>(
        store: &EntityStore,
        scheduler: Scheduler,
        entity_id: impl Into<String>,
        path: DependencyPath,
        action: F,
    ) -> Self
    where
        F: Fn(Timestamp) + Send + Sync + 'static,
    {
        let entity_id = entity_id.into();
        let name = format!("{entity_id}:{path}");
        let slot = Arc::new(Mutex::new(ScheduleSlot::new(scheduler, name, action)));

        let listener_slot = Arc::clone(&slot);
        let (initial_entity, initial_path) = (entity_id.clone(), path.clone());
        let (subscription, ()) = store.subscribe_with(
            move |new, _| reconcile(&listener_slot, new, &entity_id, &path),
            |current| reconcile(&slot, current, &initial_entity, &initial_path),
        );

        Self {
            slot,
            _subscription: subscription,
        }
    }

    /// The spec string currently scheduled, if any.
    #[must_use]
    pub fn current_spec(&self) -> Option<String> {
        lock(&self.slot).spec().map(str::to_string)
    }
}

fn derive_spec(snapshot: &Snapshot, entity_id: &str, path: &DependencyPath) -> Option<String> {
    match snapshot.get(entity_id).and_then(|entity| path.resolve(entity)) {
        None | Some(Value::Null) => None,
        Some(Value::String(spec)) => Some(spec),
        Some(other) => {
            warn!(entity = entity_id, %path, value = %other, "schedule source is not a string");
            None
        }
    }
}

fn reconcile(
    slot: &Mutex<ScheduleSlot>,
    snapshot: &Snapshot,
    entity_id: &str,
    path: &DependencyPath,
) {
    let spec = derive_spec(snapshot, entity_id, path);
    let mut slot = lock(slot);
    if let Err(err) = slot.set_spec(spec.as_deref()) {
        warn!(slot = slot.name(), error = %err, "ignoring unusable schedule value");
    }
}
