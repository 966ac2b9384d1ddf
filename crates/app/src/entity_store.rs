//! Entity store — holds the latest snapshot and fans updates out.
//!
//! Every [`EntityStore::set_snapshot`] swaps the stored snapshot and calls
//! each listener synchronously with `(new, previous)`, in subscription
//! order. Concurrent callers are serialized; a call made from inside a
//! listener is rejected with [`StoreError::Reentrant`].

use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use tripwire_domain::entity::Entity;
use tripwire_domain::error::TripwireError;
use tripwire_domain::snapshot::Snapshot;

use crate::lock;

/// Errors raised by the entity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("set_snapshot called from inside a store listener")]
    Reentrant,
}

impl From<StoreError> for TripwireError {
    fn from(err: StoreError) -> Self {
        TripwireError::Store(Box::new(err))
    }
}

type Listener = Arc<dyn Fn(&Snapshot, &Snapshot) + Send + Sync>;

struct State {
    current: Arc<Snapshot>,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
    delivering: Option<ThreadId>,
}

struct Shared {
    state: Mutex<State>,
    delivery: Mutex<()>,
}

/// Shared, cloneable handle to the entity store.
#[derive(Clone)]
pub struct EntityStore {
    shared: Arc<Shared>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::new())
    }

    /// A store pre-loaded with `snapshot`. Nobody is notified.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    current: Arc::new(snapshot),
                    listeners: Vec::new(),
                    next_listener: 0,
                    delivering: None,
                }),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&lock(&self.shared.state).current)
    }

    /// A copy of the current record for `entity_id`, if present.
    #[must_use]
    pub fn entity(&self, entity_id: &str) -> Option<Entity> {
        lock(&self.shared.state).current.get(entity_id).cloned()
    }

    /// Replace the snapshot and notify every listener with `(new, previous)`.
    ///
    /// Exactly one notification round happens per call, even when nothing
    /// changed. Listener panics propagate to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Store`] wrapping [`StoreError::Reentrant`]
    /// when called from inside a listener.
    pub fn set_snapshot(&self, snapshot: Snapshot) -> Result<(), TripwireError> {
        let me = thread::current().id();
        if lock(&self.shared.state).delivering == Some(me) {
            return Err(StoreError::Reentrant.into());
        }

        let _delivery = lock(&self.shared.delivery);
        let (new, previous, listeners) = {
            let mut state = lock(&self.shared.state);
            state.delivering = Some(me);
            let new = Arc::new(snapshot);
            let previous = std::mem::replace(&mut state.current, Arc::clone(&new));
            let listeners: Vec<Listener> = state
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (new, previous, listeners)
        };
        let _delivering = DeliveringGuard(&self.shared);

        tracing::trace!(
            entities = new.len(),
            listeners = listeners.len(),
            "delivering snapshot"
        );
        for listener in listeners {
            listener(&new, &previous);
        }
        Ok(())
    }

    /// Register a listener called on every subsequent `set_snapshot`.
    ///
    /// A listener registered before any snapshot exists is not called until
    /// the first `set_snapshot`.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Snapshot, &Snapshot) + Send + Sync + 'static,
    {
        self.subscribe_with(listener, |_| ()).0
    }

    /// Like [`subscribe`](Self::subscribe), then run `init` on the snapshot
    /// that was current when the listener was added.
    ///
    /// Registration and `init` are serialized with `set_snapshot`: no
    /// delivery reaches the listener before `init` has returned. Called from
    /// inside a listener, the ongoing delivery round already holds the store,
    /// so `init` runs on the snapshot being delivered. `set_snapshot` issued
    /// from `init` is rejected with [`StoreError::Reentrant`].
    pub fn subscribe_with<F, I, R>(&self, listener: F, init: I) -> (Subscription, R)
    where
        F: Fn(&Snapshot, &Snapshot) + Send + Sync + 'static,
        I: FnOnce(&Snapshot) -> R,
    {
        let me = thread::current().id();
        let nested = lock(&self.shared.state).delivering == Some(me);
        let _delivery = (!nested).then(|| lock(&self.shared.delivery));

        let (subscription, current) = {
            let mut state = lock(&self.shared.state);
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, Arc::new(listener)));
            if !nested {
                state.delivering = Some(me);
            }
            let subscription = Subscription {
                shared: Arc::downgrade(&self.shared),
                id,
            };
            (subscription, Arc::clone(&state.current))
        };
        let _delivering = (!nested).then(|| DeliveringGuard(&self.shared));

        (subscription, init(&current))
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.shared.state).listeners.len()
    }
}

struct DeliveringGuard<'a>(&'a Shared);

impl Drop for DeliveringGuard<'_> {
    fn drop(&mut self) {
        lock(&self.0.state).delivering = None;
    }
}

/// Registration handle returned by [`EntityStore::subscribe`].
///
/// Dropping it removes the listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            lock(&shared.state)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn entity(id: &str, state: &str) -> Entity {
        Entity::builder().entity_id(id).state(state).build().unwrap()
    }

    fn snapshot(entities: &[(&str, &str)]) -> Snapshot {
        entities.iter().map(|(id, state)| entity(id, state)).collect()
    }

    #[test]
    fn should_notify_listener_with_new_and_previous() {
        let store = EntityStore::with_snapshot(snapshot(&[("light.a", "on")]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(move |new, old| {
            sink.lock().unwrap().push((
                new.get("light.a").map(|e| e.state.clone()),
                old.get("light.a").map(|e| e.state.clone()),
            ));
        });

        store.set_snapshot(snapshot(&[("light.a", "off")])).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Some("off".to_string()), Some("on".to_string()))]
        );
    }

    #[test]
    fn should_notify_once_per_call_even_without_change() {
        let store = EntityStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _sub = store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set_snapshot(snapshot(&[("light.a", "on")])).unwrap();
        store.set_snapshot(snapshot(&[("light.a", "on")])).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn should_not_call_listener_before_first_snapshot() {
        let store = EntityStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _sub = store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn should_call_listeners_in_subscription_order() {
        let store = EntityStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<Subscription> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                store.subscribe(move |_, _| order.lock().unwrap().push(i))
            })
            .collect();

        store.set_snapshot(Snapshot::new()).unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn should_stop_notifying_after_unsubscribe() {
        let store = EntityStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let sub = store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set_snapshot(Snapshot::new()).unwrap();
        sub.unsubscribe();
        store.set_snapshot(Snapshot::new()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn should_reject_reentrant_set_snapshot() {
        let store = EntityStore::new();
        let inner = store.clone();
        let result = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&result);
        let _sub = store.subscribe(move |_, _| {
            let outcome = inner.set_snapshot(Snapshot::new());
            *sink.lock().unwrap() = Some(outcome);
        });

        store.set_snapshot(Snapshot::new()).unwrap();

        let outcome = result.lock().unwrap().take().unwrap();
        assert!(matches!(outcome, Err(TripwireError::Store(_))));
        // The store keeps working after the rejected call.
        store.set_snapshot(Snapshot::new()).unwrap();
    }

    #[test]
    fn should_expose_current_snapshot_and_entity() {
        let store = EntityStore::new();
        assert!(store.snapshot().is_empty());
        assert!(store.entity("light.a").is_none());

        store.set_snapshot(snapshot(&[("light.a", "on")])).unwrap();

        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.entity("light.a").unwrap().state, "on");
    }

    #[test]
    fn should_run_init_on_current_snapshot() {
        let store = EntityStore::with_snapshot(snapshot(&[("light.a", "on")]));
        let (_sub, state) = store.subscribe_with(
            |_, _| {},
            |current| current.get("light.a").map(|e| e.state.clone()),
        );
        assert_eq!(state.as_deref(), Some("on"));
    }

    #[test]
    fn should_reject_set_snapshot_from_init() {
        let store = EntityStore::new();
        let inner = store.clone();
        let (_sub, outcome) =
            store.subscribe_with(|_, _| {}, |_| inner.set_snapshot(Snapshot::new()));
        assert!(matches!(outcome, Err(TripwireError::Store(_))));
        store.set_snapshot(Snapshot::new()).unwrap();
    }

    #[test]
    fn should_allow_subscribing_from_inside_listener() {
        let store = EntityStore::with_snapshot(snapshot(&[("light.a", "on")]));
        let inner = store.clone();
        let nested = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&nested);
        let _sub = store.subscribe(move |_, _| {
            let (sub, state) = inner.subscribe_with(
                |_, _| {},
                |current| current.get("light.a").map(|e| e.state.clone()),
            );
            sink.lock().unwrap().push((sub, state));
        });

        store.set_snapshot(snapshot(&[("light.a", "off")])).unwrap();

        let nested = nested.lock().unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].1.as_deref(), Some("off"));
        assert_eq!(store.listener_count(), 2);
    }

    #[test]
    fn should_deliver_only_after_init_during_concurrent_write() {
        for _ in 0..200 {
            let store = EntityStore::with_snapshot(snapshot(&[("light.a", "on")]));
            let events = Arc::new(Mutex::new(Vec::new()));
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let writer = {
                let (store, barrier) = (store.clone(), Arc::clone(&barrier));
                std::thread::spawn(move || {
                    barrier.wait();
                    store.set_snapshot(snapshot(&[("light.a", "off")])).unwrap();
                })
            };

            barrier.wait();
            let (listen, seed) = (Arc::clone(&events), Arc::clone(&events));
            let (_sub, ()) = store.subscribe_with(
                move |new, old| {
                    listen.lock().unwrap().push(format!(
                        "update {}->{}",
                        old.get("light.a").map_or("-", |e| e.state.as_str()),
                        new.get("light.a").map_or("-", |e| e.state.as_str()),
                    ));
                },
                move |current| {
                    std::thread::yield_now();
                    let state = current.get("light.a").map_or("-", |e| e.state.as_str());
                    seed.lock().unwrap().push(format!("init {state}"));
                },
            );
            writer.join().unwrap();

            let events = events.lock().unwrap();
            // Either the write landed before registration (init sees "off",
            // no update), or after init (init sees "on", then on->off).
            match events.as_slice() {
                [only] => assert_eq!(only, "init off"),
                [first, second] => {
                    assert_eq!(first, "init on");
                    assert_eq!(second, "update on->off");
                }
                other => panic!("unexpected delivery sequence: {other:?}"),
            }
        }
    }

    #[test]
    fn should_serialize_concurrent_writers() {
        let store = EntityStore::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let (flight, clash) = (Arc::clone(&in_flight), Arc::clone(&overlap));
        let _sub = store.subscribe(move |_, _| {
            if flight.fetch_add(1, Ordering::SeqCst) > 0 {
                clash.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::yield_now();
            flight.fetch_sub(1, Ordering::SeqCst);
        });

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.set_snapshot(Snapshot::new()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }
}
