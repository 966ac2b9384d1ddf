//! Change watcher — fires a callback when an entity transitions.
//!
//! Each store notification is evaluated in order:
//!
//! 1. entity missing from the new snapshot → ignore
//! 2. not different on any dependency path → ignore
//! 3. first qualifying update since registration → baseline, unless
//!    `call_on_startup`
//! 4. `from` / `to` filter fails → cancel any pending sustain timer
//! 5. no `for` (or zero) → fire now
//! 6. otherwise → (re)arm the sustain timer
//!
//! Callbacks and teardowns always run with no watcher lock held, so they
//! may freely call back into their own [`WatchHandle`].

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace};
use tripwire_domain::dependency::is_different;
use tripwire_domain::entity::Entity;
use tripwire_domain::error::TripwireError;
use tripwire_domain::id::WatcherId;
use tripwire_domain::watch::{WatchOptions, effective_sustain};

use crate::entity_store::{EntityStore, Subscription};
use crate::lock;
use crate::sustain::{Pending, SustainState, Wakeup};

/// Cleanup returned by a callback, run before the next fire or on
/// unregistration.
#[derive(Default)]
#[must_use]
pub struct Teardown(Option<Box<dyn FnOnce() + Send>>);

impl Teardown {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// No cleanup.
    pub fn none() -> Self {
        Self(None)
    }

    fn run(self) {
        if let Some(f) = self.0 {
            f();
        }
    }
}

impl From<()> for Teardown {
    fn from((): ()) -> Self {
        Self::none()
    }
}

impl From<Option<Teardown>> for Teardown {
    fn from(teardown: Option<Teardown>) -> Self {
        teardown.unwrap_or_default()
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Teardown").field(&self.0.is_some()).finish()
    }
}

type Callback = Arc<dyn Fn(&Entity, Option<&Entity>) -> Teardown + Send + Sync>;

fn boxed<F, R>(callback: F) -> Callback
where
    F: Fn(&Entity, Option<&Entity>) -> R + Send + Sync + 'static,
    R: Into<Teardown>,
{
    Arc::new(move |entity: &Entity, previous: Option<&Entity>| callback(entity, previous).into())
}

struct WatcherState {
    active: bool,
    baseline_seen: bool,
    callback: Callback,
    sustain: Option<Duration>,
    timer: SustainState,
    generation: u64,
    timer_task: Option<AbortHandle>,
    teardown: Teardown,
}

impl WatcherState {
    fn cancel_timer(&mut self) -> bool {
        self.generation += 1;
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        self.timer.cancel()
    }

    fn poll_timer(&mut self) -> Step {
        let sustain = effective_sustain(self.sustain).unwrap_or_default();
        match self.timer.poll(Instant::now(), sustain) {
            Wakeup::Idle => Step::Nothing,
            Wakeup::WaitUntil(deadline) => Step::Sleep(self.generation, deadline),
            Wakeup::Fire(pending) => {
                self.generation += 1;
                self.timer_task = None;
                Step::Fire(Arc::clone(&self.callback), pending)
            }
        }
    }
}

enum Step {
    Nothing,
    Fire(Callback, Pending),
    Sleep(u64, Instant),
}

/// A registered reactive trigger for one entity.
///
/// Obtain one with [`ChangeWatcher::register`]; it stays alive for as long
/// as the returned [`WatchHandle`].
pub struct ChangeWatcher {
    id: WatcherId,
    entity_id: String,
    options: WatchOptions,
    runtime: Handle,
    state: Mutex<WatcherState>,
}

impl ChangeWatcher {
    /// Register a watcher on `entity_id`.
    ///
    /// When the store already holds the entity, it is evaluated right away
    /// as the startup event `(entity, None)`: it fires (or arms) only with
    /// `call_on_startup`, otherwise it becomes the baseline.
    ///
    /// Sustain timers run on the tokio runtime current at registration.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Validation`] when the options are invalid
    /// or the key is empty, and [`TripwireError::Runtime`] when called
    /// outside a tokio runtime.
    pub fn register<F, R>(
        store: &EntityStore,
        entity_id: impl Into<String>,
        callback: F,
        options: WatchOptions,
    ) -> Result<WatchHandle, TripwireError>
    where
        F: Fn(&Entity, Option<&Entity>) -> R + Send + Sync + 'static,
        R: Into<Teardown>,
    {
        let entity_id = entity_id.into();
        if entity_id.is_empty() {
            return Err(tripwire_domain::error::ValidationError::EmptyEntityKey.into());
        }
        options.validate()?;
        let runtime = Handle::try_current().map_err(|err| TripwireError::Runtime(Box::new(err)))?;

        let watcher = Arc::new(Self {
            id: WatcherId::new(),
            entity_id,
            runtime,
            state: Mutex::new(WatcherState {
                active: true,
                baseline_seen: false,
                callback: boxed(callback),
                sustain: options.sustain,
                timer: SustainState::Idle,
                generation: 0,
                timer_task: None,
                teardown: Teardown::none(),
            }),
            options,
        });

        let listener = Arc::clone(&watcher);
        let (subscription, ()) = store.subscribe_with(
            move |new, old| {
                if let Some(entity) = new.get(&listener.entity_id) {
                    listener.evaluate(entity, old.get(&listener.entity_id));
                }
            },
            |current| {
                if let Some(entity) = current.get(&watcher.entity_id) {
                    watcher.evaluate(entity, None);
                }
            },
        );
        debug!(watcher = %watcher.id, entity = %watcher.entity_id, "watcher registered");

        Ok(WatchHandle {
            watcher,
            _subscription: subscription,
        })
    }

    fn evaluate(self: &Arc<Self>, entity: &Entity, previous: Option<&Entity>) {
        if !is_different(&self.options.deps, previous, Some(entity)) {
            trace!(entity = %self.entity_id, "no relevant change");
            return;
        }

        let step = {
            let mut state = lock(&self.state);
            if !state.active {
                return;
            }
            if !state.baseline_seen {
                state.baseline_seen = true;
                if !self.options.call_on_startup {
                    debug!(entity = %self.entity_id, state = %entity.state, "baseline recorded");
                    return;
                }
            }
            if !(self.options.from_matches(previous) && self.options.to_matches(entity)) {
                if state.cancel_timer() {
                    debug!(entity = %self.entity_id, state = %entity.state, "sustain timer cancelled");
                }
                return;
            }
            state.cancel_timer();
            state
                .timer
                .arm(Instant::now(), entity.clone(), previous.cloned());
            if effective_sustain(state.sustain).is_some() {
                debug!(entity = %self.entity_id, state = %entity.state, "sustain timer armed");
            }
            state.poll_timer()
        };
        self.run(step);
    }

    fn run(self: &Arc<Self>, step: Step) {
        match step {
            Step::Nothing => {}
            Step::Fire(callback, pending) => self.fire(&callback, &pending),
            Step::Sleep(generation, deadline) => self.spawn_timer(generation, deadline),
        }
    }

    fn spawn_timer(self: &Arc<Self>, generation: u64, deadline: Instant) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            let mut deadline = deadline;
            loop {
                tokio::time::sleep_until(deadline).await;
                let Some(watcher) = weak.upgrade() else {
                    return;
                };
                let step = {
                    let mut state = lock(&watcher.state);
                    if !state.active || state.generation != generation {
                        return;
                    }
                    state.poll_timer()
                };
                match step {
                    Step::Nothing => return,
                    Step::Sleep(_, next) => deadline = next,
                    Step::Fire(callback, pending) => {
                        watcher.fire(&callback, &pending);
                        return;
                    }
                }
            }
        });
        let mut state = lock(&self.state);
        if state.generation == generation {
            state.timer_task = Some(task.abort_handle());
        } else {
            task.abort();
        }
    }

    fn fire(&self, callback: &Callback, pending: &Pending) {
        let previous_teardown = std::mem::take(&mut lock(&self.state).teardown);
        previous_teardown.run();

        debug!(
            watcher = %self.id,
            entity = %self.entity_id,
            state = %pending.entity.state,
            "firing"
        );
        let teardown = callback(&pending.entity, pending.previous.as_ref());

        let mut state = lock(&self.state);
        if state.active {
            state.teardown = teardown;
        } else {
            drop(state);
            teardown.run();
        }
    }

    fn set_callback(&self, callback: Callback) {
        lock(&self.state).callback = callback;
    }

    fn set_sustain(self: &Arc<Self>, sustain: Option<Duration>) {
        let step = {
            let mut state = lock(&self.state);
            state.sustain = sustain;
            if !state.active || !state.timer.is_armed() {
                return;
            }
            state.generation += 1;
            if let Some(task) = state.timer_task.take() {
                task.abort();
            }
            state.poll_timer()
        };
        debug!(entity = %self.entity_id, ?sustain, "sustain changed");
        self.run(step);
    }

    fn shutdown(&self) {
        let teardown = {
            let mut state = lock(&self.state);
            if !state.active {
                return;
            }
            state.active = false;
            state.cancel_timer();
            std::mem::take(&mut state.teardown)
        };
        teardown.run();
        debug!(watcher = %self.id, entity = %self.entity_id, "watcher unregistered");
    }
}

/// Live registration returned by [`ChangeWatcher::register`].
///
/// Dropping the handle unregisters the watcher.
#[must_use = "dropping a WatchHandle unregisters the watcher"]
pub struct WatchHandle {
    watcher: Arc<ChangeWatcher>,
    _subscription: Subscription,
}

impl WatchHandle {
    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.watcher.id
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.watcher.entity_id
    }

    /// Replace the callback. A pending sustain timer keeps its deadline and
    /// invokes the new callback when it fires.
    pub fn set_callback<F, R>(&self, callback: F)
    where
        F: Fn(&Entity, Option<&Entity>) -> R + Send + Sync + 'static,
        R: Into<Teardown>,
    {
        self.watcher.set_callback(boxed(callback));
    }

    /// Replace the `for` duration.
    ///
    /// A pending timer is re-evaluated against its original anchor: it fires
    /// immediately (on this thread) when the new duration has already
    /// elapsed, otherwise it waits for the new deadline.
    pub fn set_sustain(&self, sustain: Option<Duration>) {
        self.watcher.set_sustain(sustain);
    }

    /// Whether a sustain timer is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.watcher.state).timer.is_armed()
    }

    /// Unregister now: cancels any pending timer and runs the last teardown.
    pub fn unregister(self) {
        drop(self);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watcher.shutdown();
    }
}
