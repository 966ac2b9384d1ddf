//! Scheduler — time-based triggers.
//!
//! Every schedule runs as one tokio task that sleeps until the next
//! occurrence, fires, then recomputes the following occurrence from the
//! wall clock (never from the previous deadline).

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tripwire_domain::error::TripwireError;
use tripwire_domain::id::ScheduleId;
use tripwire_domain::schedule::{ScheduleSpec, Zone};
use tripwire_domain::time::{Timestamp, non_negative};

use crate::ports::Clock;

/// Shared schedule action, called with the occurrence it fires for.
pub type Action = Arc<dyn Fn(Timestamp) + Send + Sync>;

/// Creates schedules on a fixed clock, zone and runtime.
#[derive(Clone)]
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    zone: Zone,
    runtime: Handle,
}

impl Scheduler {
    /// Create a scheduler running its timers on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Runtime`] when called outside a tokio runtime.
    pub fn new(clock: Arc<dyn Clock>, zone: Zone) -> Result<Self, TripwireError> {
        let runtime = Handle::try_current().map_err(|err| TripwireError::Runtime(Box::new(err)))?;
        Ok(Self::with_runtime(clock, zone, runtime))
    }

    #[must_use]
    pub fn with_runtime(clock: Arc<dyn Clock>, zone: Zone, runtime: Handle) -> Self {
        Self {
            clock,
            zone,
            runtime,
        }
    }

    #[must_use]
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Parse `spec` and schedule `action`, which receives the occurrence it
    /// fires for.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Schedule`] when `spec` is malformed.
    pub fn schedule<F>(&self, spec: &str, action: F) -> Result<ScheduleHandle, TripwireError>
    where
        F: Fn(Timestamp) + Send + Sync + 'static,
    {
        let spec = ScheduleSpec::parse(spec)?;
        Ok(self.schedule_spec(spec, Arc::new(action)))
    }

    /// Schedule an already parsed spec.
    ///
    /// The first occurrence is computed now, at registration. An absolute
    /// time in the past yields a handle whose task ends without firing.
    pub fn schedule_spec(&self, spec: ScheduleSpec, action: Action) -> ScheduleHandle {
        let id = ScheduleId::new();
        let first = spec.next_after(self.clock.now(), self.zone);
        match first {
            Some(at) => debug!(schedule = %id, %spec, next = %at, "schedule armed"),
            None => debug!(schedule = %id, %spec, "no upcoming occurrence, ignoring"),
        }
        let task = self.runtime.spawn(run(
            id,
            spec,
            first,
            Arc::clone(&self.clock),
            self.zone,
            action,
        ));
        ScheduleHandle { id, task }
    }
}

async fn run(
    id: ScheduleId,
    spec: ScheduleSpec,
    first: Option<Timestamp>,
    clock: Arc<dyn Clock>,
    zone: Zone,
    action: Action,
) {
    let mut next = first;
    while let Some(at) = next {
        sleep_until(clock.as_ref(), at).await;
        debug!(schedule = %id, at = %at, "schedule firing");
        action(at);
        if !spec.is_recurring() {
            break;
        }
        next = spec.next_after(clock.now(), zone);
        if let Some(following) = next {
            debug!(schedule = %id, next = %following, "schedule re-armed");
        }
    }
    info!(schedule = %id, "schedule finished");
}

/// Sleep until the clock reads at least `target`.
async fn sleep_until(clock: &dyn Clock, target: Timestamp) {
    loop {
        let now = clock.now();
        if now >= target {
            return;
        }
        tokio::time::sleep(non_negative(target - now)).await;
    }
}

/// A live schedule. Dropping it cancels the schedule.
#[must_use = "dropping a ScheduleHandle cancels the schedule"]
#[derive(Debug)]
pub struct ScheduleHandle {
    id: ScheduleId,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    #[must_use]
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    /// Whether the schedule has run out of occurrences (or was cancelled).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the pending wakeup. A fire already in progress completes.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Holds zero or one live schedule and reconciles it against a spec string.
pub struct ScheduleSlot {
    name: String,
    scheduler: Scheduler,
    action: Action,
    current: Option<(String, ScheduleHandle)>,
}

impl ScheduleSlot {
    /// An empty slot; nothing is scheduled until [`set_spec`](Self::set_spec).
    pub fn new<F>(scheduler: Scheduler, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Timestamp) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scheduler,
            action: Arc::new(action),
            current: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The spec string currently scheduled, if any.
    #[must_use]
    pub fn spec(&self) -> Option<&str> {
        self.current.as_ref().map(|(spec, _)| spec.as_str())
    }

    /// Reconcile with `spec`.
    ///
    /// The same spec as the live one is a no-op; a different one cancels the
    /// live schedule and creates a new one; `None` only cancels. Returns
    /// whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Schedule`] when `spec` is malformed. The slot
    /// is left empty in that case.
    pub fn set_spec(&mut self, spec: Option<&str>) -> Result<bool, TripwireError> {
        let spec = spec.map(str::trim).filter(|s| !s.is_empty());
        if spec == self.spec() {
            return Ok(false);
        }
        if let Some((old, handle)) = self.current.take() {
            debug!(slot = %self.name, spec = %old, "schedule cancelled");
            handle.cancel();
        }
        let Some(spec) = spec else {
            return Ok(true);
        };
        let parsed = ScheduleSpec::parse(spec)?;
        let handle = self
            .scheduler
            .schedule_spec(parsed, Arc::clone(&self.action));
        info!(slot = %self.name, spec, "schedule set");
        self.current = Some((spec.to_string(), handle));
        Ok(true)
    }
}

impl std::fmt::Debug for ScheduleSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleSlot")
            .field("name", &self.name)
            .field("spec", &self.spec())
            .finish_non_exhaustive()
    }
}
