//! # tripwire-app
//!
//! Application layer — the trigger engine and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `Clock` — wall-clock time source for schedule arithmetic
//!   - `SnapshotSource` — produces entity snapshots from a transport
//! - Hold the latest snapshot and fan updates out (`EntityStore`)
//! - Evaluate reactive triggers (`ChangeWatcher`) and their sustain timers
//! - Run time-based triggers (`Scheduler`, `ScheduleSlot`, `DynamicSchedule`)
//! - Provide **in-process infrastructure** (event bus, clocks) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `tripwire-domain` only (plus `tokio` for timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod change_watcher;
pub mod clock;
pub mod dynamic_schedule;
pub mod entity_store;
pub mod event_bus;
pub mod ports;
pub mod pump;
pub mod scheduler;
pub mod sustain;

/// Lock a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
