//! Watch options — the filters that qualify an entity transition.

use std::time::Duration;

use crate::dependency::DependencyPath;
use crate::entity::Entity;
use crate::error::{TripwireError, ValidationError};

/// Options for a change-watcher registration.
///
/// `from`, `to`, `deps` and `call_on_startup` are fixed for the lifetime of
/// the registration; `sustain` (the `for` duration) is only the initial
/// value and can be replaced on the live handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Only fire when the previous state equals this value.
    pub from: Option<String>,
    /// Only fire when the new state equals this value.
    pub to: Option<String>,
    /// Minimum time the qualifying condition must hold before firing.
    pub sustain: Option<Duration>,
    /// Fire on the first qualifying update instead of treating it as a baseline.
    pub call_on_startup: bool,
    /// Paths that decide whether an update is a meaningful change.
    pub deps: Vec<DependencyPath>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            sustain: None,
            call_on_startup: false,
            deps: vec![DependencyPath::state()],
        }
    }
}

impl WatchOptions {
    #[must_use]
    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    #[must_use]
    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    /// Set the `for` duration.
    #[must_use]
    pub fn sustain(mut self, duration: Duration) -> Self {
        self.sustain = Some(duration);
        self
    }

    #[must_use]
    pub fn call_on_startup(mut self, enabled: bool) -> Self {
        self.call_on_startup = enabled;
        self
    }

    #[must_use]
    pub fn deps(mut self, deps: Vec<DependencyPath>) -> Self {
        self.deps = deps;
        self
    }

    /// Check invariants.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Validation`] when `deps` is empty.
    pub fn validate(&self) -> Result<(), TripwireError> {
        if self.deps.is_empty() {
            return Err(ValidationError::NoDependencies.into());
        }
        Ok(())
    }

    /// Whether the `from` filter admits this previous record.
    ///
    /// A missing previous record never satisfies a `from` filter.
    #[must_use]
    pub fn from_matches(&self, previous: Option<&Entity>) -> bool {
        match &self.from {
            None => true,
            Some(expected) => previous.is_some_and(|p| &p.state == expected),
        }
    }

    /// Whether the `to` filter admits this new record.
    #[must_use]
    pub fn to_matches(&self, entity: &Entity) -> bool {
        self.to.as_ref().is_none_or(|expected| &entity.state == expected)
    }
}

/// `Some(d)` only for a non-zero duration; zero means "fire immediately".
#[must_use]
pub fn effective_sustain(sustain: Option<Duration>) -> Option<Duration> {
    sustain.filter(|d| !d.is_zero())
}
