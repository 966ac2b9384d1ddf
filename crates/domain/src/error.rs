//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`TripwireError`] via `#[from]`.

use crate::schedule::ScheduleSpecError;

/// Top-level error for every fallible tripwire operation.
#[derive(Debug, thiserror::Error)]
pub enum TripwireError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("invalid schedule")]
    Schedule(#[from] ScheduleSpecError),

    #[error("entity store error")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("runtime error")]
    Runtime(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations detected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("entity key must not be empty")]
    EmptyEntityKey,

    #[error("dependency path must not be empty")]
    EmptyDependencyPath,

    #[error("dependency path {path:?} contains an empty segment")]
    EmptyPathSegment { path: String },

    #[error("dependency list must not be empty")]
    NoDependencies,
}
