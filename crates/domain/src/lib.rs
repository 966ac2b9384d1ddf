//! # tripwire-domain
//!
//! Pure domain model for the tripwire automation-trigger engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Entities** (immutable value records: key, state, attributes)
//! - Define **Snapshots** (the full set of entities at one point in time)
//! - Define **Dependency paths** and the dependency-aware change predicate
//! - Define **Watch options** (`from`, `to`, `for`, startup and deps)
//! - Define **Schedule specs** (clock time, weekly, absolute, cron) and the
//!   next-occurrence arithmetic
//! - Define **Events** (records of fired triggers)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or runtime crates.
//! All runtime boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod dependency;
pub mod entity;
pub mod event;
pub mod schedule;
pub mod snapshot;
pub mod watch;
