//! # tripwired — tripwire daemon
//!
//! Composition root that wires the engine, its adapters and the configured
//! triggers together.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Build the entity store, scheduler and event bus
//! - Register configured watchers, schedules and dynamic schedules whose
//!   actions publish [`Event`](tripwire_domain::event::Event)s
//! - Start the snapshot source (the virtual feed)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no trigger logic belongs here.

pub mod config;
pub mod daemon;
