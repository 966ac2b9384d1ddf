//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the trigger engine and the outside world.
//! They are defined here (in `app`) so that both the engine and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod clock;
pub mod snapshot_source;

pub use clock::Clock;
pub use snapshot_source::SnapshotSource;
