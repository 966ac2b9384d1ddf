//! Snapshot source port — the transport side of the entity store.

use std::future::Future;

use tripwire_domain::error::TripwireError;
use tripwire_domain::snapshot::Snapshot;

/// Produces full entity snapshots, one per transport update.
///
/// Implemented by adapters (a vendor websocket client, the virtual feed).
pub trait SnapshotSource {
    /// Wait for the next snapshot.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    fn next_snapshot(
        &mut self,
    ) -> impl Future<Output = Result<Option<Snapshot>, TripwireError>> + Send;
}
