//! Pump — moves snapshots from a [`SnapshotSource`] into the store.

use tracing::{debug, info};
use tripwire_domain::error::TripwireError;

use crate::entity_store::EntityStore;
use crate::ports::SnapshotSource;

/// Feed every snapshot produced by `source` into `store` until the source
/// is exhausted.
///
/// # Errors
///
/// Returns the first error raised by the source or the store.
pub async fn pump<S>(mut source: S, store: &EntityStore) -> Result<(), TripwireError>
where
    S: SnapshotSource + Send,
{
    let mut delivered: u64 = 0;
    while let Some(snapshot) = source.next_snapshot().await? {
        debug!(entities = snapshot.len(), "snapshot received");
        store.set_snapshot(snapshot)?;
        delivered += 1;
    }
    info!(delivered, "snapshot source exhausted");
    Ok(())
}
