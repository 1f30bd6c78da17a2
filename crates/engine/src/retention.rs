//! Retention cascade
//!
//! Trimming a data-channel segment invalidates every catalog entry whose
//! tree lived in it, and with those entries gone the index-channel bytes
//! backing them are garbage too. The [`RetentionCoordinator`] listens on the
//! data store and propagates each trim: catalog entries keyed at or below
//! the trimmed range are dropped, then the index store is cleaned up to just
//! below the surviving entry with the smallest index offset.
//!
//! Segment starts propagate too, keeping index segment boundaries aligned
//! with data segment boundaries so an index cleanup can always make
//! progress. Each forced rotation runs a size-budget pass on the index:
//! forced rotations keep the index tail well below its file size, so the
//! index store's own write path would never reclaim anything on its own.

use crate::catalog::Catalog;
use parking_lot::Mutex;
use std::sync::Arc;
use tracevault_storage::{RdsListener, RotatingStore};
use tracing::{debug, error};

/// Propagates data-channel trims and rotations to the catalog and the index
/// channel.
pub struct RetentionCoordinator {
    catalog: Arc<Catalog>,
    index: Arc<Mutex<RotatingStore>>,
}

impl RetentionCoordinator {
    /// Create a coordinator over one host's catalog and index store.
    pub fn new(catalog: Arc<Catalog>, index: Arc<Mutex<RotatingStore>>) -> Self {
        Self { catalog, index }
    }
}

impl RdsListener for RetentionCoordinator {
    fn on_chunk_removed(&self, start: u64, length: u64) {
        let end = start + length - 1;

        // Boundary must be computed before the catalog is cleared: it is the
        // index offset of the first entry that survives, minus one. With no
        // survivor the index is left alone; its bytes fall to a later pass.
        let boundary = self
            .catalog
            .successor(Some(end))
            .and_then(|key| self.catalog.get(key))
            .map(|s| s.index_chunk.offset.saturating_sub(1));

        let removed_min = self.catalog.remove_through(end);
        debug!(
            start,
            length,
            ?boundary,
            ?removed_min,
            "data segment trimmed, catalog cleared"
        );

        if boundary.is_some() {
            if let Err(e) = self.index.lock().cleanup(boundary) {
                error!(error = %e, "index cleanup after data trim failed");
            }
        }
    }

    fn on_segment_started(&self, start: u64) {
        debug!(start, "data segment started, rotating index");
        let mut index = self.index.lock();
        if let Err(e) = index.rotate() {
            error!(error = %e, "index rotation failed");
            return;
        }
        if let Err(e) = index.cleanup(None) {
            error!(error = %e, "index cleanup after rotation failed");
        }
    }
}
