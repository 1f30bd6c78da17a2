//! Trace catalog
//!
//! Ordered in-memory directory of every retained trace, keyed by the
//! trace's data-channel offset. Offsets are assigned by an append-only
//! store, so key order is ingest order and the catalog doubles as the
//! search iteration order (ascending = oldest first).
//!
//! The catalog is snapshotted to disk with bincode on commit and close;
//! a missing or unreadable snapshot is recovered by rescanning the data
//! channel, never reported as a hard error.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::Path;
use tracevault_core::{StoreError, StoreResult, TraceSummary};

/// Ordered map of data-channel offset to trace summary.
#[derive(Default)]
pub struct Catalog {
    entries: RwLock<BTreeMap<u64, TraceSummary>>,
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`Catalog::save`].
    pub fn load(path: &Path) -> StoreResult<Self> {
        let bytes = fs::read(path)?;
        let rows: Vec<TraceSummary> =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Corrupt {
                what: "catalog snapshot",
                detail: e.to_string(),
            })?;
        let catalog = Catalog::new();
        {
            let mut entries = catalog.entries.write();
            for row in rows {
                entries.insert(row.offset(), row);
            }
        }
        Ok(catalog)
    }

    /// Snapshot all entries to `path`, replacing any previous snapshot.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let rows: Vec<TraceSummary> = self.entries.read().values().cloned().collect();
        let bytes = bincode::serialize(&rows).map_err(|e| StoreError::Corrupt {
            what: "catalog snapshot",
            detail: e.to_string(),
        })?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Insert a new summary. Keys must arrive in strictly increasing order;
    /// anything else means the append-only offset contract was broken.
    pub fn insert(&self, summary: TraceSummary) -> StoreResult<()> {
        let mut entries = self.entries.write();
        if let Some((&last, _)) = entries.iter().next_back() {
            if summary.offset() <= last {
                return Err(StoreError::Corrupt {
                    what: "catalog key order",
                    detail: format!(
                        "offset {} not greater than last key {}",
                        summary.offset(),
                        last
                    ),
                });
            }
        }
        entries.insert(summary.offset(), summary);
        Ok(())
    }

    /// Look up a summary by its data-channel offset.
    pub fn get(&self, offset: u64) -> Option<TraceSummary> {
        self.entries.read().get(&offset).cloned()
    }

    /// First key strictly greater than `after`, or the first key overall
    /// when `after` is `None`.
    pub fn successor(&self, after: Option<u64>) -> Option<u64> {
        let entries = self.entries.read();
        match after {
            None => entries.keys().next().copied(),
            Some(k) => entries
                .range((Bound::Excluded(k), Bound::Unbounded))
                .next()
                .map(|(&key, _)| key),
        }
    }

    /// Last key strictly less than `before`, or the last key overall when
    /// `before` is `None`.
    pub fn predecessor(&self, before: Option<u64>) -> Option<u64> {
        let entries = self.entries.read();
        match before {
            None => entries.keys().next_back().copied(),
            Some(k) => entries
                .range(..k)
                .next_back()
                .map(|(&key, _)| key),
        }
    }

    /// Drop every entry with key `<= end`. Returns the smallest
    /// index-channel offset among the removed entries, if any were removed.
    pub fn remove_through(&self, end: u64) -> Option<u64> {
        let mut entries = self.entries.write();
        let keep = entries.split_off(&(end + 1));
        let removed = std::mem::replace(&mut *entries, keep);
        removed
            .values()
            .map(|s| s.index_chunk.offset)
            .min()
    }

    /// Smallest key, if any.
    pub fn first_key(&self) -> Option<u64> {
        self.entries.read().keys().next().copied()
    }

    /// Largest key, if any.
    pub fn last_key(&self) -> Option<u64> {
        self.entries.read().keys().next_back().copied()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no traces are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
