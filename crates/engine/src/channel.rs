//! Trace channels
//!
//! A [`TraceChannel`] binds the record codec to one rotating store in one of
//! two roles: `Data` stores the full tree of every ingested trace, `Index`
//! stores a root-only projection used for cheap shallow matching during
//! search. Both channels of a host live in sibling directories and their
//! segment boundaries are kept aligned by the retention coordinator.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracevault_core::search_types::{MethodStats, RankBy, SearchDirection};
use tracevault_core::symbols::render_method;
use tracevault_core::{ChunkRef, StoreError, StoreResult, SymbolRegistry, TraceRecord};
use tracevault_storage::{decode, encode, EncodeMode, RotatingStore};

/// Which projection of a trace this channel stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Full trees.
    Data,
    /// Root-only projections.
    Index,
}

impl ChannelRole {
    fn encode_mode(self) -> EncodeMode {
        match self {
            ChannelRole::Data => EncodeMode::Full,
            ChannelRole::Index => EncodeMode::RootOnly,
        }
    }
}

/// A record codec bound to one rotating store.
pub struct TraceChannel {
    role: ChannelRole,
    rds: Arc<Mutex<RotatingStore>>,
}

impl TraceChannel {
    /// Open the channel's store under `dir`.
    pub fn open(dir: &Path, role: ChannelRole, max_size: u64, file_size: u64) -> StoreResult<Self> {
        let rds = RotatingStore::open(dir, max_size, file_size)?;
        Ok(Self {
            role,
            rds: Arc::new(Mutex::new(rds)),
        })
    }

    /// This channel's role.
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Shared handle to the underlying store (listener registration,
    /// retention cascades).
    pub fn store(&self) -> Arc<Mutex<RotatingStore>> {
        Arc::clone(&self.rds)
    }

    /// Serialize `rec` (per the channel role) and append it.
    pub fn write(&self, rec: &TraceRecord) -> StoreResult<ChunkRef> {
        let bytes = encode(rec, self.role.encode_mode());
        let offset = self.rds.lock().write(&bytes)?;
        Ok(ChunkRef::new(offset, bytes.len() as u32))
    }

    /// Read a tree back, or `None` if the chunk was trimmed by retention.
    pub fn read(&self, chunk: ChunkRef) -> StoreResult<Option<TraceRecord>> {
        let bytes = self.rds.lock().read(chunk.offset, chunk.length)?;
        match bytes {
            Some(buf) if buf.len() >= chunk.length as usize => Ok(Some(decode(&buf)?)),
            // A short read means the range straddles the trim boundary.
            _ => Ok(None),
        }
    }

    /// Read the subtree at a `/`-separated child-index path, pruning
    /// subtrees shorter than `min_method_time` (0 keeps everything).
    ///
    /// Fails with `NotFound` if the chunk was evicted and `PathNotFound` if
    /// the path walks off the tree.
    pub fn read_subtree(
        &self,
        chunk: ChunkRef,
        path: &str,
        min_method_time: u64,
    ) -> StoreResult<TraceRecord> {
        let tree = self
            .read(chunk)?
            .ok_or(StoreError::NotFound(chunk.offset))?;

        let mut node = &tree;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let idx: usize = part.parse().map_err(|_| StoreError::PathNotFound {
                path: path.to_string(),
            })?;
            node = node.child(idx).ok_or_else(|| StoreError::PathNotFound {
                path: path.to_string(),
            })?;
        }

        if min_method_time > 0 {
            Ok(node.pruned(min_method_time))
        } else {
            Ok(node.clone())
        }
    }

    /// Build the per-method timing histogram of the tree at `chunk`.
    ///
    /// One walk accumulates calls, errors, total and bare time per
    /// (class, method, signature); bare time subtracts each child's time as
    /// the walk returns from recursion.
    pub fn method_histogram(
        &self,
        chunk: ChunkRef,
        rank_by: RankBy,
        direction: SearchDirection,
        symbols: &dyn SymbolRegistry,
    ) -> StoreResult<Vec<MethodStats>> {
        let tree = self
            .read(chunk)?
            .ok_or(StoreError::NotFound(chunk.offset))?;

        let mut histogram: std::collections::HashMap<(u32, u32, u32), MethodStats> =
            std::collections::HashMap::new();
        accumulate(&mut histogram, &tree, symbols);

        let mut stats: Vec<MethodStats> = histogram.into_values().collect();
        stats.sort_by(|a, b| {
            let key = |s: &MethodStats| match rank_by {
                RankBy::Calls => s.calls,
                RankBy::Errors => s.errors,
                RankBy::Time => s.time,
                RankBy::AvgTime => s.avg_time(),
            };
            let ord = key(a).cmp(&key(b));
            match direction {
                SearchDirection::Ascending => ord,
                SearchDirection::Descending => ord.reverse(),
            }
        });
        Ok(stats)
    }

    /// Force a new tail segment (index-channel boundary alignment).
    pub fn rotate(&self) -> StoreResult<()> {
        self.rds.lock().rotate()
    }

    /// Run a retention pass on the underlying store.
    pub fn cleanup(&self, boundary: Option<u64>) -> StoreResult<()> {
        self.rds.lock().cleanup(boundary)
    }

    /// Adjust the underlying store's byte budget.
    pub fn set_max_size(&self, max_size: u64) {
        self.rds.lock().set_max_size(max_size);
    }

    /// Flush the underlying store.
    pub fn flush(&self) -> StoreResult<()> {
        self.rds.lock().flush()
    }
}

fn accumulate(
    histogram: &mut std::collections::HashMap<(u32, u32, u32), MethodStats>,
    rec: &TraceRecord,
    symbols: &dyn SymbolRegistry,
) {
    let key = (rec.class_id, rec.method_id, rec.signature_id);
    let entry = histogram.entry(key).or_insert_with(|| MethodStats {
        class_id: rec.class_id,
        method_id: rec.method_id,
        signature_id: rec.signature_id,
        method: render_method(symbols, rec.class_id, rec.method_id, rec.signature_id),
        calls: 0,
        errors: 0,
        time: 0,
        bare_time: 0,
        min_time: u64::MAX,
        max_time: 0,
    });
    entry.calls += 1;
    if rec.exception.is_some()
        || rec.has_flag(tracevault_core::record::RF_EXCEPTION_PASS)
        || rec.has_flag(tracevault_core::record::RF_EXCEPTION_WRAP)
    {
        entry.errors += 1;
    }
    entry.time += rec.time;
    entry.min_time = entry.min_time.min(rec.time);
    entry.max_time = entry.max_time.max(rec.time);

    let mut bare = rec.time;
    for child in &rec.children {
        accumulate(histogram, child, symbols);
        bare = bare.saturating_sub(child.time);
    }
    // Re-borrow: children may have touched the same bucket.
    if let Some(entry) = histogram.get_mut(&key) {
        entry.bare_time += bare;
    }
}
