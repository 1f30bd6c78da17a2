//! Index and catalog rebuild
//!
//! The data channel is the source of truth: its segment files can always be
//! rescanned record by record to regenerate both the root-only index channel
//! and the catalog. Corruption is isolated per segment; a record that fails
//! to decode drops the remainder of its segment and the scan continues with
//! the next one.

use crate::catalog::Catalog;
use crate::channel::TraceChannel;
use std::fs;
use std::path::Path;
use tracevault_core::{ChunkRef, StoreResult, TraceSummary};
use tracevault_storage::{decode_stream, list_segment_files};
use tracing::{info, warn};

/// Outcome of a rebuild scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Traces recovered into the index and catalog.
    pub imported: u64,
    /// Segment tails dropped because a record failed to decode.
    pub dropped: u64,
}

impl RebuildStats {
    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "rebuild complete: {} traces imported, {} corrupt units dropped",
            self.imported, self.dropped
        )
    }
}

/// Rescan the raw data segments under `data_dir`, repopulating `index` and
/// `catalog`. Both must be freshly reset; recovered entries keep their
/// original data offsets (segment base plus in-segment position), so catalog
/// key order follows segment order.
pub fn rebuild(data_dir: &Path, index: &TraceChannel, catalog: &Catalog) -> StoreResult<RebuildStats> {
    let mut stats = RebuildStats::default();

    for (base, path) in list_segment_files(data_dir)? {
        let buf = fs::read(&path)?;
        let mut pos = 0usize;
        loop {
            match decode_stream(&buf, pos) {
                Ok(Some((rec, consumed))) => {
                    let data_chunk = ChunkRef::new(base + pos as u64, consumed as u32);
                    let index_chunk = index.write(&rec)?;
                    catalog.insert(TraceSummary::from_record(&rec, data_chunk, index_chunk))?;
                    stats.imported += 1;
                    pos += consumed;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        segment = %path.display(),
                        at = pos,
                        error = %e,
                        "corrupt record, dropping rest of segment"
                    );
                    stats.dropped += 1;
                    break;
                }
            }
        }
    }

    info!(imported = stats.imported, dropped = stats.dropped, "{}", stats.summary());
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRole;
    use tempfile::TempDir;
    use tracevault_core::record::TraceMarker;
    use tracevault_core::TraceRecord;

    fn trace(trace_id: u32, time: u64) -> TraceRecord {
        TraceRecord {
            class_id: 1,
            method_id: 2,
            signature_id: 3,
            time,
            calls: 1,
            marker: Some(TraceMarker {
                trace_id,
                clock: 1_000,
                flags: 0,
            }),
            children: vec![TraceRecord {
                class_id: 4,
                method_id: 5,
                time: time / 2,
                calls: 1,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_rebuild_recovers_original_offsets() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("tdat");
        let data =
            TraceChannel::open(&data_dir, ChannelRole::Data, 1 << 30, 1 << 20).unwrap();

        let mut offsets = Vec::new();
        for i in 0..3 {
            offsets.push(data.write(&trace(7, 100 + i)).unwrap().offset);
        }
        data.flush().unwrap();

        let index =
            TraceChannel::open(&dir.path().join("tidx"), ChannelRole::Index, 1 << 30, 1 << 20)
                .unwrap();
        let catalog = Catalog::new();
        let stats = rebuild(&data_dir, &index, &catalog).unwrap();

        assert_eq!(stats, RebuildStats { imported: 3, dropped: 0 });
        assert_eq!(catalog.len(), 3);
        for off in offsets {
            let s = catalog.get(off).unwrap();
            assert_eq!(s.trace_id, 7);
            // Rebuilt index entries resolve to root-only trees.
            let root = index.read(s.index_chunk).unwrap().unwrap();
            assert!(root.children.is_empty());
        }
    }

    #[test]
    fn test_rebuild_isolates_corrupt_segment_tail() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("tdat");
        // Tiny file size: one record per segment.
        let data = TraceChannel::open(&data_dir, ChannelRole::Data, 1 << 30, 64).unwrap();
        for i in 0..3 {
            data.write(&trace(7, 100 + i)).unwrap();
        }
        data.flush().unwrap();

        // Garbage appended to the first segment corrupts its tail only.
        let (first_base, first_path) = list_segment_files(&data_dir).unwrap().remove(0);
        assert_eq!(first_base, 0);
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&first_path)
                .unwrap();
            f.write_all(&[0xde, 0xad, 0xbe]).unwrap();
        }

        let index =
            TraceChannel::open(&dir.path().join("tidx"), ChannelRole::Index, 1 << 30, 1 << 20)
                .unwrap();
        let catalog = Catalog::new();
        let stats = rebuild(&data_dir, &index, &catalog).unwrap();

        // First segment's record still imports; the garbage tail drops as
        // one unit; the remaining segments import cleanly.
        assert_eq!(stats.imported, 3);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_rebuild_empty_store() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("tdat");
        std::fs::create_dir_all(&data_dir).unwrap();

        let index =
            TraceChannel::open(&dir.path().join("tidx"), ChannelRole::Index, 1 << 30, 1 << 20)
                .unwrap();
        let catalog = Catalog::new();
        let stats = rebuild(&data_dir, &index, &catalog).unwrap();
        assert_eq!(stats, RebuildStats::default());
        assert!(catalog.is_empty());
    }
}
