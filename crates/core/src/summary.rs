//! Catalog entry types
//!
//! A [`TraceSummary`] is the denormalized catalog row created for every
//! ingested trace root. It references the full tree in the data channel and
//! the root-only projection in the index channel, and carries enough counters
//! to answer cheap search filters without touching either channel.

use crate::record::TraceRecord;
use crate::symbols::SymbolId;
use serde::{Deserialize, Serialize};

/// A byte range inside one channel's logical address space.
///
/// Never reused once written; becomes dangling only after retention trims
/// the owning segment, which readers observe as a `None` read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Logical offset of the first byte.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub length: u32,
}

impl ChunkRef {
    /// Create a chunk reference.
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }

    /// Logical offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

/// Compact per-trace summary, keyed by the data-channel offset at ingest.
///
/// Created at ingest, never mutated, removed only by retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Full tree location in the data channel.
    pub data_chunk: ChunkRef,
    /// Root-only projection location in the index channel.
    pub index_chunk: ChunkRef,
    /// Trace type symbol.
    pub trace_id: SymbolId,
    /// Record-level flags of the root (`RF_*`).
    pub record_flags: u32,
    /// Trace-level flags from the marker (`TF_*`).
    pub trace_flags: u32,
    /// Number of records in the stored tree.
    pub record_count: u32,
    /// Total instrumented calls.
    pub calls: u64,
    /// Total errors.
    pub errors: u64,
    /// Root execution time, nanoseconds.
    pub duration: u64,
    /// Wall-clock trace start, epoch milliseconds.
    pub clock: i64,
}

impl TraceSummary {
    /// Build a summary from an ingested root record and its chunk refs.
    pub fn from_record(rec: &TraceRecord, data_chunk: ChunkRef, index_chunk: ChunkRef) -> Self {
        Self {
            data_chunk,
            index_chunk,
            trace_id: rec.trace_id(),
            record_flags: rec.flags,
            trace_flags: rec.marker.map(|m| m.flags).unwrap_or(0),
            record_count: rec.record_count(),
            calls: rec.calls,
            errors: rec.errors,
            duration: rec.time,
            clock: rec.marker.map(|m| m.clock).unwrap_or(0),
        }
    }

    /// Catalog key: the data-channel offset.
    pub fn offset(&self) -> u64 {
        self.data_chunk.offset
    }

    /// Stored byte length of the full tree.
    pub fn data_len(&self) -> u32 {
        self.data_chunk.length
    }

    /// Whether the trace carries the error mark.
    pub fn has_error(&self) -> bool {
        self.trace_flags & crate::record::TF_ERROR_MARK != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TraceMarker, TF_ERROR_MARK};

    #[test]
    fn test_from_record() {
        let rec = TraceRecord {
            class_id: 1,
            method_id: 2,
            signature_id: 3,
            time: 500,
            calls: 7,
            errors: 1,
            marker: Some(TraceMarker {
                trace_id: 11,
                clock: 1234,
                flags: TF_ERROR_MARK,
            }),
            ..Default::default()
        };
        let s = TraceSummary::from_record(&rec, ChunkRef::new(100, 64), ChunkRef::new(10, 16));
        assert_eq!(s.offset(), 100);
        assert_eq!(s.data_len(), 64);
        assert_eq!(s.trace_id, 11);
        assert_eq!(s.duration, 500);
        assert_eq!(s.clock, 1234);
        assert!(s.has_error());
    }

    #[test]
    fn test_chunk_ref_end() {
        assert_eq!(ChunkRef::new(100, 28).end(), 128);
    }
}
