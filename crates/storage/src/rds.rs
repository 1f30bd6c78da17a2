//! Rotating segmented store (RDS)
//!
//! One RDS manages a sequence of segment files under a single logical
//! address space. New bytes are appended to the tail segment; when the tail
//! would exceed the configured file size a new segment starts. Retention
//! discards whole segments from the oldest end until the store fits its
//! byte budget, and notifies listeners of the trimmed range so higher
//! layers can drop the catalog rows that referenced it.
//!
//! Reads past the trimmed boundary return `None`, never an error: callers
//! treat `None` as "data evicted" and filter the entry from results.

use crate::segment::{list_segment_files, SegmentFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracevault_core::{StoreError, StoreResult};
use tracing::{debug, warn};

/// Observer of store-level retention events.
///
/// Callbacks run synchronously on the thread that triggered the rotation or
/// trim (normally the ingesting thread).
pub trait RdsListener: Send + Sync {
    /// `length` bytes starting at logical `start` were discarded.
    fn on_chunk_removed(&self, start: u64, length: u64) {
        let _ = (start, length);
    }

    /// A new tail segment started at logical offset `start`.
    fn on_segment_started(&self, start: u64) {
        let _ = start;
    }
}

/// Append-only store over rotating segment files.
pub struct RotatingStore {
    dir: PathBuf,
    max_size: u64,
    file_size: u64,
    /// Closed segments ordered by base offset; `(base, len, path)`.
    closed: Vec<(u64, u64, PathBuf)>,
    active: SegmentFile,
    listeners: Vec<Arc<dyn RdsListener>>,
}

impl RotatingStore {
    /// Open (or create) a store in `dir`.
    ///
    /// Existing segment files are adopted in base-offset order; the newest
    /// becomes the active tail if it still has room, otherwise a fresh tail
    /// starts at the resumed logical position.
    pub fn open(dir: &Path, max_size: u64, file_size: u64) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        let mut files = list_segment_files(dir)?;

        let active = match files.pop() {
            Some((base, path)) => {
                let seg = SegmentFile::open(&path, base)?;
                if seg.len() < file_size {
                    seg
                } else {
                    let next = seg.end();
                    files.push((base, path));
                    SegmentFile::create(dir, next)?
                }
            }
            None => SegmentFile::create(dir, 0)?,
        };

        let mut closed = Vec::with_capacity(files.len());
        for (base, path) in files {
            let len = std::fs::metadata(&path)?.len();
            closed.push((base, len, path));
        }
        debug!(
            dir = %dir.display(),
            segments = closed.len() + 1,
            logical_pos = active.end(),
            "opened rotating store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            max_size,
            file_size,
            closed,
            active,
            listeners: Vec::new(),
        })
    }

    /// Register a retention listener.
    pub fn add_listener(&mut self, listener: Arc<dyn RdsListener>) {
        self.listeners.push(listener);
    }

    /// Total logical bytes ever written (the next write offset).
    pub fn size(&self) -> u64 {
        self.active.end()
    }

    /// Oldest logical offset still readable.
    pub fn first_retained(&self) -> u64 {
        self.closed
            .first()
            .map(|(base, _, _)| *base)
            .unwrap_or_else(|| self.active.base())
    }

    /// Bytes currently held on disk across all segments.
    pub fn retained_bytes(&self) -> u64 {
        self.closed.iter().map(|(_, len, _)| *len).sum::<u64>() + self.active.len()
    }

    /// Number of segments, counting the active tail.
    pub fn segment_count(&self) -> usize {
        self.closed.len() + 1
    }

    /// Adjust the retention budget; takes effect on the next cleanup pass.
    pub fn set_max_size(&mut self, max_size: u64) {
        self.max_size = max_size;
    }

    /// Append `data`, returning the logical offset where it begins.
    ///
    /// Rotates first if the tail would exceed the configured file size, and
    /// runs a cleanup pass after each rotation.
    pub fn write(&mut self, data: &[u8]) -> StoreResult<u64> {
        if data.is_empty() {
            return Err(StoreError::Corrupt {
                what: "rds",
                detail: "attempted to write an empty record".to_string(),
            });
        }
        if !self.active.is_empty() && self.active.len() + data.len() as u64 > self.file_size {
            self.rotate()?;
            self.cleanup(None)?;
        }
        self.active.append(data)
    }

    /// Read `length` bytes at logical `offset`.
    ///
    /// Returns `None` if the range was trimmed by retention or lies past the
    /// end of the store. The result is clamped at the covering segment's
    /// boundary; records never span segments.
    pub fn read(&mut self, offset: u64, length: u32) -> StoreResult<Option<Vec<u8>>> {
        if offset < self.first_retained() || offset >= self.size() {
            return Ok(None);
        }

        if offset >= self.active.base() {
            return Ok(Some(self.active.read(offset, length as usize)?));
        }

        let idx = match self
            .closed
            .binary_search_by(|(base, _, _)| base.cmp(&offset))
        {
            Ok(i) => i,
            Err(0) => return Ok(None),
            Err(i) => i - 1,
        };
        let (base, _, path) = &self.closed[idx];
        let mut seg = SegmentFile::open(path, *base)?;
        Ok(Some(seg.read(offset, length as usize)?))
    }

    /// Force a new tail segment even if the current one is not full.
    ///
    /// Used to keep the index channel's segment boundaries aligned with the
    /// data channel's. A no-op when the tail is still empty.
    pub fn rotate(&mut self) -> StoreResult<()> {
        if self.active.is_empty() {
            return Ok(());
        }
        self.active.flush()?;
        let next_base = self.active.end();
        let finished = std::mem::replace(&mut self.active, SegmentFile::create(&self.dir, next_base)?);
        self.closed.push((
            finished.base(),
            finished.len(),
            finished.path().to_path_buf(),
        ));
        for listener in &self.listeners {
            listener.on_segment_started(next_base);
        }
        Ok(())
    }

    /// Evaluate retention and discard the oldest whole segments.
    ///
    /// With a `boundary`, every closed segment lying entirely at or below
    /// the boundary offset is discarded first (retention cascade); the size
    /// budget is then enforced on every pass. Listeners are notified per
    /// removed segment. Never splits a segment, never touches the tail.
    pub fn cleanup(&mut self, boundary: Option<u64>) -> StoreResult<()> {
        let mut removed: Vec<(u64, u64)> = Vec::new();

        if let Some(boundary) = boundary {
            while let Some((base, len, _)) = self.closed.first() {
                if base + len - 1 > boundary {
                    break;
                }
                removed.push((*base, *len));
                self.unlink_first()?;
            }
        }

        while self.retained_bytes() > self.max_size && !self.closed.is_empty() {
            let (base, len, _) = self.closed[0];
            removed.push((base, len));
            self.unlink_first()?;
        }

        for (start, length) in removed {
            debug!(start, length, "trimmed segment");
            for listener in &self.listeners {
                listener.on_chunk_removed(start, length);
            }
        }
        Ok(())
    }

    /// Flush the tail segment to the OS.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.active.flush()
    }

    fn unlink_first(&mut self) -> StoreResult<()> {
        let (_, _, path) = self.closed.remove(0);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "cannot unlink trimmed segment");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        removed: Mutex<Vec<(u64, u64)>>,
        started: Mutex<Vec<u64>>,
    }

    impl RdsListener for Recorder {
        fn on_chunk_removed(&self, start: u64, length: u64) {
            self.removed.lock().push((start, length));
        }
        fn on_segment_started(&self, start: u64) {
            self.started.lock().push(start);
        }
    }

    fn open(dir: &Path, max_size: u64, file_size: u64) -> RotatingStore {
        RotatingStore::open(dir, max_size, file_size).unwrap()
    }

    #[test]
    fn test_write_returns_monotone_offsets() {
        let dir = TempDir::new().unwrap();
        let mut rds = open(dir.path(), 1 << 20, 1 << 16);
        let a = rds.write(b"aaaa").unwrap();
        let b = rds.write(b"bb").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 4);
        assert_eq!(rds.size(), 6);
        assert_eq!(rds.read(0, 4).unwrap().unwrap(), b"aaaa");
        assert_eq!(rds.read(4, 2).unwrap().unwrap(), b"bb");
    }

    #[test]
    fn test_rotation_at_file_size() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut rds = open(dir.path(), 1 << 20, 10);
        rds.add_listener(recorder.clone());

        rds.write(b"01234567").unwrap(); // fits
        rds.write(b"89abcdef").unwrap(); // would exceed -> rotates first
        assert_eq!(rds.segment_count(), 2);
        assert_eq!(recorder.started.lock().as_slice(), &[8]);
        // Both segments readable.
        assert_eq!(rds.read(0, 8).unwrap().unwrap(), b"01234567");
        assert_eq!(rds.read(8, 8).unwrap().unwrap(), b"89abcdef");
    }

    #[test]
    fn test_cleanup_enforces_budget_and_notifies() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut rds = open(dir.path(), 20, 8);
        rds.add_listener(recorder.clone());

        for chunk in [&b"aaaaaaaa"[..], b"bbbbbbbb", b"cccccccc", b"dddddddd"] {
            rds.write(chunk).unwrap();
        }
        // 4 segments of 8 bytes against a 20-byte budget: oldest trimmed.
        assert!(rds.retained_bytes() <= 24);
        let removed = recorder.removed.lock().clone();
        assert!(!removed.is_empty());
        assert_eq!(removed[0], (0, 8));
        assert_eq!(rds.read(0, 8).unwrap(), None);
        assert_eq!(rds.read(24, 8).unwrap().unwrap(), b"dddddddd");
    }

    #[test]
    fn test_boundary_cleanup() {
        let dir = TempDir::new().unwrap();
        let mut rds = open(dir.path(), 1 << 20, 8);
        for chunk in [&b"aaaaaaaa"[..], b"bbbbbbbb", b"cccccccc"] {
            rds.write(chunk).unwrap();
        }
        assert_eq!(rds.segment_count(), 3);
        // Boundary mid-segment: only segments entirely below it go.
        rds.cleanup(Some(11)).unwrap();
        assert_eq!(rds.first_retained(), 8);
        rds.cleanup(Some(15)).unwrap();
        assert_eq!(rds.first_retained(), 16);
    }

    #[test]
    fn test_reopen_resumes_logical_position() {
        let dir = TempDir::new().unwrap();
        {
            let mut rds = open(dir.path(), 1 << 20, 8);
            rds.write(b"aaaaaaaa").unwrap();
            rds.write(b"bbbb").unwrap();
            rds.flush().unwrap();
        }
        let mut rds = open(dir.path(), 1 << 20, 8);
        assert_eq!(rds.size(), 12);
        let c = rds.write(b"cc").unwrap();
        assert_eq!(c, 12);
        assert_eq!(rds.read(8, 4).unwrap().unwrap(), b"bbbb");
    }

    #[test]
    fn test_read_past_end_is_none() {
        let dir = TempDir::new().unwrap();
        let mut rds = open(dir.path(), 1 << 20, 1 << 16);
        rds.write(b"xy").unwrap();
        assert_eq!(rds.read(2, 4).unwrap(), None);
        assert_eq!(rds.read(100, 4).unwrap(), None);
    }

    #[test]
    fn test_forced_rotate_empty_tail_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut rds = open(dir.path(), 1 << 20, 1 << 16);
        rds.rotate().unwrap();
        rds.rotate().unwrap();
        assert_eq!(rds.segment_count(), 1);
    }
}
