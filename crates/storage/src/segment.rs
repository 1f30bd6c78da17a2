//! Segment files
//!
//! One segment is one append-only binary file holding a contiguous slice of
//! its store's logical address space. The file name encodes the segment's
//! base offset (`<base:016x>.seg`), so a directory scan recovers the layout
//! with no separate manifest. A segment is actively appended until its store
//! rotates past it; after that it is immutable until retention unlinks it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracevault_core::StoreResult;

/// File extension for segment files.
pub const SEGMENT_EXT: &str = "seg";

/// File name for a segment starting at logical offset `base`.
pub fn segment_file_name(base: u64) -> String {
    format!("{base:016x}.{SEGMENT_EXT}")
}

/// Parse a segment file name back to its base offset.
pub fn parse_segment_base(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(&format!(".{SEGMENT_EXT}"))?;
    if stem.len() != 16 {
        return None;
    }
    u64::from_str_radix(stem, 16).ok()
}

/// List segment files in `dir`, sorted by base offset.
///
/// Non-segment files are ignored. Used by the rotating store on open and by
/// the rebuild procedure for its raw rescan.
pub fn list_segment_files(dir: &Path) -> StoreResult<Vec<(u64, PathBuf)>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(base) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_segment_base)
        {
            out.push((base, path));
        }
    }
    out.sort_by_key(|(base, _)| *base);
    Ok(out)
}

/// One segment file: base offset, current length, and an open handle.
///
/// The handle is opened read+append so the active tail can serve reads of
/// its own recent writes without reopening.
#[derive(Debug)]
pub struct SegmentFile {
    base: u64,
    len: u64,
    path: PathBuf,
    file: File,
}

impl SegmentFile {
    /// Create a fresh segment starting at logical offset `base`.
    pub fn create(dir: &Path, base: u64) -> StoreResult<Self> {
        let path = dir.join(segment_file_name(base));
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self {
            base,
            len: 0,
            path,
            file,
        })
    }

    /// Open an existing segment file, resuming its length from disk.
    pub fn open(path: &Path, base: u64) -> StoreResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            base,
            len,
            path: path.to_path_buf(),
            file,
        })
    }

    /// Logical offset at which this segment starts.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Current byte length.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the segment holds no bytes yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.base + self.len
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `data`, returning the logical offset where it begins.
    pub fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        let offset = self.base + self.len;
        self.len += data.len() as u64;
        Ok(offset)
    }

    /// Read up to `length` bytes starting at logical `offset`.
    ///
    /// The result is clamped to the segment end; callers resolve chunks that
    /// never span segments, so a short read only happens for ranges written
    /// by a newer store generation.
    pub fn read(&mut self, offset: u64, length: usize) -> StoreResult<Vec<u8>> {
        debug_assert!(offset >= self.base && offset <= self.end());
        let in_file = offset - self.base;
        let avail = (self.len - in_file) as usize;
        let take = length.min(avail);
        let mut buf = vec![0u8; take];
        self.file.seek(SeekFrom::Start(in_file))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Flush buffered writes to the OS.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.file.flush()?;
        Ok(())
    }
}
