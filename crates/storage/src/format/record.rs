//! Binary trace record format
//!
//! Each stored record is length-prefixed and self-describing:
//!
//! ```text
//! [magic: u16][version: u8][body_len: u32][body]
//! ```
//!
//! The body encodes one tree node recursively (little-endian):
//! identity and counters, then optional marker, attributes, optional
//! exception, then the child list. Symbols are stored as interned u32 ids,
//! never strings. The root-only mode encodes a *view* of the node with a
//! zero child count, leaving the source tree untouched; it is used by the
//! index channel to keep the per-trace footprint small.
//!
//! Invariant: `decode(encode(tree)) == tree` for both modes (a root-only
//! encoding round-trips to the tree minus its children).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::Cursor;
use thiserror::Error;
use tracevault_core::record::{StackElement, SymbolicException, TraceMarker, TraceRecord};
use tracevault_core::StoreError;

/// Magic prefixing every stored record ("TV" little-endian).
pub const RECORD_MAGIC: u16 = 0x5654;
/// Current record format version.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Fixed header size: magic + version + body length.
const HEADER_LEN: usize = 7;

/// Sanity cap on nested collection counts; a count above this means the
/// stream is corrupt, not that someone captured a million-child node.
const MAX_COUNT: usize = 1 << 20;

/// Whether to encode the full tree or just the root node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Encode the whole tree, children included.
    Full,
    /// Encode the root with a zero child count (index channel projection).
    RootOnly,
}

/// Errors produced while decoding stored records.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffer does not start with the record magic.
    #[error("bad record magic: {0:#06x}")]
    BadMagic(u16),

    /// The record was written by an unknown format version.
    #[error("unsupported record format version: {0}")]
    UnsupportedVersion(u8),

    /// The buffer ended before the structure was complete.
    #[error("truncated record: {0}")]
    Truncated(&'static str),

    /// A collection count exceeds the sanity cap.
    #[error("implausible {what} count: {count}")]
    ImplausibleCount {
        /// Which collection.
        what: &'static str,
        /// The decoded count.
        count: u64,
    },

    /// An attribute or message was not valid UTF-8.
    #[error("invalid utf-8 in record string")]
    InvalidUtf8,
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Serialize a record (full tree or root-only view) into a fresh buffer.
pub fn encode(rec: &TraceRecord, mode: EncodeMode) -> Vec<u8> {
    let mut body = Vec::with_capacity(64);
    encode_node(&mut body, rec, mode);

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.write_u16::<LittleEndian>(RECORD_MAGIC).unwrap();
    out.write_u8(RECORD_FORMAT_VERSION).unwrap();
    out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    out.extend_from_slice(&body);
    out
}

fn encode_node(out: &mut Vec<u8>, rec: &TraceRecord, mode: EncodeMode) {
    out.write_u32::<LittleEndian>(rec.class_id).unwrap();
    out.write_u32::<LittleEndian>(rec.method_id).unwrap();
    out.write_u32::<LittleEndian>(rec.signature_id).unwrap();
    out.write_u32::<LittleEndian>(rec.flags).unwrap();
    out.write_u64::<LittleEndian>(rec.time).unwrap();
    out.write_u64::<LittleEndian>(rec.calls).unwrap();
    out.write_u64::<LittleEndian>(rec.errors).unwrap();

    match &rec.marker {
        Some(m) => {
            out.write_u8(1).unwrap();
            out.write_u32::<LittleEndian>(m.trace_id).unwrap();
            out.write_i64::<LittleEndian>(m.clock).unwrap();
            out.write_u32::<LittleEndian>(m.flags).unwrap();
        }
        None => out.write_u8(0).unwrap(),
    }

    out.write_u32::<LittleEndian>(rec.attrs.len() as u32).unwrap();
    for (key, value) in &rec.attrs {
        out.write_u32::<LittleEndian>(*key).unwrap();
        write_str(out, value);
    }

    match &rec.exception {
        Some(ex) => {
            out.write_u8(1).unwrap();
            out.write_u32::<LittleEndian>(ex.class_id).unwrap();
            match &ex.message {
                Some(msg) => {
                    out.write_u8(1).unwrap();
                    write_str(out, msg);
                }
                None => out.write_u8(0).unwrap(),
            }
            out.write_u32::<LittleEndian>(ex.stack.len() as u32).unwrap();
            for frame in &ex.stack {
                out.write_u32::<LittleEndian>(frame.class_id).unwrap();
                out.write_u32::<LittleEndian>(frame.method_id).unwrap();
                out.write_u32::<LittleEndian>(frame.file_id).unwrap();
                out.write_u32::<LittleEndian>(frame.line).unwrap();
            }
        }
        None => out.write_u8(0).unwrap(),
    }

    match mode {
        EncodeMode::RootOnly => out.write_u32::<LittleEndian>(0).unwrap(),
        EncodeMode::Full => {
            out.write_u32::<LittleEndian>(rec.children.len() as u32)
                .unwrap();
            for child in &rec.children {
                encode_node(out, child, EncodeMode::Full);
            }
        }
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    out.extend_from_slice(s.as_bytes());
}

/// Decode one record from a chunk read back from a channel.
///
/// Trailing bytes after the encoded length are ignored (a clamped segment
/// read may return extra bytes).
pub fn decode(buf: &[u8]) -> Result<TraceRecord, DecodeError> {
    let (rec, _) = decode_at(buf, 0)?;
    Ok(rec)
}

/// Decode the record starting at byte `at` of a raw segment buffer.
///
/// Returns the record and the total bytes consumed (header + body), or
/// `None` on a clean end of buffer. Used by the rebuild procedure to walk
/// a segment file record by record.
pub fn decode_stream(
    buf: &[u8],
    at: usize,
) -> Result<Option<(TraceRecord, usize)>, DecodeError> {
    if at == buf.len() {
        return Ok(None);
    }
    let (rec, consumed) = decode_at(buf, at)?;
    Ok(Some((rec, consumed)))
}

fn decode_at(buf: &[u8], at: usize) -> Result<(TraceRecord, usize), DecodeError> {
    let header = buf
        .get(at..at + HEADER_LEN)
        .ok_or(DecodeError::Truncated("header"))?;
    let mut cur = Cursor::new(header);
    let magic = cur.read_u16::<LittleEndian>().unwrap();
    if magic != RECORD_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let version = cur.read_u8().unwrap();
    if version != RECORD_FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let body_len = cur.read_u32::<LittleEndian>().unwrap() as usize;

    let body = buf
        .get(at + HEADER_LEN..at + HEADER_LEN + body_len)
        .ok_or(DecodeError::Truncated("body"))?;
    let mut cur = Cursor::new(body);
    let rec = decode_node(&mut cur)?;
    if (cur.position() as usize) != body.len() {
        return Err(DecodeError::Truncated("body length mismatch"));
    }
    Ok((rec, HEADER_LEN + body_len))
}

fn decode_node(cur: &mut Cursor<&[u8]>) -> Result<TraceRecord, DecodeError> {
    let class_id = read_u32(cur, "class_id")?;
    let method_id = read_u32(cur, "method_id")?;
    let signature_id = read_u32(cur, "signature_id")?;
    let flags = read_u32(cur, "flags")?;
    let time = read_u64(cur, "time")?;
    let calls = read_u64(cur, "calls")?;
    let errors = read_u64(cur, "errors")?;

    let marker = if read_u8(cur, "marker flag")? != 0 {
        Some(TraceMarker {
            trace_id: read_u32(cur, "marker trace_id")?,
            clock: cur
                .read_i64::<LittleEndian>()
                .map_err(|_| DecodeError::Truncated("marker clock"))?,
            flags: read_u32(cur, "marker flags")?,
        })
    } else {
        None
    };

    let attr_count = checked_count(read_u32(cur, "attr count")?, "attribute")?;
    let mut attrs = BTreeMap::new();
    for _ in 0..attr_count {
        let key = read_u32(cur, "attr key")?;
        attrs.insert(key, read_str(cur)?);
    }

    let exception = if read_u8(cur, "exception flag")? != 0 {
        let class_id = read_u32(cur, "exception class")?;
        let message = if read_u8(cur, "message flag")? != 0 {
            Some(read_str(cur)?)
        } else {
            None
        };
        let frame_count = checked_count(read_u32(cur, "stack count")?, "stack frame")?;
        let mut stack = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            stack.push(StackElement {
                class_id: read_u32(cur, "frame class")?,
                method_id: read_u32(cur, "frame method")?,
                file_id: read_u32(cur, "frame file")?,
                line: read_u32(cur, "frame line")?,
            });
        }
        Some(SymbolicException {
            class_id,
            message,
            stack,
        })
    } else {
        None
    };

    let child_count = checked_count(read_u32(cur, "child count")?, "child")?;
    let mut children = Vec::with_capacity(child_count.min(1024));
    for _ in 0..child_count {
        children.push(decode_node(cur)?);
    }

    Ok(TraceRecord {
        class_id,
        method_id,
        signature_id,
        flags,
        time,
        calls,
        errors,
        marker,
        attrs,
        exception,
        children,
    })
}

fn checked_count(count: u32, what: &'static str) -> Result<usize, DecodeError> {
    if count as usize > MAX_COUNT {
        return Err(DecodeError::ImplausibleCount {
            what,
            count: count as u64,
        });
    }
    Ok(count as usize)
}

fn read_u8(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<u8, DecodeError> {
    cur.read_u8().map_err(|_| DecodeError::Truncated(what))
}

fn read_u32(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<u32, DecodeError> {
    cur.read_u32::<LittleEndian>()
        .map_err(|_| DecodeError::Truncated(what))
}

fn read_u64(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<u64, DecodeError> {
    cur.read_u64::<LittleEndian>()
        .map_err(|_| DecodeError::Truncated(what))
}

fn read_str(cur: &mut Cursor<&[u8]>) -> Result<String, DecodeError> {
    let len = checked_count(read_u32(cur, "string length")?, "string byte")?;
    let pos = cur.position() as usize;
    let bytes = cur
        .get_ref()
        .get(pos..pos + len)
        .ok_or(DecodeError::Truncated("string"))?;
    let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    cur.set_position((pos + len) as u64);
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tracevault_core::record::TF_ERROR_MARK;

    fn sample_tree() -> TraceRecord {
        let mut attrs = BTreeMap::new();
        attrs.insert(20, "GET /orders".to_string());
        attrs.insert(21, "203".to_string());
        TraceRecord {
            class_id: 1,
            method_id: 2,
            signature_id: 3,
            flags: 0x2,
            time: 50_000_000,
            calls: 12,
            errors: 1,
            marker: Some(TraceMarker {
                trace_id: 9,
                clock: 1_700_000_000_000,
                flags: TF_ERROR_MARK,
            }),
            attrs,
            exception: Some(SymbolicException {
                class_id: 30,
                message: Some("connection reset".to_string()),
                stack: vec![
                    StackElement {
                        class_id: 31,
                        method_id: 32,
                        file_id: 33,
                        line: 184,
                    },
                    StackElement {
                        class_id: 34,
                        method_id: 35,
                        file_id: 36,
                        line: 12,
                    },
                ],
            }),
            children: vec![
                TraceRecord {
                    class_id: 4,
                    method_id: 5,
                    signature_id: 6,
                    time: 20_000_000,
                    calls: 4,
                    ..Default::default()
                },
                TraceRecord {
                    class_id: 7,
                    method_id: 8,
                    signature_id: 6,
                    time: 10_000_000,
                    calls: 2,
                    children: vec![TraceRecord {
                        class_id: 4,
                        method_id: 5,
                        signature_id: 6,
                        time: 5_000_000,
                        calls: 1,
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_full_roundtrip() {
        let tree = sample_tree();
        let bytes = encode(&tree, EncodeMode::Full);
        let back = decode(&bytes).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_root_only_roundtrip_drops_children() {
        let tree = sample_tree();
        let bytes = encode(&tree, EncodeMode::RootOnly);
        let back = decode(&bytes).unwrap();

        let mut expected = tree.clone();
        expected.children.clear();
        assert_eq!(back, expected);
        // Source tree untouched by the view encoding.
        assert_eq!(tree.children.len(), 2);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut bytes = encode(&sample_tree(), EncodeMode::Full);
        bytes.extend_from_slice(&[0xAB; 16]);
        assert_eq!(decode(&bytes).unwrap(), sample_tree());
    }

    #[test]
    fn test_stream_decode_walks_records() {
        let a = sample_tree();
        let mut b = sample_tree();
        b.time = 7;
        let mut buf = encode(&a, EncodeMode::Full);
        let a_len = buf.len();
        buf.extend_from_slice(&encode(&b, EncodeMode::Full));

        let (first, consumed) = decode_stream(&buf, 0).unwrap().unwrap();
        assert_eq!(first, a);
        assert_eq!(consumed, a_len);
        let (second, _) = decode_stream(&buf, a_len).unwrap().unwrap();
        assert_eq!(second, b);
        assert!(decode_stream(&buf, buf.len()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_tail_is_an_error_not_a_panic() {
        let mut buf = encode(&sample_tree(), EncodeMode::Full);
        let good = buf.len();
        buf.extend_from_slice(&[0xFF; 10]);
        assert!(decode_stream(&buf, good).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample_tree(), EncodeMode::Full);
        bytes[0] ^= 0xFF;
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMagic(_))));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = encode(&sample_tree(), EncodeMode::Full);
        assert!(matches!(
            decode(&bytes[..bytes.len() - 3]),
            Err(DecodeError::Truncated(_))
        ));
    }

    // ===== Property tests =====

    fn arb_record(depth: u32) -> BoxedStrategy<TraceRecord> {
        let leaf = (
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
            any::<u64>(),
            any::<u64>(),
            prop::option::of((any::<u32>(), any::<i64>(), any::<u32>())),
            prop::collection::btree_map(any::<u32>(), ".{0,12}", 0..4),
        )
            .prop_map(
                |(class_id, method_id, signature_id, flags, time, calls, marker, attrs)| {
                    TraceRecord {
                        class_id,
                        method_id,
                        signature_id,
                        flags,
                        time,
                        calls,
                        errors: calls / 7,
                        marker: marker.map(|(trace_id, clock, flags)| TraceMarker {
                            trace_id,
                            clock,
                            flags,
                        }),
                        attrs,
                        exception: None,
                        children: Vec::new(),
                    }
                },
            );
        if depth == 0 {
            leaf.boxed()
        } else {
            (leaf, prop::collection::vec(arb_record(depth - 1), 0..3))
                .prop_map(|(mut rec, children)| {
                    rec.children = children;
                    rec
                })
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn prop_roundtrip_full(tree in arb_record(2)) {
            let bytes = encode(&tree, EncodeMode::Full);
            prop_assert_eq!(decode(&bytes).unwrap(), tree);
        }

        #[test]
        fn prop_roundtrip_root_only(tree in arb_record(2)) {
            let bytes = encode(&tree, EncodeMode::RootOnly);
            let mut expected = tree.clone();
            expected.children.clear();
            prop_assert_eq!(decode(&bytes).unwrap(), expected);
        }
    }
}
