//! Storage layer for tracevault
//!
//! This crate implements the low-level persistence primitives:
//! - Segment files: append-only, range-readable binary files
//! - [`RotatingStore`]: one logical address space over a sequence of
//!   segment files, with size-budget retention and trim notifications
//! - `format`: the self-describing binary record codec

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod rds;
pub mod segment;

pub use format::{decode, decode_stream, encode, DecodeError, EncodeMode};
pub use rds::{RdsListener, RotatingStore};
pub use segment::{list_segment_files, SegmentFile};
