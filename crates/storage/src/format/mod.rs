//! On-disk byte format for trace records.
//!
//! Keeping serialization separate from the store logic (how segments are
//! rotated and trimmed) makes format evolution easier to manage.

pub mod record;

pub use record::{
    decode, decode_stream, encode, DecodeError, EncodeMode, RECORD_FORMAT_VERSION, RECORD_MAGIC,
};
