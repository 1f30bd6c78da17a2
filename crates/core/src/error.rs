//! Canonical error taxonomy
//!
//! | Code | Meaning |
//! |------|---------|
//! | StoreClosed | Operation attempted on a closed or disabled host |
//! | NotFound | No catalog entry (or resolvable data) at the given offset |
//! | PathNotFound | Invalid child-index path in a subtree lookup |
//! | Decode | Malformed bytes during a normal read |
//! | Corrupt | A store-level invariant was violated |
//! | Io | Underlying file-system failure |
//!
//! Chunk eviction is deliberately *not* an error: a read whose range was
//! trimmed by retention yields `Ok(None)` and scans filter it silently.

use thiserror::Error;

/// Result alias used throughout tracevault.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the trace store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation attempted on a closed or disabled host store.
    #[error("host store '{0}' is closed or disabled")]
    StoreClosed(String),

    /// No trace at the given catalog offset.
    #[error("no trace at offset {0}")]
    NotFound(u64),

    /// Invalid child-index path in a subtree lookup.
    #[error("subtree path '{path}' not found")]
    PathNotFound {
        /// The offending slash-separated path.
        path: String,
    },

    /// Malformed bytes encountered while decoding a record.
    #[error("decode error: {0}")]
    Decode(String),

    /// A store-level invariant was violated.
    #[error("corrupt {what}: {detail}")]
    Corrupt {
        /// Which structure is corrupt (e.g. "catalog").
        what: &'static str,
        /// Diagnostic detail.
        detail: String,
    },

    /// Underlying file-system failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
