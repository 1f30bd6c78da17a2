//! Convenient imports for Tracevault.
//!
//! Re-exports the types most programs need:
//!
//! ```ignore
//! use tracevault::prelude::*;
//!
//! let vault = HostManager::open(dir, StoreConfig::default(), symbols)?;
//! ```

// Entry points
pub use tracevault_engine::{HostManager, HostStore};

// Error handling
pub use tracevault_core::{StoreError, StoreResult};

// Record model
pub use tracevault_core::{MapSymbolRegistry, SymbolRegistry, TraceMarker, TraceRecord};

// Queries and results
pub use tracevault_core::{
    RankBy, SearchDirection, SearchQuery, SearchResult, StoreConfig, TraceInfo,
};

// Matchers
pub use tracevault_search::{parse, ExprMatcher, FullTextMatcher};
