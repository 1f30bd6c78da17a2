//! Core types for tracevault
//!
//! This crate defines the fundamental types shared by all layers:
//! - [`record::TraceRecord`]: one node of a captured call-trace tree
//! - [`summary::TraceSummary`]: the catalog row describing one ingested trace
//! - [`search_types`]: query, result and ranking types for trace retrieval
//! - [`error::StoreError`]: the canonical error taxonomy
//! - [`config::StoreConfig`]: runtime-adjustable store settings
//! - [`symbols::SymbolRegistry`]: the seam to the external symbol registry
//! - [`matcher::TraceMatcher`]: the seam for pluggable search matchers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod matcher;
pub mod record;
pub mod search_types;
pub mod summary;
pub mod symbols;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use matcher::{MatchContext, TraceMatcher};
pub use record::{StackElement, SymbolicException, TraceMarker, TraceRecord};
pub use search_types::{
    ExceptionInfo, MethodStats, RankBy, SearchDirection, SearchQuery, SearchResult, TraceInfo,
};
pub use summary::{ChunkRef, TraceSummary};
pub use symbols::{MapSymbolRegistry, SymbolId, SymbolRegistry};
