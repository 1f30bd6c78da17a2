//! # Tracevault
//!
//! Embedded storage and query engine for distributed-tracing data.
//!
//! Tracevault stores call-trace trees submitted by instrumentation agents,
//! one store per monitored host, over append-only rotating segment files.
//! Every trace is written twice: the full tree to the data channel and a
//! root-only projection to the index channel, so list views and shallow
//! searches never deserialize whole trees. An ordered catalog keyed by
//! ingest offset drives paginated, budget-bounded search.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tracevault::prelude::*;
//! use std::sync::Arc;
//!
//! let symbols = Arc::new(MapSymbolRegistry::new());
//! let vault = HostManager::open("./data".as_ref(), StoreConfig::default(), symbols)?;
//!
//! // One store per monitored host.
//! let host = vault.get_or_create("app01")?;
//! host.ingest(&trace)?;
//!
//! // Newest-first page of matching traces.
//! let page = host.search(&SearchQuery::latest(50), None)?;
//!
//! // Graceful shutdown.
//! vault.close_all()?;
//! ```
//!
//! ## Layers
//!
//! - [`tracevault_core`] - records, summaries, queries, errors, config
//! - [`tracevault_storage`] - rotating segmented stores and the wire codec
//! - [`tracevault_engine`] - channels, catalog, search, retention, hosts
//! - [`tracevault_search`] - full-text and expression-language matchers

#![warn(missing_docs)]

pub mod prelude;

// Host lifecycle and per-host operations
pub use tracevault_engine::{HostDescriptor, HostManager, HostStore, RebuildStats};

// Record model and queries
pub use tracevault_core::{
    ChunkRef, ExceptionInfo, MapSymbolRegistry, MatchContext, MethodStats, RankBy, SearchDirection,
    SearchQuery, SearchResult, StackElement, StoreConfig, StoreError, StoreResult, SymbolicException,
    SymbolId, SymbolRegistry, TraceInfo, TraceMarker, TraceMatcher, TraceRecord, TraceSummary,
};

// Matchers
pub use tracevault_search::{parse, ExprMatcher, FullTextMatcher, ParseError};
