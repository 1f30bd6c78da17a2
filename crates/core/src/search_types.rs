//! Search query, result and ranking types

use crate::symbols::SymbolId;

/// Scan direction over the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDirection {
    /// Oldest first (increasing ingest offset).
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// A paginated, filtered search over one host's catalog.
///
/// `cursor` is the last-seen offset from the previous page, or `None` to
/// start from the beginning (ascending) or end (descending) of the catalog.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Scan direction.
    pub direction: SearchDirection,
    /// Resume cursor: scanning continues strictly past this offset.
    pub cursor: Option<u64>,
    /// Maximum number of results per page.
    pub limit: usize,
    /// Only traces of this type.
    pub trace_type: Option<SymbolId>,
    /// Only traces with at least this root duration, nanoseconds.
    pub min_duration: u64,
    /// Only traces carrying the error mark.
    pub errors_only: bool,
    /// Match against the full data tree instead of the index root.
    ///
    /// Only meaningful when a matcher is supplied; shallow searches always
    /// read the much smaller index channel.
    pub deep_search: bool,
}

impl SearchQuery {
    /// A query returning the first `limit` traces in ascending order.
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// A query returning the most recent `limit` traces.
    pub fn latest(limit: usize) -> Self {
        Self {
            direction: SearchDirection::Descending,
            limit,
            ..Default::default()
        }
    }

    /// Continue this query from a previous page's resume cursor.
    pub fn after(mut self, cursor: Option<u64>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// Exception data rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Exception class name.
    pub class: String,
    /// Exception message, if any.
    pub message: Option<String>,
    /// Rendered stack frames (`class:line`), truncated to the configured
    /// depth limit.
    pub stack: Vec<String>,
}

/// One resolved search result row.
#[derive(Debug, Clone)]
pub struct TraceInfo {
    /// Catalog key (data-channel offset).
    pub offset: u64,
    /// Trace type name, if resolvable.
    pub trace_type: Option<String>,
    /// Rendered root method signature.
    pub description: String,
    /// Root execution time, nanoseconds.
    pub duration: u64,
    /// Total instrumented calls.
    pub calls: u64,
    /// Total errors.
    pub errors: u64,
    /// Records in the stored tree.
    pub records: u32,
    /// Stored byte length of the full tree.
    pub data_len: u32,
    /// Trace-level flags (`TF_*`).
    pub trace_flags: u32,
    /// Record-level flags of the root (`RF_*`).
    pub record_flags: u32,
    /// Wall-clock trace start, epoch milliseconds.
    pub clock: i64,
    /// Attributes resolved to names, sorted by key.
    pub attributes: Vec<(String, String)>,
    /// Exception info, if the root carries one.
    pub exception: Option<ExceptionInfo>,
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Resolved rows, in scan order.
    pub traces: Vec<TraceInfo>,
    /// Offset of the last candidate visited, for pagination. Advances even
    /// through filtered-out entries; `None` if nothing was visited.
    pub last_offset: Option<u64>,
    /// Whether more candidates may remain past `last_offset`.
    pub more: bool,
}

/// Histogram sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    /// Number of calls.
    Calls,
    /// Number of errors.
    Errors,
    /// Total time.
    Time,
    /// Average time per call.
    AvgTime,
}

/// Per-method statistics accumulated by a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodStats {
    /// Class name symbol.
    pub class_id: SymbolId,
    /// Method name symbol.
    pub method_id: SymbolId,
    /// Signature symbol.
    pub signature_id: SymbolId,
    /// Rendered method signature.
    pub method: String,
    /// Records aggregated into this row.
    pub calls: u64,
    /// Records that carried an exception.
    pub errors: u64,
    /// Sum of record times, nanoseconds.
    pub time: u64,
    /// Sum of bare (self) times: record time minus children's times.
    pub bare_time: u64,
    /// Shortest single record time.
    pub min_time: u64,
    /// Longest single record time.
    pub max_time: u64,
}

impl MethodStats {
    /// Average time per aggregated record.
    pub fn avg_time(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.time / self.calls
        }
    }
}
