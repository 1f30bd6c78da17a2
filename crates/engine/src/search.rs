//! Search executor
//!
//! Scans the catalog in query order, applies cheap summary-level filters
//! first, resolves surviving candidates against the index channel (or the
//! data channel for deep searches) and runs the optional matcher over every
//! node of the resolved tree.
//!
//! Two wall-clock budgets bound a scan: the soft budget stops it once at
//! least one result has been produced, the hard budget stops it regardless.
//! Either way the page carries a resume cursor (`last_offset`) so the caller
//! can continue exactly where the scan left off; the cursor advances through
//! filtered-out candidates too, so repeated continuation always terminates.

use crate::catalog::Catalog;
use crate::channel::TraceChannel;
use std::time::Instant;
use tracevault_core::matcher::match_any_node;
use tracevault_core::symbols::render_method;
use tracevault_core::{
    ExceptionInfo, MatchContext, SearchDirection, SearchQuery, SearchResult, StoreConfig,
    StoreResult, SymbolRegistry, TraceInfo, TraceMatcher, TraceSummary,
};

/// Execute `query` against one host's catalog and channels.
pub fn execute_search(
    catalog: &Catalog,
    data: &TraceChannel,
    index: &TraceChannel,
    symbols: &dyn SymbolRegistry,
    config: &StoreConfig,
    query: &SearchQuery,
    matcher: Option<&dyn TraceMatcher>,
) -> StoreResult<SearchResult> {
    let mut result = SearchResult::default();
    if query.limit == 0 {
        return Ok(result);
    }

    let started = Instant::now();
    let mut cursor = query.cursor;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= config.hard_budget()
            || (!result.traces.is_empty() && elapsed >= config.soft_budget())
        {
            result.more = true;
            break;
        }

        let offset = match query.direction {
            SearchDirection::Ascending => catalog.successor(cursor),
            SearchDirection::Descending => catalog.predecessor(cursor),
        };
        let offset = match offset {
            Some(o) => o,
            None => break,
        };
        cursor = Some(offset);
        result.last_offset = Some(offset);

        let summary = match catalog.get(offset) {
            Some(s) => s,
            // Retention raced the scan; the entry is gone, keep going.
            None => continue,
        };

        if !summary_passes(&summary, query) {
            continue;
        }

        if let Some(info) = resolve(data, index, symbols, config, query, matcher, &summary)? {
            result.traces.push(info);
            if result.traces.len() >= query.limit {
                result.more = true;
                break;
            }
        }
    }

    Ok(result)
}

/// Cheap filters answered by the summary alone.
fn summary_passes(summary: &TraceSummary, query: &SearchQuery) -> bool {
    if query.errors_only && !summary.has_error() {
        return false;
    }
    if let Some(ty) = query.trace_type {
        if summary.trace_id != ty {
            return false;
        }
    }
    summary.duration >= query.min_duration
}

/// Resolve the candidate's tree, run the matcher and render a result row.
///
/// A `None` return means the candidate was filtered out or its chunk has
/// been trimmed by retention; neither is an error.
#[allow(clippy::too_many_arguments)]
fn resolve(
    data: &TraceChannel,
    index: &TraceChannel,
    symbols: &dyn SymbolRegistry,
    config: &StoreConfig,
    query: &SearchQuery,
    matcher: Option<&dyn TraceMatcher>,
    summary: &TraceSummary,
) -> StoreResult<Option<TraceInfo>> {
    let deep = query.deep_search && matcher.is_some();
    let tree = if deep {
        data.read(summary.data_chunk)?
    } else {
        index.read(summary.index_chunk)?
    };
    let tree = match tree {
        Some(t) => t,
        None => return Ok(None),
    };

    if let Some(matcher) = matcher {
        let ctx = MatchContext {
            total_time: summary.duration,
            symbols,
        };
        if !match_any_node(matcher, &tree, &ctx) {
            return Ok(None);
        }
    }

    Ok(Some(render_info(symbols, config, summary, &tree)))
}

fn render_info(
    symbols: &dyn SymbolRegistry,
    config: &StoreConfig,
    summary: &TraceSummary,
    root: &tracevault_core::TraceRecord,
) -> TraceInfo {
    // Attributes are keyed by symbol id on the wire; rows present them
    // sorted by resolved name.
    let mut attributes: Vec<(String, String)> = root
        .attrs
        .iter()
        .map(|(&key, value)| {
            let name = symbols
                .symbol_name(key)
                .unwrap_or_else(|| format!("?{key}"));
            (name, truncate(value, config.attr_value_limit))
        })
        .collect();
    attributes.sort_by(|a, b| a.0.cmp(&b.0));

    let exception = root.find_exception().map(|ex| ExceptionInfo {
        class: symbols
            .symbol_name(ex.class_id)
            .unwrap_or_else(|| "?".to_string()),
        message: ex.message.clone(),
        stack: ex
            .stack
            .iter()
            .take(config.stack_depth_limit)
            .map(|frame| {
                let class = symbols
                    .symbol_name(frame.class_id)
                    .unwrap_or_else(|| "?".to_string());
                format!("{class}:{}", frame.line)
            })
            .collect(),
    });

    TraceInfo {
        offset: summary.offset(),
        trace_type: symbols.symbol_name(summary.trace_id),
        description: render_method(symbols, root.class_id, root.method_id, root.signature_id),
        duration: summary.duration,
        calls: summary.calls,
        errors: summary.errors,
        records: summary.record_count,
        data_len: summary.data_len(),
        trace_flags: summary.trace_flags,
        record_flags: summary.record_flags,
        clock: summary.clock,
        attributes,
        exception,
    }
}

fn truncate(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        return value.to_string();
    }
    let mut cut = limit;
    while cut > 0 && !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &value[..cut])
}
