//! Trace record tree
//!
//! A [`TraceRecord`] describes one instrumented method execution: identity
//! (class/method/signature symbol ids), timing, call/error counters, optional
//! attributes and exception data, and the ordered list of child executions.
//! Roots additionally carry a [`TraceMarker`] naming the trace type.
//!
//! Invariant: a node's `time` covers its children's times; the residual is
//! the node's bare (self) time.

use crate::symbols::SymbolId;
use std::collections::BTreeMap;

/// A new trace starts at this record.
pub const RF_TRACE_BEGIN: u32 = 0x0002;
/// An exception thrown below this frame passed through it unhandled.
pub const RF_EXCEPTION_PASS: u32 = 0x0004;
/// An exception thrown below this frame was wrapped and rethrown.
pub const RF_EXCEPTION_WRAP: u32 = 0x0008;
/// Children of this record were dropped at capture time (short executions).
pub const RF_DROPPED_CHILDREN: u32 = 0x0010;

/// The trace as a whole was marked as an error by the agent.
pub const TF_ERROR_MARK: u32 = 0x0001;
/// The trace was truncated at capture time (record budget exceeded).
pub const TF_TRUNCATED: u32 = 0x0002;

/// Marker attached to the root record of every submitted trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceMarker {
    /// Trace type symbol (e.g. the interned name of the entry point).
    pub trace_id: SymbolId,
    /// Wall-clock time of trace start, epoch milliseconds.
    pub clock: i64,
    /// Trace-level flags (`TF_*`).
    pub flags: u32,
}

/// One frame of a symbolized stack trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackElement {
    /// Class name symbol.
    pub class_id: SymbolId,
    /// Method name symbol.
    pub method_id: SymbolId,
    /// Source file name symbol.
    pub file_id: SymbolId,
    /// Line number.
    pub line: u32,
}

/// Exception captured at a trace record, with symbolized stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolicException {
    /// Exception class symbol.
    pub class_id: SymbolId,
    /// Exception message, if any.
    pub message: Option<String>,
    /// Stack frames, innermost first.
    pub stack: Vec<StackElement>,
}

/// One node of a call-trace tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraceRecord {
    /// Class name symbol.
    pub class_id: SymbolId,
    /// Method name symbol.
    pub method_id: SymbolId,
    /// Method signature symbol.
    pub signature_id: SymbolId,
    /// Record-level flags (`RF_*`).
    pub flags: u32,
    /// Total execution time of this node, nanoseconds (includes children).
    pub time: u64,
    /// Instrumented calls performed from this method, recursively.
    pub calls: u64,
    /// Errors observed in this method, recursively.
    pub errors: u64,
    /// Trace marker; present on trace roots only.
    pub marker: Option<TraceMarker>,
    /// Attributes grabbed at this execution, keyed by attribute name symbol.
    pub attrs: BTreeMap<SymbolId, String>,
    /// Exception caught on method exit, if any.
    pub exception: Option<SymbolicException>,
    /// Directly called child executions, in call order.
    pub children: Vec<TraceRecord>,
}

impl TraceRecord {
    /// Check a record-level flag.
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// Trace type symbol from the marker, 0 if unmarked.
    pub fn trace_id(&self) -> SymbolId {
        self.marker.map(|m| m.trace_id).unwrap_or(0)
    }

    /// Whether this record (or the trace as a whole) carries an error.
    pub fn is_error(&self) -> bool {
        self.exception.is_some()
            || self.has_flag(RF_EXCEPTION_PASS)
            || self
                .marker
                .map(|m| m.flags & TF_ERROR_MARK != 0)
                .unwrap_or(false)
    }

    /// The exception visible at this record: its own, or the one passed
    /// through from the last child when `RF_EXCEPTION_PASS` is set.
    pub fn find_exception(&self) -> Option<&SymbolicException> {
        if let Some(ex) = &self.exception {
            return Some(ex);
        }
        if self.has_flag(RF_EXCEPTION_PASS) {
            if let Some(last) = self.children.last() {
                return last.find_exception();
            }
        }
        None
    }

    /// Total number of records in this subtree, including `self`.
    pub fn record_count(&self) -> u32 {
        1 + self
            .children
            .iter()
            .map(TraceRecord::record_count)
            .sum::<u32>()
    }

    /// Child at index `i`, if present.
    pub fn child(&self, i: usize) -> Option<&TraceRecord> {
        self.children.get(i)
    }

    /// Produce a filtered copy keeping only subtrees with root time of at
    /// least `min_time`.
    ///
    /// The node itself is always kept; pruning applies bottom-up to
    /// children. The source tree is not mutated, so it stays reusable for
    /// concurrent readers.
    pub fn pruned(&self, min_time: u64) -> TraceRecord {
        let mut copy = TraceRecord {
            children: Vec::new(),
            ..self.clone_shallow()
        };
        for child in &self.children {
            if child.time >= min_time {
                copy.children.push(child.pruned(min_time));
            }
        }
        copy
    }

    fn clone_shallow(&self) -> TraceRecord {
        TraceRecord {
            class_id: self.class_id,
            method_id: self.method_id,
            signature_id: self.signature_id,
            flags: self.flags,
            time: self.time,
            calls: self.calls,
            errors: self.errors,
            marker: self.marker,
            attrs: self.attrs.clone(),
            exception: self.exception.clone(),
            children: Vec::new(),
        }
    }
}
