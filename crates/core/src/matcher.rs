//! Matcher seam for deep and shallow search
//!
//! Matchers are evaluated against every node of a resolved tree
//! (match-any-node semantics). The [`MatchContext`] injects per-trace state
//! the matcher cannot derive from a single node, notably the total trace
//! duration used for percentage-of-total comparisons.

use crate::record::TraceRecord;
use crate::symbols::SymbolRegistry;

/// Per-candidate context passed to matchers.
pub struct MatchContext<'a> {
    /// Total execution time of the trace being matched, nanoseconds.
    pub total_time: u64,
    /// Registry for resolving symbol ids to names.
    pub symbols: &'a dyn SymbolRegistry,
}

/// A pluggable predicate over trace record nodes.
pub trait TraceMatcher: Send + Sync {
    /// Whether `rec` satisfies this matcher.
    fn matches(&self, rec: &TraceRecord, ctx: &MatchContext<'_>) -> bool;
}

/// Whether any node of `rec`'s subtree satisfies `matcher`.
pub fn match_any_node(
    matcher: &dyn TraceMatcher,
    rec: &TraceRecord,
    ctx: &MatchContext<'_>,
) -> bool {
    if matcher.matches(rec, ctx) {
        return true;
    }
    rec.children
        .iter()
        .any(|child| match_any_node(matcher, child, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::MapSymbolRegistry;

    struct TimeAtLeast(u64);

    impl TraceMatcher for TimeAtLeast {
        fn matches(&self, rec: &TraceRecord, _ctx: &MatchContext<'_>) -> bool {
            rec.time >= self.0
        }
    }

    #[test]
    fn test_match_any_node_descends() {
        let symbols = MapSymbolRegistry::new();
        let ctx = MatchContext {
            total_time: 100,
            symbols: &symbols,
        };
        let tree = TraceRecord {
            time: 10,
            children: vec![TraceRecord {
                time: 90,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(match_any_node(&TimeAtLeast(50), &tree, &ctx));
        assert!(!match_any_node(&TimeAtLeast(95), &tree, &ctx));
    }
}
