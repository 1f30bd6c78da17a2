//! Full-text matcher
//!
//! Matches one needle (plain substring or compiled regex) against the
//! textual facets of a trace record: class and method names, the rendered
//! signature, attribute names and values, exception class/message and
//! exception stack symbols. Which facets participate is controlled by
//! scope flag bits so a UI can offer "search in attributes only" style
//! toggles.

use regex::Regex;
use tracevault_core::symbols::render_method;
use tracevault_core::{MatchContext, TraceMatcher, TraceRecord};

/// Match against class names.
pub const SEARCH_CLASSES: u32 = 0x0001;
/// Match against method names.
pub const SEARCH_METHODS: u32 = 0x0002;
/// Match against attribute names and values.
pub const SEARCH_ATTRS: u32 = 0x0004;
/// Match against exception class and message.
pub const SEARCH_EX_MSG: u32 = 0x0008;
/// Match against exception stack frame symbols.
pub const SEARCH_EX_STACK: u32 = 0x0010;
/// Match against the fully rendered method signature.
pub const SEARCH_SIGNATURE: u32 = 0x0020;
/// All scopes.
pub const SEARCH_ALL: u32 = SEARCH_CLASSES
    | SEARCH_METHODS
    | SEARCH_ATTRS
    | SEARCH_EX_MSG
    | SEARCH_EX_STACK
    | SEARCH_SIGNATURE;
/// Fold case before comparing (substring needles only).
pub const IGNORE_CASE: u32 = 0x0040;

enum Needle {
    /// Matches everything.
    Any,
    Text(String),
    Pattern(Regex),
}

/// Scoped substring/regex matcher over trace record text.
pub struct FullTextMatcher {
    flags: u32,
    needle: Needle,
}

impl FullTextMatcher {
    /// Substring matcher. An empty needle matches every record.
    pub fn substring(flags: u32, text: &str) -> Self {
        let needle = if text.is_empty() {
            Needle::Any
        } else if flags & IGNORE_CASE != 0 {
            Needle::Text(text.to_lowercase())
        } else {
            Needle::Text(text.to_string())
        };
        Self { flags, needle }
    }

    /// Regex matcher. Case folding is the pattern's own business (`(?i)`).
    pub fn regex(flags: u32, pattern: Regex) -> Self {
        Self {
            flags,
            needle: Needle::Pattern(pattern),
        }
    }

    fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    fn matches_text(&self, s: &str) -> bool {
        match &self.needle {
            Needle::Any => true,
            Needle::Text(needle) => {
                if self.flags & IGNORE_CASE != 0 {
                    s.to_lowercase().contains(needle)
                } else {
                    s.contains(needle)
                }
            }
            Needle::Pattern(pattern) => pattern.is_match(s),
        }
    }

    fn matches_symbol(&self, ctx: &MatchContext<'_>, id: u32) -> bool {
        ctx.symbols
            .symbol_name(id)
            .is_some_and(|name| self.matches_text(&name))
    }
}

impl TraceMatcher for FullTextMatcher {
    fn matches(&self, rec: &TraceRecord, ctx: &MatchContext<'_>) -> bool {
        if matches!(self.needle, Needle::Any) {
            return true;
        }

        if (self.has_flag(SEARCH_CLASSES) && self.matches_symbol(ctx, rec.class_id))
            || (self.has_flag(SEARCH_METHODS) && self.matches_symbol(ctx, rec.method_id))
        {
            return true;
        }

        if self.has_flag(SEARCH_ATTRS) {
            for (&key, value) in &rec.attrs {
                if self.matches_symbol(ctx, key) || self.matches_text(value) {
                    return true;
                }
            }
        }

        let ex = rec.find_exception();

        if self.has_flag(SEARCH_EX_MSG) {
            if let Some(ex) = ex {
                if self.matches_symbol(ctx, ex.class_id)
                    || ex.message.as_deref().is_some_and(|m| self.matches_text(m))
                {
                    return true;
                }
            }
        }

        if self.has_flag(SEARCH_EX_STACK) {
            if let Some(ex) = ex {
                for frame in &ex.stack {
                    if self.matches_symbol(ctx, frame.class_id)
                        || self.matches_symbol(ctx, frame.method_id)
                        || self.matches_symbol(ctx, frame.file_id)
                    {
                        return true;
                    }
                }
            }
        }

        if self.has_flag(SEARCH_SIGNATURE) {
            let signature =
                render_method(ctx.symbols, rec.class_id, rec.method_id, rec.signature_id);
            if self.matches_text(&signature) {
                return true;
            }
        }

        false
    }
}
