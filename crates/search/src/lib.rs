//! Trace matchers
//!
//! Pluggable predicates evaluated node by node against resolved trace
//! trees during search:
//! - [`fulltext::FullTextMatcher`]: substring or regex match over names,
//!   attributes and exception data, scoped by flag bits
//! - [`expr::ExprMatcher`]: compiled form of a small query expression
//!   language over timing, counters, names and attributes
//! - [`parser::parse`]: the expression language parser

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod expr;
pub mod fulltext;
pub mod parser;

pub use expr::{CmpOp, Expr, ExprMatcher, Field, Value};
pub use fulltext::{
    FullTextMatcher, IGNORE_CASE, SEARCH_ALL, SEARCH_ATTRS, SEARCH_CLASSES, SEARCH_EX_MSG,
    SEARCH_EX_STACK, SEARCH_METHODS, SEARCH_SIGNATURE,
};
pub use parser::{parse, ParseError};
