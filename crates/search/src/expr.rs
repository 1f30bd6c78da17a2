//! Query expression AST and evaluation
//!
//! A compiled expression matches individual trace record nodes. Numeric
//! fields compare against durations or counters; name fields compare
//! against resolved symbol names (equality or regex); `attr.<name>` reaches
//! into the record's attributes; `exception` tests exception presence
//! (including pass-through). `time%` is the node's share of the whole
//! trace, injected through the match context.

use regex::Regex;
use tracevault_core::{MatchContext, TraceMatcher, TraceRecord};

/// A record field an expression can test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Node execution time, nanoseconds.
    Time,
    /// Node time as a percentage of the whole trace's time.
    TimePct,
    /// Recursive call counter.
    Calls,
    /// Recursive error counter.
    Errors,
    /// Resolved class name.
    Class,
    /// Resolved method name.
    Method,
    /// Attribute value by attribute name.
    Attr(String),
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `~` regex find over the string form.
    Match,
}

/// A literal operand.
#[derive(Debug, Clone)]
pub enum Value {
    /// Number (durations normalized to nanoseconds by the parser).
    Num(u64),
    /// Quoted string.
    Str(String),
    /// Regex, only valid with [`CmpOp::Match`].
    Pattern(Regex),
}

/// Expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `field op value`
    Cmp {
        /// Field under test.
        field: Field,
        /// Operator.
        op: CmpOp,
        /// Literal operand.
        value: Value,
    },
    /// `exception` — the node carries (or passes through) an exception.
    HasException,
    /// Conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Negation.
    Not(Box<Expr>),
}

impl Expr {
    /// Evaluate against one record node.
    pub fn eval(&self, rec: &TraceRecord, ctx: &MatchContext<'_>) -> bool {
        match self {
            Expr::Cmp { field, op, value } => eval_cmp(field, *op, value, rec, ctx),
            Expr::HasException => rec.find_exception().is_some(),
            Expr::And(a, b) => a.eval(rec, ctx) && b.eval(rec, ctx),
            Expr::Or(a, b) => a.eval(rec, ctx) || b.eval(rec, ctx),
            Expr::Not(e) => !e.eval(rec, ctx),
        }
    }
}

fn eval_cmp(
    field: &Field,
    op: CmpOp,
    value: &Value,
    rec: &TraceRecord,
    ctx: &MatchContext<'_>,
) -> bool {
    match field {
        Field::Time => cmp_num(rec.time, op, value),
        Field::TimePct => {
            let pct = if ctx.total_time == 0 {
                0
            } else {
                rec.time.saturating_mul(100) / ctx.total_time
            };
            cmp_num(pct, op, value)
        }
        Field::Calls => cmp_num(rec.calls, op, value),
        Field::Errors => cmp_num(rec.errors, op, value),
        Field::Class => cmp_symbol(ctx, rec.class_id, op, value),
        Field::Method => cmp_symbol(ctx, rec.method_id, op, value),
        Field::Attr(name) => {
            let id = ctx.symbols.symbol_id(name);
            match rec.attrs.get(&id) {
                Some(v) => cmp_str(v, op, value),
                None => false,
            }
        }
    }
}

fn cmp_num(lhs: u64, op: CmpOp, value: &Value) -> bool {
    let rhs = match value {
        Value::Num(n) => *n,
        _ => return false,
    };
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        CmpOp::Lt => lhs < rhs,
        CmpOp::Le => lhs <= rhs,
        CmpOp::Gt => lhs > rhs,
        CmpOp::Ge => lhs >= rhs,
        CmpOp::Match => false,
    }
}

fn cmp_symbol(ctx: &MatchContext<'_>, id: u32, op: CmpOp, value: &Value) -> bool {
    match ctx.symbols.symbol_name(id) {
        Some(name) => cmp_str(&name, op, value),
        None => false,
    }
}

fn cmp_str(lhs: &str, op: CmpOp, value: &Value) -> bool {
    match (op, value) {
        (CmpOp::Eq, Value::Str(rhs)) => lhs == rhs,
        (CmpOp::Ne, Value::Str(rhs)) => lhs != rhs,
        (CmpOp::Match, Value::Pattern(p)) => p.is_match(lhs),
        _ => false,
    }
}

/// A compiled expression as a [`TraceMatcher`].
pub struct ExprMatcher {
    expr: Expr,
}

impl ExprMatcher {
    /// Wrap a parsed expression.
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }
}

impl TraceMatcher for ExprMatcher {
    fn matches(&self, rec: &TraceRecord, ctx: &MatchContext<'_>) -> bool {
        self.expr.eval(rec, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracevault_core::record::SymbolicException;
    use tracevault_core::{MapSymbolRegistry, SymbolRegistry};

    fn cmp(field: Field, op: CmpOp, value: Value) -> Expr {
        Expr::Cmp { field, op, value }
    }

    #[test]
    fn test_numeric_and_percentage_fields() {
        let symbols = MapSymbolRegistry::new();
        let ctx = MatchContext {
            total_time: 200,
            symbols: &symbols,
        };
        let rec = TraceRecord {
            time: 50,
            calls: 3,
            errors: 1,
            ..Default::default()
        };

        assert!(cmp(Field::Time, CmpOp::Ge, Value::Num(50)).eval(&rec, &ctx));
        assert!(!cmp(Field::Time, CmpOp::Gt, Value::Num(50)).eval(&rec, &ctx));
        // 50 of 200 total = 25%.
        assert!(cmp(Field::TimePct, CmpOp::Eq, Value::Num(25)).eval(&rec, &ctx));
        assert!(cmp(Field::Calls, CmpOp::Eq, Value::Num(3)).eval(&rec, &ctx));
        assert!(cmp(Field::Errors, CmpOp::Gt, Value::Num(0)).eval(&rec, &ctx));
    }

    #[test]
    fn test_name_and_attr_fields() {
        let symbols = MapSymbolRegistry::new();
        let class = symbols.symbol_id("com.example.Dao");
        let attr = symbols.symbol_id("SQL");
        let ctx = MatchContext {
            total_time: 100,
            symbols: &symbols,
        };
        let mut rec = TraceRecord {
            class_id: class,
            ..Default::default()
        };
        rec.attrs.insert(attr, "SELECT 1".to_string());

        assert!(
            cmp(Field::Class, CmpOp::Eq, Value::Str("com.example.Dao".into())).eval(&rec, &ctx)
        );
        assert!(cmp(
            Field::Class,
            CmpOp::Match,
            Value::Pattern(Regex::new(r"\.Dao$").unwrap())
        )
        .eval(&rec, &ctx));
        assert!(
            cmp(Field::Attr("SQL".into()), CmpOp::Eq, Value::Str("SELECT 1".into()))
                .eval(&rec, &ctx)
        );
        // Absent attribute never matches, not even with !=.
        assert!(
            !cmp(Field::Attr("URI".into()), CmpOp::Ne, Value::Str("x".into())).eval(&rec, &ctx)
        );
    }

    #[test]
    fn test_boolean_combinators_and_exception() {
        let symbols = MapSymbolRegistry::new();
        let ctx = MatchContext {
            total_time: 100,
            symbols: &symbols,
        };
        let mut rec = TraceRecord {
            time: 80,
            ..Default::default()
        };
        rec.exception = Some(SymbolicException::default());

        let slow = cmp(Field::Time, CmpOp::Gt, Value::Num(50));
        let fast = cmp(Field::Time, CmpOp::Lt, Value::Num(50));

        assert!(Expr::And(Box::new(slow.clone()), Box::new(Expr::HasException)).eval(&rec, &ctx));
        assert!(Expr::Or(Box::new(fast.clone()), Box::new(slow.clone())).eval(&rec, &ctx));
        assert!(!Expr::Not(Box::new(slow)).eval(&rec, &ctx));
        assert!(Expr::Not(Box::new(fast)).eval(&rec, &ctx));
    }
}
