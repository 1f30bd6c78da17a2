//! Query expression parser
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! expr    := and ( "or" and )*
//! and     := unary ( "and" unary )*
//! unary   := "not" unary | primary
//! primary := "(" expr ")" | "exception" | field op value
//! field   := "time" [ "%" ] | "calls" | "errors" | "class" | "method"
//!          | "attr" "." name
//! op      := "==" | "!=" | "<" | "<=" | ">" | ">=" | "~"
//! value   := number [ "ns" | "us" | "ms" | "s" ] | 'string' | "string"
//! ```
//!
//! Duration suffixes normalize to nanoseconds at parse time. The `~`
//! operator takes a string literal and compiles it as a regex.

use crate::expr::{CmpOp, Expr, Field, Value};
use regex::Regex;
use thiserror::Error;

/// Expression parse failure.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A character the tokenizer does not understand.
    #[error("unexpected character '{0}' at byte {1}")]
    UnexpectedChar(char, usize),
    /// A token out of place.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    /// Input ended mid-expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A numeric literal out of range or with an unknown suffix.
    #[error("bad number '{0}'")]
    BadNumber(String),
    /// An unterminated string literal.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// A field name the language does not define.
    #[error("unknown field '{0}'")]
    UnknownField(String),
    /// The right side of `~` failed to compile as a regex.
    #[error("bad pattern: {0}")]
    BadPattern(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(u64),
    Str(String),
    Op(CmpOp),
    Percent,
    Dot,
    LParen,
    RParen,
}

/// Parse an expression string into its AST.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(ParseError::UnexpectedToken(format!("{t:?}"))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '~' => {
                tokens.push(Token::Op(CmpOp::Match));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let two = bytes.get(i + 1) == Some(&b'=');
                let op = match (c, two) {
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    ('<', true) => CmpOp::Le,
                    ('>', true) => CmpOp::Ge,
                    ('<', false) => CmpOp::Lt,
                    ('>', false) => CmpOp::Gt,
                    _ => return Err(ParseError::UnexpectedChar(c, i)),
                };
                tokens.push(Token::Op(op));
                i += if two { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = bytes[i];
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != quote {
                    j += 1;
                }
                if j == bytes.len() {
                    return Err(ParseError::UnterminatedString);
                }
                tokens.push(Token::Str(input[start..j].to_string()));
                i = j + 1;
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let digits = &input[start..i];
                let suffix_start = i;
                while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let suffix = &input[suffix_start..i];
                let n: u64 = digits
                    .parse()
                    .map_err(|_| ParseError::BadNumber(digits.to_string()))?;
                let scale = match suffix {
                    "" | "ns" => 1,
                    "us" => 1_000,
                    "ms" => 1_000_000,
                    "s" => 1_000_000_000,
                    other => return Err(ParseError::BadNumber(format!("{digits}{other}"))),
                };
                let value = n
                    .checked_mul(scale)
                    .ok_or_else(|| ParseError::BadNumber(digits.to_string()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(input[start..i].to_string()));
            }
            other => return Err(ParseError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let t = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(t)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(id)) if id == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("or") {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        while self.eat_keyword("and") {
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next()? {
            Token::LParen => {
                let expr = self.or_expr()?;
                match self.next()? {
                    Token::RParen => Ok(expr),
                    t => Err(ParseError::UnexpectedToken(format!("{t:?}"))),
                }
            }
            Token::Ident(id) if id == "exception" => Ok(Expr::HasException),
            Token::Ident(id) => {
                let field = self.field(&id)?;
                self.comparison(field)
            }
            t => Err(ParseError::UnexpectedToken(format!("{t:?}"))),
        }
    }

    fn field(&mut self, name: &str) -> Result<Field, ParseError> {
        match name {
            "time" => {
                if matches!(self.peek(), Some(Token::Percent)) {
                    self.pos += 1;
                    Ok(Field::TimePct)
                } else {
                    Ok(Field::Time)
                }
            }
            "calls" => Ok(Field::Calls),
            "errors" => Ok(Field::Errors),
            "class" => Ok(Field::Class),
            "method" => Ok(Field::Method),
            "attr" => {
                match self.next()? {
                    Token::Dot => {}
                    t => return Err(ParseError::UnexpectedToken(format!("{t:?}"))),
                }
                match self.next()? {
                    Token::Ident(attr) => Ok(Field::Attr(attr)),
                    t => Err(ParseError::UnexpectedToken(format!("{t:?}"))),
                }
            }
            other => Err(ParseError::UnknownField(other.to_string())),
        }
    }

    fn comparison(&mut self, field: Field) -> Result<Expr, ParseError> {
        let op = match self.next()? {
            Token::Op(op) => op,
            t => return Err(ParseError::UnexpectedToken(format!("{t:?}"))),
        };
        let value = match self.next()? {
            Token::Num(n) => Value::Num(n),
            Token::Str(s) if op == CmpOp::Match => Value::Pattern(
                Regex::new(&s).map_err(|e| ParseError::BadPattern(e.to_string()))?,
            ),
            Token::Str(s) => Value::Str(s),
            t => return Err(ParseError::UnexpectedToken(format!("{t:?}"))),
        };
        Ok(Expr::Cmp { field, op, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracevault_core::{MapSymbolRegistry, MatchContext, SymbolRegistry, TraceRecord};

    fn eval(input: &str, rec: &TraceRecord, symbols: &MapSymbolRegistry, total: u64) -> bool {
        let ctx = MatchContext {
            total_time: total,
            symbols,
        };
        parse(input).unwrap().eval(rec, &ctx)
    }

    #[test]
    fn test_duration_suffixes() {
        match parse("time > 5ms").unwrap() {
            Expr::Cmp {
                value: Value::Num(n),
                ..
            } => assert_eq!(n, 5_000_000),
            other => panic!("unexpected parse: {other:?}"),
        }
        match parse("time >= 2s").unwrap() {
            Expr::Cmp {
                value: Value::Num(n),
                ..
            } => assert_eq!(n, 2_000_000_000),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_precedence_and_grouping() {
        let symbols = MapSymbolRegistry::new();
        let rec = TraceRecord {
            time: 10,
            calls: 5,
            errors: 0,
            ..Default::default()
        };
        // "or" binds looser than "and": true or (false and false).
        assert!(eval(
            "calls == 5 or calls == 1 and errors > 0",
            &rec,
            &symbols,
            100
        ));
        // Grouping overrides: (true or false) and false.
        assert!(!eval(
            "(calls == 5 or calls == 1) and errors > 0",
            &rec,
            &symbols,
            100
        ));
        assert!(eval("not errors > 0", &rec, &symbols, 100));
    }

    #[test]
    fn test_time_percentage() {
        let symbols = MapSymbolRegistry::new();
        let rec = TraceRecord {
            time: 75,
            ..Default::default()
        };
        assert!(eval("time% >= 75", &rec, &symbols, 100));
        assert!(!eval("time% > 75", &rec, &symbols, 100));
    }

    #[test]
    fn test_string_and_regex_comparisons() {
        let symbols = MapSymbolRegistry::new();
        let class = symbols.symbol_id("com.example.Dao");
        let attr = symbols.symbol_id("URI");
        let mut rec = TraceRecord {
            class_id: class,
            ..Default::default()
        };
        rec.attrs.insert(attr, "/orders/42".to_string());

        assert!(eval("class == 'com.example.Dao'", &rec, &symbols, 100));
        assert!(eval("class ~ 'Dao$'", &rec, &symbols, 100));
        assert!(eval("attr.URI ~ '^/orders/'", &rec, &symbols, 100));
        assert!(!eval("attr.URI == '/users'", &rec, &symbols, 100));
        assert!(eval("exception or attr.URI == '/orders/42'", &rec, &symbols, 100));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(ParseError::UnexpectedEnd)));
        assert!(matches!(
            parse("bogus > 5"),
            Err(ParseError::UnknownField(_))
        ));
        assert!(matches!(
            parse("time > 5parsecs"),
            Err(ParseError::BadNumber(_))
        ));
        assert!(matches!(
            parse("class == 'open"),
            Err(ParseError::UnterminatedString)
        ));
        assert!(matches!(
            parse("time > 5 time"),
            Err(ParseError::UnexpectedToken(_))
        ));
        assert!(matches!(
            parse("class ~ '('"),
            Err(ParseError::BadPattern(_))
        ));
    }

    #[test]
    fn test_tokenizer_rejects_garbage() {
        assert!(matches!(
            parse("time @ 5"),
            Err(ParseError::UnexpectedChar('@', _))
        ));
        assert!(matches!(parse("time = 5"), Err(ParseError::UnexpectedChar('=', _))));
    }
}
