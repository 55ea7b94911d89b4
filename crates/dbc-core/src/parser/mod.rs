//! Predicate parser - tokenizer, AST types, and recursive descent parser
//!
//! Converts predicate text such as `|x, m, n| x.shape == (m, n) && m > 2`
//! into a [`Predicate`](ast::Predicate).
//!
//! Grammar, lowest to highest precedence:
//!
//! ```text
//! predicate  := "|" params? "|" expr | "||" expr
//! expr       := or
//! or         := and (("||" | "or") and)*
//! and        := not (("&&" | "and") not)*
//! not        := ("!" | "not") not | comparison
//! comparison := bitor (("==" | "!=" | "<" | "<=" | ">" | ">=") bitor)?
//! bitor      := bitand ("|" bitand)*
//! bitand     := additive ("&" additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary ("*" unary)*
//! unary      := "-" unary | postfix
//! postfix    := primary ("." ident ("(" args ")")? | "[" expr "]")*
//! primary    := literal | ident | "(" tuple ")" | "[" list "]" | "{" set "}"
//! ```

pub mod ast;
pub mod tokenizer;

use ast::{BinOp, CmpOp, Expr, Method, Predicate};
use tokenizer::{SpannedToken, Token, Tokenizer};

use crate::value::Value;
use crate::{Error, Result};

/// Parse closure-syntax predicate text
///
/// # Errors
/// Returns `ParseError` with line:column for syntax violations.
///
/// # Example
/// ```
/// let p = dbc_core::parser::parse_predicate("|b, m| b.shape == (m, 3)").unwrap();
/// assert_eq!(p.params, vec!["b", "m"]);
/// ```
pub fn parse_predicate(input: &str) -> Result<Predicate> {
    let tokens = Tokenizer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let predicate = parser.parse_predicate()?;
    parser.expect_eof()?;
    Ok(predicate)
}

/// Parse a bare expression (no parameter list)
pub fn parse_expr(input: &str) -> Result<Expr> {
    let tokens = Tokenizer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

static EOF: Token = Token::Eof;

struct Parser {
    tokens: Vec<SpannedToken>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser {
            tokens,
            position: 0,
        }
    }

    // ── Cursor helpers ─────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|t| &t.token)
            .unwrap_or(&EOF)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl std::fmt::Display) -> Error {
        match self.tokens.get(self.position) {
            Some(t) => Error::ParseError(format!("{} at {}, found '{}'", message, t.span, t.token)),
            None => Error::ParseError(format!("{} at end of input", message)),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error_here(format!("Expected '{}'", expected)))
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            _ => Err(self.error_here("Unexpected trailing input")),
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(format!("Expected {}", what))),
        }
    }

    // ── Predicate header ───────────────────────────────────

    fn parse_predicate(&mut self) -> Result<Predicate> {
        let mut params = Vec::new();
        if !self.eat(&Token::OrOr) {
            self.expect(Token::Pipe)?;
            if !self.eat(&Token::Pipe) {
                loop {
                    let name = self.expect_identifier("parameter name")?;
                    if params.contains(&name) {
                        return Err(Error::ParseError(format!(
                            "Duplicate predicate parameter `{}`",
                            name
                        )));
                    }
                    params.push(name);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::Pipe)?;
            }
        }
        let body = self.parse_expr()?;
        Ok(Predicate { params, body })
    }

    // ── Expressions ────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        let mut items = vec![first];
        while self.eat(&Token::OrOr) || self.eat(&Token::Or) {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or { items }
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_not()?;
        let mut items = vec![first];
        while self.eat(&Token::AndAnd) || self.eat(&Token::And) {
            items.push(self.parse_not()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And { items }
        })
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) || self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(ast::not(operand));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_binary(0)?;
        let op = match self.peek() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::Ne,
            Token::Less => CmpOp::Lt,
            Token::LessEq => CmpOp::Le,
            Token::Greater => CmpOp::Gt,
            Token::GreaterEq => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_binary(0)?;
        if matches!(
            self.peek(),
            Token::EqEq
                | Token::NotEq
                | Token::Less
                | Token::LessEq
                | Token::Greater
                | Token::GreaterEq
        ) {
            return Err(self.error_here("Comparisons cannot be chained; use '&&'"));
        }
        Ok(lhs.compare(op, rhs))
    }

    /// Left-associative binary levels: `|`, `&`, `+ -`, `*`
    fn parse_binary(&mut self, level: usize) -> Result<Expr> {
        if level == BINARY_LEVELS {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(level + 1)?;
        while let Some(op) = binary_op(level, self.peek()) {
            self.advance();
            let rhs = self.parse_binary(level + 1)?;
            lhs = lhs.binary(op, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(match operand {
                Expr::Lit {
                    value: Value::Integer(i),
                } => ast::lit(-i),
                Expr::Lit {
                    value: Value::Float(v),
                } => ast::lit(-v),
                other => ast::lit(0).minus(other),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_identifier("attribute or method name")?;
                if self.eat(&Token::LParen) {
                    let method = Method::from_name(&name).ok_or_else(|| {
                        Error::ParseError(format!("Unknown method `{}`", name))
                    })?;
                    let args = self.parse_list(Token::RParen)?;
                    if args.len() != method.arity() {
                        return Err(Error::ParseError(format!(
                            "Method `{}` takes {} argument(s), got {}",
                            name,
                            method.arity(),
                            args.len()
                        )));
                    }
                    expr = expr.call(method, args);
                } else {
                    expr = expr.attr(name);
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                expr = expr.index(index);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            Token::IntegerLiteral(i) => {
                self.advance();
                Ok(ast::lit(i))
            }
            Token::FloatLiteral(v) => {
                self.advance();
                Ok(ast::lit(v))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(ast::lit(s))
            }
            Token::BooleanLiteral(b) => {
                self.advance();
                Ok(ast::lit(b))
            }
            Token::Null => {
                self.advance();
                Ok(ast::lit(Value::Null))
            }
            Token::Identifier(name) => {
                self.advance();
                Ok(ast::var(name))
            }
            Token::LParen => {
                self.advance();
                if self.eat(&Token::RParen) {
                    return Ok(fold_seq(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(&Token::RParen) {
                    // Grouping
                    return Ok(first);
                }
                self.expect(Token::Comma)?;
                let mut items = vec![first];
                items.extend(self.parse_list(Token::RParen)?);
                Ok(fold_seq(items))
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_list(Token::RBracket)?;
                Ok(fold_seq(items))
            }
            Token::LBrace => {
                self.advance();
                let items = self.parse_list(Token::RBrace)?;
                Ok(fold_set(items))
            }
            _ => Err(self.error_here("Expected expression")),
        }
    }

    /// Comma-separated expressions up to `close` (consumed). Allows a
    /// trailing comma.
    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }
}

const BINARY_LEVELS: usize = 4;

fn binary_op(level: usize, token: &Token) -> Option<BinOp> {
    match (level, token) {
        (0, Token::Pipe) => Some(BinOp::BitOr),
        (1, Token::Ampersand) => Some(BinOp::BitAnd),
        (2, Token::Plus) => Some(BinOp::Add),
        (2, Token::Minus) => Some(BinOp::Sub),
        (3, Token::Star) => Some(BinOp::Mul),
        _ => None,
    }
}

/// Literal-only sequences become a single literal value
fn fold_seq(items: Vec<Expr>) -> Expr {
    match literal_values(&items) {
        Some(values) => ast::lit(Value::Array(values)),
        None => Expr::Seq { items },
    }
}

fn fold_set(items: Vec<Expr>) -> Expr {
    match literal_values(&items) {
        Some(values) => ast::lit(Value::Set(values.into_iter().collect())),
        None => Expr::SetLit { items },
    }
}

fn literal_values(items: &[Expr]) -> Option<Vec<Value>> {
    items
        .iter()
        .map(|item| match item {
            Expr::Lit { value } => Some(value.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::ast::{lit, seq, var};
    use super::*;

    fn body(text: &str) -> Expr {
        parse_predicate(text).unwrap().body
    }

    // ── Headers ────────────────────────────────────────

    #[test]
    fn test_parse_params() {
        let p = parse_predicate("|a, m, n| a.shape == (m, n)").unwrap();
        assert_eq!(p.params, vec!["a", "m", "n"]);
        assert_eq!(
            p.body,
            var("a").attr("shape").equals(seq([var("m"), var("n")]))
        );
    }

    #[test]
    fn test_parse_empty_params() {
        let p = parse_predicate("|| true").unwrap();
        assert!(p.params.is_empty());
        assert_eq!(p.body, lit(true));

        let p = parse_predicate("| | 1 == 1").unwrap();
        assert!(p.params.is_empty());
    }

    #[test]
    fn test_parse_duplicate_param_rejected() {
        let err = parse_predicate("|a, a| a == 1").unwrap_err();
        assert!(err.to_string().contains("Duplicate"), "got: {}", err);
    }

    #[test]
    fn test_parse_missing_header_rejected() {
        let err = parse_predicate("a == 1").unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    // ── Precedence ─────────────────────────────────────

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        assert_eq!(
            body("|a, b, c| a || b && c"),
            var("a").or(var("b").and(var("c")))
        );
        assert_eq!(
            body("|a, b, c| a or b and c"),
            var("a").or(var("b").and(var("c")))
        );
    }

    #[test]
    fn test_parse_comparison_below_set_ops() {
        assert_eq!(
            body("|a, b| a & b != {}"),
            var("a").intersect(var("b")).not_equals(lit(Value::Set(Default::default())))
        );
        assert_eq!(
            body("|m| m | {5} > {1, 2}"),
            var("m")
                .union(lit(Value::Set([Value::Integer(5)].into_iter().collect())))
                .gt(lit(Value::Set(
                    [Value::Integer(1), Value::Integer(2)].into_iter().collect()
                )))
        );
    }

    #[test]
    fn test_parse_arithmetic_left_assoc() {
        assert_eq!(
            body("|a, b, c| a - b - c == 0"),
            var("a").minus(var("b")).minus(var("c")).equals(0)
        );
        assert_eq!(
            body("|a, b, c| a + b * c == 0"),
            var("a").plus(var("b").times(var("c"))).equals(0)
        );
    }

    #[test]
    fn test_parse_chained_comparison_rejected() {
        let err = parse_predicate("|a| 1 < a < 3").unwrap_err();
        assert!(err.to_string().contains("chained"), "got: {}", err);
    }

    #[test]
    fn test_parse_not() {
        assert_eq!(body("|a| !a == 1"), ast::not(var("a").equals(1)));
        assert_eq!(body("|a| not a"), ast::not(var("a")));
    }

    // ── Postfix & primaries ────────────────────────────

    #[test]
    fn test_parse_postfix_chain() {
        assert_eq!(
            body("|x| x.shape[-1].abs() > 2"),
            var("x")
                .attr("shape")
                .index(-1)
                .call(Method::Abs, [])
                .gt(2)
        );
    }

    #[test]
    fn test_parse_method_arity_checked() {
        let err = parse_predicate("|c| c.issubset()").unwrap_err();
        assert!(err.to_string().contains("takes 1 argument"), "got: {}", err);
        let err = parse_predicate("|c| c.explode()").unwrap_err();
        assert!(err.to_string().contains("Unknown method"), "got: {}", err);
    }

    #[test]
    fn test_parse_literal_folding() {
        assert_eq!(
            body("|m| m == [1, 2, 3]"),
            var("m").equals(lit(Value::Array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3)
            ])))
        );
        assert_eq!(body("|m| m == (m,)"), var("m").equals(seq([var("m")])));
        assert_eq!(body("|m| (m) == 1"), var("m").equals(1));
    }

    #[test]
    fn test_parse_negative_literals() {
        assert_eq!(body("|x| x[-2] > -1.5"), var("x").index(-2).gt(-1.5));
        assert_eq!(body("|x| -x == 0"), lit(0).minus(var("x")).equals(0));
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = parse_predicate("|x| x.shape ==").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Expected expression"), "got: {}", msg);
        assert!(msg.contains("1:15"), "got: {}", msg);
    }

    // ── Display round trip ─────────────────────────────

    #[test]
    fn test_display_reparses_to_same_tree() {
        let sources = [
            "|a, m, n| a.shape == (m, n)",
            "|x, n, o| x.shape == (n, o) && m < o",
            "|x, c| c == {\"C\", \"B\"}",
            "|first, a| a == first.columns.to_set()",
            "|x, m, n, o| x.shape == (m + n, o)",
            "|a, b| a & b != {}",
            "|m| m[-2] > 2 || !(m == [1, 2])",
            "|x| (x - 1) * 2 >= 0",
        ];
        for src in sources {
            let first = parse_predicate(src).unwrap();
            let rendered = first.to_string();
            let second = parse_predicate(&rendered).unwrap();
            assert_eq!(first, second, "round trip of {} via {}", src, rendered);
        }
    }

    #[test]
    fn test_display_escapes_string_literals() {
        let first = parse_predicate(r#"|m| m == ["a\"b", "c\\d"] && m[0] != "\n""#).unwrap();
        let rendered = first.to_string();
        assert_eq!(rendered, r#"|m| m == ["a\"b", "c\\d"] && m[0] != "\n""#);
        assert_eq!(parse_predicate(&rendered).unwrap(), first);
    }

    fn quoted(s: &str) -> String {
        let mut out = String::from("\"");
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }

    proptest::proptest! {
        #[test]
        fn prop_string_literals_survive_display(
            inner in "[a-z \"\\\\\n\t]{0,6}",
            outer in "[a-z \"\\\\\n\t]{0,6}",
            n in 0i64..100,
        ) {
            let src = format!("|m| m == [{}, {}] && m[0] == {}", quoted(&inner), n, quoted(&outer));
            let first = parse_predicate(&src).unwrap();
            let rendered = first.to_string();
            let second = parse_predicate(&rendered).unwrap();
            proptest::prop_assert_eq!(&first, &second);
            proptest::prop_assert_eq!(
                first.body,
                var("m")
                    .equals(lit(Value::Array(vec![Value::String(inner), Value::Integer(n)])))
                    .and(var("m").index(0).equals(lit(Value::String(outer))))
            );
        }
    }

    #[test]
    fn test_parse_determinism_100_iterations() {
        let src = "|x, m, n| x.shape == (m, n) && m > 2";
        let first = parse_predicate(src).unwrap();
        for i in 0..100 {
            assert_eq!(first, parse_predicate(src).unwrap(), "iteration {}", i);
        }
    }
}
