//! Predicate AST - the tagged expression tree predicates are written in
//!
//! A predicate is a closure-like value `|a, m, n| a.shape == (m, n)`:
//! an ordered list of formal parameters plus a body `Expr`. The node
//! kinds form a closed set; every operation a placeholder can record is
//! one of `Attr`, `Index`, `Call`, `Binary` or `Compare`.
//!
//! Trees are built either by [`parse_predicate`](super::parse_predicate)
//! or with the builder functions in this module:
//!
//! ```
//! use dbc_core::parser::ast::{seq, var};
//!
//! let body = var("a").attr("shape").equals(seq([var("m"), var("n")]));
//! assert_eq!(body.to_string(), "a.shape == (m, n)");
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

// ── Operators ─────────────────────────────────────────────

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    BitAnd,
    BitOr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::BitOr => PREC_BITOR,
            BinOp::BitAnd => PREC_BITAND,
            BinOp::Add | BinOp::Sub => PREC_ADD,
            BinOp::Mul => PREC_MUL,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// Everything except `==`. These produce terminal nodes when applied
    /// to a deferred value.
    pub fn is_order(self) -> bool {
        !matches!(self, CmpOp::Eq)
    }
}

/// Methods a value can be asked to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Len,
    ToSet,
    Keys,
    Values,
    Contains,
    IsSubset,
    IsSuperset,
    Union,
    Intersection,
    Difference,
    Abs,
    Sum,
    Min,
    Max,
}

impl Method {
    pub const ALL: [Method; 14] = [
        Method::Len,
        Method::ToSet,
        Method::Keys,
        Method::Values,
        Method::Contains,
        Method::IsSubset,
        Method::IsSuperset,
        Method::Union,
        Method::Intersection,
        Method::Difference,
        Method::Abs,
        Method::Sum,
        Method::Min,
        Method::Max,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Method::Len => "len",
            Method::ToSet => "to_set",
            Method::Keys => "keys",
            Method::Values => "values",
            Method::Contains => "contains",
            Method::IsSubset => "issubset",
            Method::IsSuperset => "issuperset",
            Method::Union => "union",
            Method::Intersection => "intersection",
            Method::Difference => "difference",
            Method::Abs => "abs",
            Method::Sum => "sum",
            Method::Min => "min",
            Method::Max => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<Method> {
        Method::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Number of arguments the method takes
    pub fn arity(self) -> usize {
        match self {
            Method::Contains
            | Method::IsSubset
            | Method::IsSuperset
            | Method::Union
            | Method::Intersection
            | Method::Difference => 1,
            _ => 0,
        }
    }
}

// ── Expression tree ───────────────────────────────────────

/// A predicate body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Lit { value: Value },
    Var { name: String },
    /// Tuple or list literal
    Seq { items: Vec<Expr> },
    SetLit { items: Vec<Expr> },
    Attr { target: Box<Expr>, name: String },
    Index { target: Box<Expr>, index: Box<Expr> },
    Call { target: Box<Expr>, method: Method, args: Vec<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Compare { op: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    And { items: Vec<Expr> },
    Or { items: Vec<Expr> },
    Not { operand: Box<Expr> },
}

pub fn var(name: impl Into<String>) -> Expr {
    Expr::Var { name: name.into() }
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Lit {
        value: value.into(),
    }
}

pub fn seq(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Seq {
        items: items.into_iter().collect(),
    }
}

pub fn set(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::SetLit {
        items: items.into_iter().collect(),
    }
}

pub fn not(operand: Expr) -> Expr {
    Expr::Not {
        operand: Box::new(operand),
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Lit { value }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        lit(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        lit(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        lit(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        lit(value)
    }
}

impl Expr {
    pub fn attr(self, name: impl Into<String>) -> Expr {
        Expr::Attr {
            target: Box::new(self),
            name: name.into(),
        }
    }

    pub fn index(self, index: impl Into<Expr>) -> Expr {
        Expr::Index {
            target: Box::new(self),
            index: Box::new(index.into()),
        }
    }

    pub fn call(self, method: Method, args: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Call {
            target: Box::new(self),
            method,
            args: args.into_iter().collect(),
        }
    }

    pub fn binary(self, op: BinOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn plus(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinOp::Add, rhs)
    }

    pub fn minus(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinOp::Sub, rhs)
    }

    pub fn times(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinOp::Mul, rhs)
    }

    /// `self & rhs`
    pub fn intersect(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinOp::BitAnd, rhs)
    }

    /// `self | rhs`
    pub fn union(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinOp::BitOr, rhs)
    }

    pub fn compare(self, op: CmpOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Compare {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Ge, rhs)
    }

    /// `self && rhs`, flattening nested conjunctions
    pub fn and(self, rhs: Expr) -> Expr {
        let mut items = match self {
            Expr::And { items } => items,
            other => vec![other],
        };
        items.push(rhs);
        Expr::And { items }
    }

    /// `self || rhs`, flattening nested disjunctions
    pub fn or(self, rhs: Expr) -> Expr {
        let mut items = match self {
            Expr::Or { items } => items,
            other => vec![other],
        };
        items.push(rhs);
        Expr::Or { items }
    }

    /// Names referenced anywhere in the expression
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_vars(&mut names);
        names
    }

    fn collect_vars(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Lit { .. } => {}
            Expr::Var { name } => {
                names.insert(name.clone());
            }
            Expr::Seq { items }
            | Expr::SetLit { items }
            | Expr::And { items }
            | Expr::Or { items } => {
                for item in items {
                    item.collect_vars(names);
                }
            }
            Expr::Attr { target, .. } => target.collect_vars(names),
            Expr::Index { target, index } => {
                target.collect_vars(names);
                index.collect_vars(names);
            }
            Expr::Call { target, args, .. } => {
                target.collect_vars(names);
                for arg in args {
                    arg.collect_vars(names);
                }
            }
            Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
                lhs.collect_vars(names);
                rhs.collect_vars(names);
            }
            Expr::Not { operand } => operand.collect_vars(names),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or { .. } => PREC_OR,
            Expr::And { .. } => PREC_AND,
            Expr::Not { .. } => PREC_NOT,
            Expr::Compare { .. } => PREC_CMP,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Lit {
                value: Value::Integer(i),
            } if *i < 0 => PREC_UNARY,
            Expr::Lit {
                value: Value::Float(v),
            } if v.is_sign_negative() => PREC_UNARY,
            Expr::Attr { .. } | Expr::Index { .. } | Expr::Call { .. } => PREC_POSTFIX,
            Expr::Lit { .. } | Expr::Var { .. } | Expr::Seq { .. } | Expr::SetLit { .. } => {
                PREC_PRIMARY
            }
        }
    }
}

// ── Display (canonical source text) ───────────────────────

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_CMP: u8 = 4;
const PREC_BITOR: u8 = 5;
const PREC_BITAND: u8 = 6;
const PREC_ADD: u8 = 7;
const PREC_MUL: u8 = 8;
const PREC_UNARY: u8 = 9;
const PREC_POSTFIX: u8 = 10;
const PREC_PRIMARY: u8 = 11;

struct Prec<'a>(&'a Expr, u8);

impl fmt::Display for Prec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (expr, min) = (self.0, self.1);
        if expr.precedence() < min {
            write!(f, "({})", expr)
        } else {
            write!(f, "{}", expr)
        }
    }
}

fn write_list(f: &mut fmt::Formatter, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_literal(f: &mut fmt::Formatter, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => crate::value::write_quoted(f, s),
        Value::Float(v) => write!(f, "{:?}", v),
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Lit { value } => write_literal(f, value),
            Expr::Var { name } => write!(f, "{}", name),
            Expr::Seq { items } => {
                write!(f, "(")?;
                write_list(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::SetLit { items } => {
                write!(f, "{{")?;
                write_list(f, items)?;
                write!(f, "}}")
            }
            Expr::Attr { target, name } => {
                write!(f, "{}.{}", Prec(target, PREC_POSTFIX), name)
            }
            Expr::Index { target, index } => {
                write!(f, "{}[{}]", Prec(target, PREC_POSTFIX), index)
            }
            Expr::Call {
                target,
                method,
                args,
            } => {
                write!(f, "{}.{}(", Prec(target, PREC_POSTFIX), method.name())?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                write!(
                    f,
                    "{} {} {}",
                    Prec(lhs, prec),
                    op.symbol(),
                    Prec(rhs, prec + 1)
                )
            }
            Expr::Compare { op, lhs, rhs } => write!(
                f,
                "{} {} {}",
                Prec(lhs, PREC_CMP + 1),
                op.symbol(),
                Prec(rhs, PREC_CMP + 1)
            ),
            Expr::And { items } => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    write!(f, "{}", Prec(item, PREC_AND + 1))?;
                }
                Ok(())
            }
            Expr::Or { items } => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{}", Prec(item, PREC_OR + 1))?;
                }
                Ok(())
            }
            Expr::Not { operand } => write!(f, "!{}", Prec(operand, PREC_NOT)),
        }
    }
}

// ── Predicates ────────────────────────────────────────────

/// A boolean condition over named logical values, attached to one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Formal parameters, in declaration order
    pub params: Vec<String>,
    pub body: Expr,
}

impl Predicate {
    pub fn new<I, S>(params: I, body: Expr) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate {
            params: params.into_iter().map(Into::into).collect(),
            body,
        }
    }

    /// Parse closure syntax: `|a, m| a.shape[0] == m`
    pub fn parse(text: &str) -> crate::Result<Self> {
        super::parse_predicate(text)
    }

    pub fn requires(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }

    /// Names used in the body that are not declared parameters
    pub fn undeclared_names(&self) -> Vec<String> {
        self.body
            .free_vars()
            .into_iter()
            .filter(|name| !self.requires(name))
            .collect()
    }

    /// Declared parameters the body never reads
    pub fn unused_params(&self) -> Vec<String> {
        let used = self.body.free_vars();
        self.params
            .iter()
            .filter(|p| !used.contains(*p))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "|| {}", self.body)
        } else {
            write!(f, "|{}| {}", self.params.join(", "), self.body)
        }
    }
}

impl std::str::FromStr for Predicate {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Predicate::parse(s)
    }
}
