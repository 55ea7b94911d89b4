//! Runtime values predicates operate on
//!
//! `Value` is the dynamic data model of a contracted call: arguments,
//! return values, derived variables and everything a predicate computes
//! along the way. Arrays double as tuples (a shape `(3, 2)` is
//! `Array([3, 2])`) and objects carry attributes (`{"shape": [3, 2]}`).
//!
//! # Ordering
//!
//! `Value` is totally ordered so it can live in a `BTreeSet`. Variants
//! rank `Null < Boolean < number < String < Array < Set < Object`;
//! integers and floats compare numerically with each other, so `2 == 2.0`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::parser::ast::{BinOp, CmpOp, Method};
use crate::{Error, Result, Site};

/// A typed runtime value
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Tuples and lists
    Array(Vec<Value>),
    Set(BTreeSet<Value>),
    /// Ordered map (BTreeMap for deterministic iteration)
    Object(BTreeMap<String, Value>),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn write_items<'a>(
            f: &mut std::fmt::Formatter<'_>,
            items: impl Iterator<Item = &'a Value>,
        ) -> std::fmt::Result {
            for (i, v) in items.enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", v)?;
            }
            Ok(())
        }

        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::String(s) => write_quoted(f, s),
            Value::Array(arr) => {
                write!(f, "[")?;
                write_items(f, arr.iter())?;
                write!(f, "]")
            }
            Value::Set(set) => {
                write!(f, "{{")?;
                write_items(f, set.iter())?;
                write!(f, "}}")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_quoted(f, k)?;
                    write!(f, ": {}", v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Write `s` as a double-quoted literal the tokenizer reads back unchanged
pub(crate) fn write_quoted(f: &mut std::fmt::Formatter<'_>, s: &str) -> std::fmt::Result {
    use std::fmt::Write;
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

// ── Equality & ordering ───────────────────────────────────

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Set(_) => 5,
            Value::Object(_) => 6,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            // -0.0 and 0.0 both equal Integer(0), so they must equal each other
            (Value::Float(a), Value::Float(b)) if a == b => Ordering::Equal,
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Exact ordering of an integer against a float, without rounding the
/// integer through `f64`. NaN sorts like `total_cmp` places it.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    // 2^63; every finite float at or beyond it is out of i64 range
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let whole = f.trunc();
    if whole >= LIMIT {
        return Ordering::Less;
    }
    if whole < -LIMIT {
        return Ordering::Greater;
    }
    match (i as i128).cmp(&(whole as i128)) {
        Ordering::Equal => {
            let frac = f - whole;
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

// ── Conversions ───────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeSet<Value>> for Value {
    fn from(items: BTreeSet<Value>) -> Self {
        Value::Set(items)
    }
}

impl Value {
    /// Array of integers, the usual representation of a shape
    pub fn ints(items: impl IntoIterator<Item = i64>) -> Self {
        Value::Array(items.into_iter().map(Value::Integer).collect())
    }

    /// Set built from any values
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(items.into_iter().collect())
    }

    /// Object with the given attributes
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Check if value is "truthy" for condition evaluation
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Set(s) => !s.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Set(_) => "Set",
            Value::Object(_) => "Object",
        }
    }

    /// Convert from serde_json::Value (deterministic - uses BTreeMap)
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to serde_json::Value. Sets become arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::json!(*i),
            Value::Float(f) => serde_json::json!(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(|v| v.to_json()).collect()),
            Value::Set(set) => serde_json::Value::Array(set.iter().map(|v| v.to_json()).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Both operands as numbers when at least one is a boolean
    fn promote_bools(&self, rhs: &Value) -> Option<(Value, Value)> {
        fn number(v: &Value) -> Option<Value> {
            match v {
                Value::Boolean(b) => Some(Value::Integer(i64::from(*b))),
                Value::Integer(_) | Value::Float(_) => Some(v.clone()),
                _ => None,
            }
        }
        if !matches!(self, Value::Boolean(_)) && !matches!(rhs, Value::Boolean(_)) {
            return None;
        }
        Some((number(self)?, number(rhs)?))
    }

    fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Elements of a collection viewed as a set
    fn to_set(&self) -> Option<BTreeSet<Value>> {
        match self {
            Value::Array(items) => Some(items.iter().cloned().collect()),
            Value::Set(items) => Some(items.clone()),
            Value::Object(map) => Some(map.keys().cloned().map(Value::String).collect()),
            Value::String(s) => Some(s.chars().map(|c| Value::String(c.to_string())).collect()),
            _ => None,
        }
    }
}

fn unsupported(message: String) -> Error {
    Error::definition(Site::contract(), message)
}

// ── Chain operations ──────────────────────────────────────

impl Value {
    /// Attribute access (`value.name`)
    pub fn attr(&self, name: &str) -> Result<Value> {
        match self {
            Value::Object(map) => map.get(name).cloned().ok_or_else(|| {
                unsupported(format!("object has no attribute `{}`", name))
            }),
            other => Err(unsupported(format!(
                "'{}' has no attribute `{}`",
                other.type_name(),
                name
            ))),
        }
    }

    /// Indexing (`value[index]`); negative integers count from the end
    pub fn index(&self, index: &Value) -> Result<Value> {
        fn position(len: usize, i: i64) -> Option<usize> {
            let len = i64::try_from(len).ok()?;
            let pos = if i < 0 { len + i } else { i };
            if (0..len).contains(&pos) {
                usize::try_from(pos).ok()
            } else {
                None
            }
        }

        match (self, index) {
            (Value::Array(items), Value::Integer(i)) => position(items.len(), *i)
                .map(|p| items[p].clone())
                .ok_or_else(|| unsupported(format!("index {} out of range", i))),
            (Value::String(s), Value::Integer(i)) => {
                let chars: Vec<char> = s.chars().collect();
                position(chars.len(), *i)
                    .map(|p| Value::String(chars[p].to_string()))
                    .ok_or_else(|| unsupported(format!("index {} out of range", i)))
            }
            (Value::Object(map), Value::String(key)) => map
                .get(key)
                .cloned()
                .ok_or_else(|| unsupported(format!("key \"{}\" not found", key))),
            (target, index) => Err(unsupported(format!(
                "'{}' cannot be indexed by '{}'",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    /// Method call (`value.method(args)`)
    pub fn call(&self, method: Method, args: &[Value]) -> Result<Value> {
        if args.len() != method.arity() {
            return Err(unsupported(format!(
                "`{}` takes {} argument(s), got {}",
                method.name(),
                method.arity(),
                args.len()
            )));
        }
        let not_supported = || {
            unsupported(format!(
                "'{}' does not support `{}`",
                self.type_name(),
                method.name()
            ))
        };
        let set_arg = |arg: &Value| {
            arg.to_set().ok_or_else(|| {
                unsupported(format!(
                    "`{}` expects a collection, got '{}'",
                    method.name(),
                    arg.type_name()
                ))
            })
        };

        match method {
            Method::Len => {
                let len = match self {
                    Value::Array(a) => a.len(),
                    Value::Set(s) => s.len(),
                    Value::Object(o) => o.len(),
                    Value::String(s) => s.chars().count(),
                    _ => return Err(not_supported()),
                };
                i64::try_from(len)
                    .map(Value::Integer)
                    .map_err(|_| unsupported("length overflows Integer".into()))
            }
            Method::ToSet => self.to_set().map(Value::Set).ok_or_else(not_supported),
            Method::Keys => match self {
                Value::Object(map) => Ok(Value::Array(
                    map.keys().cloned().map(Value::String).collect(),
                )),
                _ => Err(not_supported()),
            },
            Method::Values => match self {
                Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
                _ => Err(not_supported()),
            },
            Method::Contains => {
                let needle = &args[0];
                match (self, needle) {
                    (Value::Array(items), _) => Ok(Value::Boolean(items.contains(needle))),
                    (Value::Set(items), _) => Ok(Value::Boolean(items.contains(needle))),
                    (Value::Object(map), Value::String(key)) => {
                        Ok(Value::Boolean(map.contains_key(key)))
                    }
                    (Value::String(s), Value::String(sub)) => {
                        Ok(Value::Boolean(s.contains(sub.as_str())))
                    }
                    _ => Err(not_supported()),
                }
            }
            Method::IsSubset | Method::IsSuperset => {
                let own = self.to_set().ok_or_else(not_supported)?;
                let other = set_arg(&args[0])?;
                Ok(Value::Boolean(if method == Method::IsSubset {
                    own.is_subset(&other)
                } else {
                    own.is_superset(&other)
                }))
            }
            Method::Union | Method::Intersection | Method::Difference => {
                let own = self.to_set().ok_or_else(not_supported)?;
                let other = set_arg(&args[0])?;
                let result: BTreeSet<Value> = match method {
                    Method::Union => own.union(&other).cloned().collect(),
                    Method::Intersection => own.intersection(&other).cloned().collect(),
                    _ => own.difference(&other).cloned().collect(),
                };
                Ok(Value::Set(result))
            }
            Method::Abs => match self {
                Value::Integer(i) => i
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or_else(|| unsupported("integer overflow in `abs`".into())),
                Value::Float(v) => Ok(Value::Float(v.abs())),
                _ => Err(not_supported()),
            },
            Method::Sum => {
                let items: Vec<&Value> = match self {
                    Value::Array(a) => a.iter().collect(),
                    Value::Set(s) => s.iter().collect(),
                    _ => return Err(not_supported()),
                };
                items
                    .into_iter()
                    .try_fold(Value::Integer(0), |acc, item| acc.binary(BinOp::Add, item))
            }
            Method::Min | Method::Max => {
                let mut items: Box<dyn Iterator<Item = &Value>> = match self {
                    Value::Array(a) => Box::new(a.iter()),
                    Value::Set(s) => Box::new(s.iter()),
                    _ => return Err(not_supported()),
                };
                let picked = if method == Method::Min {
                    items.by_ref().min()
                } else {
                    items.by_ref().max()
                };
                picked
                    .cloned()
                    .ok_or_else(|| unsupported(format!("`{}` of an empty collection", method.name())))
            }
        }
    }

    /// Binary operator (`self op rhs`)
    ///
    /// Booleans count as 0 and 1 next to numbers; `&` and `|` between two
    /// booleans stay logical.
    pub fn binary(&self, op: BinOp, rhs: &Value) -> Result<Value> {
        let logical = matches!(op, BinOp::BitAnd | BinOp::BitOr)
            && matches!((self, rhs), (Value::Boolean(_), Value::Boolean(_)));
        if !logical {
            if let Some((a, b)) = self.promote_bools(rhs) {
                return a.binary(op, &b);
            }
        }
        let overflow = || unsupported(format!("integer overflow in `{}`", op.symbol()));
        let result = match (op, self, rhs) {
            (BinOp::Add, Value::Integer(a), Value::Integer(b)) => {
                Value::Integer(a.checked_add(*b).ok_or_else(overflow)?)
            }
            (BinOp::Sub, Value::Integer(a), Value::Integer(b)) => {
                Value::Integer(a.checked_sub(*b).ok_or_else(overflow)?)
            }
            (BinOp::Mul, Value::Integer(a), Value::Integer(b)) => {
                Value::Integer(a.checked_mul(*b).ok_or_else(overflow)?)
            }
            (BinOp::Add | BinOp::Sub | BinOp::Mul, a, b) if a.is_number() && b.is_number() => {
                let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                Value::Float(match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    _ => x * y,
                })
            }
            (BinOp::Add, Value::String(a), Value::String(b)) => Value::String(format!("{}{}", a, b)),
            (BinOp::Add, Value::Array(a), Value::Array(b)) => {
                Value::Array(a.iter().chain(b.iter()).cloned().collect())
            }
            (BinOp::Sub, Value::Set(a), Value::Set(b)) => {
                Value::Set(a.difference(b).cloned().collect())
            }
            (BinOp::BitAnd, Value::Set(a), Value::Set(b)) => {
                Value::Set(a.intersection(b).cloned().collect())
            }
            (BinOp::BitOr, Value::Set(a), Value::Set(b)) => {
                Value::Set(a.union(b).cloned().collect())
            }
            (BinOp::BitAnd, Value::Boolean(a), Value::Boolean(b)) => Value::Boolean(*a & *b),
            (BinOp::BitOr, Value::Boolean(a), Value::Boolean(b)) => Value::Boolean(*a | *b),
            (BinOp::BitAnd, Value::Integer(a), Value::Integer(b)) => Value::Integer(a & b),
            (BinOp::BitOr, Value::Integer(a), Value::Integer(b)) => Value::Integer(a | b),
            (op, a, b) => {
                return Err(unsupported(format!(
                    "unsupported operand types for {}: '{}' and '{}'",
                    op.symbol(),
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
        Ok(result)
    }

    /// Comparison (`self op rhs`). Sets compare by inclusion.
    pub fn compare(&self, op: CmpOp, rhs: &Value) -> Result<bool> {
        if !matches!(op, CmpOp::Eq | CmpOp::Ne) {
            if let Some((a, b)) = self.promote_bools(rhs) {
                return a.compare(op, &b);
            }
        }
        let ordering = match (op, self, rhs) {
            (CmpOp::Eq, a, b) => return Ok(a == b),
            (CmpOp::Ne, a, b) => return Ok(a != b),
            (_, Value::Set(a), Value::Set(b)) => {
                return Ok(match op {
                    CmpOp::Lt => a.len() < b.len() && a.is_subset(b),
                    CmpOp::Le => a.is_subset(b),
                    CmpOp::Gt => a.len() > b.len() && a.is_superset(b),
                    _ => a.is_superset(b),
                });
            }
            (_, a, b) if a.is_number() && b.is_number() => a.cmp(b),
            (_, Value::String(_), Value::String(_))
            | (_, Value::Array(_), Value::Array(_))
            | (_, Value::Boolean(_), Value::Boolean(_)) => self.cmp(rhs),
            (op, a, b) => {
                return Err(unsupported(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
        Ok(match op {
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Model ──────────────────────────────────────────

    #[test]
    fn test_value_from_json_collections() {
        let json = serde_json::json!({"shape": [3, 2], "name": "a", "scale": 0.5});
        let value = Value::from_json(&json);
        assert_eq!(value.attr("shape").unwrap(), Value::ints([3, 2]));
        assert_eq!(value.attr("name").unwrap(), Value::from("a"));
        assert_eq!(value.attr("scale").unwrap(), Value::Float(0.5));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_value_is_truthy() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(3).is_truthy());
        assert!(!Value::set([]).is_truthy());
        assert!(Value::ints([1]).is_truthy());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::ints([3, 4]).to_string(), "[3, 4]");
        assert_eq!(Value::set([Value::from(2), Value::from(1)]).to_string(), "{1, 2}");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::from("x").to_string(), "\"x\"");
    }

    #[test]
    fn test_numeric_equality_across_types() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert!(Value::Integer(2) < Value::Float(2.5));
        assert_ne!(Value::Integer(1), Value::Boolean(true));
        let set = Value::set([Value::Integer(2), Value::Float(2.0)]);
        assert_eq!(set.call(Method::Len, &[]).unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_mixed_numeric_comparison_is_exact() {
        let big = 1i64 << 53;
        let float = Value::Float(big as f64);
        assert_ne!(Value::Integer(big + 1), float);
        assert!(Value::Integer(big + 1) > float);
        assert_eq!(Value::Integer(big), float);
        assert!(float < Value::Integer(big + 1));
        assert!(Value::Integer(i64::MAX) < Value::Float(9.3e18));
        assert!(Value::Integer(i64::MIN) > Value::Float(f64::NEG_INFINITY));
        assert!(Value::Integer(i64::MAX) < Value::Float(f64::INFINITY));
        assert!(Value::Integer(-3) < Value::Float(-2.5));
        assert!(Value::Integer(-2) > Value::Float(-2.5));
        assert_eq!(Value::Integer(0), Value::Float(-0.0));
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));

        let set = Value::set([Value::Integer(big + 1), Value::Float(big as f64), Value::Integer(big)]);
        assert_eq!(set.call(Method::Len, &[]).unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_rebinding_near_float_precision_is_ambiguous() {
        let mut env = crate::env::Environment::new();
        let big = 1i64 << 53;
        env.bind("m", Value::Integer(big + 1)).unwrap();
        let err = env.bind("m", Value::Float(big as f64)).unwrap_err();
        assert!(err.is_violation());
    }

    #[test]
    fn test_string_display_escapes() {
        assert_eq!(Value::from("a\"b").to_string(), r#""a\"b""#);
        assert_eq!(Value::from("a\\b\n\t").to_string(), r#""a\\b\n\t""#);
        let record = Value::record([("k\"", Value::from("v"))]);
        assert_eq!(record.to_string(), r#"{"k\"": "v"}"#);
    }

    #[test]
    fn test_booleans_count_as_integers_next_to_numbers() {
        let t = Value::Boolean(true);
        assert_eq!(t.binary(BinOp::Add, &Value::Integer(1)).unwrap(), Value::Integer(2));
        assert_eq!(t.binary(BinOp::Add, &t).unwrap(), Value::Integer(2));
        assert_eq!(Value::Float(0.5).binary(BinOp::Mul, &t).unwrap(), Value::Float(0.5));
        assert_eq!(t.binary(BinOp::BitAnd, &Value::Boolean(false)).unwrap(), Value::Boolean(false));
        assert_eq!(t.binary(BinOp::BitAnd, &Value::Integer(3)).unwrap(), Value::Integer(1));
        assert!(t.compare(CmpOp::Lt, &Value::Integer(2)).unwrap());
        assert!(Value::Boolean(false).compare(CmpOp::Ge, &Value::Float(0.0)).unwrap());
        // equality stays type-strict
        assert!(!t.compare(CmpOp::Eq, &Value::Integer(1)).unwrap());
        assert!(t.compare(CmpOp::Gt, &Value::from("a")).is_err());
    }

    // ── Chain operations ───────────────────────────────

    #[test]
    fn test_index_negative_and_out_of_range() {
        let m = Value::ints([1, 2, 3, 2]);
        assert_eq!(m.index(&Value::Integer(-1)).unwrap(), Value::Integer(2));
        assert_eq!(m.index(&Value::Integer(0)).unwrap(), Value::Integer(1));
        assert!(m.index(&Value::Integer(4)).is_err());
        assert!(m.index(&Value::Integer(-5)).is_err());
        assert!(m.index(&Value::from("a")).is_err());
    }

    #[test]
    fn test_attr_on_non_object_is_definition_error() {
        let err = Value::Integer(1).attr("shape").unwrap_err();
        assert!(err.is_definition_error());
        assert!(err.to_string().contains("has no attribute `shape`"));
    }

    #[test]
    fn test_set_operators() {
        let m = Value::set([1, 2, 3].map(Value::from));
        let one = Value::set([Value::from(1)]);
        assert_eq!(
            m.binary(BinOp::Sub, &one).unwrap(),
            Value::set([2, 3].map(Value::from))
        );
        assert_eq!(
            Value::set([4].map(Value::from)).binary(BinOp::BitOr, &m).unwrap(),
            Value::set([1, 2, 3, 4].map(Value::from))
        );
        assert_eq!(
            m.binary(BinOp::BitAnd, &one).unwrap(),
            one
        );
    }

    #[test]
    fn test_set_comparisons_are_inclusion() {
        let m = Value::set([1, 2, 3].map(Value::from));
        let bigger = Value::set([1, 2, 3, 4].map(Value::from));
        let smaller = Value::set([1, 2].map(Value::from));
        assert!(m.compare(CmpOp::Lt, &bigger).unwrap());
        assert!(m.compare(CmpOp::Gt, &smaller).unwrap());
        assert!(m.compare(CmpOp::Le, &m).unwrap());
        assert!(!m.compare(CmpOp::Lt, &m).unwrap());
        let disjoint = Value::set([9].map(Value::from));
        assert!(!m.compare(CmpOp::Ge, &disjoint).unwrap());
    }

    #[test]
    fn test_arithmetic() {
        let two = Value::Integer(2);
        assert_eq!(two.binary(BinOp::Add, &Value::Integer(3)).unwrap(), Value::Integer(5));
        assert_eq!(two.binary(BinOp::Mul, &Value::Float(1.5)).unwrap(), Value::Float(3.0));
        assert!(Value::Integer(i64::MAX).binary(BinOp::Add, &Value::Integer(1)).is_err());
        assert_eq!(
            Value::ints([1]).binary(BinOp::Add, &Value::ints([2])).unwrap(),
            Value::ints([1, 2])
        );
    }

    #[test]
    fn test_unsupported_comparison_message() {
        let err = Value::ints([1]).compare(CmpOp::Gt, &Value::Integer(2)).unwrap_err();
        assert!(
            err.to_string()
                .contains("'>' not supported between instances of 'Array' and 'Integer'"),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_methods() {
        let columns = Value::Array(vec!["A".into(), "B".into(), "C".into()]);
        let c = Value::set([Value::from("B"), Value::from("C")]);
        assert_eq!(
            c.call(Method::IsSubset, &[columns.clone()]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(columns.call(Method::Len, &[]).unwrap(), Value::Integer(3));
        assert_eq!(Value::ints([3, 1, 2]).call(Method::Max, &[]).unwrap(), Value::Integer(3));
        assert_eq!(Value::ints([3, 1, 2]).call(Method::Sum, &[]).unwrap(), Value::Integer(6));
        assert!(Value::ints([]).call(Method::Min, &[]).is_err());
        assert!(Value::Integer(1).call(Method::Len, &[]).is_err());
        let record = Value::record([("a", Value::Integer(1))]);
        assert_eq!(
            record.call(Method::Keys, &[]).unwrap(),
            Value::Array(vec!["a".into()])
        );
    }
}
