//! Symbols - placeholders that bind themselves through equality
//!
//! A `SymbolTable` holds the symbols of one predicate invocation.
//! Comparing a symbol with `==` unifies instead of testing: an unbound
//! symbol takes the other side's value, a bound one checks consistency,
//! and two unbound symbols are linked so a later binding reaches both.
//! Linked symbols share a class (union-find over the table).

use crate::value::Value;
use crate::{Error, Result, Site, Violation};

/// Handle to a symbol in a [`SymbolTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(usize);

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    parent: usize,
    value: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: Vec<Entry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// New unbound symbol
    pub fn fresh(&mut self, name: impl Into<String>) -> SymbolId {
        self.push(name.into(), None)
    }

    /// New symbol already carrying a value
    pub fn bound(&mut self, name: impl Into<String>, value: Value) -> SymbolId {
        self.push(name.into(), Some(value))
    }

    fn push(&mut self, name: String, value: Option<Value>) -> SymbolId {
        let id = self.entries.len();
        self.entries.push(Entry {
            name,
            parent: id,
            value,
        });
        SymbolId(id)
    }

    fn find(&self, id: SymbolId) -> usize {
        let mut at = id.0;
        while self.entries[at].parent != at {
            at = self.entries[at].parent;
        }
        at
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.entries[id.0].name
    }

    /// The class value, if any member of the class is bound
    pub fn value(&self, id: SymbolId) -> Option<&Value> {
        self.entries[self.find(id)].value.as_ref()
    }

    /// Truthiness of a symbol
    pub fn is_bound(&self, id: SymbolId) -> bool {
        self.value(id).is_some()
    }

    /// `symbol == value`
    ///
    /// # Errors
    /// An ambiguity violation if the symbol is bound to a different value.
    pub fn unify_value(&mut self, id: SymbolId, value: &Value) -> Result<bool> {
        let root = self.find(id);
        match &self.entries[root].value {
            None => {
                self.entries[root].value = Some(value.clone());
                Ok(true)
            }
            Some(existing) if existing == value => Ok(true),
            Some(existing) => Err(ambiguity(
                vec![self.entries[id.0].name.clone()],
                vec![existing.clone(), value.clone()],
            )),
        }
    }

    /// `symbol == symbol`
    ///
    /// Links both classes. Returns true-like unless both sides are bound
    /// to different values, which is an ambiguity naming both symbols.
    pub fn unify(&mut self, a: SymbolId, b: SymbolId) -> Result<bool> {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return Ok(true);
        }
        let values = (self.entries[ra].value.clone(), self.entries[rb].value.clone());
        match values {
            (Some(va), Some(vb)) if va != vb => {
                let (na, nb) = (self.name(a).to_string(), self.name(b).to_string());
                let variables = if na == nb { vec![na] } else { vec![na, nb] };
                return Err(ambiguity(variables, vec![va, vb]));
            }
            (None, Some(_)) => self.entries[ra].parent = rb,
            _ => self.entries[rb].parent = ra,
        }
        Ok(true)
    }

    /// Names of symbols that never acquired a value
    pub fn unbound(&self) -> Vec<&str> {
        self.ids()
            .filter(|id| !self.is_bound(*id))
            .map(|id| self.name(id))
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> {
        (0..self.entries.len()).map(SymbolId)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn ambiguity(variables: Vec<String>, values: Vec<Value>) -> Error {
    Error::violation(Site::contract(), Violation::Ambiguity { variables, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Symbol vs value ────────────────────────────────

    #[test]
    fn test_fresh_symbol_binds_on_first_comparison() {
        let mut table = SymbolTable::new();
        let m = table.fresh("m");
        assert!(!table.is_bound(m));
        assert!(table.unify_value(m, &Value::Integer(3)).unwrap());
        assert_eq!(table.value(m), Some(&Value::Integer(3)));
        assert!(table.unify_value(m, &Value::Integer(3)).unwrap());
    }

    #[test]
    fn test_bound_symbol_mismatch_reports_both_values() {
        let mut table = SymbolTable::new();
        let m = table.bound("m", Value::Integer(2));
        let err = table.unify_value(m, &Value::Integer(4)).unwrap_err();
        assert!(err.is_violation());
        assert!(err.to_string().contains("ambiguity in variable `m`: [2, 4]"));
    }

    // ── Symbol vs symbol ───────────────────────────────

    #[test]
    fn test_linked_symbols_share_later_binding() {
        let mut table = SymbolTable::new();
        let a = table.fresh("a");
        let b = table.fresh("b");
        assert!(table.unify(a, b).unwrap());
        assert!(!table.is_bound(a));
        assert_eq!(table.unbound(), vec!["a", "b"]);

        table.unify_value(b, &Value::from("x")).unwrap();
        assert_eq!(table.value(a), Some(&Value::from("x")));
        assert!(table.unbound().is_empty());
    }

    #[test]
    fn test_unify_propagates_from_bound_side() {
        let mut table = SymbolTable::new();
        let a = table.fresh("a");
        let b = table.bound("b", Value::Integer(7));
        table.unify(a, b).unwrap();
        assert_eq!(table.value(a), Some(&Value::Integer(7)));

        let c = table.bound("c", Value::Integer(7));
        let d = table.fresh("d");
        table.unify(c, d).unwrap();
        assert_eq!(table.value(d), Some(&Value::Integer(7)));
    }

    #[test]
    fn test_unify_conflicting_bound_symbols() {
        let mut table = SymbolTable::new();
        let m = table.bound("m", Value::Integer(1));
        let n = table.bound("n", Value::Integer(3));
        let err = table.unify(m, n).unwrap_err();
        assert!(err
            .to_string()
            .contains("ambiguity between `m` and `n`: [1, 3]"));
    }

    #[test]
    fn test_unify_transitive_chain() {
        let mut table = SymbolTable::new();
        let ids: Vec<_> = ["p", "q", "r"].iter().map(|n| table.fresh(*n)).collect();
        table.unify(ids[0], ids[1]).unwrap();
        table.unify(ids[1], ids[2]).unwrap();
        table.unify_value(ids[2], &Value::Integer(5)).unwrap();
        assert_eq!(table.value(ids[0]), Some(&Value::Integer(5)));
        assert!(table.unify_value(ids[0], &Value::Integer(6)).is_err());
    }
}
