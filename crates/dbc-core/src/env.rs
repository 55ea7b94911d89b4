//! Binding environment - per-call mapping from logical names to values
//!
//! One `Environment` is created for each checked call, seeded with the
//! argument values and derived variables, and grows as predicates bind
//! logical variables. A name never changes value once bound.

use std::collections::BTreeMap;

use crate::value::Value;
use crate::{Error, Result, Site, Violation};

/// How a name entered the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A declared parameter's argument value
    Argument,
    /// Computed by a derived-variable definition
    Derived,
    /// Bound by a predicate (unification or deferred resolution)
    Unified,
    /// The wrapped function's result
    Return,
}

impl BindingKind {
    /// Logical variables are names the caller never supplied directly
    pub fn is_logical(self) -> bool {
        matches!(self, BindingKind::Derived | BindingKind::Unified)
    }
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    kind: BindingKind,
}

/// Per-call binding environment
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: BTreeMap<String, Binding>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).map(|b| &b.value)
    }

    pub fn kind(&self, name: &str) -> Option<BindingKind> {
        self.bindings.get(name).map(|b| b.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bind a logical variable discovered by a predicate
    pub fn bind(&mut self, name: &str, value: Value) -> Result<()> {
        self.bind_as(BindingKind::Unified, name, value)
    }

    /// Bind `name`, or confirm an existing equal binding.
    ///
    /// # Errors
    /// A different existing value is an ambiguity violation carrying
    /// `[old, new]`. The site is left empty for the caller to fill.
    pub fn bind_as(&mut self, kind: BindingKind, name: &str, value: Value) -> Result<()> {
        match self.bindings.get(name) {
            Some(existing) if existing.value == value => Ok(()),
            Some(existing) => Err(Error::violation(
                Site::contract(),
                Violation::Ambiguity {
                    variables: vec![name.to_string()],
                    values: vec![existing.value.clone(), value],
                },
            )),
            None => {
                tracing::trace!(name, %value, ?kind, "bind");
                self.bindings.insert(name.to_string(), Binding { value, kind });
                Ok(())
            }
        }
    }

    /// Read-only copy of every binding
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.bindings
            .iter()
            .map(|(name, b)| (name.clone(), b.value.clone()))
            .collect()
    }

    /// Bindings introduced by predicates or definitions
    pub fn logical(&self) -> BTreeMap<String, Value> {
        self.bindings
            .iter()
            .filter(|(_, b)| b.kind.is_logical())
            .map(|(name, b)| (name.clone(), b.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_then_get() {
        let mut env = Environment::new();
        assert!(env.get("m").is_none());
        env.bind("m", Value::Integer(3)).unwrap();
        assert_eq!(env.get("m"), Some(&Value::Integer(3)));
        assert_eq!(env.kind("m"), Some(BindingKind::Unified));
    }

    #[test]
    fn test_rebind_equal_value_is_noop() {
        let mut env = Environment::new();
        env.bind_as(BindingKind::Argument, "a", Value::Integer(2)).unwrap();
        env.bind("a", Value::Float(2.0)).unwrap();
        assert_eq!(env.kind("a"), Some(BindingKind::Argument));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_rebind_different_value_is_ambiguity() {
        let mut env = Environment::new();
        env.bind("n", Value::Integer(2)).unwrap();
        let err = env.bind("n", Value::Integer(3)).unwrap_err();
        assert!(err.is_violation());
        assert_eq!(err.to_string(), "Contract violation - contract: ambiguity in variable `n`: [2, 3]");
        assert_eq!(env.get("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_snapshot_and_logical_views() {
        let mut env = Environment::new();
        env.bind_as(BindingKind::Argument, "a", Value::ints([3, 2])).unwrap();
        env.bind_as(BindingKind::Derived, "k", Value::Integer(6)).unwrap();
        env.bind("m", Value::Integer(3)).unwrap();

        let snapshot = env.snapshot();
        assert_eq!(snapshot.len(), 3);
        let logical = env.logical();
        assert_eq!(logical.keys().collect::<Vec<_>>(), vec!["k", "m"]);
    }
}
