//! Predicate evaluator - checks one slot's predicates against the environment
//!
//! Each predicate parameter is filled from the environment when possible.
//! A parameter the environment lacks becomes either:
//!
//! - a fresh [`Symbol`](crate::symbol) (**unification mode**), when the
//!   predicate only ever `==`-compares it, so `b.shape == (m, 3)` binds `m`;
//! - a shared graph root (**deferred mode**), when the predicate chains
//!   operations off it (`m[0]`, `m.len()`, `m > 2`) or equates it with
//!   another missing name. The [`resolver`](crate::resolver) settles those
//!   nodes once the values arrive.
//!
//! Logical variables already in the environment are passed as bound
//! symbols, so a second, different value is reported as an ambiguity
//! rather than a plain false.

use std::collections::{BTreeMap, BTreeSet};

use crate::contract::ContractOptions;
use crate::env::Environment;
use crate::graph::{Graph, NodeId, NodeKind, Operand};
use crate::parser::ast::{CmpOp, Expr, Predicate};
use crate::resolver::{Resolver, Verdict};
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::Value;
use crate::{Error, Result, Site, Violation};

/// How a predicate treats the names it is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unification,
    Deferred,
}

impl Mode {
    /// Pick the mode for `body` given the parameters the environment lacks
    pub fn select(body: &Expr, missing: &BTreeSet<String>) -> Mode {
        if !missing.is_empty() && chains_missing(body, missing) {
            Mode::Deferred
        } else {
            Mode::Unification
        }
    }
}

/// A missing name used directly, possibly inside a tuple
fn mentions(expr: &Expr, missing: &BTreeSet<String>) -> bool {
    match expr {
        Expr::Var { name } => missing.contains(name),
        Expr::Seq { items } | Expr::SetLit { items } => items.iter().any(|i| mentions(i, missing)),
        _ => false,
    }
}

fn is_missing_var(expr: &Expr, missing: &BTreeSet<String>) -> bool {
    matches!(expr, Expr::Var { name } if missing.contains(name))
}

fn chains_missing(expr: &Expr, missing: &BTreeSet<String>) -> bool {
    match expr {
        Expr::Lit { .. } | Expr::Var { .. } => false,
        Expr::Seq { items } | Expr::SetLit { items } | Expr::And { items } | Expr::Or { items } => {
            items.iter().any(|i| chains_missing(i, missing))
        }
        Expr::Not { operand } => chains_missing(operand, missing),
        Expr::Attr { target, .. } => mentions(target, missing) || chains_missing(target, missing),
        Expr::Index { target, index } => {
            mentions(target, missing)
                || mentions(index, missing)
                || chains_missing(target, missing)
                || chains_missing(index, missing)
        }
        Expr::Call { target, args, .. } => {
            mentions(target, missing)
                || args.iter().any(|a| mentions(a, missing))
                || chains_missing(target, missing)
                || args.iter().any(|a| chains_missing(a, missing))
        }
        Expr::Compare {
            op: CmpOp::Eq,
            lhs,
            rhs,
        } => {
            (is_missing_var(lhs, missing) && is_missing_var(rhs, missing))
                || chains_missing(lhs, missing)
                || chains_missing(rhs, missing)
        }
        Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
            mentions(lhs, missing)
                || mentions(rhs, missing)
                || chains_missing(lhs, missing)
                || chains_missing(rhs, missing)
        }
    }
}

// ── Terms ─────────────────────────────────────────────────

/// What an expression evaluates to inside one invocation
#[derive(Debug, Clone)]
enum Term {
    Value(Value),
    Symbol(SymbolId),
    Node(NodeId),
    /// Tuple holding at least one symbol or node
    Seq(Vec<Term>),
}

impl Term {
    fn has_node(&self) -> bool {
        match self {
            Term::Node(_) => true,
            Term::Seq(items) => items.iter().any(Term::has_node),
            _ => false,
        }
    }
}

struct Frame<'g> {
    scope: BTreeMap<String, Term>,
    symbols: SymbolTable,
    graph: Option<&'g mut Graph>,
    origin: usize,
    touched: BTreeSet<NodeId>,
    /// `symbol == (..)` pairs waiting on unbound items
    links: Vec<(SymbolId, Vec<Term>)>,
}

impl Frame<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Term> {
        match expr {
            Expr::Lit { value } => Ok(Term::Value(value.clone())),
            Expr::Var { name } => self.scope.get(name).cloned().ok_or_else(|| {
                Error::definition(
                    Site::contract(),
                    format!("`{}` is not a parameter of this predicate", name),
                )
            }),
            Expr::Seq { items } => {
                let items = items
                    .iter()
                    .map(|i| self.eval(i))
                    .collect::<Result<Vec<_>>>()?;
                if items.iter().all(|t| matches!(t, Term::Value(_))) {
                    let values = items
                        .into_iter()
                        .filter_map(|t| match t {
                            Term::Value(v) => Some(v),
                            _ => None,
                        })
                        .collect();
                    Ok(Term::Value(Value::Array(values)))
                } else {
                    Ok(Term::Seq(items))
                }
            }
            Expr::SetLit { items } => {
                let mut set = BTreeSet::new();
                for item in items {
                    let term = self.eval(item)?;
                    if term.has_node() {
                        return Err(Error::definition(
                            Site::contract(),
                            "an unresolved value cannot be collected into a set",
                        ));
                    }
                    set.insert(self.value_of(&term)?);
                }
                Ok(Term::Value(Value::Set(set)))
            }
            Expr::Attr { target, name } => {
                let target = self.eval(target)?;
                if target.has_node() {
                    let target = self.operand(&target)?;
                    return self.record(NodeKind::Attr {
                        target,
                        name: name.clone(),
                    });
                }
                Ok(Term::Value(self.value_of(&target)?.attr(name)?))
            }
            Expr::Index { target, index } => {
                let (target, index) = (self.eval(target)?, self.eval(index)?);
                if target.has_node() || index.has_node() {
                    let kind = NodeKind::Index {
                        target: self.operand(&target)?,
                        index: self.operand(&index)?,
                    };
                    return self.record(kind);
                }
                let index = self.value_of(&index)?;
                Ok(Term::Value(self.value_of(&target)?.index(&index)?))
            }
            Expr::Call {
                target,
                method,
                args,
            } => {
                let target = self.eval(target)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>>>()?;
                if target.has_node() || args.iter().any(Term::has_node) {
                    let kind = NodeKind::Call {
                        target: self.operand(&target)?,
                        method: *method,
                        args: args
                            .iter()
                            .map(|a| self.operand(a))
                            .collect::<Result<Vec<_>>>()?,
                    };
                    return self.record(kind);
                }
                let args = args
                    .iter()
                    .map(|a| self.value_of(a))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Term::Value(self.value_of(&target)?.call(*method, &args)?))
            }
            Expr::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = (self.eval(lhs)?, self.eval(rhs)?);
                if lhs.has_node() || rhs.has_node() {
                    let kind = NodeKind::Binary {
                        op: *op,
                        lhs: self.operand(&lhs)?,
                        rhs: self.operand(&rhs)?,
                    };
                    return self.record(kind);
                }
                let rhs = self.value_of(&rhs)?;
                Ok(Term::Value(self.value_of(&lhs)?.binary(*op, &rhs)?))
            }
            Expr::Compare { op, lhs, rhs } => {
                let (lhs, rhs) = (self.eval(lhs)?, self.eval(rhs)?);
                if *op == CmpOp::Eq {
                    return Ok(Term::Value(Value::Boolean(self.equate(lhs, rhs)?)));
                }
                if lhs.has_node() || rhs.has_node() {
                    let kind = NodeKind::Compare {
                        op: *op,
                        lhs: self.operand(&lhs)?,
                        rhs: self.operand(&rhs)?,
                    };
                    self.record(kind)?;
                    return Ok(Term::Value(Value::Boolean(true)));
                }
                let rhs = self.value_of(&rhs)?;
                Ok(Term::Value(Value::Boolean(
                    self.value_of(&lhs)?.compare(*op, &rhs)?,
                )))
            }
            Expr::And { items } => {
                let mut last = Term::Value(Value::Boolean(true));
                for item in items {
                    last = self.eval(item)?;
                    if !self.truthy(&last) {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Or { items } => {
                let mut last = Term::Value(Value::Boolean(false));
                for item in items {
                    last = self.eval(item)?;
                    if self.truthy(&last) {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Not { operand } => {
                let term = self.eval(operand)?;
                Ok(Term::Value(Value::Boolean(!self.truthy(&term))))
            }
        }
    }

    /// `lhs == rhs` with symbols unifying and nodes collecting assertions
    fn equate(&mut self, lhs: Term, rhs: Term) -> Result<bool> {
        match (lhs, rhs) {
            (Term::Node(id), other) | (other, Term::Node(id)) => {
                let operand = self.operand(&other)?;
                self.assert(id, operand)?;
                Ok(true)
            }
            (Term::Symbol(a), Term::Symbol(b)) => self.symbols.unify(a, b),
            (Term::Symbol(s), Term::Value(v)) | (Term::Value(v), Term::Symbol(s)) => {
                self.symbols.unify_value(s, &v)
            }
            (Term::Seq(xs), Term::Seq(ys)) => self.equate_items(xs, ys),
            (Term::Seq(xs), Term::Value(Value::Array(ys)))
            | (Term::Value(Value::Array(ys)), Term::Seq(xs)) => {
                self.equate_items(xs, ys.into_iter().map(Term::Value).collect())
            }
            (Term::Seq(_), Term::Value(_)) | (Term::Value(_), Term::Seq(_)) => Ok(false),
            (Term::Symbol(s), Term::Seq(xs)) | (Term::Seq(xs), Term::Symbol(s)) => {
                match self.symbols.value(s).cloned() {
                    Some(bound) => self.equate(Term::Value(bound), Term::Seq(xs)),
                    None if xs.iter().all(|x| self.is_concrete(x)) => {
                        let value = self.value_of(&Term::Seq(xs))?;
                        self.symbols.unify_value(s, &value)
                    }
                    None => {
                        self.links.push((s, xs));
                        Ok(true)
                    }
                }
            }
            (Term::Value(a), Term::Value(b)) => Ok(a == b),
        }
    }

    fn equate_items(&mut self, xs: Vec<Term>, ys: Vec<Term>) -> Result<bool> {
        if xs.len() != ys.len() {
            return Ok(false);
        }
        for (x, y) in xs.into_iter().zip(ys) {
            if !self.equate(x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Replay pending links until none can make progress
    ///
    /// Returns false if a replayed link compares unequal. Links still
    /// pending afterwards leave their symbols unbound.
    fn close_links(&mut self) -> Result<bool> {
        loop {
            let pending = std::mem::take(&mut self.links);
            let before = pending.len();
            for (s, xs) in pending {
                let ready = self.symbols.is_bound(s) || xs.iter().all(|x| self.is_concrete(x));
                if !ready {
                    self.links.push((s, xs));
                } else if !self.equate(Term::Symbol(s), Term::Seq(xs))? {
                    return Ok(false);
                }
            }
            if self.links.is_empty() || self.links.len() == before {
                return Ok(true);
            }
        }
    }

    fn is_concrete(&self, term: &Term) -> bool {
        match term {
            Term::Value(_) => true,
            Term::Symbol(s) => self.symbols.is_bound(*s),
            Term::Node(_) => false,
            Term::Seq(items) => items.iter().all(|i| self.is_concrete(i)),
        }
    }

    fn truthy(&self, term: &Term) -> bool {
        match term {
            Term::Value(v) => v.is_truthy(),
            Term::Symbol(s) => self.symbols.is_bound(*s),
            Term::Node(_) => true,
            Term::Seq(items) => !items.is_empty(),
        }
    }

    /// Concrete value of a term that holds no nodes
    fn value_of(&self, term: &Term) -> Result<Value> {
        match term {
            Term::Value(v) => Ok(v.clone()),
            Term::Symbol(s) => self.symbols.value(*s).cloned().ok_or_else(|| {
                Error::definition(
                    Site::contract(),
                    format!("symbol `{}` is used before it has a value", self.symbols.name(*s)),
                )
            }),
            Term::Seq(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|i| self.value_of(i))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Term::Node(_) => Err(Error::definition(
                Site::contract(),
                "an unresolved value was used where a concrete one is required",
            )),
        }
    }

    fn operand(&self, term: &Term) -> Result<Operand> {
        match term {
            Term::Node(id) => Ok(Operand::Node(*id)),
            Term::Seq(items) if term.has_node() => Ok(Operand::List(
                items
                    .iter()
                    .map(|i| self.operand(i))
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => Ok(Operand::Value(self.value_of(other)?)),
        }
    }

    fn graph(&mut self) -> Result<&mut Graph> {
        self.graph.as_deref_mut().ok_or_else(|| {
            Error::definition(Site::contract(), "deferred operation outside deferred mode")
        })
    }

    fn record(&mut self, kind: NodeKind) -> Result<Term> {
        let origin = self.origin;
        let id = self.graph()?.chain(kind, origin)?;
        self.touched.insert(id);
        Ok(Term::Node(id))
    }

    fn assert(&mut self, id: NodeId, operand: Operand) -> Result<()> {
        let origin = self.origin;
        self.graph()?.assert_eq(id, operand, origin)?;
        self.touched.insert(id);
        Ok(())
    }
}

// ── Slot evaluation ───────────────────────────────────────

/// Evaluates the predicates of one slot in order
pub struct SlotEvaluator<'a> {
    slot: &'a str,
    value: &'a Value,
    options: &'a ContractOptions,
    graph: Graph,
    resolver: Resolver,
}

impl<'a> SlotEvaluator<'a> {
    pub fn new(slot: &'a str, value: &'a Value, options: &'a ContractOptions) -> Self {
        SlotEvaluator {
            slot,
            value,
            options,
            graph: Graph::new(slot),
            resolver: Resolver::new(),
        }
    }

    /// Nodes recorded so far
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Evaluate predicate number `ordinal` of this slot.
    ///
    /// # Errors
    /// - `ContractViolation` when the predicate is false, a logical
    ///   variable receives a second value, or its deferred nodes settle
    ///   invalid.
    /// - `DefinitionError` when an operation fails or a fresh symbol is
    ///   left unbound.
    pub fn evaluate(
        &mut self,
        env: &mut Environment,
        ordinal: usize,
        predicate: &Predicate,
    ) -> Result<()> {
        let site = Site::predicate(self.slot, ordinal);
        self.run(env, ordinal, predicate).map_err(|e| e.at(&site))
    }

    fn run(&mut self, env: &mut Environment, ordinal: usize, predicate: &Predicate) -> Result<()> {
        let reserved = self.options.reserved.as_str();
        let missing: BTreeSet<String> = predicate
            .params
            .iter()
            .filter(|p| p.as_str() != reserved && !env.contains(p))
            .cloned()
            .collect();
        let mode = Mode::select(&predicate.body, &missing);
        tracing::debug!(
            slot = self.slot,
            predicate = ordinal,
            %predicate,
            ?mode,
            ?missing,
            "evaluate predicate"
        );

        let mut symbols = SymbolTable::new();
        let mut scope = BTreeMap::new();
        let mut touched = BTreeSet::new();
        for param in &predicate.params {
            let term = if param == reserved {
                Term::Value(self.value.clone())
            } else {
                match (env.get(param), env.kind(param)) {
                    (Some(v), Some(kind)) if kind.is_logical() => {
                        Term::Symbol(symbols.bound(param.as_str(), v.clone()))
                    }
                    (Some(v), _) => Term::Value(v.clone()),
                    (None, _) if mode == Mode::Deferred => {
                        let id = self.graph.root(param, ordinal);
                        touched.insert(id);
                        Term::Node(id)
                    }
                    (None, _) => Term::Symbol(symbols.fresh(param.as_str())),
                }
            };
            scope.insert(param.clone(), term);
        }

        let mut frame = Frame {
            scope,
            symbols,
            graph: match mode {
                Mode::Deferred => Some(&mut self.graph),
                Mode::Unification => None,
            },
            origin: ordinal,
            touched,
            links: Vec::new(),
        };
        let result = frame.eval(&predicate.body)?;
        let passed = frame.truthy(&result) && frame.close_links()?;
        let Frame {
            symbols, touched, ..
        } = frame;

        if !passed {
            return Err(Error::violation(Site::contract(), Violation::Failed));
        }

        match mode {
            Mode::Unification => {
                let mut unbound: Vec<&str> = symbols.unbound();
                unbound.dedup();
                if !unbound.is_empty() {
                    return Err(Error::definition(
                        Site::contract(),
                        format!("not all symbols resolved: `{}`", unbound.join("`, `")),
                    ));
                }
                for id in symbols.ids() {
                    let name = symbols.name(id);
                    if let (false, Some(value)) = (env.contains(name), symbols.value(id)) {
                        env.bind(name, value.clone())?;
                    }
                }
                Ok(())
            }
            Mode::Deferred => {
                let nodes: Vec<NodeId> = touched.into_iter().collect();
                let settled =
                    self.resolver
                        .settle(&self.graph, env, &nodes, self.options.max_iterations)?;
                match settled.verdict {
                    Verdict::Invalid { origin, reason, .. } => {
                        Err(Error::violation(Site::predicate(self.slot, origin), reason))
                    }
                    _ => self.fold(env),
                }
            }
        }
    }

    /// Bind every root whose claims agree
    fn fold(&self, env: &mut Environment) -> Result<()> {
        let settled: Vec<(String, Value)> = self
            .graph
            .roots()
            .filter(|(name, id)| {
                !env.contains(name) && self.resolver.check(&self.graph, *id).is_valid()
            })
            .filter_map(|(name, id)| {
                self.resolver
                    .known(id)
                    .map(|v| (name.to_string(), v.clone()))
            })
            .collect();
        for (name, value) in settled {
            env.bind(&name, value)?;
        }
        Ok(())
    }

    /// Settle every pending node of the slot.
    ///
    /// # Errors
    /// `DefinitionError` naming the stuck nodes when the iteration cap is
    /// reached, `ContractViolation` when a node settles invalid.
    pub fn finish(mut self, env: &mut Environment) -> Result<()> {
        if self.graph.is_empty() {
            return Ok(());
        }
        let nodes: Vec<NodeId> = self.graph.ids().collect();
        let settled = self
            .resolver
            .settle(&self.graph, env, &nodes, self.options.max_iterations)?;
        match settled.verdict {
            Verdict::Valid => self.fold(env),
            Verdict::Invalid { origin, reason, .. } => {
                Err(Error::violation(Site::predicate(self.slot, origin), reason))
            }
            Verdict::Unresolved => {
                let stuck = self.resolver.stuck(&self.graph);
                let labels: Vec<&str> = stuck.iter().map(|id| self.graph.label(*id)).collect();
                let site = Site {
                    slot: Some(self.slot.to_string()),
                    predicate: stuck.first().map(|id| self.graph.node(*id).origin),
                };
                Err(Error::definition(
                    site,
                    format!(
                        "could not resolve all variables after {} iterations: `{}`",
                        settled.iterations,
                        labels.join("`, `")
                    ),
                ))
            }
        }
    }
}

/// Check all `predicates` of a slot whose current value is `value`
pub fn check_slot(
    env: &mut Environment,
    slot: &str,
    value: &Value,
    predicates: &[Predicate],
    options: &ContractOptions,
) -> Result<()> {
    tracing::debug!(slot, predicates = predicates.len(), "check slot");
    let mut evaluator = SlotEvaluator::new(slot, value, options);
    for (ordinal, predicate) in predicates.iter().enumerate() {
        evaluator.evaluate(env, ordinal, predicate)?;
    }
    evaluator.finish(env)
}

/// Evaluate a predicate whose parameters are all bound to a concrete value
///
/// Used for derived-variable definitions.
pub fn evaluate_value(predicate: &Predicate, env: &Environment) -> Result<Value> {
    let mut scope = BTreeMap::new();
    for param in &predicate.params {
        let value = env.get(param).ok_or_else(|| {
            Error::definition(Site::contract(), format!("unknown argument names `{{'{}'}}`", param))
        })?;
        scope.insert(param.clone(), Term::Value(value.clone()));
    }
    let mut frame = Frame {
        scope,
        symbols: SymbolTable::new(),
        graph: None,
        origin: 0,
        touched: BTreeSet::new(),
        links: Vec::new(),
    };
    let term = frame.eval(&predicate.body)?;
    frame.value_of(&term)
}
