//! Fixpoint resolver - tri-state settlement of expression nodes
//!
//! Each propagation pass walks the graph in creation order and computes
//! what it can: a root's own value comes from the environment, any other
//! node's own value from applying its operation to known operands. A node
//! also becomes known through the values asserted equal to it, which is
//! how `m[0] == 3` gives `m[0]` a value before `m` has one and how
//! `A == B` lets `B`'s value reach `A`.
//!
//! Verdicts are computed from the cached values without touching the
//! graph, so resolving a settled graph again gives the same answer.

use crate::env::Environment;
use crate::graph::{Graph, NodeId, NodeKind, Operand};
use crate::value::Value;
use crate::{Result, Site, Violation};

/// Tri-state outcome of resolving a node or a set of nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid,
    Invalid {
        node: NodeId,
        /// Ordinal of the predicate responsible
        origin: usize,
        reason: Violation,
    },
    Unresolved,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Verdict::Unresolved)
    }
}

/// Result of a bounded fixpoint run
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub verdict: Verdict,
    pub iterations: usize,
}

/// Value cache for one graph
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    own: Vec<Option<Value>>,
    known: Vec<Option<Value>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best value known for a node: its first asserted value, else its own
    pub fn known(&self, id: NodeId) -> Option<&Value> {
        self.known.get(id.index()).and_then(Option::as_ref)
    }

    fn own(&self, id: NodeId) -> Option<&Value> {
        self.own.get(id.index()).and_then(Option::as_ref)
    }

    fn operand(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Value(v) => Some(v.clone()),
            Operand::Node(id) => self.known(*id).cloned(),
            Operand::List(items) => items
                .iter()
                .map(|item| self.operand(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn compute(&self, graph: &Graph, env: &Environment, id: NodeId) -> Result<Option<Value>> {
        let node = graph.node(id);
        let site = Site::predicate(graph.slot(), node.origin);
        let value = match &node.kind {
            NodeKind::Root { name } => return Ok(env.get(name).cloned()),
            NodeKind::Attr { target, name } => match self.operand(target) {
                Some(target) => target.attr(name),
                None => return Ok(None),
            },
            NodeKind::Index { target, index } => match (self.operand(target), self.operand(index)) {
                (Some(target), Some(index)) => target.index(&index),
                _ => return Ok(None),
            },
            NodeKind::Call {
                target,
                method,
                args,
            } => {
                let args: Option<Vec<Value>> = args.iter().map(|a| self.operand(a)).collect();
                match (self.operand(target), args) {
                    (Some(target), Some(args)) => target.call(*method, &args),
                    _ => return Ok(None),
                }
            }
            NodeKind::Binary { op, lhs, rhs } => match (self.operand(lhs), self.operand(rhs)) {
                (Some(lhs), Some(rhs)) => lhs.binary(*op, &rhs),
                _ => return Ok(None),
            },
            NodeKind::Compare { op, lhs, rhs } => match (self.operand(lhs), self.operand(rhs)) {
                (Some(lhs), Some(rhs)) => lhs.compare(*op, &rhs).map(Value::Boolean),
                _ => return Ok(None),
            },
        };
        value.map(Some).map_err(|e| e.at(&site))
    }

    /// One pass over the whole graph. Returns whether anything new became known.
    ///
    /// # Errors
    /// A definition error when a recorded operation fails on the values
    /// it finally receives.
    pub fn propagate(&mut self, graph: &Graph, env: &Environment) -> Result<bool> {
        self.own.resize(graph.len(), None);
        self.known.resize(graph.len(), None);
        let mut changed = false;
        for id in graph.ids() {
            let own = self.compute(graph, env, id)?;
            let known = graph
                .node(id)
                .asserted
                .iter()
                .find_map(|a| self.operand(&a.operand))
                .or_else(|| own.clone());
            let i = id.index();
            if known.is_some() && self.known[i] != known {
                self.known[i] = known;
                changed = true;
            }
            if own.is_some() && self.own[i] != own {
                self.own[i] = own;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Verdict for a node's own claims, ignoring its children
    pub fn check(&self, graph: &Graph, id: NodeId) -> Verdict {
        let node = graph.node(id);
        let mut candidates = Vec::with_capacity(node.asserted.len() + 1);
        for assertion in &node.asserted {
            match self.operand(&assertion.operand) {
                Some(value) => candidates.push(value),
                None => return Verdict::Unresolved,
            }
        }
        match self.own(id) {
            Some(value) => candidates.push(value.clone()),
            None if !node.is_root() => return Verdict::Unresolved,
            None => {}
        }
        // a value asserted through another node reaches this one a pass later
        let (Some(first), Some(_)) = (candidates.first(), self.known(id)) else {
            return Verdict::Unresolved;
        };

        if candidates.iter().any(|v| v != first) {
            let mut values: Vec<Value> = Vec::new();
            for v in candidates.iter() {
                if !values.contains(v) {
                    values.push(v.clone());
                }
            }
            let origin = node
                .asserted
                .iter()
                .map(|a| a.origin)
                .max()
                .unwrap_or(node.origin);
            return Verdict::Invalid {
                node: id,
                origin,
                reason: Violation::Ambiguity {
                    variables: vec![node.label.clone()],
                    values,
                },
            };
        }
        if node.terminal && *first != Value::Boolean(true) {
            return Verdict::Invalid {
                node: id,
                origin: node.origin,
                reason: Violation::Comparison {
                    label: node.label.clone(),
                },
            };
        }
        Verdict::Valid
    }

    /// Tri-state verdict of a node and everything chained off it
    pub fn resolve(&self, graph: &Graph, id: NodeId) -> Verdict {
        let own = self.check(graph, id);
        if !own.is_valid() {
            return own;
        }
        let mut invalid = None;
        for child in &graph.node(id).children {
            match self.resolve(graph, *child) {
                Verdict::Valid => {}
                Verdict::Unresolved => return Verdict::Unresolved,
                failed => {
                    invalid.get_or_insert(failed);
                }
            }
        }
        invalid.unwrap_or(Verdict::Valid)
    }

    /// Combined verdict: any unresolved node wins, then the first invalid one
    pub fn verdict(&self, graph: &Graph, nodes: &[NodeId]) -> Verdict {
        let mut invalid = None;
        for id in nodes {
            match self.resolve(graph, *id) {
                Verdict::Valid => {}
                Verdict::Unresolved => return Verdict::Unresolved,
                failed => {
                    invalid.get_or_insert(failed);
                }
            }
        }
        invalid.unwrap_or(Verdict::Valid)
    }

    /// Propagate until `nodes` settle or `max_iterations` passes have run
    pub fn settle(
        &mut self,
        graph: &Graph,
        env: &Environment,
        nodes: &[NodeId],
        max_iterations: usize,
    ) -> Result<Settlement> {
        let mut verdict = Verdict::Unresolved;
        let mut iterations = 0;
        while iterations < max_iterations {
            self.propagate(graph, env)?;
            iterations += 1;
            verdict = self.verdict(graph, nodes);
            if !verdict.is_unresolved() {
                break;
            }
        }
        tracing::debug!(slot = graph.slot(), iterations, ?verdict, "fixpoint");
        Ok(Settlement {
            verdict,
            iterations,
        })
    }

    /// Nodes whose own claims are still open
    pub fn stuck(&self, graph: &Graph) -> Vec<NodeId> {
        graph
            .ids()
            .filter(|id| self.check(graph, *id).is_unresolved())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{BinOp, CmpOp};

    fn index(target: NodeId, i: i64) -> NodeKind {
        NodeKind::Index {
            target: Operand::Node(target),
            index: Operand::Value(Value::Integer(i)),
        }
    }

    fn int(i: i64) -> Operand {
        Operand::Value(Value::Integer(i))
    }

    // ── Tri-state ──────────────────────────────────────

    #[test]
    fn test_chain_valid_once_root_known() {
        let mut graph = Graph::new("a");
        let m = graph.root("m", 0);
        let first = graph.chain(index(m, 0), 0).unwrap();
        graph.assert_eq(first, int(2), 0).unwrap();
        let last = graph.chain(index(m, -1), 0).unwrap();
        graph
            .chain(
                NodeKind::Compare {
                    op: CmpOp::Gt,
                    lhs: Operand::Node(last),
                    rhs: int(1),
                },
                0,
            )
            .unwrap();
        graph.assert_eq(m, Operand::Value(Value::ints([2, 3])), 0).unwrap();

        let mut resolver = Resolver::new();
        let env = Environment::new();
        let settled = resolver.settle(&graph, &env, &[m], 100).unwrap();
        assert_eq!(settled.verdict, Verdict::Valid);
        assert_eq!(resolver.known(last), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_unknown_root_is_unresolved() {
        let mut graph = Graph::new("a");
        let m = graph.root("m", 0);
        graph.chain(index(m, 0), 0).unwrap();
        let mut resolver = Resolver::new();
        resolver.propagate(&graph, &Environment::new()).unwrap();
        assert_eq!(resolver.resolve(&graph, m), Verdict::Unresolved);
    }

    #[test]
    fn test_root_value_from_environment() {
        let mut graph = Graph::new("a");
        let m = graph.root("m", 0);
        let len = graph
            .chain(
                NodeKind::Call {
                    target: Operand::Node(m),
                    method: crate::parser::ast::Method::Len,
                    args: vec![],
                },
                0,
            )
            .unwrap();
        graph.assert_eq(len, int(3), 0).unwrap();

        let mut env = Environment::new();
        env.bind("m", Value::ints([1, 2])).unwrap();
        let mut resolver = Resolver::new();
        let settled = resolver.settle(&graph, &env, &[m], 100).unwrap();
        match settled.verdict {
            Verdict::Invalid { node, reason, .. } => {
                assert_eq!(node, len);
                assert_eq!(reason.to_string(), "ambiguity in variable `m.len()`: [3, 2]");
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_false_terminal_is_invalid() {
        let mut graph = Graph::new("a");
        let m = graph.root("m", 2);
        let lt = graph
            .chain(
                NodeKind::Compare {
                    op: CmpOp::Lt,
                    lhs: Operand::Node(m),
                    rhs: int(0),
                },
                2,
            )
            .unwrap();
        graph.assert_eq(m, int(5), 1).unwrap();
        let mut resolver = Resolver::new();
        let settled = resolver.settle(&graph, &Environment::new(), &[m], 100).unwrap();
        assert_eq!(
            settled.verdict,
            Verdict::Invalid {
                node: lt,
                origin: 2,
                reason: Violation::Comparison {
                    label: "m < 0".into()
                },
            }
        );
    }

    // ── Fixpoint ───────────────────────────────────────

    #[test]
    fn test_mutual_dependency_reports_ambiguity() {
        // m[0] == n[0], n[1] == m[1], m == [1, 2], n == [1, 3]
        let mut graph = Graph::new("a");
        let m = graph.root("m", 0);
        let n = graph.root("n", 0);
        let m0 = graph.chain(index(m, 0), 0).unwrap();
        let n0 = graph.chain(index(n, 0), 0).unwrap();
        graph.assert_eq(m0, Operand::Node(n0), 0).unwrap();
        let n1 = graph.chain(index(n, 1), 1).unwrap();
        let m1 = graph.chain(index(m, 1), 1).unwrap();
        graph.assert_eq(n1, Operand::Node(m1), 1).unwrap();
        graph.assert_eq(m, Operand::Value(Value::ints([1, 2])), 2).unwrap();
        graph.assert_eq(n, Operand::Value(Value::ints([1, 3])), 3).unwrap();

        let mut resolver = Resolver::new();
        let nodes: Vec<NodeId> = graph.ids().collect();
        let settled = resolver.settle(&graph, &Environment::new(), &nodes, 100).unwrap();
        match settled.verdict {
            Verdict::Invalid { reason, origin, .. } => {
                assert_eq!(reason.to_string(), "ambiguity in variable `n[1]`: [2, 3]");
                assert_eq!(origin, 1);
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_circular_symbols_hit_iteration_cap() {
        let mut graph = Graph::new("a");
        let a = graph.root("A", 0);
        let b = graph.root("B", 0);
        graph.assert_eq(a, Operand::Node(b), 0).unwrap();
        graph.assert_eq(b, Operand::Node(a), 1).unwrap();

        let mut resolver = Resolver::new();
        let settled = resolver.settle(&graph, &Environment::new(), &[a, b], 100).unwrap();
        assert_eq!(settled.verdict, Verdict::Unresolved);
        assert_eq!(settled.iterations, 100);
        assert_eq!(resolver.stuck(&graph), vec![a, b]);
    }

    #[test]
    fn test_assertion_reaches_counterpart_on_later_pass() {
        let mut graph = Graph::new("a");
        let a = graph.root("A", 0);
        let b = graph.root("B", 0);
        graph.assert_eq(a, Operand::Node(b), 0).unwrap();
        graph.assert_eq(b, int(7), 1).unwrap();

        let mut resolver = Resolver::new();
        let settled = resolver.settle(&graph, &Environment::new(), &[a, b], 100).unwrap();
        assert_eq!(settled.verdict, Verdict::Valid);
        assert_eq!(settled.iterations, 2);
        assert_eq!(resolver.known(a), Some(&Value::Integer(7)));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut graph = Graph::new("a");
        let m = graph.root("m", 0);
        let doubled = graph
            .chain(
                NodeKind::Binary {
                    op: BinOp::Mul,
                    lhs: Operand::Node(m),
                    rhs: int(2),
                },
                0,
            )
            .unwrap();
        graph.assert_eq(doubled, int(8), 0).unwrap();
        let mut env = Environment::new();
        env.bind("m", Value::Integer(4)).unwrap();

        let mut resolver = Resolver::new();
        let first = resolver.settle(&graph, &env, &[m], 100).unwrap();
        let second = resolver.settle(&graph, &env, &[m], 100).unwrap();
        assert_eq!(first.verdict, Verdict::Valid);
        assert_eq!(first.verdict, second.verdict);
        assert!(!resolver.propagate(&graph, &env).unwrap());
        assert_eq!(graph.node(doubled).asserted.len(), 1);
    }

    #[test]
    fn test_operation_failure_is_definition_error() {
        let mut graph = Graph::new("b");
        let m = graph.root("m", 1);
        graph
            .chain(
                NodeKind::Attr {
                    target: Operand::Node(m),
                    name: "shape".into(),
                },
                1,
            )
            .unwrap();
        let mut env = Environment::new();
        env.bind("m", Value::Integer(1)).unwrap();
        let err = Resolver::new().propagate(&graph, &env).unwrap_err();
        assert!(err.is_definition_error());
        assert_eq!(err.site(), Some(&Site::predicate("b", 1)));
    }

    proptest::proptest! {
        #[test]
        fn prop_settle_is_idempotent(m in -20i64..20, expected in -40i64..40, passes in 1usize..5) {
            let mut graph = Graph::new("a");
            let root = graph.root("m", 0);
            let doubled = graph
                .chain(
                    NodeKind::Binary {
                        op: BinOp::Mul,
                        lhs: Operand::Node(root),
                        rhs: int(2),
                    },
                    0,
                )
                .unwrap();
            graph.assert_eq(doubled, int(expected), 0).unwrap();
            let mut env = Environment::new();
            env.bind("m", Value::Integer(m)).unwrap();

            let mut resolver = Resolver::new();
            let first = resolver.settle(&graph, &env, &[root], 100).unwrap();
            for _ in 0..passes {
                let again = resolver.settle(&graph, &env, &[root], 100).unwrap();
                proptest::prop_assert_eq!(&first.verdict, &again.verdict);
            }
            proptest::prop_assert_eq!(first.verdict.is_valid(), m * 2 == expected);
        }
    }
}
