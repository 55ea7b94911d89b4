//! Expression nodes - deferred operation chains on unknown values
//!
//! When a predicate applies an operation to a name the environment does
//! not know yet, the operation is recorded as a node instead of being
//! evaluated. Nodes live in a per-slot arena (`Graph`) and are replayed
//! by the [`resolver`](crate::resolver) once their roots have values.
//!
//! - `==` on a node appends the other side to the node's asserted list.
//! - Order comparisons and `!=` create *terminal* nodes; nothing may be
//!   chained off a terminal node.
//! - Roots are shared by name, so every predicate on a slot that mentions
//!   `m` talks about the same node.

use std::collections::BTreeMap;
use std::fmt;

use crate::parser::ast::{BinOp, CmpOp, Method};
use crate::value::Value;
use crate::{Error, Result, Site};

/// Handle to a node in a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An input to a recorded operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Node(NodeId),
    /// Tuple whose items may be nodes
    List(Vec<Operand>),
}

impl Operand {
    /// Every node this operand depends on
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Operand::Value(_) => Vec::new(),
            Operand::Node(id) => vec![*id],
            Operand::List(items) => items.iter().flat_map(Operand::nodes).collect(),
        }
    }
}

/// The closed set of recordable operations
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root { name: String },
    Attr { target: Operand, name: String },
    Index { target: Operand, index: Operand },
    Call { target: Operand, method: Method, args: Vec<Operand> },
    Binary { op: BinOp, lhs: Operand, rhs: Operand },
    Compare { op: CmpOp, lhs: Operand, rhs: Operand },
}

impl NodeKind {
    fn operands(&self) -> Vec<&Operand> {
        match self {
            NodeKind::Root { .. } => Vec::new(),
            NodeKind::Attr { target, .. } => vec![target],
            NodeKind::Index { target, index } => vec![target, index],
            NodeKind::Call { target, args, .. } => {
                std::iter::once(target).chain(args.iter()).collect()
            }
            NodeKind::Binary { lhs, rhs, .. } | NodeKind::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
        }
    }
}

/// A value compared equal against a node
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub operand: Operand,
    /// Ordinal of the predicate that made the assertion
    pub origin: usize,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub label: String,
    pub kind: NodeKind,
    pub terminal: bool,
    /// Ordinal of the predicate that created the node
    pub origin: usize,
    pub asserted: Vec<Assertion>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root { .. })
    }

    /// Nodes this node's own value is computed from
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.kind
            .operands()
            .into_iter()
            .flat_map(Operand::nodes)
            .collect()
    }
}

/// Node arena for one slot
#[derive(Debug, Clone)]
pub struct Graph {
    slot: String,
    nodes: Vec<Node>,
    roots: BTreeMap<String, NodeId>,
}

impl Graph {
    pub fn new(slot: impl Into<String>) -> Self {
        Graph {
            slot: slot.into(),
            nodes: Vec::new(),
            roots: BTreeMap::new(),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn label(&self, id: NodeId) -> &str {
        &self.nodes[id.0].label
    }

    /// All node ids in creation order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn roots(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.roots.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The shared root for `name`, created on first use
    pub fn root(&mut self, name: &str, origin: usize) -> NodeId {
        if let Some(id) = self.roots.get(name) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            label: name.to_string(),
            kind: NodeKind::Root {
                name: name.to_string(),
            },
            terminal: false,
            origin,
            asserted: Vec::new(),
            children: Vec::new(),
        });
        self.roots.insert(name.to_string(), id);
        id
    }

    /// Record an operation as a child of every node it reads.
    ///
    /// # Errors
    /// A definition error if any operand node is terminal.
    pub fn chain(&mut self, kind: NodeKind, origin: usize) -> Result<NodeId> {
        if matches!(kind, NodeKind::Root { .. }) {
            return Err(self.error(origin, "roots are created by name, not chained".into()));
        }
        let label = self.describe(&kind);
        let parents: Vec<NodeId> = kind.operands().into_iter().flat_map(Operand::nodes).collect();
        if let Some(terminal) = parents.iter().find(|p| self.nodes[p.0].terminal) {
            let message = format!(
                "cannot chain `{}` off comparison `{}`",
                label,
                self.label(*terminal)
            );
            return Err(self.error(origin, message));
        }

        let id = NodeId(self.nodes.len());
        let terminal = matches!(kind, NodeKind::Compare { .. });
        self.nodes.push(Node {
            label,
            kind,
            terminal,
            origin,
            asserted: Vec::new(),
            children: Vec::new(),
        });
        for parent in parents {
            let children = &mut self.nodes[parent.0].children;
            if !children.contains(&id) {
                children.push(id);
            }
        }
        Ok(id)
    }

    /// `node == operand`: remember the claim for the resolver
    pub fn assert_eq(&mut self, id: NodeId, operand: Operand, origin: usize) -> Result<()> {
        if self.nodes[id.0].terminal {
            let message = format!("cannot compare the result of `{}`", self.label(id));
            return Err(self.error(origin, message));
        }
        self.nodes[id.0].asserted.push(Assertion { operand, origin });
        Ok(())
    }

    pub(crate) fn error(&self, origin: usize, message: String) -> Error {
        Error::definition(Site::predicate(self.slot.clone(), origin), message)
    }

    fn describe(&self, kind: &NodeKind) -> String {
        match kind {
            NodeKind::Root { name } => name.clone(),
            NodeKind::Attr { target, name } => format!("{}.{}", self.text(target), name),
            NodeKind::Index { target, index } => {
                format!("{}[{}]", self.text(target), self.text(index))
            }
            NodeKind::Call {
                target,
                method,
                args,
            } => {
                let args: Vec<String> = args.iter().map(|a| self.text(a)).collect();
                format!("{}.{}({})", self.text(target), method.name(), args.join(", "))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.text(lhs), op.symbol(), self.text(rhs))
            }
            NodeKind::Compare { op, lhs, rhs } => {
                format!("{} {} {}", self.text(lhs), op.symbol(), self.text(rhs))
            }
        }
    }

    fn text(&self, operand: &Operand) -> String {
        match operand {
            Operand::Value(v) => v.to_string(),
            Operand::Node(id) => self.label(*id).to_string(),
            Operand::List(items) => {
                let items: Vec<String> = items.iter().map(|i| self.text(i)).collect();
                format!("({})", items.join(", "))
            }
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            write!(f, "#{} {}", i, node.label)?;
            if node.terminal {
                write!(f, " (terminal)")?;
            }
            if !node.asserted.is_empty() {
                let claims: Vec<String> =
                    node.asserted.iter().map(|a| self.text(&a.operand)).collect();
                write!(f, " == {}", claims.join(" == "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
