//! DBC Core - design by contract with free logical variables
//!
//! A contract attaches predicates to each parameter and to the return
//! value of a function. Predicate parameters that are not function
//! arguments are logical variables: they are bound by the first
//! predicate that determines them and every later use must agree.
//!
//! ```text
//! |a, m, n| a.shape == (m, n)      binds m, n from a
//! |b, n, o| b.shape == (n, o)      checks n, binds o
//! |x, m, o| x.shape == (m, o)      checks the result
//! ```
//!
//! # Architecture
//!
//! ```text
//! Predicate Text → Parser → AST ─┐
//!                                ↓
//! ContractBuilder → Verifier → Contract
//!                                ↓
//!         Executor: args → Environment → per slot:
//!                                ├─ unification (SymbolTable)
//!                                └─ deferred (Graph → Resolver fixpoint)
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: same contract and arguments, same outcome
//! - **Order-sensitive**: slots are checked in declaration order and a
//!   logical variable keeps the first value it was bound to
//! - **Bounded**: deferred resolution stops after `max_iterations` passes
//! - **Re-entrant**: each call owns its bindings

pub mod contract;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod graph;
pub mod parser;
pub mod resolver;
pub mod symbol;
pub mod value;
pub mod verifier;

pub use contract::{
    Contract, ContractBuilder, ContractDescription, ContractOptions, Definition, Parameter,
    RETURN_SLOT,
};
pub use env::{BindingKind, Environment};
pub use error::{Error, Result, Site, Violation};
pub use executor::{CallCheck, Contracted, Phase};
pub use parser::ast::{Expr, Predicate};
pub use value::Value;
pub use verifier::{verify, VerificationResult};
