//! Contract executor - runs one checked call through its phases
//!
//! ```text
//! INIT → CHECK_PARAMS → INVOKE → CHECK_RETURN → DONE
//!   └──────────────→ BYPASS (evaluate = false)
//! ```
//!
//! Every call gets a fresh [`Environment`]; nothing mutable is shared
//! between calls, so a [`Contracted`] function can be called from many
//! threads at once.
//!
//! # Guarantees
//!
//! - **Fail fast**: the first violated predicate aborts the call
//! - **No partial success**: parameters are checked before the wrapped
//!   function runs; a failed return check happens after it ran and its
//!   effects are not undone
//! - **Transparent bypass**: with `evaluate = false` the wrapped function
//!   is called exactly as if it were not contracted

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contract::{Contract, RETURN_SLOT};
use crate::env::{BindingKind, Environment};
use crate::evaluator::{check_slot, evaluate_value};
use crate::value::Value;
use crate::{Error, Result};

// ── Phases ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    CheckParams,
    /// Parameters accepted, waiting for the wrapped function's result
    Invoke,
    CheckReturn,
    Done,
    Bypass,
}

/// A call whose parameters have been checked
#[derive(Debug)]
pub struct CallCheck<'c> {
    contract: &'c Contract,
    args: Vec<Value>,
    env: Environment,
    phase: Phase,
}

impl<'c> CallCheck<'c> {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Bindings resolved so far, including logical variables like `m`
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn into_environment(self) -> Environment {
        self.env
    }

    fn run_params(&mut self) -> Result<()> {
        let contract = self.contract;
        self.phase = Phase::CheckParams;
        tracing::debug!(contract = %contract.name(), phase = ?self.phase, "phase");

        for (name, value) in contract.param_names().zip(self.args.iter()) {
            self.env.bind_as(BindingKind::Argument, name, value.clone())?;
        }
        for definition in contract.definitions() {
            let value = evaluate_value(&definition.expr, &self.env).map_err(|e| match e {
                Error::DefinitionError { site, message } => Error::DefinitionError {
                    site,
                    message: format!("in definition of `{}`: {}", definition.name, message),
                },
                other => other,
            })?;
            self.env
                .bind_as(BindingKind::Derived, &definition.name, value)?;
        }
        for (parameter, value) in contract.parameters().iter().zip(self.args.iter()) {
            check_slot(
                &mut self.env,
                &parameter.name,
                value,
                &parameter.predicates,
                contract.options(),
            )?;
        }

        self.phase = Phase::Invoke;
        Ok(())
    }

    /// Check the wrapped function's result against the return predicates
    ///
    /// # Errors
    /// - `ContractViolation` / `DefinitionError` from the return slot
    /// - `ConfigurationError` if the return value was already checked
    pub fn finish(&mut self, result: &Value) -> Result<()> {
        match self.phase {
            Phase::Bypass => return Ok(()),
            Phase::Invoke => {}
            other => {
                return Err(Error::ConfigurationError(format!(
                    "cannot check a return value in phase {:?}",
                    other
                )))
            }
        }
        let contract = self.contract;
        self.phase = Phase::CheckReturn;
        tracing::debug!(contract = %contract.name(), phase = ?self.phase, "phase");

        self.env
            .bind_as(BindingKind::Return, RETURN_SLOT, result.clone())?;
        self.env
            .bind_as(BindingKind::Return, &contract.options().reserved, result.clone())?;
        check_slot(
            &mut self.env,
            RETURN_SLOT,
            result,
            contract.returns(),
            contract.options(),
        )?;

        self.phase = Phase::Done;
        Ok(())
    }
}

// ── Entry points ──────────────────────────────────────────

impl Contract {
    /// Bind positional arguments and check every parameter slot
    ///
    /// # Errors
    /// - `ConfigurationError` on an argument count mismatch
    /// - `ContractViolation` / `DefinitionError` from derived variables
    ///   or parameter predicates
    pub fn begin(&self, args: Vec<Value>) -> Result<CallCheck<'_>> {
        let mut check = CallCheck {
            contract: self,
            args,
            env: Environment::new(),
            phase: Phase::Init,
        };
        if !self.options().evaluate {
            check.phase = Phase::Bypass;
            tracing::debug!(contract = %self.name(), "checking disabled, bypass");
            return Ok(check);
        }
        if check.args.len() != self.parameters().len() {
            return Err(Error::ConfigurationError(format!(
                "`{}` takes {} argument(s) but {} were given",
                self.name(),
                self.parameters().len(),
                check.args.len()
            )));
        }
        check.run_params()?;
        Ok(check)
    }

    /// Like [`begin`](Self::begin) with arguments given by name
    pub fn begin_named(&self, args: BTreeMap<String, Value>) -> Result<CallCheck<'_>> {
        let args = self.order_args(args)?;
        self.begin(args)
    }

    fn order_args(&self, mut named: BTreeMap<String, Value>) -> Result<Vec<Value>> {
        let mut args = Vec::with_capacity(self.parameters().len());
        for name in self.param_names() {
            let value = named.remove(name).ok_or_else(|| {
                Error::ConfigurationError(format!("`{}` is missing argument `{}`", self.name(), name))
            })?;
            args.push(value);
        }
        if let Some(extra) = named.keys().next() {
            return Err(Error::ConfigurationError(format!(
                "`{}` got an unexpected argument `{}`",
                self.name(),
                extra
            )));
        }
        Ok(args)
    }

    /// Run a whole checked call: parameters, `f`, return value
    pub fn call<F>(&self, args: Vec<Value>, f: F) -> Result<Value>
    where
        F: FnOnce(&[Value]) -> Value,
    {
        let mut check = self.begin(args)?;
        let result = f(check.args());
        check.finish(&result)?;
        Ok(result)
    }

    pub fn call_named<F>(&self, args: BTreeMap<String, Value>, f: F) -> Result<Value>
    where
        F: FnOnce(&[Value]) -> Value,
    {
        let args = self.order_args(args)?;
        self.call(args, f)
    }

    /// Attach this contract to a function
    pub fn wrap<F>(self, f: F) -> Contracted<F>
    where
        F: Fn(&[Value]) -> Value,
    {
        Contracted::new(Arc::new(self), f)
    }
}

// ── Contracted functions ──────────────────────────────────

/// A function paired with its contract
#[derive(Debug, Clone)]
pub struct Contracted<F> {
    contract: Arc<Contract>,
    f: F,
}

impl<F> Contracted<F>
where
    F: Fn(&[Value]) -> Value,
{
    pub fn new(contract: Arc<Contract>, f: F) -> Self {
        Contracted { contract, f }
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.contract.call(args, &self.f)
    }

    pub fn call_named(&self, args: BTreeMap<String, Value>) -> Result<Value> {
        self.contract.call_named(args, &self.f)
    }

    /// The function without its contract
    pub fn inner(&self) -> &F {
        &self.f
    }
}

// ── Tests ─────────────────────────────────────────────────
