//! Contract definition - what is checked for one callable
//!
//! A [`Contract`] is built once, verified, and read-only afterwards.
//! It lists the parameters in declaration order with their predicates,
//! the return predicates, derived-variable definitions and options.
//!
//! # Contract files
//!
//! ```json
//! {
//!   "name": "matmul",
//!   "parameters": [
//!     { "name": "a", "predicates": ["|a, m, n| a.shape == (m, n)"] },
//!     { "name": "b", "predicates": ["|b, n, o| b.shape == (n, o)"] }
//!   ],
//!   "returns": ["|x, m, o| x.shape == (m, o)"],
//!   "definitions": { "k": "|a| a.shape[0] * 2" },
//!   "options": { "reserved": "x", "evaluate": true }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::parser::ast::Predicate;
use crate::verifier::{self, VerificationResult};
use crate::{Error, Result};

/// Slot name used for the return value
pub const RETURN_SLOT: &str = "return";

// ── Contract types ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContractOptions {
    /// Name a predicate uses for the value of the slot it is attached to
    pub reserved: String,
    /// When false, calls go straight through without any checking
    pub evaluate: bool,
    /// Cap on fixpoint passes per slot
    pub max_iterations: usize,
}

impl Default for ContractOptions {
    fn default() -> Self {
        ContractOptions {
            reserved: "x".into(),
            evaluate: true,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub predicates: Vec<Predicate>,
}

/// A derived variable: `name` is bound to the value of `expr`,
/// evaluated over the declared parameters it names
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub expr: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub(crate) name: String,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) returns: Vec<Predicate>,
    pub(crate) definitions: Vec<Definition>,
    pub(crate) options: ContractOptions,
}

impl Contract {
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder::new(name)
    }

    /// Load and verify a contract file
    pub fn from_json(text: &str) -> Result<Contract> {
        ContractBuilder::from_json(text)?.build()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Contract> {
        ContractBuilder::from_file(path)?.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn returns(&self) -> &[Predicate] {
        &self.returns
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn options(&self) -> &ContractOptions {
        &self.options
    }

    /// Every slot with its predicates, parameters first, then `return`
    pub fn slots(&self) -> impl Iterator<Item = (&str, &[Predicate])> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), p.predicates.as_slice()))
            .chain(std::iter::once((RETURN_SLOT, self.returns.as_slice())))
    }

    /// Serializable summary for documentation
    pub fn describe(&self) -> ContractDescription {
        ContractDescription {
            name: self.name.clone(),
            parameters: self
                .parameters
                .iter()
                .map(|p| SlotDescription {
                    name: p.name.clone(),
                    predicates: p.predicates.iter().map(ToString::to_string).collect(),
                })
                .collect(),
            returns: self.returns.iter().map(ToString::to_string).collect(),
            definitions: self
                .definitions
                .iter()
                .map(|d| (d.name.clone(), d.expr.to_string()))
                .collect(),
            options: self.options.clone(),
        }
    }
}

// ── Description ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotDescription {
    pub name: String,
    pub predicates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractDescription {
    pub name: String,
    pub parameters: Vec<SlotDescription>,
    pub returns: Vec<String>,
    pub definitions: BTreeMap<String, String>,
    pub options: ContractOptions,
}

impl fmt::Display for ContractDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
        writeln!(f, "{}({})", self.name, names.join(", "))?;
        for slot in &self.parameters {
            for predicate in &slot.predicates {
                writeln!(f, "  {}: {}", slot.name, predicate)?;
            }
        }
        for predicate in &self.returns {
            writeln!(f, "  {}: {}", RETURN_SLOT, predicate)?;
        }
        for (name, expr) in &self.definitions {
            writeln!(f, "  where {} = {}", name, expr)?;
        }
        if !self.options.evaluate {
            writeln!(f, "  (checking disabled)")?;
        }
        Ok(())
    }
}

// ── Builder ───────────────────────────────────────────────

/// Anything that can stand for a predicate at attachment time
pub trait IntoPredicate {
    fn into_predicate(self) -> Result<Predicate>;
}

impl IntoPredicate for Predicate {
    fn into_predicate(self) -> Result<Predicate> {
        Ok(self)
    }
}

impl IntoPredicate for &str {
    fn into_predicate(self) -> Result<Predicate> {
        Predicate::parse(self)
    }
}

impl IntoPredicate for String {
    fn into_predicate(self) -> Result<Predicate> {
        Predicate::parse(&self)
    }
}

impl IntoPredicate for &String {
    fn into_predicate(self) -> Result<Predicate> {
        Predicate::parse(self)
    }
}

/// Collects a contract; parse errors surface at [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    name: String,
    parameters: Vec<Parameter>,
    returns: Vec<Predicate>,
    definitions: Vec<Definition>,
    options: ContractOptions,
    errors: Vec<Error>,
}

impl ContractBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ContractBuilder {
            name: name.into(),
            parameters: Vec::new(),
            returns: Vec::new(),
            definitions: Vec::new(),
            options: ContractOptions::default(),
            errors: Vec::new(),
        }
    }

    fn collect<I, P>(&mut self, predicates: I) -> Vec<Predicate>
    where
        I: IntoIterator<Item = P>,
        P: IntoPredicate,
    {
        let mut parsed = Vec::new();
        for predicate in predicates {
            match predicate.into_predicate() {
                Ok(p) => parsed.push(p),
                Err(e) => self.errors.push(e),
            }
        }
        parsed
    }

    /// Declare the next parameter with its predicates
    pub fn param<I, P>(mut self, name: impl Into<String>, predicates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: IntoPredicate,
    {
        let predicates = self.collect(predicates);
        self.parameters.push(Parameter {
            name: name.into(),
            predicates,
        });
        self
    }

    /// Declare a parameter without predicates
    pub fn bare(self, name: impl Into<String>) -> Self {
        self.param(name, Vec::<Predicate>::new())
    }

    pub fn returns<I, P>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: IntoPredicate,
    {
        let predicates = self.collect(predicates);
        self.returns.extend(predicates);
        self
    }

    /// Add a derived variable computed from declared parameters
    pub fn define(mut self, name: impl Into<String>, expr: impl IntoPredicate) -> Self {
        match expr.into_predicate() {
            Ok(expr) => self.definitions.push(Definition {
                name: name.into(),
                expr,
            }),
            Err(e) => self.errors.push(e),
        }
        self
    }

    pub fn reserved(mut self, name: impl Into<String>) -> Self {
        self.options.reserved = name.into();
        self
    }

    pub fn evaluate(mut self, evaluate: bool) -> Self {
        self.options.evaluate = evaluate;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.options.max_iterations = max_iterations;
        self
    }

    pub fn options(mut self, options: ContractOptions) -> Self {
        self.options = options;
        self
    }

    fn assemble(&self) -> Result<Contract> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }
        Ok(Contract {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            returns: self.returns.clone(),
            definitions: self.definitions.clone(),
            options: self.options.clone(),
        })
    }

    /// Run the verifier without rejecting anything
    pub fn verify(&self) -> Result<VerificationResult> {
        Ok(verifier::verify(&self.assemble()?))
    }

    /// Verify and freeze the contract.
    ///
    /// # Errors
    /// The first parse error, otherwise the first error-level diagnostic.
    /// Warnings are logged and do not fail the build.
    pub fn build(self) -> Result<Contract> {
        let contract = self.assemble()?;
        let report = verifier::verify(&contract);
        for warning in report.warnings() {
            tracing::warn!(contract = %contract.name, "{}", warning);
        }
        if let Some(err) = report.first_error() {
            return Err(err);
        }
        tracing::debug!(
            contract = %contract.name,
            parameters = contract.parameters.len(),
            definitions = contract.definitions.len(),
            "contract built"
        );
        Ok(contract)
    }

    // ── Contract files ─────────────────────────────────

    /// Read a contract file without verifying it
    pub fn from_json(text: &str) -> Result<ContractBuilder> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::ConfigurationError(format!("Invalid contract JSON: {}", e)))?;
        let root = json.as_object().ok_or_else(|| {
            Error::ConfigurationError("contract file must be a JSON object".into())
        })?;

        let name = match root.get("name") {
            None => "contract",
            Some(serde_json::Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(Error::ConfigurationError(format!(
                    "contract name must be a string, got {}",
                    json_type(other)
                )))
            }
        };
        let mut builder = ContractBuilder::new(name);

        for param in json_array(root.get("parameters"), "parameters")? {
            builder = match param {
                serde_json::Value::String(name) => builder.bare(name.as_str()),
                serde_json::Value::Object(fields) => {
                    let name = fields.get("name").and_then(|n| n.as_str()).ok_or_else(|| {
                        Error::ConfigurationError("every parameter needs a string `name`".into())
                    })?;
                    let texts = predicate_texts(fields.get("predicates"), name)?;
                    builder.param(name, texts)
                }
                other => {
                    return Err(Error::ConfigurationError(format!(
                        "parameter entries must be strings or objects, got {}",
                        json_type(other)
                    )))
                }
            };
        }

        let returns = predicate_texts(root.get("returns"), RETURN_SLOT)?;
        builder = builder.returns(returns);

        match root.get("definitions") {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Object(defs)) => {
                for (name, expr) in defs {
                    let text = expr.as_str().ok_or_else(|| {
                        Error::ConfigurationError(format!(
                            "expected callable for dependency `{}`",
                            name
                        ))
                    })?;
                    builder = builder.define(name.as_str(), text);
                }
            }
            Some(other) => {
                return Err(Error::ConfigurationError(format!(
                    "definitions must be an object of name to predicate, got {}",
                    json_type(other)
                )))
            }
        }

        match root.get("options") {
            None | Some(serde_json::Value::Null) => {}
            Some(options @ serde_json::Value::Object(_)) => {
                let options: ContractOptions = serde_json::from_value(options.clone())
                    .map_err(|e| Error::ConfigurationError(format!("Invalid options: {}", e)))?;
                builder = builder.options(options);
            }
            Some(other) => {
                return Err(Error::ConfigurationError(format!(
                    "options must be given by name (an object), got {}",
                    json_type(other)
                )))
            }
        }

        Ok(builder)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<ContractBuilder> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigurationError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        ContractBuilder::from_json(&text)
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn json_array<'a>(
    value: Option<&'a serde_json::Value>,
    field: &str,
) -> Result<&'a [serde_json::Value]> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(&[]),
        Some(serde_json::Value::Array(items)) => Ok(items),
        Some(other) => Err(Error::ConfigurationError(format!(
            "`{}` must be an array, got {}",
            field,
            json_type(other)
        ))),
    }
}

fn predicate_texts<'a>(value: Option<&'a serde_json::Value>, slot: &str) -> Result<Vec<&'a str>> {
    json_array(value, slot)?
        .iter()
        .map(|p| {
            p.as_str().ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "expected callable predicate for `{}`, got {}",
                    slot,
                    json_type(p)
                ))
            })
        })
        .collect()
}
