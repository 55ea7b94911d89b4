//! Contract verifier - attachment-time checks on a contract definition
//!
//! The verifier runs once, when a contract is built, and accumulates all
//! diagnostics rather than stopping at the first one.
//!
//! # Verification Phases
//!
//! 1. **Signature** - parameter names unique, not `return`, not the
//!    reserved identifier; options in range
//! 2. **Predicates** - bodies only use their declared parameters; style
//!    warnings for predicates that ignore their slot or parameters
//! 3. **Definitions** - derived variables depend only on declared
//!    parameters and shadow nothing

use std::collections::BTreeSet;

use crate::contract::{Contract, RETURN_SLOT};
use crate::parser::ast::Predicate;
use crate::{Error, Site};

// ── Verification Result Types ─────────────────────────────

/// Result of contract verification - accumulates all diagnostics
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationResult {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    /// Returns true if no errors were found (warnings are OK)
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Returns only error-level diagnostics
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    /// Returns only warning-level diagnostics
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    /// The first error as the `Error` a caller would see
    pub fn first_error(&self) -> Option<Error> {
        self.errors().first().map(|d| d.to_error())
    }

    fn add_error(&mut self, kind: DiagnosticKind, message: String, site: Option<Site>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            kind,
            message,
            site,
        });
    }

    fn add_warning(&mut self, message: String, site: Option<Site>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            kind: DiagnosticKind::Style,
            message,
            site,
        });
    }
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// A single verification diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub site: Option<Site>,
}

impl Diagnostic {
    pub fn to_error(&self) -> Error {
        match self.kind {
            DiagnosticKind::Definition => Error::definition(
                self.site.clone().unwrap_or_default(),
                self.message.clone(),
            ),
            _ => match &self.site {
                Some(site) => Error::ConfigurationError(format!("{}: {}", site, self.message)),
                None => Error::ConfigurationError(self.message.clone()),
            },
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if let Some(ref site) = self.site {
            write!(f, "{} [{}] at {}: {}", prefix, self.kind, site, self.message)
        } else {
            write!(f, "{} [{}]: {}", prefix, self.kind, self.message)
        }
    }
}

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Category of verification issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// The contract is attached incorrectly
    Configuration,
    /// The contract can never be satisfied as written
    Definition,
    Style,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DiagnosticKind::Configuration => write!(f, "configuration"),
            DiagnosticKind::Definition => write!(f, "definition"),
            DiagnosticKind::Style => write!(f, "style"),
        }
    }
}

// ── Public API ────────────────────────────────────────────

/// Verify a contract
///
/// Returns a `VerificationResult` containing all diagnostics found.
/// Use `result.is_valid()` to check if the contract passed.
pub fn verify(contract: &Contract) -> VerificationResult {
    let mut result = VerificationResult::new();

    verify_signature(contract, &mut result);
    verify_predicates(contract, &mut result);
    verify_definitions(contract, &mut result);

    result
}

// ── Phase 1: Signature ────────────────────────────────────

fn verify_signature(contract: &Contract, result: &mut VerificationResult) {
    let reserved = contract.options.reserved.as_str();
    if !is_identifier(reserved) {
        result.add_error(
            DiagnosticKind::Configuration,
            format!("reserved identifier `{}` is not a valid name", reserved),
            None,
        );
    }
    if reserved == RETURN_SLOT {
        result.add_error(
            DiagnosticKind::Configuration,
            format!("reserved identifier cannot be `{}`", RETURN_SLOT),
            None,
        );
    }
    if contract.options.max_iterations == 0 {
        result.add_error(
            DiagnosticKind::Configuration,
            "max_iterations must be at least 1".into(),
            None,
        );
    }

    let mut seen = BTreeSet::new();
    for name in contract.param_names() {
        let site = Some(Site::slot(name));
        if !seen.insert(name) {
            result.add_error(
                DiagnosticKind::Configuration,
                format!("duplicate parameter `{}`", name),
                site.clone(),
            );
        }
        if name == reserved {
            result.add_error(
                DiagnosticKind::Configuration,
                format!(
                    "reserved identifier `{}` collides with a parameter name; choose another with `reserved`",
                    reserved
                ),
                site.clone(),
            );
        }
        if name == RETURN_SLOT {
            result.add_error(
                DiagnosticKind::Configuration,
                format!("`{}` cannot be used as a parameter name", RETURN_SLOT),
                site,
            );
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

// ── Phase 2: Predicates ───────────────────────────────────

fn verify_predicates(contract: &Contract, result: &mut VerificationResult) {
    let reserved = contract.options.reserved.as_str();
    for (slot, predicates) in contract.slots() {
        for (ordinal, predicate) in predicates.iter().enumerate() {
            verify_predicate(slot, ordinal, predicate, reserved, result);
        }
    }
}

fn verify_predicate(
    slot: &str,
    ordinal: usize,
    predicate: &Predicate,
    reserved: &str,
    result: &mut VerificationResult,
) {
    let site = || Some(Site::predicate(slot, ordinal));

    let undeclared = predicate.undeclared_names();
    if !undeclared.is_empty() {
        result.add_error(
            DiagnosticKind::Configuration,
            format!(
                "`{}` uses names it does not declare: `{}`",
                predicate,
                undeclared.join("`, `")
            ),
            site(),
        );
    }

    if slot != RETURN_SLOT && predicate.params.iter().any(|p| p == RETURN_SLOT) {
        result.add_error(
            DiagnosticKind::Configuration,
            format!(
                "`{}` declares `{}`, which only return predicates can read",
                predicate, RETURN_SLOT
            ),
            site(),
        );
    }

    if !predicate.requires(slot) && !predicate.requires(reserved) {
        result.add_warning(
            format!(
                "`{}` reads neither `{}` nor `{}`; it does not check this slot",
                predicate, slot, reserved
            ),
            site(),
        );
    }

    for param in predicate.unused_params() {
        result.add_warning(format!("parameter `{}` is never used", param), site());
    }
}

// ── Phase 3: Definitions ──────────────────────────────────

fn verify_definitions(contract: &Contract, result: &mut VerificationResult) {
    let params: BTreeSet<&str> = contract.param_names().collect();
    let reserved = contract.options.reserved.as_str();
    let mut seen = BTreeSet::new();

    for definition in &contract.definitions {
        let name = definition.name.as_str();
        if !seen.insert(name) {
            result.add_error(
                DiagnosticKind::Configuration,
                format!("derived variable `{}` is defined twice", name),
                None,
            );
        }
        if params.contains(name) || name == reserved || name == RETURN_SLOT {
            result.add_error(
                DiagnosticKind::Configuration,
                format!("derived variable `{}` shadows a parameter or reserved name", name),
                None,
            );
        }

        let unknown: Vec<&str> = definition
            .expr
            .params
            .iter()
            .map(String::as_str)
            .filter(|p| !params.contains(p))
            .collect();
        if !unknown.is_empty() {
            let quoted: Vec<String> = unknown.iter().map(|u| format!("'{}'", u)).collect();
            result.add_error(
                DiagnosticKind::Definition,
                format!(
                    "unknown argument names `{{{}}}` in definition of `{}`",
                    quoted.join(", "),
                    name
                ),
                None,
            );
        }

        let undeclared = definition.expr.undeclared_names();
        if !undeclared.is_empty() {
            result.add_error(
                DiagnosticKind::Configuration,
                format!(
                    "definition of `{}` uses names it does not declare: `{}`",
                    name,
                    undeclared.join("`, `")
                ),
                None,
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────
