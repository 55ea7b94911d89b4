//! Error types for contract checking
//!
//! All fallible operations return `Result<T, Error>`.
//! Three disjoint kinds reach the caller of a contracted function:
//!
//! - **Contract violation** - the caller's data broke a predicate.
//! - **Definition error** - the contract itself is wrong (unbound
//!   symbols, unresolvable deferred nodes, bad derived variables).
//! - **Configuration error** - the contract was attached incorrectly.
//!
//! `ParseError` covers predicate text that does not parse; it is raised
//! at attachment time and belongs to the configuration class.

use std::fmt;

use crate::value::Value;

/// Where in a contract an error was raised.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Site {
    /// Parameter name, or `"return"` for the return slot. `None` for
    /// contract-level errors such as derived-variable definitions.
    pub slot: Option<String>,
    /// Zero-based position of the predicate within its slot.
    pub predicate: Option<usize>,
}

impl Site {
    /// Contract-level site (no slot)
    pub fn contract() -> Self {
        Site::default()
    }

    pub fn slot(name: impl Into<String>) -> Self {
        Site {
            slot: Some(name.into()),
            predicate: None,
        }
    }

    pub fn predicate(name: impl Into<String>, ordinal: usize) -> Self {
        Site {
            slot: Some(name.into()),
            predicate: Some(ordinal),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.slot {
            Some(slot) => write!(f, "slot `{}`", slot)?,
            None => write!(f, "contract")?,
        }
        if let Some(ordinal) = self.predicate {
            write!(f, ", predicate #{}", ordinal + 1)?;
        }
        Ok(())
    }
}

/// Why a contract was violated
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// A predicate evaluated to false
    Failed,
    /// One logical variable received two different values
    Ambiguity {
        variables: Vec<String>,
        values: Vec<Value>,
    },
    /// A deferred comparison settled to false
    Comparison { label: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Violation::Failed => write!(f, "predicate evaluated to false"),
            Violation::Ambiguity { variables, values } => {
                match variables.as_slice() {
                    [single] => write!(f, "ambiguity in variable `{}`: ", single)?,
                    many => write!(f, "ambiguity between `{}`: ", many.join("` and `"))?,
                }
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Violation::Comparison { label } => write!(f, "comparison `{}` does not hold", label),
        }
    }
}

/// Contract checking error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Caller data does not satisfy the contract
    #[error("Contract violation - {site}: {reason}")]
    ContractViolation { site: Site, reason: Violation },

    /// The contract is wrong regardless of the data it is given
    #[error("Definition error - {site}: {message}")]
    DefinitionError { site: Site, message: String },

    /// The contract was attached or invoked with an invalid configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Predicate text does not parse
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Error {
    pub fn violation(site: Site, reason: Violation) -> Self {
        Error::ContractViolation { site, reason }
    }

    pub fn definition(site: Site, message: impl Into<String>) -> Self {
        Error::DefinitionError {
            site,
            message: message.into(),
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, Error::ContractViolation { .. })
    }

    pub fn is_definition_error(&self) -> bool {
        matches!(self, Error::DefinitionError { .. })
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::ConfigurationError(_) | Error::ParseError(_))
    }

    /// The site this error points at, if it has one
    pub fn site(&self) -> Option<&Site> {
        match self {
            Error::ContractViolation { site, .. } | Error::DefinitionError { site, .. } => {
                Some(site)
            }
            _ => None,
        }
    }

    /// Attach a site to an error raised without one.
    ///
    /// Errors that already carry a slot keep it.
    pub fn at(self, site: &Site) -> Self {
        match self {
            Error::ContractViolation { site: inner, reason } if inner.slot.is_none() => {
                Error::ContractViolation {
                    site: site.clone(),
                    reason,
                }
            }
            Error::DefinitionError {
                site: inner,
                message,
            } if inner.slot.is_none() => Error::DefinitionError {
                site: site.clone(),
                message,
            },
            other => other,
        }
    }
}

/// Result type alias for contract operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_display() {
        assert_eq!(Site::contract().to_string(), "contract");
        assert_eq!(Site::slot("b").to_string(), "slot `b`");
        assert_eq!(Site::predicate("return", 1).to_string(), "slot `return`, predicate #2");
    }

    #[test]
    fn test_ambiguity_display() {
        let reason = Violation::Ambiguity {
            variables: vec!["n".into()],
            values: vec![Value::Integer(2), Value::Integer(4)],
        };
        assert_eq!(reason.to_string(), "ambiguity in variable `n`: [2, 4]");

        let reason = Violation::Ambiguity {
            variables: vec!["m".into(), "n".into()],
            values: vec![Value::Integer(1), Value::Integer(3)],
        };
        assert_eq!(reason.to_string(), "ambiguity between `m` and `n`: [1, 3]");
    }

    #[test]
    fn test_error_display() {
        let err = Error::violation(Site::predicate("b", 0), Violation::Failed);
        assert_eq!(
            err.to_string(),
            "Contract violation - slot `b`, predicate #1: predicate evaluated to false"
        );
        let err = Error::ConfigurationError("bad".into());
        assert_eq!(err.to_string(), "Configuration error: bad");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::violation(Site::contract(), Violation::Failed).is_violation());
        assert!(Error::definition(Site::contract(), "x").is_definition_error());
        assert!(Error::ConfigurationError("x".into()).is_configuration_error());
        assert!(Error::ParseError("x".into()).is_configuration_error());
    }

    #[test]
    fn test_at_fills_missing_site_only() {
        let site = Site::predicate("a", 2);
        let err = Error::definition(Site::contract(), "boom").at(&site);
        assert_eq!(err.site(), Some(&site));

        let inner = Site::predicate("b", 0);
        let err = Error::definition(inner.clone(), "boom").at(&site);
        assert_eq!(err.site(), Some(&inner));
    }
}
