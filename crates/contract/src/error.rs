//! Error types for schema compilation and validation

use std::fmt;

use thiserror::Error;

use crate::validate::Violation;

/// Result type alias for schema compilation
pub type ContractResult<T> = Result<T, SchemaDefinitionError>;

/// A single problem found in a schema fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionProblem {
    /// Location inside the schema document, e.g. `#/properties/count`
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for DefinitionProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.schema_path, self.message)
    }
}

/// The schema fixture itself is malformed.
///
/// Raised by [`crate::Schema::from_json`] and [`crate::compile`] before any
/// data is checked. Every problem found in the fixture is listed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid schema definition ({} problem(s)):\n{}", .problems.len(), render_lines(.problems))]
pub struct SchemaDefinitionError {
    pub problems: Vec<DefinitionProblem>,
}

impl SchemaDefinitionError {
    pub(crate) fn new(problems: Vec<DefinitionProblem>) -> Self {
        Self { problems }
    }

    /// Error for a single problem at the schema root
    pub fn single(message: impl Into<String>) -> Self {
        Self::new(vec![DefinitionProblem {
            schema_path: "#".to_string(),
            message: message.into(),
        }])
    }
}

/// A value did not conform to its schema.
///
/// Only produced by [`crate::assert_valid`]; it always carries the complete
/// list of violations found in the pass.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Schema validation failed with {} violation(s):\n{}", .violations.len(), render_lines(.violations))]
pub struct SchemaValidationError {
    pub violations: Vec<Violation>,
}

impl SchemaValidationError {
    /// Violations as a pretty-printed JSON array, for machine-readable reports
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.violations).unwrap_or_else(|_| self.to_string())
    }
}

fn render_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
