//! Schema validation.
//!
//! RelaxNG is the only schema language supported. The [`relaxng`] module
//! compiles a schema document into a pattern grammar and checks instance
//! documents against it. Validation results use the shared
//! [`ValidationResult`] type, whose errors carry the line of the instance
//! node that caused them.

pub mod datatypes;
pub mod relaxng;

use std::fmt;

/// Result of validating a document against a schema.
///
/// # Examples
///
/// ```
/// use xmltools::validation::{ValidationError, ValidationResult};
///
/// let result = ValidationResult::from_errors(vec![ValidationError::new(3, "boom")]);
/// assert!(!result.is_valid);
/// assert_eq!(result.to_string(), "invalid (1 error(s))");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the document is valid according to the schema.
    pub is_valid: bool,
    /// Validation errors in document order.
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Builds a result whose validity is derived from the error list.
    #[must_use]
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// A validation error with the line of the node that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Human-readable description of the problem.
    pub message: String,
    /// 1-based line number, or 0 when the node has no source position.
    pub line: u32,
}

impl ValidationError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            write!(f, "valid")
        } else {
            write!(f, "invalid ({} error(s))", self.errors.len())
        }
    }
}
