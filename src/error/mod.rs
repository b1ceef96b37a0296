//! Error types, diagnostics, and the uniform error-list shape.
//!
//! Two layers live here. The engine layer ([`ParseError`], [`ParseDiagnostic`],
//! [`SourceLocation`]) carries precise positions out of the XML parser. The
//! tool layer ([`ErrorEntry`], [`Outcome`]) is what the public operations in
//! [`crate::tools`] hand back to callers: either a success handle or a
//! non-empty list of `(line, message)` pairs.

use std::fmt;

use thiserror::Error;

/// Severity level for a parse diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// A non-fatal issue that doesn't make the document malformed.
    Warning,
    /// A recoverable error. The document is malformed but parsing continued.
    Error,
    /// An unrecoverable error. Parsing stopped here.
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the input.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single diagnostic emitted during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    /// The severity of this diagnostic.
    pub severity: ErrorSeverity,
    /// Human-readable error message.
    pub message: String,
    /// Where in the source this diagnostic was raised.
    pub location: SourceLocation,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.severity, self.message, self.location)
    }
}

/// Why a parse stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The input is not well-formed XML.
    Syntax,
    /// A configured resource limit (depth, name length, ...) was exceeded.
    Limit,
}

/// The error type returned when XML parsing fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {location}: {message}")]
pub struct ParseError {
    /// Whether this is a syntax error or a resource limit.
    pub kind: ParseErrorKind,
    /// The primary error message.
    pub message: String,
    /// Where in the source the fatal error occurred.
    pub location: SourceLocation,
    /// All diagnostics collected before the fatal error (warnings and
    /// recovered errors, in source order).
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseError {
    /// Returns `true` if this error came from a resource limit rather than
    /// malformed markup.
    #[must_use]
    pub fn is_limit(&self) -> bool {
        self.kind == ParseErrorKind::Limit
    }
}

/// Message prefix for failures that cannot be tied to a source line.
pub const UNKNOWN_ERROR_PREFIX: &str = "unknown error ";

/// One `(line, message)` pair reported to the caller.
///
/// `line == 0` marks an error that has no source position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorEntry {
    /// 1-based source line, or 0 when unknown.
    pub line: u32,
    /// Human-readable message.
    pub message: String,
}

impl ErrorEntry {
    /// Creates an entry for the given line.
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    /// Creates a line-0 entry for a failure outside the normal error taxonomy.
    pub fn unknown(description: impl fmt::Display) -> Self {
        Self {
            line: 0,
            message: format!("{UNKNOWN_ERROR_PREFIX}{description}"),
        }
    }

    /// Returns `true` for entries built with [`ErrorEntry::unknown`].
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.line == 0 && self.message.starts_with(UNKNOWN_ERROR_PREFIX)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl From<&ParseDiagnostic> for ErrorEntry {
    fn from(diag: &ParseDiagnostic) -> Self {
        Self::new(diag.location.line, diag.message.clone())
    }
}

/// An ordered list of error entries.
pub type ErrorList = Vec<ErrorEntry>;

/// The two shapes every public operation returns.
///
/// `Errors` is never constructed empty by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation succeeded and produced a handle.
    Success(T),
    /// The operation failed; the list is non-empty and in report order.
    Errors(ErrorList),
}

impl<T> Outcome<T> {
    /// Returns `true` for [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Borrows the success value, if any.
    #[must_use]
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Errors(_) => None,
        }
    }

    /// Borrows the error list; empty for a success.
    #[must_use]
    pub fn errors(&self) -> &[ErrorEntry] {
        match self {
            Self::Success(_) => &[],
            Self::Errors(errors) => errors,
        }
    }

    /// Maps the success value, leaving errors untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Errors(errors) => Outcome::Errors(errors),
        }
    }

    /// Converts into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the error list for [`Outcome::Errors`].
    pub fn into_result(self) -> Result<T, ErrorList> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Errors(errors) => Err(errors),
        }
    }
}

impl<T> From<Result<T, ErrorList>> for Outcome<T> {
    fn from(result: Result<T, ErrorList>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(errors) if errors.is_empty() => {
                Self::Errors(vec![ErrorEntry::unknown("(no diagnostics reported)")])
            }
            Err(errors) => Self::Errors(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation {
            line: 10,
            column: 5,
            byte_offset: 42,
        };
        assert_eq!(loc.to_string(), "10:5");
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError {
            kind: ParseErrorKind::Syntax,
            message: "unexpected end of input".to_string(),
            location: SourceLocation {
                line: 1,
                column: 15,
                byte_offset: 14,
            },
            diagnostics: vec![],
        };
        assert_eq!(err.to_string(), "parse error at 1:15: unexpected end of input");
        assert!(!err.is_limit());
    }

    #[test]
    fn test_parse_diagnostic_display() {
        let diag = ParseDiagnostic {
            severity: ErrorSeverity::Warning,
            message: "xmlns: URI 'x' is not absolute".to_string(),
            location: SourceLocation {
                line: 3,
                column: 10,
                byte_offset: 50,
            },
        };
        assert_eq!(diag.to_string(), "warning: xmlns: URI 'x' is not absolute at 3:10");
    }

    #[test]
    fn test_error_entry_unknown() {
        let entry = ErrorEntry::unknown("stream did not contain valid UTF-8");
        assert_eq!(entry.line, 0);
        assert_eq!(entry.message, "unknown error stream did not contain valid UTF-8");
        assert!(entry.is_unknown());
        assert!(!ErrorEntry::new(0, "plain").is_unknown());
    }

    #[test]
    fn test_error_entry_from_diagnostic() {
        let diag = ParseDiagnostic {
            severity: ErrorSeverity::Error,
            message: "boom".to_string(),
            location: SourceLocation {
                line: 7,
                column: 1,
                byte_offset: 0,
            },
        };
        assert_eq!(ErrorEntry::from(&diag), ErrorEntry::new(7, "boom"));
    }

    #[test]
    fn test_outcome_accessors() {
        let ok: Outcome<u8> = Outcome::Success(3);
        assert!(ok.is_success());
        assert_eq!(ok.success(), Some(&3));
        assert!(ok.errors().is_empty());

        let bad: Outcome<u8> = Outcome::Errors(vec![ErrorEntry::new(2, "nope")]);
        assert!(!bad.is_success());
        assert_eq!(bad.errors().len(), 1);
        assert_eq!(bad.map(|v| v * 2).into_result(), Err(vec![ErrorEntry::new(2, "nope")]));
    }

    #[test]
    fn test_outcome_from_empty_error_result_is_never_empty() {
        let outcome: Outcome<()> = Err(Vec::new()).into();
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].is_unknown());
    }
}
