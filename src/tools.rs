//! The three core operations: well-formedness validation, RelaxNG schema
//! compilation, and `XPath` evaluation.
//!
//! Each operation is stateless and translates the engine's own error types
//! into the uniform [`Outcome`] / [`ErrorEntry`] shape, so callers only deal
//! with `(line, message)` pairs. Panics raised inside an engine are caught
//! here and reported as a single line-0 `unknown error` entry.
//!
//! ```
//! use xmltools::tools;
//!
//! let tree = tools::validate("<a><b/><c/></a>").into_result().unwrap();
//! assert_eq!(tools::evaluate(&tree, "/a/*"), "<b/>\n<c/>\n");
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{ErrorEntry, ErrorList, ErrorSeverity, Outcome};
use crate::parser::{self, ParseOptions};
use crate::serial::{serialize_attribute, serialize_node};
use crate::tree::{Document, NodeId};
use crate::validation::relaxng::{self, RelaxNgSchema};
use crate::xpath::{self, XPathNode, XPathValue};

/// Prefix of every failed query result.
pub const XPATH_ERROR_PREFIX: &str = "XPath syntax error: ";

/// A well-formed document produced by [`validate`].
#[derive(Debug, Clone)]
pub struct ParsedTree {
    doc: Document,
}

impl ParsedTree {
    /// The parsed document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The document element.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.doc.root_element()
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        self.doc
    }
}

/// A compiled RelaxNG schema produced by [`compile_schema`].
#[derive(Debug, Clone)]
pub struct SchemaHandle {
    schema: RelaxNgSchema,
}

impl SchemaHandle {
    #[must_use]
    pub fn schema(&self) -> &RelaxNgSchema {
        &self.schema
    }

    /// Validates an instance document against the schema.
    ///
    /// Each error carries the line of the offending instance node.
    #[must_use]
    pub fn validate(&self, tree: &ParsedTree) -> Outcome<()> {
        guarded("schema validation", || {
            let result = relaxng::validate(&tree.doc, &self.schema);
            if result.is_valid {
                Outcome::Success(())
            } else {
                Outcome::Errors(
                    result
                        .errors
                        .into_iter()
                        .map(|e| ErrorEntry::new(e.line, e.message))
                        .collect(),
                )
            }
        })
    }
}

/// Parses `text` and checks it for well-formedness with default options.
#[must_use]
pub fn validate(text: &str) -> Outcome<ParsedTree> {
    validate_with_options(text, &ParseOptions::default())
}

/// Parses `text` with the given options.
///
/// Recovered errors are listed before the fatal error that stopped the
/// parse; warnings are not reported. A resource limit produces a single
/// line-0 entry.
#[must_use]
pub fn validate_with_options(text: &str, options: &ParseOptions) -> Outcome<ParsedTree> {
    guarded("validation", || {
        let outcome = match parser::parse_str_with_options(text, options) {
            Ok(doc) => {
                let errors = errors_of(&doc.diagnostics);
                if errors.is_empty() {
                    Outcome::Success(ParsedTree { doc })
                } else {
                    Outcome::Errors(errors)
                }
            }
            Err(e) if e.is_limit() => Outcome::Errors(vec![ErrorEntry::unknown(&e.message)]),
            Err(e) => {
                let mut errors = errors_of(&e.diagnostics);
                errors.push(ErrorEntry::new(e.location.line, e.message));
                Outcome::Errors(errors)
            }
        };
        tracing::debug!(
            well_formed = outcome.is_success(),
            errors = outcome.errors().len(),
            "XML validation finished"
        );
        outcome
    })
}

/// Decodes `bytes` as UTF-8 and validates the text.
#[must_use]
pub fn validate_bytes(bytes: &[u8]) -> Outcome<ParsedTree> {
    validate_bytes_with_options(bytes, &ParseOptions::default())
}

/// Like [`validate_bytes`], with parse options.
#[must_use]
pub fn validate_bytes_with_options(bytes: &[u8], options: &ParseOptions) -> Outcome<ParsedTree> {
    match std::str::from_utf8(bytes) {
        Ok(text) => validate_with_options(text, options),
        Err(e) => Outcome::Errors(vec![ErrorEntry::unknown(e)]),
    }
}

/// Compiles a parsed document as a RelaxNG schema.
///
/// Errors carry the line of the schema element that caused them.
#[must_use]
pub fn compile_schema(tree: &ParsedTree) -> Outcome<SchemaHandle> {
    guarded("schema compilation", || match relaxng::compile(&tree.doc) {
        Ok(schema) => Outcome::Success(SchemaHandle { schema }),
        Err(errors) => Outcome::Errors(
            errors
                .into_iter()
                .map(|e| ErrorEntry::new(e.line, e.message))
                .collect(),
        ),
    })
}

/// Evaluates an `XPath` expression with the root element as context node.
///
/// Matched nodes are serialized one per line, in document order; scalar
/// results render as their string value. A failed query produces
/// `"XPath syntax error: <description>\n"`. Never panics.
#[must_use]
pub fn evaluate(tree: &ParsedTree, expression: &str) -> String {
    let doc = &tree.doc;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let context = doc.root_element().unwrap_or_else(|| doc.root());
        xpath::evaluate(doc, context, expression)
    }));
    match result {
        Ok(Ok(value)) => render(doc, &value),
        Ok(Err(e)) => {
            tracing::debug!(expression, error = %e, "XPath evaluation failed");
            format!("{XPATH_ERROR_PREFIX}{e}\n")
        }
        Err(payload) => {
            let description = panic_message(payload.as_ref());
            tracing::warn!(expression, %description, "XPath evaluation panicked");
            format!("{XPATH_ERROR_PREFIX}{description}\n")
        }
    }
}

fn render(doc: &Document, value: &XPathValue) -> String {
    let XPathValue::NodeSet(nodes) = value else {
        return format!("{}\n", value.to_xpath_string(doc));
    };
    tracing::debug!(matches = nodes.len(), "XPath query evaluated");
    let mut out = String::new();
    for &node in nodes {
        match node {
            XPathNode::Node(id) => out.push_str(&serialize_node(doc, id)),
            XPathNode::Attribute { .. } => {
                if let Some(attr) = node.attribute(doc) {
                    out.push_str(&serialize_attribute(attr));
                }
            }
        }
        out.push('\n');
    }
    out
}

fn errors_of(diagnostics: &[crate::error::ParseDiagnostic]) -> ErrorList {
    diagnostics
        .iter()
        .filter(|d| d.severity != ErrorSeverity::Warning)
        .map(ErrorEntry::from)
        .collect()
}

/// Runs an engine call, turning a panic into a line-0 error entry.
fn guarded<T>(operation: &'static str, f: impl FnOnce() -> Outcome<T>) -> Outcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let description = panic_message(payload.as_ref());
            tracing::warn!(operation, %description, "internal failure");
            Outcome::Errors(vec![ErrorEntry::unknown(description)])
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal failure".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(text: &str) -> ParsedTree {
        validate(text).into_result().unwrap()
    }

    #[test]
    fn test_well_formed_document() {
        let parsed = tree("<a><b/></a>");
        let root = parsed.root_element().unwrap();
        assert_eq!(parsed.document().node_name(root), Some("a"));
        assert_eq!(parsed.document().children(root).count(), 1);
    }

    #[test]
    fn test_mismatched_tag() {
        let outcome = validate("<a><b></a>");
        let errors = outcome.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);
        assert!(errors[0].message.contains("mismatched"), "{}", errors[0].message);
    }

    #[test]
    fn test_recovered_errors_precede_fatal() {
        let options = ParseOptions::default().recover(true);
        let outcome = validate_with_options("<a x='1' x='2'>\n<!-- x -- y --></a>", &options);
        let errors = outcome.errors();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[0].message, "attribute 'x' redefined");
        assert_eq!(errors[1].line, 2);
        assert_eq!(errors[1].message, "'--' not allowed in comments");
    }

    #[test]
    fn test_limit_is_unknown_error() {
        let options = ParseOptions::default().max_depth(2);
        let outcome = validate_with_options("<a><b><c/></b></a>", &options);
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].is_unknown());
    }

    #[test]
    fn test_invalid_utf8() {
        let outcome = validate_bytes(b"<a>\xff</a>");
        assert_eq!(outcome.errors().len(), 1);
        assert_eq!(outcome.errors()[0].line, 0);
        assert!(outcome.errors()[0].message.starts_with("unknown error "));
    }

    #[test]
    fn test_guarded_catches_panics() {
        let outcome: Outcome<()> = guarded("test", || panic!("engine fault"));
        assert_eq!(
            outcome.errors(),
            &[ErrorEntry::new(0, "unknown error engine fault")]
        );
    }

    #[test]
    fn test_evaluate_node_kinds() {
        let parsed = tree(r#"<a k="v"><!--c--><?pi d?>t&amp;u<b/></a>"#);
        assert_eq!(evaluate(&parsed, "/a/*"), "<b/>\n");
        assert_eq!(evaluate(&parsed, "@k"), "k=\"v\"\n");
        assert_eq!(evaluate(&parsed, "comment()"), "<!--c-->\n");
        assert_eq!(evaluate(&parsed, "processing-instruction()"), "<?pi d?>\n");
        assert_eq!(evaluate(&parsed, "text()"), "t&amp;u\n");
        assert_eq!(evaluate(&parsed, "/"), "<a k=\"v\"><!--c--><?pi d?>t&amp;u<b/></a>\n");
    }

    #[test]
    fn test_evaluate_scalars_and_empty() {
        let parsed = tree("<a><b/><b/></a>");
        assert_eq!(evaluate(&parsed, "count(b)"), "2\n");
        assert_eq!(evaluate(&parsed, "name()"), "a\n");
        assert_eq!(evaluate(&parsed, "b = b"), "true\n");
        assert_eq!(evaluate(&parsed, "nothing"), "");
    }

    #[test]
    fn test_evaluate_syntax_error() {
        let parsed = tree("<a/>");
        let out = evaluate(&parsed, "///bad");
        assert!(out.starts_with(XPATH_ERROR_PREFIX), "{out}");
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_compile_and_use_schema() {
        let schema = tree(
            r#"<element name="a" xmlns="http://relaxng.org/ns/structure/1.0"><empty/></element>"#,
        );
        let handle = compile_schema(&schema).into_result().unwrap();
        assert!(handle.validate(&tree("<a/>")).is_success());
        assert_eq!(
            handle.validate(&tree("<a>\n<b/></a>")).errors(),
            &[ErrorEntry::new(2, "unexpected element 'b'")]
        );
    }

    #[test]
    fn test_compile_non_schema() {
        let outcome = compile_schema(&tree("<a><b/></a>"));
        assert_eq!(outcome.errors().len(), 1);
        assert_eq!(outcome.errors()[0].line, 1);
    }
}
