//! `XPath` 1.0 query language.
//!
//! Expressions are tokenized by [`lexer`], parsed into an [`ast::Expr`] by
//! [`parser`], and evaluated by [`XPathContext`]. Node-sets may contain
//! attribute nodes, represented by [`XPathNode::Attribute`].
//!
//! ```
//! use xmltools::Document;
//! use xmltools::xpath::{evaluate, XPathValue};
//!
//! let doc = Document::parse_str(r#"<r><a k="1"/><a k="2"/></r>"#).unwrap();
//! let root = doc.root_element().unwrap();
//! let result = evaluate(&doc, root, "sum(a/@k)").unwrap();
//! assert_eq!(result, XPathValue::Number(3.0));
//! ```
//!
//! The namespace axis is always empty.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod types;

pub use eval::XPathContext;
pub use types::{XPathError, XPathNode, XPathValue};

use crate::tree::{Document, NodeId};

/// Parses and evaluates an expression with `context_node` as the context.
///
/// # Errors
///
/// Returns [`XPathError`] if the expression is malformed or its evaluation
/// fails.
pub fn evaluate(
    doc: &Document,
    context_node: NodeId,
    expression: &str,
) -> Result<XPathValue, XPathError> {
    let expr = parser::parse(expression)?;
    tracing::trace!(?expr, "parsed XPath expression");
    XPathContext::new(doc, context_node).evaluate(&expr)
}
