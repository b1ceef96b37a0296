//! `XPath` 1.0 data model.
//!
//! The four value types of `XPath` 1.0 (boolean, number, string, node-set)
//! plus the node handle used inside node-sets. Attributes are not arena
//! nodes in [`Document`], so a node-set member is either a tree node or a
//! reference to one attribute of an element.
//!
//! Conversions from node-sets need the string-value of a node, so the
//! conversion methods take the owning document.

use std::fmt;

use crate::tree::{Attribute, Document, NodeId, NodeKind};

/// A member of an `XPath` node-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XPathNode {
    /// A node stored in the document arena.
    Node(NodeId),
    /// The `index`-th attribute of `element`.
    Attribute {
        /// The owning element.
        element: NodeId,
        /// Index into the element's attribute list.
        index: usize,
    },
}

impl XPathNode {
    /// Key that sorts node-set members into document order.
    ///
    /// Arena ids grow in document order for parsed trees. An attribute sorts
    /// directly after its owning element and before the element's children.
    #[must_use]
    pub fn order_key(self) -> (NodeId, usize) {
        match self {
            Self::Node(id) => (id, 0),
            Self::Attribute { element, index } => (element, index + 1),
        }
    }

    /// The arena node itself, or the owning element of an attribute.
    #[must_use]
    pub fn anchor(self) -> NodeId {
        match self {
            Self::Node(id) => id,
            Self::Attribute { element, .. } => element,
        }
    }

    /// Returns the tree node if this is not an attribute.
    #[must_use]
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(id),
            Self::Attribute { .. } => None,
        }
    }

    /// Resolves an attribute handle to its attribute.
    #[must_use]
    pub fn attribute(self, doc: &Document) -> Option<&Attribute> {
        match self {
            Self::Node(_) => None,
            Self::Attribute { element, index } => doc.attributes(element).get(index),
        }
    }

    /// The `XPath` string-value of this node.
    ///
    /// Elements and the document yield the concatenation of all descendant
    /// text; attributes their value; text, comments and PIs their content.
    #[must_use]
    pub fn string_value(self, doc: &Document) -> String {
        match self {
            Self::Attribute { .. } => self
                .attribute(doc)
                .map(|a| a.value.clone())
                .unwrap_or_default(),
            Self::Node(id) => match &doc.node(id).kind {
                NodeKind::Document | NodeKind::Element { .. } => doc.text_content(id),
                NodeKind::Text { content } | NodeKind::Comment { content } => content.clone(),
                NodeKind::ProcessingInstruction { data, .. } => data.clone().unwrap_or_default(),
            },
        }
    }

    /// The local part of the expanded name, or `""` for unnamed nodes.
    #[must_use]
    pub fn local_name(self, doc: &Document) -> String {
        match self {
            Self::Attribute { .. } => self
                .attribute(doc)
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            Self::Node(id) => match &doc.node(id).kind {
                NodeKind::Element { name, .. } => name.clone(),
                NodeKind::ProcessingInstruction { target, .. } => target.clone(),
                _ => String::new(),
            },
        }
    }

    /// The qualified name as written in the source, or `""` for unnamed nodes.
    #[must_use]
    pub fn qualified_name(self, doc: &Document) -> String {
        match self {
            Self::Attribute { .. } => self
                .attribute(doc)
                .map(Attribute::qualified_name)
                .unwrap_or_default(),
            Self::Node(id) => match &doc.node(id).kind {
                NodeKind::Element { .. } => doc.qualified_name(id).unwrap_or_default(),
                NodeKind::ProcessingInstruction { target, .. } => target.clone(),
                _ => String::new(),
            },
        }
    }

    /// The namespace URI of the expanded name, or `""`.
    #[must_use]
    pub fn namespace_uri(self, doc: &Document) -> String {
        match self {
            Self::Attribute { .. } => self
                .attribute(doc)
                .and_then(|a| a.namespace.clone())
                .unwrap_or_default(),
            Self::Node(id) => doc.node_namespace(id).unwrap_or_default().to_owned(),
        }
    }
}

/// An `XPath` 1.0 value.
#[derive(Debug, Clone)]
pub enum XPathValue {
    /// A node-set, kept in document order without duplicates.
    NodeSet(Vec<XPathNode>),
    /// A boolean.
    Boolean(bool),
    /// An IEEE 754 double.
    Number(f64),
    /// A string.
    String(String),
}

impl XPathValue {
    /// Boolean conversion (`boolean()`).
    #[must_use]
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::NodeSet(nodes) => !nodes.is_empty(),
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
        }
    }

    /// Number conversion (`number()`).
    ///
    /// A node-set converts through the string-value of its first node.
    #[must_use]
    pub fn to_number(&self, doc: &Document) -> f64 {
        match self {
            Self::NodeSet(_) => parse_xpath_number(&self.to_xpath_string(doc)),
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => parse_xpath_number(s),
        }
    }

    /// String conversion (`string()`).
    ///
    /// A node-set converts to the string-value of its first node, or `""`
    /// when empty.
    #[must_use]
    pub fn to_xpath_string(&self, doc: &Document) -> String {
        match self {
            Self::NodeSet(nodes) => nodes
                .first()
                .map(|n| n.string_value(doc))
                .unwrap_or_default(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_xpath_number(*n),
            Self::String(s) => s.clone(),
        }
    }

    /// Returns the node-set, if this is one.
    #[must_use]
    pub fn as_node_set(&self) -> Option<&[XPathNode]> {
        match self {
            Self::NodeSet(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// Name of the value's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NodeSet(_) => "node-set",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }
}

impl PartialEq for XPathValue {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NodeSet(a), Self::NodeSet(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for XPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeSet(nodes) => write!(f, "node-set({})", nodes.len()),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_xpath_number(*n)),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Formats a number the way `string()` does.
///
/// `NaN`, `Infinity` and `-Infinity` are spelled out, negative zero becomes
/// `0`, integers carry no decimal point and no exponent form is ever used.
#[must_use]
pub fn format_xpath_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    // f64's Display never switches to exponent notation and drops ".0".
    format!("{n}")
}

/// Parses a string with the `number()` grammar: optional surrounding
/// whitespace, an optional minus sign, and `Digits ('.' Digits?)?` or
/// `'.' Digits`. Anything else is `NaN`.
#[must_use]
pub fn parse_xpath_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let well_formed = digits(int_part)
        && frac_part.map_or(true, digits)
        && (!int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty()));
    if !well_formed {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// An error raised while parsing or evaluating an `XPath` expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XPathError {
    /// The expression is not syntactically valid.
    #[error("{message}")]
    InvalidExpression {
        /// What went wrong.
        message: String,
        /// Byte offset into the expression.
        position: usize,
    },

    /// A function received a value of the wrong type.
    #[error("type error: expected {expected}, found {found}")]
    TypeError {
        /// The expected type name.
        expected: &'static str,
        /// The type actually found.
        found: &'static str,
    },

    /// A `$name` reference with no binding.
    #[error("undefined variable ${name}")]
    UndefinedVariable {
        /// Variable name without the `$`.
        name: String,
    },

    /// A call to a function outside the core library.
    #[error("unregistered function {name}()")]
    UndefinedFunction {
        /// Function name.
        name: String,
    },

    /// A core function called with the wrong number of arguments.
    #[error("{function}() takes {expected} argument(s), {found} given")]
    InvalidArgCount {
        /// Function name.
        function: String,
        /// Human-readable arity, e.g. `"1 or 2"`.
        expected: String,
        /// Number of arguments supplied.
        found: usize,
    },

    /// A name test uses a prefix that is not bound at the context node.
    #[error("undefined namespace prefix '{prefix}'")]
    UndefinedNamespacePrefix {
        /// The unbound prefix.
        prefix: String,
    },
}

impl XPathError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            message: message.into(),
            position,
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc() -> Document {
        Document::parse_str(r#"<r a="42"><x> 7 </x><y>text</y></r>"#).unwrap()
    }

    #[test]
    fn test_boolean_conversion() {
        assert!(!XPathValue::Number(0.0).to_boolean());
        assert!(!XPathValue::Number(f64::NAN).to_boolean());
        assert!(XPathValue::Number(-0.5).to_boolean());
        assert!(!XPathValue::String(String::new()).to_boolean());
        assert!(XPathValue::String("false".to_owned()).to_boolean());
        assert!(!XPathValue::NodeSet(vec![]).to_boolean());
    }

    #[test]
    fn test_node_set_conversions_use_first_node() {
        let doc = doc();
        let r = doc.root_element().unwrap();
        let kids: Vec<XPathNode> = doc.children(r).map(XPathNode::Node).collect();
        let set = XPathValue::NodeSet(kids);
        assert_eq!(set.to_xpath_string(&doc), " 7 ");
        assert_eq!(set.to_number(&doc), 7.0);
        assert!(XPathValue::NodeSet(vec![]).to_number(&doc).is_nan());
    }

    #[test]
    fn test_attribute_node_values() {
        let doc = doc();
        let r = doc.root_element().unwrap();
        let attr = XPathNode::Attribute { element: r, index: 0 };
        assert_eq!(attr.string_value(&doc), "42");
        assert_eq!(attr.local_name(&doc), "a");
        assert_eq!(attr.anchor(), r);
        assert!(attr.as_node().is_none());
        assert!(XPathNode::Node(r).order_key() < attr.order_key());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_xpath_number(3.0), "3");
        assert_eq!(format_xpath_number(-0.0), "0");
        assert_eq!(format_xpath_number(0.5), "0.5");
        assert_eq!(format_xpath_number(1e21), "1000000000000000000000");
        assert_eq!(format_xpath_number(f64::NAN), "NaN");
        assert_eq!(format_xpath_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_parse_number_grammar() {
        assert_eq!(parse_xpath_number(" 12.5\n"), 12.5);
        assert_eq!(parse_xpath_number("-.5"), -0.5);
        assert_eq!(parse_xpath_number("4."), 4.0);
        for bad in ["", ".", "+1", "1e3", "inf", "NaN", "0x10", "1 2"] {
            assert!(parse_xpath_number(bad).is_nan(), "{bad:?} should be NaN");
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            XPathError::syntax(2, "expected node test, found '/'").to_string(),
            "expected node test, found '/'"
        );
        assert_eq!(
            XPathError::UndefinedNamespacePrefix {
                prefix: "p".to_owned()
            }
            .to_string(),
            "undefined namespace prefix 'p'"
        );
    }
}
