//! Node type definitions.
//!
//! The `NodeKind` enum carries the node-type-specific payload (element name
//! and attributes, text content, ...). Navigation links live in `NodeData`.

use super::Attribute;

/// The kind of an XML node and its associated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node. There is exactly one per `Document`.
    Document,

    /// An element node, e.g., `<svg:rect width="3">`.
    Element {
        /// The element's local name (`"rect"`).
        name: String,
        /// Namespace prefix (`"svg"`), if any.
        prefix: Option<String>,
        /// Namespace URI after resolution, if any.
        namespace: Option<String>,
        /// Attributes in source order, namespace declarations included.
        attributes: Vec<Attribute>,
    },

    /// A text node containing character data. References are resolved and
    /// CDATA sections are merged into the surrounding text.
    Text {
        /// The decoded text.
        content: String,
    },

    /// A comment node, without the `<!--` and `-->` delimiters.
    Comment {
        /// The comment text.
        content: String,
    },

    /// A processing instruction, e.g., `<?target data?>`.
    ProcessingInstruction {
        /// The PI target.
        target: String,
        /// The PI data, if any.
        data: Option<String>,
    },
}

impl NodeKind {
    /// Returns `true` for element nodes.
    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self, Self::Element { .. })
    }

    /// Returns `true` for text nodes.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}
