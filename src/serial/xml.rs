//! XML serializer.
//!
//! Turns nodes of a [`Document`] back into markup. Query results use
//! [`serialize_node`], which renders a single node the way it would appear if
//! it were cut out of the document: an element carries the namespace
//! declarations it inherits from its ancestors.

use crate::tree::{Attribute, Document, NodeId, NodeKind};

/// Serializes a whole document, XML declaration included.
///
/// # Examples
///
/// ```
/// use xmltools::Document;
/// use xmltools::serial::serialize;
///
/// let doc = Document::parse_str("<root><child>Hello</child></root>").unwrap();
/// assert_eq!(serialize(&doc), "<?xml version=\"1.0\"?>\n<root><child>Hello</child></root>\n");
/// ```
#[must_use]
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    let version = doc.version.as_deref().unwrap_or("1.0");
    out.push_str("<?xml version=\"");
    out.push_str(version);
    out.push('"');
    if let Some(encoding) = &doc.encoding {
        out.push_str(" encoding=\"");
        out.push_str(encoding);
        out.push('"');
    }
    if let Some(standalone) = doc.standalone {
        out.push_str(" standalone=\"");
        out.push_str(if standalone { "yes" } else { "no" });
        out.push('"');
    }
    out.push_str("?>\n");
    for child in doc.children(doc.root()) {
        write_node(doc, child, &mut out, &[]);
        out.push('\n');
    }
    out
}

/// Serializes one node.
///
/// Elements are rendered with their whole subtree. When the element is not
/// the root element, namespace declarations in scope on its parent (and not
/// redeclared on the element) are added to its start tag. The document node
/// renders as its root element.
///
/// # Examples
///
/// ```
/// use xmltools::Document;
/// use xmltools::serial::serialize_node;
///
/// let doc = Document::parse_str(r#"<r xmlns:p="urn:p"><p:a>x &amp; y</p:a></r>"#).unwrap();
/// let r = doc.root_element().unwrap();
/// let a = doc.first_child(r).unwrap();
/// assert_eq!(serialize_node(&doc, a), r#"<p:a xmlns:p="urn:p">x &amp; y</p:a>"#);
/// ```
#[must_use]
pub fn serialize_node(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    match &doc.node(id).kind {
        NodeKind::Document => {
            if let Some(root) = doc.root_element() {
                write_node(doc, root, &mut out, &[]);
            }
        }
        NodeKind::Element { .. } => {
            let inherited = doc
                .parent(id)
                .map(|parent| doc.in_scope_namespaces(parent))
                .unwrap_or_default();
            write_node(doc, id, &mut out, &inherited);
        }
        _ => write_node(doc, id, &mut out, &[]),
    }
    out
}

/// Serializes an attribute as `name="value"`.
#[must_use]
pub fn serialize_attribute(attr: &Attribute) -> String {
    let mut out = String::new();
    write_attribute(&mut out, &attr.qualified_name(), &attr.value);
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String, inherited: &[(Option<String>, String)]) {
    match &doc.node(id).kind {
        NodeKind::Document => {
            for child in doc.children(id) {
                write_node(doc, child, out, &[]);
            }
        }
        NodeKind::Element {
            name,
            prefix,
            attributes,
            ..
        } => {
            let qname = match prefix {
                Some(p) => format!("{p}:{name}"),
                None => name.clone(),
            };
            out.push('<');
            out.push_str(&qname);

            for (ns_prefix, uri) in inherited {
                let redeclared = attributes
                    .iter()
                    .any(|a| a.is_namespace_decl() && a.declared_prefix() == ns_prefix.as_deref());
                if redeclared {
                    continue;
                }
                let decl = match ns_prefix {
                    Some(p) => format!("xmlns:{p}"),
                    None => "xmlns".to_owned(),
                };
                out.push(' ');
                write_attribute(out, &decl, uri);
            }
            for attr in attributes {
                out.push(' ');
                write_attribute(out, &attr.qualified_name(), &attr.value);
            }

            if doc.first_child(id).is_none() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in doc.children(id) {
                write_node(doc, child, out, &[]);
            }
            out.push_str("</");
            out.push_str(&qname);
            out.push('>');
        }
        NodeKind::Text { content } => write_escaped_text(out, content),
        NodeKind::Comment { content } => {
            out.push_str("<!--");
            out.push_str(content);
            out.push_str("-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            if let Some(d) = data {
                out.push(' ');
                out.push_str(d);
            }
            out.push_str("?>");
        }
    }
}

fn write_attribute(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str("=\"");
    write_escaped_attr(out, value);
    out.push('"');
}

/// Escapes text content: `&`, `<`, `>`.
fn write_escaped_text(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

/// Escapes an attribute value: `&`, `<`, `"` and the whitespace characters
/// that attribute normalization would otherwise fold.
fn write_escaped_attr(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
}
