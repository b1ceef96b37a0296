//! Recursive descent parser for XML 1.0 documents.
//!
//! Each grammar production of the XML 1.0 recommendation that the parser
//! recognises maps to one method on [`XmlParser`]. Namespace well-formedness
//! (Namespaces in XML 1.0) is checked while start tags are processed.

use tracing::trace;

use crate::error::ParseError;
use crate::tree::{Attribute, Document, NodeId, NodeKind, XMLNS_NAMESPACE, XML_NAMESPACE};

use super::input::{is_xml_whitespace, split_name, validate_qname, ParserInput};
use super::ParseOptions;

/// Stack of namespace scopes, one frame per open element.
struct NamespaceResolver {
    frames: Vec<Vec<(Option<String>, String)>>,
}

impl NamespaceResolver {
    fn new() -> Self {
        Self { frames: Vec::new() }
    }

    fn push_scope(&mut self) {
        self.frames.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        self.frames.pop();
    }

    fn bind(&mut self, prefix: Option<&str>, uri: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push((prefix.map(str::to_owned), uri.to_owned()));
        }
    }

    /// Resolves a prefix; an empty URI (undeclared default) resolves to `None`.
    fn resolve(&self, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE.to_owned());
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .and_then(|(_, uri)| (!uri.is_empty()).then(|| uri.clone()))
    }
}

pub(crate) struct XmlParser<'a> {
    input: ParserInput<'a>,
    doc: Document,
    options: ParseOptions,
    ns: NamespaceResolver,
    seen_doctype: bool,
}

impl<'a> XmlParser<'a> {
    pub(crate) fn new(input: &'a str, options: &ParseOptions) -> Self {
        Self {
            input: ParserInput::new(input, options),
            doc: Document::new(),
            options: options.clone(),
            ns: NamespaceResolver::new(),
            seen_doctype: false,
        }
    }

    /// Parses the entire document.
    pub(crate) fn parse(&mut self) -> Result<Document, ParseError> {
        if self.looking_at_xml_decl() {
            self.parse_xml_declaration()?;
        }

        let root = self.doc.root();
        self.parse_misc(root)?;

        if self.input.peek() == Some(b'<') {
            self.parse_element(root)?;
        } else {
            self.input.recoverable(if self.input.at_end() {
                "missing root element".to_string()
            } else {
                "start tag expected, '<' not found".to_string()
            })?;
        }

        self.parse_misc(root)?;
        if !self.input.at_end() {
            self.input.recoverable("content after document element")?;
        }

        let mut doc = std::mem::take(&mut self.doc);
        doc.diagnostics = self.input.take_diagnostics();
        trace!(
            nodes = doc.node_count(),
            diagnostics = doc.diagnostics.len(),
            "parsed document"
        );
        Ok(doc)
    }

    fn looking_at_xml_decl(&self) -> bool {
        self.input.looking_at("<?xml")
            && self.input.rest()[5..]
                .chars()
                .next()
                .is_some_and(is_xml_whitespace)
    }

    // --- XML Declaration ---
    // XML 1.0 §2.8: [23] XMLDecl

    fn parse_xml_declaration(&mut self) -> Result<(), ParseError> {
        self.input.advance(5);
        self.input.skip_whitespace();

        let version = self.parse_pseudo_attribute("version")?;
        let Some(version) = version else {
            return Err(self.input.fatal("XML declaration requires a version"));
        };
        let well_formed_version = version.len() > 2
            && version.starts_with("1.")
            && version[2..].bytes().all(|b| b.is_ascii_digit());
        if !well_formed_version {
            return Err(self.input.fatal(format!("unsupported XML version '{version}'")));
        }
        self.doc.version = Some(version);

        self.doc.encoding = self.parse_pseudo_attribute("encoding")?;
        if let Some(standalone) = self.parse_pseudo_attribute("standalone")? {
            self.doc.standalone = match standalone.as_str() {
                "yes" => Some(true),
                "no" => Some(false),
                _ => return Err(self.input.fatal("standalone accepts only 'yes' or 'no'")),
            };
        }

        self.input.skip_whitespace();
        self.input.expect_str("?>")
    }

    /// Parses `name="value"` if the next pseudo-attribute is `name`.
    fn parse_pseudo_attribute(&mut self, name: &str) -> Result<Option<String>, ParseError> {
        self.input.skip_whitespace();
        if !self.input.looking_at(name) {
            return Ok(None);
        }
        self.input.advance(name.len());
        self.input.skip_whitespace();
        self.input.expect_byte(b'=')?;
        self.input.skip_whitespace();
        Ok(Some(self.input.parse_quoted_value()?.to_string()))
    }

    // --- Misc (comments, PIs, whitespace, DOCTYPE) ---

    fn parse_misc(&mut self, parent: NodeId) -> Result<(), ParseError> {
        loop {
            self.input.skip_whitespace();
            if self.input.looking_at("<!--") {
                self.parse_comment(parent)?;
            } else if self.input.looking_at("<?") {
                self.parse_processing_instruction(parent)?;
            } else if self.input.looking_at("<!DOCTYPE") {
                if self.seen_doctype || self.doc.root_element().is_some() {
                    return Err(self.input.fatal("DOCTYPE declaration not allowed here"));
                }
                self.parse_doctype()?;
            } else {
                return Ok(());
            }
        }
    }

    /// Parses a DOCTYPE declaration. General entities declared in the
    /// internal subset are handed to the input for expansion; all other
    /// declarations are skipped.
    ///
    /// XML 1.0 §2.8: [28] doctypedecl
    fn parse_doctype(&mut self) -> Result<(), ParseError> {
        self.seen_doctype = true;
        self.input.advance("<!DOCTYPE".len());
        self.input.skip_whitespace_required()?;
        let name = self.input.parse_name()?;
        self.input.skip_whitespace();
        if self.parse_external_id()? {
            self.input.allow_undeclared_entities();
            self.input.skip_whitespace();
        }
        if self.input.peek() == Some(b'[') {
            self.input.advance(1);
            self.parse_internal_subset()?;
            self.input.skip_whitespace();
        }
        trace!(%name, "parsed DOCTYPE");
        self.input.expect_byte(b'>')
    }

    /// [75] ExternalID. Returns `false` if none is present.
    fn parse_external_id(&mut self) -> Result<bool, ParseError> {
        if self.input.looking_at("SYSTEM") {
            self.input.advance("SYSTEM".len());
        } else if self.input.looking_at("PUBLIC") {
            self.input.advance("PUBLIC".len());
            self.input.skip_whitespace_required()?;
            self.input.parse_quoted_value()?;
        } else {
            return Ok(false);
        }
        self.input.skip_whitespace_required()?;
        self.input.parse_quoted_value()?;
        Ok(true)
    }

    /// [28b] intSubset, through the closing `]`.
    fn parse_internal_subset(&mut self) -> Result<(), ParseError> {
        loop {
            self.input.skip_whitespace();
            if self.input.looking_at("]") {
                self.input.advance(1);
                return Ok(());
            } else if self.input.looking_at("<!--") {
                self.input.advance(4);
                self.input.take_until("-->", "comment")?;
                self.input.advance(3);
            } else if self.input.looking_at("<?") {
                self.input.advance(2);
                self.input.take_until("?>", "processing instruction")?;
                self.input.advance(2);
            } else if self.input.looking_at("<!ENTITY") {
                self.parse_entity_decl()?;
            } else if self.input.looking_at("<!") {
                self.skip_markup_decl()?;
            } else if self.input.peek() == Some(b'%') {
                // The referenced declarations are never read.
                self.input.advance(1);
                self.input.parse_name()?;
                self.input.expect_byte(b';')?;
                self.input.allow_undeclared_entities();
            } else if self.input.at_end() {
                return Err(self.input.fatal("unterminated DOCTYPE internal subset"));
            } else {
                return Err(self.input.fatal("invalid markup in DOCTYPE internal subset"));
            }
        }
    }

    /// [70] EntityDecl. Parameter entities are parsed and dropped.
    fn parse_entity_decl(&mut self) -> Result<(), ParseError> {
        self.input.advance("<!ENTITY".len());
        self.input.skip_whitespace_required()?;
        let parameter = self.input.peek() == Some(b'%');
        if parameter {
            self.input.advance(1);
            self.input.skip_whitespace_required()?;
        }
        let name = self.input.parse_name()?;
        self.input.skip_whitespace_required()?;

        let value = if matches!(self.input.peek(), Some(b'"' | b'\'')) {
            Some(self.input.parse_quoted_value()?.to_owned())
        } else if self.parse_external_id()? {
            self.input.skip_whitespace();
            if self.input.looking_at("NDATA") {
                self.input.advance("NDATA".len());
                self.input.skip_whitespace_required()?;
                self.input.parse_name()?;
            }
            None
        } else {
            return Err(self
                .input
                .fatal(format!("entity '{name}' has neither a value nor an external identifier")));
        };
        self.input.skip_whitespace();
        self.input.expect_byte(b'>')?;

        if !parameter {
            self.input.declare_entity(name, value);
        }
        Ok(())
    }

    /// Skips an element, attribute-list or notation declaration.
    fn skip_markup_decl(&mut self) -> Result<(), ParseError> {
        loop {
            match self.input.peek() {
                None => return Err(self.input.fatal("unterminated markup declaration")),
                Some(b'"' | b'\'') => {
                    self.input.parse_quoted_value()?;
                }
                Some(b'>') => {
                    self.input.advance(1);
                    return Ok(());
                }
                Some(_) => {
                    self.input.next_char()?;
                }
            }
        }
    }

    // --- Elements ---
    // XML 1.0 §3.1: [39] element, [40] STag, [42] ETag, [44] EmptyElemTag

    fn parse_element(&mut self, parent: NodeId) -> Result<NodeId, ParseError> {
        let line = self.input.line();
        self.input.expect_byte(b'<')?;
        self.input.enter_element()?;

        let qname = self.input.parse_name()?;
        if let Some(problem) = validate_qname(&qname) {
            self.input.recoverable(format!("{problem}: '{qname}'"))?;
        }

        let raw_attributes = self.parse_attributes()?;

        self.ns.push_scope();
        let attributes = self.resolve_attributes(&qname, raw_attributes)?;

        let (prefix, local) = split_name(&qname);
        let namespace = self.ns.resolve(prefix);
        if let (Some(p), None) = (prefix, &namespace) {
            self.input
                .recoverable(format!("namespace prefix '{p}' on element '{qname}' is not defined"))?;
        }

        let elem = self.doc.create_node_at_line(
            NodeKind::Element {
                name: local.to_owned(),
                prefix: prefix.map(str::to_owned),
                namespace,
                attributes,
            },
            line,
        );
        self.doc.append_child(parent, elem);

        if self.input.looking_at("/>") {
            self.input.advance(2);
        } else {
            self.input.expect_byte(b'>')?;
            self.parse_content(elem)?;
            self.parse_end_tag(&qname)?;
        }

        self.ns.pop_scope();
        self.input.leave_element();
        Ok(elem)
    }

    fn parse_end_tag(&mut self, expected: &str) -> Result<(), ParseError> {
        if self.input.at_end() {
            // Only reachable in recovery mode; content parsing already
            // reported the truncation.
            return Ok(());
        }
        self.input.expect_str("</")?;
        let end_name = self.input.parse_name()?;
        if end_name != expected {
            self.input.recoverable(format!(
                "mismatched end tag: expected </{expected}>, found </{end_name}>"
            ))?;
        }
        self.input.skip_whitespace();
        self.input.expect_byte(b'>')
    }

    /// Parses the attribute list of a start tag, stopping before `>` or `/>`.
    fn parse_attributes(&mut self) -> Result<Vec<(String, String)>, ParseError> {
        let mut attributes: Vec<(String, String)> = Vec::new();
        loop {
            let had_whitespace = self.input.skip_whitespace();
            match self.input.peek() {
                Some(b'>' | b'/') => return Ok(attributes),
                None => return Err(self.input.fatal("unexpected end of input in start tag")),
                Some(_) if !had_whitespace => {
                    return Err(self.input.fatal("whitespace required between attributes"));
                }
                Some(_) => {}
            }

            let name = self.input.parse_name()?;
            self.input.skip_whitespace();
            self.input.expect_byte(b'=')?;
            self.input.skip_whitespace();
            let value = self.input.parse_attribute_value()?;

            if attributes.iter().any(|(existing, _)| *existing == name) {
                self.input
                    .recoverable(format!("attribute '{name}' redefined"))?;
                continue;
            }
            if attributes.len() >= self.options.max_attributes {
                return Err(self.input.limit(format!(
                    "element has more than {} attributes",
                    self.options.max_attributes
                )));
            }
            attributes.push((name, value));
        }
    }

    /// Binds the namespace declarations of a start tag into the current scope
    /// and resolves every attribute's namespace.
    fn resolve_attributes(
        &mut self,
        element: &str,
        raw: Vec<(String, String)>,
    ) -> Result<Vec<Attribute>, ParseError> {
        for (name, value) in &raw {
            if name == "xmlns" {
                if value == XML_NAMESPACE || value == XMLNS_NAMESPACE {
                    self.input
                        .recoverable(format!("reserved namespace '{value}' cannot be the default"))?;
                }
                self.ns.bind(None, value);
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                if prefix == "xmlns" {
                    self.input.recoverable("prefix 'xmlns' cannot be declared")?;
                } else if prefix == "xml" && value != XML_NAMESPACE {
                    self.input
                        .recoverable("prefix 'xml' cannot be bound to another namespace")?;
                } else if value.is_empty() {
                    self.input
                        .recoverable(format!("namespace prefix '{prefix}' cannot be undeclared"))?;
                }
                if !value.is_empty() && !value.contains(':') {
                    self.input
                        .warning(format!("xmlns:{prefix}: URI '{value}' is not absolute"));
                }
                self.ns.bind(Some(prefix), value);
            }
        }

        let mut attributes = Vec::with_capacity(raw.len());
        for (qname, value) in raw {
            let (prefix, local) = split_name(&qname);
            let namespace = match prefix {
                _ if qname == "xmlns" || prefix == Some("xmlns") => Some(XMLNS_NAMESPACE.to_owned()),
                None => None,
                Some(p) => {
                    let resolved = self.ns.resolve(Some(p));
                    if resolved.is_none() {
                        self.input.recoverable(format!(
                            "namespace prefix '{p}' for attribute '{qname}' on element '{element}' is not defined"
                        ))?;
                    }
                    resolved
                }
            };
            if namespace.is_some()
                && attributes.iter().any(|a: &Attribute| {
                    a.name == local && a.namespace == namespace && a.prefix.is_some()
                })
            {
                self.input
                    .recoverable(format!("namespaced attribute '{qname}' redefined"))?;
                continue;
            }
            attributes.push(Attribute {
                name: local.to_owned(),
                prefix: prefix.map(str::to_owned),
                namespace,
                value,
            });
        }
        Ok(attributes)
    }

    // --- Content ---
    // XML 1.0 §3.1: [43] content

    fn parse_content(&mut self, parent: NodeId) -> Result<(), ParseError> {
        loop {
            if self.input.at_end() {
                self.input
                    .recoverable("unexpected end of input in element content")?;
                return Ok(());
            }
            if self.input.looking_at("</") {
                return Ok(());
            }
            if self.input.looking_at("<![CDATA[") {
                self.parse_cdata(parent)?;
            } else if self.input.looking_at("<!--") {
                self.parse_comment(parent)?;
            } else if self.input.looking_at("<?") {
                self.parse_processing_instruction(parent)?;
            } else if self.input.peek() == Some(b'<') {
                self.parse_element(parent)?;
            } else {
                self.parse_char_data(parent)?;
            }
        }
    }

    // --- Character Data ---
    // XML 1.0 §2.4: [14] CharData, §4.1: [67] Reference

    fn parse_char_data(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let line = self.input.line();
        let mut text = String::new();
        loop {
            match self.input.peek() {
                None | Some(b'<') => break,
                Some(b'&') => {
                    self.input.advance(1);
                    text.push_str(&self.input.parse_reference()?);
                }
                Some(b']') if self.input.looking_at("]]>") => {
                    self.input
                        .recoverable("sequence ']]>' not allowed in content")?;
                    self.input.advance(3);
                    text.push_str("]]>");
                }
                Some(_) => {
                    let start = self.input.pos();
                    let run = self
                        .input
                        .rest()
                        .find(|c| matches!(c, '<' | '&' | ']'))
                        .unwrap_or(self.input.rest().len())
                        .max(1);
                    while self.input.pos() < start + run {
                        self.input.next_char()?;
                    }
                    text.push_str(self.input.slice_from(start));
                }
            }
            if text.len() > self.options.max_text_length {
                return Err(self.input.limit(format!(
                    "text node exceeds maximum length of {} bytes",
                    self.options.max_text_length
                )));
            }
        }

        if self.options.no_blanks && text.chars().all(is_xml_whitespace) {
            return Ok(());
        }
        self.append_text(parent, &text, line);
        Ok(())
    }

    /// Appends text, merging with a preceding text sibling.
    fn append_text(&mut self, parent: NodeId, text: &str, line: u32) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.doc.last_child(parent) {
            if matches!(self.doc.node(last).kind, NodeKind::Text { .. }) {
                self.doc.append_text(last, text);
                return;
            }
        }
        let node = self.doc.create_node_at_line(
            NodeKind::Text {
                content: text.to_owned(),
            },
            line,
        );
        self.doc.append_child(parent, node);
    }

    // --- Comments, CDATA, PIs ---

    /// XML 1.0 §2.5: [15] Comment
    fn parse_comment(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let line = self.input.line();
        self.input.advance(4);
        let content = self.input.take_until("--", "comment")?.to_owned();
        if !self.input.looking_at("-->") {
            return Err(self.input.fatal("'--' not allowed in comments"));
        }
        self.input.advance(3);
        let node = self
            .doc
            .create_node_at_line(NodeKind::Comment { content }, line);
        self.doc.append_child(parent, node);
        Ok(())
    }

    /// XML 1.0 §2.7: [18] CDSect. The section's content becomes ordinary
    /// text, so adjacent character data and CDATA form one text node.
    fn parse_cdata(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let line = self.input.line();
        self.input.advance("<![CDATA[".len());
        let content = self.input.take_until("]]>", "CDATA section")?;
        self.input.advance(3);
        self.append_text(parent, content, line);
        Ok(())
    }

    /// XML 1.0 §2.6: [16] PI
    fn parse_processing_instruction(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let line = self.input.line();
        self.input.advance(2);
        let target = self.input.parse_name()?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self
                .input
                .fatal("XML declaration allowed only at the start of the document"));
        }
        let data = if self.input.looking_at("?>") {
            None
        } else {
            self.input.skip_whitespace_required()?;
            Some(self.input.take_until("?>", "processing instruction")?.to_owned())
        };
        self.input.advance(2);
        let node = self
            .doc
            .create_node_at_line(NodeKind::ProcessingInstruction { target, data }, line);
        self.doc.append_child(parent, node);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorSeverity;
    use crate::parser::parse_str_with_options;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Document {
        Document::parse_str(input).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    fn parse_err(input: &str) -> ParseError {
        Document::parse_str(input).unwrap_err()
    }

    #[test]
    fn test_parse_empty_element() {
        let doc = parse("<root/>");
        let root = doc.root_element().unwrap();
        assert_eq!(doc.node_name(root), Some("root"));
        assert_eq!(doc.first_child(root), None);
    }

    #[test]
    fn test_parse_nested_elements() {
        let doc = parse("<a><b><c/></b></a>");
        let a = doc.root_element().unwrap();
        let b = doc.first_child(a).unwrap();
        let c = doc.first_child(b).unwrap();
        assert_eq!(doc.node_name(b), Some("b"));
        assert_eq!(doc.node_name(c), Some("c"));
    }

    #[test]
    fn test_parse_attributes() {
        let doc = parse("<div id=\"main\" class='big'/>");
        let root = doc.root_element().unwrap();
        assert_eq!(doc.attribute(root, "id"), Some("main"));
        assert_eq!(doc.attribute(root, "class"), Some("big"));
    }

    #[test]
    fn test_parse_xml_declaration() {
        let doc = parse("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone='yes'?>\n<r/>");
        assert_eq!(doc.version.as_deref(), Some("1.0"));
        assert_eq!(doc.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(doc.standalone, Some(true));
    }

    #[test]
    fn test_xml_declaration_requires_version() {
        let err = parse_err("<?xml encoding='UTF-8'?><r/>");
        assert_eq!(err.message, "XML declaration requires a version");
    }

    #[test]
    fn test_late_xml_declaration_rejected() {
        let err = parse_err("<!-- c --><?xml version='1.0'?><r/>");
        assert_eq!(err.message, "XML declaration allowed only at the start of the document");
    }

    #[test]
    fn test_parse_comment_cdata_pi() {
        let doc = parse("<r><!-- note --><![CDATA[<raw>]]><?app run now?></r>");
        let r = doc.root_element().unwrap();
        let kinds: Vec<NodeKind> = doc.children(r).map(|c| doc.node(c).kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Comment {
                    content: " note ".to_string()
                },
                NodeKind::Text {
                    content: "<raw>".to_string()
                },
                NodeKind::ProcessingInstruction {
                    target: "app".to_string(),
                    data: Some("run now".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_parse_entity_and_char_references() {
        let doc = parse("<r>&lt;&amp;&gt;&apos;&quot; &#65;&#x42;</r>");
        assert_eq!(doc.text_content(doc.root()), "<&>'\" AB");
    }

    #[test]
    fn test_cdata_merges_with_adjacent_text() {
        let doc = parse("<r>x<![CDATA[<y>]]>z<![CDATA[]]><i/>\n<![CDATA[w]]></r>");
        let r = doc.root_element().unwrap();
        let children: Vec<NodeId> = doc.children(r).collect();
        assert_eq!(children.len(), 3);
        assert_eq!(doc.node_text(children[0]), Some("x<y>z"));
        assert_eq!(doc.node_name(children[1]), Some("i"));
        assert_eq!(doc.node_text(children[2]), Some("\nw"));
    }

    #[test]
    fn test_text_is_merged_across_references() {
        let doc = parse("<r>a&amp;b</r>");
        let r = doc.root_element().unwrap();
        assert_eq!(doc.children(r).count(), 1);
    }

    #[test]
    fn test_doctype_is_skipped() {
        let doc = parse(
            "<!DOCTYPE r [\n<!ELEMENT r (#PCDATA)>\n<!-- ] > -->\n<!ATTLIST r a CDATA \"]>\">\n]>\n<r/>",
        );
        let r = doc.root_element().unwrap();
        assert_eq!(doc.node_name(r), Some("r"));
        assert_eq!(doc.line(r), 6);
    }

    #[test]
    fn test_internal_entities_expand() {
        let doc = parse(
            "<!DOCTYPE r [\n<!ENTITY who 'world'>\n<!ENTITY greeting \"hello &who;&#33;\">\n<!ENTITY % p 'ignored'>\n]>\n<r a=\"&who;\">&greeting;</r>",
        );
        let r = doc.root_element().unwrap();
        assert_eq!(doc.text_content(r), "hello world!");
        assert_eq!(doc.attribute(r, "a"), Some("world"));
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn test_external_subset_relaxes_entity_declared() {
        for text in [
            "<!DOCTYPE r SYSTEM \"r.dtd\"><r>&nbsp;</r>",
            "<!DOCTYPE r PUBLIC \"-//X//DTD R//EN\" \"r.dtd\"><r>&nbsp;</r>",
            "<!DOCTYPE r [<!ENTITY % ext SYSTEM \"more.ent\"> %ext;]><r>&nbsp;</r>",
        ] {
            let doc = parse(text);
            let r = doc.root_element().unwrap();
            assert_eq!(doc.text_content(r), "", "{text}");
            assert_eq!(doc.diagnostics[0].severity, ErrorSeverity::Warning);
        }
        assert_eq!(
            parse_err("<!DOCTYPE r [<!ENTITY a 'x'>]><r>&b;</r>").message,
            "entity 'b' not defined"
        );
    }

    #[test]
    fn test_external_general_entity_is_not_loaded() {
        let doc = parse("<!DOCTYPE r [<!ENTITY chap SYSTEM \"chap.xml\">]><r>&chap;</r>");
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].message, "external entity 'chap' not loaded");
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = parse_err("<a><b></a>");
        assert_eq!(err.message, "mismatched end tag: expected </b>, found </a>");
        assert_eq!(err.location.line, 1);
        assert!(err.diagnostics.is_empty());
    }

    #[test]
    fn test_unexpected_eof() {
        let err = parse_err("<a>");
        assert_eq!(err.message, "unexpected end of input in element content");
    }

    #[test]
    fn test_missing_root() {
        assert_eq!(parse_err("").message, "missing root element");
        assert_eq!(parse_err("  <!-- only -->").message, "missing root element");
        assert_eq!(parse_err("text").message, "start tag expected, '<' not found");
    }

    #[test]
    fn test_content_after_root() {
        let err = parse_err("<a/><b/>");
        assert_eq!(err.message, "content after document element");
    }

    #[test]
    fn test_duplicate_attribute() {
        let err = parse_err("<a x='1' x='2'/>");
        assert_eq!(err.message, "attribute 'x' redefined");
    }

    #[test]
    fn test_whitespace_required_between_attributes() {
        let err = parse_err("<a x='1'y='2'/>");
        assert_eq!(err.message, "whitespace required between attributes");
    }

    #[test]
    fn test_unbound_prefix() {
        let err = parse_err("<p:a/>");
        assert_eq!(err.message, "namespace prefix 'p' on element 'p:a' is not defined");
    }

    #[test]
    fn test_cdata_end_in_text() {
        let err = parse_err("<a>x]]>y</a>");
        assert_eq!(err.message, "sequence ']]>' not allowed in content");
    }

    #[test]
    fn test_double_hyphen_in_comment() {
        let err = parse_err("<a><!-- a -- b --></a>");
        assert_eq!(err.message, "'--' not allowed in comments");
    }

    #[test]
    fn test_invalid_character() {
        let err = parse_err("<a>\u{1}</a>");
        assert_eq!(err.message, "invalid XML character U+0001");
    }

    #[test]
    fn test_error_line_numbers() {
        let err = parse_err("<a>\n<b>\n</c>\n</a>");
        assert_eq!(err.location.line, 3);
        let err = parse_err("<a>\r\n\r\n<b x=1/></a>");
        assert_eq!(err.location.line, 3);
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = parse(r#"<r xmlns="urn:d" xmlns:x="urn:x"><x:c x:k="v" k="w"/></r>"#);
        let r = doc.root_element().unwrap();
        let c = doc.first_child(r).unwrap();
        assert_eq!(doc.node_namespace(r), Some("urn:d"));
        assert_eq!(doc.node_namespace(c), Some("urn:x"));
        let attrs = doc.attributes(c);
        assert_eq!(attrs[0].namespace.as_deref(), Some("urn:x"));
        assert_eq!(attrs[1].namespace, None);
    }

    #[test]
    fn test_namespaced_attribute_redefined() {
        let err = parse_err(r#"<r xmlns:a="urn:n" xmlns:b="urn:n"><c a:k="1" b:k="2"/></r>"#);
        assert_eq!(err.message, "namespaced attribute 'b:k' redefined");
    }

    #[test]
    fn test_relative_namespace_uri_is_warning() {
        let doc = parse(r#"<r xmlns:p="relative"/>"#);
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].severity, ErrorSeverity::Warning);
    }

    #[test]
    fn test_recover_collects_errors() {
        let opts = ParseOptions::default().recover(true);
        let doc = parse_str_with_options("<a x='1' x='2'><b></c></a>", &opts).unwrap();
        let messages: Vec<&str> = doc.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "attribute 'x' redefined",
                "mismatched end tag: expected </b>, found </c>",
            ]
        );
    }

    #[test]
    fn test_no_blanks() {
        let opts = ParseOptions::default().no_blanks(true);
        let doc = parse_str_with_options("<a>\n  <b/>\n</a>", &opts).unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.children(a).count(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let opts = ParseOptions::default().max_depth(2);
        let err = parse_str_with_options("<a><b><c/></b></a>", &opts).unwrap_err();
        assert!(err.is_limit());
        assert_eq!(err.message, "maximum nesting depth of 2 exceeded");
    }

    #[test]
    fn test_attribute_count_limit() {
        let opts = ParseOptions::default().max_attributes(1);
        let err = parse_str_with_options("<a x='1' y='2'/>", &opts).unwrap_err();
        assert!(err.is_limit());
    }

    #[test]
    fn test_bom_is_ignored() {
        let doc = parse("\u{FEFF}<r/>");
        assert!(doc.root_element().is_some());
    }
}
