//! `RelaxNG` schema compilation and validation.
//!
//! A schema written in the `RelaxNG` XML syntax
//! (<https://relaxng.org/spec-20011203.html>) is compiled from a parsed
//! [`Document`] into a graph of [`Pattern`]s. Instance documents are then
//! checked by computing pattern derivatives: each start tag, attribute, text
//! chunk and end tag transforms the current pattern, and the document is
//! valid if no step produces `notAllowed`.
//!
//! Compilation enforces the restrictions of section 7 of the `RelaxNG`
//! specification: where `attribute`, `element`, `list` and `text` may
//! occur, no attribute twice in a group, and no text or element name shared
//! by both sides of an `interleave`.
//!
//! The validator recovers from errors so that one pass reports every
//! problem it can attribute to an instance line. A rejected element is
//! skipped, a rejected attribute or text chunk is ignored, and unmet
//! content requirements are reported when the end tag is reached.
//!
//! # Examples
//!
//! ```
//! use xmltools::Document;
//! use xmltools::validation::relaxng::{compile, validate};
//!
//! let schema_doc = Document::parse_str(r#"
//!   <element name="greeting" xmlns="http://relaxng.org/ns/structure/1.0">
//!     <text/>
//!   </element>
//! "#).unwrap();
//! let schema = compile(&schema_doc).unwrap();
//!
//! let doc = Document::parse_str("<greeting>Hello!</greeting>").unwrap();
//! assert!(validate(&doc, &schema).is_valid);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::parser::input::is_xml_whitespace;
use crate::tree::{Document, NodeId, NodeKind};
use crate::validation::datatypes::{Datatype, XSD_DATATYPES};
use crate::validation::{ValidationError, ValidationResult};

/// The `RelaxNG` structure namespace.
pub const RELAXNG_NS: &str = "http://relaxng.org/ns/structure/1.0";

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// A simplified `RelaxNG` pattern.
///
/// `optional`, `zeroOrMore` and `mixed` are expressed through `Choice`,
/// `OneOrMore` and `Interleave` at compile time. `After` only appears in
/// derivatives computed during validation.
#[derive(Debug, PartialEq, Eq)]
pub enum Pattern {
    Empty,
    NotAllowed,
    Text,
    Choice(Arc<Pattern>, Arc<Pattern>),
    Interleave(Arc<Pattern>, Arc<Pattern>),
    Group(Arc<Pattern>, Arc<Pattern>),
    OneOrMore(Arc<Pattern>),
    /// A whitespace-separated token list matching the inner pattern.
    List(Arc<Pattern>),
    Data {
        datatype: Datatype,
        except: Option<Arc<Pattern>>,
    },
    Value {
        datatype: Datatype,
        value: String,
    },
    Attribute(NameClass, Arc<Pattern>),
    Element(NameClass, Arc<Pattern>),
    /// A reference to an entry of [`RelaxNgSchema::defines`].
    Ref(usize),
    /// The content still to match inside an element, then what follows it.
    After(Arc<Pattern>, Arc<Pattern>),
}

/// A name class: constrains which element or attribute names are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameClass {
    /// A specific name. `ns` is empty for names in no namespace.
    Name { ns: String, local: String },
    AnyName,
    AnyNameExcept(Box<NameClass>),
    NsName { ns: String },
    NsNameExcept { ns: String, except: Box<NameClass> },
    Choice(Box<NameClass>, Box<NameClass>),
}

impl NameClass {
    /// Tests whether this name class matches the given namespace and local name.
    #[must_use]
    pub fn matches(&self, ns: &str, local: &str) -> bool {
        match self {
            Self::Name {
                ns: expected_ns,
                local: expected_local,
            } => expected_ns == ns && expected_local == local,
            Self::AnyName => true,
            Self::AnyNameExcept(except) => !except.matches(ns, local),
            Self::NsName { ns: expected_ns } => expected_ns == ns,
            Self::NsNameExcept {
                ns: expected_ns,
                except,
            } => expected_ns == ns && !except.matches(ns, local),
            Self::Choice(a, b) => a.matches(ns, local) || b.matches(ns, local),
        }
    }

    /// A name class that matches nothing, used after a compile error.
    fn nothing() -> Self {
        Self::AnyNameExcept(Box::new(Self::AnyName))
    }
}

impl fmt::Display for NameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { local, .. } => write!(f, "{local}"),
            Self::AnyName | Self::AnyNameExcept(_) => write!(f, "*"),
            Self::NsName { ns } | Self::NsNameExcept { ns, .. } => write!(f, "{{{ns}}}*"),
            Self::Choice(a, b) => write!(f, "{a} | {b}"),
        }
    }
}

/// A named definition of a compiled grammar.
///
/// Every grammar also contributes one entry named `start`.
#[derive(Debug, Clone)]
pub struct Define {
    pub name: String,
    pub pattern: Arc<Pattern>,
}

/// A compiled `RelaxNG` schema ready for validation.
#[derive(Debug, Clone)]
pub struct RelaxNgSchema {
    start: Arc<Pattern>,
    defines: Vec<Define>,
}

impl RelaxNgSchema {
    /// The pattern the document element must match.
    #[must_use]
    pub fn start(&self) -> &Pattern {
        &self.start
    }

    /// All definitions, indexed by [`Pattern::Ref`].
    #[must_use]
    pub fn defines(&self) -> &[Define] {
        &self.defines
    }
}

/// A problem found while compiling a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("RelaxNG schema error at line {line}: {message}")]
pub struct SchemaError {
    pub message: String,
    /// Line of the schema element that caused the error, or 0.
    pub line: u32,
}

impl SchemaError {
    fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern constructors
// ---------------------------------------------------------------------------

fn empty() -> Arc<Pattern> {
    Arc::new(Pattern::Empty)
}

fn not_allowed() -> Arc<Pattern> {
    Arc::new(Pattern::NotAllowed)
}

fn text() -> Arc<Pattern> {
    Arc::new(Pattern::Text)
}

fn is_not_allowed(p: &Pattern) -> bool {
    matches!(p, Pattern::NotAllowed)
}

fn is_empty(p: &Pattern) -> bool {
    matches!(p, Pattern::Empty)
}

fn choice(p1: Arc<Pattern>, p2: Arc<Pattern>) -> Arc<Pattern> {
    if is_not_allowed(&p1) {
        return p2;
    }
    if is_not_allowed(&p2) || p1 == p2 {
        return p1;
    }
    Arc::new(Pattern::Choice(p1, p2))
}

fn group(p1: Arc<Pattern>, p2: Arc<Pattern>) -> Arc<Pattern> {
    if is_not_allowed(&p1) || is_not_allowed(&p2) {
        return not_allowed();
    }
    if is_empty(&p1) {
        return p2;
    }
    if is_empty(&p2) {
        return p1;
    }
    Arc::new(Pattern::Group(p1, p2))
}

fn interleave(p1: Arc<Pattern>, p2: Arc<Pattern>) -> Arc<Pattern> {
    if is_not_allowed(&p1) || is_not_allowed(&p2) {
        return not_allowed();
    }
    if is_empty(&p1) {
        return p2;
    }
    if is_empty(&p2) {
        return p1;
    }
    Arc::new(Pattern::Interleave(p1, p2))
}

fn after(p1: Arc<Pattern>, p2: Arc<Pattern>) -> Arc<Pattern> {
    if is_not_allowed(&p1) || is_not_allowed(&p2) {
        return not_allowed();
    }
    Arc::new(Pattern::After(p1, p2))
}

fn one_or_more(p: Arc<Pattern>) -> Arc<Pattern> {
    if is_not_allowed(&p) {
        return p;
    }
    Arc::new(Pattern::OneOrMore(p))
}

// ---------------------------------------------------------------------------
// Schema compiler
// ---------------------------------------------------------------------------

/// Parses `schema_xml` and compiles it.
///
/// # Errors
///
/// Returns the XML syntax error, or every schema error found, in document
/// order.
pub fn parse_relaxng(schema_xml: &str) -> Result<RelaxNgSchema, Vec<SchemaError>> {
    let doc = Document::parse_str(schema_xml).map_err(|e| {
        vec![SchemaError::new(
            e.location.line,
            format!("failed to parse schema XML: {}", e.message),
        )]
    })?;
    compile(&doc)
}

/// Compiles a parsed `RelaxNG` schema document.
///
/// The root may be a `<grammar>` or any single pattern element. Elements in
/// foreign namespaces are treated as annotations and ignored. `ns` and
/// `datatypeLibrary` attributes are inherited by descendants.
///
/// # Errors
///
/// Returns every error found, each with the line of the schema element that
/// caused it.
pub fn compile(doc: &Document) -> Result<RelaxNgSchema, Vec<SchemaError>> {
    let mut compiler = Compiler {
        doc,
        definitions: Vec::new(),
        scopes: Vec::new(),
        classes: HashMap::new(),
        targets: HashMap::new(),
        errors: Vec::new(),
    };
    let start = compiler.compile_root();
    compiler.check_recursion();
    if compiler.errors.is_empty() {
        compiler.check_restrictions();
    }

    if !compiler.errors.is_empty() {
        tracing::debug!(errors = compiler.errors.len(), "RelaxNG schema rejected");
        return Err(compiler.errors);
    }
    let defines: Vec<Define> = compiler
        .definitions
        .into_iter()
        .map(|def| Define {
            name: def.name,
            pattern: def.pattern.unwrap_or_else(not_allowed),
        })
        .collect();
    tracing::debug!(defines = defines.len(), "compiled RelaxNG schema");
    Ok(RelaxNgSchema {
        start: start.unwrap_or_else(not_allowed),
        defines,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combine {
    Choice,
    Interleave,
}

/// A definition slot. Slots are allocated on first mention so that
/// references may precede their definition.
struct Definition {
    name: String,
    pattern: Option<Arc<Pattern>>,
    combine: Option<Combine>,
    /// A definition without a `combine` attribute has been seen.
    has_bare: bool,
    line: u32,
    referenced_at: u32,
    /// The `<start>`/`<define>` elements (or bare root pattern) compiled
    /// into this slot.
    bodies: Vec<NodeId>,
}

impl Definition {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            pattern: None,
            combine: None,
            has_bare: false,
            line: 0,
            referenced_at: 0,
            bodies: Vec::new(),
        }
    }
}

/// One `<grammar>` level.
struct Scope {
    names: HashMap<String, usize>,
    start: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    Active,
    Done,
}

/// The section 7 contexts enclosing a pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
struct Context {
    attribute: bool,
    list: bool,
    except: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combination {
    Choice,
    Group,
    Interleave,
}

/// What a pattern contributes to the content of its enclosing element,
/// each item with its schema line.
#[derive(Debug, Clone, Default)]
struct Contents {
    attributes: Vec<(NameClass, u32)>,
    elements: Vec<(NameClass, u32)>,
    text: Option<u32>,
}

impl Contents {
    fn extend(&mut self, other: Contents) {
        self.attributes.extend(other.attributes);
        self.elements.extend(other.elements);
        self.text = self.text.or(other.text);
    }
}

/// Collects one name from every region a name class distinguishes. Two
/// classes overlap iff one of their combined representatives matches both.
fn representatives(class: &NameClass, out: &mut Vec<(String, String)>) {
    // Not a legal namespace URI or local name, so no `Name` matches it.
    const ILLEGAL: &str = "\u{0}";
    match class {
        NameClass::Name { ns, local } => out.push((ns.clone(), local.clone())),
        NameClass::AnyName => out.push((ILLEGAL.to_owned(), ILLEGAL.to_owned())),
        NameClass::AnyNameExcept(except) => {
            out.push((ILLEGAL.to_owned(), ILLEGAL.to_owned()));
            representatives(except, out);
        }
        NameClass::NsName { ns } => out.push((ns.clone(), ILLEGAL.to_owned())),
        NameClass::NsNameExcept { ns, except } => {
            out.push((ns.clone(), ILLEGAL.to_owned()));
            representatives(except, out);
        }
        NameClass::Choice(a, b) => {
            representatives(a, out);
            representatives(b, out);
        }
    }
}

fn overlaps(a: &NameClass, b: &NameClass) -> bool {
    let mut names = Vec::new();
    representatives(a, &mut names);
    representatives(b, &mut names);
    names
        .iter()
        .any(|(ns, local)| a.matches(ns, local) && b.matches(ns, local))
}

struct Compiler<'a> {
    doc: &'a Document,
    definitions: Vec<Definition>,
    scopes: Vec<Scope>,
    /// Name class of every compiled `<element>` and `<attribute>`.
    classes: HashMap<NodeId, NameClass>,
    /// Slot of every `<ref>`, `<parentRef>` and nested `<grammar>`.
    targets: HashMap<NodeId, usize>,
    errors: Vec<SchemaError>,
}

impl<'a> Compiler<'a> {
    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.errors.push(SchemaError::new(line, message));
    }

    fn is_rng(&self, node: NodeId) -> bool {
        self.doc.node(node).kind.is_element() && self.doc.node_namespace(node) == Some(RELAXNG_NS)
    }

    fn local(&self, el: NodeId) -> &'a str {
        self.doc.node_name(el).unwrap_or("")
    }

    fn rng_children(&self, el: NodeId) -> Vec<NodeId> {
        self.doc
            .children(el)
            .filter(|&child| self.is_rng(child))
            .collect()
    }

    /// Value of an attribute on `el` or its nearest ancestor carrying it.
    fn inherited(&self, el: NodeId, name: &str) -> &'a str {
        self.doc
            .ancestors(el)
            .find_map(|node| self.doc.attribute(node, name))
            .unwrap_or("")
    }

    fn compile_root(&mut self) -> Option<Arc<Pattern>> {
        let Some(root) = self.doc.root_element() else {
            self.error(0, "schema document has no root element");
            return None;
        };
        if !self.is_rng(root) {
            let name = self.doc.qualified_name(root).unwrap_or_default();
            let line = self.doc.line(root);
            self.error(
                line,
                format!("schema root element '{name}' is not in the RelaxNG namespace"),
            );
            return None;
        }
        if self.local(root) == "grammar" {
            return Some(self.grammar(root));
        }

        // A bare pattern behaves like a grammar whose start is that pattern.
        let start = self.open_scope();
        let pattern = self.pattern(root);
        let line = self.doc.line(root);
        self.define(start, None, pattern, line);
        self.add_body(start, root);
        self.close_scope(root);
        Some(Arc::new(Pattern::Ref(start)))
    }

    fn pattern(&mut self, el: NodeId) -> Arc<Pattern> {
        let line = self.doc.line(el);
        let local = self.local(el);
        match local {
            "element" => self.element(el),
            "attribute" => self.attribute(el),
            "group" => self.combined_children(el, group),
            "interleave" => self.combined_children(el, interleave),
            "choice" => self.combined_children(el, choice),
            "optional" => choice(self.combined_children(el, group), empty()),
            "zeroOrMore" => choice(one_or_more(self.combined_children(el, group)), empty()),
            "oneOrMore" => one_or_more(self.combined_children(el, group)),
            "mixed" => interleave(self.combined_children(el, group), text()),
            "list" => {
                let inner = self.combined_children(el, group);
                if is_not_allowed(&inner) {
                    inner
                } else {
                    Arc::new(Pattern::List(inner))
                }
            }
            "empty" => empty(),
            "text" => text(),
            "notAllowed" => not_allowed(),
            "ref" => self.reference(el, 0),
            "parentRef" => self.reference(el, 1),
            "grammar" => self.grammar(el),
            "value" => self.value(el),
            "data" => self.data(el),
            "externalRef" | "include" => {
                self.error(line, format!("<{local}> is not supported"));
                not_allowed()
            }
            _ => {
                self.error(line, format!("unknown RelaxNG pattern <{local}>"));
                not_allowed()
            }
        }
    }

    fn combined_children(
        &mut self,
        el: NodeId,
        combine: fn(Arc<Pattern>, Arc<Pattern>) -> Arc<Pattern>,
    ) -> Arc<Pattern> {
        let nodes = self.rng_children(el);
        self.combined(el, &nodes, combine)
    }

    /// Compiles `nodes` and folds them with `combine`. At least one
    /// pattern is required.
    fn combined(
        &mut self,
        el: NodeId,
        nodes: &[NodeId],
        combine: fn(Arc<Pattern>, Arc<Pattern>) -> Arc<Pattern>,
    ) -> Arc<Pattern> {
        let patterns: Vec<Arc<Pattern>> = nodes.iter().map(|&node| self.pattern(node)).collect();
        let mut iter = patterns.into_iter();
        let Some(first) = iter.next() else {
            let line = self.doc.line(el);
            let local = self.local(el);
            self.error(line, format!("<{local}> must contain at least one pattern"));
            return not_allowed();
        };
        iter.fold(first, combine)
    }

    fn element(&mut self, el: NodeId) -> Arc<Pattern> {
        let children = self.rng_children(el);
        let (name_class, content_nodes) = match self.doc.attribute(el, "name") {
            Some(name) => (self.qname_class(el, name, true), &children[..]),
            None => match children.split_first() {
                Some((&first, rest)) => (self.name_class(first), rest),
                None => {
                    let line = self.doc.line(el);
                    self.error(line, "<element> has no name");
                    return not_allowed();
                }
            },
        };
        let content = self.combined(el, content_nodes, group);
        self.classes.insert(el, name_class.clone());
        Arc::new(Pattern::Element(name_class, content))
    }

    fn attribute(&mut self, el: NodeId) -> Arc<Pattern> {
        let children = self.rng_children(el);
        let (name_class, content_nodes) = match self.doc.attribute(el, "name") {
            Some(name) => (self.qname_class(el, name, false), &children[..]),
            None => match children.split_first() {
                Some((&first, rest)) => (self.name_class(first), rest),
                None => {
                    let line = self.doc.line(el);
                    self.error(line, "<attribute> has no name");
                    return not_allowed();
                }
            },
        };
        let content = if content_nodes.is_empty() {
            text()
        } else {
            self.combined(el, content_nodes, group)
        };
        self.classes.insert(el, name_class.clone());
        Arc::new(Pattern::Attribute(name_class, content))
    }

    /// Resolves a QName written in the schema. Unprefixed names take the
    /// inherited `ns` for elements, and only a local `ns` for attributes.
    fn qname_class(&mut self, el: NodeId, name: &str, inherit_ns: bool) -> NameClass {
        let name = name.trim();
        if let Some((prefix, local)) = name.split_once(':') {
            if let Some(uri) = self.doc.lookup_namespace(el, Some(prefix)) {
                return NameClass::Name {
                    ns: uri.to_owned(),
                    local: local.to_owned(),
                };
            }
            let line = self.doc.line(el);
            self.error(
                line,
                format!("undefined namespace prefix '{prefix}' in name '{name}'"),
            );
            return NameClass::nothing();
        }
        let ns = if inherit_ns {
            self.inherited(el, "ns")
        } else {
            self.doc.attribute(el, "ns").unwrap_or("")
        };
        NameClass::Name {
            ns: ns.to_owned(),
            local: name.to_owned(),
        }
    }

    fn name_class(&mut self, el: NodeId) -> NameClass {
        let line = self.doc.line(el);
        let local = self.local(el);
        match local {
            "name" => {
                let text = self.doc.text_content(el);
                self.qname_class(el, &text, true)
            }
            "anyName" => match self.except_class(el) {
                Some(except) => NameClass::AnyNameExcept(Box::new(except)),
                None => NameClass::AnyName,
            },
            "nsName" => {
                let ns = self.inherited(el, "ns").to_owned();
                match self.except_class(el) {
                    Some(except) => NameClass::NsNameExcept {
                        ns,
                        except: Box::new(except),
                    },
                    None => NameClass::NsName { ns },
                }
            }
            "choice" => self.name_class_choice(el).unwrap_or_else(|| {
                self.error(line, "<choice> must contain at least one name class");
                NameClass::nothing()
            }),
            _ => {
                self.error(line, format!("<{local}> is not a name class"));
                NameClass::nothing()
            }
        }
    }

    fn name_class_choice(&mut self, el: NodeId) -> Option<NameClass> {
        self.rng_children(el)
            .into_iter()
            .map(|child| self.name_class(child))
            .reduce(|a, b| NameClass::Choice(Box::new(a), Box::new(b)))
    }

    fn except_class(&mut self, el: NodeId) -> Option<NameClass> {
        let except = self
            .rng_children(el)
            .into_iter()
            .find(|&child| self.local(child) == "except")?;
        let class = self.name_class_choice(except);
        if class.is_none() {
            let line = self.doc.line(except);
            self.error(line, "<except> must contain at least one name class");
        }
        class
    }

    fn datatype(&mut self, el: NodeId, library: &str, name: &str) -> Option<Datatype> {
        if let Some(datatype) = Datatype::lookup(library, name) {
            return Some(datatype);
        }
        let line = self.doc.line(el);
        if library.is_empty() || library == XSD_DATATYPES {
            self.error(line, format!("unsupported datatype '{name}'"));
        } else {
            self.error(line, format!("unsupported datatype library '{library}'"));
        }
        None
    }

    fn value(&mut self, el: NodeId) -> Arc<Pattern> {
        let (library, type_name) = match self.doc.attribute(el, "type") {
            Some(type_name) => (self.inherited(el, "datatypeLibrary"), type_name.trim()),
            None => ("", "token"),
        };
        let Some(datatype) = self.datatype(el, library, type_name) else {
            return not_allowed();
        };
        let value = self.doc.text_content(el);
        if !datatype.allows(&value) {
            let line = self.doc.line(el);
            self.error(
                line,
                format!("invalid value '{value}' for datatype '{type_name}'"),
            );
        }
        Arc::new(Pattern::Value { datatype, value })
    }

    fn data(&mut self, el: NodeId) -> Arc<Pattern> {
        let Some(type_name) = self.doc.attribute(el, "type") else {
            let line = self.doc.line(el);
            self.error(line, "<data> is missing the 'type' attribute");
            return not_allowed();
        };
        let library = self.inherited(el, "datatypeLibrary");
        let Some(datatype) = self.datatype(el, library, type_name.trim()) else {
            return not_allowed();
        };
        // <param> facets are accepted and ignored.
        let except = self
            .rng_children(el)
            .into_iter()
            .find(|&child| self.local(child) == "except")
            .map(|except| self.combined_children(except, choice));
        Arc::new(Pattern::Data { datatype, except })
    }

    fn reference(&mut self, el: NodeId, levels_up: usize) -> Arc<Pattern> {
        let line = self.doc.line(el);
        let local = self.local(el);
        let Some(name) = self.doc.attribute(el, "name") else {
            self.error(line, format!("<{local}> is missing the 'name' attribute"));
            return not_allowed();
        };
        let Some(depth) = self.scopes.len().checked_sub(1 + levels_up) else {
            self.error(line, format!("<{local}> outside a nested grammar"));
            return not_allowed();
        };
        let slot = self.slot(depth, name.trim());
        if let Some(def) = self.definitions.get_mut(slot) {
            if def.referenced_at == 0 {
                def.referenced_at = line;
            }
        }
        self.targets.insert(el, slot);
        Arc::new(Pattern::Ref(slot))
    }

    fn slot(&mut self, depth: usize, name: &str) -> usize {
        if let Some(&index) = self.scopes.get(depth).and_then(|s| s.names.get(name)) {
            return index;
        }
        let index = self.definitions.len();
        self.definitions.push(Definition::new(name));
        if let Some(scope) = self.scopes.get_mut(depth) {
            scope.names.insert(name.to_owned(), index);
        }
        index
    }

    fn open_scope(&mut self) -> usize {
        let start = self.definitions.len();
        self.definitions.push(Definition::new("start"));
        self.scopes.push(Scope {
            names: HashMap::new(),
            start,
        });
        start
    }

    /// Pops the innermost grammar and reports what it left unresolved.
    fn close_scope(&mut self, el: NodeId) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        if self
            .definitions
            .get(scope.start)
            .is_some_and(|def| def.pattern.is_none())
        {
            let line = self.doc.line(el);
            self.error(line, "grammar has no start element");
        }
        let mut slots: Vec<usize> = scope.names.into_values().collect();
        slots.sort_unstable();
        let undefined: Vec<(u32, String)> = slots
            .into_iter()
            .filter_map(|slot| self.definitions.get(slot))
            .filter(|def| def.pattern.is_none())
            .map(|def| {
                (
                    def.referenced_at,
                    format!("reference to undefined pattern '{}'", def.name),
                )
            })
            .collect();
        for (line, message) in undefined {
            self.error(line, message);
        }
    }

    fn grammar(&mut self, el: NodeId) -> Arc<Pattern> {
        let start = self.open_scope();
        self.targets.insert(el, start);
        self.grammar_content(el);
        self.close_scope(el);
        Arc::new(Pattern::Ref(start))
    }

    fn grammar_content(&mut self, el: NodeId) {
        let depth = self.scopes.len().saturating_sub(1);
        let start = self.scopes.last().map_or(0, |scope| scope.start);
        for child in self.rng_children(el) {
            let line = self.doc.line(child);
            let local = self.local(child);
            match local {
                "start" => {
                    let combine = self.combine(child);
                    let pattern = self.combined_children(child, group);
                    self.define(start, combine, pattern, line);
                    self.add_body(start, child);
                }
                "define" => {
                    let Some(name) = self.doc.attribute(child, "name") else {
                        self.error(line, "<define> is missing the 'name' attribute");
                        continue;
                    };
                    let slot = self.slot(depth, name.trim());
                    let combine = self.combine(child);
                    let pattern = self.combined_children(child, group);
                    self.define(slot, combine, pattern, line);
                    self.add_body(slot, child);
                }
                "div" => self.grammar_content(child),
                "include" => self.error(line, "<include> is not supported"),
                _ => self.error(line, format!("unexpected <{local}> in grammar")),
            }
        }
    }

    fn combine(&mut self, el: NodeId) -> Option<Combine> {
        match self.doc.attribute(el, "combine").map(str::trim) {
            None => None,
            Some("choice") => Some(Combine::Choice),
            Some("interleave") => Some(Combine::Interleave),
            Some(other) => {
                let line = self.doc.line(el);
                self.error(line, format!("invalid combine value '{other}'"));
                None
            }
        }
    }

    /// Adds one `<define>` or `<start>` body to a slot, merging it with
    /// earlier bodies according to `combine`.
    fn define(&mut self, slot: usize, combine: Option<Combine>, pattern: Arc<Pattern>, line: u32) {
        let Some(def) = self.definitions.get_mut(slot) else {
            return;
        };
        let mut problem = None;
        match combine {
            None if def.has_bare => {
                problem = Some(format!(
                    "multiple definitions of '{}' without a combine attribute",
                    def.name
                ));
            }
            None => def.has_bare = true,
            Some(c) => match def.combine {
                Some(existing) if existing != c => {
                    problem = Some(format!("conflicting combine values for '{}'", def.name));
                }
                _ => def.combine = Some(c),
            },
        }
        def.pattern = Some(match def.pattern.take() {
            None => {
                def.line = line;
                pattern
            }
            Some(previous) if def.combine == Some(Combine::Interleave) => {
                interleave(previous, pattern)
            }
            Some(previous) => choice(previous, pattern),
        });
        if let Some(message) = problem {
            self.error(line, message);
        }
    }

    fn add_body(&mut self, slot: usize, body: NodeId) {
        if let Some(def) = self.definitions.get_mut(slot) {
            def.bodies.push(body);
        }
    }

    /// Rejects definitions that reach themselves without passing through
    /// an `<element>`.
    fn check_recursion(&mut self) {
        let mut state = vec![Visit::Unseen; self.definitions.len()];
        for index in 0..self.definitions.len() {
            self.visit(index, &mut state);
        }
    }

    fn visit(&mut self, index: usize, state: &mut [Visit]) {
        if state.get(index) != Some(&Visit::Unseen) {
            return;
        }
        state[index] = Visit::Active;
        if let Some(pattern) = self.definitions.get(index).and_then(|d| d.pattern.clone()) {
            self.visit_pattern(&pattern, state);
        }
        state[index] = Visit::Done;
    }

    fn visit_pattern(&mut self, p: &Pattern, state: &mut [Visit]) {
        match p {
            Pattern::Ref(target) => match state.get(*target) {
                Some(Visit::Active) => {
                    let (line, name) = self
                        .definitions
                        .get(*target)
                        .map_or((0, String::new()), |d| (d.line, d.name.clone()));
                    self.error(
                        line,
                        format!("recursive reference to '{name}' outside an element"),
                    );
                }
                Some(Visit::Unseen) => self.visit(*target, state),
                _ => {}
            },
            Pattern::Choice(a, b)
            | Pattern::Group(a, b)
            | Pattern::Interleave(a, b)
            | Pattern::After(a, b) => {
                self.visit_pattern(a, state);
                self.visit_pattern(b, state);
            }
            Pattern::OneOrMore(a) | Pattern::List(a) | Pattern::Attribute(_, a) => {
                self.visit_pattern(a, state);
            }
            Pattern::Data {
                except: Some(except),
                ..
            } => self.visit_pattern(except, state),
            _ => {}
        }
    }

    // --- Section 7 restrictions ---

    /// Walks the schema from the top-level start, following references, and
    /// reports each misplaced pattern at its own line.
    fn check_restrictions(&mut self) {
        let mut seen = HashMap::new();
        self.restrict_definition(0, Context::default(), &mut seen);
    }

    /// Identical errors reached through several references are reported once.
    fn restriction(&mut self, line: u32, message: String) {
        let error = SchemaError::new(line, message);
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    fn restrict_definition(
        &mut self,
        slot: usize,
        context: Context,
        seen: &mut HashMap<(usize, Context), Contents>,
    ) -> Contents {
        if let Some(contents) = seen.get(&(slot, context)) {
            return contents.clone();
        }
        // Recursion only passes through elements, which contribute nothing
        // beyond their own name.
        seen.insert((slot, context), Contents::default());
        let Some((bodies, combine)) = self
            .definitions
            .get(slot)
            .map(|def| (def.bodies.clone(), def.combine))
        else {
            return Contents::default();
        };
        let parts = bodies
            .into_iter()
            .map(|body| match self.local(body) {
                "start" | "define" => {
                    let children = self.rng_children(body);
                    self.restrict_all(&children, context, Combination::Group, seen)
                }
                _ => self.restrict(body, context, seen),
            })
            .collect();
        let combination = match combine {
            Some(Combine::Interleave) => Combination::Interleave,
            _ => Combination::Choice,
        };
        let contents = self.merge_contents(parts, combination);
        seen.insert((slot, context), contents.clone());
        contents
    }

    fn restrict_all(
        &mut self,
        nodes: &[NodeId],
        context: Context,
        combination: Combination,
        seen: &mut HashMap<(usize, Context), Contents>,
    ) -> Contents {
        let parts = nodes
            .iter()
            .map(|&node| self.restrict(node, context, seen))
            .collect();
        self.merge_contents(parts, combination)
    }

    /// Merges sibling contents, rejecting attributes that may occur twice
    /// and, for interleave, elements or text that both sides could match.
    fn merge_contents(&mut self, parts: Vec<Contents>, combination: Combination) -> Contents {
        let mut merged = Contents::default();
        for part in parts {
            if combination != Combination::Choice {
                for (class, line) in &part.attributes {
                    if merged.attributes.iter().any(|(prior, _)| overlaps(prior, class)) {
                        self.restriction(*line, format!("duplicate attribute '{class}'"));
                    }
                }
            }
            if combination == Combination::Interleave {
                for (class, line) in &part.elements {
                    if merged.elements.iter().any(|(prior, _)| overlaps(prior, class)) {
                        self.restriction(
                            *line,
                            format!("element '{class}' in both operands of <interleave>"),
                        );
                    }
                }
                if let (Some(_), Some(line)) = (merged.text, part.text) {
                    self.restriction(line, "text in both operands of <interleave>".to_owned());
                }
            }
            merged.extend(part);
        }
        merged
    }

    fn class_of(&self, el: NodeId) -> NameClass {
        self.classes
            .get(&el)
            .cloned()
            .unwrap_or_else(NameClass::nothing)
    }

    /// Content patterns of an `<element>` or `<attribute>`, without its
    /// name class child.
    fn content_nodes(&self, el: NodeId) -> Vec<NodeId> {
        let mut children = self.rng_children(el);
        if self.doc.attribute(el, "name").is_none() && !children.is_empty() {
            children.remove(0);
        }
        children
    }

    fn restrict(
        &mut self,
        el: NodeId,
        context: Context,
        seen: &mut HashMap<(usize, Context), Contents>,
    ) -> Contents {
        let line = self.doc.line(el);
        let local = self.local(el);
        let allowed_in_except = matches!(
            local,
            "choice" | "data" | "value" | "notAllowed" | "ref" | "parentRef" | "grammar"
        );
        if context.except && !allowed_in_except {
            self.restriction(line, format!("<{local}> not allowed inside <except> of <data>"));
        } else if context.list
            && matches!(local, "element" | "attribute" | "list" | "interleave" | "mixed" | "text")
        {
            self.restriction(line, format!("<{local}> not allowed inside <list>"));
        } else if context.attribute && matches!(local, "element" | "attribute") {
            self.restriction(line, format!("<{local}> not allowed inside <attribute>"));
        }

        match local {
            "element" => {
                let class = self.class_of(el);
                let content = self.content_nodes(el);
                self.restrict_all(&content, Context::default(), Combination::Group, seen);
                Contents {
                    elements: vec![(class, line)],
                    ..Contents::default()
                }
            }
            "attribute" => {
                let class = self.class_of(el);
                let content = self.content_nodes(el);
                let inner = Context {
                    attribute: true,
                    ..context
                };
                self.restrict_all(&content, inner, Combination::Group, seen);
                Contents {
                    attributes: vec![(class, line)],
                    ..Contents::default()
                }
            }
            "group" | "optional" | "zeroOrMore" | "oneOrMore" => {
                let children = self.rng_children(el);
                self.restrict_all(&children, context, Combination::Group, seen)
            }
            "choice" => {
                let children = self.rng_children(el);
                self.restrict_all(&children, context, Combination::Choice, seen)
            }
            "interleave" => {
                let children = self.rng_children(el);
                self.restrict_all(&children, context, Combination::Interleave, seen)
            }
            "mixed" => {
                let children = self.rng_children(el);
                let content = self.restrict_all(&children, context, Combination::Group, seen);
                let text = Contents {
                    text: Some(line),
                    ..Contents::default()
                };
                self.merge_contents(vec![content, text], Combination::Interleave)
            }
            "list" => {
                let children = self.rng_children(el);
                let inner = Context {
                    list: true,
                    ..context
                };
                self.restrict_all(&children, inner, Combination::Group, seen);
                Contents::default()
            }
            "text" => Contents {
                text: Some(line),
                ..Contents::default()
            },
            "data" => {
                let inner = Context {
                    except: true,
                    ..context
                };
                for except in self.rng_children(el) {
                    if self.local(except) == "except" {
                        let choices = self.rng_children(except);
                        self.restrict_all(&choices, inner, Combination::Choice, seen);
                    }
                }
                Contents::default()
            }
            "ref" | "parentRef" | "grammar" => match self.targets.get(&el) {
                Some(&slot) => self.restrict_definition(slot, context, seen),
                None => Contents::default(),
            },
            _ => Contents::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates a document against a compiled schema.
///
/// Every error carries the line of the instance element (or text) that
/// caused it. Namespace declarations are not subject to validation.
#[must_use]
pub fn validate(doc: &Document, schema: &RelaxNgSchema) -> ValidationResult {
    let mut validator = Validator {
        schema,
        doc,
        errors: Vec::new(),
    };
    match doc.root_element() {
        Some(root) => {
            validator.element(Arc::clone(&schema.start), root);
        }
        None => validator.error(0, "document has no root element"),
    }
    tracing::debug!(errors = validator.errors.len(), "RelaxNG validation finished");
    ValidationResult::from_errors(validator.errors)
}

struct Validator<'a> {
    schema: &'a RelaxNgSchema,
    doc: &'a Document,
    errors: Vec<ValidationError>,
}

impl Validator<'_> {
    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.errors.push(ValidationError::new(line, message));
    }

    fn resolve(&self, p: &Arc<Pattern>) -> Arc<Pattern> {
        let mut current = Arc::clone(p);
        while let Pattern::Ref(index) = *current {
            current = match self.schema.defines.get(index) {
                Some(define) => Arc::clone(&define.pattern),
                None => return not_allowed(),
            };
        }
        current
    }

    // --- Derivatives ---

    fn nullable(&self, p: &Arc<Pattern>) -> bool {
        match &*self.resolve(p) {
            Pattern::Empty | Pattern::Text => true,
            Pattern::Group(a, b) | Pattern::Interleave(a, b) => self.nullable(a) && self.nullable(b),
            Pattern::Choice(a, b) => self.nullable(a) || self.nullable(b),
            Pattern::OneOrMore(a) => self.nullable(a),
            _ => false,
        }
    }

    /// With `lenient`, any data, value or list pattern accepts the text.
    fn text_deriv(&self, p: &Arc<Pattern>, s: &str, lenient: bool) -> Arc<Pattern> {
        let p = self.resolve(p);
        match &*p {
            Pattern::Choice(a, b) => choice(
                self.text_deriv(a, s, lenient),
                self.text_deriv(b, s, lenient),
            ),
            Pattern::Interleave(a, b) => choice(
                interleave(self.text_deriv(a, s, lenient), Arc::clone(b)),
                interleave(Arc::clone(a), self.text_deriv(b, s, lenient)),
            ),
            Pattern::Group(a, b) => {
                let first = group(self.text_deriv(a, s, lenient), Arc::clone(b));
                if self.nullable(a) {
                    choice(first, self.text_deriv(b, s, lenient))
                } else {
                    first
                }
            }
            Pattern::After(a, b) => after(self.text_deriv(a, s, lenient), Arc::clone(b)),
            Pattern::OneOrMore(a) => group(
                self.text_deriv(a, s, lenient),
                choice(Arc::clone(&p), empty()),
            ),
            Pattern::Text => Arc::clone(&p),
            Pattern::Value { .. } | Pattern::Data { .. } | Pattern::List(_) if lenient => empty(),
            Pattern::Value { datatype, value } => {
                if datatype.allows(s) && datatype.values_equal(value, s) {
                    empty()
                } else {
                    not_allowed()
                }
            }
            Pattern::Data { datatype, except } => {
                let excluded = except
                    .as_ref()
                    .is_some_and(|except| self.nullable(&self.text_deriv(except, s, false)));
                if datatype.allows(s) && !excluded {
                    empty()
                } else {
                    not_allowed()
                }
            }
            Pattern::List(inner) => {
                let mut rest = Arc::clone(inner);
                for token in s.split(is_xml_whitespace).filter(|t| !t.is_empty()) {
                    rest = self.text_deriv(&rest, token, false);
                }
                if self.nullable(&rest) {
                    empty()
                } else {
                    not_allowed()
                }
            }
            _ => not_allowed(),
        }
    }

    fn start_tag_open_deriv(&self, p: &Arc<Pattern>, ns: &str, local: &str) -> Arc<Pattern> {
        let p = self.resolve(p);
        match &*p {
            Pattern::Choice(a, b) => choice(
                self.start_tag_open_deriv(a, ns, local),
                self.start_tag_open_deriv(b, ns, local),
            ),
            Pattern::Element(name_class, content) => {
                if name_class.matches(ns, local) {
                    after(Arc::clone(content), empty())
                } else {
                    not_allowed()
                }
            }
            Pattern::Interleave(a, b) => choice(
                apply_after(
                    &|x| interleave(x, Arc::clone(b)),
                    self.start_tag_open_deriv(a, ns, local),
                ),
                apply_after(
                    &|x| interleave(Arc::clone(a), x),
                    self.start_tag_open_deriv(b, ns, local),
                ),
            ),
            Pattern::OneOrMore(a) => apply_after(
                &|x| group(x, choice(Arc::clone(&p), empty())),
                self.start_tag_open_deriv(a, ns, local),
            ),
            Pattern::Group(a, b) => {
                let first = apply_after(
                    &|x| group(x, Arc::clone(b)),
                    self.start_tag_open_deriv(a, ns, local),
                );
                if self.nullable(a) {
                    choice(first, self.start_tag_open_deriv(b, ns, local))
                } else {
                    first
                }
            }
            Pattern::After(a, b) => apply_after(
                &|x| after(x, Arc::clone(b)),
                self.start_tag_open_deriv(a, ns, local),
            ),
            _ => not_allowed(),
        }
    }

    /// With `lenient`, a matching name is enough.
    fn att_deriv(
        &self,
        p: &Arc<Pattern>,
        ns: &str,
        local: &str,
        value: &str,
        lenient: bool,
    ) -> Arc<Pattern> {
        let p = self.resolve(p);
        match &*p {
            Pattern::After(a, b) => after(self.att_deriv(a, ns, local, value, lenient), Arc::clone(b)),
            Pattern::Choice(a, b) => choice(
                self.att_deriv(a, ns, local, value, lenient),
                self.att_deriv(b, ns, local, value, lenient),
            ),
            Pattern::Group(a, b) => choice(
                group(self.att_deriv(a, ns, local, value, lenient), Arc::clone(b)),
                group(Arc::clone(a), self.att_deriv(b, ns, local, value, lenient)),
            ),
            Pattern::Interleave(a, b) => choice(
                interleave(self.att_deriv(a, ns, local, value, lenient), Arc::clone(b)),
                interleave(Arc::clone(a), self.att_deriv(b, ns, local, value, lenient)),
            ),
            Pattern::OneOrMore(a) => group(
                self.att_deriv(a, ns, local, value, lenient),
                choice(Arc::clone(&p), empty()),
            ),
            Pattern::Attribute(name_class, content) => {
                if name_class.matches(ns, local) && (lenient || self.value_match(content, value)) {
                    empty()
                } else {
                    not_allowed()
                }
            }
            _ => not_allowed(),
        }
    }

    fn value_match(&self, p: &Arc<Pattern>, s: &str) -> bool {
        (self.nullable(p) && s.chars().all(is_xml_whitespace))
            || self.nullable(&self.text_deriv(p, s, false))
    }

    /// With `lenient`, attributes still required are treated as present.
    fn start_tag_close_deriv(&self, p: &Arc<Pattern>, lenient: bool) -> Arc<Pattern> {
        let p = self.resolve(p);
        match &*p {
            Pattern::After(a, b) => after(self.start_tag_close_deriv(a, lenient), Arc::clone(b)),
            Pattern::Choice(a, b) => choice(
                self.start_tag_close_deriv(a, lenient),
                self.start_tag_close_deriv(b, lenient),
            ),
            Pattern::Group(a, b) => group(
                self.start_tag_close_deriv(a, lenient),
                self.start_tag_close_deriv(b, lenient),
            ),
            Pattern::Interleave(a, b) => interleave(
                self.start_tag_close_deriv(a, lenient),
                self.start_tag_close_deriv(b, lenient),
            ),
            Pattern::OneOrMore(a) => one_or_more(self.start_tag_close_deriv(a, lenient)),
            Pattern::Attribute(..) if lenient => empty(),
            Pattern::Attribute(..) => not_allowed(),
            _ => Arc::clone(&p),
        }
    }

    /// With `lenient`, unfinished content is abandoned.
    fn end_tag_deriv(&self, p: &Arc<Pattern>, lenient: bool) -> Arc<Pattern> {
        match &**p {
            Pattern::Choice(a, b) => {
                choice(self.end_tag_deriv(a, lenient), self.end_tag_deriv(b, lenient))
            }
            Pattern::After(a, b) if lenient || self.nullable(a) => Arc::clone(b),
            _ => not_allowed(),
        }
    }

    // --- Instance traversal ---

    /// Matches one element against `p` and returns the pattern for what
    /// may follow it. A rejected element leaves `p` unchanged.
    fn element(&mut self, p: Arc<Pattern>, el: NodeId) -> Arc<Pattern> {
        let doc = self.doc;
        let name = doc.qualified_name(el).unwrap_or_default();
        let line = doc.line(el);
        let ns = doc.node_namespace(el).unwrap_or("");
        let local = doc.node_name(el).unwrap_or("");

        let mut current = self.start_tag_open_deriv(&p, ns, local);
        if is_not_allowed(&current) {
            let expected = self.expected_elements(&p);
            self.error(
                line,
                format!("unexpected element '{name}'{}", expected_suffix(&expected)),
            );
            return p;
        }

        for attr in doc.attributes(el).iter().filter(|a| !a.is_namespace_decl()) {
            let attr_ns = attr.namespace.as_deref().unwrap_or("");
            let next = self.att_deriv(&current, attr_ns, &attr.name, &attr.value, false);
            if !is_not_allowed(&next) {
                current = next;
                continue;
            }
            let qname = attr.qualified_name();
            let named = self.att_deriv(&current, attr_ns, &attr.name, &attr.value, true);
            if is_not_allowed(&named) {
                self.error(
                    line,
                    format!("attribute '{qname}' not allowed on element '{name}'"),
                );
            } else {
                self.error(
                    line,
                    format!(
                        "invalid value '{}' for attribute '{qname}' of element '{name}'",
                        attr.value
                    ),
                );
                current = named;
            }
        }

        let closed = self.start_tag_close_deriv(&current, false);
        current = if is_not_allowed(&closed) {
            let message = match self.missing_attribute(&current, el) {
                Some(attr) => format!("element '{name}' is missing required attribute '{attr}'"),
                None => format!("element '{name}' is missing required attributes"),
            };
            self.error(line, message);
            self.start_tag_close_deriv(&current, true)
        } else {
            closed
        };

        current = self.children(current, el, &name);

        let ended = self.end_tag_deriv(&current, false);
        if !is_not_allowed(&ended) {
            return ended;
        }
        let expected = self.expected_elements(&current);
        let message = if expected.is_empty() {
            format!("element '{name}' has incomplete content")
        } else {
            format!("element '{name}' is incomplete, expected {}", describe(&expected))
        };
        self.error(line, message);
        self.end_tag_deriv(&current, true)
    }

    fn children(&mut self, mut p: Arc<Pattern>, el: NodeId, name: &str) -> Arc<Pattern> {
        let doc = self.doc;
        if !doc.children(el).any(|child| doc.node(child).kind.is_element()) {
            let content = doc.text_content(el);
            if content.chars().all(is_xml_whitespace) {
                let matched = self.text_deriv(&p, &content, false);
                return choice(p, matched);
            }
            let line = doc
                .children(el)
                .find(|&child| doc.node(child).kind.is_text())
                .map_or_else(|| doc.line(el), |child| doc.line(child));
            return self.text(p, &content, line, name);
        }

        let mut pending = String::new();
        let mut pending_line = 0;
        for child in doc.children(el) {
            match &doc.node(child).kind {
                NodeKind::Element { .. } => {
                    p = self.flush_text(p, &mut pending, pending_line, name);
                    p = self.element(p, child);
                }
                NodeKind::Text { content } => {
                    if pending.is_empty() {
                        pending_line = doc.line(child);
                    }
                    pending.push_str(content);
                }
                _ => {}
            }
        }
        self.flush_text(p, &mut pending, pending_line, name)
    }

    /// Whitespace between child elements is insignificant.
    fn flush_text(
        &mut self,
        p: Arc<Pattern>,
        pending: &mut String,
        line: u32,
        name: &str,
    ) -> Arc<Pattern> {
        let content = std::mem::take(pending);
        if content.chars().all(is_xml_whitespace) {
            return p;
        }
        self.text(p, &content, line, name)
    }

    fn text(&mut self, p: Arc<Pattern>, content: &str, line: u32, name: &str) -> Arc<Pattern> {
        let next = self.text_deriv(&p, content, false);
        if !is_not_allowed(&next) {
            return next;
        }
        let message = if self.accepts_text(&p) {
            format!(
                "invalid text content '{}' in element '{name}'",
                abbreviate(content.trim())
            )
        } else {
            format!("text not allowed in element '{name}'")
        };
        self.error(line, message);
        let recovered = self.text_deriv(&p, content, true);
        if is_not_allowed(&recovered) {
            p
        } else {
            recovered
        }
    }

    // --- Error reporting helpers ---

    /// Names of the elements that could start at `p`.
    fn expected_elements(&self, p: &Arc<Pattern>) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_expected(p, &mut names);
        names
    }

    fn collect_expected(&self, p: &Arc<Pattern>, names: &mut Vec<String>) {
        match &*self.resolve(p) {
            Pattern::After(a, _) | Pattern::OneOrMore(a) => self.collect_expected(a, names),
            Pattern::Choice(a, b) | Pattern::Interleave(a, b) => {
                self.collect_expected(a, names);
                self.collect_expected(b, names);
            }
            Pattern::Group(a, b) => {
                self.collect_expected(a, names);
                if self.nullable(a) {
                    self.collect_expected(b, names);
                }
            }
            Pattern::Element(name_class, _) => push_names(name_class, names),
            _ => {}
        }
    }

    /// The first non-optional attribute named at the head of `p` that `el`
    /// does not carry.
    fn missing_attribute(&self, p: &Arc<Pattern>, el: NodeId) -> Option<String> {
        match &*self.resolve(p) {
            Pattern::After(a, _) | Pattern::OneOrMore(a) => self.missing_attribute(a, el),
            Pattern::Group(a, b) | Pattern::Interleave(a, b) => self
                .missing_attribute(a, el)
                .or_else(|| self.missing_attribute(b, el)),
            Pattern::Choice(a, b) if !self.nullable(a) && !self.nullable(b) => self
                .missing_attribute(a, el)
                .or_else(|| self.missing_attribute(b, el)),
            Pattern::Attribute(NameClass::Name { ns, local }, _) => {
                let present = self.doc.attributes(el).iter().any(|attr| {
                    attr.namespace.as_deref().unwrap_or("") == ns && attr.name == *local
                });
                (!present).then(|| local.clone())
            }
            _ => None,
        }
    }

    fn accepts_text(&self, p: &Arc<Pattern>) -> bool {
        match &*self.resolve(p) {
            Pattern::After(a, _) | Pattern::OneOrMore(a) => self.accepts_text(a),
            Pattern::Choice(a, b) | Pattern::Group(a, b) | Pattern::Interleave(a, b) => {
                self.accepts_text(a) || self.accepts_text(b)
            }
            Pattern::Text | Pattern::Data { .. } | Pattern::Value { .. } | Pattern::List(_) => true,
            _ => false,
        }
    }
}

fn apply_after(f: &dyn Fn(Arc<Pattern>) -> Arc<Pattern>, p: Arc<Pattern>) -> Arc<Pattern> {
    match &*p {
        Pattern::After(a, b) => after(Arc::clone(a), f(Arc::clone(b))),
        Pattern::Choice(a, b) => choice(
            apply_after(f, Arc::clone(a)),
            apply_after(f, Arc::clone(b)),
        ),
        _ => not_allowed(),
    }
}

fn push_names(name_class: &NameClass, names: &mut Vec<String>) {
    if let NameClass::Choice(a, b) = name_class {
        push_names(a, names);
        push_names(b, names);
        return;
    }
    let name = name_class.to_string();
    if !names.contains(&name) {
        names.push(name);
    }
}

fn describe(names: &[String]) -> String {
    match names {
        [single] => format!("'{single}'"),
        _ => {
            let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
            format!("one of {}", quoted.join(", "))
        }
    }
}

fn expected_suffix(names: &[String]) -> String {
    if names.is_empty() {
        String::new()
    } else {
        format!(", expected {}", describe(names))
    }
}

fn abbreviate(text: &str) -> String {
    const MAX_CHARS: usize = 40;
    if text.chars().count() <= MAX_CHARS {
        return text.to_owned();
    }
    let mut short: String = text.chars().take(MAX_CHARS).collect();
    short.push_str("...");
    short
}
