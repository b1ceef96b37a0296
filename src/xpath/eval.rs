//! `XPath` 1.0 evaluator.
//!
//! Walks an [`Expr`] against a [`Document`]. The static part of the
//! evaluation context (document, variables, namespace bindings) lives in
//! [`XPathContext`]; the dynamic part (context node, position, size) is a
//! small [`Focus`] value threaded through the recursion.
//!
//! Prefixes in name tests are resolved against the namespace declarations
//! in scope at the node the evaluation started from, plus any bindings
//! registered with [`XPathContext::set_namespace`].

use std::collections::HashMap;

use super::ast::{Axis, BinaryOp, Expr, NodeTest, PathStart, Step};
use super::types::{parse_xpath_number, XPathError, XPathNode, XPathValue};
use crate::tree::{Document, NodeId, NodeKind, XML_NAMESPACE};

/// Static evaluation context for `XPath` expressions.
///
/// # Examples
///
/// ```
/// use xmltools::Document;
/// use xmltools::xpath::{parser, XPathContext, XPathValue};
///
/// let doc = Document::parse_str("<r><a/><a/></r>").unwrap();
/// let root = doc.root_element().unwrap();
/// let mut ctx = XPathContext::new(&doc, root);
/// ctx.set_variable("n", XPathValue::Number(2.0));
/// let expr = parser::parse("count(a) = $n").unwrap();
/// assert_eq!(ctx.evaluate(&expr).unwrap(), XPathValue::Boolean(true));
/// ```
pub struct XPathContext<'a> {
    doc: &'a Document,
    context: XPathNode,
    variables: HashMap<String, XPathValue>,
    namespaces: HashMap<String, String>,
}

/// The dynamic context: node, 1-based position and size.
#[derive(Debug, Clone, Copy)]
struct Focus {
    node: XPathNode,
    position: usize,
    size: usize,
}

impl<'a> XPathContext<'a> {
    /// Creates a context whose initial context node is `node`.
    #[must_use]
    pub fn new(doc: &'a Document, node: NodeId) -> Self {
        Self {
            doc,
            context: XPathNode::Node(node),
            variables: HashMap::new(),
            namespaces: HashMap::new(),
        }
    }

    /// Binds `$name` to a value.
    pub fn set_variable(&mut self, name: &str, value: XPathValue) {
        self.variables.insert(name.to_owned(), value);
    }

    /// Binds a prefix for name tests. Registered prefixes take precedence
    /// over declarations found in the document.
    pub fn set_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix.to_owned(), uri.to_owned());
    }

    /// Evaluates a parsed expression.
    ///
    /// # Errors
    ///
    /// Returns [`XPathError`] on unbound variables or prefixes, unknown
    /// functions, wrong argument counts, or node-set operations applied to
    /// other types.
    pub fn evaluate(&self, expr: &Expr) -> Result<XPathValue, XPathError> {
        let focus = Focus {
            node: self.context,
            position: 1,
            size: 1,
        };
        self.eval(expr, focus)
    }

    fn eval(&self, expr: &Expr, focus: Focus) -> Result<XPathValue, XPathError> {
        match expr {
            Expr::Number(n) => Ok(XPathValue::Number(*n)),
            Expr::Literal(s) => Ok(XPathValue::String(s.clone())),
            Expr::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| XPathError::UndefinedVariable { name: name.clone() }),
            Expr::Negate(inner) => Ok(XPathValue::Number(-self.number(inner, focus)?)),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, focus),
            Expr::Union(left, right) => {
                let mut nodes = self.node_set(left, focus)?;
                nodes.extend(self.node_set(right, focus)?);
                Ok(XPathValue::NodeSet(document_order(nodes)))
            }
            Expr::FunctionCall { name, args } => self.call(name, args, focus),
            Expr::Filter {
                primary,
                predicates,
            } => {
                let mut nodes = self.node_set(primary, focus)?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(XPathValue::NodeSet(nodes))
            }
            Expr::Path { start, steps } => {
                let mut nodes = match start {
                    PathStart::Root => vec![XPathNode::Node(self.doc.root())],
                    PathStart::Context => vec![focus.node],
                    PathStart::Filter(expr) => self.node_set(expr, focus)?,
                };
                for step in steps {
                    nodes = self.apply_step(&nodes, step)?;
                }
                Ok(XPathValue::NodeSet(nodes))
            }
        }
    }

    fn node_set(&self, expr: &Expr, focus: Focus) -> Result<Vec<XPathNode>, XPathError> {
        match self.eval(expr, focus)? {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::TypeError {
                expected: "node-set",
                found: other.type_name(),
            }),
        }
    }

    fn number(&self, expr: &Expr, focus: Focus) -> Result<f64, XPathError> {
        Ok(self.eval(expr, focus)?.to_number(self.doc))
    }

    fn string(&self, expr: &Expr, focus: Focus) -> Result<String, XPathError> {
        Ok(self.eval(expr, focus)?.to_xpath_string(self.doc))
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        focus: Focus,
    ) -> Result<XPathValue, XPathError> {
        let value = match op {
            BinaryOp::Or => XPathValue::Boolean(
                self.eval(left, focus)?.to_boolean() || self.eval(right, focus)?.to_boolean(),
            ),
            BinaryOp::And => XPathValue::Boolean(
                self.eval(left, focus)?.to_boolean() && self.eval(right, focus)?.to_boolean(),
            ),
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                let lhs = self.eval(left, focus)?;
                let rhs = self.eval(right, focus)?;
                XPathValue::Boolean(self.compare(op, &lhs, &rhs))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let a = self.number(left, focus)?;
                let b = self.number(right, focus)?;
                XPathValue::Number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                })
            }
        };
        Ok(value)
    }

    /// Comparison with the node-set expansion rules: a comparison involving
    /// a node-set holds if it holds for at least one member.
    fn compare(&self, op: BinaryOp, lhs: &XPathValue, rhs: &XPathValue) -> bool {
        use XPathValue::{Boolean, NodeSet, Number, String};
        let doc = self.doc;
        match (lhs, rhs) {
            (NodeSet(a), NodeSet(b)) => {
                let right: Vec<_> = b.iter().map(|n| n.string_value(doc)).collect();
                a.iter().any(|n| {
                    let l = n.string_value(doc);
                    right.iter().any(|r| compare_strings(op, &l, r))
                })
            }
            (NodeSet(_), Boolean(_)) | (Boolean(_), NodeSet(_)) => {
                compare_atomic(op, &Boolean(lhs.to_boolean()), &Boolean(rhs.to_boolean()), doc)
            }
            (NodeSet(nodes), other) => nodes
                .iter()
                .any(|n| compare_atomic(op, &String(n.string_value(doc)), other, doc)),
            (other, NodeSet(nodes)) => nodes
                .iter()
                .any(|n| compare_atomic(op, other, &String(n.string_value(doc)), doc)),
            (Number(_) | String(_) | Boolean(_), _) => compare_atomic(op, lhs, rhs, doc),
        }
    }

    // --- Location steps ---

    fn apply_step(&self, input: &[XPathNode], step: &Step) -> Result<Vec<XPathNode>, XPathError> {
        let namespace = self.resolve_test_namespace(&step.test)?;
        let mut selected = Vec::new();
        for &node in input {
            let mut candidates: Vec<XPathNode> = self
                .axis(node, step.axis)
                .into_iter()
                .filter(|&c| self.matches(c, &step.test, namespace.as_deref(), step.axis))
                .collect();
            for predicate in &step.predicates {
                candidates = self.filter(candidates, predicate)?;
            }
            selected.extend(candidates);
        }
        Ok(document_order(selected))
    }

    /// Keeps the nodes for which `predicate` holds. A numeric predicate
    /// selects by position; `nodes` must already be in axis order.
    fn filter(&self, nodes: Vec<XPathNode>, predicate: &Expr) -> Result<Vec<XPathNode>, XPathError> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, focus)? {
                #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// The nodes on `axis` from `node`, in axis order (nearest first for
    /// reverse axes).
    fn axis(&self, node: XPathNode, axis: Axis) -> Vec<XPathNode> {
        let doc = self.doc;
        let id = match node {
            XPathNode::Node(id) => id,
            XPathNode::Attribute { element, .. } => {
                return match axis {
                    Axis::SelfAxis | Axis::DescendantOrSelf => vec![node],
                    Axis::Parent => vec![XPathNode::Node(element)],
                    Axis::Ancestor => wrap(doc.ancestors(element)),
                    Axis::AncestorOrSelf => {
                        let mut out = vec![node];
                        out.extend(doc.ancestors(element).map(XPathNode::Node));
                        out
                    }
                    Axis::Following => {
                        let mut out = wrap(doc.descendants(element));
                        out.extend(self.following(element));
                        out
                    }
                    Axis::Preceding => self.preceding(element),
                    _ => Vec::new(),
                };
            }
        };
        match axis {
            Axis::Child => wrap(doc.children(id)),
            Axis::Descendant => wrap(doc.descendants(id)),
            Axis::DescendantOrSelf => wrap(std::iter::once(id).chain(doc.descendants(id))),
            Axis::Parent => wrap(doc.parent(id)),
            Axis::Ancestor => wrap(doc.ancestors(id).skip(1)),
            Axis::AncestorOrSelf => wrap(doc.ancestors(id)),
            Axis::FollowingSibling => wrap(std::iter::successors(doc.next_sibling(id), |&n| {
                doc.next_sibling(n)
            })),
            Axis::PrecedingSibling => wrap(std::iter::successors(doc.prev_sibling(id), |&n| {
                doc.prev_sibling(n)
            })),
            Axis::Following => self.following(id),
            Axis::Preceding => self.preceding(id),
            Axis::Attribute => doc
                .attributes(id)
                .iter()
                .enumerate()
                .filter(|(_, attr)| !attr.is_namespace_decl())
                .map(|(index, _)| XPathNode::Attribute { element: id, index })
                .collect(),
            Axis::Namespace => Vec::new(),
            Axis::SelfAxis => vec![node],
        }
    }

    /// Nodes after `id` in document order, excluding its descendants.
    fn following(&self, id: NodeId) -> Vec<XPathNode> {
        let doc = self.doc;
        let mut out = Vec::new();
        for anchor in doc.ancestors(id) {
            let mut sibling = doc.next_sibling(anchor);
            while let Some(s) = sibling {
                out.push(XPathNode::Node(s));
                out.extend(doc.descendants(s).map(XPathNode::Node));
                sibling = doc.next_sibling(s);
            }
        }
        out
    }

    /// Nodes before `id` in reverse document order, excluding its ancestors.
    fn preceding(&self, id: NodeId) -> Vec<XPathNode> {
        let doc = self.doc;
        let mut out = Vec::new();
        for anchor in doc.ancestors(id) {
            let mut sibling = doc.prev_sibling(anchor);
            while let Some(s) = sibling {
                let subtree: Vec<NodeId> = std::iter::once(s).chain(doc.descendants(s)).collect();
                out.extend(subtree.into_iter().rev().map(XPathNode::Node));
                sibling = doc.prev_sibling(s);
            }
        }
        out
    }

    /// Resolves the prefix of a name test to a namespace URI.
    fn resolve_test_namespace(&self, test: &NodeTest) -> Result<Option<String>, XPathError> {
        let prefix = match test {
            NodeTest::Name {
                prefix: Some(prefix),
                ..
            }
            | NodeTest::AnyInNamespace(prefix) => prefix,
            _ => return Ok(None),
        };
        if let Some(uri) = self.namespaces.get(prefix) {
            return Ok(Some(uri.clone()));
        }
        if prefix == "xml" {
            return Ok(Some(XML_NAMESPACE.to_owned()));
        }
        let anchor = match self.context.anchor() {
            root if root == self.doc.root() => self.doc.root_element().unwrap_or(root),
            other => other,
        };
        self.doc
            .lookup_namespace(anchor, Some(prefix))
            .map(|uri| Some(uri.to_owned()))
            .ok_or_else(|| XPathError::UndefinedNamespacePrefix {
                prefix: prefix.clone(),
            })
    }

    fn matches(&self, node: XPathNode, test: &NodeTest, namespace: Option<&str>, axis: Axis) -> bool {
        let doc = self.doc;
        let principal_is_attribute = axis == Axis::Attribute;
        let kind = node.as_node().map(|id| &doc.node(id).kind);
        let is_principal = match kind {
            None => principal_is_attribute,
            Some(kind) => !principal_is_attribute && kind.is_element(),
        };
        match test {
            NodeTest::Node => true,
            NodeTest::Text => matches!(kind, Some(NodeKind::Text { .. })),
            NodeTest::Comment => matches!(kind, Some(NodeKind::Comment { .. })),
            NodeTest::ProcessingInstruction(target) => match kind {
                Some(NodeKind::ProcessingInstruction { target: t, .. }) => {
                    target.as_ref().map_or(true, |want| want == t)
                }
                _ => false,
            },
            NodeTest::Any => is_principal,
            NodeTest::AnyInNamespace(_) => {
                is_principal && namespace.is_some_and(|ns| node.namespace_uri(doc) == ns)
            }
            NodeTest::Name { local, .. } => {
                if !is_principal || node.local_name(doc) != *local {
                    return false;
                }
                let actual = node.namespace_uri(doc);
                match namespace {
                    Some(ns) => actual == ns,
                    None => actual.is_empty(),
                }
            }
        }
    }

    // --- Core function library ---

    #[allow(clippy::too_many_lines)]
    fn call(&self, name: &str, args: &[Expr], focus: Focus) -> Result<XPathValue, XPathError> {
        let doc = self.doc;
        let value = match name {
            "last" => {
                arity(name, args, 0, Some(0))?;
                count_value(focus.size)
            }
            "position" => {
                arity(name, args, 0, Some(0))?;
                count_value(focus.position)
            }
            "count" => {
                arity(name, args, 1, Some(1))?;
                count_value(self.node_set(&args[0], focus)?.len())
            }
            "id" => {
                arity(name, args, 1, Some(1))?;
                let tokens = match self.eval(&args[0], focus)? {
                    XPathValue::NodeSet(nodes) => nodes
                        .iter()
                        .map(|n| n.string_value(doc))
                        .collect::<Vec<_>>()
                        .join(" "),
                    other => other.to_xpath_string(doc),
                };
                XPathValue::NodeSet(self.elements_by_id(&tokens))
            }
            "local-name" | "namespace-uri" | "name" => {
                arity(name, args, 0, Some(1))?;
                let target = match args.first() {
                    Some(arg) => self.node_set(arg, focus)?.first().copied(),
                    None => Some(focus.node),
                };
                let text = target.map_or_else(String::new, |n| match name {
                    "local-name" => n.local_name(doc),
                    "namespace-uri" => n.namespace_uri(doc),
                    _ => n.qualified_name(doc),
                });
                XPathValue::String(text)
            }
            "string" => {
                arity(name, args, 0, Some(1))?;
                XPathValue::String(self.string_arg_or_context(args, focus)?)
            }
            "concat" => {
                arity(name, args, 2, None)?;
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.string(arg, focus)?);
                }
                XPathValue::String(out)
            }
            "starts-with" | "contains" | "substring-before" | "substring-after" => {
                arity(name, args, 2, Some(2))?;
                let haystack = self.string(&args[0], focus)?;
                let needle = self.string(&args[1], focus)?;
                match name {
                    "starts-with" => XPathValue::Boolean(haystack.starts_with(&needle)),
                    "contains" => XPathValue::Boolean(haystack.contains(&needle)),
                    "substring-before" => XPathValue::String(
                        haystack
                            .split_once(needle.as_str())
                            .map(|(before, _)| before.to_owned())
                            .unwrap_or_default(),
                    ),
                    _ => XPathValue::String(
                        haystack
                            .split_once(needle.as_str())
                            .map(|(_, after)| after.to_owned())
                            .unwrap_or_default(),
                    ),
                }
            }
            "substring" => {
                arity(name, args, 2, Some(3))?;
                let s = self.string(&args[0], focus)?;
                let start = xpath_round(self.number(&args[1], focus)?);
                let end = match args.get(2) {
                    Some(len) => start + xpath_round(self.number(len, focus)?),
                    None => f64::INFINITY,
                };
                #[allow(clippy::cast_precision_loss)]
                let picked: String = s
                    .chars()
                    .enumerate()
                    .filter(|&(i, _)| {
                        let pos = (i + 1) as f64;
                        pos >= start && pos < end
                    })
                    .map(|(_, c)| c)
                    .collect();
                XPathValue::String(picked)
            }
            "string-length" => {
                arity(name, args, 0, Some(1))?;
                count_value(self.string_arg_or_context(args, focus)?.chars().count())
            }
            "normalize-space" => {
                arity(name, args, 0, Some(1))?;
                let s = self.string_arg_or_context(args, focus)?;
                XPathValue::String(
                    s.split(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
                        .filter(|w| !w.is_empty())
                        .collect::<Vec<_>>()
                        .join(" "),
                )
            }
            "translate" => {
                arity(name, args, 3, Some(3))?;
                let s = self.string(&args[0], focus)?;
                let from: Vec<char> = self.string(&args[1], focus)?.chars().collect();
                let to: Vec<char> = self.string(&args[2], focus)?.chars().collect();
                let translated = s
                    .chars()
                    .filter_map(|c| match from.iter().position(|&f| f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect();
                XPathValue::String(translated)
            }
            "boolean" => {
                arity(name, args, 1, Some(1))?;
                XPathValue::Boolean(self.eval(&args[0], focus)?.to_boolean())
            }
            "not" => {
                arity(name, args, 1, Some(1))?;
                XPathValue::Boolean(!self.eval(&args[0], focus)?.to_boolean())
            }
            "true" | "false" => {
                arity(name, args, 0, Some(0))?;
                XPathValue::Boolean(name == "true")
            }
            "lang" => {
                arity(name, args, 1, Some(1))?;
                let wanted = self.string(&args[0], focus)?.to_ascii_lowercase();
                let lang = doc
                    .ancestors(focus.node.anchor())
                    .find_map(|n| doc.attribute(n, "xml:lang"))
                    .map(str::to_ascii_lowercase);
                XPathValue::Boolean(lang.is_some_and(|l| {
                    l == wanted || l.strip_prefix(&wanted).is_some_and(|rest| rest.starts_with('-'))
                }))
            }
            "number" => {
                arity(name, args, 0, Some(1))?;
                let n = match args.first() {
                    Some(arg) => self.number(arg, focus)?,
                    None => parse_xpath_number(&focus.node.string_value(doc)),
                };
                XPathValue::Number(n)
            }
            "sum" => {
                arity(name, args, 1, Some(1))?;
                let total = self
                    .node_set(&args[0], focus)?
                    .iter()
                    .map(|n| parse_xpath_number(&n.string_value(doc)))
                    .sum();
                XPathValue::Number(total)
            }
            "floor" | "ceiling" | "round" => {
                arity(name, args, 1, Some(1))?;
                let n = self.number(&args[0], focus)?;
                XPathValue::Number(match name {
                    "floor" => n.floor(),
                    "ceiling" => n.ceil(),
                    _ => xpath_round(n),
                })
            }
            _ => {
                return Err(XPathError::UndefinedFunction {
                    name: name.to_owned(),
                })
            }
        };
        Ok(value)
    }

    fn string_arg_or_context(&self, args: &[Expr], focus: Focus) -> Result<String, XPathError> {
        match args.first() {
            Some(arg) => self.string(arg, focus),
            None => Ok(focus.node.string_value(self.doc)),
        }
    }

    /// Elements whose `xml:id` matches one of the whitespace-separated ids.
    fn elements_by_id(&self, ids: &str) -> Vec<XPathNode> {
        let wanted: Vec<&str> = ids.split_whitespace().collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        let doc = self.doc;
        doc.descendants(doc.root())
            .filter(|&n| {
                doc.attribute(n, "xml:id")
                    .is_some_and(|id| wanted.contains(&id))
            })
            .map(XPathNode::Node)
            .collect()
    }
}

fn wrap(nodes: impl IntoIterator<Item = NodeId>) -> Vec<XPathNode> {
    nodes.into_iter().map(XPathNode::Node).collect()
}

/// Sorts into document order and drops duplicates.
fn document_order(mut nodes: Vec<XPathNode>) -> Vec<XPathNode> {
    nodes.sort_by_key(|n| n.order_key());
    nodes.dedup();
    nodes
}

#[allow(clippy::cast_precision_loss)]
fn count_value(n: usize) -> XPathValue {
    XPathValue::Number(n as f64)
}

/// Rounds half towards positive infinity, keeping the sign of zero.
fn xpath_round(n: f64) -> f64 {
    if !n.is_finite() {
        return n;
    }
    if (-0.5..0.0).contains(&n) {
        return -0.0;
    }
    (n + 0.5).floor()
}

fn arity(name: &str, args: &[Expr], min: usize, max: Option<usize>) -> Result<(), XPathError> {
    let ok = args.len() >= min && max.map_or(true, |max| args.len() <= max);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    };
    Err(XPathError::InvalidArgCount {
        function: name.to_owned(),
        expected,
        found: args.len(),
    })
}

fn compare_strings(op: BinaryOp, a: &str, b: &str) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Neq => a != b,
        _ => compare_numbers(op, parse_xpath_number(a), parse_xpath_number(b)),
    }
}

#[allow(clippy::float_cmp)]
fn compare_numbers(op: BinaryOp, a: f64, b: f64) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Neq => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Lte => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Gte => a >= b,
        _ => false,
    }
}

/// Compares two values where neither is a node-set.
///
/// Equality goes through boolean, then number, then string. Relational
/// operators always compare numbers.
fn compare_atomic(op: BinaryOp, lhs: &XPathValue, rhs: &XPathValue, doc: &Document) -> bool {
    use XPathValue::{Boolean, Number};
    let either = |pred: fn(&XPathValue) -> bool| pred(lhs) || pred(rhs);
    match op {
        BinaryOp::Eq | BinaryOp::Neq if either(|v| matches!(v, Boolean(_))) => {
            (lhs.to_boolean() == rhs.to_boolean()) == (op == BinaryOp::Eq)
        }
        BinaryOp::Eq | BinaryOp::Neq if !either(|v| matches!(v, Number(_))) => {
            (lhs.to_xpath_string(doc) == rhs.to_xpath_string(doc)) == (op == BinaryOp::Eq)
        }
        _ => compare_numbers(op, lhs.to_number(doc), rhs.to_number(doc)),
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::xpath::parser::parse;
    use pretty_assertions::assert_eq;

    const BOOKS: &str = r#"<library xmlns:b="urn:books" xml:lang="en-GB">
  <b:book id="1" price="10"><title>Dune</title></b:book>
  <b:book id="2" price="25"><title>Emma</title></b:book>
  <magazine price="4"><title>Wired</title></magazine>
  <!-- shelf end -->
</library>"#;

    fn eval(xml: &str, expr: &str) -> Result<XPathValue, XPathError> {
        let doc = Document::parse_str(xml).unwrap();
        let root = doc.root_element().unwrap();
        XPathContext::new(&doc, root).evaluate(&parse(expr).unwrap())
    }

    fn string(xml: &str, expr: &str) -> String {
        let doc = Document::parse_str(xml).unwrap();
        let root = doc.root_element().unwrap();
        let value = XPathContext::new(&doc, root)
            .evaluate(&parse(expr).unwrap())
            .unwrap();
        value.to_xpath_string(&doc)
    }

    fn number(xml: &str, expr: &str) -> f64 {
        match eval(xml, expr).unwrap() {
            XPathValue::Number(n) => n,
            other => panic!("expected a number from {expr}, got {other:?}"),
        }
    }

    fn names(xml: &str, expr: &str) -> Vec<String> {
        let doc = Document::parse_str(xml).unwrap();
        let root = doc.root_element().unwrap();
        let value = XPathContext::new(&doc, root)
            .evaluate(&parse(expr).unwrap())
            .unwrap();
        value
            .as_node_set()
            .unwrap()
            .iter()
            .map(|n| n.qualified_name(&doc))
            .collect()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(number("<a/>", "1 + 2 * 3"), 7.0);
        assert_eq!(number("<a/>", "7 div 2"), 3.5);
        assert_eq!(number("<a/>", "-7 mod 3"), -1.0);
        assert_eq!(number("<a/>", "--4"), 4.0);
        assert!(number("<a/>", "0 div 0").is_nan());
        assert_eq!(number("<a/>", "1 div 0"), f64::INFINITY);
    }

    #[test]
    fn test_prefixed_name_tests_use_document_bindings() {
        assert_eq!(names(BOOKS, "b:book/title"), vec!["title", "title"]);
        assert_eq!(names(BOOKS, "b:*"), vec!["b:book", "b:book"]);
        assert_eq!(names(BOOKS, "book"), Vec::<String>::new());
    }

    #[test]
    fn test_undefined_prefix() {
        assert_eq!(
            eval(BOOKS, "x:book"),
            Err(XPathError::UndefinedNamespacePrefix {
                prefix: "x".to_owned()
            })
        );
    }

    #[test]
    fn test_default_namespace_needs_registered_prefix() {
        let xml = r#"<r xmlns="urn:d"><k/></r>"#;
        assert_eq!(names(xml, "k"), Vec::<String>::new());

        let doc = Document::parse_str(xml).unwrap();
        let mut ctx = XPathContext::new(&doc, doc.root_element().unwrap());
        ctx.set_namespace("d", "urn:d");
        let found = ctx.evaluate(&parse("d:k").unwrap()).unwrap();
        assert_eq!(found.as_node_set().unwrap().len(), 1);
    }

    #[test]
    fn test_attribute_axis_excludes_namespace_declarations() {
        assert_eq!(names(BOOKS, "@*"), vec!["xml:lang"]);
        assert_eq!(names(BOOKS, "*[1]/@*"), vec!["id", "price"]);
        assert_eq!(string(BOOKS, "*[2]/@price"), "25");
    }

    #[test]
    fn test_attribute_parent_and_order() {
        assert_eq!(names(BOOKS, "//@price/.."), vec!["b:book", "b:book", "magazine"]);
        assert_eq!(names(BOOKS, "(//@id | //title)[position() <= 3]"), vec!["id", "title", "id"]);
    }

    #[test]
    fn test_positional_predicates_follow_axis_direction() {
        let xml = "<r><a/><b/><c/><d/></r>";
        assert_eq!(names(xml, "d/preceding-sibling::*[1]"), vec!["c"]);
        assert_eq!(names(xml, "a/following-sibling::*[last()]"), vec!["d"]);
        assert_eq!(names(xml, "*[position() mod 2 = 0]"), vec!["b", "d"]);
        assert_eq!(names(xml, "c/ancestor-or-self::*[1]"), vec!["c"]);
    }

    #[test]
    fn test_following_and_preceding() {
        let xml = "<r><a><a1/></a><b><b1/><b2/></b><c/></r>";
        assert_eq!(names(xml, "b/b1/following::*"), vec!["b2", "c"]);
        assert_eq!(names(xml, "b/b2/preceding::*"), vec!["a", "a1", "b1"]);
        assert_eq!(names(xml, "b/preceding::*[1]"), vec!["a1"]);
    }

    #[test]
    fn test_descendants_and_root() {
        assert_eq!(number(BOOKS, "count(//title)"), 3.0);
        assert_eq!(number(BOOKS, "count(/)"), 1.0);
        assert_eq!(names(BOOKS, "/*"), vec!["library"]);
        assert_eq!(number(BOOKS, "count(//comment())"), 1.0);
        assert_eq!(number(BOOKS, "count(descendant::text()[normalize-space()])"), 3.0);
    }

    #[test]
    fn test_comparisons_over_node_sets() {
        assert!(eval(BOOKS, "//@price > 20").unwrap().to_boolean());
        assert!(!eval(BOOKS, "//@price > 30").unwrap().to_boolean());
        assert!(eval(BOOKS, "//title = 'Emma'").unwrap().to_boolean());
        assert!(eval(BOOKS, "//title != 'Emma'").unwrap().to_boolean());
        assert!(!eval(BOOKS, "//missing = //missing").unwrap().to_boolean());
        assert!(eval(BOOKS, "//missing = false()").unwrap().to_boolean());
        assert!(eval(BOOKS, "'1' = 1.0").unwrap().to_boolean());
        assert!(eval(BOOKS, "true() = 'x'").unwrap().to_boolean());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(string("<a/>", "concat('a', 1, true())"), "a1true");
        assert_eq!(string("<a/>", "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(string("<a/>", "substring('12345', 0, 3)"), "12");
        assert_eq!(string("<a/>", "substring('12345', 0 div 0, 3)"), "");
        assert_eq!(string("<a/>", "substring('12345', -42, 1 div 0)"), "12345");
        assert_eq!(string("<a/>", "substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(string("<a/>", "substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(string("<a/>", "normalize-space('  a \n b  ')"), "a b");
        assert_eq!(string("<a/>", "translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(number("<a/>", "string-length('caf\u{e9}')"), 4.0);
    }

    #[test]
    fn test_context_defaulting_functions() {
        let xml = "<p>  two  words </p>";
        assert_eq!(string(xml, "normalize-space()"), "two words");
        assert_eq!(number(xml, "string-length()"), 13.0);
        assert_eq!(string(xml, "name()"), "p");
        assert_eq!(string(BOOKS, "namespace-uri(*[1])"), "urn:books");
        assert_eq!(string(BOOKS, "local-name(*[1])"), "book");
        assert_eq!(string(BOOKS, "name(*[1])"), "b:book");
    }

    #[test]
    fn test_number_functions() {
        assert_eq!(number(BOOKS, "sum(//@price)"), 39.0);
        assert_eq!(number("<a/>", "round(2.5)"), 3.0);
        assert_eq!(number("<a/>", "round(-2.5)"), -2.0);
        assert!(number("<a/>", "round(-0.4)").is_sign_negative());
        assert_eq!(number("<a/>", "floor(-1.5)"), -2.0);
        assert_eq!(number("<a/>", "ceiling(1.2)"), 2.0);
        assert!(number("<a/>", "number('abc')").is_nan());
    }

    #[test]
    fn test_lang_and_id() {
        assert!(eval(BOOKS, "lang('en')").unwrap().to_boolean());
        assert!(!eval(BOOKS, "lang('fr')").unwrap().to_boolean());
        let xml = r#"<r><x xml:id="k1"/><y xml:id="k2"/><z id="k3"/></r>"#;
        assert_eq!(names(xml, "id('k2 k1 k3')"), vec!["x", "y"]);
    }

    #[test]
    fn test_variables() {
        let doc = Document::parse_str("<r><i>3</i><i>4</i></r>").unwrap();
        let mut ctx = XPathContext::new(&doc, doc.root_element().unwrap());
        ctx.set_variable("limit", XPathValue::Number(3.5));
        let value = ctx.evaluate(&parse("count(i[. > $limit])").unwrap()).unwrap();
        assert_eq!(value, XPathValue::Number(1.0));
        assert_eq!(
            ctx.evaluate(&parse("$missing").unwrap()),
            Err(XPathError::UndefinedVariable {
                name: "missing".to_owned()
            })
        );
    }

    #[test]
    fn test_evaluation_errors() {
        assert_eq!(
            eval("<a/>", "frobnicate()"),
            Err(XPathError::UndefinedFunction {
                name: "frobnicate".to_owned()
            })
        );
        assert_eq!(
            eval("<a/>", "count()"),
            Err(XPathError::InvalidArgCount {
                function: "count".to_owned(),
                expected: "1".to_owned(),
                found: 0,
            })
        );
        assert_eq!(
            eval("<a/>", "1 | 2"),
            Err(XPathError::TypeError {
                expected: "node-set",
                found: "number",
            })
        );
        assert!(eval("<a/>", "'x'/a").is_err());
    }
}
