//! Syntax tree for parsed `XPath` 1.0 expressions.
//!
//! Abbreviations are expanded by the parser: `//` becomes a
//! `descendant-or-self::node()` step, `.` and `..` become `self::node()` and
//! `parent::node()`, and `@` selects the attribute axis.

use std::fmt;

/// An `XPath` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Literal(String),
    /// `$name`, without the dollar sign.
    Variable(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Union(Box<Expr>, Box<Expr>),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    /// A primary expression followed by predicates, e.g. `$set[2]`.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
    },
    /// A location path, possibly rooted at a filter expression.
    Path {
        start: PathStart,
        steps: Vec<Step>,
    },
}

/// Where a location path begins.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// `/...`: the document node.
    Root,
    /// A relative path: the context node.
    Context,
    /// `expr/...`: every node of a node-set valued expression.
    Filter(Box<Expr>),
}

/// Binary operators, in no particular precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// The operator as written in an expression.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "div",
            Self::Mod => "mod",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One location step: `axis::test[pred]...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    /// A step with no predicates.
    #[must_use]
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }
}

/// The thirteen `XPath` 1.0 axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    /// Looks up an axis by its name in an expression.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "attribute" => Self::Attribute,
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "following" => Self::Following,
            "following-sibling" => Self::FollowingSibling,
            "namespace" => Self::Namespace,
            "parent" => Self::Parent,
            "preceding" => Self::Preceding,
            "preceding-sibling" => Self::PrecedingSibling,
            "self" => Self::SelfAxis,
            _ => return None,
        })
    }

    /// Reverse axes number their proximity positions backwards from the
    /// context node.
    #[must_use]
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Self::Ancestor | Self::AncestorOrSelf | Self::Preceding | Self::PrecedingSibling
        )
    }
}

/// The node test of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `name` or `prefix:name`.
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// `*`
    Any,
    /// `prefix:*`
    AnyInNamespace(String),
    /// `node()`
    Node,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()` with an optional target literal.
    ProcessingInstruction(Option<String>),
}

impl NodeTest {
    /// Builds a name test from its lexical form (`*`, `p:*`, `p:x`, `x`).
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name == "*" {
            return Self::Any;
        }
        match name.split_once(':') {
            Some((prefix, "*")) => Self::AnyInNamespace(prefix.to_owned()),
            Some((prefix, local)) => Self::Name {
                prefix: Some(prefix.to_owned()),
                local: local.to_owned(),
            },
            None => Self::Name {
                prefix: None,
                local: name.to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_axis_lookup() {
        assert_eq!(Axis::from_name("following-sibling"), Some(Axis::FollowingSibling));
        assert_eq!(Axis::from_name("self"), Some(Axis::SelfAxis));
        assert_eq!(Axis::from_name("sibling"), None);
        assert!(Axis::PrecedingSibling.is_reverse());
        assert!(!Axis::Following.is_reverse());
    }

    #[test]
    fn test_name_test_forms() {
        assert_eq!(NodeTest::from_name("*"), NodeTest::Any);
        assert_eq!(NodeTest::from_name("h:*"), NodeTest::AnyInNamespace("h".to_owned()));
        assert_eq!(
            NodeTest::from_name("h:p"),
            NodeTest::Name {
                prefix: Some("h".to_owned()),
                local: "p".to_owned()
            }
        );
        assert_eq!(
            NodeTest::from_name("p"),
            NodeTest::Name {
                prefix: None,
                local: "p".to_owned()
            }
        );
    }

    #[test]
    fn test_operator_symbols() {
        assert_eq!(BinaryOp::Neq.to_string(), "!=");
        assert_eq!(BinaryOp::Mod.to_string(), "mod");
    }
}
