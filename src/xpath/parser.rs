//! Recursive descent parser for `XPath` 1.0.
//!
//! One method per grammar production, lowest precedence first:
//!
//! ```text
//! Expr           ::= OrExpr
//! OrExpr         ::= AndExpr ('or' AndExpr)*
//! AndExpr        ::= EqualityExpr ('and' EqualityExpr)*
//! EqualityExpr   ::= RelationalExpr (('=' | '!=') RelationalExpr)*
//! RelationalExpr ::= AdditiveExpr (('<' | '<=' | '>' | '>=') AdditiveExpr)*
//! AdditiveExpr   ::= MultiplicativeExpr (('+' | '-') MultiplicativeExpr)*
//! MultiplicativeExpr ::= UnaryExpr (('*' | 'div' | 'mod') UnaryExpr)*
//! UnaryExpr      ::= '-'* UnionExpr
//! UnionExpr      ::= PathExpr ('|' PathExpr)*
//! PathExpr       ::= LocationPath | FilterExpr (('/' | '//') RelativeLocationPath)?
//! FilterExpr     ::= PrimaryExpr Predicate*
//! ```

use super::ast::{Axis, BinaryOp, Expr, NodeTest, PathStart, Step};
use super::lexer::{tokenize, Spanned, Token};
use super::types::XPathError;

/// Deepest syntax tree the parser will build. Parenthesised groups,
/// predicates, function arguments, unary minus and binary operators each
/// count one level.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parses an expression into its syntax tree.
///
/// # Errors
///
/// Returns [`XPathError::InvalidExpression`] if the expression is empty or
/// malformed, or nested deeper than [`MAX_NESTING_DEPTH`]. The error's
/// `position` is the byte offset of the offending token.
pub fn parse(input: &str) -> Result<Expr, XPathError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(XPathError::syntax(0, "empty XPath expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(XPathError::syntax(
            extra.pos,
            format!("unexpected token '{}' after expression", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Byte length of the input, used as the position of end-of-input errors.
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), XPathError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{expected}'")))
        }
    }

    /// Builds "expected X, found Y" for the current token.
    fn unexpected(&self, what: &str) -> XPathError {
        match self.tokens.get(self.pos) {
            Some(s) => XPathError::syntax(s.pos, format!("expected {what}, found '{}'", s.token)),
            None => XPathError::syntax(self.end, format!("expected {what}, found end of expression")),
        }
    }

    /// Takes one level of nesting. Levels taken inside an `OrExpr` are
    /// released when it returns.
    fn descend(&mut self) -> Result<(), XPathError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            let pos = self.tokens.get(self.pos).map_or(self.end, |s| s.pos);
            return Err(XPathError::syntax(pos, "expression nested too deeply"));
        }
        Ok(())
    }

    /// Parses a left-associative chain of binary operators.
    fn binary_chain(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, XPathError>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, XPathError> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek().and_then(operator) {
            self.descend()?;
            self.pos += 1;
            let right = operand(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let outer = self.depth;
        self.descend()?;
        let expr =
            self.binary_chain(Self::parse_and, |t| (*t == Token::Or).then_some(BinaryOp::Or))?;
        self.depth = outer;
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        self.binary_chain(Self::parse_equality, |t| {
            (*t == Token::And).then_some(BinaryOp::And)
        })
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        self.binary_chain(Self::parse_relational, |t| match t {
            Token::Equal => Some(BinaryOp::Eq),
            Token::NotEqual => Some(BinaryOp::Neq),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        self.binary_chain(Self::parse_additive, |t| match t {
            Token::LessThan => Some(BinaryOp::Lt),
            Token::LessThanEqual => Some(BinaryOp::Lte),
            Token::GreaterThan => Some(BinaryOp::Gt),
            Token::GreaterThanEqual => Some(BinaryOp::Gte),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        self.binary_chain(Self::parse_multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        self.binary_chain(Self::parse_unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Div => Some(BinaryOp::Div),
            Token::Mod => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        let mut negations = 0;
        while self.eat(&Token::Minus) {
            self.descend()?;
            negations += 1;
        }
        let mut expr = self.parse_union()?;
        for _ in 0..negations {
            expr = Expr::Negate(Box::new(expr));
        }
        Ok(expr)
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            self.descend()?;
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let mut steps = Vec::new();
                if self.at_step_start() {
                    self.parse_relative_path(&mut steps)?;
                }
                Ok(Expr::Path {
                    start: PathStart::Root,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![descendant_or_self()];
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path {
                    start: PathStart::Root,
                    steps,
                })
            }
            _ if self.at_step_start() => {
                let mut steps = Vec::new();
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path {
                    start: PathStart::Context,
                    steps,
                })
            }
            _ => {
                let filter = self.parse_filter()?;
                let mut steps = Vec::new();
                match self.peek() {
                    Some(Token::Slash) => self.pos += 1,
                    Some(Token::DoubleSlash) => {
                        self.pos += 1;
                        steps.push(descendant_or_self());
                    }
                    _ => return Ok(filter),
                }
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path {
                    start: PathStart::Filter(Box::new(filter)),
                    steps,
                })
            }
        }
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Name(_)
                    | Token::AxisName(_)
                    | Token::NodeType(_)
                    | Token::At
                    | Token::Dot
                    | Token::DotDot
            )
        )
    }

    fn parse_relative_path(&mut self, steps: &mut Vec<Step>) -> Result<(), XPathError> {
        steps.push(self.parse_step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => self.pos += 1,
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(descendant_or_self());
                }
                _ => return Ok(()),
            }
            steps.push(self.parse_step()?);
        }
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::AxisName(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_second())
        {
            let position = self.tokens[self.pos].pos;
            let axis = Axis::from_name(name)
                .ok_or_else(|| XPathError::syntax(position, format!("unknown axis '{name}'")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let test = NodeTest::from_name(name);
                self.pos += 1;
                Ok(test)
            }
            Some(Token::NodeType(kind)) => {
                let kind = kind.clone();
                self.pos += 1;
                self.expect(&Token::LeftParen)?;
                let test = match kind.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => match self.peek() {
                        Some(Token::Literal(target)) => {
                            let target = target.clone();
                            self.pos += 1;
                            NodeTest::ProcessingInstruction(Some(target))
                        }
                        _ => NodeTest::ProcessingInstruction(None),
                    },
                };
                self.expect(&Token::RightParen)?;
                Ok(test)
            }
            _ => Err(self.unexpected("node test")),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LeftBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RightBracket)?;
        }
        Ok(predicates)
    }

    fn parse_filter(&mut self) -> Result<Expr, XPathError> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        if predicates.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Some(Token::VariableReference(_) | Token::Literal(_) | Token::Number(_)) => {
                match self.next() {
                    Some(Token::VariableReference(name)) => Ok(Expr::Variable(name)),
                    Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
                    Some(Token::Number(n)) => Ok(Expr::Number(n)),
                    _ => Err(self.unexpected("expression")),
                }
            }
            Some(Token::LeftParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(&Token::RightParen)?;
                Ok(inner)
            }
            Some(Token::FunctionName(name)) => {
                let name = name.clone();
                self.pos += 1;
                self.expect(&Token::LeftParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RightParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if !self.eat(&Token::Comma) {
                            self.expect(&Token::RightParen)?;
                            break;
                        }
                    }
                }
                Ok(Expr::FunctionCall { name, args })
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}

fn descendant_or_self() -> Step {
    Step::new(Axis::DescendantOrSelf, NodeTest::Node)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn child(local: &str) -> Step {
        Step::new(Axis::Child, NodeTest::from_name(local))
    }

    fn error_message(input: &str) -> String {
        match parse(input) {
            Err(XPathError::InvalidExpression { message, .. }) => message,
            other => panic!("expected a syntax error for {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        assert_eq!(
            parse("/a/b").unwrap(),
            Expr::Path {
                start: PathStart::Root,
                steps: vec![child("a"), child("b")],
            }
        );
        assert_eq!(
            parse("a").unwrap(),
            Expr::Path {
                start: PathStart::Context,
                steps: vec![child("a")],
            }
        );
        assert_eq!(
            parse("/").unwrap(),
            Expr::Path {
                start: PathStart::Root,
                steps: vec![],
            }
        );
    }

    #[test]
    fn test_abbreviations_expand() {
        assert_eq!(
            parse("//a/../@id").unwrap(),
            Expr::Path {
                start: PathStart::Root,
                steps: vec![
                    descendant_or_self(),
                    child("a"),
                    Step::new(Axis::Parent, NodeTest::Node),
                    Step::new(Axis::Attribute, NodeTest::from_name("id")),
                ],
            }
        );
    }

    #[test]
    fn test_predicates_and_axes() {
        let expr = parse("ancestor-or-self::x[1][@k='v']").unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("expected a path");
        };
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].axis, Axis::AncestorOrSelf);
        assert_eq!(steps[0].predicates.len(), 2);
        assert_eq!(steps[0].predicates[0], Expr::Number(1.0));
    }

    #[test]
    fn test_node_type_tests() {
        let expr = parse("processing-instruction('php') | comment() | text()").unwrap();
        let Expr::Union(left, right) = expr else {
            panic!("expected a union");
        };
        assert_eq!(
            *right,
            Expr::Path {
                start: PathStart::Context,
                steps: vec![Step::new(Axis::Child, NodeTest::Text)],
            }
        );
        assert!(matches!(*left, Expr::Union(..)));
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("1 + 2 * 3 = 7 or false()").unwrap(),
            Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(Expr::Binary {
                    op: BinaryOp::Eq,
                    left: Box::new(Expr::Binary {
                        op: BinaryOp::Add,
                        left: Box::new(Expr::Number(1.0)),
                        right: Box::new(Expr::Binary {
                            op: BinaryOp::Mul,
                            left: Box::new(Expr::Number(2.0)),
                            right: Box::new(Expr::Number(3.0)),
                        }),
                    }),
                    right: Box::new(Expr::Number(7.0)),
                }),
                right: Box::new(Expr::FunctionCall {
                    name: "false".to_owned(),
                    args: vec![],
                }),
            }
        );
    }

    #[test]
    fn test_filter_expression_with_path() {
        let expr = parse("$items[2]//name").unwrap();
        let Expr::Path { start, steps } = expr else {
            panic!("expected a path");
        };
        assert!(matches!(start, PathStart::Filter(f) if matches!(*f, Expr::Filter { .. })));
        assert_eq!(steps, vec![descendant_or_self(), child("name")]);
    }

    #[test]
    fn test_unary_minus_nests() {
        assert_eq!(
            parse("--1").unwrap(),
            Expr::Negate(Box::new(Expr::Negate(Box::new(Expr::Number(1.0)))))
        );
    }

    #[test]
    fn test_triple_slash_is_rejected() {
        assert_eq!(error_message("///bad"), "expected node test, found '/'");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(error_message(""), "empty XPath expression");
        assert_eq!(error_message("   "), "empty XPath expression");
        assert_eq!(error_message("a b"), "unexpected token 'b' after expression");
        assert_eq!(error_message("a/"), "expected node test, found end of expression");
        assert_eq!(error_message("count(a"), "expected ')', found end of expression");
        assert_eq!(error_message("bogus::a"), "unknown axis 'bogus'");
        assert_eq!(error_message("a[1"), "expected ']', found end of expression");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        assert_eq!(error_message(&deep), "expression nested too deeply");
        assert_eq!(error_message(&"(".repeat(10_000)), "expression nested too deeply");
        assert_eq!(error_message(&"-".repeat(10_000)), "expression nested too deeply");
        assert_eq!(error_message(&format!("a{}", "[a".repeat(500))), "expression nested too deeply");

        let shallow = format!("{}1{}", "(".repeat(60), ")".repeat(60));
        assert_eq!(parse(&shallow), Ok(Expr::Number(1.0)));
    }

    #[test]
    fn test_long_operator_chain_is_bounded() {
        let sum = vec!["1"; 100_000].join("+");
        assert_eq!(error_message(&sum), "expression nested too deeply");
        assert!(parse(&vec!["1"; 100].join("+")).is_ok());
    }

    #[test]
    fn test_error_position() {
        assert!(matches!(
            parse("a b"),
            Err(XPathError::InvalidExpression { position: 2, .. })
        ));
    }
}
