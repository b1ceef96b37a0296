//! `XPath` 1.0 expression tokenizer.
//!
//! Scanning happens in two passes. The first pass splits the expression into
//! raw tokens where every name is a [`Token::Name`] and every `*` is a
//! [`Token::Star`]. The second pass applies the lexical disambiguation rules
//! of `XPath` 1.0 section 3.7:
//!
//! - after a token that can end an operand, `*` is multiplication and the
//!   names `and`, `or`, `mod`, `div` are operators;
//! - otherwise `*` is a wildcard name test;
//! - a name followed by `(` is a node type test or a function name;
//! - a name followed by `::` is an axis name.

use std::fmt;

use crate::parser::input::{is_name_char, is_name_start_char};

use super::types::XPathError;

/// Names that form node type tests when followed by `(`.
pub const NODE_TYPE_NAMES: &[&str] = &["comment", "text", "processing-instruction", "node"];

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    /// Multiplication. A wildcard name test is `Name("*")`.
    Star,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    Mod,
    Div,
    Number(f64),
    Literal(String),
    /// A name test: `name`, `prefix:name`, `prefix:*` or `*`.
    Name(String),
    /// `$name`, stored without the dollar sign.
    VariableReference(String),
    FunctionName(String),
    NodeType(String),
    AxisName(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::LeftParen => "(",
            Self::RightParen => ")",
            Self::LeftBracket => "[",
            Self::RightBracket => "]",
            Self::Dot => ".",
            Self::DotDot => "..",
            Self::At => "@",
            Self::Comma => ",",
            Self::ColonColon => "::",
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::Pipe => "|",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
            Self::And => "and",
            Self::Or => "or",
            Self::Mod => "mod",
            Self::Div => "div",
            Self::Number(n) => return write!(f, "{n}"),
            Self::Literal(s) => return write!(f, "\"{s}\""),
            Self::VariableReference(s) => return write!(f, "${s}"),
            Self::Name(s) | Self::FunctionName(s) | Self::NodeType(s) | Self::AxisName(s) => s,
        };
        f.write_str(text)
    }
}

/// A token with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

/// Tokenizes an expression.
///
/// # Errors
///
/// Returns [`XPathError::InvalidExpression`] for unterminated literals,
/// stray characters and malformed operators.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, XPathError> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        lexer.skip_whitespace();
        let Some(c) = lexer.peek() else { break };
        let pos = lexer.pos;
        let token = lexer.next_token(c)?;
        tokens.push(Spanned { token, pos });
    }
    disambiguate(&mut tokens);
    Ok(tokens)
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, skip: usize) -> Option<char> {
        self.rest().chars().nth(skip)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    /// Consumes `second` if it follows, returning which token applies.
    fn pair(&mut self, second: char, both: Token, single: Token) -> Token {
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            both
        } else {
            single
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\n' | '\r')) {
            self.bump();
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn next_token(&mut self, c: char) -> Result<Token, XPathError> {
        let start = self.pos;
        let single = |lexer: &mut Self, token| {
            lexer.bump();
            Ok(token)
        };
        match c {
            '(' => single(self, Token::LeftParen),
            ')' => single(self, Token::RightParen),
            '[' => single(self, Token::LeftBracket),
            ']' => single(self, Token::RightBracket),
            '@' => single(self, Token::At),
            ',' => single(self, Token::Comma),
            '|' => single(self, Token::Pipe),
            '+' => single(self, Token::Plus),
            '-' => single(self, Token::Minus),
            '=' => single(self, Token::Equal),
            '*' => single(self, Token::Star),
            '/' => Ok(self.pair('/', Token::DoubleSlash, Token::Slash)),
            '<' => Ok(self.pair('=', Token::LessThanEqual, Token::LessThan)),
            '>' => Ok(self.pair('=', Token::GreaterThanEqual, Token::GreaterThan)),
            '!' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(Token::NotEqual)
                } else {
                    Err(XPathError::syntax(start, "expected '=' after '!'"))
                }
            }
            ':' => {
                self.bump();
                if self.peek() == Some(':') {
                    self.bump();
                    Ok(Token::ColonColon)
                } else {
                    Err(XPathError::syntax(start, "unexpected ':'"))
                }
            }
            '.' => {
                if self.peek_at(1) == Some('.') {
                    self.bump();
                    self.bump();
                    Ok(Token::DotDot)
                } else if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.number()
                } else {
                    self.bump();
                    Ok(Token::Dot)
                }
            }
            '"' | '\'' => self.literal(c),
            '$' => {
                self.bump();
                if !self.peek().is_some_and(is_ncname_start) {
                    return Err(XPathError::syntax(start, "expected variable name after '$'"));
                }
                let name = self.qname();
                Ok(Token::VariableReference(name))
            }
            '0'..='9' => self.number(),
            _ if is_ncname_start(c) => Ok(Token::Name(self.qname())),
            _ => Err(XPathError::syntax(start, format!("unexpected character '{c}'"))),
        }
    }

    fn number(&mut self) -> Result<Token, XPathError> {
        let start = self.pos;
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| XPathError::syntax(start, format!("invalid number '{text}'")))
    }

    fn literal(&mut self, quote: char) -> Result<Token, XPathError> {
        let start = self.pos;
        self.bump();
        let body = self.eat_while(|c| c != quote).to_owned();
        if self.peek().is_none() {
            return Err(XPathError::syntax(start, "unterminated string literal"));
        }
        self.bump();
        Ok(Token::Literal(body))
    }

    /// Reads an `NCName`, then `:NCName` or `:*` if present. A `::` after the
    /// first part is left alone for the axis separator.
    fn qname(&mut self) -> String {
        let start = self.pos;
        self.eat_while(is_ncname_char);
        if self.peek() == Some(':') {
            match self.peek_at(1) {
                Some('*') => {
                    self.bump();
                    self.bump();
                }
                Some(c) if is_ncname_start(c) => {
                    self.bump();
                    self.eat_while(is_ncname_char);
                }
                _ => {}
            }
        }
        self.input[start..self.pos].to_owned()
    }
}

fn is_ncname_start(c: char) -> bool {
    c != ':' && is_name_start_char(c)
}

fn is_ncname_char(c: char) -> bool {
    c != ':' && is_name_char(c)
}

/// Whether a token can be the last token of an operand, which decides how
/// a following `*` or operator name is read.
fn ends_operand(token: &Token) -> bool {
    matches!(
        token,
        Token::RightParen
            | Token::RightBracket
            | Token::Dot
            | Token::DotDot
            | Token::Number(_)
            | Token::Literal(_)
            | Token::Name(_)
            | Token::VariableReference(_)
    )
}

fn disambiguate(tokens: &mut [Spanned]) {
    for i in 0..tokens.len() {
        let after_operand = i > 0 && ends_operand(&tokens[i - 1].token);
        let next = tokens.get(i + 1).map(|s| s.token.clone());
        let current = &mut tokens[i].token;
        match current {
            Token::Star if !after_operand => *current = Token::Name("*".to_owned()),
            Token::Name(name) if after_operand => {
                let op = match name.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "mod" => Token::Mod,
                    "div" => Token::Div,
                    _ => continue,
                };
                *current = op;
            }
            Token::Name(name) if *name != "*" => match next {
                Some(Token::LeftParen) => {
                    let name = std::mem::take(name);
                    *current = if NODE_TYPE_NAMES.contains(&name.as_str()) {
                        Token::NodeType(name)
                    } else {
                        Token::FunctionName(name)
                    };
                }
                Some(Token::ColonColon) => *current = Token::AxisName(std::mem::take(name)),
                _ => {}
            },
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    fn name(s: &str) -> Token {
        Token::Name(s.to_owned())
    }

    #[test]
    fn test_axis_and_name() {
        assert_eq!(
            tokens("child::p"),
            vec![Token::AxisName("child".to_owned()), Token::ColonColon, name("p")]
        );
    }

    #[test]
    fn test_triple_slash_splits_into_double_then_single() {
        assert_eq!(
            tokens("///bad"),
            vec![Token::DoubleSlash, Token::Slash, name("bad")]
        );
    }

    #[test]
    fn test_star_is_wildcard_or_multiply() {
        assert_eq!(tokens("*"), vec![name("*")]);
        assert_eq!(tokens("2 * 3"), vec![Token::Number(2.0), Token::Star, Token::Number(3.0)]);
        assert_eq!(tokens("a/*"), vec![name("a"), Token::Slash, name("*")]);
        assert_eq!(tokens("p:*"), vec![name("p:*")]);
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(
            tokens("div div div"),
            vec![name("div"), Token::Div, name("div")]
        );
        assert_eq!(tokens("a and b"), vec![name("a"), Token::And, name("b")]);
        assert_eq!(tokens("and"), vec![name("and")]);
    }

    #[test]
    fn test_function_and_node_type() {
        assert_eq!(
            tokens("count(text())"),
            vec![
                Token::FunctionName("count".to_owned()),
                Token::LeftParen,
                Token::NodeType("text".to_owned()),
                Token::LeftParen,
                Token::RightParen,
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn test_literals_numbers_and_variables() {
        assert_eq!(
            tokens(r#"'it''s' "x" .5 10. $v:w"#),
            vec![
                Token::Literal("it".to_owned()),
                Token::Literal("s".to_owned()),
                Token::Literal("x".to_owned()),
                Token::Number(0.5),
                Token::Number(10.0),
                Token::VariableReference("v:w".to_owned()),
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            tokens("a<=b!=c>d"),
            vec![
                name("a"),
                Token::LessThanEqual,
                name("b"),
                Token::NotEqual,
                name("c"),
                Token::GreaterThan,
                name("d"),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let spans = tokenize("a  | b").unwrap();
        let positions: Vec<usize> = spans.iter().map(|s| s.pos).collect();
        assert_eq!(positions, vec![0, 3, 5]);
    }

    #[test]
    fn test_unicode_names() {
        assert_eq!(tokens("//caf\u{e9}"), vec![Token::DoubleSlash, name("caf\u{e9}")]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            tokenize("'open"),
            Err(XPathError::InvalidExpression { position: 0, .. })
        ));
        assert!(tokenize("a ! b").is_err());
        assert!(tokenize("#").is_err());
        assert!(tokenize("$1").is_err());
    }
}
