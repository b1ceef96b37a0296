//! Low-level input handling for the XML parser.
//!
//! [`ParserInput`] owns the cursor over the source text, position tracking
//! (line, column, byte offset), nesting depth, and accumulated diagnostics,
//! along with the lexical primitives shared by the grammar productions:
//! peeking, advancing, names, references, and quoted values.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{ErrorSeverity, ParseDiagnostic, ParseError, ParseErrorKind, SourceLocation};

use super::ParseOptions;

// -------------------------------------------------------------------------
// Resource defaults
// -------------------------------------------------------------------------

/// Default maximum element nesting depth.
pub(crate) const DEFAULT_MAX_DEPTH: u32 = 256;

/// Default maximum number of attributes on a single element.
pub(crate) const DEFAULT_MAX_ATTRIBUTES: usize = 256;

/// Default maximum length (in bytes) of a text node.
pub(crate) const DEFAULT_MAX_TEXT_LENGTH: usize = 10 * 1024 * 1024;

/// Default maximum length (in bytes) of an element or attribute name.
pub(crate) const DEFAULT_MAX_NAME_LENGTH: usize = 50_000;

/// Maximum number of entity expansions in one document.
pub(crate) const MAX_ENTITY_EXPANSIONS: u32 = 10_000;

// -------------------------------------------------------------------------
// Character classes (XML 1.0 §2.2, §2.3)
// -------------------------------------------------------------------------

/// Returns `true` if `c` is a valid `Char` per XML 1.0 §2.2 `[2]`.
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x0001_0000..=0x0010_FFFF
    )
}

/// Returns `true` if `c` is a valid `NameStartChar` per XML 1.0 §2.3 `[4]`.
pub(crate) fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// Returns `true` if `c` is a valid `NameChar` per XML 1.0 §2.3 `[4a]`.
pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// Returns `true` for XML whitespace (`S`, §2.3 `[3]`).
pub(crate) fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Splits a qualified name into optional prefix and local part.
pub(crate) fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Checks the `QName` production of Namespaces in XML 1.0 §4.
pub(crate) fn validate_qname(name: &str) -> Option<&'static str> {
    match name.matches(':').count() {
        0 => None,
        1 if name.starts_with(':') || name.ends_with(':') => {
            Some("QName has empty prefix or local part")
        }
        1 => None,
        _ => Some("QName contains multiple colons"),
    }
}

/// Normalizes line endings per XML 1.0 §2.11 (`\r\n` and lone `\r` become `\n`).
pub(crate) fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
}

// -------------------------------------------------------------------------
// ParserInput
// -------------------------------------------------------------------------

/// Cursor, position, limits, and diagnostics for one parse.
pub(crate) struct ParserInput<'a> {
    input: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    depth: u32,
    max_depth: u32,
    max_name_length: usize,
    recover: bool,
    diagnostics: Vec<ParseDiagnostic>,
    /// General entities from the internal subset. `None` marks an external
    /// entity, which is never loaded.
    entities: HashMap<String, Option<String>>,
    /// Set when an external subset or parameter entity reference may have
    /// declared entities this parser never sees.
    undeclared_entities_allowed: bool,
    expansions: u32,
    expanding: Vec<String>,
}

impl<'a> ParserInput<'a> {
    pub(crate) fn new(input: &'a str, options: &ParseOptions) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            max_depth: options.max_depth,
            max_name_length: options.max_name_length,
            recover: options.recover,
            diagnostics: Vec::new(),
            entities: HashMap::new(),
            undeclared_entities_allowed: false,
            expansions: 0,
            expanding: Vec::new(),
        }
    }

    // --- Position ---

    pub(crate) fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            byte_offset: self.pos,
        }
    }

    pub(crate) fn line(&self) -> u32 {
        self.line
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Returns the unread remainder of the input.
    pub(crate) fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Returns the input between `start` and the current position.
    pub(crate) fn slice_from(&self, start: usize) -> &'a str {
        &self.input[start..self.pos]
    }

    // --- Peeking ---

    pub(crate) fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    pub(crate) fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn looking_at(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    // --- Advancing ---

    /// Advances over `n` bytes, which must end on a character boundary.
    pub(crate) fn advance(&mut self, n: usize) {
        let end = (self.pos + n).min(self.input.len());
        for c in self.input[self.pos..end].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos = end;
    }

    /// Consumes one character, rejecting characters outside the `Char`
    /// production.
    pub(crate) fn next_char(&mut self) -> Result<char, ParseError> {
        let Some(c) = self.peek_char() else {
            return Err(self.fatal("unexpected end of input"));
        };
        if !is_xml_char(c) {
            return Err(self.fatal(format!("invalid XML character U+{:04X}", c as u32)));
        }
        self.advance(c.len_utf8());
        Ok(c)
    }

    pub(crate) fn expect_byte(&mut self, expected: u8) -> Result<(), ParseError> {
        match self.peek() {
            Some(b) if b == expected => {
                self.advance(1);
                Ok(())
            }
            Some(_) => {
                let found = self.peek_char().unwrap_or('?');
                Err(self.fatal(format!(
                    "expected '{}', found '{found}'",
                    char::from(expected)
                )))
            }
            None => Err(self.fatal(format!(
                "expected '{}', found end of input",
                char::from(expected)
            ))),
        }
    }

    pub(crate) fn expect_str(&mut self, expected: &str) -> Result<(), ParseError> {
        if self.looking_at(expected) {
            self.advance(expected.len());
            Ok(())
        } else {
            Err(self.fatal(format!("expected '{expected}'")))
        }
    }

    /// Skips whitespace; returns `true` if any was consumed.
    pub(crate) fn skip_whitespace(&mut self) -> bool {
        let skipped = self
            .rest()
            .bytes()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
            .count();
        self.advance(skipped);
        skipped > 0
    }

    pub(crate) fn skip_whitespace_required(&mut self) -> Result<(), ParseError> {
        if self.skip_whitespace() {
            Ok(())
        } else {
            Err(self.fatal("whitespace required"))
        }
    }

    /// Consumes input up to (not including) `delimiter` and returns it.
    ///
    /// Every consumed character must be a legal XML `Char`.
    pub(crate) fn take_until(&mut self, delimiter: &str, what: &str) -> Result<&'a str, ParseError> {
        let Some(len) = self.rest().find(delimiter) else {
            return Err(self.fatal(format!("unterminated {what}")));
        };
        let text = &self.input[self.pos..self.pos + len];
        if let Some(bad) = text.chars().find(|&c| !is_xml_char(c)) {
            return Err(self.fatal(format!(
                "invalid XML character U+{:04X} in {what}",
                bad as u32
            )));
        }
        self.advance(len);
        Ok(text)
    }

    // --- Names and references ---

    /// Parses a `Name` (§2.3 `[5]`).
    pub(crate) fn parse_name(&mut self) -> Result<String, ParseError> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            Some((_, c)) => return Err(self.fatal(format!("expected name, found '{c}'"))),
            None => return Err(self.fatal("expected name, found end of input")),
        }
        let len = chars
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        if len > self.max_name_length {
            return Err(self.limit(format!(
                "name exceeds maximum length of {} bytes",
                self.max_name_length
            )));
        }
        let name = rest[..len].to_string();
        self.advance(len);
        Ok(name)
    }

    /// Parses a reference after the leading `&` and returns its expansion.
    ///
    /// Character references, the five predefined entities and entities
    /// declared in the internal subset are expanded. An undeclared entity is
    /// an error unless [`allow_undeclared_entities`](Self::allow_undeclared_entities)
    /// was called, in which case it expands to nothing with a warning.
    pub(crate) fn parse_reference(&mut self) -> Result<String, ParseError> {
        if self.peek() == Some(b'#') {
            self.advance(1);
            let radix = if self.peek() == Some(b'x') {
                self.advance(1);
                16
            } else {
                10
            };
            let digits_start = self.pos;
            let digits = self
                .rest()
                .bytes()
                .take_while(u8::is_ascii_alphanumeric)
                .count();
            self.advance(digits);
            let text = &self.input[digits_start..self.pos];
            self.expect_byte(b';')?;
            return self.char_reference(text, radix).map(String::from);
        }

        let name = self.parse_name()?;
        self.expect_byte(b';')?;
        self.resolve_entity(&name)
    }

    /// Records a general entity. The first declaration of a name is binding.
    pub(crate) fn declare_entity(&mut self, name: String, value: Option<String>) {
        self.entities.entry(name).or_insert(value);
    }

    /// WFC: Entity Declared only applies to documents whose declarations
    /// were all read.
    pub(crate) fn allow_undeclared_entities(&mut self) {
        self.undeclared_entities_allowed = true;
    }

    fn char_reference(&self, digits: &str, radix: u32) -> Result<char, ParseError> {
        u32::from_str_radix(digits, radix)
            .ok()
            .and_then(char::from_u32)
            .filter(|&c| is_xml_char(c))
            .ok_or_else(|| {
                let marker = if radix == 16 { "x" } else { "" };
                self.fatal(format!("invalid character reference &#{marker}{digits};"))
            })
    }

    fn resolve_entity(&mut self, name: &str) -> Result<String, ParseError> {
        let predefined = match name {
            "amp" => Some("&"),
            "lt" => Some("<"),
            "gt" => Some(">"),
            "apos" => Some("'"),
            "quot" => Some("\""),
            _ => None,
        };
        if let Some(text) = predefined {
            return Ok(text.to_owned());
        }
        match self.entities.get(name).cloned() {
            Some(Some(value)) => self.expand_entity(name, &value),
            Some(None) => {
                self.warning(format!("external entity '{name}' not loaded"));
                Ok(String::new())
            }
            None if self.undeclared_entities_allowed => {
                self.warning(format!("entity '{name}' not declared in the internal subset"));
                Ok(String::new())
            }
            None => {
                self.recoverable(format!("entity '{name}' not defined"))?;
                Ok(String::new())
            }
        }
    }

    /// Expands the replacement text of `name`, resolving the references it
    /// contains. Markup in replacement text is kept as character data.
    fn expand_entity(&mut self, name: &str, value: &str) -> Result<String, ParseError> {
        self.expansions += 1;
        if self.expansions > MAX_ENTITY_EXPANSIONS {
            return Err(self.limit(format!(
                "maximum of {MAX_ENTITY_EXPANSIONS} entity expansions exceeded"
            )));
        }
        if self.expanding.iter().any(|open| open == name) {
            return Err(self.fatal(format!("entity '{name}' references itself")));
        }
        self.expanding.push(name.to_owned());

        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            let Some(semi) = after.find(';') else {
                return Err(self.fatal(format!(
                    "unterminated reference in replacement text of entity '{name}'"
                )));
            };
            let reference = &after[..semi];
            if let Some(hex) = reference.strip_prefix("#x") {
                out.push(self.char_reference(hex, 16)?);
            } else if let Some(dec) = reference.strip_prefix('#') {
                out.push(self.char_reference(dec, 10)?);
            } else {
                out.push_str(&self.resolve_entity(reference)?);
            }
            rest = &after[semi + 1..];
        }
        out.push_str(rest);

        self.expanding.pop();
        Ok(out)
    }

    /// Parses a quoted attribute value (§3.3.3), expanding references and
    /// normalizing whitespace characters to spaces.
    pub(crate) fn parse_attribute_value(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.fatal("attribute value must be quoted")),
        };
        self.advance(1);
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.fatal("unterminated attribute value")),
                Some(b) if b == quote => {
                    self.advance(1);
                    return Ok(value);
                }
                Some(b'<') => return Err(self.fatal("'<' not allowed in attribute value")),
                Some(b'&') => {
                    self.advance(1);
                    value.push_str(&self.parse_reference()?);
                }
                Some(_) => {
                    let c = self.next_char()?;
                    value.push(if is_xml_whitespace(c) { ' ' } else { c });
                }
            }
        }
    }

    /// Parses a quoted literal with no reference expansion (pseudo-attribute
    /// values, system and public ids).
    pub(crate) fn parse_quoted_value(&mut self) -> Result<&'a str, ParseError> {
        let quote = match self.peek() {
            Some(b'"') => "\"",
            Some(b'\'') => "'",
            _ => return Err(self.fatal("expected quoted value")),
        };
        self.advance(1);
        let value = self.take_until(quote, "quoted value")?;
        self.advance(1);
        Ok(value)
    }

    // --- Depth ---

    pub(crate) fn enter_element(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.limit(format!(
                "maximum nesting depth of {} exceeded",
                self.max_depth
            )));
        }
        Ok(())
    }

    pub(crate) fn leave_element(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // --- Diagnostics ---

    /// Builds a fatal syntax error at the current position, carrying all
    /// diagnostics collected so far.
    pub(crate) fn fatal(&self, message: impl Into<String>) -> ParseError {
        self.error_of_kind(ParseErrorKind::Syntax, message.into())
    }

    /// Builds a resource-limit error at the current position.
    pub(crate) fn limit(&self, message: impl Into<String>) -> ParseError {
        self.error_of_kind(ParseErrorKind::Limit, message.into())
    }

    fn error_of_kind(&self, kind: ParseErrorKind, message: String) -> ParseError {
        ParseError {
            kind,
            message,
            location: self.location(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Reports an error the parser can continue past: in recovery mode it is
    /// recorded and parsing goes on, otherwise it is fatal.
    pub(crate) fn recoverable(&mut self, message: impl Into<String>) -> Result<(), ParseError> {
        let message = message.into();
        if self.recover {
            self.push_diagnostic(ErrorSeverity::Error, message);
            Ok(())
        } else {
            Err(self.fatal(message))
        }
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.push_diagnostic(ErrorSeverity::Warning, message.into());
    }

    fn push_diagnostic(&mut self, severity: ErrorSeverity, message: String) {
        self.diagnostics.push(ParseDiagnostic {
            severity,
            message,
            location: self.location(),
        });
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<ParseDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input(s: &str) -> ParserInput<'_> {
        ParserInput::new(s, &ParseOptions::default())
    }

    #[test]
    fn test_advance_tracks_lines_and_columns() {
        let mut inp = input("ab\ncd");
        inp.advance(4);
        assert_eq!(inp.location().line, 2);
        assert_eq!(inp.location().column, 2);
        assert_eq!(inp.location().byte_offset, 4);
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\n"), "a\nb\nc\n");
        assert!(matches!(normalize_newlines("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_parse_name_stops_at_non_name_char() {
        let mut inp = input("svg:rect width");
        assert_eq!(inp.parse_name().unwrap(), "svg:rect");
        assert_eq!(inp.peek(), Some(b' '));
    }

    #[test]
    fn test_parse_name_rejects_digit_start() {
        let err = input("1abc").parse_name().unwrap_err();
        assert_eq!(err.message, "expected name, found '1'");
    }

    #[test]
    fn test_parse_name_length_limit() {
        let opts = ParseOptions::default().max_name_length(3);
        let mut inp = ParserInput::new("abcd", &opts);
        let err = inp.parse_name().unwrap_err();
        assert!(err.is_limit());
    }

    #[test]
    fn test_parse_reference_variants() {
        assert_eq!(input("amp;").parse_reference().unwrap(), "&");
        assert_eq!(input("#65;").parse_reference().unwrap(), "A");
        assert_eq!(input("#x263A;").parse_reference().unwrap(), "\u{263A}");
        assert!(input("#0;").parse_reference().is_err());
        let err = input("nbsp;").parse_reference().unwrap_err();
        assert_eq!(err.message, "entity 'nbsp' not defined");
    }

    #[test]
    fn test_declared_entities_expand_recursively() {
        let mut inp = input("outer;");
        inp.declare_entity("inner".to_owned(), Some("&#65;&amp;".to_owned()));
        inp.declare_entity("outer".to_owned(), Some("[&inner;]".to_owned()));
        inp.declare_entity("outer".to_owned(), Some("ignored".to_owned()));
        assert_eq!(inp.parse_reference().unwrap(), "[A&]");
    }

    #[test]
    fn test_self_referencing_entity() {
        let mut inp = input("a;");
        inp.declare_entity("a".to_owned(), Some("x&b;".to_owned()));
        inp.declare_entity("b".to_owned(), Some("&a;".to_owned()));
        let err = inp.parse_reference().unwrap_err();
        assert_eq!(err.message, "entity 'a' references itself");
    }

    #[test]
    fn test_entity_expansion_limit() {
        let mut inp = input("e9;");
        inp.declare_entity("e0".to_owned(), Some("lol".to_owned()));
        for level in 1..10 {
            let below = format!("&e{};", level - 1);
            inp.declare_entity(format!("e{level}"), Some(below.repeat(10)));
        }
        let err = inp.parse_reference().unwrap_err();
        assert!(err.is_limit(), "{err:?}");
    }

    #[test]
    fn test_undeclared_entity_allowed_with_external_declarations() {
        let mut inp = input("nbsp;");
        inp.allow_undeclared_entities();
        assert_eq!(inp.parse_reference().unwrap(), "");
        let diagnostics = inp.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, ErrorSeverity::Warning);
    }

    #[test]
    fn test_attribute_value_normalizes_whitespace() {
        let mut inp = input("\"a\tb\nc &lt; d\"");
        assert_eq!(inp.parse_attribute_value().unwrap(), "a b c < d");
    }

    #[test]
    fn test_attribute_value_rejects_lt() {
        let err = input("'a<b'").parse_attribute_value().unwrap_err();
        assert_eq!(err.message, "'<' not allowed in attribute value");
    }

    #[test]
    fn test_recoverable_records_in_recovery_mode() {
        let opts = ParseOptions::default().recover(true);
        let mut inp = ParserInput::new("", &opts);
        inp.recoverable("first").unwrap();
        let diags = inp.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, ErrorSeverity::Error);
    }

    #[test]
    fn test_qname_validation() {
        assert_eq!(validate_qname("a:b"), None);
        assert_eq!(validate_qname("a:b:c"), Some("QName contains multiple colons"));
        assert_eq!(validate_qname(":b"), Some("QName has empty prefix or local part"));
    }
}
