//! Text written to the output panel for each user action.
//!
//! ```text
//! Validating: /tmp/a.xml
//! XML is NOT valid!
//! Error on line: 1 -- mismatched end tag: expected </b>, found </a>
//! ```
//!
//! A passing verdict has no trailing newline; a failing one is followed by
//! one `Error on line:` line per entry.

use std::fmt::Write;

use crate::error::{ErrorEntry, Outcome};
use crate::tools::ParsedTree;

/// Report for the "Validate XML" action.
#[must_use]
pub fn validation_report(display_name: &str, xml: &Outcome<ParsedTree>) -> String {
    let mut buf = header(display_name);
    write_verdict(&mut buf, "XML", xml.errors());
    buf
}

/// Report for the "Validate RelaxNG" action.
///
/// `schema` is `None` when the document was not well-formed, in which case
/// the XML errors are shown instead.
#[must_use]
pub fn relaxng_report<T>(
    display_name: &str,
    xml: &Outcome<ParsedTree>,
    schema: Option<&Outcome<T>>,
) -> String {
    verdict_report(display_name, "RelaxNG", xml, schema)
}

/// Report for validating an instance document against a schema.
#[must_use]
pub fn instance_report<T>(
    display_name: &str,
    xml: &Outcome<ParsedTree>,
    validity: Option<&Outcome<T>>,
) -> String {
    verdict_report(display_name, "Document", xml, validity)
}

/// Report for an `XPath` query. `result` is `None` when the document was
/// not well-formed.
#[must_use]
pub fn xpath_report(xml: &Outcome<ParsedTree>, result: Option<&str>) -> String {
    let mut buf = String::from("XPath result:\n");
    match (xml, result) {
        (Outcome::Errors(errors), _) => write_verdict(&mut buf, "XML", errors),
        (Outcome::Success(_), Some(text)) => buf.push_str(text),
        (Outcome::Success(_), None) => {}
    }
    buf
}

fn verdict_report<T>(
    display_name: &str,
    subject: &str,
    xml: &Outcome<ParsedTree>,
    outcome: Option<&Outcome<T>>,
) -> String {
    let mut buf = header(display_name);
    match (xml, outcome) {
        (Outcome::Errors(errors), _) => write_verdict(&mut buf, "XML", errors),
        (Outcome::Success(_), Some(outcome)) => write_verdict(&mut buf, subject, outcome.errors()),
        (Outcome::Success(_), None) => {}
    }
    buf
}

fn header(display_name: &str) -> String {
    format!("Validating: {display_name}\n")
}

fn write_verdict(buf: &mut String, subject: &str, errors: &[ErrorEntry]) {
    if errors.is_empty() {
        let _ = write!(buf, "{subject} is valid!");
        return;
    }
    let _ = writeln!(buf, "{subject} is NOT valid!");
    for entry in errors {
        let _ = writeln!(buf, "Error on line: {} -- {}", entry.line, entry.message);
    }
}
