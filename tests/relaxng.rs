//! Schema compilation and instance validation through the tools boundary.

use pretty_assertions::assert_eq;
use xmltools::report;
use xmltools::tools::{self, ParsedTree, SchemaHandle};
use xmltools::ErrorEntry;

const ARTICLE: &str = r#"<?xml version="1.0"?>
<grammar xmlns="http://relaxng.org/ns/structure/1.0"
         datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes">
  <start>
    <ref name="article"/>
  </start>

  <define name="article">
    <element name="article">
      <attribute name="lang"><data type="language"/></attribute>
      <element name="title"><text/></element>
      <oneOrMore>
        <ref name="para"/>
      </oneOrMore>
    </element>
  </define>

  <define name="para">
    <element name="para">
      <optional>
        <attribute name="align">
          <choice>
            <value>left</value>
            <value>right</value>
          </choice>
        </attribute>
      </optional>
      <mixed>
        <zeroOrMore><element name="em"><text/></element></zeroOrMore>
      </mixed>
    </element>
  </define>
</grammar>
"#;

fn tree(text: &str) -> ParsedTree {
    tools::validate(text).into_result().unwrap()
}

fn article_schema() -> SchemaHandle {
    tools::compile_schema(&tree(ARTICLE)).into_result().unwrap()
}

#[test]
fn test_schema_compiles() {
    let schema = article_schema();
    let names: Vec<&str> = schema
        .schema()
        .defines()
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(names, vec!["start", "article", "para"]);
}

#[test]
fn test_valid_instance() {
    let schema = article_schema();
    let instance = tree(
        r#"<article lang="en-GB">
  <title>Notes</title>
  <para>Plain.</para>
  <para align="right">With <em>emphasis</em> inside.</para>
</article>"#,
    );
    let outcome = schema.validate(&instance);
    assert!(outcome.is_success(), "{:?}", outcome.errors());
}

#[test]
fn test_instance_errors_carry_element_lines() {
    let schema = article_schema();
    let instance = tree(
        "<article lang=\"en\">\n\
         <title>Notes</title>\n\
         <para align=\"center\">x</para>\n\
         <para><strong>y</strong></para>\n\
         </article>",
    );
    assert_eq!(
        schema.validate(&instance).errors(),
        &[
            ErrorEntry::new(3, "invalid value 'center' for attribute 'align' of element 'para'"),
            ErrorEntry::new(4, "unexpected element 'strong', expected 'em'"),
        ]
    );
}

#[test]
fn test_missing_content() {
    let schema = article_schema();
    let instance = tree("<article lang=\"en\">\n<title>Notes</title>\n</article>");
    assert_eq!(
        schema.validate(&instance).errors(),
        &[ErrorEntry::new(1, "element 'article' is incomplete, expected 'para'")]
    );
}

#[test]
fn test_compile_errors_carry_schema_lines() {
    let schema = tree(
        "<grammar xmlns=\"http://relaxng.org/ns/structure/1.0\">\n\
         <start>\n\
         <element name=\"doc\"><ref name=\"body\"/></element>\n\
         </start>\n\
         </grammar>",
    );
    assert_eq!(
        tools::compile_schema(&schema).errors(),
        &[ErrorEntry::new(3, "reference to undefined pattern 'body'")]
    );
}

#[test]
fn test_every_compile_error_is_reported() {
    let schema = tree(
        "<element name=\"a\" xmlns=\"http://relaxng.org/ns/structure/1.0\">\n\
         <ref name=\"x\"/>\n\
         <unknownThing/>\n\
         </element>",
    );
    let errors = tools::compile_schema(&schema).into_result().unwrap_err();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors.contains(&ErrorEntry::new(2, "reference to undefined pattern 'x'")));
    assert!(errors.contains(&ErrorEntry::new(3, "unknown RelaxNG pattern <unknownThing>")));
}

/// Compiles `body` as the content of a single element, one line per line.
fn restriction_errors(body: &str) -> Vec<ErrorEntry> {
    let schema = tree(&format!(
        "<element name=\"a\" xmlns=\"http://relaxng.org/ns/structure/1.0\">\n{body}\n</element>"
    ));
    tools::compile_schema(&schema).into_result().unwrap_err()
}

#[test]
fn test_attribute_inside_attribute_rejected() {
    assert_eq!(
        restriction_errors("<attribute name=\"x\">\n<attribute name=\"y\"/>\n</attribute>"),
        vec![ErrorEntry::new(3, "<attribute> not allowed inside <attribute>")]
    );
}

#[test]
fn test_element_inside_attribute_rejected() {
    assert_eq!(
        restriction_errors(
            "<attribute name=\"x\">\n<element name=\"b\"><empty/></element>\n</attribute>"
        ),
        vec![ErrorEntry::new(3, "<element> not allowed inside <attribute>")]
    );
}

#[test]
fn test_element_inside_list_rejected() {
    assert_eq!(
        restriction_errors("<list>\n<element name=\"b\"><empty/></element>\n</list>"),
        vec![ErrorEntry::new(3, "<element> not allowed inside <list>")]
    );
}

#[test]
fn test_duplicate_attribute_in_group_rejected() {
    assert_eq!(
        restriction_errors(
            "<group>\n<attribute name=\"x\"/>\n<attribute name=\"x\"/>\n</group>"
        ),
        vec![ErrorEntry::new(4, "duplicate attribute 'x'")]
    );
}

#[test]
fn test_text_in_both_interleave_operands_rejected() {
    assert_eq!(
        restriction_errors("<interleave>\n<text/>\n<text/>\n</interleave>"),
        vec![ErrorEntry::new(4, "text in both operands of <interleave>")]
    );
}

#[test]
fn test_reports() {
    let xml = tools::validate(ARTICLE);
    let compiled = xml.success().map(tools::compile_schema);
    assert_eq!(
        report::relaxng_report("article.rng", &xml, compiled.as_ref()),
        "Validating: article.rng\nRelaxNG is valid!"
    );

    let broken = tools::validate("<grammar xmlns=\"http://relaxng.org/ns/structure/1.0\">\n<start/>");
    let compiled = broken.success().map(tools::compile_schema);
    let text = report::relaxng_report("broken.rng", &broken, compiled.as_ref());
    assert!(
        text.starts_with("Validating: broken.rng\nXML is NOT valid!\nError on line: 2 -- "),
        "{text}"
    );
}
