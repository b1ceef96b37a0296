//! End-to-end behavior of the three tool operations.

use pretty_assertions::assert_eq;
use xmltools::parser::ParseOptions;
use xmltools::tools::{self, XPATH_ERROR_PREFIX};
use xmltools::{ErrorEntry, Outcome};

const WELL_FORMED: &[&str] = &[
    "<a/>",
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a/>",
    "<!DOCTYPE a [<!ELEMENT a EMPTY>]><a/>",
    "<a><![CDATA[<not-markup>]]></a>",
    "<a xmlns:p=\"urn:p\"><p:b p:c=\"1\"/></a>",
    "<a>&lt;&#65;&#x42;&amp;</a>",
    "<!-- lead --><a>\r\n  <b>text</b>\r\n</a><?trail?>",
    "<!DOCTYPE a [<!ENTITY e 'x'>]><a>&e;</a>",
    "<!DOCTYPE a SYSTEM \"x.dtd\"><a>&nbsp;</a>",
];

const MALFORMED: &[&str] = &[
    "",
    "just text",
    "<a>",
    "<a></b>",
    "<a b=1/>",
    "<a/><b/>",
    "<a><!-- x -- y --></a>",
    "<a>]]></a>",
    "<a x='1' x='2'/>",
    "<p:a/>",
    "<a>&nbsp;</a>",
    "<!DOCTYPE a [<!ENTITY e '&e;'>]><a>&e;</a>",
];

#[test]
fn test_well_formed_documents_succeed() {
    for text in WELL_FORMED {
        let outcome = tools::validate(text);
        assert!(outcome.is_success(), "{text:?}: {:?}", outcome.errors());
    }
}

#[test]
fn test_malformed_documents_report_errors() {
    for text in MALFORMED {
        let outcome = tools::validate(text);
        assert!(!outcome.errors().is_empty(), "{text:?} was accepted");
        assert!(outcome.success().is_none());
    }
}

#[test]
fn test_validate_is_idempotent() {
    for text in WELL_FORMED.iter().chain(MALFORMED) {
        let first = tools::validate(text);
        let second = tools::validate(text);
        assert_eq!(first.errors(), second.errors(), "{text:?}");
        assert_eq!(first.is_success(), second.is_success());
    }
}

#[test]
fn test_nested_document_root() {
    let tree = tools::validate("<a><b/></a>").into_result().unwrap();
    let doc = tree.document();
    let root = tree.root_element().unwrap();
    assert_eq!(doc.node_name(root), Some("a"));
    let children: Vec<_> = doc.children(root).collect();
    assert_eq!(children.len(), 1);
    assert_eq!(doc.node_name(children[0]), Some("b"));
}

#[test]
fn test_mismatched_tag_single_error() {
    let Outcome::Errors(errors) = tools::validate("<a><b></a>") else {
        panic!("mismatched tags were accepted");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 1);
    assert!(errors[0].message.contains("mismatched"), "{}", errors[0].message);
}

#[test]
fn test_error_lines_follow_input() {
    let errors = tools::validate("<a>\n\n<b>\n</c>\n</a>").into_result().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 4);
}

#[test]
fn test_recover_reports_every_error() {
    let options = ParseOptions::default().recover(true);
    let strict = tools::validate("<a x='1' x='2'>\n<!-- x -- y --></a>");
    let recovered =
        tools::validate_with_options("<a x='1' x='2'>\n<!-- x -- y --></a>", &options);
    assert_eq!(strict.errors().len(), 1);
    assert_eq!(
        recovered.errors(),
        &[
            ErrorEntry::new(1, "attribute 'x' redefined"),
            ErrorEntry::new(2, "'--' not allowed in comments"),
        ]
    );
}

#[test]
fn test_depth_limit_is_unknown_error() {
    let options = ParseOptions::default().max_depth(3);
    let deep = "<a><b><c><d/></c></b></a>";
    let errors = tools::validate_with_options(deep, &options).into_result().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 0);
    assert!(errors[0].message.starts_with("unknown error "), "{}", errors[0].message);
    assert!(tools::validate(deep).is_success());
}

#[test]
fn test_internal_subset_entities() {
    let tree = tools::validate("<!DOCTYPE a [<!ENTITY e 'x'>]><a>&e;</a>")
        .into_result()
        .unwrap();
    let root = tree.root_element().unwrap();
    assert_eq!(tree.document().text_content(root), "x");
    assert_eq!(tools::evaluate(&tree, "string(/a)"), "x\n");
}

#[test]
fn test_external_subset_allows_undeclared_entities() {
    assert!(tools::validate("<!DOCTYPE a SYSTEM \"x.dtd\"><a>&nbsp;</a>").is_success());
    assert_eq!(
        tools::validate("<a>&nbsp;</a>").errors(),
        &[ErrorEntry::new(1, "entity 'nbsp' not defined")]
    );
}

#[test]
fn test_invalid_utf8_is_unknown_error() {
    let errors = tools::validate_bytes(b"<a>caf\xe9</a>").into_result().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_unknown());
    assert!(tools::validate_bytes("<a>café</a>".as_bytes()).is_success());
}

#[test]
fn test_evaluate_child_elements() {
    let tree = tools::validate("<a><b/><c/></a>").into_result().unwrap();
    assert_eq!(tools::evaluate(&tree, "/a/*"), "<b/>\n<c/>\n");
}

#[test]
fn test_evaluate_empty_match() {
    let tree = tools::validate("<a><b/></a>").into_result().unwrap();
    assert_eq!(tools::evaluate(&tree, "/a/z"), "");
    assert_eq!(tools::evaluate(&tree, "//@missing"), "");
}

#[test]
fn test_evaluate_syntax_error() {
    let tree = tools::validate("<a/>").into_result().unwrap();
    for expression in ["///bad", "", "a[", "1 +", "foo(", "@"] {
        let out = tools::evaluate(&tree, expression);
        assert!(out.starts_with(XPATH_ERROR_PREFIX), "{expression:?}: {out}");
        assert!(out.ends_with('\n'));
        assert_eq!(out.matches('\n').count(), 1, "{out}");
    }
}

#[test]
fn test_evaluate_deeply_nested_expression() {
    let tree = tools::validate("<a/>").into_result().unwrap();
    let unbalanced = "(".repeat(10_000);
    let balanced = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
    for expression in [&unbalanced, &balanced] {
        assert_eq!(
            tools::evaluate(&tree, expression),
            "XPath syntax error: expression nested too deeply\n"
        );
    }
    let modest = format!("{}1{}", "(".repeat(20), ")".repeat(20));
    assert_eq!(tools::evaluate(&tree, &modest), "1\n");
}

#[test]
fn test_cdata_and_text_form_one_text_node() {
    let tree = tools::validate("<a>x<![CDATA[y]]>z</a>").into_result().unwrap();
    assert_eq!(tools::evaluate(&tree, "count(text())"), "1\n");
    assert_eq!(tools::evaluate(&tree, "text()"), "xyz\n");
    assert_eq!(tools::evaluate(&tree, "string(text()[1])"), "xyz\n");
}

#[test]
fn test_evaluate_runtime_errors() {
    let tree = tools::validate("<a/>").into_result().unwrap();
    for expression in ["$undefined", "nosuchfunction()", "x:y"] {
        let out = tools::evaluate(&tree, expression);
        assert!(out.starts_with(XPATH_ERROR_PREFIX), "{expression:?}: {out}");
    }
}

#[test]
fn test_evaluate_keeps_namespace_declarations() {
    let tree = tools::validate(r#"<a xmlns:p="urn:p"><p:b>t</p:b></a>"#)
        .into_result()
        .unwrap();
    assert_eq!(
        tools::evaluate(&tree, "//p:b"),
        "<p:b xmlns:p=\"urn:p\">t</p:b>\n"
    );
}

#[test]
fn test_evaluate_document_order() {
    let tree = tools::validate("<r><x n=\"1\"/><y/><x n=\"2\"/></r>")
        .into_result()
        .unwrap();
    assert_eq!(
        tools::evaluate(&tree, "//x[@n='2'] | //y | //x[@n='1']"),
        "<x n=\"1\"/>\n<y/>\n<x n=\"2\"/>\n"
    );
    assert_eq!(tools::evaluate(&tree, "x/@n"), "n=\"1\"\nn=\"2\"\n");
}

#[test]
fn test_relaxng_schema_compiles() {
    let schema = tools::validate(
        r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
  <start>
    <element name="a"><zeroOrMore><element name="b"><text/></element></zeroOrMore></element>
  </start>
</grammar>"#,
    )
    .into_result()
    .unwrap();
    assert!(tools::compile_schema(&schema).is_success());
}

#[test]
fn test_non_schema_fails_to_compile() {
    let tree = tools::validate("<html><body/></html>").into_result().unwrap();
    let errors = tools::compile_schema(&tree).into_result().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 1);
}
