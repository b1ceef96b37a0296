//! Window registry lifecycle with an in-memory editor.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use xmltools::host::{
    ActiveDocument, DocumentSource, HelperRegistry, HostError, OutputPanel, WindowId,
};

#[derive(Default)]
struct Editor {
    documents: HashMap<WindowId, ActiveDocument>,
}

impl Editor {
    fn open(&mut self, window: WindowId, name: &str, text: &str) {
        self.documents.insert(
            window,
            ActiveDocument {
                display_name: name.to_owned(),
                text: text.to_owned(),
            },
        );
    }

    fn close(&mut self, window: WindowId) {
        self.documents.remove(&window);
    }
}

impl DocumentSource for Editor {
    fn active_document(&self, window: WindowId) -> Option<ActiveDocument> {
        self.documents.get(&window).cloned()
    }
}

#[derive(Default)]
struct Panel {
    shown: Vec<(WindowId, String)>,
}

impl OutputPanel for Panel {
    fn show(&mut self, window: WindowId, text: &str) {
        self.shown.push((window, text.to_owned()));
    }
}

const W1: WindowId = WindowId(1);
const W2: WindowId = WindowId(2);

fn registry() -> HelperRegistry<Editor, Panel> {
    HelperRegistry::new(Editor::default(), Panel::default())
}

#[test]
fn test_activate_and_deactivate() {
    let mut registry = registry();
    assert!(registry.is_empty());

    registry.activate(W1).unwrap();
    registry.activate(W2).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.activate(W1), Err(HostError::AlreadyActive(W1)));

    let helper = registry.deactivate(W1).unwrap();
    assert_eq!(helper.window(), W1);
    assert!(!registry.is_active(W1));
    assert!(registry.is_active(W2));
    assert_eq!(registry.deactivate(W1).unwrap_err(), HostError::UnknownWindow(W1));
}

#[test]
fn test_unknown_window_actions_fail() {
    let mut registry = registry();
    let unknown = HostError::UnknownWindow(W1);
    assert_eq!(registry.update_ui(W1), Err(unknown.clone()));
    assert_eq!(registry.validate_document(W1), Err(unknown.clone()));
    assert_eq!(registry.validate_relaxng(W1), Err(unknown.clone()));
    assert_eq!(registry.run_xpath(W1, "/"), Err(unknown));
    assert!(registry.panel().shown.is_empty());
}

#[test]
fn test_sensitivity_follows_active_document() {
    let mut registry = registry();
    registry.activate(W1).unwrap();
    assert!(!registry.helper(W1).unwrap().is_sensitive());

    registry.source_mut().open(W1, "a.xml", "<a/>");
    registry.update_ui(W1).unwrap();
    assert!(registry.helper(W1).unwrap().is_sensitive());

    registry.source_mut().close(W1);
    registry.update_ui(W1).unwrap();
    assert!(!registry.helper(W1).unwrap().is_sensitive());
}

#[test]
fn test_activate_with_open_document_is_sensitive() {
    let mut editor = Editor::default();
    editor.open(W2, "b.xml", "<b/>");
    let mut registry = HelperRegistry::new(editor, Panel::default());
    registry.activate(W2).unwrap();
    assert!(registry.helper(W2).unwrap().is_sensitive());
}

#[test]
fn test_actions_without_document_show_nothing() {
    let mut registry = registry();
    registry.activate(W1).unwrap();
    registry.validate_document(W1).unwrap();
    registry.validate_relaxng(W1).unwrap();
    registry.run_xpath(W1, "/a").unwrap();
    assert!(registry.panel().shown.is_empty());
    assert_eq!(registry.helper(W1).unwrap().last_output(), None);
}

#[test]
fn test_validate_document_reports() {
    let mut registry = registry();
    registry.source_mut().open(W1, "/tmp/good.xml", "<a><b/></a>");
    registry.source_mut().open(W2, "/tmp/bad.xml", "<a>\n<b></a>");
    registry.activate(W1).unwrap();
    registry.activate(W2).unwrap();

    registry.validate_document(W1).unwrap();
    registry.validate_document(W2).unwrap();

    assert_eq!(
        registry.panel().shown,
        vec![
            (W1, "Validating: /tmp/good.xml\nXML is valid!".to_owned()),
            (
                W2,
                "Validating: /tmp/bad.xml\nXML is NOT valid!\n\
                 Error on line: 2 -- mismatched end tag: expected </b>, found </a>\n"
                    .to_owned()
            ),
        ]
    );
    assert_eq!(
        registry.helper(W1).unwrap().last_output(),
        Some("Validating: /tmp/good.xml\nXML is valid!")
    );
}

#[test]
fn test_validate_relaxng_reports() {
    let mut registry = registry();
    registry.source_mut().open(
        W1,
        "schema.rng",
        "<element name=\"a\" xmlns=\"http://relaxng.org/ns/structure/1.0\">\n<nonsense/>\n</element>",
    );
    registry.activate(W1).unwrap();
    registry.validate_relaxng(W1).unwrap();
    assert_eq!(
        registry.helper(W1).unwrap().last_output(),
        Some(
            "Validating: schema.rng\nRelaxNG is NOT valid!\n\
             Error on line: 2 -- unknown RelaxNG pattern <nonsense>\n"
        )
    );
}

#[test]
fn test_run_xpath_reports() {
    let mut registry = registry();
    registry.source_mut().open(W1, "doc.xml", "<a><b/><c/></a>");
    registry.activate(W1).unwrap();

    registry.run_xpath(W1, "/a/*").unwrap();
    registry.run_xpath(W1, "///bad").unwrap();

    let shown: Vec<&str> = registry
        .panel()
        .shown
        .iter()
        .map(|(_, text)| text.as_str())
        .collect();
    assert_eq!(shown[0], "XPath result:\n<b/>\n<c/>\n");
    assert!(shown[1].starts_with("XPath result:\nXPath syntax error: "), "{}", shown[1]);
}
