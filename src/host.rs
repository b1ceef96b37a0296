//! Editor integration without the widgets.
//!
//! An editor hosting the tools creates one [`WindowHelper`] per window
//! through a [`HelperRegistry`]. The registry asks a [`DocumentSource`] for
//! the active document of a window and writes reports to an
//! [`OutputPanel`]. Both are injected by the embedding application, which
//! keeps this layer free of any GUI toolkit.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::report;
use crate::tools;

/// Identifies one editor window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The document currently focused in a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDocument {
    /// Name shown to the user, usually a path or URI.
    pub display_name: String,
    /// Full buffer contents at the time of the request.
    pub text: String,
}

/// Supplies the active document of a window.
pub trait DocumentSource {
    fn active_document(&self, window: WindowId) -> Option<ActiveDocument>;
}

/// Receives report text for display. Each call replaces what the panel
/// showed before.
pub trait OutputPanel {
    fn show(&mut self, window: WindowId, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("window {0} is already active")]
    AlreadyActive(WindowId),
    #[error("window {0} is not active")]
    UnknownWindow(WindowId),
}

/// Per-window state: whether the actions are enabled and what the panel
/// last displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHelper {
    window: WindowId,
    sensitive: bool,
    last_output: Option<String>,
}

impl WindowHelper {
    #[must_use]
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            sensitive: false,
            last_output: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Whether the actions are currently enabled.
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    #[must_use]
    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }

    /// Enables the actions exactly when the window has a document.
    pub fn update_ui(&mut self, has_document: bool) {
        self.sensitive = has_document;
    }

    /// Checks the active document for well-formedness.
    pub fn validate_document(&mut self, source: &impl DocumentSource, panel: &mut impl OutputPanel) {
        let Some(doc) = source.active_document(self.window) else {
            return;
        };
        let xml = tools::validate(&doc.text);
        self.show(panel, report::validation_report(&doc.display_name, &xml));
    }

    /// Compiles the active document as a RelaxNG schema.
    pub fn validate_relaxng(&mut self, source: &impl DocumentSource, panel: &mut impl OutputPanel) {
        let Some(doc) = source.active_document(self.window) else {
            return;
        };
        let xml = tools::validate(&doc.text);
        let schema = xml.success().map(tools::compile_schema);
        self.show(
            panel,
            report::relaxng_report(&doc.display_name, &xml, schema.as_ref()),
        );
    }

    /// Runs `expression` against the active document.
    pub fn xpath_query_on_document(
        &mut self,
        expression: &str,
        source: &impl DocumentSource,
        panel: &mut impl OutputPanel,
    ) {
        let Some(doc) = source.active_document(self.window) else {
            return;
        };
        let xml = tools::validate(&doc.text);
        let result = xml.success().map(|tree| tools::evaluate(tree, expression));
        self.show(panel, report::xpath_report(&xml, result.as_deref()));
    }

    fn show(&mut self, panel: &mut impl OutputPanel, text: String) {
        panel.show(self.window, &text);
        self.last_output = Some(text);
    }
}

/// Owns the helpers of all active windows.
///
/// # Examples
///
/// ```
/// use xmltools::host::{ActiveDocument, DocumentSource, HelperRegistry, OutputPanel, WindowId};
///
/// struct One;
/// impl DocumentSource for One {
///     fn active_document(&self, _: WindowId) -> Option<ActiveDocument> {
///         Some(ActiveDocument { display_name: "a.xml".into(), text: "<a/>".into() })
///     }
/// }
///
/// #[derive(Default)]
/// struct Last(String);
/// impl OutputPanel for Last {
///     fn show(&mut self, _: WindowId, text: &str) {
///         self.0 = text.to_owned();
///     }
/// }
///
/// let mut registry = HelperRegistry::new(One, Last::default());
/// registry.activate(WindowId(1)).unwrap();
/// registry.validate_document(WindowId(1)).unwrap();
/// assert_eq!(registry.panel().0, "Validating: a.xml\nXML is valid!");
/// ```
#[derive(Debug)]
pub struct HelperRegistry<S, P> {
    source: S,
    panel: P,
    helpers: HashMap<WindowId, WindowHelper>,
}

impl<S: DocumentSource, P: OutputPanel> HelperRegistry<S, P> {
    pub fn new(source: S, panel: P) -> Self {
        Self {
            source,
            panel,
            helpers: HashMap::new(),
        }
    }

    /// Creates the helper for a newly opened window.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::AlreadyActive`] if the window already has one.
    pub fn activate(&mut self, window: WindowId) -> Result<(), HostError> {
        if self.helpers.contains_key(&window) {
            return Err(HostError::AlreadyActive(window));
        }
        let mut helper = WindowHelper::new(window);
        helper.update_ui(self.source.active_document(window).is_some());
        self.helpers.insert(window, helper);
        tracing::debug!(%window, "window helper activated");
        Ok(())
    }

    /// Drops the helper of a closed window and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if the window is not active.
    pub fn deactivate(&mut self, window: WindowId) -> Result<WindowHelper, HostError> {
        let helper = self
            .helpers
            .remove(&window)
            .ok_or(HostError::UnknownWindow(window))?;
        tracing::debug!(%window, "window helper deactivated");
        Ok(helper)
    }

    #[must_use]
    pub fn helper(&self, window: WindowId) -> Option<&WindowHelper> {
        self.helpers.get(&window)
    }

    #[must_use]
    pub fn is_active(&self, window: WindowId) -> bool {
        self.helpers.contains_key(&window)
    }

    /// Number of active windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    #[must_use]
    pub fn panel(&self) -> &P {
        &self.panel
    }

    /// Refreshes action sensitivity after the active document changed.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if the window is not active.
    pub fn update_ui(&mut self, window: WindowId) -> Result<(), HostError> {
        let has_document = self.source.active_document(window).is_some();
        self.helper_mut(window)?.update_ui(has_document);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if the window is not active.
    pub fn validate_document(&mut self, window: WindowId) -> Result<(), HostError> {
        let helper = self
            .helpers
            .get_mut(&window)
            .ok_or(HostError::UnknownWindow(window))?;
        helper.validate_document(&self.source, &mut self.panel);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if the window is not active.
    pub fn validate_relaxng(&mut self, window: WindowId) -> Result<(), HostError> {
        let helper = self
            .helpers
            .get_mut(&window)
            .ok_or(HostError::UnknownWindow(window))?;
        helper.validate_relaxng(&self.source, &mut self.panel);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if the window is not active.
    pub fn run_xpath(&mut self, window: WindowId, expression: &str) -> Result<(), HostError> {
        let helper = self
            .helpers
            .get_mut(&window)
            .ok_or(HostError::UnknownWindow(window))?;
        helper.xpath_query_on_document(expression, &self.source, &mut self.panel);
        Ok(())
    }

    fn helper_mut(&mut self, window: WindowId) -> Result<&mut WindowHelper, HostError> {
        self.helpers
            .get_mut(&window)
            .ok_or(HostError::UnknownWindow(window))
    }
}
