//! # xmltools
//!
//! XML helpers for text editors: well-formedness checking with line-numbered
//! diagnostics, RelaxNG schema compilation and validation, and `XPath` 1.0
//! queries whose matches are printed back as markup.
//!
//! The [`tools`] module holds the three operations. [`report`] turns their
//! results into the text shown in an output panel, and [`host`] wires both
//! to editor windows.
//!
//! ## Quick Start
//!
//! ```
//! use xmltools::{tools, Outcome};
//!
//! match tools::validate("<a><b></a>") {
//!     Outcome::Success(_) => unreachable!(),
//!     Outcome::Errors(errors) => {
//!         assert_eq!(errors.len(), 1);
//!         assert_eq!(errors[0].line, 1);
//!     }
//! }
//! ```

pub mod error;
pub mod host;
pub mod parser;
pub mod report;
pub mod serial;
pub mod tools;
pub mod tree;
pub mod validation;
pub mod xpath;

pub use error::{ErrorEntry, ErrorList, Outcome};
pub use tree::{Attribute, Document, NodeId};
