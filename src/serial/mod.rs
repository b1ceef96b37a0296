//! Serialization of document trees and individual nodes back to markup.

pub mod xml;

pub use xml::{serialize, serialize_attribute, serialize_node};
