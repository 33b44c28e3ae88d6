//! Report layout decoding and entity resolution
//!
//! This crate handles:
//! - Decoding the package's front-end definition file into a generic tree
//! - Resolving the tree into typed entities (report, pages, visuals, measures, fields)
//! - Discovering field bindings across every known query site of a visual
//! - Reading structured documentation headers from measure expressions

pub mod error;
pub mod document;
pub mod model;
pub mod bindings;
pub mod measure_doc;
pub mod resolver;

pub use error::LayoutError;
pub use document::{RawDocument, decode_text, load_document};
pub use model::{
    BindingSite, Field, FieldBinding, FieldCatalog, Measure, MeasureTable, Page, Position, Report,
    Visual, VisualKind,
};
pub use measure_doc::MeasureDoc;
pub use resolver::{EntityResolver, ResolvedLayout};
