//! Expression reference extraction
//!
//! A lexical scan over measure formulas and visual binding text that finds
//! every identifier-shaped reference. Nothing is evaluated and no parse tree
//! is built; candidates are validated against known names by the graph
//! builder.

pub mod references;
pub mod binding;

pub use references::{
    ExpressionParseWarning, ExtractedReferences, Reference, ReferenceExtractor, WarningKind,
};
pub use binding::binding_references;
