//! Fatal per-run layout errors

use pbilens_core::{Diagnostic, DiagnosticCode, Location};

/// Errors that abort the extraction of a single report
///
/// The batch caller records these as a skipped report and moves on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("Malformed layout document {file}: {message}")]
    MalformedDocument {
        file: String,
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    #[error("Layout {file} does not match the expected schema: {message}")]
    SchemaMismatch {
        file: String,
        element: String,
        message: String,
    },

    #[error("Measure '{name}' is defined more than once ({first} and {second})")]
    DuplicateMeasure {
        name: String,
        first: Location,
        second: Location,
    },
}

impl LayoutError {
    /// Stable diagnostic code for this error
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::MalformedDocument { .. } => DiagnosticCode::MalformedDocument,
            Self::SchemaMismatch { .. } => DiagnosticCode::SchemaMismatch,
            Self::DuplicateMeasure { .. } => DiagnosticCode::DuplicateMeasure,
        }
    }

    /// Convert into a diagnostic for the batch-level report
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::of(self.code(), self.to_string());
        match self {
            Self::MalformedDocument { file, line: Some(line), column, .. } => diagnostic
                .with_location(Location::with_position(file.clone(), *line, column.unwrap_or(1))),
            Self::MalformedDocument { file, .. } => diagnostic.with_location(Location::new(file.clone())),
            Self::SchemaMismatch { file, element, .. } => diagnostic
                .with_location(Location::new(file.clone()))
                .with_subjects(vec![element.clone()]),
            Self::DuplicateMeasure { name, second, .. } => diagnostic
                .with_location(second.clone())
                .with_subjects(vec![name.clone()]),
        }
    }
}
