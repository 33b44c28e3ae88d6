//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Run-fatal outcomes (1xxx)
    /// The layout file is not syntactically valid
    MalformedDocument,

    /// A required structural element is missing from the layout
    SchemaMismatch,

    /// Two declaration sites define the same measure qualified name
    DuplicateMeasure,

    // Expression scanning (2xxx)
    /// Bracket or quote nesting in an expression could not be closed
    ExpressionParse,

    // Graph validation (3xxx)
    /// A measure references itself directly; the self-edge was dropped
    CyclicMeasure,

    /// Measures reference each other through a longer chain
    MeasureCycle,

    /// A reference candidate matched no known field or measure
    UnresolvedReference,

    /// An unqualified measure reference matched several tables
    AmbiguousMeasureName,

    // Layout structure (4xxx)
    /// A string-encoded sub-structure could not be decoded
    EmbeddedJsonInvalid,

    /// A visual type tag outside the known vocabulary
    UnknownVisualKind,

    /// A page or visual identifier was repeated and had to be disambiguated
    DuplicateIdentifier,

    /// A page or visual carried no identifier and one was synthesized
    MissingIdentifier,

    /// A measure declaration lacked a name or expression and was skipped
    IncompleteMeasure,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedDocument => "MALFORMED_DOCUMENT",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::DuplicateMeasure => "DUPLICATE_MEASURE",
            Self::ExpressionParse => "EXPRESSION_PARSE",
            Self::CyclicMeasure => "CYCLIC_MEASURE",
            Self::MeasureCycle => "MEASURE_CYCLE",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::AmbiguousMeasureName => "AMBIGUOUS_MEASURE_NAME",
            Self::EmbeddedJsonInvalid => "EMBEDDED_JSON_INVALID",
            Self::UnknownVisualKind => "UNKNOWN_VISUAL_KIND",
            Self::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            Self::MissingIdentifier => "MISSING_IDENTIFIER",
            Self::IncompleteMeasure => "INCOMPLETE_MEASURE",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }

    /// Severity used when no override is configured
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::MalformedDocument | Self::SchemaMismatch | Self::DuplicateMeasure => Severity::Error,
            Self::ExpressionParse
            | Self::CyclicMeasure
            | Self::MeasureCycle
            | Self::AmbiguousMeasureName
            | Self::EmbeddedJsonInvalid
            | Self::DuplicateIdentifier
            | Self::IncompleteMeasure
            | Self::Warning => Severity::Warn,
            Self::UnresolvedReference
            | Self::UnknownVisualKind
            | Self::MissingIdentifier
            | Self::Info => Severity::Info,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - the graph is usable but degraded
    Warn,

    /// Error - the report could not be processed
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where an entity or diagnostic came from inside a report package
///
/// `pointer` is an RFC 6901 JSON pointer into the decoded layout tree.
/// Embedded string-encoded documents are addressed by the pointer of the
/// string followed by the pointer inside the decoded document, joined by `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path relative to the package root
    pub file: String,

    /// JSON pointer of the section the item was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,

    /// Optional line number (1-indexed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// Optional column number (1-indexed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            pointer: None,
            line: None,
            column: None,
        }
    }

    /// Create a location addressing a section of the decoded tree
    pub fn with_pointer(file: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            pointer: Some(pointer.into()),
            line: None,
            column: None,
        }
    }

    /// Create a location with file, line, and column
    pub fn with_position(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            pointer: None,
            line: Some(line),
            column: Some(column),
        }
    }

    /// Derive a location for a child element
    pub fn child(&self, segment: impl std::fmt::Display) -> Self {
        let parent = self.pointer.as_deref().unwrap_or("");
        Self {
            file: self.file.clone(),
            pointer: Some(format!("{}/{}", parent, escape_pointer_segment(&segment.to_string()))),
            line: None,
            column: None,
        }
    }

    /// Derive a location inside a string-encoded document found at this location
    pub fn embedded(&self) -> Self {
        let parent = self.pointer.as_deref().unwrap_or("");
        Self {
            file: self.file.clone(),
            pointer: Some(format!("{}#", parent)),
            line: None,
            column: None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file)?;
        if let Some(pointer) = &self.pointer {
            write!(f, ":{}", pointer)?;
        }
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(column) = self.column {
                write!(f, ":{}", column)?;
            }
        }
        Ok(())
    }
}

fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Entities involved (qualified names, page or visual identifiers)
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            subjects: Vec::new(),
        }
    }

    /// Create a diagnostic at the code's default severity
    pub fn of(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, code.default_severity(), message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the entities involved
    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = subjects;
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}
