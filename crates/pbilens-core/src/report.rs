//! Scan report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::diagnostic::{Diagnostic, Severity};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Outcome of one package's pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    /// The graph was built and sealed
    Extracted,

    /// A fatal error aborted this package; the batch carried on
    Skipped { reason: String },
}

/// Per-package entry of the scan report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Report identifier (derived from the package name)
    pub name: String,

    /// Layout file the report was read from
    pub source: String,

    /// SHA-256 of the raw layout bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Extracted or skipped
    #[serde(flatten)]
    pub status: ReportStatus,

    pub pages: usize,
    pub visuals: usize,
    pub measures: usize,
    pub unused_measures: usize,
    pub unresolved_references: usize,

    /// Non-fatal diagnostics, or the fatal one for a skipped package
    pub diagnostics: Vec<Diagnostic>,
}

impl ReportEntry {
    /// Entry for a package whose run was aborted
    pub fn skipped(name: impl Into<String>, source: impl Into<String>, diagnostic: Diagnostic) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            fingerprint: None,
            status: ReportStatus::Skipped {
                reason: diagnostic.message.clone(),
            },
            pages: 0,
            visuals: 0,
            measures: 0,
            unused_measures: 0,
            unresolved_references: 0,
            diagnostics: vec![diagnostic],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, ReportStatus::Skipped { .. })
    }
}

/// Summary statistics for a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Number of packages seen
    pub reports_total: usize,

    /// Number of packages with a sealed graph
    pub reports_extracted: usize,

    /// Number of packages skipped on a fatal error
    pub reports_skipped: usize,

    pub pages: usize,
    pub visuals: usize,
    pub measures: usize,
    pub unused_measures: usize,
    pub unresolved_references: usize,

    /// Number of errors
    pub errors: usize,

    /// Number of warnings
    pub warnings: usize,

    /// Number of info messages
    pub info: usize,
}

/// Scan report (pbilens-report.json v1)
///
/// This is the stable output format.
/// All fields are versioned and backward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics
    pub summary: ScanSummary,

    /// One entry per package, in batch order
    pub reports: Vec<ReportEntry>,

    /// Metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ScanReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ScanSummary::default(),
            reports: Vec::new(),
            metadata: None,
        }
    }

    /// Create a report from package entries
    pub fn from_entries(entries: Vec<ReportEntry>) -> Self {
        let mut report = Self::new();
        for entry in entries {
            report.add_entry(entry);
        }
        report
    }

    /// Add a package entry to the report
    pub fn add_entry(&mut self, entry: ReportEntry) {
        let summary = &mut self.summary;
        summary.reports_total += 1;
        if entry.is_skipped() {
            summary.reports_skipped += 1;
        } else {
            summary.reports_extracted += 1;
        }

        summary.pages += entry.pages;
        summary.visuals += entry.visuals;
        summary.measures += entry.measures;
        summary.unused_measures += entry.unused_measures;
        summary.unresolved_references += entry.unresolved_references;

        for diagnostic in &entry.diagnostics {
            match diagnostic.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warn => summary.warnings += 1,
                Severity::Info => summary.info += 1,
            }
        }

        self.reports.push(entry);
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// All diagnostics across packages
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.reports.iter().flat_map(|entry| entry.diagnostics.iter())
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

impl Default for ScanReport {
    fn default() -> Self {
        Self::new()
    }
}
