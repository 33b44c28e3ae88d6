//! PBI Lens Core
//!
//! Shared domain vocabulary for every pipeline stage: stable diagnostic
//! codes, source locations, configuration and the scan report schema.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod report;
pub mod config;
pub mod names;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use report::{ScanReport, ScanSummary, ReportEntry, ReportStatus, ReportVersion};
pub use names::{qualified_name, split_qualified};
pub use config::{Config, ConfigError, SeverityThreshold, ResolutionConfig, ExtractionConfig, BatchConfig};
