//! Configuration schema (pbilens.toml)

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::diagnostic::{Diagnostic, DiagnosticCode, Severity};

/// Default location of the front-end definition file inside an extracted package
pub const DEFAULT_LAYOUT_FILE: &str = "Report/Layout";

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }

    /// Rewrite the severity of each diagnostic that has an override
    pub fn apply(&self, diagnostics: &mut [Diagnostic]) {
        if self.overrides.is_empty() {
            return;
        }

        for diagnostic in diagnostics {
            diagnostic.severity = self.get_severity(diagnostic.code, diagnostic.severity);
        }
    }
}

/// How reference candidates are matched against the known namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Resolve `Table[Column]` to a field whenever `Table` is a known table,
    /// even if no structural column reference declared that column
    #[serde(default = "default_true")]
    pub trust_known_tables: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            trust_known_tables: true,
        }
    }
}

/// Expression scanning options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Skip `//`, `--` and `/* */` comments during the reference scan
    #[serde(default = "default_true")]
    pub skip_comments: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            skip_comments: true,
        }
    }
}

/// Batch execution options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Run independent report pipelines on a worker pool
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Package names to skip (glob patterns)
    #[serde(default)]
    pub skip_patterns: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            skip_patterns: Vec::new(),
        }
    }
}

impl BatchConfig {
    /// Compile `skip_patterns` into one matcher
    pub fn skip_set(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.skip_patterns {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::PatternError(e.to_string()))?;
            builder.add(glob);
        }
        builder.build().map_err(|e| ConfigError::PatternError(e.to_string()))
    }

    /// Check if a package should be skipped
    ///
    /// An invalid pattern only matches the identical package name.
    pub fn is_package_skipped(&self, package: &str) -> bool {
        match self.skip_set() {
            Ok(set) => set.is_match(package),
            Err(error) => {
                tracing::warn!(error = %error, "invalid skip pattern");
                self.skip_patterns.iter().any(|pattern| pattern == package)
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_layout_file() -> String {
    DEFAULT_LAYOUT_FILE.to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path of the layout file inside an extracted package
    #[serde(default = "default_layout_file")]
    pub layout_file: String,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Reference resolution policy
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Expression scanning options
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Batch execution options
    #[serde(default)]
    pub batch: BatchConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout_file: default_layout_file(),
            severity: SeverityThreshold::default(),
            resolution: ResolutionConfig::default(),
            extraction: ExtractionConfig::default(),
            batch: BatchConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.batch.skip_set()?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.batch.skip_set()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid skip pattern: {0}")]
    PatternError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.layout_file, "Report/Layout");
        assert!(config.extraction.skip_comments);
        assert!(config.batch.parallel);
        assert!(config.resolution.trust_known_tables);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [resolution]
            trust_known_tables = false

            [batch]
            skip_patterns = ["archive_*"]
            "#,
        )
        .unwrap();

        assert!(!config.resolution.trust_known_tables);
        assert_eq!(config.layout_file, DEFAULT_LAYOUT_FILE);
        assert!(config.batch.parallel);
        assert!(config.batch.is_package_skipped("archive_2023"));
        assert!(!config.batch.is_package_skipped("finance"));
    }

    #[test]
    fn severity_override() {
        let mut threshold = SeverityThreshold::default();
        threshold.set_override(DiagnosticCode::UnresolvedReference, Severity::Warn);

        assert_eq!(
            threshold.get_severity(DiagnosticCode::UnresolvedReference, Severity::Info),
            Severity::Warn
        );
    }

    #[test]
    fn overrides_rewrite_diagnostics() {
        let config = Config::from_toml(
            r#"
            [severity.overrides]
            MEASURE_CYCLE = "error"
            "#,
        )
        .unwrap();

        let mut diagnostics = vec![
            Diagnostic::of(DiagnosticCode::MeasureCycle, "cycle"),
            Diagnostic::of(DiagnosticCode::ExpressionParse, "unterminated"),
        ];
        config.severity.apply(&mut diagnostics);

        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[1].severity, Severity::Warn);
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.layout_file, parsed.layout_file);
        assert_eq!(config.batch, parsed.batch);
    }

    fn skipping(patterns: &[&str]) -> BatchConfig {
        BatchConfig {
            skip_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            ..BatchConfig::default()
        }
    }

    #[test]
    fn glob_matching() {
        assert!(skipping(&["*"]).is_package_skipped("anything"));
        assert!(skipping(&["sales_*"]).is_package_skipped("sales_emea"));
        assert!(skipping(&["*_draft"]).is_package_skipped("finance_draft"));
        assert!(!skipping(&["sales_*"]).is_package_skipped("finance"));
        assert!(skipping(&["exact"]).is_package_skipped("exact"));
    }

    #[test]
    fn patterns_with_several_wildcards() {
        let batch = skipping(&["*_draft_*", "archive_20??"]);
        assert!(batch.is_package_skipped("sales_draft_v2"));
        assert!(batch.is_package_skipped("archive_2023"));
        assert!(!batch.is_package_skipped("sales_draft"));
        assert!(!batch.is_package_skipped("archive_23"));
    }

    #[test]
    fn invalid_skip_pattern_is_a_config_error() {
        let err = Config::from_toml("[batch]\nskip_patterns = [\"sales_[\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::PatternError(_)));
    }
}
