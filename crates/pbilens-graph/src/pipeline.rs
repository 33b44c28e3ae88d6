//! Per-report pipeline and batch runner
//!
//! Load -> Resolve -> Extract -> Build -> Seal for one package. Each run owns
//! its tree, entities and graph, so batch runs share nothing and can go to
//! the rayon pool as they are.

use pbilens_core::{split_qualified, Config, Diagnostic, DiagnosticCode, ReportEntry, ReportStatus};
use pbilens_dax::{binding_references, ExtractedReferences, Reference, ReferenceExtractor};
use pbilens_layout::{load_document, EntityResolver, FieldBinding, LayoutError, ResolvedLayout};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::graph::{DependencyGraph, GraphBuilder, Node};

/// Raw input for one report package
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInput {
    /// Package name; becomes the report identifier
    pub name: String,

    /// Label of the layout file, used in locations
    pub source: String,

    pub bytes: Vec<u8>,
}

impl PackageInput {
    pub fn new(name: impl Into<String>, source: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            bytes,
        }
    }

    /// Read the layout file of an extracted package directory
    pub fn read_dir(dir: &Path, config: &Config) -> Result<Self, ExtractionError> {
        let name = package_name(dir);
        let path = dir.join(&config.layout_file);
        let bytes = std::fs::read(&path).map_err(|e| ExtractionError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(Self::new(name, config.layout_file.clone(), bytes))
    }
}

/// Package name from its directory, `report` when the path has none
pub fn package_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string())
}

/// Fatal outcome of one package's pipeline run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl ExtractionError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Io { .. } => Diagnostic::of(DiagnosticCode::MalformedDocument, self.to_string()),
            Self::Layout(error) => error.to_diagnostic(),
        }
    }
}

/// A successfully sealed report
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub name: String,
    pub source: String,

    /// SHA-256 of the raw layout bytes, hex encoded
    pub fingerprint: String,

    pub graph: DependencyGraph,
}

impl Extraction {
    /// Scan report entry with counts and diagnostics
    pub fn to_entry(&self) -> ReportEntry {
        let report = self.graph.report();
        ReportEntry {
            name: self.name.clone(),
            source: self.source.clone(),
            fingerprint: Some(self.fingerprint.clone()),
            status: ReportStatus::Extracted,
            pages: report.pages.len(),
            visuals: report.visuals().count(),
            measures: self.graph.measures().len(),
            unused_measures: self.graph.unused().len(),
            unresolved_references: self.graph.unresolved_count(),
            diagnostics: self.graph.diagnostics().to_vec(),
        }
    }
}

/// Outcome of one package in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Extracted(Box<Extraction>),
    Skipped {
        name: String,
        source: String,
        diagnostic: Diagnostic,
    },
}

impl ReportOutcome {
    /// Outcome for a package whose run failed
    pub fn skipped(name: impl Into<String>, source: impl Into<String>, error: &ExtractionError, config: &Config) -> Self {
        let mut diagnostics = [error.to_diagnostic()];
        config.severity.apply(&mut diagnostics);
        let [diagnostic] = diagnostics;

        Self::Skipped {
            name: name.into(),
            source: source.into(),
            diagnostic,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Extracted(extraction) => &extraction.name,
            Self::Skipped { name, .. } => name,
        }
    }

    pub fn extraction(&self) -> Option<&Extraction> {
        match self {
            Self::Extracted(extraction) => Some(extraction),
            Self::Skipped { .. } => None,
        }
    }

    /// Why the package was skipped
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Extracted(_) => None,
            Self::Skipped { diagnostic, .. } => Some(&diagnostic.message),
        }
    }

    pub fn to_entry(&self) -> ReportEntry {
        match self {
            Self::Extracted(extraction) => extraction.to_entry(),
            Self::Skipped { name, source, diagnostic } => ReportEntry::skipped(name, source, diagnostic.clone()),
        }
    }
}

/// Extract every reference candidate of a resolved layout and seal the graph
pub fn build_graph(layout: ResolvedLayout, config: &Config) -> DependencyGraph {
    let extractor = ReferenceExtractor::from_config(&config.extraction);
    let mut pending: Vec<(Node, Reference)> = Vec::new();
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    let report = &layout.report;
    let report_node = Node::report(&report.id);
    collect_bindings(&report_node, &report.filters, &extractor, &mut pending);

    for page in &report.pages {
        let page_node = Node::page(&page.id);
        collect_bindings(&page_node, &page.filters, &extractor, &mut pending);

        for visual in &page.visuals {
            let visual_node = Node::visual(&page.id, &visual.id);
            for binding in &visual.bindings {
                let extracted = binding_references(&binding.text, &extractor);
                record_warnings(&extracted, &visual_node.to_string(), &visual.location, &mut diagnostics);
                pending.extend(extracted.references.into_iter().map(|r| (visual_node.clone(), r)));
            }
        }
    }

    for measure in layout.measures.iter() {
        let measure_node = Node::measure(&measure.qualified_name);
        let extracted = extractor.extract(&measure.expression);
        record_warnings(&extracted, &measure.qualified_name, &measure.location, &mut diagnostics);
        pending.extend(extracted.references.into_iter().map(|r| (measure_node.clone(), r)));

        for hint in &measure.reference_hints {
            pending.push((measure_node.clone(), hint_reference(hint)));
        }
    }

    let mut builder = GraphBuilder::new(layout).with_resolution(config.resolution.clone());
    for diagnostic in diagnostics {
        builder.add_diagnostic(diagnostic);
    }
    for (node, reference) in pending {
        match builder.lookup(&node) {
            Some(id) => builder.add_reference(id, reference),
            None => tracing::debug!(node = %node, "reference from unregistered node"),
        }
    }

    builder.seal()
}

fn collect_bindings(
    node: &Node,
    bindings: &[FieldBinding],
    extractor: &ReferenceExtractor,
    pending: &mut Vec<(Node, Reference)>,
) {
    for binding in bindings {
        let extracted = binding_references(&binding.text, extractor);
        pending.extend(extracted.references.into_iter().map(|r| (node.clone(), r)));
    }
}

fn record_warnings(
    extracted: &ExtractedReferences,
    subject: &str,
    location: &pbilens_core::Location,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for warning in &extracted.warnings {
        diagnostics.push(warning.to_diagnostic(subject).with_location(location.clone()));
    }
}

/// Reference for a `Table[Name]` or `[Name]` hint
fn hint_reference(hint: &str) -> Reference {
    let reference = match split_qualified(hint) {
        Some((table, name)) => Reference::qualified(table, name),
        None => Reference::bare(hint.trim_start_matches('[').trim_end_matches(']')),
    };
    reference.with_source(hint)
}

/// Run the whole pipeline for one package
pub fn extract_report(input: &PackageInput, config: &Config) -> Result<Extraction, ExtractionError> {
    let document = load_document(&input.bytes, input.source.clone())?;
    let layout = EntityResolver::resolve(&document, &input.name)?;

    let mut graph = build_graph(layout, config);
    config.severity.apply(graph.diagnostics_mut());

    Ok(Extraction {
        name: input.name.clone(),
        source: input.source.clone(),
        fingerprint: hex::encode(Sha256::digest(&input.bytes)),
        graph,
    })
}

/// Run every package independently; outcomes come back in input order
///
/// Packages matching `batch.skip_patterns` are left out. A fatal error in
/// one package becomes a `Skipped` outcome and the batch carries on.
pub fn run_batch(inputs: &[PackageInput], config: &Config) -> Vec<ReportOutcome> {
    let selected: Vec<&PackageInput> = inputs
        .iter()
        .filter(|input| {
            let skip = config.batch.is_package_skipped(&input.name);
            if skip {
                tracing::info!(package = %input.name, "package matches a skip pattern");
            }
            !skip
        })
        .collect();

    let run = |input: &PackageInput| match extract_report(input, config) {
        Ok(extraction) => {
            tracing::debug!(package = %input.name, fingerprint = %extraction.fingerprint, "package extracted");
            ReportOutcome::Extracted(Box::new(extraction))
        }
        Err(error) => {
            tracing::warn!(package = %input.name, error = %error, "skipping package");
            ReportOutcome::skipped(&input.name, &input.source, &error, config)
        }
    };

    if config.batch.parallel {
        selected.par_iter().map(|input| run(input)).collect()
    } else {
        selected.iter().map(|input| run(input)).collect()
    }
}
