//! Dependency graph engine
//!
//! This crate handles:
//! - Building the typed dependency graph of one report (containment and reference edges)
//! - Sealing: reference resolution, self-loop removal, cycle detection, usage states
//! - Read-only queries on the sealed graph (used-by, uses, unused, transitive closure)
//! - Flat export rows and summary views
//! - The per-report pipeline and the batch runner

pub mod graph;
pub mod usage;
pub mod cycles;
pub mod export;
pub mod pipeline;

pub use graph::{DependencyGraph, Edge, EdgeKind, GraphBuilder, GraphError, Node, NodeId, NodeKind};
pub use usage::UsageState;
pub use export::{MeasureSummary, MeasureUsageRow, PageSummary, ReferenceStatus, VisualUsageRow};
pub use pipeline::{
    build_graph, extract_report, package_name, run_batch, Extraction, ExtractionError, PackageInput, ReportOutcome,
};
