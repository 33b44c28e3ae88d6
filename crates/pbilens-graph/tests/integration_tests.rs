//! End-to-end tests: raw layout bytes to sealed graph and export rows

use pbilens_core::{Config, DiagnosticCode, ScanReport};
use pbilens_graph::{
    extract_report, run_batch, NodeKind, PackageInput, ReferenceStatus, ReportOutcome, UsageState,
};
use pretty_assertions::assert_eq;

const SALES_LAYOUT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../fixtures/sales-report/Report/Layout"
));

const BROKEN_LAYOUT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../fixtures/broken-report/Report/Layout"
));

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

fn sales() -> PackageInput {
    PackageInput::new("sales-report", "Report/Layout", utf16le(SALES_LAYOUT))
}

fn names(graph: &pbilens_graph::DependencyGraph, ids: &[pbilens_graph::NodeId]) -> Vec<String> {
    ids.iter().map(|&id| graph.node(id).to_string()).collect()
}

// =============================================================================
// Fixture package
// =============================================================================

#[test]
fn fixture_graph_links_visuals_measures_and_fields() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    let bar = graph.visual_node("ReportSection1", "barChart1").unwrap();
    assert_eq!(
        names(graph, graph.uses(bar)),
        vec!["Sales[Region]", "Sales[Amount]", "Sales[TotalRevenue]"]
    );

    let amount = graph.field_node("Sales[Amount]").unwrap();
    assert_eq!(
        names(graph, graph.used_by(amount)),
        vec!["ReportSection1/barChart1", "Sales[TotalRevenue]"]
    );

    let avg = graph.measure_node("Sales[AvgPrice]").unwrap();
    assert_eq!(names(graph, graph.uses(avg)), vec!["Sales[TotalRevenue]"]);
}

#[test]
fn fixture_unused_measures_and_states() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    assert_eq!(names(graph, &graph.unused()), vec!["Sales[Margin]", "Budget[LegacyTarget]"]);

    let states: Vec<_> = graph
        .measure_nodes()
        .map(|id| (graph.node(id).to_string(), graph.usage_state(id).unwrap()))
        .collect();
    assert_eq!(
        states,
        vec![
            ("Sales[TotalRevenue]".to_string(), UsageState::DirectlyUsed),
            ("Sales[AvgPrice]".to_string(), UsageState::DirectlyUsed),
            ("Sales[Margin]".to_string(), UsageState::Unreferenced),
            ("Budget[LegacyTarget]".to_string(), UsageState::Unreferenced),
        ]
    );
}

#[test]
fn fixture_diagnostics_are_non_fatal() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    assert!(!graph.has_errors());
    let codes: Vec<_> = graph.diagnostics().iter().map(|d| d.code).collect();
    assert_eq!(
        codes,
        vec![DiagnosticCode::UnknownVisualKind, DiagnosticCode::UnresolvedReference]
    );

    let mut unresolved: Vec<_> = graph
        .nodes()
        .filter(|(_, node)| node.kind() == NodeKind::Unresolved)
        .map(|(id, _)| graph.unresolved_literal(id).unwrap().to_string())
        .collect();
    unresolved.sort();
    assert_eq!(unresolved, vec!["Missing.Field"]);
}

#[test]
fn measure_only_columns_of_known_tables_are_fields() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    let margin = graph.measure_node("Sales[Margin]").unwrap();
    let mut fields = names(graph, &graph.transitive_fields_of(margin).unwrap());
    fields.sort();
    assert_eq!(fields, vec!["Sales[Amount]", "Sales[Cost]"]);

    assert!(graph.field_node("Budget[Target]").is_some());
    assert!(graph.unresolved_node("Sales[Cost]").is_none());
}

#[test]
fn untrusted_tables_keep_undeclared_columns_unresolved() {
    let config = Config::from_toml("[resolution]\ntrust_known_tables = false\n").unwrap();
    let extraction = extract_report(&sales(), &config).unwrap();
    let graph = &extraction.graph;

    assert!(graph.field_node("Sales[Cost]").is_none());
    assert!(graph.unresolved_node("Sales[Cost]").is_some());
    assert!(graph.unresolved_node("Budget[Target]").is_some());
}

#[test]
fn transitive_fields_follow_measure_chains() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    let card = graph.visual_node("ReportSection1", "card1").unwrap();
    let fields = graph.transitive_fields_of(card).unwrap();
    assert_eq!(names(graph, &fields), vec!["Sales[Amount]"]);

    let details = graph.page_node("ReportSection2").unwrap();
    let mut fields = names(graph, &graph.transitive_fields_of(details).unwrap());
    fields.sort();
    assert_eq!(fields, vec!["Date[Year]", "Geo[City]"]);
}

#[test]
fn impact_of_a_field_reaches_measures_and_visuals() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    let amount = graph.resolve_name("Sales[Amount]").unwrap();
    let users = names(graph, &graph.transitive_users_of(amount));
    assert_eq!(
        users,
        vec![
            "ReportSection1/barChart1",
            "Sales[TotalRevenue]",
            "Sales[AvgPrice]",
            "Sales[Margin]",
            "ReportSection1/card1",
        ]
    );
}

#[test]
fn export_rows_mark_unresolved_references() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    let rows = graph.visual_usage_rows();
    let filter_row = rows
        .iter()
        .find(|r| r.page.as_deref() == Some("ReportSection2") && r.visual.is_none())
        .unwrap();
    assert_eq!(filter_row.reference, "Date[Year]");

    let missing = rows.iter().find(|r| r.reference == "Missing.Field").unwrap();
    assert_eq!(missing.status, ReferenceStatus::Unresolved);
    assert_eq!(missing.visual.as_deref(), Some("table1"));

    let measure_rows = graph.measure_usage_rows();
    assert!(measure_rows.iter().all(|r| r.status == ReferenceStatus::Resolved));
    let cost = measure_rows.iter().find(|r| r.reference == "Sales[Cost]").unwrap();
    assert_eq!(cost.measure, "Sales[Margin]");
    assert_eq!(cost.target_kind, NodeKind::Field);
}

#[test]
fn summaries_read_measure_docs_and_page_titles() {
    let extraction = extract_report(&sales(), &Config::default()).unwrap();
    let graph = &extraction.graph;

    let measures = graph.measure_summaries();
    let total = &measures[0];
    assert_eq!(total.author.as_deref(), Some("Jane Doe"));
    assert_eq!(total.format_string.as_deref(), Some("#,0.00"));
    assert_eq!(total.pages, vec!["Overview"]);

    let pages = graph.page_summaries();
    assert_eq!(pages[0].visual_titles, vec!["Revenue by Region"]);
    assert_eq!(pages[0].used_measures, vec!["Sales[TotalRevenue]", "Sales[AvgPrice]"]);
    assert!(!pages[1].visible);
    assert_eq!(pages[2].visual_count, 0);
}

// =============================================================================
// Batch runs
// =============================================================================

#[test]
fn broken_package_is_skipped_without_stopping_the_batch() {
    let inputs = vec![
        PackageInput::new("broken-report", "Report/Layout", BROKEN_LAYOUT.as_bytes().to_vec()),
        sales(),
    ];

    let outcomes = run_batch(&inputs, &Config::default());
    assert!(matches!(&outcomes[0], ReportOutcome::Skipped { diagnostic, .. } if diagnostic.code == DiagnosticCode::SchemaMismatch));
    assert!(outcomes[1].extraction().is_some());

    let report = ScanReport::from_entries(outcomes.iter().map(ReportOutcome::to_entry).collect());
    assert_eq!(report.summary.reports_total, 2);
    assert_eq!(report.summary.reports_skipped, 1);
    assert_eq!(report.summary.measures, 4);
    assert_eq!(report.summary.unused_measures, 2);
    assert!(report.has_errors());
}
