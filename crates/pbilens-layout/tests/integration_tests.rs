//! Integration tests for layout decoding and entity resolution
//!
//! Driven by the shared fixture package under `fixtures/sales-report`.

use pbilens_core::DiagnosticCode;
use pbilens_layout::{load_document, EntityResolver, LayoutError, VisualKind};
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

// =============================================================================
// Fixture package
// =============================================================================

#[test]
fn resolves_fixture_pages_in_file_order() {
    let document = load_document(&utf16le(SALES_LAYOUT), "Report/Layout").unwrap();
    let layout = EntityResolver::resolve(&document, "sales-report").unwrap();

    let pages: Vec<_> = layout
        .report
        .pages
        .iter()
        .map(|p| (p.ordinal, p.display_name.as_str(), p.visible))
        .collect();
    assert_eq!(
        pages,
        vec![(0, "Overview", true), (1, "Details", false), (2, "Scratch", true)]
    );
    assert_eq!(layout.report.id, "sales-report");
    assert_eq!(layout.report.layout_id, Some(0));
}

#[test]
fn resolves_fixture_visuals() {
    let document = load_document(SALES_LAYOUT.as_bytes(), "Report/Layout").unwrap();
    let layout = EntityResolver::resolve(&document, "sales-report").unwrap();

    let overview = &layout.report.pages[0];
    assert_eq!(overview.visual_titles(), vec!["Revenue by Region"]);

    let bar = &overview.visuals[0];
    assert_eq!(bar.kind, VisualKind::BarChart);
    let texts: Vec<_> = bar.bindings.iter().map(|b| b.text.as_str()).collect();
    assert_eq!(texts, vec!["Sales.Region", "Sum(Sales.Amount)", "Sales.TotalRevenue"]);
    assert_eq!(bar.position.width, Some(600.0));

    let details = &layout.report.pages[1];
    let table = &details.visuals[0];
    assert_eq!(table.kind, VisualKind::Table);
    assert_eq!(table.bindings.len(), 2);
    assert_eq!(details.filters[0].text, "Date.Year");

    let custom = &details.visuals[1];
    assert_eq!(custom.kind, VisualKind::Unknown("sparklineByExample1234".to_string()));
    assert!(layout.report.pages[2].visuals.is_empty());
}

#[test]
fn resolves_fixture_measures_and_fields() {
    let document = load_document(SALES_LAYOUT.as_bytes(), "Report/Layout").unwrap();
    let layout = EntityResolver::resolve(&document, "sales-report").unwrap();

    let names: Vec<_> = layout.measures.iter().map(|m| m.qualified_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Sales[TotalRevenue]", "Sales[AvgPrice]", "Sales[Margin]", "Budget[LegacyTarget]"]
    );

    let total = layout.measures.get("Sales[TotalRevenue]").unwrap();
    assert_eq!(total.doc.author.as_deref(), Some("Jane Doe"));
    assert_eq!(total.doc.last_change.as_deref(), Some("2025/10/23"));
    assert_eq!(total.format_string.as_deref(), Some("#,0.00"));

    let fields: Vec<_> = layout.fields.iter().map(|f| f.qualified_name.as_str()).collect();
    assert_eq!(fields, vec!["Date[Year]", "Geo[City]", "Sales[Amount]", "Sales[Region]"]);
    assert_eq!(
        layout.fields.get("Sales[Region]").unwrap().data_category.as_deref(),
        Some("Place")
    );

    let codes: Vec<_> = layout.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![DiagnosticCode::UnknownVisualKind]);
}

#[test]
fn broken_fixture_is_schema_mismatch() {
    let document = load_document(BROKEN_LAYOUT.as_bytes(), "Report/Layout").unwrap();
    let err = EntityResolver::resolve(&document, "broken-report").unwrap_err();

    assert_eq!(err.code(), DiagnosticCode::SchemaMismatch);
    assert!(matches!(err, LayoutError::SchemaMismatch { .. }));
}

#[test]
fn truncated_fixture_is_malformed() {
    let truncated = &SALES_LAYOUT[..SALES_LAYOUT.len() / 2];
    let err = load_document(truncated.as_bytes(), "Report/Layout").unwrap_err();
    assert!(matches!(err, LayoutError::MalformedDocument { line: Some(_), .. }));
}
