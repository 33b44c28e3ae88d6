//! Typed report entities
//!
//! Everything here is built once per extraction run by the resolver.
//! Contained entities are owned by value (report -> pages -> visuals);
//! measures and fields live in flat tables keyed by qualified name.

use pbilens_core::{qualified_name, Location};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::LayoutError;
use crate::measure_doc::MeasureDoc;

/// Root container of one report package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report identifier (derived from the package name)
    pub id: String,

    /// Numeric id stored in the layout, if any
    pub layout_id: Option<i64>,

    /// Pages in file order
    pub pages: Vec<Page>,

    /// Bindings of report-level filters
    pub filters: Vec<FieldBinding>,

    pub location: Location,
}

impl Report {
    /// All visuals across pages, in page then file order
    pub fn visuals(&self) -> impl Iterator<Item = (&Page, &Visual)> {
        self.pages
            .iter()
            .flat_map(|page| page.visuals.iter().map(move |visual| (page, visual)))
    }
}

/// A page (layout "section") of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Identifier unique within the report
    pub id: String,

    pub display_name: String,

    /// Traversal position in the section list
    pub ordinal: usize,

    /// Ordinal as stored in the layout (informational only)
    pub declared_ordinal: Option<i64>,

    /// False when the page is hidden in the report
    pub visible: bool,

    pub width: Option<f64>,
    pub height: Option<f64>,

    /// Visuals in file order
    pub visuals: Vec<Visual>,

    /// Bindings of page-level filters
    pub filters: Vec<FieldBinding>,

    pub location: Location,
}

impl Page {
    /// Titles of all visuals that carry one
    pub fn visual_titles(&self) -> Vec<&str> {
        self.visuals
            .iter()
            .filter_map(|visual| visual.title.as_deref())
            .filter(|title| !title.is_empty())
            .collect()
    }
}

/// Position and size of a visual container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// A chart, table, card or other element placed on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    /// Identifier unique within the page
    pub id: String,

    /// Position among the page's visual containers
    pub ordinal: usize,

    pub kind: VisualKind,

    pub title: Option<String>,

    /// Field and measure bindings, verbatim and de-duplicated by text
    pub bindings: Vec<FieldBinding>,

    pub position: Position,

    pub location: Location,
}

/// Where on a visual a binding was read from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "site", rename_all = "snake_case")]
pub enum BindingSite {
    /// A projection role such as `Values`, `Category` or `Y`
    Projection { role: String },

    /// The select list of the visual's prototype query
    PrototypeQuery,

    /// The data transforms section
    DataTransforms,

    /// A filter on the visual, page or report
    Filter,
}

/// One binding string as found in the layout
///
/// Query refs look like `Sales.Amount` or `Sum(Sales.Amount)`; resolution to
/// fields and measures happens when the graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldBinding {
    pub text: String,

    #[serde(flatten)]
    pub site: BindingSite,
}

impl FieldBinding {
    pub fn new(text: impl Into<String>, site: BindingSite) -> Self {
        Self {
            text: text.into(),
            site,
        }
    }
}

/// Append bindings, skipping texts already present
pub(crate) fn merge_bindings(target: &mut Vec<FieldBinding>, incoming: impl IntoIterator<Item = FieldBinding>) {
    for binding in incoming {
        if binding.text.trim().is_empty() {
            continue;
        }
        if !target.iter().any(|existing| existing.text == binding.text) {
            target.push(binding);
        }
    }
}

/// Visual type tag
///
/// The vocabulary covers the built-in visuals. Any other tag (custom visuals,
/// types introduced by newer layouts) is kept as `Unknown` with its raw text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualKind {
    BarChart,
    ClusteredBarChart,
    HundredPercentStackedBarChart,
    ColumnChart,
    ClusteredColumnChart,
    HundredPercentStackedColumnChart,
    LineChart,
    AreaChart,
    StackedAreaChart,
    LineClusteredColumnComboChart,
    LineStackedColumnComboChart,
    RibbonChart,
    WaterfallChart,
    Funnel,
    ScatterChart,
    PieChart,
    DonutChart,
    Treemap,
    Map,
    FilledMap,
    ShapeMap,
    AzureMap,
    Gauge,
    Card,
    MultiRowCard,
    Kpi,
    Slicer,
    Table,
    Matrix,
    TextBox,
    Image,
    Shape,
    ActionButton,
    Decomposition,
    KeyInfluencers,
    QnA,
    /// A group container (`singleVisualGroup`) with no data of its own
    Group,
    /// Tag outside the vocabulary, kept verbatim
    Unknown(String),
}

impl VisualKind {
    /// Map a layout `visualType` tag onto the vocabulary
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "barChart" => Self::BarChart,
            "clusteredBarChart" => Self::ClusteredBarChart,
            "hundredPercentStackedBarChart" => Self::HundredPercentStackedBarChart,
            "columnChart" => Self::ColumnChart,
            "clusteredColumnChart" => Self::ClusteredColumnChart,
            "hundredPercentStackedColumnChart" => Self::HundredPercentStackedColumnChart,
            "lineChart" => Self::LineChart,
            "areaChart" => Self::AreaChart,
            "stackedAreaChart" => Self::StackedAreaChart,
            "lineClusteredColumnComboChart" => Self::LineClusteredColumnComboChart,
            "lineStackedColumnComboChart" => Self::LineStackedColumnComboChart,
            "ribbonChart" => Self::RibbonChart,
            "waterfallChart" => Self::WaterfallChart,
            "funnel" => Self::Funnel,
            "scatterChart" => Self::ScatterChart,
            "pieChart" => Self::PieChart,
            "donutChart" => Self::DonutChart,
            "treemap" => Self::Treemap,
            "map" => Self::Map,
            "filledMap" => Self::FilledMap,
            "shapeMap" => Self::ShapeMap,
            "azureMap" => Self::AzureMap,
            "gauge" => Self::Gauge,
            "card" => Self::Card,
            "multiRowCard" => Self::MultiRowCard,
            "kpi" => Self::Kpi,
            "slicer" => Self::Slicer,
            "tableEx" | "table" => Self::Table,
            "pivotTable" | "matrix" => Self::Matrix,
            "textbox" => Self::TextBox,
            "image" => Self::Image,
            "shape" | "basicShape" => Self::Shape,
            "actionButton" => Self::ActionButton,
            "decompositionTreeVisual" => Self::Decomposition,
            "keyDriversVisual" => Self::KeyInfluencers,
            "qnaVisual" => Self::QnA,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Tag text used in exports
    pub fn as_tag(&self) -> &str {
        match self {
            Self::BarChart => "barChart",
            Self::ClusteredBarChart => "clusteredBarChart",
            Self::HundredPercentStackedBarChart => "hundredPercentStackedBarChart",
            Self::ColumnChart => "columnChart",
            Self::ClusteredColumnChart => "clusteredColumnChart",
            Self::HundredPercentStackedColumnChart => "hundredPercentStackedColumnChart",
            Self::LineChart => "lineChart",
            Self::AreaChart => "areaChart",
            Self::StackedAreaChart => "stackedAreaChart",
            Self::LineClusteredColumnComboChart => "lineClusteredColumnComboChart",
            Self::LineStackedColumnComboChart => "lineStackedColumnComboChart",
            Self::RibbonChart => "ribbonChart",
            Self::WaterfallChart => "waterfallChart",
            Self::Funnel => "funnel",
            Self::ScatterChart => "scatterChart",
            Self::PieChart => "pieChart",
            Self::DonutChart => "donutChart",
            Self::Treemap => "treemap",
            Self::Map => "map",
            Self::FilledMap => "filledMap",
            Self::ShapeMap => "shapeMap",
            Self::AzureMap => "azureMap",
            Self::Gauge => "gauge",
            Self::Card => "card",
            Self::MultiRowCard => "multiRowCard",
            Self::Kpi => "kpi",
            Self::Slicer => "slicer",
            Self::Table => "tableEx",
            Self::Matrix => "pivotTable",
            Self::TextBox => "textbox",
            Self::Image => "image",
            Self::Shape => "shape",
            Self::ActionButton => "actionButton",
            Self::Decomposition => "decompositionTreeVisual",
            Self::KeyInfluencers => "keyDriversVisual",
            Self::QnA => "qnaVisual",
            Self::Group => "group",
            Self::Unknown(tag) => tag,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl std::fmt::Display for VisualKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// A calculated expression declared in a model extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// `Table[Name]`, unique within the report
    pub qualified_name: String,

    pub name: String,

    /// Owning table
    pub table: String,

    /// Raw expression text
    pub expression: String,

    pub data_category: Option<String>,

    pub format_string: Option<String>,

    /// Author, description and last change from the comment header
    pub doc: MeasureDoc,

    /// Qualified names the layout itself lists as references of this measure
    pub reference_hints: Vec<String>,

    pub location: Location,
}

/// Global measure table keyed by qualified name, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasureTable {
    measures: Vec<Measure>,
    index: HashMap<String, usize>,
}

impl MeasureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a measure; a second definition of the same qualified name is fatal
    pub fn insert(&mut self, measure: Measure) -> Result<(), LayoutError> {
        if let Some(&existing) = self.index.get(&measure.qualified_name) {
            return Err(LayoutError::DuplicateMeasure {
                name: measure.qualified_name.clone(),
                first: self.measures[existing].location.clone(),
                second: measure.location,
            });
        }

        self.index.insert(measure.qualified_name.clone(), self.measures.len());
        self.measures.push(measure);
        Ok(())
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Measure> {
        self.index.get(qualified_name).map(|&i| &self.measures[i])
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.index.contains_key(qualified_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measure> {
        self.measures.iter()
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }
}

/// A column of an underlying table
///
/// Fields are not defined in the layout; they are known from the structural
/// column references that point at them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// `Table[Column]`
    pub qualified_name: String,
    pub table: String,
    pub column: String,
    pub data_category: Option<String>,
}

/// Fields and tables known from the layout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCatalog {
    fields: BTreeMap<String, Field>,
    tables: BTreeSet<String>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a column reference; a data category fills in a missing one
    pub fn declare(&mut self, table: &str, column: &str, data_category: Option<&str>) {
        self.tables.insert(table.to_string());
        let qualified = qualified_name(table, column);
        let field = self.fields.entry(qualified.clone()).or_insert_with(|| Field {
            qualified_name: qualified,
            table: table.to_string(),
            column: column.to_string(),
            data_category: None,
        });

        if field.data_category.is_none() {
            field.data_category = data_category.map(str::to_string);
        }
    }

    /// Record a table name seen at any declaration site
    pub fn declare_table(&mut self, table: &str) {
        self.tables.insert(table.to_string());
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Field> {
        self.fields.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.fields.contains_key(qualified_name)
    }

    pub fn is_known_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Fields ordered by qualified name
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure(table: &str, name: &str, pointer: &str) -> Measure {
        Measure {
            qualified_name: qualified_name(table, name),
            name: name.to_string(),
            table: table.to_string(),
            expression: "1".to_string(),
            data_category: None,
            format_string: None,
            doc: MeasureDoc::default(),
            reference_hints: Vec::new(),
            location: Location::with_pointer("Report/Layout", pointer),
        }
    }

    #[test]
    fn visual_kind_vocabulary() {
        assert_eq!(VisualKind::from_tag("barChart"), VisualKind::BarChart);
        assert_eq!(VisualKind::from_tag("tableEx"), VisualKind::Table);
        assert_eq!(VisualKind::from_tag("pivotTable"), VisualKind::Matrix);
        assert_eq!(VisualKind::BarChart.as_tag(), "barChart");
    }

    #[test]
    fn unknown_visual_kind_keeps_tag() {
        let kind = VisualKind::from_tag("myCustomVisual1234");
        assert!(kind.is_unknown());
        assert_eq!(kind.as_tag(), "myCustomVisual1234");
    }

    #[test]
    fn measure_table_rejects_redefinition() {
        let mut table = MeasureTable::new();
        table.insert(measure("Sales", "Total", "/a")).unwrap();
        let err = table.insert(measure("Sales", "Total", "/b")).unwrap_err();

        match err {
            LayoutError::DuplicateMeasure { name, first, second } => {
                assert_eq!(name, "Sales[Total]");
                assert_eq!(first.pointer.as_deref(), Some("/a"));
                assert_eq!(second.pointer.as_deref(), Some("/b"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn same_name_in_other_table_is_distinct() {
        let mut table = MeasureTable::new();
        table.insert(measure("Sales", "Total", "/a")).unwrap();
        table.insert(measure("Budget", "Total", "/b")).unwrap();
        assert!(table.contains("Budget[Total]"));
        assert_eq!(table.iter().map(|m| m.table.as_str()).collect::<Vec<_>>(), vec!["Sales", "Budget"]);
    }

    #[test]
    fn catalog_fills_missing_category() {
        let mut catalog = FieldCatalog::new();
        catalog.declare("Geo", "City", None);
        catalog.declare("Geo", "City", Some("City"));
        catalog.declare("Geo", "City", Some("Place"));

        let field = catalog.get("Geo[City]").unwrap();
        assert_eq!(field.data_category.as_deref(), Some("City"));
        assert!(catalog.is_known_table("Geo"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn bindings_merge_by_text() {
        let mut bindings = vec![FieldBinding::new("Sales.Amount", BindingSite::Projection { role: "Y".into() })];
        merge_bindings(
            &mut bindings,
            vec![
                FieldBinding::new("Sales.Amount", BindingSite::PrototypeQuery),
                FieldBinding::new("Sales.Region", BindingSite::PrototypeQuery),
                FieldBinding::new("  ", BindingSite::Filter),
            ],
        );

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].site, BindingSite::Projection { role: "Y".into() });
    }
}
