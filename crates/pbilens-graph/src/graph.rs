//! Dependency graph construction and queries
//!
//! The graph has two states. `GraphBuilder` accepts the resolved entities and
//! reference candidates; `DependencyGraph` is the sealed, read-only result.
//! `GraphBuilder::seal` is the only transition and it consumes the builder,
//! so queries on a half-built graph cannot be written.
//!
//! Nodes live in a flat table indexed by `NodeId`; edges are id pairs. Measure
//! cycles are ordinary data here, not ownership cycles.

use pbilens_core::{qualified_name, Diagnostic, DiagnosticCode, ResolutionConfig, Severity};
use pbilens_dax::Reference;
use pbilens_layout::{Field, FieldCatalog, Measure, MeasureTable, Page, Report, ResolvedLayout, Visual};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::cycles::find_measure_cycles;
use crate::usage::{compute_usage, UsageState};

/// Index of a node in the graph's node table
///
/// Ids are only meaningful for the graph that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Entity kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Report,
    Page,
    Visual,
    Measure,
    Field,
    Unresolved,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Page => "page",
            Self::Visual => "visual",
            Self::Measure => "measure",
            Self::Field => "field",
            Self::Unresolved => "unresolved reference",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a graph node, also used as the lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Report { id: String },
    Page { id: String },
    Visual { page: String, id: String },
    Measure { qualified_name: String },
    Field { qualified_name: String },
    /// Placeholder carrying the original text of a reference nothing matched
    Unresolved { literal: String },
}

impl Node {
    pub fn report(id: impl Into<String>) -> Self {
        Self::Report { id: id.into() }
    }

    pub fn page(id: impl Into<String>) -> Self {
        Self::Page { id: id.into() }
    }

    pub fn visual(page: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Visual {
            page: page.into(),
            id: id.into(),
        }
    }

    pub fn measure(qualified_name: impl Into<String>) -> Self {
        Self::Measure {
            qualified_name: qualified_name.into(),
        }
    }

    pub fn field(qualified_name: impl Into<String>) -> Self {
        Self::Field {
            qualified_name: qualified_name.into(),
        }
    }

    pub fn unresolved(literal: impl Into<String>) -> Self {
        Self::Unresolved {
            literal: literal.into(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Report { .. } => NodeKind::Report,
            Self::Page { .. } => NodeKind::Page,
            Self::Visual { .. } => NodeKind::Visual,
            Self::Measure { .. } => NodeKind::Measure,
            Self::Field { .. } => NodeKind::Field,
            Self::Unresolved { .. } => NodeKind::Unresolved,
        }
    }

    /// Whether the node can carry outgoing reference edges
    pub fn is_referrer(&self) -> bool {
        !matches!(self, Self::Field { .. } | Self::Unresolved { .. })
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Report { id } | Self::Page { id } => write!(f, "{}", id),
            Self::Visual { page, id } => write!(f, "{}/{}", page, id),
            Self::Measure { qualified_name } | Self::Field { qualified_name } => write!(f, "{}", qualified_name),
            Self::Unresolved { literal } => write!(f, "{}", literal),
        }
    }
}

/// Edge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Report -> Page, Page -> Visual
    Contains,

    /// Referrer -> Measure or Field
    References,

    /// Referrer -> unresolved placeholder
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// Errors from queries on a sealed graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("'{name}' is a {kind} and references nothing")]
    NotAReferrer { name: String, kind: NodeKind },

    #[error("No measure, field or reference named '{0}' in the graph")]
    UnknownEntity(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct NodeTable {
    nodes: Vec<Node>,
    index: HashMap<Node, NodeId>,
}

impl NodeTable {
    /// Insert a node, or return the id it already has
    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.index.insert(node.clone(), id);
        self.nodes.push(node);
        id
    }

    fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn lookup(&self, node: &Node) -> Option<NodeId> {
        self.index.get(node).copied()
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// How a reference candidate matched the known namespace
enum Resolution {
    Measure(String),
    Field(String),
    /// Column of a known table that no binding declared, accepted under `trust_known_tables`
    TrustedField { table: String, column: String },
    /// No match; `ambiguous` lists the measures a bare name could mean
    Unresolved { ambiguous: Vec<String> },
}

/// Known measure and field names during sealing
struct Namespace<'a> {
    measures: &'a MeasureTable,
    fields: &'a FieldCatalog,
    resolution: &'a ResolutionConfig,
    measures_by_name: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Namespace<'a> {
    fn new(measures: &'a MeasureTable, fields: &'a FieldCatalog, resolution: &'a ResolutionConfig) -> Self {
        let mut measures_by_name: HashMap<&str, Vec<&str>> = HashMap::new();
        for measure in measures.iter() {
            measures_by_name
                .entry(measure.name.as_str())
                .or_default()
                .push(measure.qualified_name.as_str());
        }

        Self {
            measures,
            fields,
            resolution,
            measures_by_name,
        }
    }

    /// Exact, case-sensitive matching: measures first, then fields
    fn resolve(&self, reference: &Reference) -> Resolution {
        match &reference.table {
            Some(table) => {
                let qualified = qualified_name(table, &reference.name);
                if self.measures.contains(&qualified) {
                    Resolution::Measure(qualified)
                } else if self.fields.contains(&qualified) {
                    Resolution::Field(qualified)
                } else if self.resolution.trust_known_tables && self.fields.is_known_table(table) {
                    Resolution::TrustedField {
                        table: table.clone(),
                        column: reference.name.clone(),
                    }
                } else {
                    Resolution::Unresolved { ambiguous: Vec::new() }
                }
            }
            None => match self.measures_by_name.get(reference.name.as_str()).map(Vec::as_slice) {
                Some([single]) => Resolution::Measure(single.to_string()),
                Some(several) => Resolution::Unresolved {
                    ambiguous: several.iter().map(|name| name.to_string()).collect(),
                },
                None => Resolution::Unresolved { ambiguous: Vec::new() },
            },
        }
    }
}

/// Graph in the building state
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    report: Report,
    measures: MeasureTable,
    fields: FieldCatalog,
    nodes: NodeTable,
    contains: Vec<Edge>,
    candidates: Vec<(NodeId, Reference)>,
    resolution: ResolutionConfig,
    diagnostics: Vec<Diagnostic>,
}

impl GraphBuilder {
    /// Register the containment tree, the measures and the fields of a resolved layout
    pub fn new(layout: ResolvedLayout) -> Self {
        let ResolvedLayout {
            report,
            measures,
            fields,
            diagnostics,
        } = layout;

        let mut nodes = NodeTable::default();
        let mut contains = Vec::new();

        let report_node = nodes.insert(Node::report(&report.id));
        for page in &report.pages {
            let page_node = nodes.insert(Node::page(&page.id));
            contains.push(Edge {
                from: report_node,
                to: page_node,
                kind: EdgeKind::Contains,
            });

            for visual in &page.visuals {
                let visual_node = nodes.insert(Node::visual(&page.id, &visual.id));
                contains.push(Edge {
                    from: page_node,
                    to: visual_node,
                    kind: EdgeKind::Contains,
                });
            }
        }

        for measure in measures.iter() {
            nodes.insert(Node::measure(&measure.qualified_name));
        }
        for field in fields.iter() {
            nodes.insert(Node::field(&field.qualified_name));
        }

        Self {
            report,
            measures,
            fields,
            nodes,
            contains,
            candidates: Vec::new(),
            resolution: ResolutionConfig::default(),
            diagnostics,
        }
    }

    /// Set the reference resolution policy
    pub fn with_resolution(mut self, resolution: ResolutionConfig) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn measures(&self) -> &MeasureTable {
        &self.measures
    }

    /// Id of a registered node
    pub fn lookup(&self, node: &Node) -> Option<NodeId> {
        self.nodes.lookup(node)
    }

    /// Record a reference candidate; resolution happens when sealing
    pub fn add_reference(&mut self, from: NodeId, reference: Reference) {
        self.candidates.push((from, reference));
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Resolve references, drop self-loops, detect cycles and freeze the graph
    pub fn seal(self) -> DependencyGraph {
        let GraphBuilder {
            report,
            measures,
            mut fields,
            mut nodes,
            contains,
            candidates,
            resolution,
            mut diagnostics,
        } = self;

        let resolutions: Vec<Resolution> = {
            let namespace = Namespace::new(&measures, &fields, &resolution);
            candidates.iter().map(|(_, reference)| namespace.resolve(reference)).collect()
        };

        let mut edges = contains;
        let mut seen_edges = HashSet::new();
        let mut reported_unresolved = HashSet::new();
        let mut reported_ambiguous = HashSet::new();
        let mut reported_self_loops = HashSet::new();

        for ((from, reference), resolution) in candidates.into_iter().zip(resolutions) {
            let literal = reference.source.clone();
            let (to, kind) = match resolution {
                Resolution::Measure(qualified) => (nodes.insert(Node::measure(qualified)), EdgeKind::References),
                Resolution::Field(qualified) => (nodes.insert(Node::field(qualified)), EdgeKind::References),
                Resolution::TrustedField { table, column } => {
                    fields.declare(&table, &column, None);
                    (nodes.insert(Node::field(qualified_name(&table, &column))), EdgeKind::References)
                }
                Resolution::Unresolved { ambiguous } => {
                    let referrer = nodes.get(from).to_string();
                    if !ambiguous.is_empty() && reported_ambiguous.insert(literal.clone()) {
                        diagnostics.push(
                            Diagnostic::of(
                                DiagnosticCode::AmbiguousMeasureName,
                                format!("'{}' matches measures in several tables: {}", literal, ambiguous.join(", ")),
                            )
                            .with_subjects(ambiguous),
                        );
                    }
                    if reported_unresolved.insert((from, literal.clone())) {
                        diagnostics.push(
                            Diagnostic::of(
                                DiagnosticCode::UnresolvedReference,
                                format!("'{}' references unknown '{}'", referrer, literal),
                            )
                            .with_subjects(vec![referrer, literal.clone()]),
                        );
                    }
                    (nodes.insert(Node::unresolved(literal.clone())), EdgeKind::Unresolved)
                }
            };

            if to == from {
                if reported_self_loops.insert(from) {
                    let name = nodes.get(from).to_string();
                    tracing::warn!(measure = %name, "dropping self-referencing edge");
                    diagnostics.push(
                        Diagnostic::of(
                            DiagnosticCode::CyclicMeasure,
                            format!("Measure '{}' references itself; the self-reference was dropped", name),
                        )
                        .with_subjects(vec![name]),
                    );
                }
                continue;
            }

            if seen_edges.insert((from, to)) {
                edges.push(Edge { from, to, kind });
            }
        }

        let count = nodes.len();
        let mut uses = vec![Vec::new(); count];
        let mut used_by = vec![Vec::new(); count];
        let mut children = vec![Vec::new(); count];
        let mut parent = vec![None; count];
        for edge in &edges {
            match edge.kind {
                EdgeKind::Contains => {
                    children[edge.from.0].push(edge.to);
                    parent[edge.to.0] = Some(edge.from);
                }
                EdgeKind::References | EdgeKind::Unresolved => {
                    uses[edge.from.0].push(edge.to);
                    used_by[edge.to.0].push(edge.from);
                }
            }
        }

        let kinds: Vec<NodeKind> = nodes.nodes.iter().map(Node::kind).collect();
        let cycles = find_measure_cycles(&kinds, &uses);
        for cycle in &cycles {
            let names: Vec<String> = cycle.iter().map(|id| nodes.get(*id).to_string()).collect();
            let chain = format!("{} -> {}", names.join(" -> "), names[0]);
            tracing::warn!(cycle = %chain, "measure reference cycle");
            diagnostics.push(
                Diagnostic::of(DiagnosticCode::MeasureCycle, format!("Measures reference each other in a cycle: {}", chain))
                    .with_subjects(names),
            );
        }

        let usage = compute_usage(&kinds, &uses, &used_by);

        tracing::debug!(
            report = %report.id,
            nodes = count,
            edges = edges.len(),
            diagnostics = diagnostics.len(),
            "sealed dependency graph"
        );

        DependencyGraph {
            report,
            measures,
            fields,
            nodes,
            edges,
            uses,
            used_by,
            children,
            parent,
            usage,
            cycles,
            diagnostics,
        }
    }
}

/// Sealed, read-only dependency graph of one report
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyGraph {
    report: Report,
    measures: MeasureTable,
    fields: FieldCatalog,
    nodes: NodeTable,
    edges: Vec<Edge>,
    uses: Vec<Vec<NodeId>>,
    used_by: Vec<Vec<NodeId>>,
    children: Vec<Vec<NodeId>>,
    parent: Vec<Option<NodeId>>,
    usage: Vec<Option<UsageState>>,
    cycles: Vec<Vec<NodeId>>,
    diagnostics: Vec<Diagnostic>,
}

impl DependencyGraph {
    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn measures(&self) -> &MeasureTable {
        &self.measures
    }

    pub fn fields(&self) -> &FieldCatalog {
        &self.fields
    }

    /// Non-fatal diagnostics collected from resolution to sealing
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut [Diagnostic] {
        &mut self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Node identity; panics on an id from another graph
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.nodes.iter().enumerate().map(|(index, node)| (NodeId(index), node))
    }

    /// Entity lookup by identity
    pub fn lookup(&self, node: &Node) -> Option<NodeId> {
        self.nodes.lookup(node)
    }

    pub fn report_node(&self) -> NodeId {
        NodeId(0)
    }

    pub fn page_node(&self, page: &str) -> Option<NodeId> {
        self.lookup(&Node::page(page))
    }

    pub fn visual_node(&self, page: &str, visual: &str) -> Option<NodeId> {
        self.lookup(&Node::visual(page, visual))
    }

    pub fn measure_node(&self, qualified_name: &str) -> Option<NodeId> {
        self.lookup(&Node::measure(qualified_name))
    }

    pub fn field_node(&self, qualified_name: &str) -> Option<NodeId> {
        self.lookup(&Node::field(qualified_name))
    }

    pub fn unresolved_node(&self, literal: &str) -> Option<NodeId> {
        self.lookup(&Node::unresolved(literal))
    }

    /// Find a measure, field or unresolved reference by its name
    pub fn resolve_name(&self, name: &str) -> Result<NodeId, GraphError> {
        self.measure_node(name)
            .or_else(|| self.field_node(name))
            .or_else(|| self.unresolved_node(name))
            .ok_or_else(|| GraphError::UnknownEntity(name.to_string()))
    }

    /// Entities whose references point at `id`
    pub fn used_by(&self, id: NodeId) -> &[NodeId] {
        &self.used_by[id.0]
    }

    /// Entities `id` references, unresolved placeholders included
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        &self.uses[id.0]
    }

    /// Contained pages of the report, or visuals of a page
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.children[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent[id.0]
    }

    /// Measures nothing references, in declaration order
    pub fn unused(&self) -> Vec<NodeId> {
        self.measure_nodes()
            .filter(|id| self.used_by[id.0].is_empty())
            .collect()
    }

    /// Measure nodes in declaration order
    pub fn measure_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.measures
            .iter()
            .filter_map(move |measure| self.measure_node(&measure.qualified_name))
    }

    /// Usage state of a measure node
    pub fn usage_state(&self, id: NodeId) -> Option<UsageState> {
        self.usage[id.0]
    }

    /// Field leaves reachable from a measure, visual, page or report
    ///
    /// Follows reference edges through measures, plus containment for pages
    /// and the report. Each field appears once, in discovery order.
    pub fn transitive_fields_of(&self, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let node = self.node(id);
        if !node.is_referrer() {
            return Err(GraphError::NotAReferrer {
                name: node.to_string(),
                kind: node.kind(),
            });
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([id]);
        let mut fields = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }

            if self.node(current).kind() == NodeKind::Field {
                fields.push(current);
                continue;
            }

            for &next in self.uses(current).iter().chain(self.children(current)) {
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }

        Ok(fields)
    }

    /// Everything that depends on `id` over reference edges, nearest first
    pub fn transitive_users_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut visited = HashSet::from([id]);
        let mut queue: VecDeque<NodeId> = self.used_by(id).iter().copied().collect();
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);

            for &user in self.used_by(current) {
                if !visited.contains(&user) {
                    queue.push_back(user);
                }
            }
        }

        result
    }

    /// Measure cycles found while sealing
    pub fn cycles(&self) -> &[Vec<NodeId>] {
        &self.cycles
    }

    /// Original text of an unresolved reference placeholder
    pub fn unresolved_literal(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::Unresolved { literal } => Some(literal),
            _ => None,
        }
    }

    pub fn unresolved_count(&self) -> usize {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Unresolved).count()
    }

    pub fn page(&self, id: NodeId) -> Option<&Page> {
        match self.node(id) {
            Node::Page { id } => self.report.pages.iter().find(|page| &page.id == id),
            _ => None,
        }
    }

    pub fn visual(&self, id: NodeId) -> Option<(&Page, &Visual)> {
        match self.node(id) {
            Node::Visual { page, id } => self
                .report
                .visuals()
                .find(|(p, v)| &p.id == page && &v.id == id),
            _ => None,
        }
    }

    pub fn measure(&self, id: NodeId) -> Option<&Measure> {
        match self.node(id) {
            Node::Measure { qualified_name } => self.measures.get(qualified_name),
            _ => None,
        }
    }

    pub fn field(&self, id: NodeId) -> Option<&Field> {
        match self.node(id) {
            Node::Field { qualified_name } => self.fields.get(qualified_name),
            _ => None,
        }
    }

    /// Display label: page display name, visual title, otherwise the identity
    pub fn label(&self, id: NodeId) -> String {
        if let Some(page) = self.page(id) {
            return page.display_name.clone();
        }
        if let Some((page, visual)) = self.visual(id) {
            let title = visual.title.as_deref().unwrap_or(&visual.id);
            return format!("{} / {}", page.display_name, title);
        }
        self.node(id).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbilens_core::Location;
    use pbilens_layout::{BindingSite, FieldBinding, MeasureDoc, Position, VisualKind};
    use pretty_assertions::assert_eq;

    fn measure(table: &str, name: &str, expression: &str) -> Measure {
        Measure {
            qualified_name: qualified_name(table, name),
            name: name.to_string(),
            table: table.to_string(),
            expression: expression.to_string(),
            data_category: None,
            format_string: None,
            doc: MeasureDoc::default(),
            reference_hints: Vec::new(),
            location: Location::new("Report/Layout"),
        }
    }

    fn visual(id: &str, bindings: &[&str]) -> Visual {
        Visual {
            id: id.to_string(),
            ordinal: 0,
            kind: VisualKind::BarChart,
            title: None,
            bindings: bindings
                .iter()
                .map(|b| FieldBinding::new(*b, BindingSite::Projection { role: "Values".into() }))
                .collect(),
            position: Position::default(),
            location: Location::new("Report/Layout"),
        }
    }

    fn layout(measures: Vec<Measure>, fields: &[(&str, &str)], visuals: Vec<Visual>) -> ResolvedLayout {
        let mut table = MeasureTable::new();
        for m in measures {
            table.insert(m).unwrap();
        }
        let mut catalog = FieldCatalog::new();
        for (t, c) in fields {
            catalog.declare(t, c, None);
        }

        ResolvedLayout {
            report: Report {
                id: "sales".to_string(),
                layout_id: None,
                pages: vec![Page {
                    id: "p1".to_string(),
                    display_name: "Overview".to_string(),
                    ordinal: 0,
                    declared_ordinal: None,
                    visible: true,
                    width: None,
                    height: None,
                    visuals,
                    filters: Vec::new(),
                    location: Location::new("Report/Layout"),
                }],
                filters: Vec::new(),
                location: Location::new("Report/Layout"),
            },
            measures: table,
            fields: catalog,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn containment_edges_form_a_tree() {
        let graph = GraphBuilder::new(layout(vec![], &[], vec![visual("v1", &[]), visual("v2", &[])])).seal();

        let page = graph.page_node("p1").unwrap();
        assert_eq!(graph.children(graph.report_node()), &[page]);
        assert_eq!(graph.children(page).len(), 2);
        assert_eq!(graph.parent(graph.visual_node("p1", "v2").unwrap()), Some(page));
    }

    #[test]
    fn bare_reference_resolves_to_unique_measure() {
        let mut builder = GraphBuilder::new(layout(
            vec![measure("Sales", "Total", "1"), measure("Sales", "Ratio", "[Total]")],
            &[],
            vec![],
        ));
        let ratio = builder.lookup(&Node::measure("Sales[Ratio]")).unwrap();
        builder.add_reference(ratio, Reference::bare("Total"));
        let graph = builder.seal();

        let total = graph.measure_node("Sales[Total]").unwrap();
        assert_eq!(graph.uses(ratio), &[total]);
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn ambiguous_bare_reference_stays_unresolved() {
        let mut builder = GraphBuilder::new(layout(
            vec![measure("Sales", "Total", "1"), measure("Budget", "Total", "2"), measure("Sales", "X", "[Total]")],
            &[],
            vec![],
        ));
        let x = builder.lookup(&Node::measure("Sales[X]")).unwrap();
        builder.add_reference(x, Reference::bare("Total"));
        let graph = builder.seal();

        let placeholder = graph.unresolved_node("[Total]").unwrap();
        assert_eq!(graph.uses(x), &[placeholder]);
        let codes: Vec<_> = graph.diagnostics().iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![DiagnosticCode::AmbiguousMeasureName, DiagnosticCode::UnresolvedReference]
        );
    }

    #[test]
    fn resolution_is_case_sensitive() {
        let mut builder = GraphBuilder::new(layout(vec![], &[("Sales", "Amount")], vec![visual("v1", &[])]));
        let v1 = builder.lookup(&Node::visual("p1", "v1")).unwrap();
        builder.add_reference(v1, Reference::qualified("sales", "amount"));
        let graph = builder.seal();

        assert!(graph.unresolved_node("sales[amount]").is_some());
        assert!(graph.used_by(graph.field_node("Sales[Amount]").unwrap()).is_empty());
    }

    #[test]
    fn known_table_columns_become_fields_by_default() {
        let mut builder = GraphBuilder::new(layout(
            vec![measure("Sales", "Margin", "SUM(Sales[Amount]) - SUM(Sales[Cost])")],
            &[("Sales", "Amount")],
            vec![],
        ));
        let margin = builder.lookup(&Node::measure("Sales[Margin]")).unwrap();
        builder.add_reference(margin, Reference::qualified("Sales", "Amount"));
        builder.add_reference(margin, Reference::qualified("Sales", "Cost"));
        builder.add_reference(margin, Reference::qualified("Other", "Cost"));
        let graph = builder.seal();

        let cost = graph.field_node("Sales[Cost]").unwrap();
        assert_eq!(graph.used_by(cost), &[margin]);
        assert!(graph.fields().contains("Sales[Cost]"));
        assert!(graph.unresolved_node("Sales[Cost]").is_none());
        assert!(graph.unresolved_node("Other[Cost]").is_some());

        let fields: Vec<String> = graph
            .transitive_fields_of(margin)
            .unwrap()
            .into_iter()
            .map(|id| graph.node(id).to_string())
            .collect();
        assert_eq!(fields, vec!["Sales[Amount]", "Sales[Cost]"]);
    }

    #[test]
    fn untrusted_tables_leave_undeclared_columns_unresolved() {
        let mut builder = GraphBuilder::new(layout(vec![], &[("Sales", "Amount")], vec![visual("v1", &[])]))
            .with_resolution(ResolutionConfig { trust_known_tables: false });
        let v1 = builder.lookup(&Node::visual("p1", "v1")).unwrap();
        builder.add_reference(v1, Reference::qualified("Sales", "Cost"));
        let graph = builder.seal();

        assert!(graph.field_node("Sales[Cost]").is_none());
        assert!(graph.unresolved_node("Sales[Cost]").is_some());
    }

    #[test]
    fn placeholder_keeps_the_text_as_written() {
        let mut builder = GraphBuilder::new(layout(vec![measure("Sales", "X", "SUM('Sales Data'[Missing])")], &[], vec![]));
        let x = builder.lookup(&Node::measure("Sales[X]")).unwrap();
        let extracted = pbilens_dax::ReferenceExtractor::new().extract("SUM('Sales Data'[Missing])");
        for reference in extracted.references {
            builder.add_reference(x, reference);
        }
        let graph = builder.seal();

        let placeholder = graph.uses(x)[0];
        assert_eq!(graph.unresolved_literal(placeholder), Some("'Sales Data'[Missing]"));
        assert_eq!(graph.resolve_name("'Sales Data'[Missing]"), Ok(placeholder));
    }

    #[test]
    fn qualified_self_references_are_dropped() {
        let mut builder = GraphBuilder::new(layout(vec![measure("Sales", "SelfRef", "'Sales'[SelfRef] + Sales[SelfRef]")], &[], vec![]));
        let self_ref = builder.lookup(&Node::measure("Sales[SelfRef]")).unwrap();
        let extracted = pbilens_dax::ReferenceExtractor::new().extract("'Sales'[SelfRef] + Sales[SelfRef] + [SelfRef]");
        for reference in extracted.references {
            builder.add_reference(self_ref, reference);
        }
        let graph = builder.seal();

        assert!(graph.uses(self_ref).is_empty());
        let codes: Vec<_> = graph.diagnostics().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::CyclicMeasure]);
    }

    #[test]
    fn duplicate_candidates_make_one_edge() {
        let mut builder = GraphBuilder::new(layout(vec![], &[("Sales", "Amount")], vec![visual("v1", &[])]));
        let v1 = builder.lookup(&Node::visual("p1", "v1")).unwrap();
        builder.add_reference(v1, Reference::qualified("Sales", "Amount"));
        builder.add_reference(v1, Reference::qualified("Sales", "Amount"));
        let graph = builder.seal();

        assert_eq!(graph.uses(v1).len(), 1);
    }

    #[test]
    fn longer_cycles_are_flagged_but_kept() {
        let mut builder = GraphBuilder::new(layout(
            vec![measure("M", "A", "[B]"), measure("M", "B", "[A]")],
            &[],
            vec![],
        ));
        let a = builder.lookup(&Node::measure("M[A]")).unwrap();
        let b = builder.lookup(&Node::measure("M[B]")).unwrap();
        builder.add_reference(a, Reference::bare("B"));
        builder.add_reference(b, Reference::bare("A"));
        let graph = builder.seal();

        assert_eq!(graph.uses(a), &[b]);
        assert_eq!(graph.uses(b), &[a]);
        assert_eq!(graph.cycles(), &[vec![a, b]]);
        assert_eq!(graph.diagnostics()[0].code, DiagnosticCode::MeasureCycle);
        assert_eq!(graph.diagnostics()[0].message, "Measures reference each other in a cycle: M[A] -> M[B] -> M[A]");
        assert_eq!(graph.usage_state(a), Some(UsageState::Dangling));
    }

    #[test]
    fn transitive_fields_reject_leaves() {
        let graph = GraphBuilder::new(layout(vec![], &[("Sales", "Amount")], vec![])).seal();
        let field = graph.field_node("Sales[Amount]").unwrap();

        let err = graph.transitive_fields_of(field).unwrap_err();
        assert_eq!(
            err,
            GraphError::NotAReferrer {
                name: "Sales[Amount]".to_string(),
                kind: NodeKind::Field
            }
        );
    }

    #[test]
    fn resolve_name_searches_measures_fields_and_placeholders() {
        let graph = GraphBuilder::new(layout(vec![measure("Sales", "Total", "1")], &[("Sales", "Amount")], vec![])).seal();

        assert_eq!(graph.resolve_name("Sales[Total]"), Ok(graph.measure_node("Sales[Total]").unwrap()));
        assert_eq!(graph.resolve_name("Sales[Amount]"), Ok(graph.field_node("Sales[Amount]").unwrap()));
        assert_eq!(
            graph.resolve_name("Nope[Nope]"),
            Err(GraphError::UnknownEntity("Nope[Nope]".to_string()))
        );
    }

    #[test]
    fn labels_prefer_display_names() {
        let mut titled = visual("v1", &[]);
        titled.title = Some("Revenue".to_string());
        let graph = GraphBuilder::new(layout(vec![], &[], vec![titled])).seal();

        assert_eq!(graph.label(graph.page_node("p1").unwrap()), "Overview");
        assert_eq!(graph.label(graph.visual_node("p1", "v1").unwrap()), "Overview / Revenue");
        assert_eq!(graph.label(graph.report_node()), "sales");
    }
}
