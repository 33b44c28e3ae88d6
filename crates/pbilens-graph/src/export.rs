//! Flat export rows over a sealed graph
//!
//! Writers live outside this crate; they pull rows from here and serialize
//! them however they like.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::graph::{DependencyGraph, NodeId, NodeKind};
use crate::usage::UsageState;

/// Whether a reference matched a known measure or field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    Resolved,
    Unresolved,
}

/// One (report, page, visual, referenced entity) tuple
///
/// Page and report filters produce rows without a visual; report filters
/// also have no page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualUsageRow {
    pub report: String,
    pub page: Option<String>,
    pub page_name: Option<String>,
    pub page_ordinal: Option<usize>,
    pub visual: Option<String>,
    pub visual_kind: Option<String>,
    pub visual_title: Option<String>,
    /// Qualified name, or the original text when unresolved
    pub reference: String,
    pub target_kind: NodeKind,
    pub status: ReferenceStatus,
}

/// One (measure, referenced entity) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureUsageRow {
    pub report: String,
    pub measure: String,
    pub reference: String,
    pub target_kind: NodeKind,
    pub status: ReferenceStatus,
}

/// Per-measure overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSummary {
    pub report: String,
    pub table: String,
    pub name: String,
    pub qualified_name: String,
    pub usage_state: UsageState,
    pub expression: String,
    /// Everything the measure references, unresolved text included
    pub references: Vec<String>,
    /// Direct referrers
    pub referenced_by: Vec<String>,
    /// Display names of the pages that depend on the measure, directly or through other measures
    pub pages: Vec<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub last_change: Option<String>,
    pub data_category: Option<String>,
    pub format_string: Option<String>,
}

/// Per-page overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub report: String,
    pub page: String,
    pub name: String,
    pub ordinal: usize,
    pub visible: bool,
    pub visual_count: usize,
    /// Measures bound on the page's visuals or filters
    pub used_measures: Vec<String>,
    /// Fields bound on the page's visuals or filters
    pub used_fields: Vec<String>,
    /// Fields reached through measures as well
    pub underlying_fields: Vec<String>,
    pub visual_titles: Vec<String>,
}

impl DependencyGraph {
    fn status_of(&self, target: NodeId) -> ReferenceStatus {
        if self.node(target).kind() == NodeKind::Unresolved {
            ReferenceStatus::Unresolved
        } else {
            ReferenceStatus::Resolved
        }
    }

    /// Rows for visual bindings and filters, in page order then file order
    pub fn visual_usage_rows(&self) -> Vec<VisualUsageRow> {
        let report = &self.report().id;
        let mut rows = Vec::new();

        for page in &self.report().pages {
            let Some(page_node) = self.page_node(&page.id) else {
                continue;
            };

            for &target in self.uses(page_node) {
                rows.push(VisualUsageRow {
                    report: report.clone(),
                    page: Some(page.id.clone()),
                    page_name: Some(page.display_name.clone()),
                    page_ordinal: Some(page.ordinal),
                    visual: None,
                    visual_kind: None,
                    visual_title: None,
                    reference: self.node(target).to_string(),
                    target_kind: self.node(target).kind(),
                    status: self.status_of(target),
                });
            }

            for visual in &page.visuals {
                let Some(visual_node) = self.visual_node(&page.id, &visual.id) else {
                    continue;
                };
                for &target in self.uses(visual_node) {
                    rows.push(VisualUsageRow {
                        report: report.clone(),
                        page: Some(page.id.clone()),
                        page_name: Some(page.display_name.clone()),
                        page_ordinal: Some(page.ordinal),
                        visual: Some(visual.id.clone()),
                        visual_kind: Some(visual.kind.as_tag().to_string()),
                        visual_title: visual.title.clone(),
                        reference: self.node(target).to_string(),
                        target_kind: self.node(target).kind(),
                        status: self.status_of(target),
                    });
                }
            }
        }

        for &target in self.uses(self.report_node()) {
            rows.push(VisualUsageRow {
                report: report.clone(),
                page: None,
                page_name: None,
                page_ordinal: None,
                visual: None,
                visual_kind: None,
                visual_title: None,
                reference: self.node(target).to_string(),
                target_kind: self.node(target).kind(),
                status: self.status_of(target),
            });
        }

        rows
    }

    /// Rows for measure references, in declaration order
    pub fn measure_usage_rows(&self) -> Vec<MeasureUsageRow> {
        let report = &self.report().id;
        self.measure_nodes()
            .flat_map(|measure| {
                self.uses(measure).iter().map(move |&target| MeasureUsageRow {
                    report: report.clone(),
                    measure: self.node(measure).to_string(),
                    reference: self.node(target).to_string(),
                    target_kind: self.node(target).kind(),
                    status: self.status_of(target),
                })
            })
            .collect()
    }

    /// One summary per measure, in declaration order
    pub fn measure_summaries(&self) -> Vec<MeasureSummary> {
        self.measure_nodes()
            .filter_map(|id| {
                let measure = self.measure(id)?;
                Some(MeasureSummary {
                    report: self.report().id.clone(),
                    table: measure.table.clone(),
                    name: measure.name.clone(),
                    qualified_name: measure.qualified_name.clone(),
                    usage_state: self.usage_state(id).unwrap_or(UsageState::Unreferenced),
                    expression: measure.expression.clone(),
                    references: self.uses(id).iter().map(|&t| self.node(t).to_string()).collect(),
                    referenced_by: self.used_by(id).iter().map(|&u| self.node(u).to_string()).collect(),
                    pages: self.pages_depending_on(id),
                    author: measure.doc.author.clone(),
                    description: measure.doc.description.clone(),
                    last_change: measure.doc.last_change.clone(),
                    data_category: measure.data_category.clone(),
                    format_string: measure.format_string.clone(),
                })
            })
            .collect()
    }

    /// One summary per page, in page order
    pub fn page_summaries(&self) -> Vec<PageSummary> {
        self.report()
            .pages
            .iter()
            .filter_map(|page| {
                let page_node = self.page_node(&page.id)?;

                let mut used_measures = Vec::new();
                let mut used_fields = Vec::new();
                let direct = std::iter::once(page_node)
                    .chain(self.children(page_node).iter().copied())
                    .flat_map(|referrer| self.uses(referrer).iter().copied());
                for target in direct {
                    let list = match self.node(target).kind() {
                        NodeKind::Measure => &mut used_measures,
                        NodeKind::Field => &mut used_fields,
                        _ => continue,
                    };
                    let name = self.node(target).to_string();
                    if !list.contains(&name) {
                        list.push(name);
                    }
                }

                let underlying_fields = self
                    .transitive_fields_of(page_node)
                    .map(|ids| ids.into_iter().map(|f| self.node(f).to_string()).collect())
                    .unwrap_or_default();

                Some(PageSummary {
                    report: self.report().id.clone(),
                    page: page.id.clone(),
                    name: page.display_name.clone(),
                    ordinal: page.ordinal,
                    visible: page.visible,
                    visual_count: page.visuals.len(),
                    used_measures,
                    used_fields,
                    underlying_fields,
                    visual_titles: page.visual_titles().into_iter().map(str::to_string).collect(),
                })
            })
            .collect()
    }

    /// Display names of pages whose visuals or filters reach `id`, in page order
    fn pages_depending_on(&self, id: NodeId) -> Vec<String> {
        let ordinals: BTreeSet<usize> = self
            .transitive_users_of(id)
            .into_iter()
            .filter_map(|user| match self.node(user).kind() {
                NodeKind::Page => self.page(user).map(|page| page.ordinal),
                NodeKind::Visual => self.visual(user).map(|(page, _)| page.ordinal),
                _ => None,
            })
            .collect();

        self.report()
            .pages
            .iter()
            .filter(|page| ordinals.contains(&page.ordinal))
            .map(|page| page.display_name.clone())
            .collect()
    }
}
