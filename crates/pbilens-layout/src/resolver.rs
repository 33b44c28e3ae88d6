//! Entity resolution
//!
//! Walks the generic layout tree and produces the typed report tree plus the
//! global measure table and field catalog. Missing optional attributes fall
//! back to defaults; each defaulted identifier, undecodable sub-document or
//! unknown visual type leaves a diagnostic behind.

use pbilens_core::{qualified_name, Diagnostic, DiagnosticCode, Location};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::bindings::{
    data_transform_bindings, filter_bindings, projection_bindings, prototype_query_bindings,
    structural_refs, visual_title, StructuralKind,
};
use crate::document::RawDocument;
use crate::error::LayoutError;
use crate::measure_doc::MeasureDoc;
use crate::model::{
    merge_bindings, FieldBinding, FieldCatalog, Measure, MeasureTable, Page, Position, Report,
    Visual, VisualKind,
};

const UNTITLED_PAGE: &str = "Untitled Page";

/// Output of the resolver for one report
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayout {
    pub report: Report,
    pub measures: MeasureTable,
    pub fields: FieldCatalog,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolves a raw layout document into entities
pub struct EntityResolver<'a> {
    document: &'a RawDocument,
    measures: MeasureTable,
    fields: FieldCatalog,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> EntityResolver<'a> {
    pub fn new(document: &'a RawDocument) -> Self {
        Self {
            document,
            measures: MeasureTable::new(),
            fields: FieldCatalog::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Resolve a document in one call
    pub fn resolve(document: &'a RawDocument, report_name: &str) -> Result<ResolvedLayout, LayoutError> {
        Self::new(document).run(report_name)
    }

    /// Resolve the report tree, consuming the resolver
    pub fn run(mut self, report_name: &str) -> Result<ResolvedLayout, LayoutError> {
        let document = self.document;
        let root_location = Location::with_pointer(document.file.clone(), "");

        let root = document.tree.as_object().ok_or_else(|| LayoutError::SchemaMismatch {
            file: document.file.clone(),
            element: "root".to_string(),
            message: "the layout root is not a mapping".to_string(),
        })?;

        let sections = root
            .get("sections")
            .and_then(Value::as_array)
            .ok_or_else(|| LayoutError::SchemaMismatch {
                file: document.file.clone(),
                element: "sections".to_string(),
                message: "the page collection 'sections' is missing or not a sequence".to_string(),
            })?;

        let mut filters = Vec::new();
        if let Some(config) = self.embedded(root, "config", &root_location) {
            self.collect_measures(&config, &root_location.child("config").embedded())?;
        }
        if let Some(report_filters) = self.embedded(root, "filters", &root_location) {
            self.declare_structural_fields(&report_filters);
            merge_bindings(&mut filters, filter_bindings(&report_filters));
        }

        let mut pages = Vec::new();
        let mut page_ids = HashSet::new();
        let sections_location = root_location.child("sections");
        for (index, section) in sections.iter().enumerate() {
            let location = sections_location.child(index);
            let Some(section) = section.as_object() else {
                self.diagnostics.push(
                    Diagnostic::of(DiagnosticCode::Warning, "section entry is not a mapping and was skipped")
                        .with_location(location),
                );
                continue;
            };

            let page = self.resolve_page(section, pages.len(), location, &mut page_ids)?;
            tracing::debug!(page = %page.id, visuals = page.visuals.len(), "resolved page");
            pages.push(page);
        }

        let report = Report {
            id: report_name.to_string(),
            layout_id: root.get("id").and_then(Value::as_i64),
            pages,
            filters,
            location: root_location,
        };

        Ok(ResolvedLayout {
            report,
            measures: self.measures,
            fields: self.fields,
            diagnostics: self.diagnostics,
        })
    }

    fn resolve_page(
        &mut self,
        section: &Map<String, Value>,
        ordinal: usize,
        location: Location,
        page_ids: &mut HashSet<String>,
    ) -> Result<Page, LayoutError> {
        let raw_id = section.get("name").and_then(Value::as_str).filter(|id| !id.is_empty());
        let id = match raw_id {
            Some(id) => id.to_string(),
            None => {
                let synthesized = format!("section-{}", ordinal);
                self.diagnostics.push(
                    Diagnostic::of(
                        DiagnosticCode::MissingIdentifier,
                        format!("page without a name, using '{}'", synthesized),
                    )
                    .with_location(location.clone()),
                );
                synthesized
            }
        };
        let id = self.unique_id(id, page_ids, &location);

        let display_name = match section.get("displayName").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                self.diagnostics.push(
                    Diagnostic::of(
                        DiagnosticCode::MissingIdentifier,
                        format!("page '{}' has no display name, using '{}'", id, UNTITLED_PAGE),
                    )
                    .with_location(location.clone())
                    .with_subjects(vec![id.clone()]),
                );
                UNTITLED_PAGE.to_string()
            }
        };

        let mut visible = true;
        if let Some(config) = self.embedded(section, "config", &location) {
            // visibility 1 marks a hidden page
            visible = config.get("visibility").and_then(Value::as_i64) != Some(1);
            self.collect_measures(&config, &location.child("config").embedded())?;
        }

        let mut filters = Vec::new();
        if let Some(page_filters) = self.embedded(section, "filters", &location) {
            self.declare_structural_fields(&page_filters);
            merge_bindings(&mut filters, filter_bindings(&page_filters));
        }

        let mut visuals = Vec::new();
        let containers_location = location.child("visualContainers");
        match section.get("visualContainers") {
            Some(Value::Array(containers)) => {
                let mut visual_ids = HashSet::new();
                for (index, container) in containers.iter().enumerate() {
                    let container_location = containers_location.child(index);
                    let Some(container) = container.as_object() else {
                        self.diagnostics.push(
                            Diagnostic::of(DiagnosticCode::Warning, "visual container is not a mapping and was skipped")
                                .with_location(container_location),
                        );
                        continue;
                    };
                    let visual = self.resolve_visual(container, visuals.len(), container_location, &mut visual_ids)?;
                    visuals.push(visual);
                }
            }
            None | Some(Value::Null) => {}
            Some(_) => {
                self.diagnostics.push(
                    Diagnostic::of(DiagnosticCode::Warning, "'visualContainers' is not a sequence, page has no visuals")
                        .with_location(containers_location),
                );
            }
        }

        Ok(Page {
            id,
            display_name,
            ordinal,
            declared_ordinal: section.get("ordinal").and_then(Value::as_i64),
            visible,
            width: section.get("width").and_then(Value::as_f64),
            height: section.get("height").and_then(Value::as_f64),
            visuals,
            filters,
            location,
        })
    }

    fn resolve_visual(
        &mut self,
        container: &Map<String, Value>,
        ordinal: usize,
        location: Location,
        visual_ids: &mut HashSet<String>,
    ) -> Result<Visual, LayoutError> {
        let position = Position {
            x: container.get("x").and_then(Value::as_f64),
            y: container.get("y").and_then(Value::as_f64),
            z: container.get("z").and_then(Value::as_f64),
            width: container.get("width").and_then(Value::as_f64),
            height: container.get("height").and_then(Value::as_f64),
        };

        let config = self.embedded(container, "config", &location).unwrap_or(Value::Null);
        let raw_id = config.get("name").and_then(Value::as_str).filter(|id| !id.is_empty());
        let id = match raw_id {
            Some(id) => id.to_string(),
            None => {
                let synthesized = format!("visual-{}", ordinal);
                self.diagnostics.push(
                    Diagnostic::of(
                        DiagnosticCode::MissingIdentifier,
                        format!("visual without a name, using '{}'", synthesized),
                    )
                    .with_location(location.clone()),
                );
                synthesized
            }
        };
        let id = self.unique_id(id, visual_ids, &location);

        let single_visual = config.get("singleVisual").filter(|v| v.is_object());
        let kind = match single_visual {
            Some(single_visual) => {
                let tag = single_visual.get("visualType").and_then(Value::as_str).unwrap_or("");
                VisualKind::from_tag(tag)
            }
            None if config.get("singleVisualGroup").is_some() => VisualKind::Group,
            None => VisualKind::Unknown(String::new()),
        };
        if let VisualKind::Unknown(tag) = &kind {
            let message = if tag.is_empty() {
                format!("visual '{}' has no type tag", id)
            } else {
                format!("visual '{}' has unknown type '{}'", id, tag)
            };
            self.diagnostics.push(
                Diagnostic::of(DiagnosticCode::UnknownVisualKind, message)
                    .with_location(location.clone())
                    .with_subjects(vec![id.clone()]),
            );
        }

        let mut bindings: Vec<FieldBinding> = Vec::new();
        let mut title = None;
        if let Some(single_visual) = single_visual {
            let (projected, unnamed_roles) = projection_bindings(single_visual);
            for role in unnamed_roles {
                self.diagnostics.push(
                    Diagnostic::of(
                        DiagnosticCode::MissingIdentifier,
                        format!("projection in role '{}' of visual '{}' has no queryRef and was skipped", role, id),
                    )
                    .with_location(location.clone())
                    .with_subjects(vec![id.clone()]),
                );
            }
            merge_bindings(&mut bindings, projected);
            merge_bindings(&mut bindings, prototype_query_bindings(single_visual));
            if let Some(query) = single_visual.get("prototypeQuery") {
                self.declare_structural_fields(query);
            }
            title = visual_title(single_visual);
        }

        if let Some(data_transforms) = self.embedded(container, "dataTransforms", &location) {
            self.declare_structural_fields(&data_transforms);
            merge_bindings(&mut bindings, data_transform_bindings(&data_transforms));
        }

        if let Some(filters) = self.embedded(container, "filters", &location) {
            self.declare_structural_fields(&filters);
            merge_bindings(&mut bindings, filter_bindings(&filters));
        }

        if !config.is_null() {
            self.collect_measures(&config, &location.child("config").embedded())?;
        }

        Ok(Visual {
            id,
            ordinal,
            kind,
            title,
            bindings,
            position,
            location,
        })
    }

    /// Scan a decoded config document for `modelExtensions` measure declarations
    fn collect_measures(&mut self, config: &Value, location: &Location) -> Result<(), LayoutError> {
        let Some(extensions) = config.get("modelExtensions").and_then(Value::as_array) else {
            return Ok(());
        };

        let extensions_location = location.child("modelExtensions");
        for (ext_index, extension) in extensions.iter().enumerate() {
            let Some(entities) = extension.get("entities").and_then(Value::as_array) else {
                continue;
            };

            let entities_location = extensions_location.child(ext_index).child("entities");
            for (entity_index, entity) in entities.iter().enumerate() {
                let entity_location = entities_location.child(entity_index);
                let Some(table) = entity.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
                    self.diagnostics.push(
                        Diagnostic::of(DiagnosticCode::IncompleteMeasure, "model extension entity without a name was skipped")
                            .with_location(entity_location),
                    );
                    continue;
                };
                self.fields.declare_table(table);

                if let Some(columns) = entity.get("columns").and_then(Value::as_array) {
                    for (column_index, column) in columns.iter().enumerate() {
                        match column.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
                            Some(name) => {
                                let category = column.get("dataCategory").and_then(Value::as_str);
                                self.fields.declare(table, name, category);
                            }
                            None => self.diagnostics.push(
                                Diagnostic::of(
                                    DiagnosticCode::MissingIdentifier,
                                    format!("column of table '{}' without a name was skipped", table),
                                )
                                .with_location(entity_location.child("columns").child(column_index)),
                            ),
                        }
                    }
                }

                let Some(measures) = entity.get("measures").and_then(Value::as_array) else {
                    continue;
                };
                let measures_location = entity_location.child("measures");
                for (measure_index, declaration) in measures.iter().enumerate() {
                    let measure_location = measures_location.child(measure_index);
                    if let Some(measure) = self.read_measure(table, declaration, measure_location) {
                        tracing::debug!(measure = %measure.qualified_name, "declared measure");
                        self.measures.insert(measure)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn read_measure(&mut self, table: &str, declaration: &Value, location: Location) -> Option<Measure> {
        let name = declaration.get("name").and_then(Value::as_str).filter(|n| !n.is_empty());
        let expression = declaration.get("expression").and_then(Value::as_str);

        let (Some(name), Some(expression)) = (name, expression) else {
            self.diagnostics.push(
                Diagnostic::of(
                    DiagnosticCode::IncompleteMeasure,
                    format!("measure declaration in table '{}' lacks a name or expression and was skipped", table),
                )
                .with_location(location),
            );
            return None;
        };

        let mut reference_hints = Vec::new();
        if let Some(hints) = declaration.pointer("/references/measures").and_then(Value::as_array) {
            for (hint_index, hint) in hints.iter().enumerate() {
                let Some(hint_name) = hint.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
                    self.diagnostics.push(
                        Diagnostic::of(
                            DiagnosticCode::MissingIdentifier,
                            format!("measure reference hint of '{}' without a name was skipped", qualified_name(table, name)),
                        )
                        .with_location(location.child("references").child("measures").child(hint_index)),
                    );
                    continue;
                };
                let hint_table = hint.get("entity").and_then(Value::as_str).unwrap_or("");
                reference_hints.push(qualified_name(hint_table, hint_name));
            }
        }

        Some(Measure {
            qualified_name: qualified_name(table, name),
            name: name.to_string(),
            table: table.to_string(),
            expression: expression.to_string(),
            data_category: declaration.get("dataCategory").and_then(Value::as_str).map(str::to_string),
            format_string: declaration.get("formatString").and_then(Value::as_str).map(str::to_string),
            doc: MeasureDoc::parse(expression),
            reference_hints,
            location,
        })
    }

    /// Record tables and columns named by structural reference nodes
    fn declare_structural_fields(&mut self, value: &Value) {
        for reference in structural_refs(value) {
            match reference.kind {
                StructuralKind::Column => self.fields.declare(&reference.entity, &reference.property, None),
                _ => self.fields.declare_table(&reference.entity),
            }
        }
    }

    /// Decode a string-encoded sub-document, or take an already structured one
    fn embedded(&mut self, container: &Map<String, Value>, key: &str, location: &Location) -> Option<Value> {
        match container.get(key)? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => Some(value),
                Err(e) => {
                    self.diagnostics.push(
                        Diagnostic::of(
                            DiagnosticCode::EmbeddedJsonInvalid,
                            format!("'{}' could not be decoded and was ignored: {}", key, e),
                        )
                        .with_location(location.child(key)),
                    );
                    None
                }
            },
            other => Some(other.clone()),
        }
    }

    /// Disambiguate a repeated identifier by appending `#n`
    fn unique_id(&mut self, id: String, seen: &mut HashSet<String>, location: &Location) -> String {
        if seen.insert(id.clone()) {
            return id;
        }

        let mut n = 2;
        let unique = loop {
            let candidate = format!("{}#{}", id, n);
            if !seen.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        seen.insert(unique.clone());

        self.diagnostics.push(
            Diagnostic::of(
                DiagnosticCode::DuplicateIdentifier,
                format!("identifier '{}' is repeated, renamed to '{}'", id, unique),
            )
            .with_location(location.clone())
            .with_subjects(vec![id, unique.clone()]),
        );
        unique
    }
}
