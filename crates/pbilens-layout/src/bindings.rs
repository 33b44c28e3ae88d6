//! Field binding discovery
//!
//! Visuals name the fields and measures they use in several places, depending
//! on the layout version:
//! - `singleVisual.projections`: role -> list of `{queryRef}`
//! - `singleVisual.prototypeQuery.Select[].Name`
//! - `dataTransforms.queryMetadata.Select[].Name`, or `dataTransforms.selects[].queryName`
//!   when `queryMetadata` is null
//! - structural `{Expression: {SourceRef: ...}, Property}` nodes in filters
//!
//! Structural nodes under a `Column` key also tell us which fields exist.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::model::{BindingSite, FieldBinding};

/// What kind of object a structural reference node points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralKind {
    Column,
    Measure,
    Aggregation,
    Other,
}

/// A `{Expression: {SourceRef}, Property}` node resolved to its table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralRef {
    pub entity: String,
    pub property: String,
    pub kind: StructuralKind,
}

impl StructuralRef {
    /// Query ref spelling (`Table.Property`)
    pub fn query_ref(&self) -> String {
        format!("{}.{}", self.entity, self.property)
    }
}

/// Bindings listed under `projections`, grouped by role
///
/// Also returns the role of every entry that has no `queryRef`.
pub fn projection_bindings(single_visual: &Value) -> (Vec<FieldBinding>, Vec<String>) {
    let Some(projections) = single_visual.get("projections").and_then(Value::as_object) else {
        return (Vec::new(), Vec::new());
    };

    let mut bindings = Vec::new();
    let mut unnamed = Vec::new();
    for (role, entries) in projections {
        let Some(entries) = entries.as_array() else {
            continue;
        };
        for entry in entries {
            match entry.get("queryRef").and_then(Value::as_str) {
                Some(query_ref) => {
                    bindings.push(FieldBinding::new(query_ref, BindingSite::Projection { role: role.clone() }))
                }
                None => unnamed.push(role.clone()),
            }
        }
    }
    (bindings, unnamed)
}

/// Bindings named in the prototype query's select list
pub fn prototype_query_bindings(single_visual: &Value) -> Vec<FieldBinding> {
    single_visual
        .get("prototypeQuery")
        .and_then(|query| query.get("Select"))
        .and_then(Value::as_array)
        .map(|selects| {
            selects
                .iter()
                .filter_map(|select| select.get("Name").and_then(Value::as_str))
                .map(|name| FieldBinding::new(name, BindingSite::PrototypeQuery))
                .collect()
        })
        .unwrap_or_default()
}

/// Bindings named in a decoded `dataTransforms` document
pub fn data_transform_bindings(data_transforms: &Value) -> Vec<FieldBinding> {
    let names: Vec<&str> = match data_transforms.get("queryMetadata") {
        Some(metadata) if !metadata.is_null() => metadata
            .get("Select")
            .and_then(Value::as_array)
            .map(|selects| selects.iter().filter_map(|s| s.get("Name").and_then(Value::as_str)).collect())
            .unwrap_or_default(),
        _ => data_transforms
            .get("selects")
            .and_then(Value::as_array)
            .map(|selects| selects.iter().filter_map(|s| s.get("queryName").and_then(Value::as_str)).collect())
            .unwrap_or_default(),
    };

    names
        .into_iter()
        .map(|name| FieldBinding::new(name, BindingSite::DataTransforms))
        .collect()
}

/// Bindings of a decoded filter list (visual, page or report level)
///
/// Only each filter's `expression` names the filtered field; the `filter`
/// body repeats it through aliases.
pub fn filter_bindings(filters: &Value) -> Vec<FieldBinding> {
    let mut bindings = Vec::new();
    let Some(filters) = filters.as_array() else {
        return bindings;
    };

    for filter in filters {
        let Some(expression) = filter.get("expression") else {
            continue;
        };
        for reference in structural_refs(expression) {
            bindings.push(FieldBinding::new(reference.query_ref(), BindingSite::Filter));
        }
    }
    bindings
}

/// Every structural reference node in a subtree
///
/// `SourceRef.Source` aliases are resolved through the nearest enclosing
/// `From` list; `SourceRef.Entity` is taken as is.
pub fn structural_refs(value: &Value) -> Vec<StructuralRef> {
    let mut found = Vec::new();
    walk(value, &HashMap::new(), None, &mut found);
    found
}

fn walk(value: &Value, aliases: &HashMap<String, String>, parent_key: Option<&str>, found: &mut Vec<StructuralRef>) {
    match value {
        Value::Object(map) => {
            let scoped;
            let aliases = match from_aliases(map) {
                Some(local) if !local.is_empty() => {
                    let mut merged = aliases.clone();
                    merged.extend(local);
                    scoped = merged;
                    &scoped
                }
                _ => aliases,
            };

            if let Some(reference) = reference_node(map, aliases, parent_key) {
                found.push(reference);
            }

            for (key, child) in map {
                walk(child, aliases, Some(key.as_str()), found);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, aliases, parent_key, found);
            }
        }
        _ => {}
    }
}

fn from_aliases(map: &Map<String, Value>) -> Option<HashMap<String, String>> {
    let from = map.get("From")?.as_array()?;
    Some(
        from.iter()
            .filter_map(|entry| {
                let name = entry.get("Name")?.as_str()?;
                let entity = entry.get("Entity")?.as_str()?;
                Some((name.to_string(), entity.to_string()))
            })
            .collect(),
    )
}

fn reference_node(
    map: &Map<String, Value>,
    aliases: &HashMap<String, String>,
    parent_key: Option<&str>,
) -> Option<StructuralRef> {
    let property = map.get("Property")?.as_str()?;
    let source_ref = map.get("Expression")?.get("SourceRef")?;

    let entity = match source_ref.get("Entity").and_then(Value::as_str) {
        Some(entity) => entity.to_string(),
        None => {
            let alias = source_ref.get("Source")?.as_str()?;
            aliases.get(alias)?.clone()
        }
    };

    let kind = match parent_key {
        Some("Column") => StructuralKind::Column,
        Some("Measure") => StructuralKind::Measure,
        Some("Aggregation") => StructuralKind::Aggregation,
        _ => StructuralKind::Other,
    };

    Some(StructuralRef {
        entity,
        property: property.to_string(),
        kind,
    })
}

/// Title text from the visual's formatting objects
///
/// Literal values are stored as expression literals, e.g. `'Revenue by Region'`.
pub fn visual_title(single_visual: &Value) -> Option<String> {
    let value = single_visual
        .get("vcObjects")?
        .get("title")?
        .as_array()?
        .iter()
        .find_map(|entry| entry.pointer("/properties/text/expr/Literal/Value"))?
        .as_str()?;

    let text = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
        .replace("''", "'");

    Some(text)
}
