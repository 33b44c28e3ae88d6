//! Visual binding text
//!
//! Query refs look like `Sales.Amount`, `Sum(Sales.Amount)` or
//! `Divide(Sum(Sales.Revenue), Count(Orders.Id))`. Wrapper calls are peeled
//! off and every argument is reduced to a reference. Text already in bracket
//! form goes through the expression scan.
//!
//! A reference keeps the text of the outermost single-argument wrapper
//! around it as its source, so `Sum(Sales.Amount)` stays `Sum(Sales.Amount)`.

use crate::references::{normalize_whitespace, ExtractedReferences, Reference, ReferenceExtractor};

/// Aggregations applied to a single field
const AGGREGATE_WRAPPERS: &[&str] = &[
    "Avg",
    "Count",
    "CountNonNull",
    "Max",
    "Median",
    "Min",
    "StandardDeviation",
    "Sum",
];

/// Wrappers whose arguments each name a field or measure
const COMPOUND_WRAPPERS: &[&str] = &["Divide", "ScopedEval"];

/// Reduce one binding string to its reference candidates
pub fn binding_references(text: &str, extractor: &ReferenceExtractor) -> ExtractedReferences {
    let mut out = ExtractedReferences::default();
    collect(text, None, extractor, &mut out);
    out
}

fn collect(text: &str, source: Option<&str>, extractor: &ReferenceExtractor, out: &mut ExtractedReferences) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    if let Some((function, arguments)) = split_call(text) {
        if !AGGREGATE_WRAPPERS.contains(&function) && !COMPOUND_WRAPPERS.contains(&function) {
            tracing::debug!(function, binding = text, "unrecognized wrapper in binding");
        }
        let arguments = split_arguments(arguments);
        let source = if arguments.len() == 1 { source.or(Some(text)) } else { None };
        for argument in arguments {
            collect(argument, source, extractor, out);
        }
        return;
    }

    if text.contains('[') {
        let mut extracted = extractor.extract(text);
        if let (Some(source), [only]) = (source, extracted.references.as_mut_slice()) {
            only.source = source.to_string();
        }
        out.merge(extracted);
        return;
    }

    let source = source.unwrap_or(text);
    // the table name ends at the first dot, column names may contain dots
    let reference = match text.split_once('.') {
        Some((table, name)) if !table.trim().is_empty() && !name.trim().is_empty() => {
            Reference::qualified(normalize_whitespace(table), normalize_whitespace(name))
        }
        _ => Reference::bare(normalize_whitespace(text)),
    };
    out.push(reference.with_source(source));
}

/// Split `Name(arguments)` when the whole text is one call
fn split_call(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    let function = &text[..open];
    let mut chars = function.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let mut depth = 0usize;
    for (offset, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let close = open + offset;
                    return (close == text.len() - 1).then(|| (function, &text[open + 1..close]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Split call arguments on top-level commas
fn split_arguments(arguments: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;

    for (offset, ch) in arguments.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '(' | '[' if !in_string => depth += 1,
            ')' | ']' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(&arguments[start..offset]);
                start = offset + 1;
            }
            _ => {}
        }
    }
    parts.push(&arguments[start..]);
    parts
}
