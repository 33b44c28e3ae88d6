//! Qualified names
//!
//! Fields and measures are addressed as `Table[Name]`, the convention of the
//! expression language itself.

/// Build the qualified name of a table-scoped field or measure
pub fn qualified_name(table: &str, name: &str) -> String {
    format!("{}[{}]", table, name)
}

/// Split `Table[Name]` into its parts
///
/// Returns `None` for bare `[Name]` references and for text that is not in
/// bracket form.
pub fn split_qualified(qualified: &str) -> Option<(&str, &str)> {
    let open = qualified.find('[')?;
    let inner = qualified.strip_suffix(']')?;
    if open == 0 {
        return None;
    }

    Some((&qualified[..open], &inner[open + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_splits() {
        let q = qualified_name("Sales", "Total Revenue");
        assert_eq!(q, "Sales[Total Revenue]");
        assert_eq!(split_qualified(&q), Some(("Sales", "Total Revenue")));
    }

    #[test]
    fn bare_reference_has_no_table() {
        assert_eq!(split_qualified("[Total Revenue]"), None);
        assert_eq!(split_qualified("Sales"), None);
    }
}
