//! Structured documentation headers in measure expressions
//!
//! Teams document measures with a block comment at the top of the expression:
//!
//! ```text
//! /*
//! * Author: Jane Doe
//! * Description: Revenue per calendar month
//! * Last change: 2025/10/23
//! */
//! ```
//!
//! Headers are optional; a measure without one gets an empty `MeasureDoc`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Metadata read from a measure's comment header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureDoc {
    pub author: Option<String>,
    pub description: Option<String>,
    pub last_change: Option<String>,
}

impl MeasureDoc {
    /// Parse the first block comment that carries an `Author:` line
    pub fn parse(expression: &str) -> Self {
        let Some(header) = header_regex()
            .find_iter(expression)
            .map(|m| m.as_str())
            .find(|block| block.contains("Author:"))
        else {
            return Self::default();
        };

        Self {
            author: capture(field_regex(Field::Author), header),
            description: capture(field_regex(Field::Description), header),
            last_change: capture(field_regex(Field::LastChange), header),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.description.is_none() && self.last_change.is_none()
    }
}

#[derive(Clone, Copy)]
enum Field {
    Author,
    Description,
    LastChange,
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid header regex"))
}

fn field_regex(field: Field) -> &'static Regex {
    static AUTHOR: OnceLock<Regex> = OnceLock::new();
    static DESCRIPTION: OnceLock<Regex> = OnceLock::new();
    static LAST_CHANGE: OnceLock<Regex> = OnceLock::new();

    let (cell, label) = match field {
        Field::Author => (&AUTHOR, "Author"),
        Field::Description => (&DESCRIPTION, "Description"),
        Field::LastChange => (&LAST_CHANGE, "Last change"),
    };

    cell.get_or_init(|| {
        Regex::new(&format!(r"(?m)^[\s/*]*{}:[ \t]*(.*?)[ \t]*(?:\*/)?$", label))
            .expect("valid header field regex")
    })
}

fn capture(regex: &Regex, header: &str) -> Option<String> {
    regex
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}
