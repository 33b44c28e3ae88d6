//! Bracket reference scanning
//!
//! Expression references follow one bracketing convention:
//! - `Table[Name]` and `'Quoted Table'[Name]` name a column or measure of a table
//! - `[Name]` names a measure (or a column of the row context) without a table
//!
//! Inside brackets `]]` stands for a literal `]`; inside quoted table names
//! `''` stands for a literal `'`. A table prefix only counts when the opening
//! bracket follows it directly.

use pbilens_core::{qualified_name, Diagnostic, DiagnosticCode, ExtractionConfig};
use serde::{Deserialize, Serialize};

/// One reference candidate found in expression text
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// Table prefix, absent for bare `[Name]` references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Whitespace-normalized bracket content
    pub name: String,

    /// Text the reference was read from, exactly as written
    pub source: String,
}

impl Reference {
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        let (table, name) = (table.into(), name.into());
        Self {
            source: qualified_name(&table, &name),
            table: Some(table),
            name,
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: format!("[{}]", name),
            table: None,
            name,
        }
    }

    /// Replace the recorded source text
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Same table and name, whatever the spelling
    pub fn same_target(&self, other: &Reference) -> bool {
        self.table == other.table && self.name == other.name
    }

    pub fn is_bare(&self) -> bool {
        self.table.is_none()
    }

    /// Canonical `Table[Name]` or `[Name]` spelling
    pub fn literal(&self) -> String {
        match &self.table {
            Some(table) => qualified_name(table, &self.name),
            None => format!("[{}]", self.name),
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.literal())
    }
}

/// Lexical problems the scan recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// `[` without a closing `]` on the same line
    UnterminatedBracket,

    /// `]` outside any bracket
    UnmatchedClosingBracket,

    /// `'` without a closing `'`
    UnterminatedQuotedTable,

    /// `"` without a closing `"`
    UnterminatedString,

    /// `/*` without a closing `*/`
    UnterminatedComment,

    /// `[]` or brackets holding only whitespace
    EmptyBracket,

    /// Parentheses do not pair up
    UnbalancedParentheses,
}

impl WarningKind {
    fn describe(&self) -> &'static str {
        match self {
            Self::UnterminatedBracket => "unterminated bracket identifier",
            Self::UnmatchedClosingBracket => "closing bracket without opening bracket",
            Self::UnterminatedQuotedTable => "unterminated quoted table name",
            Self::UnterminatedString => "unterminated string literal",
            Self::UnterminatedComment => "unterminated block comment",
            Self::EmptyBracket => "empty bracket identifier",
            Self::UnbalancedParentheses => "unbalanced parentheses",
        }
    }
}

/// Non-fatal scan warning with the byte offset where the problem starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionParseWarning {
    pub offset: usize,
    pub kind: WarningKind,
}

impl ExpressionParseWarning {
    /// Attach the warning to the entity whose expression was scanned
    pub fn to_diagnostic(&self, subject: &str) -> Diagnostic {
        Diagnostic::of(
            DiagnosticCode::ExpressionParse,
            format!("{} in expression of '{}'", self, subject),
        )
        .with_subjects(vec![subject.to_string()])
    }
}

impl std::fmt::Display for ExpressionParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.kind.describe(), self.offset)
    }
}

/// References of one expression, in first-seen order without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedReferences {
    pub references: Vec<Reference>,
    pub warnings: Vec<ExpressionParseWarning>,
}

impl ExtractedReferences {
    /// Add a reference unless one with the same target was already seen
    pub fn push(&mut self, reference: Reference) {
        if !self.references.iter().any(|seen| seen.same_target(&reference)) {
            self.references.push(reference);
        }
    }

    pub fn merge(&mut self, other: ExtractedReferences) {
        for reference in other.references {
            self.push(reference);
        }
        self.warnings.extend(other.warnings);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn literals(&self) -> Vec<String> {
        self.references.iter().map(Reference::literal).collect()
    }

    pub fn sources(&self) -> Vec<&str> {
        self.references.iter().map(|r| r.source.as_str()).collect()
    }
}

/// Single-pass lexical reference scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceExtractor {
    skip_comments: bool,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self { skip_comments: true }
    }
}

impl ReferenceExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            skip_comments: config.skip_comments,
        }
    }

    /// When false, comment text is scanned like any other text
    pub fn with_skip_comments(mut self, skip_comments: bool) -> Self {
        self.skip_comments = skip_comments;
        self
    }

    /// Extract every reference candidate from an expression
    pub fn extract(&self, expression: &str) -> ExtractedReferences {
        let extracted = Scanner::new(expression, self.skip_comments).run();
        if !extracted.is_clean() {
            tracing::trace!(warnings = extracted.warnings.len(), "expression scanned with warnings");
        }
        extracted
    }
}

struct Scanner<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    skip_comments: bool,
    out: ExtractedReferences,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, skip_comments: bool) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            pos: 0,
            skip_comments,
            out: ExtractedReferences::default(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, ch)| ch)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|&(_, ch)| ch)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|&(offset, _)| offset).unwrap_or(self.text.len())
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn warn(&mut self, offset: usize, kind: WarningKind) {
        self.out.warnings.push(ExpressionParseWarning { offset, kind });
    }

    fn run(mut self) -> ExtractedReferences {
        let mut depth = 0usize;
        let mut parens_warned = false;
        let mut string_start = None;
        // table name token ending right before the current position, with its start offset
        let mut pending_table: Option<(usize, String)> = None;

        while let Some(ch) = self.peek() {
            let in_string = string_start.is_some();
            if !in_string && self.skip_comments && self.at_comment() {
                self.skip_comment();
                pending_table = None;
                continue;
            }

            let table = pending_table.take();
            match ch {
                '"' if in_string => {
                    self.advance();
                    if self.peek() == Some('"') {
                        self.advance();
                    } else {
                        string_start = None;
                    }
                }
                '"' => {
                    string_start = Some(self.offset());
                    self.advance();
                }
                '[' => self.read_bracket(table, in_string),
                ']' if !in_string => {
                    self.warn(self.offset(), WarningKind::UnmatchedClosingBracket);
                    self.advance();
                }
                '\'' if !in_string => pending_table = self.read_quoted_table(),
                '(' if !in_string => {
                    depth += 1;
                    self.advance();
                }
                ')' if !in_string => {
                    if depth == 0 {
                        if !parens_warned {
                            self.warn(self.offset(), WarningKind::UnbalancedParentheses);
                            parens_warned = true;
                        }
                    } else {
                        depth -= 1;
                    }
                    self.advance();
                }
                c if is_word_char(c) => pending_table = self.read_word(),
                _ => {
                    self.advance();
                }
            }
        }

        if let Some(start) = string_start {
            self.warn(start, WarningKind::UnterminatedString);
        }
        if depth > 0 && !parens_warned {
            self.warn(self.text.len(), WarningKind::UnbalancedParentheses);
        }

        self.out
    }

    fn at_comment(&self) -> bool {
        matches!(
            (self.peek(), self.peek_next()),
            (Some('/'), Some('/')) | (Some('-'), Some('-')) | (Some('/'), Some('*'))
        )
    }

    fn skip_comment(&mut self) {
        let start = self.offset();
        let block = self.peek_next() == Some('*');
        self.advance();
        self.advance();

        if block {
            while let Some(ch) = self.advance() {
                if ch == '*' && self.peek() == Some('/') {
                    self.advance();
                    return;
                }
            }
            self.warn(start, WarningKind::UnterminatedComment);
        } else {
            while let Some(ch) = self.advance() {
                if ch == '\n' || ch == '\r' {
                    return;
                }
            }
        }
    }

    fn read_bracket(&mut self, table: Option<(usize, String)>, in_string: bool) {
        let start = self.offset();
        self.advance();

        let mut name = String::new();
        loop {
            match self.peek() {
                Some(']') if self.peek_next() == Some(']') => {
                    name.push(']');
                    self.advance();
                    self.advance();
                }
                Some(']') => {
                    self.advance();
                    break;
                }
                // identifiers never span lines; resume scanning after the break
                None | Some('\n') | Some('\r') => {
                    self.warn(start, WarningKind::UnterminatedBracket);
                    return;
                }
                Some('"') if in_string => {
                    self.warn(start, WarningKind::UnterminatedBracket);
                    return;
                }
                Some(ch) => {
                    name.push(ch);
                    self.advance();
                }
            }
        }

        let name = normalize_whitespace(&name);
        if name.is_empty() {
            self.warn(start, WarningKind::EmptyBracket);
            return;
        }

        let (source_start, table) = match table {
            Some((table_start, table)) => (table_start, Some(table)),
            None => (start, None),
        };
        let source = self.text[source_start..self.offset()].to_string();
        self.out.push(Reference { table, name, source });
    }

    fn read_quoted_table(&mut self) -> Option<(usize, String)> {
        let start = self.offset();
        self.advance();

        let mut name = String::new();
        loop {
            match self.advance() {
                Some('\'') if self.peek() == Some('\'') => {
                    name.push('\'');
                    self.advance();
                }
                Some('\'') => break,
                Some(ch) => name.push(ch),
                None => {
                    self.warn(start, WarningKind::UnterminatedQuotedTable);
                    return None;
                }
            }
        }

        let name = normalize_whitespace(&name);
        (!name.is_empty()).then_some((start, name))
    }

    /// Read an identifier or number; only identifiers can prefix a bracket
    fn read_word(&mut self) -> Option<(usize, String)> {
        let start = self.offset();
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if !is_word_char(ch) {
                break;
            }
            word.push(ch);
            self.advance();
        }

        let starts_with_digit = word.chars().next().map_or(true, |c| c.is_ascii_digit());
        (!starts_with_digit).then_some((start, word))
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn literals(expression: &str) -> Vec<String> {
        ReferenceExtractor::new().extract(expression).literals()
    }

    fn warning_kinds(expression: &str) -> Vec<WarningKind> {
        ReferenceExtractor::new()
            .extract(expression)
            .warnings
            .into_iter()
            .map(|w| w.kind)
            .collect()
    }

    #[test]
    fn table_column_reference() {
        assert_eq!(literals("SUM(Sales[Amount])"), vec!["Sales[Amount]"]);
    }

    #[test]
    fn quoted_table_with_escape() {
        assert_eq!(
            literals("SUM('Sales Data'[Net Amount]) + MAX('O''Brien'[Visits])"),
            vec!["Sales Data[Net Amount]", "O'Brien[Visits]"]
        );
    }

    #[test]
    fn bare_measure_references() {
        let extracted = ReferenceExtractor::new().extract("DIVIDE([Total Revenue], [Order Count])");
        assert!(extracted.references.iter().all(Reference::is_bare));
        assert_eq!(extracted.literals(), vec!["[Total Revenue]", "[Order Count]"]);
        assert!(extracted.is_clean());
    }

    #[test]
    fn duplicates_collapse_in_first_seen_order() {
        assert_eq!(
            literals("Sales[A] + [B] + Sales[A] * [B] + Sales[C]"),
            vec!["Sales[A]", "[B]", "Sales[C]"]
        );
    }

    #[test]
    fn source_keeps_the_text_as_written() {
        let extracted = ReferenceExtractor::new().extract("SUM('Sales Data'[Missing]) + Sales[  Net  Amount ] + [X]");
        assert_eq!(extracted.literals(), vec!["Sales Data[Missing]", "Sales[Net Amount]", "[X]"]);
        assert_eq!(extracted.sources(), vec!["'Sales Data'[Missing]", "Sales[  Net  Amount ]", "[X]"]);
    }

    #[test]
    fn first_spelling_wins_when_targets_repeat() {
        let extracted = ReferenceExtractor::new().extract("'Sales'[A] + Sales[A]");
        assert_eq!(extracted.sources(), vec!["'Sales'[A]"]);
    }

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(literals("Sales[  Net \t Amount ]"), vec!["Sales[Net Amount]"]);
        assert_eq!(literals("'  Sales   Data '[x]"), vec!["Sales Data[x]"]);
    }

    #[test]
    fn table_prefix_must_touch_bracket() {
        assert_eq!(literals("VAR x = 1 RETURN [Total]"), vec!["[Total]"]);
        assert_eq!(literals("CALCULATE([Total], ALL('Date'))"), vec!["[Total]"]);
    }

    #[test]
    fn numbers_never_prefix_a_bracket() {
        assert_eq!(literals("1[x]"), vec!["[x]"]);
    }

    #[test]
    fn escaped_closing_bracket() {
        assert_eq!(literals("[Revenue [USD]]]"), vec!["[Revenue [USD]]"]);
    }

    #[test]
    fn comments_are_skipped_by_default() {
        let expression = "// Sales[Old]\nSales[New] /* [Legacy] */ -- [Gone]\n+ [Kept]";
        assert_eq!(literals(expression), vec!["Sales[New]", "[Kept]"]);

        let all = ReferenceExtractor::new().with_skip_comments(false).extract(expression);
        assert_eq!(
            all.literals(),
            vec!["Sales[Old]", "Sales[New]", "[Legacy]", "[Gone]", "[Kept]"]
        );
    }

    #[test]
    fn string_literals_are_scanned_but_quotes_inside_are_plain() {
        let extracted = ReferenceExtractor::new().extract(r#"IF([Flag], "It's Sales[Label]", "a""b") & Geo[City]"#);
        assert_eq!(extracted.literals(), vec!["[Flag]", "Sales[Label]", "Geo[City]"]);
        assert!(extracted.is_clean());
    }

    #[test]
    fn comment_markers_inside_strings_are_text() {
        assert_eq!(literals(r#""http://host" & Sales[Url]"#), vec!["Sales[Url]"]);
    }

    #[test]
    fn unterminated_bracket_keeps_partial_result() {
        let extracted = ReferenceExtractor::new().extract("Sales[Amount] + SUM(Sales[Cost");
        assert_eq!(extracted.literals(), vec!["Sales[Amount]"]);
        let kinds: Vec<_> = extracted.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::UnterminatedBracket, WarningKind::UnbalancedParentheses]);
        assert_eq!(extracted.warnings[0].offset, 25);
    }

    #[test]
    fn bracket_stops_at_line_break() {
        let extracted = ReferenceExtractor::new().extract("Sales[Amount\n+ [Other]");
        assert_eq!(extracted.literals(), vec!["[Other]"]);
        assert_eq!(extracted.warnings[0].kind, WarningKind::UnterminatedBracket);
    }

    #[test]
    fn other_malformed_inputs() {
        assert_eq!(warning_kinds("[]"), vec![WarningKind::EmptyBracket]);
        assert_eq!(warning_kinds("Sales[A] ]"), vec![WarningKind::UnmatchedClosingBracket]);
        assert_eq!(warning_kinds("'Sales[A]"), vec![WarningKind::UnterminatedQuotedTable]);
        assert_eq!(warning_kinds("\"open [A]"), vec![WarningKind::UnterminatedString]);
        assert_eq!(warning_kinds("/* [A]"), vec![WarningKind::UnterminatedComment]);
        assert_eq!(warning_kinds("SUM([A]))"), vec![WarningKind::UnbalancedParentheses]);
    }

    #[test]
    fn warning_becomes_expression_parse_diagnostic() {
        let warning = ExpressionParseWarning {
            offset: 4,
            kind: WarningKind::EmptyBracket,
        };
        let diag = warning.to_diagnostic("Sales[Broken]");
        assert_eq!(diag.code, DiagnosticCode::ExpressionParse);
        assert_eq!(diag.message, "empty bracket identifier at offset 4 in expression of 'Sales[Broken]'");
        assert_eq!(diag.subjects, vec!["Sales[Broken]".to_string()]);
    }

    #[test]
    fn from_config_honors_skip_comments() {
        let config = ExtractionConfig { skip_comments: false };
        let extractor = ReferenceExtractor::from_config(&config);
        assert_eq!(extractor.extract("// [A]").literals(), vec!["[A]"]);
    }
}
