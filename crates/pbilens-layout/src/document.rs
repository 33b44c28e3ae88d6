//! Raw layout document loading
//!
//! Turns the bytes of the front-end definition file into a generic JSON tree.
//! No semantic validation happens here and unknown keys are preserved, the
//! resolver decides what is relevant.

use serde_json::Value;
use std::path::Path;

use crate::error::LayoutError;

/// A decoded layout file
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// File label used in source locations (e.g. `Report/Layout`)
    pub file: String,

    /// Generic tree: mappings, sequences, strings, numbers, booleans, null
    pub tree: Value,
}

impl RawDocument {
    /// Load a layout document from disk
    pub fn from_file(path: &Path, file_label: impl Into<String>) -> Result<Self, LayoutError> {
        let file = file_label.into();
        let bytes = std::fs::read(path).map_err(|e| LayoutError::MalformedDocument {
            file: file.clone(),
            message: format!("failed to read {}: {}", path.display(), e),
            line: None,
            column: None,
        })?;

        load_document(&bytes, file)
    }

    /// Parse a layout document from already decoded text
    pub fn from_str(text: &str, file: impl Into<String>) -> Result<Self, LayoutError> {
        let file = file.into();
        let tree = serde_json::from_str(text).map_err(|e| LayoutError::MalformedDocument {
            file: file.clone(),
            message: e.to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
        })?;

        Ok(Self { file, tree })
    }
}

/// Decode and parse raw layout bytes
pub fn load_document(bytes: &[u8], file: impl Into<String>) -> Result<RawDocument, LayoutError> {
    let file = file.into();
    let text = decode_text(bytes).map_err(|message| LayoutError::MalformedDocument {
        file: file.clone(),
        message,
        line: None,
        column: None,
    })?;

    RawDocument::from_str(&text, file)
}

/// Decode layout bytes into text
///
/// The layout file is UTF-16LE, usually without a byte order mark. UTF-16BE
/// and UTF-8 are accepted when a BOM says so, and BOM-less input that does
/// not look like UTF-16 is read as UTF-8.
pub fn decode_text(bytes: &[u8]) -> Result<String, String> {
    if let Some(body) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return decode_utf8(body);
    }
    if let Some(body) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(body, true);
    }
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(body, false);
    }

    match utf16_byte_order(bytes) {
        Some(little_endian) => decode_utf16(bytes, little_endian),
        None => decode_utf8(bytes),
    }
}

/// Byte order of BOM-less UTF-16, `Some(true)` for little-endian
///
/// UTF-8 JSON never holds a zero byte. UTF-16 JSON has one in the high half
/// of every structural character, so the side with more zeros wins.
fn utf16_byte_order(bytes: &[u8]) -> Option<bool> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }

    let sample = &bytes[..bytes.len().min(256)];
    let (mut even_zeros, mut odd_zeros) = (0usize, 0usize);
    for unit in sample.chunks_exact(2) {
        even_zeros += usize::from(unit[0] == 0);
        odd_zeros += usize::from(unit[1] == 0);
    }

    match (even_zeros, odd_zeros) {
        (0, 0) => None,
        (even, odd) => Some(odd >= even),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid UTF-8: {}", e))
}

fn decode_utf16(body: &[u8], little_endian: bool) -> Result<String, String> {
    if body.len() % 2 != 0 {
        return Err("invalid UTF-16 byte length".to_string());
    }

    let mut code_units = Vec::with_capacity(body.len() / 2);
    for chunk in body.chunks_exact(2) {
        let unit = if little_endian {
            u16::from_le_bytes([chunk[0], chunk[1]])
        } else {
            u16::from_be_bytes([chunk[0], chunk[1]])
        };
        code_units.push(unit);
    }

    String::from_utf16(&code_units).map_err(|e| format!("invalid UTF-16: {}", e))
}
