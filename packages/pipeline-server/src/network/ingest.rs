//! Ingestion cleaning, validation, and file extraction (spec §6.2).
//!
//! The cleaning/validation/dedup predicate is in scope (it is the Batch
//! Store's responsibility, §4.2); file-format extraction itself is an
//! external collaborator's concern per §1 -- this module's extraction path
//! is intentionally minimal, not a full parser/exporter suite.

use std::io::Cursor;
use std::sync::OnceLock;

use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsx};
use regex::Regex;

use super::error::ControlError;

fn valid_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{8}$").expect("static pattern is valid"))
}

/// Validation predicate (§6.2): exactly eight digits.
#[must_use]
pub fn is_valid_key(s: &str) -> bool {
    valid_key_pattern().is_match(s)
}

/// Cleans one raw entry per §6.2: trim whitespace; if it matches
/// `<digits>.<anything>` keep the digit prefix; drop if empty or `nan`.
#[must_use]
pub fn clean_entry(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }
    if let Some((prefix, _rest)) = trimmed.split_once('.') {
        if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Some(prefix.to_string());
        }
    }
    Some(trimmed.to_string())
}

/// De-duplicates `entries`, keeping first-seen order (§4.2, §6.2).
#[must_use]
pub fn dedupe_preserving_order(entries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    entries.into_iter().filter(|e| seen.insert(e.clone())).collect()
}

/// Outcome of cleaning + validating + de-duplicating a raw entry list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidatedEntries {
    /// Cleaned, validated, de-duplicated keys, first-seen order.
    pub accepted: Vec<String>,
    /// Raw entries that cleaned to something but failed validation.
    pub rejected: Vec<String>,
}

/// Applies the full §6.2 cleaning/validation/dedup pipeline to raw entries.
#[must_use]
pub fn validate_entries(raw_entries: Vec<String>) -> ValidatedEntries {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    for raw in raw_entries {
        match clean_entry(&raw) {
            None => {}
            Some(cleaned) if is_valid_key(&cleaned) => valid.push(cleaned),
            Some(_) => rejected.push(raw),
        }
    }
    ValidatedEntries {
        accepted: dedupe_preserving_order(valid),
        rejected,
    }
}

/// Extracts raw (uncleaned) entries from an uploaded file by extension
/// (§6.2). Spreadsheets use the `DNI` column if present, else the first
/// column; text files are one entry per line.
pub fn extract_raw_entries(filename: &str, bytes: &[u8]) -> Result<Vec<String>, ControlError> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "csv" => Ok(extract_text_entries(bytes)),
        "xlsx" => extract_spreadsheet_entries::<Xlsx<Cursor<Vec<u8>>>>(bytes),
        "xls" => extract_spreadsheet_entries::<Xls<Cursor<Vec<u8>>>>(bytes),
        other => Err(ControlError::UnsupportedFileType(other.to_string())),
    }
}

fn extract_text_entries(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(std::string::ToString::to_string)
        .collect()
}

fn extract_spreadsheet_entries<R>(bytes: &[u8]) -> Result<Vec<String>, ControlError>
where
    R: Reader<Cursor<Vec<u8>>>,
{
    // calamine owns the buffer via `Cursor<Vec<u8>>` so the workbook has no
    // borrow back into this function's stack.
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook: R = open_workbook_from_rs(cursor)
        .map_err(|e| ControlError::UnsupportedFileType(format!("spreadsheet: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ControlError::UnsupportedFileType("empty workbook".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ControlError::UnsupportedFileType(format!("spreadsheet: {e}")))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let column = header
        .iter()
        .position(|cell| cell.to_string().eq_ignore_ascii_case("dni"))
        .unwrap_or(0);

    let mut entries = Vec::new();
    // If there was no "DNI" header, the first row is itself data.
    let has_dni_header = header
        .iter()
        .any(|cell| cell.to_string().eq_ignore_ascii_case("dni"));
    if !has_dni_header {
        if let Some(cell) = header.get(column) {
            entries.push(cell_to_string(cell));
        }
    }
    for row in rows {
        if let Some(cell) = row.get(column) {
            entries.push(cell_to_string(cell));
        }
    }
    Ok(entries)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        other => other.to_string(),
    }
}
