//! Seed archive reading
//!
//! A seed archive is a ZIP containing `seed.xlsx` plus attachment trees
//! (`policies/`, `templates/`, `vendors/`, `certification_logos/`,
//! `populations/`). Sheets are extracted eagerly into header-keyed
//! records so the seeders never touch the workbook directly.

use calamine::{Reader, Xlsx};
use polaris_common::{Error, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

pub const WORKBOOK_NAME: &str = "seed.xlsx";

/// One data row, keyed by normalized header
#[derive(Debug, Clone)]
pub struct Record {
    /// Spreadsheet row number (1-based, headers are row 1)
    row: usize,
    fields: HashMap<String, String>,
}

impl Record {
    pub fn row(&self) -> usize {
        self.row
    }

    /// Field value, trimmed; empty cells read as None
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| v.trim().is_empty())
    }

    /// Whether the sheet carried this column at all
    pub fn has_column(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    #[cfg(test)]
    pub fn from_pairs(row: usize, pairs: &[(&str, &str)]) -> Self {
        Self {
            row,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Fully extracted seed archive
pub struct SeedArchive {
    sheets: HashMap<String, Vec<Record>>,
    files: HashMap<String, Vec<u8>>,
}

impl SeedArchive {
    /// Open and extract a seed ZIP from disk
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| Error::Validation(format!("bad seed archive: {e}")))?;

        let mut workbook_bytes = Vec::new();
        {
            let mut entry = zip
                .by_name(WORKBOOK_NAME)
                .map_err(|_| Error::Validation(format!("seed archive missing {WORKBOOK_NAME}")))?;
            entry.read_to_end(&mut workbook_bytes)?;
        }

        let mut files = HashMap::new();
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| Error::Validation(format!("bad seed archive entry: {e}")))?;
            if !entry.is_file() || entry.name() == WORKBOOK_NAME {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            files.insert(name, bytes);
        }

        let sheets = extract_sheets(&workbook_bytes)?;
        Ok(Self { sheets, files })
    }

    /// Records of a sheet; None when the sheet is absent or skipped
    pub fn sheet(&self, name: &str) -> Option<&[Record]> {
        self.sheets.get(name).map(|r| r.as_slice())
    }

    /// Attachment bytes by archive path, e.g. "policies/security.docx"
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|b| b.as_slice())
    }
}

/// Parse the workbook into per-sheet records, applying the sheet
/// contract: absent sheets and sheets with an empty second row are
/// skipped; all-empty data rows are dropped.
fn extract_sheets(workbook_bytes: &[u8]) -> Result<HashMap<String, Vec<Record>>> {
    let cursor = std::io::Cursor::new(workbook_bytes.to_vec());
    let mut workbook = Xlsx::new(cursor)
        .map_err(|e| Error::Validation(format!("bad seed workbook: {e}")))?;

    let names = workbook.sheet_names().to_owned();
    let mut sheets = HashMap::new();

    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| Error::Validation(format!("bad sheet {name}: {e}")))?;

        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            continue;
        };

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| normalize_header(&cell.to_string()))
            .collect();

        let mut records = Vec::new();
        for (i, row) in rows.enumerate() {
            let mut fields = HashMap::new();
            for (j, header) in headers.iter().enumerate() {
                if header.is_empty() {
                    continue;
                }
                let value = row.get(j).map(|c| c.to_string()).unwrap_or_default();
                fields.insert(header.clone(), value);
            }
            records.push(Record {
                // Data starts on spreadsheet row 2
                row: i + 2,
                fields,
            });
        }

        // Row 2 empty means the sheet is intentionally blank
        match records.first() {
            None => continue,
            Some(first) if first.is_empty() => continue,
            Some(_) => {}
        }

        // Trailing empty rows are noise, not data
        records.retain(|r| !r.is_empty());
        sheets.insert(name, records);
    }

    Ok(sheets)
}

/// Collapse whitespace runs (including line breaks) to single spaces
pub fn normalize_header(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_normalization_collapses_whitespace() {
        assert_eq!(normalize_header("subtask_reference_id"), "subtask_reference_id");
        assert_eq!(normalize_header("  program\nname "), "program name");
        assert_eq!(normalize_header("due \t date"), "due date");
    }

    #[test]
    fn record_get_treats_blank_as_absent() {
        let record = Record::from_pairs(2, &[("name", "  "), ("status", "Implemented")]);
        assert!(record.get("name").is_none());
        assert_eq!(record.get("status"), Some("Implemented"));
        assert!(record.has_column("name"));
        assert!(!record.has_column("owner"));
    }
}
