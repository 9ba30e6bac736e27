//! Migration mapping workbook
//!
//! Maps legacy sub-task `migration_id`s to My Compliance action-item
//! reference ids. The mapping ships either as a bare xlsx or zipped.

use calamine::{Reader, Xlsx};
use polaris_common::{Error, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

const MIGRATION_ID_COLUMN: usize = 0;
const REFERENCE_COLUMN: usize = 1;

/// Load the mapping: migration_id -> action item reference id
pub fn load_mapping(path: &Path) -> Result<HashMap<String, String>> {
    let bytes = read_workbook_bytes(path)?;

    let cursor = std::io::Cursor::new(bytes);
    let mut workbook = Xlsx::new(cursor)
        .map_err(|e| Error::Validation(format!("bad mapping workbook: {e}")))?;

    let names = workbook.sheet_names().to_owned();
    let first = names
        .first()
        .ok_or_else(|| Error::Validation("mapping workbook has no sheets".to_string()))?
        .clone();

    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| Error::Validation(format!("bad mapping sheet: {e}")))?;

    let mut mapping = HashMap::new();
    // Row 1 is the header
    for row in range.rows().skip(1) {
        let migration_id = row
            .get(MIGRATION_ID_COLUMN)
            .map(|c| c.to_string())
            .unwrap_or_default();
        let reference = row
            .get(REFERENCE_COLUMN)
            .map(|c| c.to_string())
            .unwrap_or_default();

        let migration_id = migration_id.trim();
        let reference = reference.trim();
        if migration_id.is_empty() || reference.is_empty() {
            continue;
        }
        mapping.insert(migration_id.to_string(), reference.to_string());
    }

    Ok(mapping)
}

fn read_workbook_bytes(path: &Path) -> Result<Vec<u8>> {
    if path.extension().and_then(|e| e.to_str()) == Some("zip") {
        let file = std::fs::File::open(path)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| Error::Validation(format!("bad mapping archive: {e}")))?;

        let inner_name = (0..zip.len())
            .filter_map(|i| zip.by_index(i).ok().map(|f| f.name().to_string()))
            .find(|name| name.ends_with(".xlsx"))
            .ok_or_else(|| {
                Error::Validation("mapping archive contains no xlsx workbook".to_string())
            })?;

        let mut bytes = Vec::new();
        zip.by_name(&inner_name)
            .map_err(|e| Error::Validation(format!("bad mapping archive: {e}")))?
            .read_to_end(&mut bytes)?;
        Ok(bytes)
    } else {
        Ok(std::fs::read(path)?)
    }
}
