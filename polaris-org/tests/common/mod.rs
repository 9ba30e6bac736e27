//! Shared helpers for integration tests
#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use polaris_org::state::AppState;
use polaris_org::tasks::TaskDispatcher;
use tokio_util::sync::CancellationToken;

/// App state wired to in-memory/in-process back-ends
pub async fn test_state() -> AppState {
    let pool = polaris_common::db::init_in_memory().await.unwrap();
    let tasks = TaskDispatcher::start(pool.clone(), 2, CancellationToken::new());
    AppState::for_tests(pool, tasks)
}

/// One sheet for a seed fixture: name, headers, data rows
pub struct Sheet<'a> {
    pub name: &'a str,
    pub headers: &'a [&'a str],
    pub rows: &'a [&'a [&'a str]],
}

/// Build a seed ZIP (seed.xlsx plus optional attachments) on disk
pub fn build_seed_zip(
    dir: &Path,
    file_name: &str,
    sheets: &[Sheet<'_>],
    attachments: &[(&str, &[u8])],
) -> PathBuf {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name).unwrap();
        for (col, header) in sheet.headers.iter().enumerate() {
            worksheet.write(0, col as u16, *header).unwrap();
        }
        for (row_index, row) in sheet.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                worksheet
                    .write((row_index + 1) as u32, col as u16, *value)
                    .unwrap();
            }
        }
    }
    let workbook_bytes = workbook.save_to_buffer().unwrap();

    let path = dir.join(file_name);
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("seed.xlsx", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(&workbook_bytes).unwrap();
    for (name, bytes) in attachments {
        zip.start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Build a bare mapping workbook: migration_id -> reference id
pub fn build_mapping_xlsx(dir: &Path, file_name: &str, pairs: &[(&str, &str)]) -> PathBuf {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("mapping").unwrap();
    worksheet.write(0, 0, "migration_id").unwrap();
    worksheet.write(0, 1, "action_item_reference_id").unwrap();
    for (row, (migration_id, reference)) in pairs.iter().enumerate() {
        worksheet.write((row + 1) as u32, 0, *migration_id).unwrap();
        worksheet.write((row + 1) as u32, 1, *reference).unwrap();
    }

    let path = dir.join(file_name);
    workbook.save(&path).unwrap();
    path
}
