// Spreadsheet artifacts: one workbook per brand, plus the run summary

use crate::{
    error::ArtifactError,
    models::{ListingRecord, ModelSheet, RunSummary},
};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Excel's limit on worksheet name length.
pub const MAX_SHEET_NAME_CHARS: usize = 31;
pub const NO_DATA_MESSAGE: &str = "No data available";
const NO_DATA_SHEET: &str = "No_Data";
const SUMMARY_SHEET: &str = "Brands";

/// Shape of one worksheet: its name and how many rows follow the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub name: String,
    pub columns: Vec<String>,
    pub data_rows: usize,
}

struct PlannedSheet<'a> {
    layout: SheetLayout,
    records: &'a [ListingRecord],
}

/// `Toyota Land Cruiser` -> `Toyota_Land_Cruiser`.
pub fn file_stem(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

pub fn workbook_file_name(brand_name: &str) -> String {
    format!("{}.xlsx", file_stem(brand_name))
}

/// Like [`workbook_file_name`], but numbers the name (`Land_Rover_2.xlsx`)
/// when `used` already holds it. Names are compared case-insensitively.
pub fn unique_workbook_file_name(brand_name: &str, used: &mut HashSet<String>) -> String {
    let stem = file_stem(brand_name);
    let mut candidate = format!("{stem}.xlsx");
    let mut n = 2;
    while used.contains(&candidate.to_lowercase()) {
        candidate = format!("{stem}_{n}.xlsx");
        n += 1;
    }
    used.insert(candidate.to_lowercase());
    candidate
}

pub fn summary_file_name(date_label: &str) -> String {
    format!("brands_summary_{date_label}.xlsx")
}

/// Turns a model title into a legal worksheet name, at most 31 characters.
pub fn sheet_name(raw: &str) -> String {
    let cleaned: String = file_stem(raw)
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' => '_',
            c => c,
        })
        .collect();
    let truncated: String = cleaned.trim_matches('\'').chars().take(MAX_SHEET_NAME_CHARS).collect();
    // Truncation can expose an apostrophe at the new end
    let trimmed = truncated.trim_matches('\'');
    if trimmed.is_empty() {
        "Sheet".to_string()
    } else {
        trimmed.to_string()
    }
}

// Sheet names compare case-insensitively; "History" is reserved by Excel.
fn unique_sheet_name(raw: &str, used: &mut HashSet<String>) -> String {
    let base = sheet_name(raw);
    let base = if base.eq_ignore_ascii_case("history") { format!("{base}_") } else { base };

    let mut candidate = base.clone();
    let mut n = 2;
    while used.contains(&candidate.to_lowercase()) {
        let suffix = format!("_{n}");
        let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
        candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
        n += 1;
    }
    used.insert(candidate.to_lowercase());
    candidate
}

/// Union of field names across records, in first-seen order.
fn columns_for(records: &[ListingRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for record in records {
        for (key, _) in record.fields() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn plan_sheets(models: &[ModelSheet]) -> Vec<PlannedSheet<'_>> {
    let mut used = HashSet::new();
    models
        .iter()
        .map(|model| {
            let columns = columns_for(&model.records);
            // Empty models get a single placeholder row
            let data_rows = model.records.len().max(1);
            PlannedSheet {
                layout: SheetLayout { name: unique_sheet_name(&model.model_name, &mut used), columns, data_rows },
                records: &model.records,
            }
        })
        .collect()
}

/// Sheet names and row counts `write_workbook` produces for `models`.
pub fn workbook_layout(models: &[ModelSheet]) -> Vec<SheetLayout> {
    if models.is_empty() {
        return vec![SheetLayout { name: NO_DATA_SHEET.to_string(), columns: Vec::new(), data_rows: 1 }];
    }
    plan_sheets(models).into_iter().map(|planned| planned.layout).collect()
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), ArtifactError> {
    match value {
        Value::String(s) => {
            sheet.write_string(row, col, s)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                sheet.write_number(row, col, f)?;
            }
            None => {
                sheet.write_string(row, col, n.to_string())?;
            }
        },
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Null | Value::Array(_) | Value::Object(_) => {}
    }
    Ok(())
}

fn write_placeholder(sheet: &mut Worksheet) -> Result<(), ArtifactError> {
    sheet.write_string(0, 0, "Message")?;
    sheet.write_string(1, 0, NO_DATA_MESSAGE)?;
    Ok(())
}

fn write_records(sheet: &mut Worksheet, columns: &[String], records: &[ListingRecord]) -> Result<(), ArtifactError> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string(0, col as u16, name)?;
    }
    for (row, record) in records.iter().enumerate() {
        for (col, name) in columns.iter().enumerate() {
            if let Some(value) = record.get(name) {
                write_cell(sheet, row as u32 + 1, col as u16, value)?;
            }
        }
    }
    Ok(())
}

/// Writes `<dir>/<Brand_Name>.xlsx` with one sheet per model.
pub fn write_workbook(dir: &Path, brand_name: &str, models: &[ModelSheet]) -> Result<PathBuf, ArtifactError> {
    write_workbook_as(dir, &workbook_file_name(brand_name), models)
}

/// Writes `<dir>/<file_name>` with one sheet per model.
pub fn write_workbook_as(dir: &Path, file_name: &str, models: &[ModelSheet]) -> Result<PathBuf, ArtifactError> {
    let path = dir.join(file_name);
    let mut workbook = Workbook::new();

    if models.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(NO_DATA_SHEET)?;
        write_placeholder(sheet)?;
    }

    for planned in plan_sheets(models) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(&planned.layout.name)?;
        if planned.records.is_empty() {
            write_placeholder(sheet)?;
        } else {
            write_records(sheet, &planned.layout.columns, planned.records)?;
        }
    }

    workbook.save(&path)?;
    tracing::debug!(path = %path.display(), sheets = models.len().max(1), "Workbook written");
    Ok(path)
}

/// Writes the list of brands that produced a workbook during the run.
pub fn write_summary(dir: &Path, date_label: &str, summary: &RunSummary) -> Result<PathBuf, ArtifactError> {
    let path = dir.join(summary_file_name(date_label));
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SUMMARY_SHEET)?;
    sheet.write_string(0, 0, "Brand")?;
    for (row, brand) in summary.brand_names().enumerate() {
        sheet.write_string(row as u32 + 1, 0, brand)?;
    }
    workbook.save(&path)?;
    Ok(path)
}
