use crate::settings::ExportSettings;
use crate::table::{Cell, RowTable};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XLSX write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Explicit path if given, else the default file name inside the workspace.
/// Relative paths resolve against the workspace, not the process directory.
pub fn resolve_output_path(
    workspace: &Path,
    out_path: Option<&str>,
    default_name: &str,
) -> Result<PathBuf, ExportError> {
    match out_path.map(str::trim) {
        Some("") => Err(ExportError::InvalidPath("outPath is empty".to_string())),
        Some(p) if Path::new(p).is_absolute() => Ok(PathBuf::from(p)),
        Some(p) => Ok(workspace.join(p)),
        None => Ok(workspace.join(default_name)),
    }
}

/// Writes one sheet: a bold header row, then one row per student. No formulas.
pub fn write_spreadsheet(
    table: &RowTable,
    sheet_name: &str,
    path: &Path,
) -> Result<usize, ExportError> {
    if path.is_dir() {
        return Err(ExportError::InvalidPath(format!(
            "{} is a directory",
            path.to_string_lossy()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    let header = Format::new().set_bold();
    for (col, column) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, &column.label, &header)?;
    }
    // Name column is the widest.
    worksheet.set_column_width(0, 28.0)?;

    for (i, row) in table.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.cells.iter().enumerate() {
            match cell {
                Cell::Number(n) => {
                    worksheet.write_number(r, col as u16, *n as f64)?;
                }
                Cell::Text(s) => {
                    worksheet.write_string(r, col as u16, s)?;
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(table.rows.len())
}

/// Everything the external PDF renderer needs; the renderer owns layout and fonts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportModel {
    pub title: String,
    pub file_name: String,
    pub font_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn report_model(table: &RowTable, settings: &ExportSettings) -> ReportModel {
    let report = table.report_table();
    ReportModel {
        title: settings.report_title.clone(),
        file_name: settings.report_file_name.clone(),
        font_path: settings.report_font_path.clone(),
        generated_at: settings
            .show_generated_at
            .then(|| chrono::Local::now().format("%Y-%m-%d %H:%M").to_string()),
        columns: report.columns,
        rows: report.rows,
    }
}
