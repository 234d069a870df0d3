use std::fs;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;

use crate::error::{BoqError, Result};
use crate::model::SourceRow;

pub const DESCRIPTION_COLUMN: &str = "Description";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Csv,
    Xls,
    Xlsx,
}

impl SpreadsheetFormat {
    pub fn from_filename(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(SpreadsheetFormat::Csv),
            "xls" => Ok(SpreadsheetFormat::Xls),
            "xlsx" => Ok(SpreadsheetFormat::Xlsx),
            _ => Err(BoqError::UnsupportedFormat(if ext.is_empty() {
                name.to_string()
            } else {
                format!(".{ext}")
            })),
        }
    }
}

/// Row-oriented view of the first sheet of a workbook (or of a CSV file).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Headers match exactly, apart from surrounding whitespace.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header.trim() == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| BoqError::MissingColumn(name.to_string()))
    }

    /// Cell at `row`/`column`, empty when the row is shorter than the header.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(|cell| cell.as_str())
            .unwrap_or("")
    }

    pub fn source_rows(&self, column: &str) -> Result<Vec<SourceRow>> {
        let idx = self.require_column(column)?;
        Ok((0..self.rows.len())
            .map(|row| SourceRow {
                index: row,
                text: self.cell(row, idx).to_string(),
            })
            .collect())
    }

    pub fn concatenated_rows(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|cells| {
                cells
                    .iter()
                    .map(|cell| cell.trim())
                    .filter(|cell| !cell.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

pub fn read_table(filename: &str, bytes: &[u8]) -> Result<Table> {
    match SpreadsheetFormat::from_filename(filename)? {
        SpreadsheetFormat::Csv => read_csv(bytes),
        SpreadsheetFormat::Xls | SpreadsheetFormat::Xlsx => read_workbook(bytes),
    }
}

pub fn read_table_path(path: &Path) -> Result<Table> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    // Reject before touching the filesystem so a bad extension reads as a validation error.
    SpreadsheetFormat::from_filename(&name)?;
    let bytes = fs::read(path)?;
    read_table(&name, &bytes)
}

fn read_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()?
        .iter()
        .map(|cell| cell.to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(Table::new(headers, rows))
}

fn read_workbook(bytes: &[u8]) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Ok(Table::default()),
    };
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| row.iter().map(render_cell).collect::<Vec<_>>())
        .unwrap_or_default();
    let body = rows
        .map(|row| row.iter().map(render_cell).collect::<Vec<_>>())
        .collect();
    Ok(Table::new(headers, body))
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}
