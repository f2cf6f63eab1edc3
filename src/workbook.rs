// 📒 Workbook - multi-sheet tabular documents
//
// Uploaded catalogs arrive as .xlsx workbooks (calamine) or as a directory of
// one CSV export per sheet (csv). Both land in the same in-memory shape.

use crate::error::{CatalogError, Result};
use calamine::{Data, Reader};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::Path;

// ============================================================================
// CELL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Textual form of the value; integral floats print without a fraction
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Numeric value; text is parsed after stripping currency noise
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',' | ' '))
                    .collect();
                cleaned.parse().ok()
            }
            Cell::Empty => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            // `as` saturates; out-of-range floats are not integers
            Cell::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
                Some(*f as i64)
            }
            Cell::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::Error(_) => Cell::Empty,
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

// ============================================================================
// SHEET
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: &str, headers: &[&str]) -> Self {
        Sheet {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Builder used by loaders and tests
    pub fn with_row(mut self, cells: Vec<Cell>) -> Self {
        self.push_row(cells);
        self
    }

    /// Fully empty rows are dropped
    pub fn push_row(&mut self, cells: Vec<Cell>) {
        if cells.iter().all(Cell::is_empty) {
            return;
        }
        self.rows.push(cells);
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Data rows paired with their 1-based spreadsheet row number (header is row 1)
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().enumerate().map(move |(i, cells)| Record {
            sheet: self,
            row_number: i + 2,
            cells,
        })
    }
}

/// One data row, addressed by column name
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    sheet: &'a Sheet,
    pub row_number: usize,
    cells: &'a [Cell],
}

static EMPTY: Cell = Cell::Empty;

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> &'a Cell {
        self.sheet
            .column_index(column)
            .and_then(|i| self.cells.get(i))
            .unwrap_or(&EMPTY)
    }

    pub fn sheet_name(&self) -> &'a str {
        &self.sheet.name
    }
}

// ============================================================================
// WORKBOOK
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: Sheet) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Parse an .xlsx/.xls/.ods workbook held in memory
    pub fn from_xlsx_bytes(bytes: &[u8]) -> Result<Self> {
        let mut book = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| CatalogError::UnreadableWorkbook(e.to_string()))?;

        let mut workbook = Workbook::new();
        for name in book.sheet_names() {
            let range = book
                .worksheet_range(&name)
                .map_err(|e| CatalogError::UnreadableWorkbook(format!("sheet '{}': {}", name, e)))?;

            let mut rows = range.rows();
            let headers = match rows.next() {
                Some(header_row) => header_row
                    .iter()
                    .map(|c| Cell::from(c).as_text().unwrap_or_default())
                    .collect(),
                None => Vec::new(),
            };

            let mut sheet = Sheet {
                name: name.clone(),
                headers,
                rows: Vec::new(),
            };
            for row in rows {
                sheet.push_row(row.iter().map(Cell::from).collect());
            }
            workbook.sheets.push(sheet);
        }

        Ok(workbook)
    }

    /// Each `<Sheet>.csv` inside `dir` becomes one sheet, in file-name order
    pub fn from_csv_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut workbook = Workbook::new();
        for path in paths {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let mut rdr = csv::ReaderBuilder::new()
                .flexible(true)
                .from_path(&path)
                .map_err(|e| CatalogError::UnreadableWorkbook(format!("{}: {}", path.display(), e)))?;

            let headers = rdr
                .headers()
                .map_err(|e| CatalogError::UnreadableWorkbook(format!("{}: {}", path.display(), e)))?
                .iter()
                .map(|h| h.to_string())
                .collect();

            let mut sheet = Sheet {
                name,
                headers,
                rows: Vec::new(),
            };
            for result in rdr.records() {
                let record = result
                    .map_err(|e| CatalogError::UnreadableWorkbook(format!("{}: {}", path.display(), e)))?;
                sheet.push_row(record.iter().map(Cell::from).collect());
            }
            workbook.sheets.push(sheet);
        }

        Ok(workbook)
    }
}

// ============================================================================
// SOURCE DOCUMENTS
// ============================================================================

/// How a catalog document on disk is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Spreadsheet,
    CsvDirectory,
}

/// Detect the format from the path: directories hold CSV exports, files are spreadsheets
pub fn detect_format(path: &Path) -> Result<DocumentFormat> {
    if path.is_dir() {
        return Ok(DocumentFormat::CsvDirectory);
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => Ok(DocumentFormat::Spreadsheet),
        _ => Err(CatalogError::UnreadableWorkbook(format!(
            "unsupported catalog document: {}",
            path.display()
        ))),
    }
}

/// A named, fingerprinted workbook ready for ingestion
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub digest: String,
    pub workbook: Workbook,
}

impl SourceDocument {
    pub fn from_xlsx_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        Ok(SourceDocument {
            name: name.to_string(),
            digest: digest(bytes),
            workbook: Workbook::from_xlsx_bytes(bytes)?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        match detect_format(path)? {
            DocumentFormat::Spreadsheet => {
                let bytes = std::fs::read(path)?;
                Self::from_xlsx_bytes(&name, &bytes)
            }
            DocumentFormat::CsvDirectory => {
                let workbook = Workbook::from_csv_dir(path)?;
                let mut hasher = Sha256::new();
                for sheet in &workbook.sheets {
                    hasher.update(sheet.name.as_bytes());
                    hasher.update(sheet.headers.join(",").as_bytes());
                    for row in &sheet.rows {
                        for cell in row {
                            hasher.update(cell.as_text().unwrap_or_default().as_bytes());
                            hasher.update([0x1f]);
                        }
                    }
                }
                Ok(SourceDocument {
                    name,
                    digest: format!("{:x}", hasher.finalize()),
                    workbook,
                })
            }
        }
    }

    /// Wrap an in-memory workbook (tests, programmatic callers)
    pub fn in_memory(name: &str, workbook: Workbook) -> Self {
        SourceDocument {
            name: name.to_string(),
            digest: String::new(),
            workbook,
        }
    }
}

/// SHA-256 of the raw document bytes, hex encoded
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
