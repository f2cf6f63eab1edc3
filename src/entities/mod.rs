// Catalog Entities
//
// Each entity kind knows how to:
// - build itself from one validated sheet row (canonical text, parsed numbers)
// - state its natural key
// - insert itself only if that key is absent (one atomic statement)

pub mod area;
pub mod supplier;
pub mod contract;
pub mod line_item;

pub use area::Area;
pub use supplier::Supplier;
pub use contract::Contract;
pub use line_item::{LineItem, LineItemOption};

use crate::error::{CatalogError, Result};
use crate::normalize::normalize_cell;
use crate::workbook::{Cell, Record};
use rusqlite::Connection;
use serde::Serialize;

// ============================================================================
// INSERT OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InsertOutcome {
    Inserted,
    /// Natural key already present; the row's other values were ignored
    Skipped,
}

impl InsertOutcome {
    /// Interpret the changed-row count of an `INSERT ... ON CONFLICT DO NOTHING`
    pub(crate) fn from_changes(changes: usize) -> Self {
        if changes == 0 {
            InsertOutcome::Skipped
        } else {
            InsertOutcome::Inserted
        }
    }
}

// ============================================================================
// CATALOG ENTITY
// ============================================================================

pub trait CatalogEntity: Sized {
    /// Sheet the entity is read from
    const SHEET: &'static str;

    fn from_record(record: &Record<'_>) -> Result<Self>;

    fn natural_key(&self) -> String;

    /// `row_number` is the source row, used when reporting failures
    fn insert_if_absent(&self, conn: &Connection, row_number: usize) -> Result<InsertOutcome>;
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Canonical text; empty is null
pub(crate) fn optional_text(record: &Record<'_>, column: &str) -> Option<String> {
    normalize_cell(record.get(column)).filter(|s| !s.is_empty())
}

/// Canonical text that must be present (natural-key fields)
pub(crate) fn required_text(record: &Record<'_>, column: &str) -> Result<String> {
    optional_text(record, column).ok_or_else(|| {
        CatalogError::invalid_row(record.sheet_name(), record.row_number, column, "required value is empty")
    })
}

/// Monetary amount; empty cells count as zero
pub(crate) fn amount(record: &Record<'_>, column: &str) -> Result<f64> {
    let cell = record.get(column);
    if cell.is_empty() {
        return Ok(0.0);
    }

    cell.as_f64().ok_or_else(|| {
        CatalogError::invalid_row(
            record.sheet_name(),
            record.row_number,
            column,
            format!("'{}' is not a number", cell.as_text().unwrap_or_default()),
        )
    })
}

pub(crate) fn required_integer(record: &Record<'_>, column: &str) -> Result<i64> {
    let cell = record.get(column);
    cell.as_i64().ok_or_else(|| {
        CatalogError::invalid_row(
            record.sheet_name(),
            record.row_number,
            column,
            format!("'{}' is not an integer", cell.as_text().unwrap_or_default()),
        )
    })
}

/// Yes/no flag; empty cells count as false
pub(crate) fn flag(record: &Record<'_>, column: &str) -> Result<bool> {
    let cell = record.get(column);
    let parsed = match cell {
        Cell::Empty => Some(false),
        Cell::Bool(b) => Some(*b),
        Cell::Int(i) => Some(*i != 0),
        Cell::Float(f) => Some(*f != 0.0),
        Cell::Text(_) => match normalize_cell(cell).as_deref() {
            None | Some("") => Some(false),
            Some("1" | "SI" | "S" | "TRUE" | "VERDADERO" | "YES" | "Y" | "ACTIVO" | "X") => Some(true),
            Some("0" | "NO" | "N" | "FALSE" | "FALSO" | "INACTIVO") => Some(false),
            Some(_) => None,
        },
    };

    parsed.ok_or_else(|| {
        CatalogError::invalid_row(
            record.sheet_name(),
            record.row_number,
            column,
            format!("'{}' is not a yes/no value", cell.as_text().unwrap_or_default()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Sheet;

    fn sheet() -> Sheet {
        Sheet::new("Contract", &["Amount", "Active", "Year", "Name"])
            .with_row(vec![Cell::Empty, "Sí".into(), Cell::Float(2024.0), " contrato ".into()])
            .with_row(vec!["abc".into(), "maybe".into(), "20x4".into(), Cell::Empty])
    }

    #[test]
    fn test_helpers_on_good_row() {
        let sheet = sheet();
        let record = sheet.records().next().unwrap();

        assert_eq!(amount(&record, "Amount").unwrap(), 0.0);
        assert!(flag(&record, "Active").unwrap());
        assert_eq!(required_integer(&record, "Year").unwrap(), 2024);
        assert_eq!(required_text(&record, "Name").unwrap(), "CONTRATO");
    }

    #[test]
    fn test_helpers_on_bad_row() {
        let sheet = sheet();
        let record = sheet.records().nth(1).unwrap();

        assert!(amount(&record, "Amount").is_err());
        assert!(flag(&record, "Active").is_err());
        assert!(required_integer(&record, "Year").is_err());

        match required_text(&record, "Name").unwrap_err() {
            CatalogError::InvalidRow { sheet, row, column, .. } => {
                assert_eq!(sheet, "Contract");
                assert_eq!(row, 3);
                assert_eq!(column, "Name");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_outcome_from_changes() {
        assert_eq!(InsertOutcome::from_changes(1), InsertOutcome::Inserted);
        assert_eq!(InsertOutcome::from_changes(0), InsertOutcome::Skipped);
    }
}
