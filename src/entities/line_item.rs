// 📑 LineItem Entity (partida) - budget line within a contract
//
// Natural key: (contract_number, line_item_code).
// The contract reference is stored as given, without an existence check.

use super::{amount, optional_text, required_text, CatalogEntity, InsertOutcome};
use crate::error::Result;
use crate::schema::LINE_ITEM_SHEET;
use crate::workbook::Record;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub contract_number: String,
    pub line_item_code: String,
    pub short_description: Option<String>,
    pub assigned_amount: f64,
    /// Issuing supplier; the invoice matcher keys on this
    pub supplier_rfc: Option<String>,
}

impl CatalogEntity for LineItem {
    const SHEET: &'static str = LINE_ITEM_SHEET;

    fn from_record(record: &Record<'_>) -> Result<Self> {
        Ok(LineItem {
            contract_number: required_text(record, "Contract No.")?,
            line_item_code: required_text(record, "Line Item Code")?,
            short_description: optional_text(record, "Short Description"),
            assigned_amount: amount(record, "Assigned Amount")?,
            supplier_rfc: optional_text(record, "Supplier RFC"),
        })
    }

    fn natural_key(&self) -> String {
        format!("{} / {}", self.contract_number, self.line_item_code)
    }

    fn insert_if_absent(&self, conn: &Connection, _row_number: usize) -> Result<InsertOutcome> {
        let changes = conn.execute(
            "INSERT INTO line_item (
                contract_number, line_item_code, short_description, assigned_amount, supplier_rfc
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT DO NOTHING",
            params![
                self.contract_number,
                self.line_item_code,
                self.short_description,
                self.assigned_amount,
                self.supplier_rfc,
            ],
        )?;

        Ok(InsertOutcome::from_changes(changes))
    }
}

/// Selectable line item under a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemOption {
    pub line_item_code: String,
    pub short_description: Option<String>,
}

/// Distinct contract numbers whose line items were issued by `rfc`,
/// in the order they were first stored
pub fn contracts_for_supplier(conn: &Connection, rfc: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT contract_number
         FROM line_item
         WHERE supplier_rfc = ?1
         GROUP BY contract_number
         ORDER BY MIN(id)",
    )?;

    let contracts = stmt
        .query_map(params![rfc], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(contracts)
}

/// Line items of one contract in storage order
pub fn line_items_for_contract(conn: &Connection, contract_number: &str) -> Result<Vec<LineItemOption>> {
    let mut stmt = conn.prepare(
        "SELECT line_item_code, short_description
         FROM line_item
         WHERE contract_number = ?1
         ORDER BY id",
    )?;

    let items = stmt
        .query_map(params![contract_number], |row| {
            Ok(LineItemOption {
                line_item_code: row.get(0)?,
                short_description: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(items)
}
