// 📄 Contract Entity - procurement contract scoped to one Area
//
// Natural key: contract_number.
// The Area reference must already exist (hard check); the primary supplier
// RFC is stored as given.

use super::area::find_area_id;
use super::{amount, flag, optional_text, required_integer, required_text, CatalogEntity, InsertOutcome};
use crate::error::{CatalogError, Result};
use crate::schema::CONTRACT_SHEET;
use crate::workbook::Record;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_number: String,
    pub description: Option<String>,
    pub fiscal_year: i64,
    pub month: Option<String>,
    pub general_status: Option<String>,
    pub total_amount: f64,
    pub max_amount: f64,
    pub active: bool,
    /// Canonical area code, resolved to `area.id` at insertion
    pub area_code: String,
    pub supplier_rfc: Option<String>,
}

impl CatalogEntity for Contract {
    const SHEET: &'static str = CONTRACT_SHEET;

    fn from_record(record: &Record<'_>) -> Result<Self> {
        Ok(Contract {
            contract_number: required_text(record, "Contract No.")?,
            description: optional_text(record, "Description"),
            fiscal_year: required_integer(record, "Fiscal Year")?,
            month: optional_text(record, "Month"),
            general_status: optional_text(record, "General Status"),
            total_amount: amount(record, "Total Amount")?,
            max_amount: amount(record, "Max Amount")?,
            active: flag(record, "Active")?,
            area_code: required_text(record, "Area")?,
            supplier_rfc: optional_text(record, "Supplier RFC"),
        })
    }

    fn natural_key(&self) -> String {
        self.contract_number.clone()
    }

    fn insert_if_absent(&self, conn: &Connection, row_number: usize) -> Result<InsertOutcome> {
        // Resolution happens before the duplicate check: a contract whose area is
        // unknown fails even if its number is already stored
        let area_id = find_area_id(conn, &self.area_code)?.ok_or_else(|| CatalogError::ReferenceResolution {
            sheet: CONTRACT_SHEET.to_string(),
            row: row_number,
            contract: self.contract_number.clone(),
            area: self.area_code.clone(),
        })?;

        let changes = conn.execute(
            "INSERT INTO contract (
                contract_number, description, fiscal_year, month, general_status,
                total_amount, max_amount, active, area_id, supplier_rfc
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT DO NOTHING",
            params![
                self.contract_number,
                self.description,
                self.fiscal_year,
                self.month,
                self.general_status,
                self.total_amount,
                self.max_amount,
                self.active,
                area_id,
                self.supplier_rfc,
            ],
        )?;

        Ok(InsertOutcome::from_changes(changes))
    }
}

/// Stored contract by canonical number
pub fn find_contract(conn: &Connection, contract_number: &str) -> Result<Option<Contract>> {
    let contract = conn
        .query_row(
            "SELECT c.contract_number, c.description, c.fiscal_year, c.month, c.general_status,
                    c.total_amount, c.max_amount, c.active, a.code, c.supplier_rfc
             FROM contract c
             JOIN area a ON a.id = c.area_id
             WHERE c.contract_number = ?1",
            params![contract_number],
            |row| {
                Ok(Contract {
                    contract_number: row.get(0)?,
                    description: row.get(1)?,
                    fiscal_year: row.get(2)?,
                    month: row.get(3)?,
                    general_status: row.get(4)?,
                    total_amount: row.get(5)?,
                    max_amount: row.get(6)?,
                    active: row.get(7)?,
                    area_code: row.get(8)?,
                    supplier_rfc: row.get(9)?,
                })
            },
        )
        .optional()?;

    Ok(contract)
}
