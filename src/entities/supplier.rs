// 🧾 Supplier Entity - natural key: RFC (tax id), globally unique

use super::{optional_text, required_text, CatalogEntity, InsertOutcome};
use crate::error::Result;
use crate::schema::SUPPLIER_SHEET;
use crate::workbook::Record;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub rfc: String,
    pub legal_name: Option<String>,
    pub person_type: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
}

impl CatalogEntity for Supplier {
    const SHEET: &'static str = SUPPLIER_SHEET;

    fn from_record(record: &Record<'_>) -> Result<Self> {
        Ok(Supplier {
            rfc: required_text(record, "RFC")?,
            legal_name: optional_text(record, "Legal Name"),
            person_type: optional_text(record, "Person Type"),
            phone: optional_text(record, "Phone"),
            email: optional_text(record, "Email"),
            status: optional_text(record, "Status"),
        })
    }

    fn natural_key(&self) -> String {
        self.rfc.clone()
    }

    fn insert_if_absent(&self, conn: &Connection, _row_number: usize) -> Result<InsertOutcome> {
        let changes = conn.execute(
            "INSERT INTO supplier (rfc, legal_name, person_type, phone, email, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT DO NOTHING",
            params![
                self.rfc,
                self.legal_name,
                self.person_type,
                self.phone,
                self.email,
                self.status,
            ],
        )?;

        Ok(InsertOutcome::from_changes(changes))
    }
}

/// Exact lookup by canonical RFC
pub fn find_supplier(conn: &Connection, rfc: &str) -> Result<Option<Supplier>> {
    let supplier = conn
        .query_row(
            "SELECT rfc, legal_name, person_type, phone, email, status
             FROM supplier
             WHERE rfc = ?1",
            params![rfc],
            |row| {
                Ok(Supplier {
                    rfc: row.get(0)?,
                    legal_name: row.get(1)?,
                    person_type: row.get(2)?,
                    phone: row.get(3)?,
                    email: row.get(4)?,
                    status: row.get(5)?,
                })
            },
        )
        .optional()?;

    Ok(supplier)
}
