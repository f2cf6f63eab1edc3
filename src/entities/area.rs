// 🏢 Area Entity - organizational unit catalog entry
// Natural key: (code, description)

use super::{optional_text, required_text, CatalogEntity, InsertOutcome};
use crate::error::Result;
use crate::schema::AREA_SHEET;
use crate::workbook::Record;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub code: String,
    pub description: String,
    pub aux1: Option<String>,
}

impl CatalogEntity for Area {
    const SHEET: &'static str = AREA_SHEET;

    fn from_record(record: &Record<'_>) -> Result<Self> {
        Ok(Area {
            code: required_text(record, "Area")?,
            description: required_text(record, "Description")?,
            aux1: optional_text(record, "Aux1"),
        })
    }

    fn natural_key(&self) -> String {
        format!("{} / {}", self.code, self.description)
    }

    fn insert_if_absent(&self, conn: &Connection, _row_number: usize) -> Result<InsertOutcome> {
        let changes = conn.execute(
            "INSERT INTO area (code, description, aux1)
             VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![self.code, self.description, self.aux1],
        )?;

        Ok(InsertOutcome::from_changes(changes))
    }
}

/// Resolve an area reference by its canonical code.
///
/// Several areas may share a code under different descriptions; the first
/// one stored wins.
pub fn find_area_id(conn: &Connection, code: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM area WHERE code = ?1 ORDER BY id LIMIT 1",
            params![code],
            |row| row.get(0),
        )
        .optional()?;

    Ok(id)
}

pub fn all_areas(conn: &Connection) -> Result<Vec<Area>> {
    let mut stmt = conn.prepare("SELECT code, description, aux1 FROM area ORDER BY id")?;

    let areas = stmt
        .query_map([], |row| {
            Ok(Area {
                code: row.get(0)?,
                description: row.get(1)?,
                aux1: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(areas)
}
