use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// STORE - scoped, per-operation connections
// ============================================================================

/// Handle to the catalog database.
///
/// Holds only the location; every operation calls [`Store::connect`] and the
/// connection is closed when it goes out of scope, on success or failure.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Store {
            path: path.as_ref().to_path_buf(),
        };
        let conn = store.connect()?;
        setup_database(&conn)?;
        Ok(store)
    }

    /// Fresh connection with the pragmas every catalog connection needs
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;

        // PRAGMA settings are per connection
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        debug!(path = %self.path.display(), "opened catalog connection");
        Ok(conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Catalog tables - natural keys enforced by UNIQUE constraints so that
    // insert-if-absent is a single atomic statement
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS area (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            aux1 TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (code, description)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS supplier (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rfc TEXT UNIQUE NOT NULL,
            legal_name TEXT,
            person_type TEXT,
            phone TEXT,
            email TEXT,
            status TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // supplier_rfc is deliberately not a foreign key
    conn.execute(
        "CREATE TABLE IF NOT EXISTS contract (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contract_number TEXT UNIQUE NOT NULL,
            description TEXT,
            fiscal_year INTEGER,
            month TEXT,
            general_status TEXT,
            total_amount REAL NOT NULL DEFAULT 0,
            max_amount REAL NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 0,
            area_id INTEGER NOT NULL REFERENCES area(id),
            supplier_rfc TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // contract_number is deliberately not a foreign key
    conn.execute(
        "CREATE TABLE IF NOT EXISTS line_item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contract_number TEXT NOT NULL,
            line_item_code TEXT NOT NULL,
            short_description TEXT,
            assigned_amount REAL NOT NULL DEFAULT 0,
            supplier_rfc TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (contract_number, line_item_code)
        )",
        [],
    )?;

    // ==========================================================================
    // Import log (one row per committed document)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id TEXT UNIQUE NOT NULL,
            file_name TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            counts TEXT NOT NULL,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute("CREATE INDEX IF NOT EXISTS idx_area_code ON area(code)", [])?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_line_item_supplier ON line_item(supplier_rfc)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_log_time ON import_log(imported_at)",
        [],
    )?;

    Ok(())
}

/// Row count of one catalog table
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let table = match table {
        "area" | "supplier" | "contract" | "line_item" | "import_log" => table,
        _ => return Err(rusqlite::Error::InvalidParameterName(table.to_string()).into()),
    };

    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;

    Ok(count)
}

// ============================================================================
// IMPORT LOG
// ============================================================================

/// Audit entry for one committed catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    pub import_id: String,
    pub file_name: String,
    pub sha256: String,
    pub counts: serde_json::Value,
    pub imported_at: DateTime<Utc>,
}

impl ImportRecord {
    pub fn new(file_name: &str, sha256: &str, counts: serde_json::Value) -> Self {
        ImportRecord {
            import_id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            sha256: sha256.to_string(),
            counts,
            imported_at: Utc::now(),
        }
    }
}

pub fn insert_import(conn: &Connection, record: &ImportRecord) -> Result<()> {
    let counts_json = serde_json::to_string(&record.counts)?;

    conn.execute(
        "INSERT INTO import_log (import_id, file_name, sha256, counts, imported_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.import_id,
            record.file_name,
            record.sha256,
            counts_json,
            record.imported_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

/// Most recent imports first
pub fn recent_imports(conn: &Connection, limit: usize) -> Result<Vec<ImportRecord>> {
    let mut stmt = conn.prepare(
        "SELECT import_id, file_name, sha256, counts, imported_at
         FROM import_log
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let records = stmt
        .query_map(params![limit as i64], |row| {
            let counts_json: String = row.get(3)?;
            let imported_at: String = row.get(4)?;

            Ok(ImportRecord {
                import_id: row.get(0)?,
                file_name: row.get(1)?,
                sha256: row.get(2)?,
                counts: serde_json::from_str(&counts_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
                })?,
                imported_at: DateTime::parse_from_rfc3339(&imported_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
                    })?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}
