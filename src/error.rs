// 🚨 Error taxonomy - what went wrong, and whose problem it is
//
// Input-data problems (bad spreadsheet, bad XML, dangling references) are kept
// apart from infrastructure problems (store unavailable, I/O) so callers can
// report them differently.

use crate::schema::ValidationError;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// ERROR KIND
// ============================================================================

/// Coarse classification used by reports and the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The uploaded document is wrong; the user must fix it
    InputData,
    /// The document is fine but the catalog has no match for it
    Lookup,
    /// The store or the filesystem failed
    Infrastructure,
}

// ============================================================================
// LOOKUP FAILURES (invoice path)
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LookupFailure {
    /// Issuer element or its tax-id attribute is absent
    #[error("issuer tax identifier not found in invoice")]
    IdentifierNotFound,

    #[error("unknown issuer: RFC {rfc} is not in the supplier catalog")]
    UnknownIssuer { rfc: String },

    #[error("no contracts associated with RFC {rfc}")]
    NoAssociatedContracts { rfc: String },

    #[error("no line items under contract {contract}")]
    NoLineItems { contract: String },
}

// ============================================================================
// CATALOG ERROR
// ============================================================================

#[derive(Error, Debug)]
pub enum CatalogError {
    /// Required sheet missing or column set mismatch; the document is rejected as a unit
    #[error("document failed structural validation ({} issue(s))", .0.len())]
    Structural(Vec<ValidationError>),

    /// A Contract row points at an Area that does not exist
    #[error("row {row} of sheet '{sheet}': area '{area}' not found for contract {contract}")]
    ReferenceResolution {
        sheet: String,
        row: usize,
        contract: String,
        area: String,
    },

    /// A row value is missing or cannot be interpreted
    #[error("row {row} of sheet '{sheet}', column '{column}': {reason}")]
    InvalidRow {
        sheet: String,
        row: usize,
        column: String,
        reason: String,
    },

    #[error("unreadable workbook: {0}")]
    UnreadableWorkbook(String),

    #[error("malformed XML: {0}")]
    MalformedXml(String),

    #[error(transparent)]
    Lookup(#[from] LookupFailure),

    #[error("processing deadline exceeded")]
    DeadlineExceeded,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Structural(_)
            | CatalogError::ReferenceResolution { .. }
            | CatalogError::InvalidRow { .. }
            | CatalogError::UnreadableWorkbook(_)
            | CatalogError::MalformedXml(_) => ErrorKind::InputData,
            CatalogError::Lookup(_) => ErrorKind::Lookup,
            CatalogError::DeadlineExceeded
            | CatalogError::Database(_)
            | CatalogError::Io(_)
            | CatalogError::Serialization(_) => ErrorKind::Infrastructure,
        }
    }

    /// Shorthand used by the row converters
    pub(crate) fn invalid_row(sheet: &str, row: usize, column: &str, reason: impl Into<String>) -> Self {
        CatalogError::InvalidRow {
            sheet: sheet.to_string(),
            row,
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    /// Human-readable detail lines (one per structural issue, otherwise the message)
    pub fn details(&self) -> Vec<String> {
        match self {
            CatalogError::Structural(issues) => issues.iter().map(|i| i.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
