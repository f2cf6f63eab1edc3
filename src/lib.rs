// CFDI Catalog - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod normalize;
pub mod schema;
pub mod workbook;
pub mod xml;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{insert_import, recent_imports, setup_database, ImportRecord, Store};
pub use entities::{Area, CatalogEntity, Contract, InsertOutcome, LineItem, LineItemOption, Supplier};
pub use error::{CatalogError, ErrorKind, LookupFailure, Result};
pub use ingest::{
    BatchReport, CatalogImporter, DocumentOutcome, DocumentSummary, EntityCounts, IngestOptions, IngestReport,
};
pub use matcher::{InvoiceMatch, InvoiceMatcher};
pub use normalize::normalize;
pub use schema::{SchemaValidator, SheetSpec, ValidationError, ValidationResult, REQUIRED_SHEETS};
pub use workbook::{detect_format, Cell, DocumentFormat, Record, Sheet, SourceDocument, Workbook};
pub use xml::{parse_xml, XmlElement, XmlValue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
