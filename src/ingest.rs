// 📥 Catalog Upsert Engine
//
// validated workbook → canonical rows → insert-if-absent, in dependency order:
//   Area → Supplier → Contract (needs Area) → LineItem
//
// One transaction per document: either every row of the document lands, or none.

use crate::db::{insert_import, ImportRecord, Store};
use crate::entities::{Area, CatalogEntity, Contract, InsertOutcome, LineItem, Supplier};
use crate::error::{CatalogError, ErrorKind, Result};
use crate::schema::{SchemaValidator, ValidationError};
use crate::workbook::{SourceDocument, Workbook};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub inserted: usize,
    pub skipped: usize,
}

impl EntityCounts {
    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Per-entity counts for one committed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub file: String,
    pub area: EntityCounts,
    pub supplier: EntityCounts,
    pub contract: EntityCounts,
    pub line_item: EntityCounts,
}

impl IngestReport {
    /// Counts in processing order, labelled by sheet
    pub fn entries(&self) -> [(&'static str, EntityCounts); 4] {
        [
            (Area::SHEET, self.area),
            (Supplier::SHEET, self.supplier),
            (Contract::SHEET, self.contract),
            (LineItem::SHEET, self.line_item),
        ]
    }

    pub fn total_inserted(&self) -> usize {
        self.entries().iter().map(|(_, c)| c.inserted).sum()
    }

    fn counts_json(&self) -> Result<serde_json::Value> {
        let counts: serde_json::Map<String, serde_json::Value> = self
            .entries()
            .iter()
            .map(|(name, counts)| -> Result<(String, serde_json::Value)> {
                Ok((name.to_string(), serde_json::to_value(counts)?))
            })
            .collect::<Result<_>>()?;
        Ok(serde_json::Value::Object(counts))
    }
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (name, counts)) in self.entries().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: Inserted={}, Skipped={}", name, counts.inserted, counts.skipped)?;
        }
        Ok(())
    }
}

/// Outcome of one document in a batch; siblings never affect each other
#[derive(Debug)]
pub struct DocumentOutcome {
    pub file: String,
    pub result: Result<IngestReport>,
}

/// Serializable view of a [`DocumentOutcome`]
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub file: String,
    pub imported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl DocumentOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn summary(&self) -> DocumentSummary {
        match &self.result {
            Ok(report) => DocumentSummary {
                file: self.file.clone(),
                imported: true,
                kind: None,
                report: Some(report.clone()),
                issues: Vec::new(),
                errors: Vec::new(),
            },
            Err(e) => DocumentSummary {
                file: self.file.clone(),
                imported: false,
                kind: Some(e.kind()),
                report: None,
                issues: match e {
                    CatalogError::Structural(issues) => issues.clone(),
                    _ => Vec::new(),
                },
                errors: e.details(),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<DocumentOutcome>,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.documents.iter().filter(|d| !d.is_ok()).count()
    }

    pub fn summaries(&self) -> Vec<DocumentSummary> {
        self.documents.iter().map(DocumentOutcome::summary).collect()
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for doc in &self.documents {
            match &doc.result {
                Ok(report) => {
                    writeln!(f, "File: {} - processed successfully", doc.file)?;
                    for line in report.to_string().lines() {
                        writeln!(f, "  {}", line)?;
                    }
                }
                Err(e) => {
                    writeln!(f, "File: {} - Errors", doc.file)?;
                    for detail in e.details() {
                        for (i, line) in detail.lines().enumerate() {
                            let bullet = if i == 0 { "- " } else { "  " };
                            writeln!(f, "  {}{}", bullet, line)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// IMPORTER
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Wall-clock budget for one document; checked between rows
    pub deadline: Option<Duration>,
}

pub struct CatalogImporter {
    store: Store,
    validator: SchemaValidator,
    options: IngestOptions,
}

impl CatalogImporter {
    pub fn new(store: Store) -> Self {
        CatalogImporter {
            store,
            validator: SchemaValidator::new(),
            options: IngestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate and ingest one document inside a single transaction.
    ///
    /// Structural problems reject the document before the store is touched.
    /// Any row failure drops the transaction, rolling back every insert made
    /// for this document.
    pub fn ingest_document(&self, doc: &SourceDocument) -> Result<IngestReport> {
        self.validator
            .validate(&doc.workbook)
            .map_err(CatalogError::Structural)?;

        let deadline = self.options.deadline.map(|d| Instant::now() + d);

        let mut conn = self.store.connect()?;
        // Write lock at BEGIN: concurrent imports wait on busy_timeout instead of
        // failing a read-to-write upgrade
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let report = IngestReport {
            file: doc.name.clone(),
            area: ingest_sheet::<Area>(&tx, &doc.workbook, deadline)?,
            supplier: ingest_sheet::<Supplier>(&tx, &doc.workbook, deadline)?,
            contract: ingest_sheet::<Contract>(&tx, &doc.workbook, deadline)?,
            line_item: ingest_sheet::<LineItem>(&tx, &doc.workbook, deadline)?,
        };

        insert_import(&tx, &ImportRecord::new(&doc.name, &doc.digest, report.counts_json()?))?;
        tx.commit()?;

        info!(
            file = %doc.name,
            inserted = report.total_inserted(),
            "catalog document imported"
        );
        Ok(report)
    }

    /// Ingest documents one after another; each outcome is independent
    pub fn ingest_batch(&self, docs: &[SourceDocument]) -> BatchReport {
        let documents = docs
            .iter()
            .map(|doc| DocumentOutcome {
                file: doc.name.clone(),
                result: self.ingest_document(doc).inspect_err(|e| log_rejection(&doc.name, e)),
            })
            .collect();

        BatchReport { documents }
    }

    /// Ingest uploaded spreadsheet bodies as `(file name, bytes)` pairs
    pub fn ingest_uploads(&self, uploads: &[(String, Vec<u8>)]) -> BatchReport {
        let documents = uploads
            .iter()
            .map(|(name, bytes)| {
                let result = SourceDocument::from_xlsx_bytes(name, bytes)
                    .and_then(|doc| self.ingest_document(&doc))
                    .inspect_err(|e| log_rejection(name, e));
                DocumentOutcome {
                    file: name.clone(),
                    result,
                }
            })
            .collect();

        BatchReport { documents }
    }

    /// Load and ingest documents from disk; unreadable files become failed outcomes
    pub fn ingest_paths(&self, paths: &[PathBuf]) -> BatchReport {
        let documents = paths
            .iter()
            .map(|path| {
                let file = path.display().to_string();
                let result = SourceDocument::from_path(path)
                    .and_then(|doc| self.ingest_document(&doc))
                    .inspect_err(|e| log_rejection(&file, e));
                DocumentOutcome { file, result }
            })
            .collect();

        BatchReport { documents }
    }
}

fn log_rejection(file: &str, error: &CatalogError) {
    warn!(file = %file, kind = ?error.kind(), error = %error, "catalog document rejected");
}

fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(CatalogError::DeadlineExceeded),
        _ => Ok(()),
    }
}

/// Rows are processed strictly in order: later rows may reference entities
/// inserted by earlier ones in the same document
fn ingest_sheet<E: CatalogEntity>(
    conn: &Connection,
    workbook: &Workbook,
    deadline: Option<Instant>,
) -> Result<EntityCounts> {
    let sheet = workbook.sheet(E::SHEET).ok_or_else(|| {
        CatalogError::Structural(vec![ValidationError::MissingSheet {
            sheet: E::SHEET.to_string(),
        }])
    })?;

    let mut counts = EntityCounts::default();
    for record in sheet.records() {
        check_deadline(deadline)?;

        let entity = E::from_record(&record)?;
        let outcome = entity.insert_if_absent(conn, record.row_number)?;
        debug!(entity = E::SHEET, key = %entity.natural_key(), ?outcome, "row processed");
        counts.record(outcome);
    }

    Ok(counts)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, recent_imports};
    use crate::entities::contract::find_contract;
    use crate::schema::REQUIRED_SHEETS;
    use crate::workbook::{Cell, Sheet};
    use pretty_assertions::assert_eq;

    fn sheet(index: usize) -> Sheet {
        Sheet::new(REQUIRED_SHEETS[index].name, REQUIRED_SHEETS[index].columns)
    }

    fn catalog() -> Workbook {
        Workbook::new()
            .with_sheet(
                sheet(0)
                    .with_row(vec!["DG".into(), "Dirección General".into(), Cell::Empty])
                    .with_row(vec!["ADM".into(), "Administración".into(), "x".into()]),
            )
            .with_sheet(sheet(1).with_row(vec![
                "AAA010101AAA".into(),
                "Acme".into(),
                "Moral".into(),
                Cell::Empty,
                Cell::Empty,
                "Activo".into(),
            ]))
            .with_sheet(sheet(2).with_row(vec![
                "C-001".into(),
                "Limpieza".into(),
                Cell::Int(2024),
                "Enero".into(),
                "Vigente".into(),
                Cell::Float(1000.0),
                Cell::Float(1200.0),
                Cell::Float(500.0),
                Cell::Int(1),
                "dg".into(),
                "AAA010101AAA".into(),
            ]))
            .with_sheet(
                sheet(3)
                    .with_row(vec!["C-001".into(), "2110".into(), "Material".into(), Cell::Float(300.0), "AAA010101AAA".into()])
                    .with_row(vec!["C-001".into(), "3580".into(), "Servicio".into(), Cell::Float(700.0), "AAA010101AAA".into()]),
            )
    }

    fn importer() -> (tempfile::TempDir, Store, CatalogImporter) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("catalog.db")).unwrap();
        let importer = CatalogImporter::new(store.clone());
        (dir, store, importer)
    }

    #[test]
    fn test_first_import_inserts_everything() {
        let (_dir, _store, importer) = importer();
        let report = importer
            .ingest_document(&SourceDocument::in_memory("catalogo.xlsx", catalog()))
            .unwrap();

        assert_eq!(report.area, EntityCounts { inserted: 2, skipped: 0 });
        assert_eq!(report.supplier, EntityCounts { inserted: 1, skipped: 0 });
        assert_eq!(report.contract, EntityCounts { inserted: 1, skipped: 0 });
        assert_eq!(report.line_item, EntityCounts { inserted: 2, skipped: 0 });
    }

    #[test]
    fn test_idempotency_import_twice() {
        let (_dir, store, importer) = importer();
        let doc = SourceDocument::in_memory("catalogo.xlsx", catalog());

        importer.ingest_document(&doc).unwrap();
        let second = importer.ingest_document(&doc).unwrap();

        assert_eq!(second.total_inserted(), 0);
        assert_eq!(second.area.skipped, 2);
        assert_eq!(second.supplier.skipped, 1);
        assert_eq!(second.contract.skipped, 1);
        assert_eq!(second.line_item.skipped, 2);

        let conn = store.connect().unwrap();
        assert_eq!(count_rows(&conn, "area").unwrap(), 2);
        assert_eq!(count_rows(&conn, "line_item").unwrap(), 2);
    }

    #[test]
    fn test_duplicate_rows_within_one_document() {
        let (_dir, _store, importer) = importer();
        let mut wb = catalog();
        let dup = wb.sheets[0].rows[0].clone();
        // Differs only by case/accents: same canonical key
        let mut variant = dup.clone();
        variant[1] = "DIRECCION GENERAL".into();
        wb.sheets[0].rows.push(dup);
        wb.sheets[0].rows.push(variant);

        let report = importer
            .ingest_document(&SourceDocument::in_memory("dup.xlsx", wb))
            .unwrap();
        assert_eq!(report.area, EntityCounts { inserted: 2, skipped: 2 });
    }

    #[test]
    fn test_unresolved_area_rolls_back_whole_document() {
        let (_dir, store, importer) = importer();
        let mut wb = catalog();
        wb.sheets[2].rows[0][9] = "NOPE".into();

        let err = importer
            .ingest_document(&SourceDocument::in_memory("bad.xlsx", wb))
            .unwrap_err();
        assert!(matches!(err, CatalogError::ReferenceResolution { .. }));
        assert_eq!(err.kind(), ErrorKind::InputData);

        let conn = store.connect().unwrap();
        for table in ["area", "supplier", "contract", "line_item", "import_log"] {
            assert_eq!(count_rows(&conn, table).unwrap(), 0, "{} should be empty", table);
        }
    }

    #[test]
    fn test_area_from_earlier_document_resolves() {
        let (_dir, _store, importer) = importer();
        importer
            .ingest_document(&SourceDocument::in_memory("first.xlsx", catalog()))
            .unwrap();

        // Second document references DG without listing it
        let mut wb = catalog();
        wb.sheets[0].rows.clear();
        wb.sheets[2].rows[0][0] = "C-002".into();
        let report = importer
            .ingest_document(&SourceDocument::in_memory("second.xlsx", wb))
            .unwrap();
        assert_eq!(report.contract.inserted, 1);
    }

    #[test]
    fn test_structural_error_touches_nothing() {
        let (_dir, store, importer) = importer();
        let mut wb = catalog();
        wb.sheets.retain(|s| s.name != "LineItem");

        let err = importer
            .ingest_document(&SourceDocument::in_memory("partial.xlsx", wb))
            .unwrap_err();
        match err {
            CatalogError::Structural(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].sheet(), "LineItem");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let conn = store.connect().unwrap();
        assert_eq!(count_rows(&conn, "area").unwrap(), 0);
    }

    #[test]
    fn test_batch_continues_after_failure() {
        let (_dir, _store, importer) = importer();
        let mut broken = catalog();
        broken.sheets[1].headers.pop();

        let batch = importer.ingest_batch(&[
            SourceDocument::in_memory("broken.xlsx", broken),
            SourceDocument::in_memory("good.xlsx", catalog()),
        ]);

        assert_eq!(batch.documents.len(), 2);
        assert_eq!(batch.failed_count(), 1);
        assert!(!batch.documents[0].is_ok());
        assert!(batch.documents[1].is_ok());

        let summaries = batch.summaries();
        assert_eq!(summaries[0].kind, Some(ErrorKind::InputData));
        assert_eq!(summaries[0].issues.len(), 1);
        assert!(summaries[1].imported);

        let text = batch.to_string();
        assert!(text.contains("File: broken.xlsx - Errors"));
        assert!(text.contains("Area: Inserted=2, Skipped=0"));
    }

    /// Empty Area/Supplier sheets: the first statement of the transaction is
    /// the area lookup for the first contract
    fn contracts_only(prefix: &str, count: usize) -> Workbook {
        let mut contracts = sheet(2);
        for n in 0..count {
            contracts.push_row(vec![
                format!("{}-{}", prefix, n).as_str().into(),
                "Servicio".into(),
                Cell::Int(2024),
                "Marzo".into(),
                "Vigente".into(),
                Cell::Float(100.0),
                Cell::Float(100.0),
                Cell::Float(0.0),
                Cell::Int(1),
                "DG".into(),
                "AAA010101AAA".into(),
            ]);
        }

        Workbook::new()
            .with_sheet(sheet(0))
            .with_sheet(sheet(1))
            .with_sheet(contracts)
            .with_sheet(sheet(3))
    }

    #[test]
    fn test_concurrent_imports_share_one_store() {
        let (_dir, store, _importer) = importer();
        let threads = 4;
        let docs_per_thread = 5;
        let rows_per_doc = 10;

        let failures: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let importer = CatalogImporter::new(store.clone());
                    scope.spawn(move || {
                        let mut failures = Vec::new();
                        // Same keys in every thread
                        if let Err(e) = importer.ingest_document(&SourceDocument::in_memory("shared.xlsx", catalog())) {
                            failures.push(e.to_string());
                        }
                        for d in 0..docs_per_thread {
                            let doc = SourceDocument::in_memory(
                                &format!("t{}-d{}.xlsx", t, d),
                                contracts_only(&format!("T{}-D{}", t, d), rows_per_doc),
                            );
                            if let Err(e) = importer.ingest_document(&doc) {
                                failures.push(e.to_string());
                            }
                        }
                        failures
                    })
                })
                .collect();

            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(failures, Vec::<String>::new());

        let conn = store.connect().unwrap();
        assert_eq!(count_rows(&conn, "area").unwrap(), 2);
        assert_eq!(count_rows(&conn, "supplier").unwrap(), 1);
        assert_eq!(count_rows(&conn, "line_item").unwrap(), 2);
        assert_eq!(
            count_rows(&conn, "contract").unwrap(),
            1 + (threads * docs_per_thread * rows_per_doc) as i64
        );
        assert_eq!(
            count_rows(&conn, "import_log").unwrap(),
            (threads + threads * docs_per_thread) as i64
        );
    }

    #[test]
    fn test_unreadable_upload_is_failed_outcome() {
        let (_dir, store, importer) = importer();
        let batch = importer.ingest_uploads(&[("notes.xlsx".to_string(), b"plain text".to_vec())]);

        assert_eq!(batch.failed_count(), 1);
        let err = batch.documents[0].result.as_ref().unwrap_err();
        assert!(matches!(err, CatalogError::UnreadableWorkbook(_)));

        let conn = store.connect().unwrap();
        assert_eq!(count_rows(&conn, "import_log").unwrap(), 0);
    }

    #[test]
    fn test_import_log_written_on_commit() {
        let (_dir, store, importer) = importer();
        let mut doc = SourceDocument::in_memory("catalogo.xlsx", catalog());
        doc.digest = "deadbeef".to_string();
        importer.ingest_document(&doc).unwrap();

        let conn = store.connect().unwrap();
        let log = recent_imports(&conn, 5).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sha256, "deadbeef");
        assert_eq!(log[0].counts["LineItem"]["inserted"], 2);
    }

    #[test]
    fn test_expired_deadline_aborts_cleanly() {
        let (_dir, store, importer) = importer();
        let importer = importer.with_options(IngestOptions {
            deadline: Some(Duration::ZERO),
        });

        let err = importer
            .ingest_document(&SourceDocument::in_memory("slow.xlsx", catalog()))
            .unwrap_err();
        assert!(matches!(err, CatalogError::DeadlineExceeded));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);

        let conn = store.connect().unwrap();
        assert_eq!(count_rows(&conn, "area").unwrap(), 0);
    }

    #[test]
    fn test_stored_values_are_canonical() {
        let (_dir, store, importer) = importer();
        importer
            .ingest_document(&SourceDocument::in_memory("catalogo.xlsx", catalog()))
            .unwrap();

        let conn = store.connect().unwrap();
        let contract = find_contract(&conn, "C-001").unwrap().unwrap();
        assert_eq!(contract.month.as_deref(), Some("ENERO"));
        assert_eq!(contract.area_code, "DG");
    }

    #[test]
    fn test_report_display() {
        let report = IngestReport {
            file: "x.xlsx".to_string(),
            area: EntityCounts { inserted: 1, skipped: 2 },
            supplier: EntityCounts::default(),
            contract: EntityCounts::default(),
            line_item: EntityCounts { inserted: 0, skipped: 4 },
        };

        assert_eq!(
            report.to_string(),
            "Area: Inserted=1, Skipped=2\nSupplier: Inserted=0, Skipped=0\nContract: Inserted=0, Skipped=0\nLineItem: Inserted=0, Skipped=4"
        );
    }
}
