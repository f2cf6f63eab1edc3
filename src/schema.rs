// 📐 Shape Layer - Sheet Schema Validation
// Confirms each required sheet exists and carries exactly the expected columns

use crate::workbook::Workbook;
use serde::Serialize;

// ============================================================================
// SHEET CONTRACT
// ============================================================================

pub const AREA_SHEET: &str = "Area";
pub const SUPPLIER_SHEET: &str = "Supplier";
pub const CONTRACT_SHEET: &str = "Contract";
pub const LINE_ITEM_SHEET: &str = "LineItem";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetSpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Required sheets of a catalog document, in processing order
pub const REQUIRED_SHEETS: [SheetSpec; 4] = [
    SheetSpec {
        name: AREA_SHEET,
        columns: &["Area", "Description", "Aux1"],
    },
    SheetSpec {
        name: SUPPLIER_SHEET,
        columns: &["RFC", "Legal Name", "Person Type", "Phone", "Email", "Status"],
    },
    SheetSpec {
        name: CONTRACT_SHEET,
        columns: &[
            "Contract No.",
            "Description",
            "Fiscal Year",
            "Month",
            "General Status",
            "Total Amount",
            "Max Amount",
            "Min Amount",
            "Active",
            "Area",
            "Supplier RFC",
        ],
    },
    SheetSpec {
        name: LINE_ITEM_SHEET,
        columns: &[
            "Contract No.",
            "Line Item Code",
            "Short Description",
            "Assigned Amount",
            "Supplier RFC",
        ],
    },
];

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationError {
    MissingSheet {
        sheet: String,
    },
    ColumnMismatch {
        sheet: String,
        expected: Vec<String>,
        actual: Vec<String>,
        missing: Vec<String>,
        extra: Vec<String>,
    },
}

impl ValidationError {
    pub fn sheet(&self) -> &str {
        match self {
            ValidationError::MissingSheet { sheet } => sheet,
            ValidationError::ColumnMismatch { sheet, .. } => sheet,
        }
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingSheet { sheet } => {
                write!(f, "Missing required sheet: '{}'", sheet)
            }
            ValidationError::ColumnMismatch {
                sheet,
                expected,
                actual,
                missing,
                extra,
            } => write!(
                f,
                "Sheet '{}' has column differences:\n  Expected columns: {}\n  Actual columns: {}\n  Missing: {}\n  Extra: {}",
                sheet,
                expected.join(", "),
                actual.join(", "),
                list_or_none(missing),
                list_or_none(extra),
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

pub struct SchemaValidator {
    sheets: Vec<SheetSpec>,
}

impl SchemaValidator {
    /// Validator for the catalog document contract
    pub fn new() -> Self {
        SchemaValidator {
            sheets: REQUIRED_SHEETS.to_vec(),
        }
    }

    pub fn with_sheets(sheets: Vec<SheetSpec>) -> Self {
        SchemaValidator { sheets }
    }

    /// Check present sheets and their headers against the required set.
    /// Every required sheet is checked; a missing sheet skips its column check.
    pub fn validate_layout(&self, present: &[(&str, &[String])]) -> ValidationResult {
        let mut errors = Vec::new();

        for spec in &self.sheets {
            let Some((_, actual)) = present.iter().find(|(name, _)| *name == spec.name) else {
                errors.push(ValidationError::MissingSheet {
                    sheet: spec.name.to_string(),
                });
                continue;
            };

            let missing: Vec<String> = spec
                .columns
                .iter()
                .filter(|c| !actual.iter().any(|a| a == **c))
                .map(|c| c.to_string())
                .collect();

            // Unknown columns, plus repeats of a known one
            let mut seen: Vec<&str> = Vec::new();
            let mut extra = Vec::new();
            for column in actual.iter() {
                if !spec.columns.contains(&column.as_str()) || seen.contains(&column.as_str()) {
                    extra.push(column.clone());
                }
                seen.push(column);
            }

            if !missing.is_empty() || !extra.is_empty() {
                errors.push(ValidationError::ColumnMismatch {
                    sheet: spec.name.to_string(),
                    expected: spec.columns.iter().map(|c| c.to_string()).collect(),
                    actual: actual.to_vec(),
                    missing,
                    extra,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate a whole workbook; any issue rejects the document as a unit
    pub fn validate(&self, workbook: &Workbook) -> ValidationResult {
        let present: Vec<(&str, &[String])> = workbook
            .sheets
            .iter()
            .map(|s| (s.name.as_str(), s.headers.as_slice()))
            .collect();

        self.validate_layout(&present)
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Sheet;

    fn valid_workbook() -> Workbook {
        REQUIRED_SHEETS
            .iter()
            .fold(Workbook::new(), |wb, spec| wb.with_sheet(Sheet::new(spec.name, spec.columns)))
    }

    #[test]
    fn test_validate_valid_workbook() {
        let validator = SchemaValidator::new();
        assert!(validator.validate(&valid_workbook()).is_ok());
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let validator = SchemaValidator::new();
        let mut wb = valid_workbook();
        wb.sheets[0].headers.reverse();

        assert!(validator.validate(&wb).is_ok());
    }

    #[test]
    fn test_missing_sheet_is_named() {
        let validator = SchemaValidator::new();
        let mut wb = valid_workbook();
        wb.sheets.retain(|s| s.name != LINE_ITEM_SHEET);

        let errors = validator.validate(&wb).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MissingSheet {
                sheet: "LineItem".to_string()
            }]
        );
        assert!(errors[0].to_string().contains("'LineItem'"));
    }

    #[test]
    fn test_every_missing_sheet_reported() {
        let validator = SchemaValidator::new();
        let errors = validator.validate(&Workbook::new()).unwrap_err();

        let sheets: Vec<&str> = errors.iter().map(|e| e.sheet()).collect();
        assert_eq!(sheets, vec!["Area", "Supplier", "Contract", "LineItem"]);
    }

    #[test]
    fn test_column_mismatch_reports_both_directions() {
        let validator = SchemaValidator::new();
        let mut wb = valid_workbook();
        wb.sheets[1].headers = vec![
            "RFC".to_string(),
            "Legal Name".to_string(),
            "Person Type".to_string(),
            "Phone".to_string(),
            "E-mail".to_string(),
            "Status".to_string(),
        ];

        let errors = validator.validate(&wb).unwrap_err();
        assert_eq!(errors.len(), 1);

        match &errors[0] {
            ValidationError::ColumnMismatch { sheet, missing, extra, .. } => {
                assert_eq!(sheet, "Supplier");
                assert_eq!(missing, &vec!["Email".to_string()]);
                assert_eq!(extra, &vec!["E-mail".to_string()]);
            }
            other => panic!("unexpected issue: {:?}", other),
        }

        let message = errors[0].to_string();
        assert!(message.contains("Missing: Email"));
        assert!(message.contains("Extra: E-mail"));
    }

    #[test]
    fn test_only_extra_columns_still_rejected() {
        let validator = SchemaValidator::new();
        let mut wb = valid_workbook();
        wb.sheets[0].headers.push("Notes".to_string());

        let errors = validator.validate(&wb).unwrap_err();
        let message = errors[0].to_string();
        assert!(message.contains("Missing: none"));
        assert!(message.contains("Extra: Notes"));
    }

    #[test]
    fn test_duplicate_header_counts_as_extra() {
        let validator = SchemaValidator::new();
        let mut wb = valid_workbook();
        wb.sheets[0].headers.push("Area".to_string());

        assert!(validator.validate(&wb).is_err());
    }

    #[test]
    fn test_unrelated_sheets_are_ignored() {
        let validator = SchemaValidator::new();
        let wb = valid_workbook().with_sheet(Sheet::new("Notes", &["Anything"]));

        assert!(validator.validate(&wb).is_ok());
    }

    #[test]
    fn test_custom_contract() {
        let validator = SchemaValidator::with_sheets(vec![SheetSpec {
            name: "Only",
            columns: &["A"],
        }]);
        let headers = vec!["A".to_string()];

        assert!(validator.validate_layout(&[("Only", headers.as_slice())]).is_ok());
        assert!(validator.validate_layout(&[]).is_err());
    }
}
