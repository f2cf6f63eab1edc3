// 🔤 Text Normalizer - canonical form for every compared/stored text field
//
// trim → NFKD → drop combining marks → uppercase

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::workbook::Cell;

fn strip_marks(value: &str) -> String {
    value.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Canonicalize a text value. Idempotent.
pub fn normalize(value: &str) -> String {
    // Uppercasing can reintroduce marks (e.g. 'ǰ' → 'J' + caron), so strip again after it
    strip_marks(&strip_marks(value.trim()).to_uppercase())
}

/// Null in, null out
pub fn normalize_opt(value: Option<&str>) -> Option<String> {
    value.map(normalize)
}

/// Normalize a spreadsheet cell; empty cells are null
pub fn normalize_cell(cell: &Cell) -> Option<String> {
    cell.as_text().as_deref().map(normalize)
}
