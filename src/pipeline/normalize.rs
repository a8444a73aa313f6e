//! Flatten label records into fixed seven-column export rows.
//!
//! Column order is fixed: TITLE, SUB-TITLE, STYLE, COLOR, SIZE, ORDER,
//! BARCODE. The stacked title is split into its first line and the rest;
//! every missing field becomes an empty cell.

use crate::output::LabelRecord;

/// Export column headers, in order.
pub const COLUMNS: [&str; 7] = [
    "TITLE",
    "SUB-TITLE",
    "STYLE",
    "COLOR",
    "SIZE",
    "ORDER",
    "BARCODE",
];

/// Spreadsheet column widths, in characters, parallel to [`COLUMNS`].
pub const COLUMN_WIDTHS: [f64; 7] = [25.0, 15.0, 25.0, 15.0, 12.0, 15.0, 22.0];

/// One flattened label, cells parallel to [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportRow(pub [String; 7]);

impl ExportRow {
    pub fn cells(&self) -> &[String; 7] {
        &self.0
    }
}

/// Split a stacked title into `(line1, line2)`.
///
/// `line1` is the first `\n` segment trimmed; `line2` is every later segment
/// joined by a single space, then trimmed. A missing title gives two empty
/// strings.
pub fn split_title(title: Option<&str>) -> (String, String) {
    let Some(title) = title else {
        return (String::new(), String::new());
    };
    let mut parts = title.split('\n');
    let line1 = parts.next().unwrap_or_default().trim().to_string();
    let line2 = parts.collect::<Vec<_>>().join(" ").trim().to_string();
    (line1, line2)
}

/// Normalize one record into an export row.
pub fn to_row(label: &LabelRecord) -> ExportRow {
    let (line1, line2) = split_title(label.title.as_deref());
    let cell = |v: &Option<String>| v.clone().unwrap_or_default();
    ExportRow([
        line1,
        line2,
        cell(&label.model),
        cell(&label.color),
        cell(&label.size),
        cell(&label.order_reference),
        cell(&label.barcode_value),
    ])
}

/// Normalize records into rows, preserving order.
pub fn rows(labels: &[LabelRecord]) -> Vec<ExportRow> {
    labels.iter().map(to_row).collect()
}
