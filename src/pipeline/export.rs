//! Tabular export: delimited text and a single-sheet spreadsheet workbook.
//!
//! Both formats share the row model in [`super::normalize`], so a label
//! exports to the same seven cells in either.

use crate::error::LabelScanError;
use crate::output::{LabelField, LabelRecord};
use crate::pipeline::normalize::{rows, COLUMNS, COLUMN_WIDTHS};
use rust_xlsxwriter::{Workbook, XlsxError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Default workbook file name.
pub const REPORT_FILENAME: &str = "Label_Extraction_Report.xlsx";

/// Name of the only worksheet in the workbook.
pub const SHEET_NAME: &str = "Labels";

impl From<XlsxError> for LabelScanError {
    fn from(e: XlsxError) -> Self {
        LabelScanError::ExportFailed(e.to_string())
    }
}

impl From<csv::Error> for LabelScanError {
    fn from(e: csv::Error) -> Self {
        LabelScanError::ExportFailed(e.to_string())
    }
}

/// Render labels as comma-delimited text.
///
/// The header line is always present. A cell is quoted only when it holds a
/// comma, a quote or a line break; embedded quotes are doubled. Lines are
/// separated by `\n` with no trailing terminator.
///
/// A bare `\r` counts as a line break, so a cell holding one is quoted too.
pub fn to_delimited_text(labels: &[LabelRecord]) -> Result<String, LabelScanError> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);

    wtr.write_record(COLUMNS)?;
    for row in rows(labels) {
        wtr.write_record(row.cells())?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| LabelScanError::ExportFailed(e.to_string()))?;
    let mut text =
        String::from_utf8(bytes).map_err(|e| LabelScanError::ExportFailed(e.to_string()))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Build the workbook in memory and return its bytes.
pub fn to_spreadsheet(labels: &[LabelRecord]) -> Result<Vec<u8>, LabelScanError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, (header, width)) in COLUMNS.iter().zip(COLUMN_WIDTHS).enumerate() {
        let col = col as u16;
        sheet.write_string(0, col, *header)?;
        sheet.set_column_width(col, width)?;
    }

    for (i, row) in rows(labels).iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.cells().iter().enumerate() {
            sheet.write_string(r, col as u16, cell.as_str())?;
        }
    }

    let buf = workbook.save_to_buffer()?;
    debug!("Built workbook: {} rows, {} bytes", labels.len(), buf.len());
    Ok(buf)
}

/// Write the workbook to `path`.
///
/// The bytes land in a sibling temp file first and are renamed into place,
/// so a failed export never leaves a truncated file behind.
pub fn write_spreadsheet(labels: &[LabelRecord], path: &Path) -> Result<PathBuf, LabelScanError> {
    let bytes = to_spreadsheet(labels)?;
    write_atomic(path, &bytes)?;
    info!("Wrote {} labels to {}", labels.len(), path.display());
    Ok(path.to_path_buf())
}

/// Write `bytes` to `path` via temp file + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LabelScanError> {
    let io_err = |source: std::io::Error| LabelScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Copy one field of one label, verbatim.
///
/// Returns `None` when the index is out of range or the field is empty.
pub fn copy_field(labels: &[LabelRecord], index: usize, field: LabelField) -> Option<String> {
    labels
        .get(index)
        .and_then(|l| l.field(field))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "TITLE,SUB-TITLE,STYLE,COLOR,SIZE,ORDER,BARCODE";

    fn label(raw: &str) -> LabelRecord {
        LabelRecord {
            raw_text: raw.into(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_list_is_header_only() {
        assert_eq!(to_delimited_text(&[]).unwrap(), HEADER);
    }

    #[test]
    fn bare_record_is_six_commas() {
        let text = to_delimited_text(&[label("X")]).unwrap();
        assert_eq!(text, format!("{HEADER}\n,,,,,,"));
    }

    #[test]
    fn quotes_are_doubled_and_wrapped() {
        let rec = LabelRecord {
            color: Some(r#"He said "hi", ok"#.into()),
            ..label("X")
        };
        let text = to_delimited_text(&[rec]).unwrap();
        assert_eq!(
            text.lines().nth(1),
            Some(r#",,,"He said ""hi"", ok",,,"#)
        );
    }

    #[test]
    fn carriage_return_is_quoted() {
        let rec = LabelRecord {
            color: Some("a\rb".into()),
            ..label("X")
        };
        let text = to_delimited_text(&[rec]).unwrap();
        assert_eq!(text, format!("{HEADER}\n,,,\"a\rb\",,,"));
    }

    #[test]
    fn stacked_title_fills_two_columns() {
        let rec = LabelRecord {
            title: Some("A\nB C".into()),
            model: Some("M1".into()),
            barcode_value: Some("0123".into()),
            ..label("X")
        };
        let text = to_delimited_text(&[rec]).unwrap();
        assert_eq!(text, format!("{HEADER}\nA,B C,M1,,,,0123"));
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn rows_keep_label_order() {
        let a = LabelRecord { model: Some("first".into()), ..label("1") };
        let b = LabelRecord { model: Some("second".into()), ..label("2") };
        let text = to_delimited_text(&[a, b]).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("first"));
        assert!(lines[2].contains("second"));
    }

    #[test]
    fn workbook_is_a_zip_container() {
        let bytes = to_spreadsheet(&[label("X")]).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn workbook_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REPORT_FILENAME);
        write_spreadsheet(&[label("X")], &path).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"PK");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn copy_field_by_index() {
        let rec = LabelRecord {
            barcode_value: Some("5012345678900".into()),
            ..label("X")
        };
        let labels = vec![label("first"), rec];
        assert_eq!(
            copy_field(&labels, 1, LabelField::BarcodeValue).as_deref(),
            Some("5012345678900")
        );
        assert_eq!(copy_field(&labels, 0, LabelField::BarcodeValue), None);
        assert_eq!(copy_field(&labels, 5, LabelField::RawText), None);
    }
}
