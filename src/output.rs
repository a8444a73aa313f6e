//! Extraction output types.
//!
//! Field names on the wire follow the recognition-service schema
//! (`spn`, `barcode_value`, `raw_text`, …); the Rust names say what the
//! field means.

use serde::{Deserialize, Serialize};

/// One physical label found on the submitted document.
///
/// Only `raw_text` is required. Every other field is independently optional
/// and `None` is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelRecord {
    /// Stacked header lines joined by `\n`; the first line is the primary title.
    #[serde(default)]
    pub title: Option<String>,

    /// Style / model code.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub size: Option<String>,

    /// Order, SPN or factory reference.
    #[serde(default, rename = "spn")]
    pub order_reference: Option<String>,

    /// Barcode symbology, e.g. `EAN-13`.
    #[serde(default)]
    pub barcode_type: Option<String>,

    /// The literal payload printed under the barcode.
    #[serde(default)]
    pub barcode_value: Option<String>,

    /// Full text dump for this label.
    pub raw_text: String,
}

impl LabelRecord {
    /// Borrow a single field verbatim, for single-value copy.
    pub fn field(&self, field: LabelField) -> Option<&str> {
        match field {
            LabelField::Title => self.title.as_deref(),
            LabelField::Model => self.model.as_deref(),
            LabelField::Color => self.color.as_deref(),
            LabelField::Size => self.size.as_deref(),
            LabelField::OrderReference => self.order_reference.as_deref(),
            LabelField::BarcodeType => self.barcode_type.as_deref(),
            LabelField::BarcodeValue => self.barcode_value.as_deref(),
            LabelField::RawText => Some(self.raw_text.as_str()),
        }
    }
}

/// Addressable fields of a [`LabelRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelField {
    Title,
    Model,
    Color,
    Size,
    OrderReference,
    BarcodeType,
    BarcodeValue,
    RawText,
}

/// The outcome of one successful extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Name of the file (or capture) the labels were read from.
    pub filename: String,
    /// Labels in detection order. Empty means "no labels found".
    pub labels: Vec<LabelRecord>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}
