//! Pipeline stages for label extraction.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ service ──▶ parse ──▶ normalize ──▶ export
//! (stage)   (base64)   (vision)    (JSON)    (7 columns)   (csv/xlsx)
//! ```
//!
//! 1. [`input`]   — validate an upload, a URL download or a camera still and
//!    stage it for extraction
//! 2. [`encode`]  — base64 payloads, data-URL splitting, JPEG stills
//! 3. [`service`] — the recognition service seam; the only stage with
//!    network I/O
//! 4. [`parse`]   — the service's text → ordered `LabelRecord`s, enforcing
//!    the `raw_text` invariant
//! 5. [`normalize`] — split stacked titles and flatten to export rows
//! 6. [`export`]  — delimited text, spreadsheet bytes, single-field copy

pub mod encode;
pub mod export;
pub mod input;
pub mod normalize;
pub mod parse;
pub mod service;
