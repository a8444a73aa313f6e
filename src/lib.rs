//! # labelscan
//!
//! Read garment labels from a photo, a PDF or a live camera frame with a
//! multimodal recognition service, and export one structured record per
//! label.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload / URL / camera still
//!  │
//!  ├─ 1. Input      validate type + size, base64-encode
//!  ├─ 2. Service    one schema-constrained call (Gemini or any edgequake-llm provider)
//!  ├─ 3. Parse      JSON array → LabelRecord, raw_text enforced
//!  ├─ 4. Normalize  split stacked titles, fixed 7 columns
//!  └─ 5. Export     delimited text, .xlsx workbook, single-field copy
//! ```
//!
//! [`LabelPipeline`] wraps the steps in the observable
//! idle → processing → success | error state machine; [`CaptureSession`]
//! drives a camera and hands stills to it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labelscan::{extract, to_delimited_text, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Service auto-detected from GEMINI_API_KEY / API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let result = extract("labels.jpg", &config).await?;
//!     println!("{}", to_delimited_text(&result.labels)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `labelscan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! labelscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capture;
pub mod config;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capture::{
    CaptureDevice, CaptureSession, CaptureState, DeviceError, DeviceErrorKind, DeviceEvent,
    FacingMode, FileFrameDevice, StreamConstraints, VideoStream,
};
pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{CaptureFailure, LabelScanError};
pub use extract::{extract, extract_bytes, extract_staged, extract_sync, extract_to_file, resolve_service};
pub use lifecycle::{LabelPipeline, PipelineState};
pub use output::{ExtractionResult, LabelField, LabelRecord};
pub use pipeline::export::{copy_field, to_delimited_text, to_spreadsheet, write_spreadsheet, REPORT_FILENAME};
pub use pipeline::input::{MediaType, StagedInput};
pub use pipeline::service::{GeminiService, ProviderService, RecognitionRequest, RecognitionService};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
