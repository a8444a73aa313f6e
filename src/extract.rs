//! One-shot extraction entry points and recognition-service resolution.
//!
//! These run a single extraction end to end without the observable state
//! machine in [`crate::lifecycle`]; the CLI and batch callers use them, and
//! the lifecycle uses [`recognize_labels`] for the service round trip.

use crate::config::{ExtractionConfig, DEFAULT_PROVIDER_MODEL};
use crate::error::LabelScanError;
use crate::output::{ExtractionResult, LabelRecord};
use crate::pipeline::export::{to_delimited_text, write_atomic, write_spreadsheet};
use crate::pipeline::input::{self, StagedInput};
use crate::pipeline::parse::parse_labels;
use crate::pipeline::service::{
    non_empty_env, GeminiService, ProviderService, RecognitionRequest, RecognitionService,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Extract labels from a local file path or HTTP/HTTPS URL.
///
/// # Errors
/// Validation failures (type, size, content mismatch) are returned before
/// any service is contacted. Service, credential and parse failures are
/// returned as-is; an empty label list is a success.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, LabelScanError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let staged =
        input::stage_input(input_str, config.max_upload_bytes, config.download_timeout_secs).await?;
    extract_staged(&staged, config).await
}

/// Extract labels from an in-memory document named `name`.
pub async fn extract_bytes(
    name: &str,
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionResult, LabelScanError> {
    let staged = input::stage_bytes(name, bytes, config.max_upload_bytes)?;
    extract_staged(&staged, config).await
}

/// Extract labels from an already-staged input.
pub async fn extract_staged(
    staged: &StagedInput,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, LabelScanError> {
    let service = resolve_service(config)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(&staged.filename, staged.mime_type());
    }

    match recognize_labels(service.as_ref(), staged, config).await {
        Ok(labels) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_extraction_complete(&staged.filename, labels.len());
            }
            Ok(ExtractionResult {
                filename: staged.filename.clone(),
                labels,
            })
        }
        Err(e) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_extraction_error(&staged.filename, &e.user_message());
            }
            Err(e)
        }
    }
}

/// Extract and write the result to `output_path`.
///
/// The format follows the extension: `.xlsx` writes the spreadsheet,
/// `.csv` the delimited text, `.json` the full result. Writes are atomic.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, LabelScanError> {
    let path = output_path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !matches!(ext.as_str(), "xlsx" | "csv" | "json") {
        return Err(LabelScanError::InvalidConfig(format!(
            "unsupported output format '{}': use .xlsx, .csv or .json",
            path.display()
        )));
    }

    let result = extract(input_str, config).await?;
    match ext.as_str() {
        "xlsx" => {
            write_spreadsheet(&result.labels, path)?;
        }
        "csv" => write_atomic(path, to_delimited_text(&result.labels)?.as_bytes())?,
        _ => {
            let json = serde_json::to_vec_pretty(&result)
                .map_err(|e| LabelScanError::ExportFailed(e.to_string()))?;
            write_atomic(path, &json)?;
        }
    }
    Ok(result)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, LabelScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LabelScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// One service round trip: build the request, call, parse.
///
/// No retries; a retry is the operator re-running the whole extraction.
pub async fn recognize_labels(
    service: &dyn RecognitionService,
    staged: &StagedInput,
    config: &ExtractionConfig,
) -> Result<Vec<LabelRecord>, LabelScanError> {
    let start = Instant::now();
    let request = RecognitionRequest::new(staged, config);
    debug!("Sending {:?} to {}", request, service.name());

    let body = service.recognize(&request).await?;
    let labels = parse_labels(&body)?;

    info!(
        "{}: {} labels in {}ms via {}",
        staged.filename,
        labels.len(),
        start.elapsed().as_millis(),
        service.name()
    );
    Ok(labels)
}

/// Resolve the recognition service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.service`), used as-is.
/// 2. **Named provider** (`config.provider_name`): `gemini` selects the
///    native Gemini backend, anything else goes through the
///    `edgequake-llm` provider factory.
/// 3. **Environment pair** (`LABELSCAN_PROVIDER` + `LABELSCAN_MODEL`), both
///    set and non-empty.
/// 4. **Gemini key** (`GEMINI_API_KEY` or `API_KEY`) → native Gemini.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// Every failure here is a configuration error.
pub fn resolve_service(config: &ExtractionConfig) -> Result<Arc<dyn RecognitionService>, LabelScanError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    if let Some(ref name) = config.provider_name {
        return named_service(name, config.model.as_deref(), config);
    }

    if let (Some(provider), Some(model)) = (
        non_empty_env("LABELSCAN_PROVIDER"),
        non_empty_env("LABELSCAN_MODEL"),
    ) {
        return named_service(&provider, Some(&model), config);
    }

    if config.api_key.is_some()
        || non_empty_env("GEMINI_API_KEY").is_some()
        || non_empty_env("API_KEY").is_some()
    {
        return Ok(Arc::new(GeminiService::from_config(config)?));
    }

    Ok(Arc::new(ProviderService::from_env(config.api_timeout_secs)?))
}

fn named_service(
    name: &str,
    model: Option<&str>,
    config: &ExtractionConfig,
) -> Result<Arc<dyn RecognitionService>, LabelScanError> {
    if name.eq_ignore_ascii_case("gemini") {
        let mut config = config.clone();
        config.model = model.map(str::to_string).or(config.model);
        return Ok(Arc::new(GeminiService::from_config(&config)?));
    }
    let model = model.unwrap_or(DEFAULT_PROVIDER_MODEL);
    Ok(Arc::new(ProviderService::from_name(
        name,
        model,
        config.api_timeout_secs,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct Canned(&'static str);

    #[async_trait]
    impl RecognitionService for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn recognize(&self, _r: &RecognitionRequest) -> Result<String, LabelScanError> {
            Ok(self.0.to_string())
        }
    }

    fn png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn config(body: &'static str) -> ExtractionConfig {
        ExtractionConfig::builder()
            .service(Arc::new(Canned(body)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn prebuilt_service_wins() {
        let cfg = config("[]");
        let service = resolve_service(&cfg).unwrap();
        assert_eq!(service.name(), "canned");
    }

    #[tokio::test]
    async fn bytes_extract_keeps_order_and_name() {
        let cfg = config(r#"[{"model":"A","raw_text":"1"},{"model":"B","raw_text":"2"}]"#);
        let result = extract_bytes("sheet.png", &png(), &cfg).await.unwrap();
        assert_eq!(result.filename, "sheet.png");
        assert_eq!(result.labels[0].model.as_deref(), Some("A"));
        assert_eq!(result.labels[1].model.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn rejected_type_never_reaches_service() {
        let cfg = config("[]");
        let err = extract_bytes("notes.txt", b"hello", &cfg).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn writes_csv_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("label.png");
        std::fs::write(&src, png()).unwrap();
        let out = dir.path().join("out.csv");

        let cfg = config(r#"[{"title":"A\nB C","raw_text":"X"}]"#);
        extract_to_file(src.to_string_lossy(), &out, &cfg).await.unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text, "TITLE,SUB-TITLE,STYLE,COLOR,SIZE,ORDER,BARCODE\nA,B C,,,,,");
    }

    #[tokio::test]
    async fn unknown_output_extension_is_rejected_up_front() {
        let cfg = config("[]");
        let err = extract_to_file("missing.png", "out.md", &cfg).await.unwrap_err();
        assert!(matches!(err, LabelScanError::InvalidConfig(_)));
    }
}
