//! Input acquisition: validate a user-supplied document and stage it for extraction.
//!
//! Every entry point ends in [`stage_bytes`]: local paths, in-memory buffers
//! (drag-and-drop, picker, HTTP upload), downloaded URLs and camera stills.
//!
//! The media type comes from the file name, like a browser's `File.type`,
//! and is then cross-checked against the magic bytes so a renamed `.txt`
//! never reaches the recognition service.

use crate::error::LabelScanError;
use crate::pipeline::encode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// The closed set of accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Jpeg,
    Png,
    Webp,
}

impl MediaType {
    /// Every accepted media type.
    pub const ALL: [MediaType; 4] = [
        MediaType::Pdf,
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::Webp,
    ];

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Webp => "image/webp",
        }
    }

    /// Resolve a declared MIME type (e.g. from a multipart upload).
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| m.mime_type() == mime)
    }

    /// Resolve from a file name's extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(MediaType::Pdf),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "png" => Some(MediaType::Png),
            "webp" => Some(MediaType::Webp),
            _ => None,
        }
    }

    /// Check the magic bytes agree with the declared type.
    pub fn matches_content(&self, bytes: &[u8]) -> bool {
        match self {
            MediaType::Pdf => bytes.starts_with(b"%PDF"),
            MediaType::Jpeg => image::guess_format(bytes).ok() == Some(image::ImageFormat::Jpeg),
            MediaType::Png => image::guess_format(bytes).ok() == Some(image::ImageFormat::Png),
            MediaType::Webp => image::guess_format(bytes).ok() == Some(image::ImageFormat::WebP),
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, MediaType::Pdf)
    }
}

/// A validated document, encoded and ready to embed in a request body.
#[derive(Clone, PartialEq, Eq)]
pub struct StagedInput {
    pub filename: String,
    pub media_type: MediaType,
    /// Base64 payload without any `data:` header.
    pub payload: String,
    /// Size of the original bytes.
    pub size_bytes: u64,
}

impl StagedInput {
    pub fn mime_type(&self) -> &'static str {
        self.media_type.mime_type()
    }
}

impl std::fmt::Debug for StagedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedInput")
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .field("size_bytes", &self.size_bytes)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Validate and encode an in-memory document.
///
/// The media type is taken from `name`; rejected types never touch the
/// pipeline state.
pub fn stage_bytes(name: &str, bytes: &[u8], max_bytes: u64) -> Result<StagedInput, LabelScanError> {
    let media_type =
        MediaType::from_filename(name).ok_or_else(|| LabelScanError::UnsupportedMediaType {
            name: name.to_string(),
        })?;
    stage_typed(name, media_type, bytes, max_bytes)
}

/// Validate and encode a document whose MIME type is declared separately.
pub fn stage_bytes_with_mime(
    name: &str,
    mime: &str,
    bytes: &[u8],
    max_bytes: u64,
) -> Result<StagedInput, LabelScanError> {
    let media_type =
        MediaType::from_mime_type(mime).ok_or_else(|| LabelScanError::UnsupportedMediaType {
            name: name.to_string(),
        })?;
    stage_typed(name, media_type, bytes, max_bytes)
}

/// Stage a `data:<mime>;base64,<payload>` URL, e.g. from a canvas snapshot.
pub fn stage_data_url(name: &str, data_url: &str, max_bytes: u64) -> Result<StagedInput, LabelScanError> {
    let (mime, payload) =
        encode::split_data_url(data_url).ok_or_else(|| LabelScanError::InvalidInput {
            input: name.to_string(),
        })?;
    let bytes = encode::decode_payload(payload).map_err(|_| LabelScanError::InvalidInput {
        input: name.to_string(),
    })?;
    stage_bytes_with_mime(name, mime, &bytes, max_bytes)
}

fn stage_typed(
    name: &str,
    media_type: MediaType,
    bytes: &[u8],
    max_bytes: u64,
) -> Result<StagedInput, LabelScanError> {
    let size = bytes.len() as u64;
    reject_oversize(name, size, max_bytes)?;
    if !media_type.matches_content(bytes) {
        return Err(LabelScanError::ContentMismatch {
            name: name.to_string(),
            declared: media_type.mime_type(),
        });
    }

    let payload = encode::encode_payload(bytes);
    debug!(
        "Staged '{}' ({}, {} bytes → {} base64 chars)",
        name,
        media_type.mime_type(),
        size,
        payload.len()
    );

    Ok(StagedInput {
        filename: name.to_string(),
        media_type,
        payload,
        size_bytes: size,
    })
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Stage a local path or an HTTP(S) URL.
pub async fn stage_input(
    input: &str,
    max_bytes: u64,
    download_timeout_secs: u64,
) -> Result<StagedInput, LabelScanError> {
    if is_url(input) {
        download_url(input, max_bytes, download_timeout_secs).await
    } else if input.trim().is_empty() {
        Err(LabelScanError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        stage_path(Path::new(input), max_bytes).await
    }
}

/// Read and stage a local file.
pub async fn stage_path(path: &Path, max_bytes: u64) -> Result<StagedInput, LabelScanError> {
    let name = display_name(path);
    // Reject by extension before reading anything.
    if MediaType::from_filename(&name).is_none() {
        return Err(LabelScanError::UnsupportedMediaType { name });
    }

    let io_error = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::NotFound => LabelScanError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => LabelScanError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => LabelScanError::Internal(format!("Failed to read {}: {}", path.display(), e)),
    };

    let size = tokio::fs::metadata(path).await.map_err(io_error)?.len();
    reject_oversize(&name, size, max_bytes)?;

    let bytes = tokio::fs::read(path).await.map_err(io_error)?;
    stage_bytes(&name, &bytes, max_bytes)
}

fn reject_oversize(name: &str, size: u64, max_bytes: u64) -> Result<(), LabelScanError> {
    if size > max_bytes {
        return Err(LabelScanError::FileTooLarge {
            name: name.to_string(),
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Download a URL and stage its body.
async fn download_url(url: &str, max_bytes: u64, timeout_secs: u64) -> Result<StagedInput, LabelScanError> {
    info!("Downloading label document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LabelScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            LabelScanError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            LabelScanError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(LabelScanError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).to_string());
    let filename = extract_filename(url);

    // Refuse before buffering when the server declares the length up front.
    if let Some(declared) = response.content_length() {
        reject_oversize(&filename, declared, max_bytes)?;
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| LabelScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    // The URL's extension wins; fall back to the server's Content-Type.
    match (MediaType::from_filename(&filename), declared_mime) {
        (None, Some(mime)) => stage_bytes_with_mime(&filename, &mime, &bytes, max_bytes),
        _ => stage_bytes(&filename, &bytes, max_bytes),
    }
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "download".to_string()
}

/// Name given to camera stills: `captured-label-<unix-millis>.jpg`.
pub fn capture_filename(unix_millis: u128) -> String {
    format!("captured-label-{unix_millis}.jpg")
}
