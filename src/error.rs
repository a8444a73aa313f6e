//! Error types for the labelscan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`LabelScanError`] — returned as `Err(..)` from every fallible operation:
//!   rejected uploads, recognition-service failures, unparseable responses,
//!   lifecycle misuse and export I/O.
//!
//! * [`CaptureFailure`] — the reason a camera session could not start. It is
//!   *stored* in [`crate::capture::CaptureState::Error`] rather than
//!   propagated, because a failed camera is a state the operator can retry
//!   or cancel out of, not an aborted call.

use std::path::PathBuf;
use thiserror::Error;

/// Message shown for any credential or provider-configuration failure.
pub const CONFIGURATION_MESSAGE: &str = "Invalid or missing API key. Please check your environment.";

/// All errors returned by the labelscan library.
#[derive(Debug, Error)]
pub enum LabelScanError {
    // ── Input validation ──────────────────────────────────────────────────
    /// The file is not a PDF, JPEG, PNG or WebP.
    #[error("Unsupported file '{name}'. Please upload a PDF or Image file (JPEG, PNG, WebP).")]
    UnsupportedMediaType { name: String },

    /// The file is larger than the advertised upload limit.
    #[error("File '{name}' is {size} bytes; the maximum upload size is {limit} bytes.")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension promises one format but the bytes say otherwise.
    #[error("File '{name}' is named as {declared} but its contents do not match")]
    ContentMismatch { name: String, declared: &'static str },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Recognition service ───────────────────────────────────────────────
    /// Missing or rejected credentials, or a provider that cannot be built.
    #[error("Invalid or missing API key. Please check your environment.\n{provider}: {hint}")]
    Configuration { provider: String, hint: String },

    /// The recognition service failed for any other reason.
    #[error("{message}")]
    Service { message: String },

    /// The service call exceeded the configured timeout.
    #[error("Recognition service timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service answered with no text at all.
    #[error("The AI was unable to parse text from this file.")]
    EmptyResponse,

    /// The service answered, but not with the declared label structure.
    #[error("The AI response did not match the label schema: {detail}")]
    MalformedResponse { detail: String },

    // ── Lifecycle ─────────────────────────────────────────────────────────
    /// An extraction is already outstanding; a second one is never queued.
    #[error("An extraction is already in progress")]
    ExtractionInFlight,

    /// Trigger was called without a staged input.
    #[error("No file or capture has been staged for extraction")]
    NothingStaged,

    /// The requested transition is not valid from the current state.
    #[error("Cannot {action} while the pipeline is {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    // ── Capture ───────────────────────────────────────────────────────────
    /// A still was requested before the camera signalled readiness.
    #[error("Camera is not ready")]
    CaptureNotReady,

    /// The live frame could not be read or encoded.
    #[error("Failed to capture a still frame: {0}")]
    FrameCapture(String),

    // ── Export ────────────────────────────────────────────────────────────
    /// The CSV or spreadsheet writer failed.
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LabelScanError {
    /// True for credential / provider-configuration failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, LabelScanError::Configuration { .. })
    }

    /// True for errors raised by upload validation, before any state change.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LabelScanError::UnsupportedMediaType { .. }
                | LabelScanError::FileTooLarge { .. }
                | LabelScanError::ContentMismatch { .. }
        )
    }

    /// The message shown to the operator in the pipeline's error state.
    ///
    /// Configuration failures collapse to the single actionable message; the
    /// provider detail is still available through `Display` for logs.
    pub fn user_message(&self) -> String {
        match self {
            LabelScanError::Configuration { .. } => CONFIGURATION_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Why a capture session ended up in its error state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureFailure {
    /// The operator (or the OS) refused camera access.
    #[error("Camera permission was dismissed. Please click 'Grant Permission' and allow access when prompted.")]
    PermissionDenied,

    /// There is no camera attached.
    #[error("No camera device found on this system.")]
    NoDevice,

    /// Anything else the device reported.
    #[error("Unable to access camera. Please check your browser settings and permissions.")]
    Unknown { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_message_is_actionable() {
        let e = LabelScanError::Configuration {
            provider: "gemini".into(),
            hint: "API key not valid".into(),
        };
        assert!(e.is_configuration());
        assert_eq!(e.user_message(), CONFIGURATION_MESSAGE);
        assert!(e.to_string().contains("API key not valid"));
    }

    #[test]
    fn service_message_is_passed_through() {
        let e = LabelScanError::Service {
            message: "model overloaded".into(),
        };
        assert!(!e.is_configuration());
        assert_eq!(e.user_message(), "model overloaded");
    }

    #[test]
    fn unsupported_type_is_validation() {
        let e = LabelScanError::UnsupportedMediaType {
            name: "notes.txt".into(),
        };
        assert!(e.is_validation());
        assert!(e.to_string().contains("JPEG, PNG, WebP"));
    }

    #[test]
    fn capture_failures_have_distinct_messages() {
        let denied = CaptureFailure::PermissionDenied.to_string();
        let missing = CaptureFailure::NoDevice.to_string();
        let other = CaptureFailure::Unknown {
            detail: "busy".into(),
        }
        .to_string();
        assert!(denied.contains("permission"));
        assert!(missing.contains("No camera"));
        assert_ne!(denied, other);
        assert_ne!(missing, other);
    }

    #[test]
    fn invalid_transition_display() {
        let e = LabelScanError::InvalidTransition {
            state: "processing",
            action: "submit",
        };
        assert_eq!(e.to_string(), "Cannot submit while the pipeline is processing");
    }
}
