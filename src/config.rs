//! Configuration types for label extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct for every knob keeps the
//! pipeline, the one-shot entry points and the CLI in agreement about
//! defaults.

use crate::error::LabelScanError;
use crate::pipeline::service::RecognitionService;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Default model for the native Gemini backend.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

/// Default model when a generic vision provider is named.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Upload limit advertised to the operator.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration for a label extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use labelscan::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .provider_name("gemini")
///     .temperature(0.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier. If None, the backend default is used.
    pub model: Option<String>,

    /// Provider name (`gemini`, `openai`, `anthropic`, `ollama`, …).
    /// If None along with `service`, the provider is resolved from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed recognition service. Takes precedence over `provider_name`.
    pub service: Option<Arc<dyn RecognitionService>>,

    /// API key for the native Gemini backend. Falls back to `GEMINI_API_KEY` / `API_KEY`.
    pub api_key: Option<String>,

    /// Base URL of the Gemini REST API. Default: [`DEFAULT_GEMINI_ENDPOINT`].
    pub endpoint: String,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model faithful to what is printed on the label,
    /// not creative.
    pub temperature: f32,

    /// Maximum tokens the service may generate. Default: 8192.
    ///
    /// A sheet of twenty labels with full raw-text dumps easily passes 4 000
    /// output tokens; a truncated JSON array is unparseable.
    pub max_tokens: usize,

    /// Custom instruction text. If None, uses [`crate::prompts::DEFAULT_INSTRUCTIONS`].
    pub instructions: Option<String>,

    /// Timeout for a single recognition call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Maximum accepted upload size in bytes. Default: 10 MiB.
    pub max_upload_bytes: u64,

    /// Optional observer for extraction start / completion / failure.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            service: None,
            api_key: None,
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            temperature: 0.1,
            max_tokens: 8192,
            instructions: None,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("service", &self.service.as_ref().map(|s| s.name().to_string()))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn RecognitionService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, LabelScanError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(LabelScanError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(LabelScanError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if !(c.endpoint.starts_with("http://") || c.endpoint.starts_with("https://")) {
            return Err(LabelScanError::InvalidConfig(format!(
                "Endpoint must be an HTTP/HTTPS URL, got '{}'",
                c.endpoint
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favour_determinism() {
        let c = ExtractionConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.endpoint, DEFAULT_GEMINI_ENDPOINT);
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ExtractionConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let c = ExtractionConfig::builder()
            .endpoint("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.endpoint, "http://localhost:8080");
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let err = ExtractionConfig::builder().max_tokens(0).build().unwrap_err();
        assert!(matches!(err, LabelScanError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder().api_key("secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret"));
    }
}
