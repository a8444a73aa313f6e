//! Recognition-service backends.
//!
//! The Extraction Client only needs "send this document plus instructions
//! and a schema, give me the response text". [`RecognitionService`] is that
//! seam. Two implementations ship with the crate:
//!
//! * [`GeminiService`] — Gemini `generateContent` over REST. The schema is
//!   enforced by the service itself through `responseSchema`, and PDFs are
//!   accepted natively as inline data.
//! * [`ProviderService`] — any vision provider from `edgequake-llm`
//!   (OpenAI, Anthropic, Ollama, …). Those APIs have no common structured
//!   output switch, so the schema travels as text in the system message and
//!   the parser does the enforcing.
//!
//! Neither backend retries. Retry is an operator action one layer up.

use crate::config::ExtractionConfig;
use crate::error::LabelScanError;
use crate::pipeline::input::StagedInput;
use crate::prompts::{response_schema, schema_instructions, DEFAULT_INSTRUCTIONS};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Everything the recognition service is sent for one extraction.
#[derive(Clone)]
pub struct RecognitionRequest {
    /// Base64 document bytes, no `data:` header.
    pub payload: String,
    pub mime_type: String,
    pub instructions: String,
    /// Declared output structure (array of label objects).
    pub schema: Value,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl RecognitionRequest {
    pub fn new(input: &StagedInput, config: &ExtractionConfig) -> Self {
        Self {
            payload: input.payload.clone(),
            mime_type: input.mime_type().to_string(),
            instructions: config
                .instructions
                .clone()
                .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            schema: response_schema(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl std::fmt::Debug for RecognitionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionRequest")
            .field("mime_type", &self.mime_type)
            .field("payload_len", &self.payload.len())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// An external multimodal service that reads labels.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Short provider name for logs and error messages.
    fn name(&self) -> &str;

    /// Send the request and return the raw response text.
    ///
    /// Implementations map credential problems to
    /// [`LabelScanError::Configuration`] and everything else to
    /// [`LabelScanError::Service`] / [`LabelScanError::Timeout`].
    async fn recognize(&self, request: &RecognitionRequest) -> Result<String, LabelScanError>;
}

/// Heuristic for credential failures hidden inside provider error text.
pub fn looks_like_credential_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["api key", "api_key", "apikey", "unauthorized", "unauthenticated", "invalid x-api-key"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn classify_failure(provider: &str, status: Option<u16>, message: String) -> LabelScanError {
    if matches!(status, Some(401) | Some(403)) || looks_like_credential_failure(&message) {
        LabelScanError::Configuration {
            provider: provider.to_string(),
            hint: message,
        }
    } else {
        LabelScanError::Service { message }
    }
}

// ── Gemini ───────────────────────────────────────────────────────────────

/// Native Gemini backend with service-side schema enforcement.
pub struct GeminiService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiService {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, LabelScanError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LabelScanError::Configuration {
                provider: "gemini".into(),
                hint: "API key is empty".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LabelScanError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout_secs,
        })
    }

    /// Build from config, reading the key from `GEMINI_API_KEY` or `API_KEY`
    /// when the config carries none.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, LabelScanError> {
        let key = config
            .api_key
            .clone()
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("API_KEY"))
            .ok_or_else(|| LabelScanError::Configuration {
                provider: "gemini".into(),
                hint: "Set GEMINI_API_KEY (or API_KEY) or pass --api-key.".into(),
            })?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| crate::config::DEFAULT_GEMINI_MODEL.to_string());
        Self::new(key, model, config.endpoint.clone(), config.api_timeout_secs)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model)
    }

    /// The `generateContent` request body.
    pub fn request_body(request: &RecognitionRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": request.mime_type, "data": request.payload } },
                    { "text": request.instructions }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": request.schema,
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[async_trait]
impl RecognitionService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn recognize(&self, request: &RecognitionRequest) -> Result<String, LabelScanError> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LabelScanError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    LabelScanError::Service {
                        message: format!("Recognition service request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| LabelScanError::Service {
            message: format!("Failed to read recognition response: {e}"),
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| format!("Recognition service returned HTTP {status}"));
            warn!("Gemini call failed ({}): {}", status, message);
            return Err(classify_failure(self.name(), Some(status.as_u16()), message));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| LabelScanError::MalformedResponse {
                detail: format!("unexpected envelope: {e}"),
            })?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LabelScanError::Service {
                message: format!("The document was blocked by the recognition service ({reason})"),
            });
        }

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Gemini: {} input tokens, {} output tokens, {:?}",
                usage.prompt_token_count,
                usage.candidates_token_count,
                start.elapsed()
            );
        }

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            return Err(LabelScanError::EmptyResponse);
        };
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                debug!("Gemini finish reason: {}", reason);
            }
        }
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(text)
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Any `edgequake-llm` vision provider.
pub struct ProviderService {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout_secs: u64,
}

impl ProviderService {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout_secs,
        }
    }

    /// Instantiate a named provider with the given model.
    pub fn from_name(provider_name: &str, model: &str, timeout_secs: u64) -> Result<Self, LabelScanError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            LabelScanError::Configuration {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, provider_name, timeout_secs))
    }

    /// Auto-detect a provider from the usual API-key environment variables.
    pub fn from_env(timeout_secs: u64) -> Result<Self, LabelScanError> {
        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| LabelScanError::Configuration {
                provider: "auto".to_string(),
                hint: format!(
                    "No recognition provider could be auto-detected from environment.\n\
                    Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                    Error: {e}"
                ),
            })?;
        Ok(Self::new(provider, "auto", timeout_secs))
    }

    fn messages(request: &RecognitionRequest) -> Vec<ChatMessage> {
        let system = format!("{}{}", request.instructions, schema_instructions(&request.schema));
        let image = ImageData::new(request.payload.clone(), request.mime_type.as_str()).with_detail("high");
        vec![
            ChatMessage::system(system),
            ChatMessage::user_with_images("Extract every label in the attached document.", vec![image]),
        ]
    }
}

#[async_trait]
impl RecognitionService for ProviderService {
    fn name(&self) -> &str {
        &self.label
    }

    async fn recognize(&self, request: &RecognitionRequest) -> Result<String, LabelScanError> {
        let start = Instant::now();
        let messages = Self::messages(request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&options));
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), call).await {
            Err(_) => Err(LabelScanError::Timeout {
                secs: self.timeout_secs,
            }),
            Ok(Err(e)) => {
                let message = format!("{e}");
                warn!("Provider '{}' call failed: {}", self.label, message);
                Err(classify_failure(&self.label, None, message))
            }
            Ok(Ok(response)) => {
                debug!(
                    "Provider '{}': {} input tokens, {} output tokens, {:?}",
                    self.label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RecognitionRequest {
        RecognitionRequest {
            payload: "AAAA".into(),
            mime_type: "image/jpeg".into(),
            instructions: "read labels".into(),
            schema: response_schema(),
            temperature: 0.1,
            max_tokens: 1024,
        }
    }

    #[test]
    fn gemini_body_declares_schema_and_low_temperature() {
        let body = GeminiService::request_body(&request());
        let cfg = &body["generationConfig"];
        assert_eq!(cfg["responseMimeType"], "application/json");
        assert_eq!(cfg["responseSchema"]["type"], "ARRAY");
        assert!(cfg["temperature"].as_f64().unwrap() < 0.2);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "AAAA");
        assert_eq!(parts[1]["text"], "read labels");
    }

    #[test]
    fn credential_failures_are_recognised() {
        assert!(looks_like_credential_failure(
            "API key not valid. Please pass a valid API key."
        ));
        assert!(looks_like_credential_failure("missing API_KEY"));
        assert!(!looks_like_credential_failure("model is overloaded"));
    }

    #[test]
    fn http_status_drives_classification() {
        assert!(classify_failure("gemini", Some(403), "forbidden".into()).is_configuration());
        assert!(!classify_failure("gemini", Some(500), "internal".into()).is_configuration());
    }

    #[test]
    fn empty_key_is_a_configuration_error() {
        let err = GeminiService::new("  ", "m", "http://localhost", 5).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn request_uses_default_instructions() {
        let staged = crate::pipeline::input::stage_bytes("a.pdf", b"%PDF-1.7", 1024).unwrap();
        let req = RecognitionRequest::new(&staged, &ExtractionConfig::default());
        assert_eq!(req.instructions, DEFAULT_INSTRUCTIONS);
        assert_eq!(req.mime_type, "application/pdf");
    }
}
