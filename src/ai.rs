// 🤖 AI Collaborator - "send prompt, receive string or error"
//
// The Gemini adapter is the only place that looks at vendor error wording;
// everything past this boundary works with the structured AiError.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Max characters of a vendor message carried in `AiError::Failed`.
pub const ERROR_EXCERPT_LEN: usize = 100;

// ============================================================================
// CONTRACT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AiError {
    /// Rate limit or quota exhausted (HTTP 429 and friends)
    #[error("AI quota exhausted")]
    QuotaExhausted,

    /// Key missing, malformed or rejected
    #[error("AI credential is invalid")]
    InvalidCredential,

    #[error("AI call failed: {0}")]
    Failed(String),
}

/// Generative text completion. One call, one answer; no retries.
pub trait AiCollaborator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

/// Map a vendor failure to the structured error.
///
/// HTTP status is trusted first; message text is only sniffed when the
/// status says nothing (transport errors, 400s carrying "API key not valid").
pub fn classify_failure(status: Option<u16>, message: &str) -> AiError {
    match status {
        Some(429) => return AiError::QuotaExhausted,
        Some(401) | Some(403) => return AiError::InvalidCredential,
        _ => {}
    }

    let lower = message.to_lowercase();
    if message.contains("429") || lower.contains("quota") || message.contains("Quota exceeded") {
        AiError::QuotaExhausted
    } else if message.contains("API key") || lower.contains("authentication") {
        AiError::InvalidCredential
    } else {
        AiError::Failed(excerpt(message, ERROR_EXCERPT_LEN))
    }
}

fn excerpt(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}

// ============================================================================
// GEMINI ADAPTER
// ============================================================================

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let parts = candidate.content?.parts;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        Some(text)
    }
}

/// Gemini `generateContent` over blocking HTTP.
///
/// Must not be created or dropped on an async executor thread; the server
/// builds it before the runtime starts and calls it from `spawn_blocking`.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, AiError> {
        Self::with_options(api_key, model, DEFAULT_GEMINI_ENDPOINT, Duration::from_secs(30))
    }

    pub fn with_options(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AiError::InvalidCredential);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Failed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the key
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl AiCollaborator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| classify_failure(e.status().map(|s| s.as_u16()), &e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| AiError::Failed(excerpt(&format!("Failed to read response: {}", e), ERROR_EXCERPT_LEN)))?;

        debug!(model = %self.model, status = status.as_u16(), "gemini response received");

        if !status.is_success() {
            return Err(classify_failure(Some(status.as_u16()), &error_message(status.as_u16(), &text)));
        }

        parse_generate_response(&text)
    }
}

/// Extract the completion text from a `generateContent` response body.
fn parse_generate_response(body: &str) -> Result<String, AiError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| AiError::Failed(excerpt(&format!("Malformed response: {}", e), ERROR_EXCERPT_LEN)))?;

    // A blocked or empty candidate is an empty answer, not a failure
    Ok(parsed.into_text().unwrap_or_default())
}

/// Prefer the vendor's own `error.message`, fall back to status + raw body.
fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => format!("HTTP {}: {}", status, body),
    }
}
