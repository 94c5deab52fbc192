//! Google Gemini `generateContent` provider.
//!
//! The document travels as an `inline_data` part next to the instruction
//! text, and the response MIME type is pinned to JSON.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{classify_failure, classify_send_error};
use crate::error::{ExtractionError, Result};
use crate::security::{ProviderCredentials, SecretString};
use crate::traits::provider::{ExtractionProvider, ProviderRequest};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the answer was withheld.
const BLOCKED_FINISH_REASONS: [&str; 4] = ["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

/// Gemini-based extraction provider.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::new(api_key),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from resolved credentials.
    pub fn from_credentials(credentials: ProviderCredentials) -> Self {
        Self {
            client: Client::new(),
            base_url: credentials.base_url_or(DEFAULT_BASE_URL),
            api_key: credentials.api_key,
            model: credentials.model,
        }
    }

    /// Create from environment variable `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ExtractionError::Config("GEMINI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set the model (default: gemini-2.0-flash).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(request: &ProviderRequest<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.instructions },
                    {
                        "inline_data": {
                            "mime_type": request.document.mime_type,
                            "data": STANDARD.encode(&request.document.bytes),
                        }
                    }
                ]
            }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json"
            }
        })
    }
}

/// Pull the answer text out of a `generateContent` response.
fn response_text(response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ExtractionError::EmptyResponse(format!(
            "Gemini blocked the prompt: {reason}"
        )));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ExtractionError::EmptyResponse("no candidates from Gemini".into()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(ExtractionError::EmptyResponse(format!(
                "Gemini response withheld: {reason}"
            )));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse(
            "Gemini returned no text".into(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl ExtractionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: ProviderRequest<'_>) -> Result<String> {
        let body = Self::request_body(&request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure("Gemini", status, &error_text));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

        response_text(generated)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::Document;

    fn parse(raw: &str) -> Result<String> {
        response_text(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_gemini_endpoint() {
        let provider = GeminiProvider::new("g-key")
            .with_model("gemini-1.5-pro")
            .with_base_url("http://localhost:9000");
        assert_eq!(
            provider.endpoint(),
            "http://localhost:9000/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_request_carries_inline_document() {
        let document = Document::new("quote.pdf", b"%PDF".to_vec());
        let body = GeminiProvider::request_body(&ProviderRequest {
            instructions: "extract",
            document: &document,
        });

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "extract");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "application/pdf");
        assert_eq!(parts[1]["inline_data"]["data"], "JVBERg==");
    }

    #[test]
    fn test_joins_text_parts() {
        let text = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"offers\""},{"text":":[]}"}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(text.unwrap(), r#"{"offers":[]}"#);
    }

    #[test]
    fn test_safety_block_is_empty_response() {
        let blocked = parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(matches!(blocked, Err(ExtractionError::EmptyResponse(_))));

        let prompt_blocked = parse(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#);
        assert!(matches!(prompt_blocked, Err(ExtractionError::EmptyResponse(_))));

        let nothing = parse(r#"{"candidates":[]}"#);
        assert!(matches!(nothing, Err(ExtractionError::EmptyResponse(_))));
    }
}
