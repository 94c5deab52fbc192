//! OpenAI chat-completions provider.
//!
//! Documents are sent inline: PDFs as a `file` content part, images as an
//! `image_url` data URL. The model is asked for a JSON object.
//!
//! # Example
//!
//! ```rust,ignore
//! use quote_extraction::providers::OpenAIProvider;
//!
//! let provider = OpenAIProvider::new("sk-...").with_model("gpt-4o-mini");
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{classify_failure, classify_send_error};
use crate::error::{ExtractionError, Result};
use crate::security::{ProviderCredentials, SecretString};
use crate::traits::provider::{ExtractionProvider, ProviderRequest};
use crate::types::document::Document;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str =
    "You read insurance quote documents and answer with a single JSON object and nothing else.";

/// OpenAI-based extraction provider.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
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

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ExtractionError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set the model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &ProviderRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "temperature": 0.0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.instructions },
                        document_part(request.document),
                    ]
                }
            ]
        })
    }
}

fn document_part(document: &Document) -> Value {
    let data_url = format!(
        "data:{};base64,{}",
        document.mime_type,
        STANDARD.encode(&document.bytes)
    );

    if document.is_pdf() {
        json!({
            "type": "file",
            "file": { "filename": document.file_name, "file_data": data_url }
        })
    } else {
        json!({
            "type": "image_url",
            "image_url": { "url": data_url }
        })
    }
}

/// Pull the answer text out of a chat-completions response.
fn response_text(response: ChatResponse) -> Result<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ExtractionError::EmptyResponse("no choices from OpenAI".into()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ExtractionError::EmptyResponse(
            "OpenAI response blocked by content filter".into(),
        ));
    }
    if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(ExtractionError::EmptyResponse(format!("OpenAI refused: {refusal}")));
    }

    choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ExtractionError::EmptyResponse("OpenAI returned no content".into()))
}

#[async_trait]
impl ExtractionProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: ProviderRequest<'_>) -> Result<String> {
        let body = self.request_body(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure("OpenAI", status, &error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

        response_text(chat_response)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
