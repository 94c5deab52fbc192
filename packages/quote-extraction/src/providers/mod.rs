//! Document-understanding provider implementations.
//!
//! Two adapters implement [`ExtractionProvider`]: [`OpenAIProvider`] and
//! [`GeminiProvider`]. [`ProviderConfig::from_env`] selects one at startup
//! and [`ConfiguredProvider`] dispatches to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use quote_extraction::providers::ProviderConfig;
//!
//! let provider = ProviderConfig::from_env()?.build();
//! let pipeline = Pipeline::new(store, provider);
//! ```

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{ExtractionError, Result};
use crate::security::ProviderCredentials;
use crate::traits::provider::{ExtractionProvider, ProviderRequest};

/// Phrases in an error body that mean "try again later", any case.
const OVERLOAD_PHRASES: [&str; 2] = ["overloaded", "rate limit"];

/// gRPC status names, matched exactly so prose like "model unavailable"
/// does not count.
const OVERLOAD_STATUSES: [&str; 2] = ["RESOURCE_EXHAUSTED", "UNAVAILABLE"];

/// Classify a failed HTTP response.
///
/// 429, 503 and 529 are transient, as is any body carrying an overload
/// marker. Everything else is permanent.
pub fn classify_failure(provider: &str, status: StatusCode, body: &str) -> ExtractionError {
    let message = format!("{provider} returned {status}: {}", truncate(body, 500));

    let transient_status = matches!(status.as_u16(), 429 | 503 | 529);
    let lowered = body.to_lowercase();
    let transient_body = OVERLOAD_PHRASES.iter().any(|phrase| lowered.contains(phrase))
        || OVERLOAD_STATUSES.iter().any(|name| body.contains(name));

    if transient_status || transient_body {
        ExtractionError::Transient(message)
    } else {
        ExtractionError::Permanent(message)
    }
}

/// Timeouts and dropped connections are worth retrying; anything else
/// reqwest reports before a response arrives is not.
pub fn classify_send_error(provider: &str, error: reqwest::Error) -> ExtractionError {
    let message = format!("{provider} request failed: {error}");
    if error.is_timeout() || error.is_connect() {
        ExtractionError::Transient(message)
    } else {
        ExtractionError::Permanent(message)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Which provider adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    OpenAI,
    #[default]
    Gemini,
}

impl ProviderKind {
    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => openai::DEFAULT_MODEL,
            Self::Gemini => gemini::DEFAULT_MODEL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => f.write_str("openai"),
            Self::Gemini => f.write_str("gemini"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(ExtractionError::Config(format!(
                "unknown extraction provider '{other}' (expected openai or gemini)"
            ))),
        }
    }
}

/// Provider selection plus credentials.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub credentials: ProviderCredentials,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            credentials: ProviderCredentials::new(api_key, kind.default_model()),
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.credentials.model = model.into();
        self
    }

    /// Set a custom base URL (for proxies or compatible gateways).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.credentials = self.credentials.with_base_url(url);
        self
    }

    /// Read the configuration from environment variables.
    ///
    /// - `EXTRACTION_PROVIDER`: `openai` or `gemini` (default `gemini`)
    /// - `OPENAI_API_KEY` / `GEMINI_API_KEY`: key for the selected provider
    /// - `EXTRACTION_MODEL`: model override
    /// - `EXTRACTION_BASE_URL`: base URL override
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let kind = match non_empty("EXTRACTION_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => ProviderKind::default(),
        };

        let api_key = non_empty(kind.api_key_var())
            .ok_or_else(|| ExtractionError::Config(format!("{} not set", kind.api_key_var())))?;

        let mut config = Self::new(kind, api_key);
        if let Some(model) = non_empty("EXTRACTION_MODEL") {
            config = config.with_model(model);
        }
        if let Some(url) = non_empty("EXTRACTION_BASE_URL") {
            config = config.with_base_url(url);
        }
        Ok(config)
    }

    /// Build the adapter this configuration selects.
    pub fn build(self) -> ConfiguredProvider {
        debug!(
            provider = %self.kind,
            model = %self.credentials.model,
            api_key = %self.credentials.api_key.hint(),
            "Configured extraction provider"
        );
        match self.kind {
            ProviderKind::OpenAI => {
                ConfiguredProvider::OpenAI(OpenAIProvider::from_credentials(self.credentials))
            }
            ProviderKind::Gemini => {
                ConfiguredProvider::Gemini(GeminiProvider::from_credentials(self.credentials))
            }
        }
    }
}

/// A provider chosen at runtime.
#[derive(Clone)]
pub enum ConfiguredProvider {
    OpenAI(OpenAIProvider),
    Gemini(GeminiProvider),
}

#[async_trait]
impl ExtractionProvider for ConfiguredProvider {
    fn name(&self) -> &str {
        match self {
            Self::OpenAI(p) => p.name(),
            Self::Gemini(p) => p.name(),
        }
    }

    async fn generate(&self, request: ProviderRequest<'_>) -> Result<String> {
        match self {
            Self::OpenAI(p) => p.generate(request).await,
            Self::Gemini(p) => p.generate(request).await,
        }
    }
}
