//! Extraction client: one logical extraction with retry and parsing.
//!
//! Transient provider failures are retried with exponential backoff.
//! Anything else aborts at once. The raw answer is sanitized and parsed
//! into an [`ExtractionResult`].

use tracing::{debug, warn};

use crate::error::{ExtractionError, Result};
use crate::pipeline::prompts::build_instructions;
use crate::traits::provider::{ExtractionProvider, ProviderRequest};
use crate::types::{
    config::RetryPolicy, document::Document, profile::CorrectionRule, result::ExtractionResult,
};

/// Wraps a provider with retry, sanitization and parsing.
#[derive(Clone)]
pub struct ExtractionClient<P> {
    provider: P,
    retry: RetryPolicy,
}

impl<P: ExtractionProvider> ExtractionClient<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Extract structured data from a document.
    ///
    /// `profile_rules` and `corrections` are embedded in the request together
    /// with the fixed output schema.
    pub async fn extract(
        &self,
        document: &Document,
        profile_rules: &str,
        corrections: &[CorrectionRule],
    ) -> Result<ExtractionResult> {
        let instructions = build_instructions(profile_rules, corrections);
        let raw = self.generate_with_retry(document, &instructions).await?;
        parse_response(&raw)
    }

    /// Call the provider, retrying transient failures.
    pub async fn generate_with_retry(&self, document: &Document, instructions: &str) -> Result<String> {
        let mut retry = 0;
        loop {
            debug!(
                provider = self.provider.name(),
                file = %document.file_name,
                bytes = document.bytes.len(),
                attempt = retry + 1,
                "Sending extraction request"
            );

            let request = ProviderRequest {
                instructions,
                document,
            };
            match self.provider.generate(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    warn!(
                        error = %e,
                        file = %document.file_name,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Provider unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(ExtractionError::RetriesExhausted {
                        attempts: self.retry.max_attempts(),
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Slice from the first `{` to the last `}`.
///
/// Strips markdown fences and chatter around the JSON. Without a brace
/// pair the input is returned unchanged.
pub fn sanitize_response(raw: &str) -> &str {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    }
}

/// Sanitize and parse a provider answer.
pub fn parse_response(raw: &str) -> Result<ExtractionResult> {
    let cleaned = sanitize_response(raw);
    if cleaned.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse("provider returned no text".into()));
    }
    ExtractionResult::from_json(cleaned).map_err(|e| {
        ExtractionError::MalformedResponse(format!(
            "{e}; response started with: {}",
            cleaned.chars().take(120).collect::<String>()
        ))
    })
}
