//! Provider trait for document-understanding services.
//!
//! The provider is the opaque external capability: it receives a document
//! plus instructions and returns raw text that should contain JSON. Retry,
//! sanitization and parsing live in [`crate::pipeline::client`], so an
//! implementation only has to make one call and classify its failure.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::document::Document;

/// One extraction request sent to a provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    /// Full instruction text (schema, profile rules, corrections)
    pub instructions: &'a str,

    /// The (possibly reduced) document
    pub document: &'a Document,
}

/// A document-understanding backend.
///
/// Implementations must map overload and rate-limit signals to
/// [`ExtractionError::Transient`](crate::ExtractionError::Transient), empty or
/// safety-filtered answers to
/// [`ExtractionError::EmptyResponse`](crate::ExtractionError::EmptyResponse),
/// and everything else to
/// [`ExtractionError::Permanent`](crate::ExtractionError::Permanent).
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Make a single call and return the raw response text.
    async fn generate(&self, request: ProviderRequest<'_>) -> Result<String>;
}

#[async_trait]
impl<P: ExtractionProvider + ?Sized> ExtractionProvider for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, request: ProviderRequest<'_>) -> Result<String> {
        (**self).generate(request).await
    }
}
