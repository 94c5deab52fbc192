//! Insurance Quote Extraction Library
//!
//! Turns uploaded insurance quote documents into structured, comparable
//! offers using a document-understanding model, while keeping provider
//! calls cheap and the stored quotes consistent.
//!
//! # Design Philosophy
//!
//! - Send the model as little as possible: per-issuer page selection, and
//!   identical content is never extracted twice within the cache window
//! - Recover once, not forever: a degenerate result escalates to the whole
//!   document a single time
//! - Humans stay in the loop: corrections become rules for future prompts,
//!   and page spec advice is applied only on request
//! - Storage enforces consistency: one quote per batch and owner, one
//!   attachment per file
//!
//! # Usage
//!
//! ```rust,ignore
//! use quote_extraction::{Pipeline, ProviderConfig, SqliteStore, UploadedFile, Document};
//!
//! let store = SqliteStore::new("sqlite://quotes.db?mode=rwc").await?;
//! let provider = ProviderConfig::from_env()?.build();
//! let pipeline = Pipeline::new(store, provider);
//!
//! let files = vec![UploadedFile::new(Document::new("acme.pdf", bytes))];
//! let report = pipeline.process_batch(owner_id, Some("lote-42"), &files).await;
//!
//! for suggestion in &report.suggestions {
//!     println!("{}: {} -> {}", suggestion.profile_name, suggestion.current_spec, suggestion.suggested_spec);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Provider and storage abstractions
//! - [`types`] - Documents, results, quotes, profiles and configuration
//! - [`pipeline`] - Page selection, caching, extraction, escalation, aggregation
//! - [`providers`] - OpenAI and Gemini adapters
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`report`] - Offer comparison over a stored quote
//! - [`security`] - Credential handling
//! - [`testing`] - Mock provider and in-memory PDFs for tests

pub mod error;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{DocumentError, ExtractionError, Result};
pub use traits::{
    provider::{ExtractionProvider, ProviderRequest},
    store::{CorrectionStore, PipelineStore, ProfileStore, QuoteStore},
};
pub use types::{
    config::{PipelineConfig, RetryPolicy, CACHE_FRESHNESS, DEFAULT_PAGE_SPEC},
    document::{content_hash, Document},
    profile::{match_profile, CorrectionField, CorrectionRule, SourceProfile},
    quote::{AttachedFile, Quote, QuoteLineItem, QuoteWithItems, SubjectFields},
    result::{ExtractionResult, Offer, Premiums},
};

// Re-export the pipeline
pub use pipeline::{
    advise, apply_edit, apply_suggestion, extract_with_escalation, is_degenerate, optimize,
    sanitize_response, BatchAggregator, BatchReport, EditOutcome, ExtractionCache,
    ExtractionClient, FileOutcome, FileReport, OptimizationSuggestion, PageSelection, PageSpec,
    Pipeline, ProfileSelection, ResultSource, UploadedFile,
};

// Re-export providers
pub use providers::{
    ConfiguredProvider, GeminiProvider, OpenAIProvider, ProviderConfig, ProviderKind,
};

pub use report::{QuoteComparison, Tranche};
pub use security::{ProviderCredentials, SecretString};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

// Re-export testing utilities
pub use testing::{MockProvider, MockReply};
