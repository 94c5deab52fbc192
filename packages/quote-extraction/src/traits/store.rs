//! Storage traits for quotes, profiles, and correction rules.
//!
//! The storage layer is split into focused traits for flexibility:
//! - `QuoteStore`: Quote aggregates and their line items
//! - `ProfileStore`: Per-issuer source profiles
//! - `CorrectionStore`: Learned correction rules
//! - `PipelineStore`: Composite trait combining all three
//!
//! Methods documented as atomic must hold under concurrent callers; the
//! batch aggregator depends on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    profile::{CorrectionRule, SourceProfile},
    quote::{AttachedFile, Quote, QuoteLineItem, QuoteWithItems, SubjectFields},
};

/// Storage for quotes and line items.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Insert `candidate` unless a quote with the same `(batch_id, owner_id)`
    /// exists; return whichever row is stored. Atomic.
    ///
    /// `candidate.batch_id` must be set.
    async fn find_or_create_batch_quote(&self, candidate: &Quote) -> Result<Quote>;

    /// Insert a standalone quote.
    async fn insert_quote(&self, quote: &Quote) -> Result<()>;

    /// Insert a standalone quote together with its only file. Atomic: on
    /// error neither the quote nor any item is stored.
    async fn insert_quote_with_items(
        &self,
        quote: &Quote,
        file: &AttachedFile,
        items: &[QuoteLineItem],
    ) -> Result<()>;

    /// Fill subject fields that are still empty. Atomic.
    async fn fill_missing_subject(&self, quote_id: Uuid, subject: &SubjectFields) -> Result<Quote>;

    /// Attach a file's line items to a quote.
    ///
    /// Returns false, writing nothing, when `file.file_path` is already
    /// attached to the quote. The check and the inserts are one atomic step.
    async fn attach_items(
        &self,
        quote_id: Uuid,
        file: &AttachedFile,
        items: &[QuoteLineItem],
    ) -> Result<bool>;

    /// Get a quote with its line items in insertion order.
    async fn get_quote(&self, id: Uuid) -> Result<Option<QuoteWithItems>>;

    /// All quotes of an owner, newest first.
    async fn list_quotes(&self, owner_id: Uuid) -> Result<Vec<Quote>>;

    /// Newest quote of `owner_id` created at or after `since` that has a line
    /// item with `content_hash`.
    async fn find_recent_by_content_hash(
        &self,
        owner_id: Uuid,
        content_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<QuoteWithItems>>;

    /// Subject recorded for `file_path` when it was attached to the quote.
    async fn attached_subject(&self, quote_id: Uuid, file_path: &str)
        -> Result<Option<SubjectFields>>;

    /// Get a single line item.
    async fn get_line_item(&self, id: Uuid) -> Result<Option<QuoteLineItem>>;

    /// Overwrite the editable fields of a line item.
    async fn update_line_item(&self, item: &QuoteLineItem) -> Result<()>;
}

/// Storage for source profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> Result<Option<SourceProfile>>;

    /// Profiles of an owner, ordered by name.
    async fn list_profiles(&self, owner_id: Uuid) -> Result<Vec<SourceProfile>>;

    /// Insert or replace a profile.
    async fn upsert_profile(&self, profile: &SourceProfile) -> Result<()>;

    /// Replace a profile's page spec.
    async fn update_page_spec(&self, id: Uuid, page_spec: &str) -> Result<()>;
}

/// Storage for correction rules.
#[async_trait]
pub trait CorrectionStore: Send + Sync {
    async fn add_rule(&self, rule: &CorrectionRule) -> Result<()>;

    /// Every rule recorded for a profile, oldest first.
    async fn rules_for_profile(&self, profile_id: Uuid) -> Result<Vec<CorrectionRule>>;
}

/// Composite storage trait combining all stores.
///
/// This is the main trait used by the Pipeline.
pub trait PipelineStore: QuoteStore + ProfileStore + CorrectionStore {}

// Blanket implementation: anything implementing all three traits is a PipelineStore
impl<T: QuoteStore + ProfileStore + CorrectionStore> PipelineStore for T {}
