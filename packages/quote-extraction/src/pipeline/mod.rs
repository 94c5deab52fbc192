//! Quote extraction pipeline.
//!
//! One uploaded file flows through:
//! - Content hashing and the extraction cache
//! - Source profile resolution (page spec, instructions, correction rules)
//! - Page reduction, extraction with retry, and single-shot escalation
//! - Batch aggregation into one quote per `(batch_id, owner_id)`
//!
//! A batch runs its files concurrently, isolates per-file failures, and ends
//! with page spec advice for the profiles it touched.

pub mod advisor;
pub mod aggregate;
pub mod cache;
pub mod client;
pub mod corrections;
pub mod escalation;
pub mod optimize;
pub mod pages;
pub mod prompts;

pub use advisor::{advise, apply_suggestion, FileObservation, OptimizationSuggestion};
pub use aggregate::{Attached, BatchAggregator};
pub use cache::{CacheHit, ExtractionCache};
pub use client::{parse_response, sanitize_response, ExtractionClient};
pub use corrections::{apply_edit, field_value, learned_rule, set_field, EditOutcome};
pub use escalation::{
    extract_with_escalation, is_degenerate, EscalationOutcome, ExtractionInput,
};
pub use optimize::{optimize, optimize_with_spec, Optimized};
pub use pages::{PageRange, PageSelection, PageSpec};
pub use prompts::{build_instructions, profile_rules, render_correction, EXTRACT_PROMPT};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::traits::{provider::ExtractionProvider, store::PipelineStore};
use crate::types::{
    config::PipelineConfig,
    document::Document,
    profile::{match_profile, CorrectionField, SourceProfile},
    quote::{AttachedFile, SubjectFields},
    result::ExtractionResult,
};

/// How a file's source profile is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfileSelection {
    /// Use this profile.
    Explicit(Uuid),

    /// Pick the owner's profile whose name appears in the file name.
    #[default]
    MatchByName,

    /// Extract without a profile.
    None,
}

/// A file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub document: Document,

    /// Where the file is stored; identifies it inside a batch
    pub file_path: String,

    /// Precomputed SHA-256 of the bytes, if the caller has one
    pub content_hash: Option<String>,

    pub profile: ProfileSelection,
}

impl UploadedFile {
    /// Wrap a document, using its file name as the path.
    pub fn new(document: Document) -> Self {
        Self {
            file_path: document.file_name.clone(),
            document,
            content_hash: None,
            profile: ProfileSelection::default(),
        }
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }

    pub fn with_content_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = Some(content_hash.into());
        self
    }

    pub fn with_profile(mut self, profile: ProfileSelection) -> Self {
        self.profile = profile;
        self
    }

    fn hash(&self) -> String {
        self.content_hash
            .clone()
            .unwrap_or_else(|| self.document.content_hash())
    }
}

/// Where a file's result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Extracted,
    Cached,
}

/// What happened to one successfully processed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file_path: String,
    pub content_hash: String,
    pub profile_id: Option<Uuid>,
    pub source: ResultSource,
    pub escalated: bool,
    pub result: ExtractionResult,
    pub quote_id: Uuid,

    /// False when the file was already part of the quote
    pub newly_attached: bool,
}

/// Outcome of one file in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Succeeded(FileReport),
    Failed {
        file_path: String,
        kind: &'static str,
        reason: String,
    },
}

impl FileOutcome {
    pub fn file_path(&self) -> &str {
        match self {
            Self::Succeeded(report) => &report.file_path,
            Self::Failed { file_path, .. } => file_path,
        }
    }

    pub fn report(&self) -> Option<&FileReport> {
        match self {
            Self::Succeeded(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }
}

/// Result of processing a batch of files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch_id: Option<String>,

    /// One entry per input file, in input order
    pub files: Vec<FileOutcome>,

    /// Page spec advice for the profiles the batch used
    pub suggestions: Vec<OptimizationSuggestion>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter_map(FileOutcome::report)
    }

    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| f.report().is_none()).count()
    }

    /// Distinct quotes written by the batch, in first-seen order.
    pub fn quote_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for report in self.succeeded() {
            if !ids.contains(&report.quote_id) {
                ids.push(report.quote_id);
            }
        }
        ids
    }
}

/// The extraction pipeline.
///
/// Generic over storage and provider so tests can run against
/// [`crate::stores::MemoryStore`] and [`crate::testing::MockProvider`].
pub struct Pipeline<S: PipelineStore, P: ExtractionProvider> {
    store: S,
    client: ExtractionClient<P>,
    config: PipelineConfig,
}

impl<S: PipelineStore, P: ExtractionProvider> Pipeline<S, P> {
    /// Create a pipeline with default configuration.
    pub fn new(store: S, provider: P) -> Self {
        Self::with_config(store, provider, PipelineConfig::default())
    }

    /// Create a pipeline with custom configuration.
    pub fn with_config(store: S, provider: P, config: PipelineConfig) -> Self {
        Self {
            store,
            client: ExtractionClient::new(provider).with_retry(config.retry),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &ExtractionClient<P> {
        &self.client
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one file into its owner's quote for `batch_id`.
    ///
    /// A fresh extraction of identical content is reused without calling the
    /// provider. Otherwise the file is reduced to its profile's pages,
    /// extracted, and escalated to the whole document if every premium came
    /// back zero.
    pub async fn process_file(
        &self,
        owner_id: Uuid,
        batch_id: Option<&str>,
        file: &UploadedFile,
    ) -> Result<FileReport> {
        let content_hash = file.hash();
        let profiles = self.store.list_profiles(owner_id).await?;
        let profile = self.resolve_profile(file, &profiles).await?;

        let (result, source, escalated, profile_id) =
            match self.cached(owner_id, &content_hash).await {
                Some(hit) => {
                    info!(
                        file = %file.file_path,
                        cached_quote = %hit.quote.id,
                        "Reusing previous extraction"
                    );
                    let profile_id = profile.as_ref().map(|p| p.id).or(hit.profile_id);
                    (hit.result, ResultSource::Cached, false, profile_id)
                }
                None => {
                    let outcome = self.extract(file, profile.as_ref(), &profiles).await?;
                    (
                        outcome.result,
                        ResultSource::Extracted,
                        outcome.escalated,
                        profile.as_ref().map(|p| p.id),
                    )
                }
            };

        let attached_file =
            AttachedFile::new(file.file_path.clone(), content_hash.clone()).with_profile(profile_id);
        let attached = BatchAggregator::new(&self.store)
            .attach(
                batch_id,
                owner_id,
                &SubjectFields::from(&result),
                &result.offers,
                &attached_file,
            )
            .await?;

        info!(
            file = %file.file_path,
            quote_id = %attached.quote.id,
            offers = result.offers.len(),
            escalated,
            cached = source == ResultSource::Cached,
            "Processed file"
        );

        Ok(FileReport {
            file_path: file.file_path.clone(),
            content_hash,
            profile_id,
            source,
            escalated,
            result,
            quote_id: attached.quote.id,
            newly_attached: attached.newly_attached,
        })
    }

    /// Process a batch of files with bounded concurrency.
    ///
    /// A failing file is reported and never affects the others. Store errors
    /// while building advice are logged and leave the advice empty.
    pub async fn process_batch(
        &self,
        owner_id: Uuid,
        batch_id: Option<&str>,
        files: &[UploadedFile],
    ) -> BatchReport {
        info!(
            batch_id = batch_id.unwrap_or("-"),
            files = files.len(),
            concurrency = self.config.concurrency,
            "Processing batch"
        );

        let outcomes: Vec<FileOutcome> = stream::iter(files)
            .map(|file| async move {
                match self.process_file(owner_id, batch_id, file).await {
                    Ok(report) => FileOutcome::Succeeded(report),
                    Err(e) => {
                        warn!(file = %file.file_path, error = %e, "File failed");
                        FileOutcome::Failed {
                            file_path: file.file_path.clone(),
                            kind: e.kind(),
                            reason: e.to_string(),
                        }
                    }
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let observations: Vec<FileObservation> = outcomes
            .iter()
            .filter_map(FileOutcome::report)
            .filter(|report| report.source == ResultSource::Extracted)
            .map(|report| FileObservation {
                profile_id: report.profile_id,
                found_pages: report.result.found_pages(),
                escalated: report.escalated,
            })
            .collect();

        let suggestions = match self.store.list_profiles(owner_id).await {
            Ok(profiles) => advise(&profiles, &observations),
            Err(e) => {
                warn!(error = %e, "Could not load profiles for advice");
                Vec::new()
            }
        };

        let report = BatchReport {
            batch_id: batch_id.map(str::to_string),
            files: outcomes,
            suggestions,
        };
        info!(
            batch_id = batch_id.unwrap_or("-"),
            failed = report.failed_count(),
            suggestions = report.suggestions.len(),
            "Batch complete"
        );
        report
    }

    /// Edit a stored line item, optionally learning a correction rule.
    pub async fn apply_edit(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        field: CorrectionField,
        value: &str,
        learn: bool,
    ) -> Result<EditOutcome> {
        corrections::apply_edit(&self.store, owner_id, item_id, field, value, learn).await
    }

    /// Write an accepted suggestion to its profile.
    pub async fn apply_suggestion(&self, suggestion: &OptimizationSuggestion) -> Result<()> {
        advisor::apply_suggestion(&self.store, suggestion).await
    }

    async fn resolve_profile(
        &self,
        file: &UploadedFile,
        profiles: &[SourceProfile],
    ) -> Result<Option<SourceProfile>> {
        match file.profile {
            ProfileSelection::Explicit(id) => {
                if let Some(profile) = profiles.iter().find(|p| p.id == id) {
                    return Ok(Some(profile.clone()));
                }
                self.store
                    .get_profile(id)
                    .await?
                    .map(Some)
                    .ok_or_else(|| ExtractionError::NotFound {
                        entity: "profile",
                        id: id.to_string(),
                    })
            }
            ProfileSelection::MatchByName => {
                Ok(match_profile(&file.document.file_name, profiles).cloned())
            }
            ProfileSelection::None => Ok(None),
        }
    }

    /// Cache lookup. A failing lookup counts as a miss.
    async fn cached(&self, owner_id: Uuid, content_hash: &str) -> Option<CacheHit> {
        let cache = ExtractionCache::new(&self.store, self.config.cache_freshness);
        match cache.lookup(owner_id, content_hash).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, extracting");
                None
            }
        }
    }

    async fn extract(
        &self,
        file: &UploadedFile,
        profile: Option<&SourceProfile>,
        profiles: &[SourceProfile],
    ) -> Result<EscalationOutcome> {
        let page_spec = match profile {
            Some(p) if !p.page_spec.trim().is_empty() => PageSpec::parse(&p.page_spec),
            _ => PageSpec::parse(&self.config.default_page_spec),
        };
        let corrections = match profile {
            Some(p) => self.store.rules_for_profile(p.id).await?,
            None => Vec::new(),
        };
        let rules = profile_rules(profile, profiles);

        extract_with_escalation(
            &self.client,
            ExtractionInput {
                document: &file.document,
                page_spec: &page_spec,
                profile_rules: &rules,
                corrections: &corrections,
            },
            self.config.escalate,
        )
        .await
    }
}
