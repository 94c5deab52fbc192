//! Quote aggregates and their line items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{ExtractionResult, Offer, Premiums};

/// One logical extraction session, possibly fed by several files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,

    /// Groups files uploaded together. `None` for standalone uploads.
    pub batch_id: Option<String>,

    pub owner_id: Uuid,

    pub subject_name: String,

    pub subject_asset: String,

    pub created_at: DateTime<Utc>,
}

impl Quote {
    /// Create a new quote owned by `owner_id`, timestamped now.
    pub fn new(owner_id: Uuid, batch_id: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            batch_id,
            owner_id,
            subject_name: String::new(),
            subject_asset: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Set subject fields.
    pub fn with_subject(mut self, subject: &SubjectFields) -> Self {
        self.subject_name = subject.name.clone();
        self.subject_asset = subject.asset.clone();
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Fill subject fields that are still empty. Returns true if anything changed.
    pub fn fill_missing_subject(&mut self, subject: &SubjectFields) -> bool {
        let mut changed = false;
        if self.subject_name.trim().is_empty() && !subject.name.trim().is_empty() {
            self.subject_name = subject.name.clone();
            changed = true;
        }
        if self.subject_asset.trim().is_empty() && !subject.asset.trim().is_empty() {
            self.subject_asset = subject.asset.clone();
            changed = true;
        }
        changed
    }
}

/// Subject fields resolved from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectFields {
    pub name: String,
    pub asset: String,
}

impl From<&ExtractionResult> for SubjectFields {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            name: result.subject_name.clone(),
            asset: result.subject_asset.clone(),
        }
    }
}

/// One extracted offer attached to a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub id: Uuid,
    pub quote_id: Uuid,

    /// Source profile the offer was extracted with, if one was resolved
    pub profile_id: Option<Uuid>,

    /// Company name as extracted (or corrected)
    pub company: String,

    pub plan: String,
    pub premiums: Premiums,
    pub liability: String,
    pub dealer_workshop: bool,
    pub replacement_months: Option<u32>,

    /// 1-indexed pages of the original document
    pub found_pages: Vec<u32>,

    pub notes: String,

    /// Path of the file this offer came from
    pub file_path: String,

    /// SHA-256 of the originating file, used by the extraction cache
    pub content_hash: String,
}

impl QuoteLineItem {
    /// Build a line item from an extracted offer.
    pub fn from_offer(quote_id: Uuid, offer: &Offer, file: &AttachedFile) -> Self {
        Self {
            id: Uuid::now_v7(),
            quote_id,
            profile_id: file.profile_id,
            company: offer.company.clone(),
            plan: offer.plan.clone(),
            premiums: offer.premiums,
            liability: offer.liability.clone(),
            dealer_workshop: offer.dealer_workshop,
            replacement_months: offer.replacement_months,
            found_pages: offer.found_pages.clone(),
            notes: offer.notes.clone(),
            file_path: file.file_path.clone(),
            content_hash: file.content_hash.clone(),
        }
    }

    /// Convert back to the offer shape a provider would have returned.
    pub fn to_offer(&self) -> Offer {
        Offer {
            company: self.company.clone(),
            plan: self.plan.clone(),
            premiums: self.premiums,
            liability: self.liability.clone(),
            dealer_workshop: self.dealer_workshop,
            replacement_months: self.replacement_months,
            found_pages: self.found_pages.clone(),
            notes: self.notes.clone(),
        }
    }
}

/// Identity of a file being attached to a quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub file_path: String,
    pub content_hash: String,
    pub profile_id: Option<Uuid>,

    /// Subject as extracted from this file, which may differ from the
    /// quote's when a batch mixes documents
    pub subject: SubjectFields,
}

impl AttachedFile {
    pub fn new(file_path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content_hash: content_hash.into(),
            profile_id: None,
            subject: SubjectFields::default(),
        }
    }

    pub fn with_profile(mut self, profile_id: Option<Uuid>) -> Self {
        self.profile_id = profile_id;
        self
    }

    pub fn with_subject(mut self, subject: &SubjectFields) -> Self {
        self.subject = subject.clone();
        self
    }
}

/// A quote together with its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteWithItems {
    pub quote: Quote,
    pub items: Vec<QuoteLineItem>,
}
