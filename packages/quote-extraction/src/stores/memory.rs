//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::traits::store::{CorrectionStore, ProfileStore, QuoteStore};
use crate::types::{
    profile::{CorrectionRule, SourceProfile},
    quote::{AttachedFile, Quote, QuoteLineItem, QuoteWithItems, SubjectFields},
};

/// In-memory storage for quotes, profiles, and correction rules.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
///
/// Everything lives behind one lock, so each trait method is a single
/// critical section and the atomicity the aggregator needs comes for free.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    quotes: HashMap<Uuid, Quote>,
    batch_index: HashMap<(Uuid, String), Uuid>,
    items: Vec<QuoteLineItem>,
    attached_files: HashMap<(Uuid, String), SubjectFields>,
    profiles: HashMap<Uuid, SourceProfile>,
    rules: Vec<CorrectionRule>,
}

impl Inner {
    fn with_items(&self, quote: &Quote) -> QuoteWithItems {
        QuoteWithItems {
            quote: quote.clone(),
            items: self
                .items
                .iter()
                .filter(|i| i.quote_id == quote.id)
                .cloned()
                .collect(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Get the number of stored quotes.
    pub fn quote_count(&self) -> usize {
        self.read().map(|i| i.quotes.len()).unwrap_or_default()
    }

    /// Get the number of stored line items.
    pub fn line_item_count(&self) -> usize {
        self.read().map(|i| i.items.len()).unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| ExtractionError::storage("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| ExtractionError::storage("memory store lock poisoned"))
    }
}

#[async_trait]
impl QuoteStore for MemoryStore {
    async fn find_or_create_batch_quote(&self, candidate: &Quote) -> Result<Quote> {
        let batch_id = candidate
            .batch_id
            .clone()
            .ok_or_else(|| ExtractionError::storage("batch quote requires a batch id"))?;

        let mut inner = self.write()?;
        let key = (candidate.owner_id, batch_id);
        if let Some(id) = inner.batch_index.get(&key) {
            if let Some(existing) = inner.quotes.get(id) {
                return Ok(existing.clone());
            }
        }

        inner.batch_index.insert(key, candidate.id);
        inner.quotes.insert(candidate.id, candidate.clone());
        Ok(candidate.clone())
    }

    async fn insert_quote(&self, quote: &Quote) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(batch_id) = &quote.batch_id {
            let key = (quote.owner_id, batch_id.clone());
            if inner.batch_index.contains_key(&key) {
                return Err(ExtractionError::storage(format!(
                    "quote for batch {batch_id} already exists"
                )));
            }
            inner.batch_index.insert(key, quote.id);
        }
        inner.quotes.insert(quote.id, quote.clone());
        Ok(())
    }

    async fn insert_quote_with_items(
        &self,
        quote: &Quote,
        file: &AttachedFile,
        items: &[QuoteLineItem],
    ) -> Result<()> {
        let mut inner = self.write()?;
        if quote.batch_id.is_some() {
            return Err(ExtractionError::storage("standalone quote must not have a batch id"));
        }
        inner.quotes.insert(quote.id, quote.clone());
        inner
            .attached_files
            .insert((quote.id, file.file_path.clone()), file.subject.clone());
        inner.items.extend(items.iter().cloned());
        Ok(())
    }

    async fn fill_missing_subject(&self, quote_id: Uuid, subject: &SubjectFields) -> Result<Quote> {
        let mut inner = self.write()?;
        let quote = inner
            .quotes
            .get_mut(&quote_id)
            .ok_or_else(|| ExtractionError::NotFound {
                entity: "quote",
                id: quote_id.to_string(),
            })?;
        quote.fill_missing_subject(subject);
        Ok(quote.clone())
    }

    async fn attach_items(
        &self,
        quote_id: Uuid,
        file: &AttachedFile,
        items: &[QuoteLineItem],
    ) -> Result<bool> {
        let mut inner = self.write()?;
        if !inner.quotes.contains_key(&quote_id) {
            return Err(ExtractionError::NotFound {
                entity: "quote",
                id: quote_id.to_string(),
            });
        }
        let key = (quote_id, file.file_path.clone());
        if inner.attached_files.contains_key(&key) {
            return Ok(false);
        }
        inner.attached_files.insert(key, file.subject.clone());
        inner.items.extend(items.iter().cloned());
        Ok(true)
    }

    async fn get_quote(&self, id: Uuid) -> Result<Option<QuoteWithItems>> {
        let inner = self.read()?;
        Ok(inner.quotes.get(&id).map(|q| inner.with_items(q)))
    }

    async fn list_quotes(&self, owner_id: Uuid) -> Result<Vec<Quote>> {
        let inner = self.read()?;
        let mut quotes: Vec<Quote> = inner
            .quotes
            .values()
            .filter(|q| q.owner_id == owner_id)
            .cloned()
            .collect();
        quotes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quotes)
    }

    async fn find_recent_by_content_hash(
        &self,
        owner_id: Uuid,
        content_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<QuoteWithItems>> {
        let inner = self.read()?;
        let newest = inner
            .items
            .iter()
            .filter(|i| i.content_hash == content_hash)
            .filter_map(|i| inner.quotes.get(&i.quote_id))
            .filter(|q| q.owner_id == owner_id && q.created_at >= since)
            .max_by_key(|q| q.created_at);

        Ok(newest.map(|q| inner.with_items(q)))
    }

    async fn attached_subject(
        &self,
        quote_id: Uuid,
        file_path: &str,
    ) -> Result<Option<SubjectFields>> {
        Ok(self
            .read()?
            .attached_files
            .get(&(quote_id, file_path.to_string()))
            .cloned())
    }

    async fn get_line_item(&self, id: Uuid) -> Result<Option<QuoteLineItem>> {
        Ok(self.read()?.items.iter().find(|i| i.id == id).cloned())
    }

    async fn update_line_item(&self, item: &QuoteLineItem) -> Result<()> {
        let mut inner = self.write()?;
        let slot = inner
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| ExtractionError::NotFound {
                entity: "line item",
                id: item.id.to_string(),
            })?;
        *slot = item.clone();
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, id: Uuid) -> Result<Option<SourceProfile>> {
        Ok(self.read()?.profiles.get(&id).cloned())
    }

    async fn list_profiles(&self, owner_id: Uuid) -> Result<Vec<SourceProfile>> {
        let mut profiles: Vec<SourceProfile> = self
            .read()?
            .profiles
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    async fn upsert_profile(&self, profile: &SourceProfile) -> Result<()> {
        self.write()?.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn update_page_spec(&self, id: Uuid, page_spec: &str) -> Result<()> {
        let mut inner = self.write()?;
        let profile = inner
            .profiles
            .get_mut(&id)
            .ok_or_else(|| ExtractionError::NotFound {
                entity: "profile",
                id: id.to_string(),
            })?;
        profile.page_spec = page_spec.to_string();
        Ok(())
    }
}

#[async_trait]
impl CorrectionStore for MemoryStore {
    async fn add_rule(&self, rule: &CorrectionRule) -> Result<()> {
        self.write()?.rules.push(rule.clone());
        Ok(())
    }

    async fn rules_for_profile(&self, profile_id: Uuid) -> Result<Vec<CorrectionRule>> {
        Ok(self
            .read()?
            .rules
            .iter()
            .filter(|r| r.profile_id == profile_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::profile::CorrectionField;
    use crate::types::result::{Offer, Premiums};
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn item_for(quote: &Quote, file: &AttachedFile, plan: &str) -> QuoteLineItem {
        let offer = Offer {
            company: "Acme".into(),
            plan: plan.into(),
            premiums: Premiums::new(100.0, 90.0, 80.0),
            ..Default::default()
        };
        QuoteLineItem::from_offer(quote.id, &offer, file)
    }

    #[tokio::test]
    async fn test_batch_quote_insert_or_fetch() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let first = Quote::new(owner, Some("lote-7".into()));
        let second = Quote::new(owner, Some("lote-7".into()));

        let a = store.find_or_create_batch_quote(&first).await.unwrap();
        let b = store.find_or_create_batch_quote(&second).await.unwrap();

        assert_eq!(a.id, first.id);
        assert_eq!(b.id, first.id);
        assert_eq!(store.quote_count(), 1);

        // Same batch id under another owner is a different quote
        let other = Quote::new(Uuid::new_v4(), Some("lote-7".into()));
        let c = store.find_or_create_batch_quote(&other).await.unwrap();
        assert_eq!(c.id, other.id);
        assert_eq!(store.quote_count(), 2);
    }

    #[tokio::test]
    async fn test_attach_is_idempotent_per_file_path() {
        let store = MemoryStore::new();
        let quote = Quote::new(Uuid::new_v4(), Some("lote".into()));
        store.find_or_create_batch_quote(&quote).await.unwrap();

        let file = AttachedFile::new("uploads/a.pdf", "hash-a");
        let item = item_for(&quote, &file, "Gold");

        assert!(store.attach_items(quote.id, &file, &[item.clone()]).await.unwrap());
        assert!(!store.attach_items(quote.id, &file, &[item]).await.unwrap());

        let stored = store.get_quote(quote.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batch_attach() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    let quote = store
                        .find_or_create_batch_quote(&Quote::new(owner, Some("lote-c".into())))
                        .await
                        .unwrap();
                    let file = AttachedFile::new(format!("uploads/{n}.pdf"), format!("h{n}"));
                    let item = item_for(&quote, &file, "Gold");
                    store.attach_items(quote.id, &file, &[item]).await.unwrap();
                    quote.id
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(store.quote_count(), 1);
        assert_eq!(store.line_item_count(), 16);
    }

    #[tokio::test]
    async fn test_recent_by_content_hash_respects_window_and_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        let old = Quote::new(owner, None).with_created_at(now - Duration::hours(100));
        let fresh = Quote::new(owner, None).with_created_at(now - Duration::hours(1));
        for quote in [&old, &fresh] {
            store.insert_quote(quote).await.unwrap();
            let file = AttachedFile::new(format!("{}.pdf", quote.id), "same-hash");
            let item = item_for(quote, &file, "Gold");
            store.attach_items(quote.id, &file, &[item]).await.unwrap();
        }

        let hit = store
            .find_recent_by_content_hash(owner, "same-hash", now - Duration::hours(72))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.quote.id, fresh.id);

        let miss = store
            .find_recent_by_content_hash(Uuid::new_v4(), "same-hash", now - Duration::hours(72))
            .await
            .unwrap();
        assert!(miss.is_none());

        let expired = store
            .find_recent_by_content_hash(owner, "same-hash", now)
            .await
            .unwrap();
        assert!(expired.is_none());
    }

    #[tokio::test]
    async fn test_rules_accumulate_per_profile() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let profile = SourceProfile::new(owner, "Acme");

        store
            .add_rule(&CorrectionRule::new(profile.id, owner, CorrectionField::Plan, "A", "B"))
            .await
            .unwrap();
        store
            .add_rule(&CorrectionRule::new(profile.id, owner, CorrectionField::Plan, "A", "C"))
            .await
            .unwrap();
        store
            .add_rule(&CorrectionRule::new(Uuid::new_v4(), owner, CorrectionField::Plan, "X", "Y"))
            .await
            .unwrap();

        let rules = store.rules_for_profile(profile.id).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].corrected_value, "B");
        assert_eq!(rules[1].corrected_value, "C");
    }
}
