//! Content-addressed extraction cache.
//!
//! There is no cache table. A hit is any recent quote of the same owner
//! holding line items from a file with the same SHA-256, so entries expire
//! by age alone and never need invalidation.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::traits::store::QuoteStore;
use crate::types::{
    quote::{Quote, SubjectFields},
    result::ExtractionResult,
};

/// A previous extraction of identical content.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// The quote that produced the entry
    pub quote: Quote,

    /// Result rebuilt in the shape a provider would have returned
    pub result: ExtractionResult,

    /// Profile the cached items were extracted with
    pub profile_id: Option<Uuid>,

    /// Path of the file the cached items came from
    pub file_path: String,
}

/// Read-only view over stored quotes, keyed by content hash.
pub struct ExtractionCache<'a, S: ?Sized> {
    store: &'a S,
    freshness: Duration,
}

impl<'a, S: QuoteStore + ?Sized> ExtractionCache<'a, S> {
    pub fn new(store: &'a S, freshness: Duration) -> Self {
        Self { store, freshness }
    }

    /// Look up `content_hash` for `owner_id` as of now.
    pub async fn lookup(&self, owner_id: Uuid, content_hash: &str) -> Result<Option<CacheHit>> {
        self.lookup_at(owner_id, content_hash, Utc::now()).await
    }

    /// Look up `content_hash` for `owner_id` as of `now`.
    pub async fn lookup_at(
        &self,
        owner_id: Uuid,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheHit>> {
        let window = chrono::Duration::from_std(self.freshness)
            .map_err(|e| ExtractionError::Config(format!("cache freshness out of range: {e}")))?;

        let Some(found) = self
            .store
            .find_recent_by_content_hash(owner_id, content_hash, now - window)
            .await?
        else {
            return Ok(None);
        };

        // Only one file's items: the same bytes may be attached under two names.
        let Some(first) = found.items.iter().find(|i| i.content_hash == content_hash) else {
            return Ok(None);
        };
        let file_path = first.file_path.clone();
        let profile_id = first.profile_id;

        let offers = found
            .items
            .iter()
            .filter(|i| i.content_hash == content_hash && i.file_path == file_path)
            .map(|i| i.to_offer())
            .collect();

        // The quote's subject may come from a sibling file in the batch.
        let subject = self
            .store
            .attached_subject(found.quote.id, &file_path)
            .await?
            .unwrap_or_else(|| SubjectFields {
                name: found.quote.subject_name.clone(),
                asset: found.quote.subject_asset.clone(),
            });

        debug!(
            quote_id = %found.quote.id,
            content_hash = %content_hash,
            "Extraction cache hit"
        );

        Ok(Some(CacheHit {
            result: ExtractionResult {
                subject_name: subject.name,
                subject_asset: subject.asset,
                offers,
            },
            quote: found.quote,
            profile_id,
            file_path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::{
        config::CACHE_FRESHNESS,
        quote::{AttachedFile, QuoteLineItem, SubjectFields},
        result::{Offer, Premiums},
    };

    fn maria() -> SubjectFields {
        SubjectFields {
            name: "Maria".into(),
            asset: "Fiat Argo".into(),
        }
    }

    async fn seed(store: &MemoryStore, owner: Uuid, age_hours: i64, files: &[(&str, &str)]) -> Quote {
        let quote = Quote::new(owner, None)
            .with_subject(&maria())
            .with_created_at(Utc::now() - chrono::Duration::hours(age_hours));
        store.insert_quote(&quote).await.unwrap();

        for (path, hash) in files {
            let file = AttachedFile::new(*path, *hash).with_subject(&maria());
            let offer = Offer {
                company: format!("Company of {path}"),
                premiums: Premiums::new(1.0, 2.0, 3.0),
                ..Default::default()
            };
            let item = QuoteLineItem::from_offer(quote.id, &offer, &file);
            store.attach_items(quote.id, &file, &[item]).await.unwrap();
        }
        quote
    }

    #[tokio::test]
    async fn test_hit_rebuilds_result() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let quote = seed(&store, owner, 1, &[("a.pdf", "h-a"), ("b.pdf", "h-b")]).await;
        let cache = ExtractionCache::new(&store, CACHE_FRESHNESS);

        let hit = cache.lookup(owner, "h-b").await.unwrap().unwrap();

        assert_eq!(hit.quote.id, quote.id);
        assert_eq!(hit.file_path, "b.pdf");
        assert_eq!(hit.result.subject_name, "Maria");
        assert_eq!(hit.result.offers.len(), 1);
        assert_eq!(hit.result.offers[0].company, "Company of b.pdf");
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        seed(&store, owner, 73, &[("a.pdf", "h-a")]).await;
        let cache = ExtractionCache::new(&store, CACHE_FRESHNESS);

        assert!(cache.lookup(owner, "h-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_owner_is_a_miss() {
        let store = MemoryStore::new();
        seed(&store, Uuid::new_v4(), 1, &[("a.pdf", "h-a")]).await;
        let cache = ExtractionCache::new(&store, CACHE_FRESHNESS);

        assert!(cache.lookup(Uuid::new_v4(), "h-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_upload_under_two_names_not_doubled() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        seed(&store, owner, 1, &[("a.pdf", "same"), ("a-copy.pdf", "same")]).await;
        let cache = ExtractionCache::new(&store, CACHE_FRESHNESS);

        let hit = cache.lookup(owner, "same").await.unwrap().unwrap();
        assert_eq!(hit.result.offers.len(), 1);
    }

    #[tokio::test]
    async fn test_hit_keeps_its_own_file_subject() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let quote = seed(&store, owner, 1, &[("a.pdf", "h-a")]).await;

        let joana = SubjectFields {
            name: "Joana".into(),
            asset: "Honda Civic".into(),
        };
        let file = AttachedFile::new("b.pdf", "h-b").with_subject(&joana);
        let item = QuoteLineItem::from_offer(quote.id, &Offer::default(), &file);
        store.attach_items(quote.id, &file, &[item]).await.unwrap();

        let hit = ExtractionCache::new(&store, CACHE_FRESHNESS)
            .lookup(owner, "h-b")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(hit.quote.subject_name, "Maria");
        assert_eq!(hit.result.subject_name, "Joana");
        assert_eq!(hit.result.subject_asset, "Honda Civic");
    }
}
