//! Batch aggregator: the single point where extraction results are written.
//!
//! Files uploaded under one batch id merge into one quote per owner. The
//! quote row is obtained by atomic insert-or-fetch and each file is attached
//! at most once, so concurrent workers on the same batch need no locking of
//! their own.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::traits::store::QuoteStore;
use crate::types::{
    quote::{AttachedFile, Quote, QuoteLineItem, SubjectFields},
    result::Offer,
};

/// Outcome of attaching one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Attached {
    /// The quote after this file was merged in
    pub quote: Quote,

    /// False when the file was already attached and nothing was written
    pub newly_attached: bool,

    /// Line items written for this file
    pub items: Vec<QuoteLineItem>,
}

/// Merges per-file results into quotes.
pub struct BatchAggregator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: QuoteStore + ?Sized> BatchAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Attach one file's offers.
    ///
    /// Without a batch id every file gets its own quote, written together
    /// with its items in one store call. With one, the
    /// `(batch_id, owner_id)` quote is found or created, empty subject
    /// fields are filled, and one line item per offer is appended unless
    /// `file.file_path` is already attached to that quote.
    pub async fn attach(
        &self,
        batch_id: Option<&str>,
        owner_id: Uuid,
        subject: &SubjectFields,
        offers: &[Offer],
        file: &AttachedFile,
    ) -> Result<Attached> {
        let file = &file.clone().with_subject(subject);

        let Some(batch_id) = batch_id.filter(|b| !b.trim().is_empty()) else {
            let quote = Quote::new(owner_id, None).with_subject(subject);
            let items = line_items(quote.id, offers, file);
            self.store.insert_quote_with_items(&quote, file, &items).await?;

            info!(quote_id = %quote.id, file = %file.file_path, offers = items.len(), "Created standalone quote");
            return Ok(Attached {
                quote,
                newly_attached: true,
                items,
            });
        };

        let candidate = Quote::new(owner_id, Some(batch_id.to_string())).with_subject(subject);
        let mut quote = self.store.find_or_create_batch_quote(&candidate).await?;

        let mut merged = quote.clone();
        if quote.id != candidate.id && merged.fill_missing_subject(subject) {
            quote = self.store.fill_missing_subject(quote.id, subject).await?;
        }

        let items = line_items(quote.id, offers, file);
        let newly_attached = self.store.attach_items(quote.id, file, &items).await?;

        if newly_attached {
            info!(
                quote_id = %quote.id,
                batch_id = %batch_id,
                file = %file.file_path,
                offers = items.len(),
                "Attached file to batch quote"
            );
        } else {
            debug!(
                quote_id = %quote.id,
                file = %file.file_path,
                "File already attached, skipping"
            );
        }

        Ok(Attached {
            quote,
            newly_attached,
            items: if newly_attached { items } else { Vec::new() },
        })
    }
}

fn line_items(quote_id: Uuid, offers: &[Offer], file: &AttachedFile) -> Vec<QuoteLineItem> {
    offers
        .iter()
        .map(|offer| QuoteLineItem::from_offer(quote_id, offer, file))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::result::Premiums;
    use std::sync::Arc;

    fn offers() -> Vec<Offer> {
        vec![
            Offer {
                company: "Acme".into(),
                premiums: Premiums::new(1.0, 2.0, 3.0),
                ..Default::default()
            },
            Offer {
                company: "Beta".into(),
                premiums: Premiums::new(4.0, 5.0, 6.0),
                ..Default::default()
            },
        ]
    }

    fn subject(name: &str, asset: &str) -> SubjectFields {
        SubjectFields {
            name: name.into(),
            asset: asset.into(),
        }
    }

    #[tokio::test]
    async fn test_same_file_twice_attaches_once() {
        let store = MemoryStore::new();
        let aggregator = BatchAggregator::new(&store);
        let owner = Uuid::new_v4();
        let file = AttachedFile::new("uploads/acme.pdf", "h1");

        let first = aggregator
            .attach(Some("lote-1"), owner, &subject("Maria", ""), &offers(), &file)
            .await
            .unwrap();
        let second = aggregator
            .attach(Some("lote-1"), owner, &subject("Maria", ""), &offers(), &file)
            .await
            .unwrap();

        assert!(first.newly_attached);
        assert!(!second.newly_attached);
        assert_eq!(first.quote.id, second.quote.id);
        assert_eq!(store.line_item_count(), 2);
    }

    #[tokio::test]
    async fn test_later_files_fill_missing_subject() {
        let store = MemoryStore::new();
        let aggregator = BatchAggregator::new(&store);
        let owner = Uuid::new_v4();

        aggregator
            .attach(Some("lote"), owner, &subject("Maria", ""), &offers(), &AttachedFile::new("a.pdf", "a"))
            .await
            .unwrap();
        let second = aggregator
            .attach(Some("lote"), owner, &subject("Joana", "Fiat Argo"), &offers(), &AttachedFile::new("b.pdf", "b"))
            .await
            .unwrap();

        assert_eq!(second.quote.subject_name, "Maria");
        assert_eq!(second.quote.subject_asset, "Fiat Argo");
        assert_eq!(store.quote_count(), 1);

        let own = store.attached_subject(second.quote.id, "b.pdf").await.unwrap();
        assert_eq!(own, Some(subject("Joana", "Fiat Argo")));
    }

    #[tokio::test]
    async fn test_no_batch_means_standalone_quotes() {
        let store = MemoryStore::new();
        let aggregator = BatchAggregator::new(&store);
        let owner = Uuid::new_v4();

        let a = aggregator
            .attach(None, owner, &subject("", ""), &offers(), &AttachedFile::new("a.pdf", "a"))
            .await
            .unwrap();
        let b = aggregator
            .attach(None, owner, &subject("", ""), &offers(), &AttachedFile::new("a.pdf", "a"))
            .await
            .unwrap();

        assert_ne!(a.quote.id, b.quote.id);
        assert_eq!(store.quote_count(), 2);
        assert_eq!(store.line_item_count(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_files_share_one_quote() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let handles: Vec<_> = (0..12)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    BatchAggregator::new(store.as_ref())
                        .attach(
                            Some("lote-c"),
                            owner,
                            &SubjectFields::default(),
                            &offers(),
                            &AttachedFile::new(format!("{n}.pdf"), format!("h{n}")),
                        )
                        .await
                        .unwrap()
                        .quote
                        .id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(store.quote_count(), 1);
        assert_eq!(store.line_item_count(), 24);
    }
}
