//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction library
//! without making real provider calls or shipping fixture PDFs.

use async_trait::async_trait;
use lopdf::{dictionary, Object};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{DocumentError, DocumentResult, ExtractionError, Result};
use crate::traits::provider::{ExtractionProvider, ProviderRequest};
use crate::types::result::{ExtractionResult, Offer, Premiums};

/// Dictionary key stamped on every page of [`sample_pdf`].
const PAGE_MARKER: &str = "QuotePage";

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Raw response text, returned as-is.
    Text(String),

    /// An overload or rate-limit failure.
    Transient(String),

    /// A non-retryable failure.
    Permanent(String),

    /// A safety-filtered or empty answer.
    Blocked,
}

impl MockReply {
    /// Reply with a serialized result.
    pub fn result(result: &ExtractionResult) -> Self {
        Self::Text(serde_json::to_string(result).unwrap_or_default())
    }

    /// Reply with one offer per `(company, premiums)` pair.
    pub fn offers(offers: &[(&str, Premiums)]) -> Self {
        Self::result(&result_with_offers(offers))
    }

    /// Reply with a single all-zero offer.
    pub fn degenerate() -> Self {
        Self::offers(&[("Degenerate Seguros", Premiums::new(0.0, 0.0, 0.0))])
    }
}

/// Record of a call made to the mock provider.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub file_name: String,
    pub instructions: String,

    /// Pages in the document that was sent, when it parses as a PDF
    pub page_count: Option<usize>,
}

/// A scripted, call-recording extraction provider.
///
/// Replies are taken from a per-file queue first, then from the shared
/// queue, then the fallback. Clones share state, so a test can keep a
/// handle while the pipeline owns another.
#[derive(Clone)]
pub struct MockProvider {
    by_file: Arc<RwLock<HashMap<String, VecDeque<MockReply>>>>,
    shared: Arc<RwLock<VecDeque<MockReply>>>,
    fallback: Arc<RwLock<MockReply>>,
    latency: Duration,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            by_file: Default::default(),
            shared: Default::default(),
            fallback: Arc::new(RwLock::new(MockReply::Permanent(
                "no scripted reply".into(),
            ))),
            latency: Duration::ZERO,
            calls: Default::default(),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for whichever file calls next.
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.shared.write().unwrap().push_back(reply);
        self
    }

    /// Queue a reply for a specific file name.
    pub fn with_reply_for(self, file_name: impl Into<String>, reply: MockReply) -> Self {
        self.by_file
            .write()
            .unwrap()
            .entry(file_name.into())
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used once the queues are drained.
    pub fn with_fallback(self, reply: MockReply) -> Self {
        *self.fallback.write().unwrap() = reply;
        self
    }

    /// Sleep before answering, to force interleaving in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    /// Calls made for one file.
    pub fn calls_for(&self, file_name: &str) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.file_name == file_name)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn next_reply(&self, file_name: &str) -> MockReply {
        if let Some(reply) = self
            .by_file
            .write()
            .unwrap()
            .get_mut(file_name)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        if let Some(reply) = self.shared.write().unwrap().pop_front() {
            return reply;
        }
        self.fallback.read().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: ProviderRequest<'_>) -> Result<String> {
        let file_name = request.document.file_name.clone();
        self.calls.write().unwrap().push(MockCall {
            file_name: file_name.clone(),
            instructions: request.instructions.to_string(),
            page_count: request.document.page_count().ok(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.next_reply(&file_name) {
            MockReply::Text(text) => Ok(text),
            MockReply::Transient(msg) => Err(ExtractionError::Transient(msg)),
            MockReply::Permanent(msg) => Err(ExtractionError::Permanent(msg)),
            MockReply::Blocked => Err(ExtractionError::EmptyResponse("blocked".into())),
        }
    }
}

/// Build a result with one offer per `(company, premiums)` pair, each found
/// on page 1.
pub fn result_with_offers(offers: &[(&str, Premiums)]) -> ExtractionResult {
    ExtractionResult {
        subject_name: "Maria Silva".into(),
        subject_asset: "Toyota Corolla 2022".into(),
        offers: offers
            .iter()
            .map(|(company, premiums)| Offer {
                company: company.to_string(),
                plan: "Completo".into(),
                premiums: *premiums,
                found_pages: vec![1],
                ..Default::default()
            })
            .collect(),
    }
}

/// Build a PDF with `pages` blank pages. Page `n` carries the marker `n`,
/// readable with [`page_markers`].
pub fn sample_pdf(pages: u32) -> DocumentResult<Vec<u8>> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (1..=pages)
        .map(|n| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
                PAGE_MARKER => i64::from(n),
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::from(pages),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| DocumentError::Write(e.to_string()))?;
    Ok(buffer)
}

/// Markers of the pages in a PDF built by [`sample_pdf`], in page order.
pub fn page_markers(bytes: &[u8]) -> DocumentResult<Vec<i64>> {
    let doc = lopdf::Document::load_mem(bytes)?;
    doc.get_pages()
        .values()
        .map(|&id| -> DocumentResult<i64> {
            Ok(doc
                .get_dictionary(id)?
                .get(PAGE_MARKER.as_bytes())?
                .as_i64()?)
        })
        .collect()
}
