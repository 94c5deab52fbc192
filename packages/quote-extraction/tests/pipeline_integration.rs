//! Integration tests for the quote extraction pipeline.
//!
//! These tests drive whole files through the pipeline:
//! 1. Cache lookup by content hash
//! 2. Profile resolution and page reduction
//! 3. Extraction with retry and escalation
//! 4. Batch aggregation
//! 5. Advice and human corrections feeding later runs

use std::time::Duration;

use chrono::Utc;
use quote_extraction::{
    testing::{result_with_offers, sample_pdf},
    AttachedFile, CorrectionField, Document, FileOutcome, MemoryStore, MockProvider, MockReply,
    Pipeline, PipelineConfig, Premiums, ProfileSelection, ProfileStore, Quote, QuoteLineItem,
    QuoteStore, ResultSource, RetryPolicy, SourceProfile, SubjectFields, UploadedFile,
};
use uuid::Uuid;

fn config() -> PipelineConfig {
    PipelineConfig::default().with_retry(RetryPolicy::immediate(2))
}

/// Helper to create an upload of a generated PDF.
fn upload(name: &str, pages: u32) -> UploadedFile {
    UploadedFile::new(Document::new(name, sample_pdf(pages).unwrap()))
}

fn priced(company: &str, found_pages: &[u32]) -> MockReply {
    let mut result = result_with_offers(&[(company, Premiums::new(1200.0, 1000.0, 800.0))]);
    result.offers[0].found_pages = found_pages.to_vec();
    MockReply::result(&result)
}

/// Helper to set up a pipeline with one profile.
async fn setup_with_profile(
    mock: &MockProvider,
    name: &str,
    page_spec: &str,
) -> (Pipeline<MemoryStore, MockProvider>, Uuid, SourceProfile) {
    let owner = Uuid::new_v4();
    let store = MemoryStore::new();
    let profile = SourceProfile::new(owner, name).with_page_spec(page_spec);
    store.upsert_profile(&profile).await.unwrap();
    (Pipeline::with_config(store, mock.clone(), config()), owner, profile)
}

#[tokio::test]
async fn test_degenerate_reduction_escalates_and_advises() {
    let mock = MockProvider::new()
        .with_reply_for("acme.pdf", MockReply::degenerate())
        .with_reply_for("acme.pdf", priced("Acme", &[4, 5]));
    let (pipeline, owner, profile) = setup_with_profile(&mock, "Acme", "2").await;

    let report = pipeline
        .process_batch(owner, Some("lote-1"), &[upload("acme.pdf", 6)])
        .await;

    let file = report.files[0].report().unwrap();
    assert!(file.escalated);
    assert_eq!(file.result.offers[0].company, "Acme");

    let sent: Vec<_> = mock.calls().iter().map(|c| c.page_count).collect();
    assert_eq!(sent, vec![Some(2), Some(6)]);

    assert_eq!(report.suggestions.len(), 1);
    let suggestion = &report.suggestions[0];
    assert_eq!(suggestion.profile_id, profile.id);
    assert_eq!(suggestion.suggested_spec, "4-5");

    pipeline.apply_suggestion(suggestion).await.unwrap();
    let updated = pipeline.store().get_profile(profile.id).await.unwrap().unwrap();
    assert_eq!(updated.page_spec, "4-5");
}

#[tokio::test]
async fn test_degenerate_twice_escalates_only_once() {
    let mock = MockProvider::new().with_fallback(MockReply::degenerate());
    let (pipeline, owner, _) = setup_with_profile(&mock, "Acme", "1").await;

    let report = pipeline
        .process_file(owner, Some("lote"), &upload("acme.pdf", 4))
        .await
        .unwrap();

    assert!(report.escalated);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_identical_content_reused_within_window() {
    let mock = MockProvider::new().with_fallback(priced("Acme", &[1]));
    let (pipeline, owner, _) = setup_with_profile(&mock, "Acme", "2").await;
    let file = upload("acme.pdf", 3);

    pipeline.process_file(owner, Some("lote-1"), &file).await.unwrap();
    let again = pipeline
        .process_file(owner, Some("lote-2"), &file.clone().with_file_path("copia/acme.pdf"))
        .await
        .unwrap();

    assert_eq!(again.source, ResultSource::Cached);
    assert!(!again.escalated);
    assert_eq!(mock.call_count(), 1);

    let quote = pipeline.store().get_quote(again.quote_id).await.unwrap().unwrap();
    assert_eq!(quote.items.len(), 1);
    assert_eq!(quote.items[0].file_path, "copia/acme.pdf");
}

#[tokio::test]
async fn test_stale_extraction_is_not_reused() {
    let mock = MockProvider::new().with_fallback(priced("Acme", &[1]));
    let (pipeline, owner, _) = setup_with_profile(&mock, "Acme", "2").await;
    let file = upload("acme.pdf", 2);
    let hash = file.document.content_hash();

    let old = Quote::new(owner, None)
        .with_subject(&SubjectFields::default())
        .with_created_at(Utc::now() - chrono::Duration::hours(73));
    pipeline.store().insert_quote(&old).await.unwrap();
    let attached = AttachedFile::new("old/acme.pdf", hash);
    let item = QuoteLineItem::from_offer(old.id, &Default::default(), &attached);
    pipeline.store().attach_items(old.id, &attached, &[item]).await.unwrap();

    let report = pipeline.process_file(owner, None, &file).await.unwrap();

    assert_eq!(report.source, ResultSource::Extracted);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_batch_failures_are_isolated() {
    let mock = MockProvider::new()
        .with_fallback(priced("Acme", &[1]))
        .with_reply_for("busy.pdf", MockReply::Transient("overloaded".into()))
        .with_reply_for("busy.pdf", MockReply::Transient("overloaded".into()))
        .with_reply_for("busy.pdf", MockReply::Transient("overloaded".into()))
        .with_reply_for("blocked.pdf", MockReply::Blocked);
    let (pipeline, owner, _) = setup_with_profile(&mock, "Acme", "2").await;

    // Distinct page counts keep the contents apart, so none is a cache hit.
    let files = vec![upload("busy.pdf", 2), upload("ok.pdf", 3), upload("blocked.pdf", 4)];
    let report = pipeline.process_batch(owner, Some("lote"), &files).await;

    let kinds: Vec<_> = report
        .files
        .iter()
        .map(|f| match f {
            FileOutcome::Succeeded(_) => "ok",
            FileOutcome::Failed { kind, .. } => *kind,
        })
        .collect();
    assert_eq!(kinds, vec!["transient", "ok", "empty_response"]);
    assert_eq!(mock.calls_for("busy.pdf").len(), 3);
    assert_eq!(mock.calls_for("blocked.pdf").len(), 1);

    let quotes = pipeline.store().list_quotes(owner).await.unwrap();
    assert_eq!(quotes.len(), 1);
    assert_eq!(pipeline.store().line_item_count(), 1);
}

#[tokio::test]
async fn test_learned_correction_reaches_next_prompt() {
    let mock = MockProvider::new().with_fallback(priced("Acme", &[1]));
    let (pipeline, owner, profile) = setup_with_profile(&mock, "Acme", "2").await;

    let first = pipeline
        .process_file(owner, Some("lote-1"), &upload("acme.pdf", 2))
        .await
        .unwrap();
    let quote = pipeline.store().get_quote(first.quote_id).await.unwrap().unwrap();

    let edit = pipeline
        .apply_edit(owner, quote.items[0].id, CorrectionField::Plan, "Completo Plus", true)
        .await
        .unwrap();
    assert_eq!(edit.rule.unwrap().profile_id, profile.id);

    pipeline
        .process_file(owner, Some("lote-2"), &upload("acme-renovacao.pdf", 3))
        .await
        .unwrap();

    let prompt = &mock.calls_for("acme-renovacao.pdf")[0].instructions;
    assert!(prompt.contains("\"Completo\""));
    assert!(prompt.contains("\"Completo Plus\""));
    assert!(!mock.calls_for("acme.pdf")[0].instructions.contains("Completo Plus"));
}

#[tokio::test]
async fn test_profile_can_be_bypassed() {
    let mock = MockProvider::new().with_fallback(priced("Acme", &[1]));
    let (pipeline, owner, _) = setup_with_profile(&mock, "Acme", "1").await;
    let file = upload("acme.pdf", 4).with_profile(ProfileSelection::None);

    let report = pipeline.process_file(owner, None, &file).await.unwrap();

    assert_eq!(report.profile_id, None);
    // default spec "2"
    assert_eq!(mock.calls()[0].page_count, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batch_builds_one_quote() {
    let mock = MockProvider::new()
        .with_fallback(priced("Acme", &[1]))
        .with_latency(Duration::from_millis(20));
    let owner = Uuid::new_v4();
    let pipeline = Pipeline::with_config(MemoryStore::new(), mock, config().with_concurrency(4));

    let files: Vec<_> = (1..=8).map(|n| upload(&format!("arquivo-{n}.pdf"), n)).collect();
    let report = pipeline.process_batch(owner, Some("lote-c"), &files).await;

    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.quote_ids().len(), 1);
    assert_eq!(pipeline.store().quote_count(), 1);
    assert_eq!(pipeline.store().line_item_count(), 8);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use quote_extraction::SqliteStore;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batch_on_sqlite() {
        let mock = MockProvider::new()
            .with_fallback(priced("Acme", &[1]))
            .with_latency(Duration::from_millis(10));
        let owner = Uuid::new_v4();
        let store = SqliteStore::in_memory().await.unwrap();
        let pipeline = Pipeline::with_config(store, mock, config().with_concurrency(4));

        let files: Vec<_> = (1..=6).map(|n| upload(&format!("f{n}.pdf"), n)).collect();
        let report = pipeline.process_batch(owner, Some("lote-s"), &files).await;

        assert_eq!(report.failed_count(), 0);
        let ids = report.quote_ids();
        assert_eq!(ids.len(), 1);

        let quote = pipeline.store().get_quote(ids[0]).await.unwrap().unwrap();
        assert_eq!(quote.items.len(), 6);

        // Re-running the batch attaches nothing new.
        let rerun = pipeline.process_batch(owner, Some("lote-s"), &files).await;
        assert!(rerun.succeeded().all(|f| !f.newly_attached));
        let quote = pipeline.store().get_quote(ids[0]).await.unwrap().unwrap();
        assert_eq!(quote.items.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batch_on_pooled_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("quotes.db").display());
        let store = SqliteStore::new(&url).await.unwrap();
        let mock = MockProvider::new()
            .with_fallback(priced("Acme", &[1]))
            .with_latency(Duration::from_millis(5));
        let owner = Uuid::new_v4();
        let pipeline = Pipeline::with_config(store, mock, config().with_concurrency(16));

        let files: Vec<_> = (1..=16).map(|n| upload(&format!("f{n}.pdf"), n)).collect();
        let report = pipeline.process_batch(owner, Some("lote-p"), &files).await;

        assert_eq!(report.failed_count(), 0);
        assert_eq!(report.quote_ids().len(), 1);
        assert_eq!(pipeline.store().list_quotes(owner).await.unwrap().len(), 1);

        let quote = pipeline
            .store()
            .get_quote(report.quote_ids()[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(quote.items.len(), 16);
    }
}
