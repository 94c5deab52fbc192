//! Escalation controller.
//!
//! A result whose offers all carry zero premiums usually means the prices
//! were on a page the optimizer dropped. Such a result is re-extracted once
//! from the whole document.

use tracing::{info, warn};

use crate::error::Result;
use crate::pipeline::client::ExtractionClient;
use crate::pipeline::optimize::{optimize_with_spec, Optimized};
use crate::pipeline::pages::PageSpec;
use crate::traits::provider::ExtractionProvider;
use crate::types::{document::Document, profile::CorrectionRule, result::ExtractionResult};

/// Inputs for one file's extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub document: &'a Document,
    pub page_spec: &'a PageSpec,
    pub profile_rules: &'a str,
    pub corrections: &'a [CorrectionRule],
}

/// Result of an extraction, with whether escalation happened.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationOutcome {
    /// Found pages are in original document numbering.
    pub result: ExtractionResult,
    pub escalated: bool,
}

/// True when there are no offers or every offer has all premiums zero/absent.
pub fn is_degenerate(result: &ExtractionResult) -> bool {
    result.offers.iter().all(|offer| offer.premiums.is_all_zero())
}

/// Reduce, extract, and escalate at most once.
///
/// When `escalate` is set, the spec is not already the whole document, and
/// the first result is degenerate, the whole document is extracted again
/// with the same correction rules. The second result replaces the first
/// whatever it contains. If the second call fails, the first result is kept
/// and the failure is logged.
pub async fn extract_with_escalation<P: ExtractionProvider>(
    client: &ExtractionClient<P>,
    input: ExtractionInput<'_>,
    escalate: bool,
) -> Result<EscalationOutcome> {
    let document = input.document;

    let optimized = optimize_with_spec(document, input.page_spec).unwrap_or_else(|e| {
        warn!(
            file = %document.file_name,
            error = %e,
            "Page reduction failed, sending whole document"
        );
        Optimized::unchanged(document)
    });

    let mut result = client
        .extract(&optimized.document, input.profile_rules, input.corrections)
        .await?;
    optimized.remap_found_pages(&mut result);

    if !escalate || input.page_spec.is_full() || !is_degenerate(&result) {
        return Ok(EscalationOutcome {
            result,
            escalated: false,
        });
    }

    info!(
        file = %document.file_name,
        page_spec = %input.page_spec,
        offers = result.offers.len(),
        "Degenerate result, escalating to whole document"
    );

    match client
        .extract(document, input.profile_rules, input.corrections)
        .await
    {
        Ok(full) => result = full,
        Err(e) => warn!(
            file = %document.file_name,
            error = %e,
            "Escalated extraction failed, keeping reduced result"
        ),
    }

    Ok(EscalationOutcome {
        result,
        escalated: true,
    })
}
