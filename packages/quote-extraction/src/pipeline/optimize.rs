//! Document optimizer.
//!
//! Builds a smaller PDF containing only the selected pages, so the provider
//! is billed for the part of a quote that actually holds prices. The source
//! document is never modified; reduction works on a freshly parsed copy.

use tracing::debug;

use crate::error::{DocumentError, DocumentResult};
use crate::pipeline::pages::{PageSelection, PageSpec};
use crate::types::{document::Document, result::ExtractionResult};

/// Output of the optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimized {
    /// Document to send upstream.
    pub document: Document,

    /// Original 1-indexed page numbers kept, in output order.
    /// `None` when the document passed through unchanged.
    pub kept_pages: Option<Vec<u32>>,
}

impl Optimized {
    /// Pass a document through untouched.
    pub fn unchanged(document: &Document) -> Self {
        Self {
            document: document.clone(),
            kept_pages: None,
        }
    }

    pub fn is_reduced(&self) -> bool {
        self.kept_pages.is_some()
    }

    /// Map a 1-indexed page of the sent document back to the original.
    pub fn original_page(&self, sent_page: u32) -> Option<u32> {
        match &self.kept_pages {
            None => (sent_page >= 1).then_some(sent_page),
            Some(kept) => kept.get((sent_page as usize).checked_sub(1)?).copied(),
        }
    }

    /// Rewrite every offer's found pages into original numbering.
    /// Pages that don't exist in the sent document are dropped.
    pub fn remap_found_pages(&self, result: &mut ExtractionResult) {
        if !self.is_reduced() {
            return;
        }
        for offer in &mut result.offers {
            offer.found_pages = offer
                .found_pages
                .iter()
                .filter_map(|&page| self.original_page(page))
                .collect();
        }
    }
}

/// Apply a resolved selection to a document.
///
/// Non-PDF documents and [`PageSelection::Whole`] pass through unchanged,
/// as does any selection that would keep every page.
pub fn optimize(document: &Document, selection: &PageSelection) -> DocumentResult<Optimized> {
    if !document.is_pdf() || selection.is_whole() {
        return Ok(Optimized::unchanged(document));
    }
    let pdf = lopdf::Document::load_mem(&document.bytes)?;
    reduce(pdf, document, selection)
}

/// Resolve `spec` against the document's page count and apply it, parsing
/// the PDF only once.
pub fn optimize_with_spec(document: &Document, spec: &PageSpec) -> DocumentResult<Optimized> {
    if !document.is_pdf() || spec.is_full() {
        return Ok(Optimized::unchanged(document));
    }
    let pdf = lopdf::Document::load_mem(&document.bytes)?;
    let selection = spec.resolve(pdf.get_pages().len());
    reduce(pdf, document, &selection)
}

fn reduce(
    mut pdf: lopdf::Document,
    document: &Document,
    selection: &PageSelection,
) -> DocumentResult<Optimized> {
    let PageSelection::Keep(keep) = selection else {
        return Ok(Optimized::unchanged(document));
    };

    let page_count = pdf.get_pages().len();
    if page_count == 0 {
        return Err(DocumentError::NoPages);
    }

    let mut kept: Vec<u32> = keep
        .iter()
        .filter(|&&index| index < page_count)
        .map(|&index| index as u32 + 1)
        .collect();
    if kept.is_empty() {
        kept.push(1);
    }
    if kept.len() >= page_count {
        return Ok(Optimized::unchanged(document));
    }

    let dropped: Vec<u32> = (1..=page_count as u32)
        .filter(|page| !kept.contains(page))
        .collect();
    pdf.delete_pages(&dropped);
    pdf.prune_objects();

    let mut buffer = Vec::with_capacity(document.bytes.len());
    pdf.save_to(&mut buffer)
        .map_err(|e| DocumentError::Write(e.to_string()))?;

    debug!(
        file = %document.file_name,
        original_pages = page_count,
        kept_pages = kept.len(),
        original_bytes = document.bytes.len(),
        reduced_bytes = buffer.len(),
        "Reduced document"
    );

    Ok(Optimized {
        document: Document {
            file_name: document.file_name.clone(),
            mime_type: document.mime_type.clone(),
            bytes: buffer.into(),
        },
        kept_pages: Some(kept),
    })
}
