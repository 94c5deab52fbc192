//! Uploaded documents and their content hashes.

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{DocumentError, DocumentResult};

/// MIME type for PDF uploads.
pub const PDF_MIME: &str = "application/pdf";

/// An uploaded quote document.
///
/// Bytes are reference counted, so cloning a document for an escalation
/// re-run does not copy the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Original file name, used for profile matching and provider requests
    pub file_name: String,

    /// MIME type of the payload
    pub mime_type: String,

    /// Raw file contents
    pub bytes: Bytes,
}

impl Document {
    /// Create a document, inferring the MIME type from the file extension.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_for(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes: bytes.into(),
        }
    }

    /// Override the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Whether page-level operations apply to this document.
    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }

    /// Number of pages. Images always count as a single page.
    pub fn page_count(&self) -> DocumentResult<usize> {
        if !self.is_pdf() {
            return Ok(1);
        }
        let pdf = lopdf::Document::load_mem(&self.bytes)?;
        match pdf.get_pages().len() {
            0 => Err(DocumentError::NoPages),
            n => Ok(n),
        }
    }

    /// SHA-256 of the raw bytes.
    pub fn content_hash(&self) -> String {
        content_hash(&self.bytes)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
///
/// This is the key used by the extraction cache, so it hashes the exact
/// upload with no normalization.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => PDF_MIME,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(Document::new("quote.PDF", Vec::<u8>::new()).mime_type, PDF_MIME);
        assert_eq!(Document::new("scan.jpeg", Vec::<u8>::new()).mime_type, "image/jpeg");
        assert_eq!(
            Document::new("noext", Vec::<u8>::new()).mime_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_images_are_single_page() {
        let doc = Document::new("scan.png", vec![1u8, 2, 3]);
        assert_eq!(doc.page_count().unwrap(), 1);
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let hash = content_hash(b"quote");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, content_hash(b"quote"));
        assert_ne!(hash, content_hash(b"quote "));
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        let doc = Document::new("broken.pdf", b"not a pdf".to_vec());
        assert!(doc.page_count().is_err());
    }
}
