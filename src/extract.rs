//! Text extraction for source documents.
//!
//! Loaders supply bytes plus a content type; this module returns plain
//! UTF-8 text, one entry per PDF page. Extraction never panics: failures come back as
//! [`ExtractError`] and the ingestion pipeline skips the file.

use std::path::Path;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Guesses a content type from the file extension.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "txt" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        _ => None,
    }
}

/// Extracts plain text from file content, split into pages.
///
/// PDFs yield one string per page in page order; text and markdown files
/// are a single page.
pub fn extract_pages(bytes: &[u8], content_type: &str) -> Result<Vec<String>, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf_pages(bytes),
        MIME_TEXT | MIME_MARKDOWN => Ok(vec![String::from_utf8_lossy(bytes).into_owned()]),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("a/b/Book.PDF")), Some(MIME_PDF));
        assert_eq!(content_type_for(Path::new("notes.txt")), Some(MIME_TEXT));
        assert_eq!(content_type_for(Path::new("README.md")), Some(MIME_MARKDOWN));
        assert_eq!(content_type_for(Path::new("image.png")), None);
        assert_eq!(content_type_for(Path::new("no_extension")), None);
    }

    #[test]
    fn test_plain_text_passthrough() {
        let pages = extract_pages("Headache: pain in the head.".as_bytes(), MIME_TEXT).unwrap();
        assert_eq!(pages, vec!["Headache: pain in the head.".to_string()]);
    }

    #[test]
    fn test_unsupported_type() {
        let err = extract_pages(b"...", "image/png").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn test_garbage_pdf_is_error_not_panic() {
        let err = extract_pages(b"not a pdf at all", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
