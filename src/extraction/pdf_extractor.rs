//! Library-backed PDF text extraction
//!
//! Wraps the pdf-extract crate with error handling for:
//! - Encrypted or corrupted PDFs (returned as errors)
//! - Parser panics on malformed input (caught and returned as errors)
//! - Builds without the `precise-pdf` feature (always unavailable)

#[cfg(feature = "precise-pdf")]
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, thiserror::Error)]
pub enum PreciseError {
    #[error("precise PDF backend not compiled in")]
    Unavailable,
    #[error("{0}")]
    Failed(String),
    #[error("PDF parser panicked: {0}")]
    Panicked(String),
    #[error("no text layer found")]
    Empty,
}

/// Whether this build carries the library-backed extractor
pub fn is_available() -> bool {
    cfg!(feature = "precise-pdf")
}

/// Extract full text from PDF bytes
///
/// Whitespace-only output is reported as [`PreciseError::Empty`] so callers
/// can fall back to the heuristic scanner.
#[cfg(feature = "precise-pdf")]
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> Result<String, PreciseError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(pdf_bytes)
    }));

    let text = match result {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(PreciseError::Failed(e.to_string())),
        Err(payload) => return Err(PreciseError::Panicked(super::panic_message(payload.as_ref()))),
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(PreciseError::Empty);
    }
    Ok(text.to_string())
}

#[cfg(not(feature = "precise-pdf"))]
pub fn extract_text_from_pdf(_pdf_bytes: &[u8]) -> Result<String, PreciseError> {
    Err(PreciseError::Unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_an_error_not_a_panic() {
        let result = extract_text_from_pdf(b"definitely not a pdf");
        assert!(result.is_err());
    }

    #[test]
    fn test_availability_matches_feature() {
        assert_eq!(is_available(), cfg!(feature = "precise-pdf"));
    }
}
