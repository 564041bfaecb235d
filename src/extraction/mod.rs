//! Document text extraction
//!
//! Turns uploaded bytes into bounded plain text:
//! - PDFs go through the library-backed extractor when selected and available,
//!   falling back to the heuristic scanner on any failure
//! - Text-like formats are decoded as UTF-8 with replacement characters
//!
//! Output never exceeds the configured character cap, and extraction never
//! fails: a PDF we cannot read becomes a fallback notice.

pub mod pdf_extractor;
pub mod pdf_scanner;

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::utils::truncate_owned;
use pdf_extractor::PreciseError;

/// Default cap on characters kept per document
pub const DEFAULT_MAX_CHARS: usize = 40_000;

/// Upload formats we know how to turn into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Text,
    Markdown,
    Csv,
    Json,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 5] = [
        DocumentFormat::Pdf,
        DocumentFormat::Text,
        DocumentFormat::Markdown,
        DocumentFormat::Csv,
        DocumentFormat::Json,
    ];

    /// Parse a dotted extension such as `.pdf` (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => ".pdf",
            DocumentFormat::Text => ".txt",
            DocumentFormat::Markdown => ".md",
            DocumentFormat::Csv => ".csv",
            DocumentFormat::Json => ".json",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, DocumentFormat::Pdf)
    }
}

/// Lowercased extension of a filename including the dot, or `""` if there is none
pub fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) => format!(".{}", filename[idx + 1..].to_lowercase()),
        None => String::new(),
    }
}

/// Which PDF strategy to try first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfBackend {
    /// pdf-extract, falling back to the heuristic scanner
    #[default]
    Precise,
    /// Heuristic scanner only
    Heuristic,
}

/// Format dispatcher with a fixed character cap
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    pub max_chars: usize,
    pub pdf_backend: PdfBackend,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            pdf_backend: PdfBackend::default(),
        }
    }
}

impl Extractor {
    pub fn new(max_chars: usize, pdf_backend: PdfBackend) -> Self {
        Self { max_chars, pdf_backend }
    }

    /// Produce at most `max_chars` characters of text for a document
    pub fn extract(&self, bytes: &[u8], filename: &str, format: DocumentFormat) -> String {
        if format.is_pdf() {
            return self.extract_pdf(bytes, filename);
        }
        // Text-like formats: decode, replacing invalid UTF-8
        truncate_owned(String::from_utf8_lossy(bytes).into_owned(), self.max_chars)
    }

    fn extract_pdf(&self, bytes: &[u8], filename: &str) -> String {
        if self.pdf_backend == PdfBackend::Precise {
            match pdf_extractor::extract_text_from_pdf(bytes) {
                Ok(text) => return truncate_owned(text, self.max_chars),
                Err(PreciseError::Unavailable) => {}
                Err(e) => {
                    log::debug!("[Extract] {}: precise backend failed ({}), using heuristic scanner", filename, e);
                }
            }
        }
        pdf_scanner::extract(bytes, filename, self.max_chars)
    }

    /// Notice stored when extraction could not finish (e.g. it timed out)
    pub fn fallback(&self, filename: &str, reason: &str) -> String {
        pdf_scanner::fallback_notice(filename, Some(reason), self.max_chars)
    }
}

/// Best-effort message from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Contract.PDF"), ".pdf");
        assert_eq!(extension_of("notes.v2.md"), ".md");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".env"), ".env");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension(".pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension(".JSON"), Some(DocumentFormat::Json));
        assert_eq!(DocumentFormat::from_extension(".docx"), None);
        assert_eq!(DocumentFormat::from_extension(""), None);
        assert!(DocumentFormat::Pdf.is_pdf());
        assert!(!DocumentFormat::Markdown.is_pdf());
    }

    #[test]
    fn test_text_decode_replaces_invalid_utf8() {
        let extractor = Extractor::default();
        let bytes = b"name,amount\nAcme,\xff\xfe100\n";
        let text = extractor.extract(bytes, "ledger.csv", DocumentFormat::Csv);
        assert!(text.starts_with("name,amount\nAcme,"));
        assert!(text.contains('\u{FFFD}'));
        assert!(text.ends_with("100\n"));
    }

    #[test]
    fn test_text_is_truncated_by_chars() {
        let extractor = Extractor::new(4, PdfBackend::Heuristic);
        let text = extractor.extract("héllo wörld".as_bytes(), "a.txt", DocumentFormat::Text);
        assert_eq!(text, "héll");
    }

    #[test]
    fn test_heuristic_backend_reads_text_blocks() {
        let extractor = Extractor::new(DEFAULT_MAX_CHARS, PdfBackend::Heuristic);
        let pdf = b"%PDF-1.4\nBT (Employees accrue twenty days of paid leave per year) Tj ET\n\
                    BT (Unused leave carries over for a maximum of five days) Tj ET\n%%EOF";
        let text = extractor.extract(pdf, "policy.pdf", DocumentFormat::Pdf);
        assert!(text.contains("twenty days of paid leave"));
    }

    #[test]
    fn test_precise_failure_falls_back_to_scanner() {
        let extractor = Extractor::new(DEFAULT_MAX_CHARS, PdfBackend::Precise);
        let text = extractor.extract(&[0u8; 64], "broken.pdf", DocumentFormat::Pdf);
        assert!(text.contains("broken.pdf"));
        assert!(text.contains("text extraction was limited"));
    }

    #[test]
    fn test_fallback_respects_cap() {
        let extractor = Extractor::new(10, PdfBackend::Heuristic);
        assert_eq!(extractor.fallback("x.pdf", "timed out").chars().count(), 10);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
