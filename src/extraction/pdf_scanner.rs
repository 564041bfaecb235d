//! Heuristic PDF text scanner
//!
//! Scrapes readable text out of raw PDF bytes without an object-model parser:
//! 1. Literal `( … )` and hex `< … >` strings inside `BT … ET` text blocks
//! 2. Printable ASCII runs inside `stream … endstream` payloads
//! 3. Whole-buffer printable runs, if 1+2 produced too little
//!
//! There is no xref, filter, or font decoding here. Compressed or image-only
//! PDFs end up as a fallback notice, which callers store like any other text.

use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use regex::bytes::Regex as BytesRegex;
use regex::Regex;

use super::panic_message;
use crate::utils::{latin1_to_string, truncate_owned};

/// Longest literal string taken from a text block
pub const MAX_LITERAL_CHARS: usize = 300;
/// Fragments must be longer than this after cleaning
pub const MIN_FRAGMENT_CHARS: usize = 2;
/// Shortest printable run kept from a stream payload
pub const MIN_STREAM_RUN: usize = 5;
/// Stream runs need at least this many consecutive letters
pub const MIN_STREAM_ALPHA: usize = 3;
/// Below this, text-block + stream output is replaced by the whole-buffer scan
pub const MIN_STRUCTURAL_CHARS: usize = 80;
/// Shortest printable run kept by the whole-buffer scan
pub const MIN_BUFFER_RUN: usize = 6;
/// Whole-buffer runs need at least this many consecutive letters
pub const MIN_BUFFER_ALPHA: usize = 4;
/// Runs starting with this many PDF delimiter chars are syntax, not content
pub const NOISE_PREFIX_LEN: usize = 3;
/// Below this, the extraction is reported as limited instead of returned
pub const MIN_RESULT_CHARS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("pattern compile failed: {0}")]
    Pattern(regex::Error),
    #[error("scanner panicked: {0}")]
    Panicked(String),
}

struct Patterns {
    text_block: BytesRegex,
    literal: BytesRegex,
    hex: BytesRegex,
    stream: BytesRegex,
    stream_run: BytesRegex,
    stream_alpha: BytesRegex,
    buffer_run: BytesRegex,
    buffer_alpha: BytesRegex,
    noise_prefix: BytesRegex,
    whitespace: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            text_block: BytesRegex::new(r"(?s-u)BT(.*?)ET")?,
            literal: BytesRegex::new(&format!(r"(?-u)\(([^)]{{1,{}}})\)", MAX_LITERAL_CHARS))?,
            hex: BytesRegex::new(r"(?-u)<([0-9a-fA-F]+)>")?,
            stream: BytesRegex::new(r"(?s-u)stream\r?\n(.*?)\r?\nendstream")?,
            stream_run: BytesRegex::new(&format!(r"(?-u)[\x20-\x7E]{{{},}}", MIN_STREAM_RUN))?,
            stream_alpha: BytesRegex::new(&format!(r"(?-u)[a-zA-Z]{{{},}}", MIN_STREAM_ALPHA))?,
            buffer_run: BytesRegex::new(&format!(r"(?-u)[\x20-\x7E]{{{},}}", MIN_BUFFER_RUN))?,
            buffer_alpha: BytesRegex::new(&format!(r"(?-u)[a-zA-Z]{{{},}}", MIN_BUFFER_ALPHA))?,
            noise_prefix: BytesRegex::new(&format!(r"(?-u)^[<>\[\]()\\/]{{{},}}", NOISE_PREFIX_LEN))?,
            whitespace: Regex::new(r"\s{3,}")?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

/// Extract readable text from raw PDF bytes, capped at `max_chars` characters.
///
/// Never fails: anything that goes wrong, including too little recovered
/// text, comes back as a fallback notice naming `filename`.
pub fn extract(bytes: &[u8], filename: &str, max_chars: usize) -> String {
    match panic::catch_unwind(AssertUnwindSafe(|| scan(bytes))) {
        Ok(Ok(Some(text))) => truncate_owned(text, max_chars),
        Ok(Ok(None)) => fallback_notice(filename, None, max_chars),
        Ok(Err(e)) => fallback_notice(filename, Some(&e.to_string()), max_chars),
        Err(payload) => {
            let e = ScanError::Panicked(panic_message(payload.as_ref()));
            fallback_notice(filename, Some(&e.to_string()), max_chars)
        }
    }
}

/// Bracketed placeholder stored in place of text we could not recover
pub fn fallback_notice(filename: &str, reason: Option<&str>, max_chars: usize) -> String {
    let note = match reason {
        Some(r) if !r.is_empty() => format!(" ({})", r),
        _ => String::new(),
    };
    let notice = format!(
        "[PDF: \"{}\" — browser-side text extraction was limited{}. \
         For best results, convert to .txt or .md before uploading.]",
        filename, note
    );
    truncate_owned(notice, max_chars)
}

/// Run all strategies. `Ok(None)` means the result was too short to trust.
fn scan(raw: &[u8]) -> Result<Option<String>, ScanError> {
    let p = PATTERNS.as_ref().map_err(|e| ScanError::Pattern(e.clone()))?;

    let mut fragments = Vec::new();
    text_block_fragments(p, raw, &mut fragments);
    stream_fragments(p, raw, &mut fragments);

    let mut text = fragments.join(" ");
    if text.trim().chars().count() < MIN_STRUCTURAL_CHARS {
        text = whole_buffer_text(p, raw);
    }

    let text = p.whitespace.replace_all(&text, " ").trim().to_string();
    if text.chars().count() < MIN_RESULT_CHARS {
        return Ok(None);
    }
    Ok(Some(text))
}

fn text_block_fragments(p: &Patterns, raw: &[u8], out: &mut Vec<String>) {
    for block in p.text_block.captures_iter(raw).filter_map(|c| c.get(1)) {
        let block = block.as_bytes();

        for lit in p.literal.captures_iter(block).filter_map(|c| c.get(1)) {
            if let Some(s) = literal_fragment(lit.as_bytes()) {
                out.push(s);
            }
        }

        for digits in p.hex.captures_iter(block).filter_map(|c| c.get(1)) {
            if let Some(s) = hex_fragment(digits.as_bytes()) {
                out.push(s);
            }
        }
    }
}

fn literal_fragment(bytes: &[u8]) -> Option<String> {
    let s = latin1_to_string(bytes)
        .replace("\\n", " ")
        .replace("\\r", " ")
        .replace("\\t", " ");
    let cleaned = s.trim();
    (cleaned.chars().count() > MIN_FRAGMENT_CHARS).then(|| cleaned.to_string())
}

/// Odd digit counts fail to decode and are dropped
fn hex_fragment(digits: &[u8]) -> Option<String> {
    let decoded = hex::decode(digits).ok()?;
    let printable: String = decoded
        .into_iter()
        .filter(|b| (0x20..0x7F).contains(b))
        .map(char::from)
        .collect();
    (printable.chars().count() > MIN_FRAGMENT_CHARS).then_some(printable)
}

fn stream_fragments(p: &Patterns, raw: &[u8], out: &mut Vec<String>) {
    for payload in p.stream.captures_iter(raw).filter_map(|c| c.get(1)) {
        for run in p.stream_run.find_iter(payload.as_bytes()) {
            if p.stream_alpha.is_match(run.as_bytes()) {
                out.push(latin1_to_string(run.as_bytes()));
            }
        }
    }
}

fn whole_buffer_text(p: &Patterns, raw: &[u8]) -> String {
    p.buffer_run
        .find_iter(raw)
        .map(|m| m.as_bytes())
        .filter(|run| p.buffer_alpha.is_match(run) && !p.noise_prefix.is_match(run))
        .map(latin1_to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
