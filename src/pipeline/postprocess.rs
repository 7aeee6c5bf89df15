//! Post-processing: canonicalise page text and score it.
//!
//! Text layers and OCR output disagree on representation even when they
//! agree on content: ligatures (`ﬁ`), full-width digits, compatibility
//! forms, CRLF line endings, zero-width joiners copied out of PDFs. This
//! module brings every page to one canonical form so downstream search and
//! diffing see the same bytes for the same text.
//!
//! ## Rule Order
//!
//! NFKC runs first because it can itself produce characters the later
//! rules look at: compatibility spaces (U+3000, U+00A0) become U+0020 and
//! are then trimmed.

use crate::error::CollaboratorError;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Canonical text plus a confidence score in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub text: String,
    pub confidence: f32,
}

/// Normalizes assembled or direct text.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> Result<Normalized, CollaboratorError>;
}

/// NFKC plus whitespace and invisible-character cleanup.
///
/// Confidence is 1.0 when anything but whitespace survives, else 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeNormalizer;

impl TextNormalizer for UnicodeNormalizer {
    fn normalize(&self, text: &str) -> Result<Normalized, CollaboratorError> {
        let text = clean_text(text);
        let confidence = if text.trim().is_empty() { 0.0 } else { 1.0 };
        Ok(Normalized { text, confidence })
    }
}

/// Apply all rules in order:
/// 1. Unicode NFKC
/// 2. Normalise line endings (CRLF/CR → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
pub fn clean_text(input: &str) -> String {
    let s: String = input.nfkc().collect();
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    collapse_blank_lines(&s)
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip invisible characters ───────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'))
        .collect()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}
