//! Direct text-layer extraction, no OCR.
//!
//! Digital PDFs already carry their text. Reading it is faster and exact,
//! so a page with an acceptable text layer skips every OCR stage. The probe
//! is deliberately conservative: short snippets are usually running headers,
//! page numbers, or a stray watermark on an otherwise scanned page, and
//! accepting them would hide the real content from OCR. When in doubt the
//! probe answers "absent".

use super::input::InputKind;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Attempts direct text extraction for one page.
///
/// Never fails: unreadable documents, out-of-range pages, and text that
/// does not pass the acceptance policy are all `None`.
pub trait TextLayerProbe: Send + Sync {
    fn probe(&self, document: &Path, page_no: usize) -> Option<String>;
}

/// Acceptance policy: trimmed text with at least `min_chars` characters and
/// `min_words` whitespace-separated words.
pub fn accept_text_layer(raw: &str, min_chars: usize, min_words: usize) -> Option<String> {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() < min_chars || cleaned.split_whitespace().count() < min_words {
        return None;
    }
    Some(cleaned.to_string())
}

/// Bind pdfium from the working directory or the system library path.
pub(crate) fn bind_pdfium() -> Result<Pdfium, PdfiumError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())?;
    Ok(Pdfium::new(bindings))
}

/// pdfium-backed probe.
#[derive(Debug, Clone)]
pub struct PdfiumTextLayer {
    min_chars: usize,
    min_words: usize,
}

impl PdfiumTextLayer {
    pub fn new(min_chars: usize, min_words: usize) -> Self {
        Self {
            min_chars,
            min_words,
        }
    }

    fn raw_text(document: &Path, page_no: usize) -> Result<Option<String>, PdfiumError> {
        let pdfium = bind_pdfium()?;
        let doc = pdfium.load_pdf_from_file(document, None)?;
        let pages = doc.pages();
        if page_no >= pages.len() as usize {
            return Ok(None);
        }
        let page = pages.get(page_no as u16)?;
        let text = page.text()?.all();
        Ok(Some(text))
    }
}

impl TextLayerProbe for PdfiumTextLayer {
    fn probe(&self, document: &Path, page_no: usize) -> Option<String> {
        if InputKind::of(document) != Some(InputKind::Pdf) {
            return None;
        }
        match Self::raw_text(document, page_no) {
            Ok(Some(raw)) => {
                let accepted = accept_text_layer(&raw, self.min_chars, self.min_words);
                if accepted.is_none() {
                    debug!(
                        "Page {}: text layer too small ({} chars), leaving it to OCR",
                        page_no,
                        raw.trim().chars().count()
                    );
                }
                accepted
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Page {}: no text layer ({:?})", page_no, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{i:02}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn rejects_short_text() {
        assert_eq!(accept_text_layer("Page 3", 100, 15), None);
        assert_eq!(accept_text_layer("   \n\t ", 0, 0), None);
    }

    #[test]
    fn rejects_long_but_few_words() {
        let long_token = "x".repeat(200);
        assert_eq!(accept_text_layer(&long_token, 100, 15), None);
    }

    #[test]
    fn accepts_and_trims_body_text() {
        let body = format!("\n  {}  \n", words(20));
        let accepted = accept_text_layer(&body, 100, 15).unwrap();
        assert_eq!(accepted, words(20));
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 15 words of 6 code points each: 104 chars but 284 bytes.
        let hindi = vec!["नमस्ते"; 15].join(" ");
        assert!(hindi.len() > 200);
        assert!(accept_text_layer(&hindi, 200, 15).is_none());
        assert!(accept_text_layer(&hindi, 50, 15).is_some());
    }

    #[test]
    fn non_pdf_inputs_have_no_text_layer() {
        let probe = PdfiumTextLayer::new(100, 15);
        assert_eq!(probe.probe(Path::new("scan.png"), 0), None);
    }

    #[test]
    fn unreadable_pdf_has_no_text_layer() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("gone.pdf");
        // Fails on binding or on loading, depending on whether pdfium is installed.
        assert!(PdfiumTextLayer::raw_text(&missing, 0).is_err());
        assert_eq!(PdfiumTextLayer::new(100, 15).probe(&missing, 0), None);
    }
}
