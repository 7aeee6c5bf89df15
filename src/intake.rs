//! Intake classification: an advisory routing hint per input file.
//!
//! The classifier looks at a file once, before any pipeline work, and says
//! which route it would likely take. It is only an explanation for the
//! user. The controller never consults it; its own per-page text-layer
//! probe decides the real route.
//!
//! PDFs are judged on their first page only: more than
//! [`DIGITAL_MIN_CHARS`] characters of trimmed text and at least one
//! embedded font means digital, anything else (including a PDF that cannot
//! be opened) means scanned.

use crate::error::PagemillError;
use crate::pipeline::text_layer::bind_pdfium;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// First-page text must be longer than this for a PDF to count as digital.
pub const DIGITAL_MIN_CHARS: usize = 100;

/// Extensions the classifier treats as images.
///
/// Wider than what the controller accepts: a TIFF is still worth telling
/// the user about, even though it has to be converted before a run.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "bmp"];

/// The route a file would most likely take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeRoute {
    /// Image file: OCR directly.
    Image,
    /// PDF with a usable text layer: fast text extraction.
    DigitalPdf,
    /// PDF without one: rasterize, then OCR.
    ScannedPdf,
    Unsupported,
}

impl IntakeRoute {
    /// One-line routing explanation for `file_name`.
    pub fn describe(&self, file_name: &str) -> String {
        match self {
            IntakeRoute::Image => format!("{file_name}: image, OCR directly"),
            IntakeRoute::DigitalPdf => format!("{file_name}: digital PDF, fast text extraction"),
            IntakeRoute::ScannedPdf => format!("{file_name}: scanned PDF, rasterize then OCR"),
            IntakeRoute::Unsupported => format!("{file_name}: unsupported file type"),
        }
    }
}

impl fmt::Display for IntakeRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntakeRoute::Image => "image",
            IntakeRoute::DigitalPdf => "digital-pdf",
            IntakeRoute::ScannedPdf => "scanned-pdf",
            IntakeRoute::Unsupported => "unsupported",
        })
    }
}

/// What the classifier needs to know about a PDF's first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageSample {
    /// Characters of trimmed page text.
    pub text_chars: usize,
    /// Distinct fonts used on the page.
    pub font_count: usize,
}

/// Samples the first page of a PDF.
pub trait PdfInspector {
    fn first_page(&self, pdf: &Path) -> Result<PageSample, PdfiumError>;
}

/// pdfium-backed inspector.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumInspector;

impl PdfInspector for PdfiumInspector {
    fn first_page(&self, pdf: &Path) -> Result<PageSample, PdfiumError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium.load_pdf_from_file(pdf, None)?;
        let page = document.pages().first()?;

        let text = page.text()?.all();
        let fonts: BTreeSet<String> = page
            .objects()
            .iter()
            .filter_map(|object| object.as_text_object().map(|t| t.font().name()))
            .collect();

        Ok(PageSample {
            text_chars: text.trim().chars().count(),
            font_count: fonts.len(),
        })
    }
}

/// Classify `path` with the default pdfium inspector.
pub fn classify(path: &Path) -> IntakeRoute {
    classify_with(path, &PdfiumInspector)
}

/// Classify `path`, sampling PDFs through `inspector`.
pub fn classify_with(path: &Path, inspector: &dyn PdfInspector) -> IntakeRoute {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return IntakeRoute::Image;
    }
    if ext != "pdf" {
        return IntakeRoute::Unsupported;
    }

    match inspector.first_page(path) {
        Ok(sample) if sample.text_chars > DIGITAL_MIN_CHARS && sample.font_count > 0 => {
            IntakeRoute::DigitalPdf
        }
        Ok(_) => IntakeRoute::ScannedPdf,
        Err(e) => {
            debug!("{}: cannot sample first page ({:?})", path.display(), e);
            IntakeRoute::ScannedPdf
        }
    }
}

/// Classify every regular file directly inside `dir`, ordered by file name.
pub fn classify_dir(dir: &Path) -> Result<Vec<(PathBuf, IntakeRoute)>, PagemillError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PagemillError::Workspace {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    Ok(files
        .into_iter()
        .map(|path| {
            let route = classify(&path);
            (path, route)
        })
        .collect())
}
