//! Document and page state.
//!
//! A [`DocumentState`] is created once per run and owns one [`PageState`]
//! per physical page. Each page carries a [`PageStage`], a tagged variant
//! recording how far the page got. Every stage outcome has its own variant,
//! so states such as "normalized text without assembly" or "OCR blocks on
//! a text-layer page" cannot be constructed.
//!
//! ```text
//! Pending ──▶ TextLayer ──────────────────────────────────────┐
//!    │                                                        ▼
//!    └──▶ Preprocessed ──▶ LayoutDetected ──▶ Recognized ──▶ Assembled ──▶ Normalized
//!              └─────────────────────────────────▲
//!
//! any non-failed variant ──▶ Failed { error, last }
//! ```
//!
//! `Failed` keeps the variant the page was in when it failed, so a failure
//! never erases what earlier stages produced and never adds to it.

use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ── Collaborator payloads ────────────────────────────────────────────────

/// A detected text region, in pixels of the preprocessed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// One recognized fragment (usually a line) with its confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub confidence: f32,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

// ── Page state ───────────────────────────────────────────────────────────

/// Everything the OCR route produced for a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrTrail {
    pub preprocessed: PathBuf,
    pub layout: Option<Vec<Region>>,
    pub blocks: Vec<TextBlock>,
}

/// Where normalized text came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum TextOrigin {
    TextLayer { text_layer: String },
    Ocr { trail: OcrTrail },
}

/// How far a page got through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PageStage {
    /// Rasterized, nothing else yet.
    Pending,
    /// Direct text recovered from the source; OCR stages never run.
    TextLayer { text: String },
    /// Denoised image available.
    Preprocessed { preprocessed: PathBuf },
    /// Text regions found on the preprocessed image.
    LayoutDetected {
        preprocessed: PathBuf,
        layout: Vec<Region>,
    },
    /// OCR ran; `trail.blocks` may be empty if nothing was recognized.
    Recognized { trail: OcrTrail },
    /// OCR fragments joined into page text.
    Assembled { trail: OcrTrail, text: String },
    /// Text replaced by its canonical form and scored.
    Normalized {
        origin: TextOrigin,
        text: String,
        confidence: f32,
    },
    /// Terminal failure; `last` is the stage the page was in when it failed.
    Failed {
        error: StageError,
        last: Box<PageStage>,
    },
}

/// Output of one stage for one page, applied by [`PageState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    TextLayer(String),
    Preprocessed(PathBuf),
    Layout(Vec<Region>),
    Blocks(Vec<TextBlock>),
    Text(String),
    Normalized { text: String, confidence: f32 },
}

/// The unit of work: one physical page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    /// Zero-based page index, stable for the document's lifetime.
    pub page_no: usize,
    /// Rasterized page image, produced once and reused.
    pub image_path: PathBuf,
    pub stage: PageStage,
}

impl PageState {
    pub fn new(page_no: usize, image_path: impl Into<PathBuf>) -> Self {
        Self {
            page_no,
            image_path: image_path.into(),
            stage: PageStage::Pending,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.stage, PageStage::Failed { .. })
    }

    /// Tagged failure cause, e.g. `preprocess: Failed to load image`.
    pub fn error(&self) -> Option<&StageError> {
        match &self.stage {
            PageStage::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The stage variant ignoring a failure wrapper.
    fn progress(&self) -> &PageStage {
        match &self.stage {
            PageStage::Failed { last, .. } => last,
            other => other,
        }
    }

    pub fn text_layer(&self) -> Option<&str> {
        match self.progress() {
            PageStage::TextLayer { text } => Some(text),
            PageStage::Normalized {
                origin: TextOrigin::TextLayer { text_layer },
                ..
            } => Some(text_layer),
            _ => None,
        }
    }

    pub fn preprocessed_path(&self) -> Option<&Path> {
        match self.progress() {
            PageStage::Preprocessed { preprocessed }
            | PageStage::LayoutDetected { preprocessed, .. } => Some(preprocessed),
            PageStage::Recognized { trail }
            | PageStage::Assembled { trail, .. }
            | PageStage::Normalized {
                origin: TextOrigin::Ocr { trail },
                ..
            } => Some(&trail.preprocessed),
            _ => None,
        }
    }

    pub fn layout(&self) -> Option<&[Region]> {
        match self.progress() {
            PageStage::LayoutDetected { layout, .. } => Some(layout),
            PageStage::Recognized { trail }
            | PageStage::Assembled { trail, .. }
            | PageStage::Normalized {
                origin: TextOrigin::Ocr { trail },
                ..
            } => trail.layout.as_deref(),
            _ => None,
        }
    }

    pub fn recognized_blocks(&self) -> Option<&[TextBlock]> {
        match self.progress() {
            PageStage::Recognized { trail }
            | PageStage::Assembled { trail, .. }
            | PageStage::Normalized {
                origin: TextOrigin::Ocr { trail },
                ..
            } => Some(&trail.blocks),
            _ => None,
        }
    }

    /// Current best text for the page.
    pub fn text(&self) -> Option<&str> {
        match self.progress() {
            PageStage::TextLayer { text }
            | PageStage::Assembled { text, .. }
            | PageStage::Normalized { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Score for [`Self::text`]: 1.0 for a direct text layer, normalizer-assigned otherwise.
    pub fn confidence(&self) -> Option<f32> {
        match self.progress() {
            PageStage::TextLayer { .. } => Some(1.0),
            PageStage::Normalized { confidence, .. } => Some(*confidence),
            _ => None,
        }
    }

    // ── Stage eligibility ────────────────────────────────────────────────

    pub fn needs_text_layer_probe(&self) -> bool {
        matches!(self.stage, PageStage::Pending)
    }

    pub fn needs_preprocess(&self) -> bool {
        matches!(self.stage, PageStage::Pending)
    }

    pub fn needs_layout(&self) -> bool {
        matches!(self.stage, PageStage::Preprocessed { .. })
    }

    pub fn needs_ocr(&self) -> bool {
        matches!(
            self.stage,
            PageStage::Preprocessed { .. } | PageStage::LayoutDetected { .. }
        )
    }

    pub fn needs_assembly(&self) -> bool {
        matches!(&self.stage, PageStage::Recognized { trail } if !trail.blocks.is_empty())
    }

    pub fn needs_normalization(&self) -> bool {
        match &self.stage {
            PageStage::TextLayer { text } | PageStage::Assembled { text, .. } => !text.is_empty(),
            _ => false,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Record a stage outcome.
    ///
    /// An `Err` moves the page to [`PageStage::Failed`] and leaves every
    /// other field as it was. Returns `false` (page unchanged) when the
    /// outcome does not follow from the current stage, including any
    /// outcome for a page that has already failed.
    pub fn apply(&mut self, outcome: Result<StageOutput, StageError>) -> bool {
        if self.failed() {
            return false;
        }
        let current = std::mem::replace(&mut self.stage, PageStage::Pending);
        let output = match outcome {
            Ok(output) => output,
            Err(error) => {
                self.stage = PageStage::Failed {
                    error,
                    last: Box::new(current),
                };
                return true;
            }
        };

        let (next, applied) = match (current, output) {
            (PageStage::Pending, StageOutput::TextLayer(text)) => {
                (PageStage::TextLayer { text }, true)
            }
            (PageStage::Pending, StageOutput::Preprocessed(preprocessed)) => {
                (PageStage::Preprocessed { preprocessed }, true)
            }
            (PageStage::Preprocessed { preprocessed }, StageOutput::Layout(layout)) => {
                (PageStage::LayoutDetected { preprocessed, layout }, true)
            }
            (PageStage::Preprocessed { preprocessed }, StageOutput::Blocks(blocks)) => (
                PageStage::Recognized {
                    trail: OcrTrail {
                        preprocessed,
                        layout: None,
                        blocks,
                    },
                },
                true,
            ),
            (PageStage::LayoutDetected { preprocessed, layout }, StageOutput::Blocks(blocks)) => (
                PageStage::Recognized {
                    trail: OcrTrail {
                        preprocessed,
                        layout: Some(layout),
                        blocks,
                    },
                },
                true,
            ),
            (PageStage::Recognized { trail }, StageOutput::Text(text)) if !trail.blocks.is_empty() => {
                (PageStage::Assembled { trail, text }, true)
            }
            (PageStage::TextLayer { text: text_layer }, StageOutput::Normalized { text, confidence }) => (
                PageStage::Normalized {
                    origin: TextOrigin::TextLayer { text_layer },
                    text,
                    confidence: confidence.clamp(0.0, 1.0),
                },
                true,
            ),
            (PageStage::Assembled { trail, .. }, StageOutput::Normalized { text, confidence }) => (
                PageStage::Normalized {
                    origin: TextOrigin::Ocr { trail },
                    text,
                    confidence: confidence.clamp(0.0, 1.0),
                },
                true,
            ),
            (current, _) => (current, false),
        };
        self.stage = next;
        applied
    }
}

// ── Document state ───────────────────────────────────────────────────────

/// Document lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Init,
    InProgress,
    Done,
}

/// Aggregate state for one document run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    /// Content identity: truncated SHA-256 of the input bytes.
    pub id: String,
    /// The original input; never modified.
    pub input_path: PathBuf,
    /// Scratch directory keyed by `id`.
    pub work_dir: PathBuf,
    /// Pages keyed by zero-based index; iteration order is page order.
    pub pages: BTreeMap<usize, PageState>,
    status: DocumentStatus,
}

impl DocumentState {
    pub fn new(id: impl Into<String>, input_path: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            id: id.into(),
            input_path,
            work_dir,
            pages: BTreeMap::new(),
            status: DocumentStatus::Init,
        }
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// Advance the status; a request to move backwards is ignored.
    pub(crate) fn advance_status(&mut self, next: DocumentStatus) {
        if next > self.status {
            self.status = next;
        }
    }

    pub fn page(&self, page_no: usize) -> Option<&PageState> {
        self.pages.get(&page_no)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.values().filter(|p| p.failed()).count()
    }

    /// Pages that ended with non-empty text and no failure.
    pub fn succeeded_pages(&self) -> usize {
        self.pages
            .values()
            .filter(|p| !p.failed() && p.text().is_some_and(|t| !t.is_empty()))
            .count()
    }

    /// Join page texts in page order, skipping pages without text.
    pub fn text(&self, separator: &crate::config::PageSeparator) -> String {
        let mut out = String::new();
        let texts = self
            .pages
            .values()
            .filter(|p| !p.failed())
            .filter_map(|p| p.text().filter(|t| !t.is_empty()).map(|t| (p.page_no, t)));
        for (i, (page_no, text)) in texts.enumerate() {
            if i > 0 {
                out.push_str(&separator.render(page_no));
            }
            out.push_str(text);
        }
        out
    }
}

/// Every per-page pass the controller makes, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    TextLayer,
    Preprocess,
    Layout,
    Ocr,
    Assemble,
    Normalize,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageName::TextLayer => "text layer",
            StageName::Preprocess => "preprocess",
            StageName::Layout => "layout",
            StageName::Ocr => "ocr",
            StageName::Assemble => "assemble",
            StageName::Normalize => "normalize",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSeparator;
    use crate::error::Stage;

    fn blocks() -> Vec<TextBlock> {
        vec![TextBlock::new("hello", 0.9), TextBlock::new("world", 0.8)]
    }

    #[test]
    fn ocr_route_walks_every_stage() {
        let mut page = PageState::new(0, "pages/page-1.png");
        assert!(page.needs_preprocess());
        assert!(page.apply(Ok(StageOutput::Preprocessed("pre/page-1.png".into()))));
        assert!(page.needs_layout() && page.needs_ocr());
        assert!(page.apply(Ok(StageOutput::Layout(vec![Region {
            left: 0,
            top: 0,
            width: 10,
            height: 10,
        }]))));
        assert!(page.apply(Ok(StageOutput::Blocks(blocks()))));
        assert!(page.needs_assembly());
        assert!(page.apply(Ok(StageOutput::Text("hello\nworld".into()))));
        assert_eq!(page.confidence(), None);
        assert!(page.apply(Ok(StageOutput::Normalized {
            text: "hello\nworld".into(),
            confidence: 1.0,
        })));

        assert_eq!(page.text(), Some("hello\nworld"));
        assert_eq!(page.confidence(), Some(1.0));
        assert_eq!(page.layout().map(|l| l.len()), Some(1));
        assert_eq!(page.recognized_blocks().map(|b| b.len()), Some(2));
        assert_eq!(
            page.preprocessed_path(),
            Some(Path::new("pre/page-1.png"))
        );
        assert!(page.text_layer().is_none());
    }

    #[test]
    fn text_layer_page_is_never_eligible_for_ocr() {
        let mut page = PageState::new(0, "p.png");
        assert!(page.apply(Ok(StageOutput::TextLayer("direct".into()))));
        assert!(!page.needs_preprocess());
        assert!(!page.needs_layout());
        assert!(!page.needs_ocr());
        assert!(!page.needs_assembly());
        assert!(page.needs_normalization());
        assert_eq!(page.confidence(), Some(1.0));

        // OCR output cannot attach to a text-layer page.
        assert!(!page.apply(Ok(StageOutput::Blocks(blocks()))));
        assert_eq!(page.text_layer(), Some("direct"));
    }

    #[test]
    fn failure_freezes_fields() {
        let mut page = PageState::new(1, "p.png");
        page.apply(Ok(StageOutput::Preprocessed("pre.png".into())));
        page.apply(Ok(StageOutput::Blocks(blocks())));
        let before_blocks = page.recognized_blocks().map(|b| b.to_vec());

        assert!(page.apply(Err(StageError::new(Stage::Assemble, "boom"))));
        assert!(page.failed());
        assert_eq!(page.error().map(|e| e.to_string()).as_deref(), Some("text: boom"));
        assert_eq!(page.recognized_blocks().map(|b| b.to_vec()), before_blocks);
        assert_eq!(page.text(), None);

        // Nothing applies after a failure, not even another failure.
        assert!(!page.apply(Ok(StageOutput::Text("late".into()))));
        assert!(!page.apply(Err(StageError::new(Stage::Normalize, "again"))));
        assert_eq!(page.error().map(|e| e.stage), Some(Stage::Assemble));
    }

    #[test]
    fn empty_recognition_skips_assembly() {
        let mut page = PageState::new(0, "p.png");
        page.apply(Ok(StageOutput::Preprocessed("pre.png".into())));
        page.apply(Ok(StageOutput::Blocks(Vec::new())));
        assert!(!page.needs_assembly());
        assert!(!page.needs_normalization());
        assert!(!page.apply(Ok(StageOutput::Text(String::new()))));
    }

    #[test]
    fn status_never_moves_backwards() {
        let mut doc = DocumentState::new("abc", "in.pdf".into(), "work/abc".into());
        assert_eq!(doc.status(), DocumentStatus::Init);
        doc.advance_status(DocumentStatus::Done);
        doc.advance_status(DocumentStatus::InProgress);
        assert_eq!(doc.status(), DocumentStatus::Done);
    }

    #[test]
    fn document_text_joins_in_page_order() {
        let mut doc = DocumentState::new("abc", "in.pdf".into(), "work/abc".into());
        for n in [2usize, 0, 1] {
            let mut page = PageState::new(n, format!("page-{}.png", n + 1));
            if n != 1 {
                page.apply(Ok(StageOutput::TextLayer(format!("text {n}"))));
            }
            doc.pages.insert(n, page);
        }
        assert_eq!(doc.text(&PageSeparator::BlankLine), "text 0\n\ntext 2");
        assert_eq!(
            doc.text(&PageSeparator::Marker),
            "text 0\n\n--- page 3 ---\n\ntext 2"
        );
        assert_eq!(doc.text(&PageSeparator::Newline), "text 0\ntext 2");
        assert_eq!(doc.succeeded_pages(), 2);
        assert_eq!(doc.failed_pages(), 0);
    }

    #[test]
    fn state_serialises_with_stage_tags() {
        let mut page = PageState::new(0, "p.png");
        page.apply(Err(StageError::new(Stage::Preprocess, "unreadable")));
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["stage"]["stage"], "failed");
        assert_eq!(json["stage"]["error"]["stage"], "preprocess");
        assert_eq!(json["stage"]["last"]["stage"], "pending");
    }
}
