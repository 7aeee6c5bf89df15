//! Configuration types for the extraction pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Collaborator implementations (OCR engine,
//! rasterizer, …) are not part of the config; they live in
//! [`crate::engines::Engines`] so the config stays plain data that can be
//! logged and serialised.

use crate::error::PagemillError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use pagemill::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .languages(["en"])
///     .use_layout(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root under which each document gets `<root>/<content-id>/`. Default: `data/temp`.
    pub work_root: PathBuf,

    /// Rasterization resolution. Range: 72–600. Default: 300.
    ///
    /// OCR accuracy drops sharply below ~200 DPI on body text; above 400
    /// the page images get large without helping recognition.
    pub dpi: u32,

    /// Hard ceiling on the number of pages a document may produce. Default: 2000.
    pub max_pages: usize,

    /// OCR languages, in priority order. Default: `["hi", "en"]`.
    ///
    /// Order is passed through to the OCR engine; some models weight the
    /// first language more heavily.
    pub languages: Vec<String>,

    /// Whether GPU use is permitted. Actual availability is still probed. Default: true.
    pub allow_gpu: bool,

    /// Run the layout-detection stage. Default: true.
    pub use_layout: bool,

    /// Run the normalization stage. Default: true.
    pub use_postprocess: bool,

    /// Timeout for the external rasterizer, in seconds. Default: 120.
    pub rasterize_timeout_secs: u64,

    /// Minimum trimmed character count for a text layer to be accepted. Default: 100.
    pub min_text_chars: usize,

    /// Minimum whitespace-separated word count for a text layer. Default: 15.
    pub min_text_words: usize,

    /// Pages processed in parallel within a stage. Default: 4.
    ///
    /// Stages are still joined before the next one begins; this only
    /// affects wall-clock time, never results.
    pub concurrency: usize,

    /// Optional progress events sink.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_root: PathBuf::from("data").join("temp"),
            dpi: 300,
            max_pages: 2000,
            languages: vec!["hi".to_string(), "en".to_string()],
            allow_gpu: true,
            use_layout: true,
            use_postprocess: true,
            rasterize_timeout_secs: 120,
            min_text_chars: 100,
            min_text_words: 15,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("work_root", &self.work_root)
            .field("dpi", &self.dpi)
            .field("max_pages", &self.max_pages)
            .field("languages", &self.languages)
            .field("allow_gpu", &self.allow_gpu)
            .field("use_layout", &self.use_layout)
            .field("use_postprocess", &self.use_postprocess)
            .field("rasterize_timeout_secs", &self.rasterize_timeout_secs)
            .field("min_text_chars", &self.min_text_chars)
            .field("min_text_words", &self.min_text_words)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.work_root = root.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.languages = langs.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_gpu(mut self, v: bool) -> Self {
        self.config.allow_gpu = v;
        self
    }

    pub fn use_layout(mut self, v: bool) -> Self {
        self.config.use_layout = v;
        self
    }

    pub fn use_postprocess(mut self, v: bool) -> Self {
        self.config.use_postprocess = v;
        self
    }

    pub fn rasterize_timeout_secs(mut self, secs: u64) -> Self {
        self.config.rasterize_timeout_secs = secs;
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn min_text_words(mut self, n: usize) -> Self {
        self.config.min_text_words = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PagemillError> {
        let c = &self.config;
        if c.work_root.as_os_str().is_empty() {
            return Err(PagemillError::InvalidConfig(
                "work_root must not be empty".into(),
            ));
        }
        if c.max_pages == 0 {
            return Err(PagemillError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.languages.is_empty() || c.languages.iter().any(|l| l.trim().is_empty()) {
            return Err(PagemillError::InvalidConfig(
                "at least one non-empty OCR language is required".into(),
            ));
        }
        if c.rasterize_timeout_secs == 0 {
            return Err(PagemillError::InvalidConfig(
                "rasterize timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate pages when joining a document's text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Blank line between pages. (default)
    #[default]
    BlankLine,
    /// No separator: the next page starts on the following line.
    Newline,
    /// ASCII form feed, the traditional page break in plain text.
    FormFeed,
    /// Marker line with the 1-indexed page number: `--- page N ---`.
    Marker,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the page with 0-based index `page_no`.
    pub fn render(&self, page_no: usize) -> String {
        match self {
            PageSeparator::BlankLine => "\n\n".to_string(),
            PageSeparator::Newline => "\n".to_string(),
            PageSeparator::FormFeed => "\n\x0c\n".to_string(),
            PageSeparator::Marker => format!("\n\n--- page {} ---\n\n", page_no + 1),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }

    /// Parse a CLI value: `blank`, `none`, `ff`, `marker`, or any custom string.
    pub fn parse(s: &str) -> Self {
        match s {
            "blank" => PageSeparator::BlankLine,
            "none" | "newline" => PageSeparator::Newline,
            "ff" | "formfeed" => PageSeparator::FormFeed,
            "marker" => PageSeparator::Marker,
            other => PageSeparator::Custom(other.to_string()),
        }
    }
}
