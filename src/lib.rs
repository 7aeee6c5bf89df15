//! # pagemill
//!
//! Restartable text extraction for PDFs and scanned images.
//!
//! Each page takes the cheapest route that works: if the source already
//! carries a usable text layer the page is read directly, otherwise it is
//! rasterized, denoised, segmented, and OCR'd. One bad page never aborts
//! the document, and a run interrupted halfway picks up from the artifacts
//! it left on disk.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (pdf/png/jpg)
//!  │
//!  ├─ 1. Resolve     SHA-256 identity → work dir <root>/<id>/
//!  ├─ 2. Extract     pdftoppm → pages/page-<n>.png (reused if present)
//!  ├─ 3. Text layer  pdfium; a hit skips steps 4–6 for that page
//!  ├─ 4. Preprocess  median denoise → preprocessed/ (reused if present)
//!  ├─ 5. Layout      optional region detection
//!  ├─ 6. OCR         tesseract, per region or whole page
//!  ├─ 7. Assemble    fragments → page text
//!  └─ 8. Normalize   optional NFKC + cleanup + confidence
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagemill::{PageSeparator, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().languages(["hi", "en"]).build()?;
//!     let doc = Pipeline::with_default_engines(config).run("scan.pdf").await?;
//!     for page in doc.pages.values() {
//!         if let Some(err) = page.error() {
//!             eprintln!("page {}: {}", page.page_no, err);
//!         }
//!     }
//!     println!("{}", doc.text(&PageSeparator::default()));
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! The default collaborators shell out to `pdftoppm` (poppler-utils) and
//! `tesseract`, and bind a pdfium shared library for text layers. Any of
//! them can be replaced through [`Engines`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagemill` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod engines;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod progress;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSeparator, PipelineConfig, PipelineConfigBuilder};
pub use controller::{write_text, Pipeline};
pub use engines::{ComputeDevice, Engines};
pub use error::{CollaboratorError, PagemillError, Stage, StageError};
pub use intake::{classify, classify_dir, classify_with, IntakeRoute, PdfInspector};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use state::{
    DocumentState, DocumentStatus, PageStage, PageState, Region, StageName, StageOutput,
    TextBlock, TextOrigin,
};
