//! Progress-callback trait for stage and page events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! run as it moves through its stages. The CLI uses this to drive its
//! progress bar; library callers can forward events anywhere they like.
//!
//! # Example
//!
//! ```rust
//! use pagemill::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl PipelineProgressCallback for FailureCounter {
//!     fn on_page_failed(&self, page_no: usize, error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_no} failed: {error}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(FailureCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::state::StageName;
use std::sync::Arc;

/// Called by the pipeline controller as it runs.
///
/// Implementations must be `Send + Sync`: per-page work inside a stage may
/// run on several blocking threads, although every callback below is
/// invoked from the controller task itself. All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once page extraction has settled the page count.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a stage's pass over the pages begins.
    ///
    /// `eligible` is the number of pages the stage will actually touch.
    fn on_stage_start(&self, stage: StageName, eligible: usize) {
        let _ = (stage, eligible);
    }

    /// Called after each page a stage processed, whatever the outcome.
    fn on_page_done(&self, stage: StageName, page_no: usize) {
        let _ = (stage, page_no);
    }

    /// Called when a page becomes terminally failed.
    ///
    /// `error` is the tagged cause, e.g. `ocr: engine crashed`.
    fn on_page_failed(&self, page_no: usize, error: &str) {
        let _ = (page_no, error);
    }

    /// Called once the stage's pass is joined.
    fn on_stage_complete(&self, stage: StageName) {
        let _ = stage;
    }

    /// Called once after the document reaches `done`.
    fn on_run_complete(&self, total_pages: usize, failed_pages: usize) {
        let _ = (total_pages, failed_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
