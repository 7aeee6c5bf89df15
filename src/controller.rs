//! The pipeline controller: fixed stage order over one document.
//!
//! ## Stage order
//!
//! ```text
//! resolve ─▶ extract ─▶ text layer ─▶ preprocess ─▶ [layout] ─▶ ocr ─▶ assemble ─▶ [normalize] ─▶ done
//! ```
//!
//! Each stage is a full pass over the pages before the next one starts.
//! Within a pass, per-page work runs on the blocking pool with at most
//! `config.concurrency` pages in flight; outcomes are applied to the
//! [`DocumentState`] in page order once the pass is joined, so a parallel
//! pass ends in exactly the state a sequential one would.
//!
//! ## Failure isolation
//!
//! Only resolution and page extraction can fail the run. From the text
//! layer probe onwards every collaborator error, and every panic inside a
//! per-page task, becomes a [`StageError`] on that one page.
//!
//! ## Resume
//!
//! Nothing is kept in memory between runs. `pages/` and `preprocessed/`
//! under the work dir are consulted on every run and reused when their
//! files are usable, so rerunning after a crash only redoes what is missing.
//! `pages/` is trusted only after a rasterization that passed the page
//! ceiling marked it complete; anything else there is cleared and redone.

use crate::config::{PageSeparator, PipelineConfig};
use crate::engines::Engines;
use crate::error::{CollaboratorError, PagemillError, Stage, StageError};
use crate::pipeline::input::{self, InputKind};
use crate::pipeline::render::{self, RasterRequest};
use crate::pipeline::{is_usable_artifact, write_atomically, PAGES_DIR, PREPROCESSED_DIR};
use crate::progress::ProgressCallback;
use crate::state::{DocumentState, DocumentStatus, PageState, StageName, StageOutput};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

type Job<T> = Box<dyn FnOnce() -> T + Send + 'static>;
type StageJob = Job<Result<StageOutput, CollaboratorError>>;

/// Runs documents through the stage sequence with one set of collaborators.
///
/// # Example
/// ```rust,no_run
/// use pagemill::{Engines, Pipeline, PipelineConfig, PageSeparator};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder().languages(["en"]).build()?;
/// let pipeline = Pipeline::new(config.clone(), Engines::detect(&config));
/// let doc = pipeline.run("scan.pdf").await?;
/// println!("{}", doc.text(&PageSeparator::default()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    engines: Engines,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, engines: Engines) -> Self {
        Self { config, engines }
    }

    /// A pipeline with the default collaborators for `config`.
    pub fn with_default_engines(config: PipelineConfig) -> Self {
        let engines = Engines::detect(&config);
        Self::new(config, engines)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    /// Run every stage over `input` and return the final document state.
    ///
    /// `Ok` means the document reached `done`; individual pages may still
    /// have failed (see [`DocumentState::failed_pages`]).
    ///
    /// # Errors
    /// Only fatal conditions: a missing, unreadable, or unsupported input,
    /// an unusable work dir, or page extraction failing, producing no
    /// pages, or exceeding `max_pages`.
    pub async fn run(&self, input: impl AsRef<Path>) -> Result<DocumentState, PagemillError> {
        let started = Instant::now();
        let input = input.as_ref();
        info!("Starting run: {}", input.display());

        let resolved = input::resolve_input(input, &self.config.work_root)?;
        let mut doc = DocumentState::new(
            resolved.id.clone(),
            resolved.path.clone(),
            resolved.work_dir.clone(),
        );

        self.extract_pages(&mut doc, resolved.kind).await?;
        doc.advance_status(DocumentStatus::InProgress);
        if let Some(cb) = self.progress() {
            cb.on_run_start(doc.page_count());
        }

        self.probe_text_layers(&mut doc).await;
        self.preprocess(&mut doc).await?;
        if self.config.use_layout {
            self.detect_layout(&mut doc).await;
        }
        self.recognize(&mut doc).await;
        self.assemble(&mut doc).await;
        if self.config.use_postprocess {
            self.normalize(&mut doc).await;
        }

        doc.advance_status(DocumentStatus::Done);
        info!(
            "Run complete: {} pages, {} failed, {}ms",
            doc.page_count(),
            doc.failed_pages(),
            started.elapsed().as_millis()
        );
        if let Some(cb) = self.progress() {
            cb.on_run_complete(doc.page_count(), doc.failed_pages());
        }
        Ok(doc)
    }

    /// Run, then write the joined page text to `output` atomically.
    pub async fn run_to_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        separator: &PageSeparator,
    ) -> Result<DocumentState, PagemillError> {
        let doc = self.run(input).await?;
        write_text(output.as_ref(), &doc.text(separator)).await?;
        Ok(doc)
    }

    /// Synchronous wrapper around [`Self::run`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from
    /// inside an async context.
    pub fn run_sync(&self, input: impl AsRef<Path>) -> Result<DocumentState, PagemillError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| PagemillError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.run(input))
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.config.progress_callback.as_ref()
    }

    // ── Stage 1: page extraction ─────────────────────────────────────────

    async fn extract_pages(
        &self,
        doc: &mut DocumentState,
        kind: InputKind,
    ) -> Result<(), PagemillError> {
        let started = Instant::now();
        let pages_dir = doc.work_dir.join(PAGES_DIR);

        let (pages, fresh) = match render::existing_pages(&pages_dir)? {
            Some(pages) => {
                debug!("Reusing {} page images in {}", pages.len(), pages_dir.display());
                (pages, false)
            }
            None => {
                render::clear_pages(&pages_dir)?;
                let request = RasterRequest {
                    input: &doc.input_path,
                    kind,
                    out_dir: &pages_dir,
                    dpi: self.config.dpi,
                    max_pages: self.config.max_pages,
                    timeout: Duration::from_secs(self.config.rasterize_timeout_secs),
                };
                (self.engines.rasterizer.rasterize(request).await?, true)
            }
        };
        render::check_page_count(pages.len(), self.config.max_pages)?;
        if fresh {
            render::mark_complete(&pages_dir, pages.len())?;
        }

        for (page_no, image_path) in pages.into_iter().enumerate() {
            doc.pages
                .entry(page_no)
                .or_insert_with(|| PageState::new(page_no, image_path));
        }
        info!(
            "Extracted {} pages in {}ms",
            doc.page_count(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    // ── Stage 2: text layer ──────────────────────────────────────────────

    async fn probe_text_layers(&self, doc: &mut DocumentState) {
        let name = StageName::TextLayer;
        let started = Instant::now();

        let jobs: Vec<(usize, Job<Option<String>>)> = doc
            .pages
            .values()
            .filter(|p| p.needs_text_layer_probe())
            .map(|page| {
                let probe = Arc::clone(&self.engines.text_layer);
                let document = doc.input_path.clone();
                let page_no = page.page_no;
                let job: Job<Option<String>> = Box::new(move || probe.probe(&document, page_no));
                (page_no, job)
            })
            .collect();
        self.stage_started(name, jobs.len());

        let mut found = 0;
        for (page_no, joined) in self.run_jobs(jobs).await {
            match joined {
                Ok(Some(text)) => {
                    found += 1;
                    self.record(doc, name, page_no, Ok(StageOutput::TextLayer(text)));
                }
                Ok(None) => self.page_done(name, page_no),
                Err(e) => {
                    debug!("Page {}: text layer probe {}, using OCR", page_no, panic_cause(e));
                    self.page_done(name, page_no);
                }
            }
        }
        info!(
            "Text layer found on {}/{} pages in {}ms",
            found,
            doc.page_count(),
            started.elapsed().as_millis()
        );
        self.stage_finished(name);
    }

    // ── Stage 3: preprocessing ───────────────────────────────────────────

    async fn preprocess(&self, doc: &mut DocumentState) -> Result<(), PagemillError> {
        let out_dir = doc.work_dir.join(PREPROCESSED_DIR);
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| PagemillError::Workspace {
                path: out_dir.clone(),
                source: e,
            })?;

        self.run_stage(
            doc,
            StageName::Preprocess,
            Stage::Preprocess,
            PageState::needs_preprocess,
            |page| {
                let dest = preprocessed_path_for(&out_dir, &page.image_path)?;
                let source = page.image_path.clone();
                let preprocessor = Arc::clone(&self.engines.preprocessor);
                let page_no = page.page_no;
                let job: StageJob = Box::new(move || {
                    if is_usable_artifact(&dest) {
                        debug!("Page {}: reusing {}", page_no, dest.display());
                        return Ok(StageOutput::Preprocessed(dest));
                    }
                    preprocessor
                        .preprocess(&source, &dest)
                        .map(StageOutput::Preprocessed)
                });
                Some(job)
            },
        )
        .await;
        Ok(())
    }

    // ── Stage 4: layout ──────────────────────────────────────────────────

    async fn detect_layout(&self, doc: &mut DocumentState) {
        self.run_stage(
            doc,
            StageName::Layout,
            Stage::Layout,
            PageState::needs_layout,
            |page| {
                let image = page.preprocessed_path()?.to_path_buf();
                let detector = Arc::clone(&self.engines.layout);
                let job: StageJob = Box::new(move || detector.detect(&image).map(StageOutput::Layout));
                Some(job)
            },
        )
        .await;
    }

    // ── Stage 5: OCR ─────────────────────────────────────────────────────

    async fn recognize(&self, doc: &mut DocumentState) {
        self.run_stage(doc, StageName::Ocr, Stage::Ocr, PageState::needs_ocr, |page| {
            let image = page.preprocessed_path()?.to_path_buf();
            let regions = page.layout().map(<[_]>::to_vec);
            let engine = Arc::clone(&self.engines.ocr);
            let job: StageJob = Box::new(move || {
                engine
                    .recognize(&image, regions.as_deref())
                    .map(StageOutput::Blocks)
            });
            Some(job)
        })
        .await;
    }

    // ── Stage 6: assembly ────────────────────────────────────────────────

    async fn assemble(&self, doc: &mut DocumentState) {
        self.run_stage(
            doc,
            StageName::Assemble,
            Stage::Assemble,
            PageState::needs_assembly,
            |page| {
                let blocks = page.recognized_blocks()?.to_vec();
                let assembler = Arc::clone(&self.engines.assembler);
                let job: StageJob = Box::new(move || assembler.assemble(&blocks).map(StageOutput::Text));
                Some(job)
            },
        )
        .await;
    }

    // ── Stage 7: normalization ───────────────────────────────────────────

    async fn normalize(&self, doc: &mut DocumentState) {
        self.run_stage(
            doc,
            StageName::Normalize,
            Stage::Normalize,
            PageState::needs_normalization,
            |page| {
                let text = page.text()?.to_string();
                let normalizer = Arc::clone(&self.engines.normalizer);
                let job: StageJob = Box::new(move || {
                    normalizer.normalize(&text).map(|n| StageOutput::Normalized {
                        text: n.text,
                        confidence: n.confidence,
                    })
                });
                Some(job)
            },
        )
        .await;
    }

    // ── Pass machinery ───────────────────────────────────────────────────

    /// One full pass of a failing stage over the eligible pages.
    async fn run_stage<F>(
        &self,
        doc: &mut DocumentState,
        name: StageName,
        stage: Stage,
        eligible: fn(&PageState) -> bool,
        make_job: F,
    ) where
        F: Fn(&PageState) -> Option<StageJob>,
    {
        let started = Instant::now();
        let jobs: Vec<(usize, StageJob)> = doc
            .pages
            .values()
            .filter(|p| eligible(p))
            .filter_map(|p| make_job(p).map(|job| (p.page_no, job)))
            .collect();
        let attempted = jobs.len();
        self.stage_started(name, attempted);

        let failed_before = doc.failed_pages();
        for (page_no, joined) in self.run_jobs(jobs).await {
            let outcome = match joined {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(StageError::new(stage, e.to_string())),
                Err(e) => Err(StageError::new(stage, panic_cause(e))),
            };
            self.record(doc, name, page_no, outcome);
        }

        info!(
            "Stage {}: {} pages, {} failed, {}ms",
            name,
            attempted,
            doc.failed_pages() - failed_before,
            started.elapsed().as_millis()
        );
        self.stage_finished(name);
    }

    /// Run per-page jobs on the blocking pool; results come back in page order.
    async fn run_jobs<T: Send + 'static>(
        &self,
        jobs: Vec<(usize, Job<T>)>,
    ) -> Vec<(usize, Result<T, JoinError>)> {
        let mut results: Vec<_> = stream::iter(jobs.into_iter().map(|(page_no, job)| async move {
            (page_no, tokio::task::spawn_blocking(job).await)
        }))
        .buffer_unordered(self.config.concurrency.max(1))
        .collect()
        .await;
        results.sort_by_key(|(page_no, _)| *page_no);
        results
    }

    fn record(
        &self,
        doc: &mut DocumentState,
        name: StageName,
        page_no: usize,
        outcome: Result<StageOutput, StageError>,
    ) {
        let Some(page) = doc.pages.get_mut(&page_no) else {
            return;
        };
        let failure = outcome.as_ref().err().map(ToString::to_string);
        if !page.apply(outcome) {
            debug!("Page {}: {} outcome does not apply, ignored", page_no, name);
        } else if let Some(cause) = failure {
            warn!("Page {} failed: {}", page_no, cause);
            if let Some(cb) = self.progress() {
                cb.on_page_failed(page_no, &cause);
            }
        }
        self.page_done(name, page_no);
    }

    fn stage_started(&self, name: StageName, eligible: usize) {
        debug!("Stage {}: {} eligible pages", name, eligible);
        if let Some(cb) = self.progress() {
            cb.on_stage_start(name, eligible);
        }
    }

    fn page_done(&self, name: StageName, page_no: usize) {
        if let Some(cb) = self.progress() {
            cb.on_page_done(name, page_no);
        }
    }

    fn stage_finished(&self, name: StageName) {
        if let Some(cb) = self.progress() {
            cb.on_stage_complete(name);
        }
    }
}

/// `preprocessed/<file name of the page image>`.
fn preprocessed_path_for(out_dir: &Path, image: &Path) -> Option<PathBuf> {
    image.file_name().map(|name| out_dir.join(name))
}

/// Describe a failed blocking task, recovering the panic message if any.
fn panic_cause(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map(|msg| format!("panicked: {msg}"))
        .unwrap_or_else(|| "panicked".to_string())
}

/// Write extracted text to `path` via temp file + rename.
pub async fn write_text(path: &Path, text: &str) -> Result<(), PagemillError> {
    let dest = path.to_path_buf();
    let text = text.to_string();
    let result = tokio::task::spawn_blocking(move || {
        write_atomically(&dest, |file| {
            file.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                file.write_all(b"\n")?;
            }
            Ok(())
        })
    })
    .await
    .map_err(|e| PagemillError::Internal(format!("Output write task failed: {e}")))?;

    result.map_err(|e| PagemillError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn panic_message_is_recovered() {
        let err = tokio::task::spawn_blocking(|| panic!("detector exploded"))
            .await
            .unwrap_err();
        assert_eq!(panic_cause(err), "panicked: detector exploded");

        let err = tokio::task::spawn_blocking(|| panic!("page {}", 3))
            .await
            .unwrap_err();
        assert_eq!(panic_cause(err), "panicked: page 3");
    }

    #[test]
    fn preprocessed_name_follows_page_image() {
        assert_eq!(
            preprocessed_path_for(Path::new("/w/preprocessed"), Path::new("/w/pages/page-2.png")),
            Some(PathBuf::from("/w/preprocessed/page-2.png"))
        );
        assert_eq!(preprocessed_path_for(Path::new("/w"), Path::new("/")), None);
    }

    #[tokio::test]
    async fn output_text_ends_with_newline() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out.txt");
        write_text(&out, "hello").await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");

        write_text(&out, "again\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "again\n");
    }
}
