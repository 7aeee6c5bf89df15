//! Page extraction: turn one input document into ordered page images.
//!
//! PDFs are rasterized by `pdftoppm` (poppler-utils) as an external process.
//! Untrusted PDFs can hang or explode a renderer, so the process runs with a
//! hard timeout and is killed when the timeout fires (`kill_on_drop`).
//! Partial output after a timeout or crash is never used: the whole
//! document fails, because no page-level state exists yet.
//!
//! A rasterization only counts once the controller has written the
//! [`COMPLETE_MARKER`] file (holding the page count) next to the images.
//! A `pages/` directory without it is leftover from an interrupted or
//! rejected attempt and is cleared before rasterizing again.
//!
//! Image inputs are a single page; they are decoded once and re-encoded as
//! `page-1.png` so later stages only ever see PNG page images.

use super::input::InputKind;
use super::{is_usable_artifact, write_atomically};
use crate::error::PagemillError;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters for one rasterization call.
#[derive(Debug, Clone, Copy)]
pub struct RasterRequest<'a> {
    pub input: &'a Path,
    pub kind: InputKind,
    pub out_dir: &'a Path,
    pub dpi: u32,
    pub max_pages: usize,
    pub timeout: Duration,
}

/// Produces ordered page images for a document.
///
/// Errors are fatal for the document: a missing tool, a timeout, a
/// non-zero exit, zero pages, or more pages than `max_pages`.
pub trait PageRasterizer: Send + Sync {
    fn rasterize<'a>(
        &'a self,
        request: RasterRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<PathBuf>, PagemillError>>;
}

/// `pdftoppm`-backed rasterizer.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    tool: String,
}

impl Default for PopplerRasterizer {
    fn default() -> Self {
        Self {
            tool: "pdftoppm".to_string(),
        }
    }
}

impl PopplerRasterizer {
    /// Use a different executable name or path for `pdftoppm`.
    pub fn with_tool(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    async fn rasterize_pdf(&self, req: RasterRequest<'_>) -> Result<(), PagemillError> {
        let prefix = req.out_dir.join(PAGE_PREFIX);

        // Stop one page past the ceiling: enough to detect the overflow
        // without rendering the rest of a pathological document.
        let last_page = req.max_pages.saturating_add(1);

        let mut cmd = tokio::process::Command::new(&self.tool);
        cmd.arg("-r")
            .arg(req.dpi.to_string())
            .arg("-l")
            .arg(last_page.to_string())
            .arg("-png")
            .arg(req.input)
            .arg(&prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PagemillError::RasterizerMissing {
                    tool: self.tool.clone(),
                }
            } else {
                PagemillError::RasterizeFailed {
                    detail: format!("could not start {}: {e}", self.tool),
                }
            }
        })?;

        let output = match tokio::time::timeout(req.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| PagemillError::RasterizeFailed {
                detail: e.to_string(),
            })?,
            Err(_) => {
                return Err(PagemillError::RasterizeTimeout {
                    secs: req.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(PagemillError::RasterizeFailed {
                detail: if stderr.is_empty() {
                    format!("{} exited with {}", self.tool, output.status)
                } else {
                    stderr.to_string()
                },
            });
        }
        Ok(())
    }

    async fn rasterize_image(&self, req: RasterRequest<'_>) -> Result<(), PagemillError> {
        let input = req.input.to_path_buf();
        let dest = req.out_dir.join(page_file_name(1));

        tokio::task::spawn_blocking(move || -> Result<(), PagemillError> {
            let img = image::open(&input).map_err(|e| PagemillError::RasterizeFailed {
                detail: format!("cannot decode {}: {e}", input.display()),
            })?;
            write_atomically(&dest, |file| {
                img.write_to(file, image::ImageFormat::Png)
                    .map_err(|e| std::io::Error::other(e.to_string()))
            })
            .map_err(|e| PagemillError::RasterizeFailed {
                detail: format!("cannot write {}: {e}", dest.display()),
            })
        })
        .await
        .map_err(|e| PagemillError::Internal(format!("Image page task panicked: {e}")))?
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn rasterize<'a>(
        &'a self,
        req: RasterRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<PathBuf>, PagemillError>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(req.out_dir)
                .await
                .map_err(|e| PagemillError::Workspace {
                    path: req.out_dir.to_path_buf(),
                    source: e,
                })?;

            match req.kind {
                InputKind::Pdf => self.rasterize_pdf(req).await?,
                InputKind::Image => self.rasterize_image(req).await?,
            }

            let pages = list_page_images(req.out_dir)?;
            check_page_count(pages.len(), req.max_pages)?;
            info!("Rasterized {} pages at {} DPI", pages.len(), req.dpi);
            Ok(pages)
        })
    }
}

// ── Page-image discovery ─────────────────────────────────────────────────

const PAGE_PREFIX: &str = "page";

/// File name for a 1-indexed page, matching `pdftoppm`'s unpadded form.
pub fn page_file_name(page_num: usize) -> String {
    format!("{PAGE_PREFIX}-{page_num}.png")
}

/// Parse the page number out of `page-<n>.png` (zero padding allowed).
fn page_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(PAGE_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

/// List `page-<n>.png` files in `dir`, ordered by page number.
///
/// A missing directory is an empty list.
pub fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>, PagemillError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PagemillError::Workspace {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    let mut pages: Vec<(usize, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let n = page_number(name.to_str()?)?;
            Some((n, entry.path()))
        })
        .collect();
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

/// Written into the pages directory once a rasterization passed every check.
pub const COMPLETE_MARKER: &str = ".complete";

/// Page images left by an earlier, completed run.
///
/// Returns `None` when the completion marker is missing or unreadable,
/// when its page count disagrees with the images on disk, or when any
/// image is empty or not a regular file. The caller then clears the
/// directory and rasterizes again.
pub fn existing_pages(dir: &Path) -> Result<Option<Vec<PathBuf>>, PagemillError> {
    let marker = dir.join(COMPLETE_MARKER);
    let expected = match std::fs::read_to_string(&marker) {
        Ok(body) => body.trim().parse::<usize>().ok(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if !list_page_images(dir)?.is_empty() {
                warn!(
                    "Ignoring page images in {}: rasterization never completed",
                    dir.display()
                );
            }
            return Ok(None);
        }
        Err(e) => {
            warn!("Cannot read {}: {e}", marker.display());
            None
        }
    };
    let Some(expected) = expected else {
        return Ok(None);
    };

    let pages = list_page_images(dir)?;
    if pages.len() != expected {
        warn!(
            "Ignoring existing page images: marker says {} pages, found {}",
            expected,
            pages.len()
        );
        return Ok(None);
    }
    if let Some(bad) = pages.iter().find(|p| !is_usable_artifact(p)) {
        warn!(
            "Ignoring existing page images: {} is empty or unreadable",
            bad.display()
        );
        return Ok(None);
    }
    debug!("Found {} page images from a previous run", pages.len());
    Ok(Some(pages))
}

/// Record that `dir` holds a complete rasterization of `page_count` pages.
pub fn mark_complete(dir: &Path, page_count: usize) -> Result<(), PagemillError> {
    let marker = dir.join(COMPLETE_MARKER);
    write_atomically(&marker, |file| {
        use std::io::Write;
        writeln!(file, "{page_count}")
    })
    .map_err(|e| PagemillError::Workspace {
        path: marker,
        source: e,
    })
}

/// Remove whatever an unfinished rasterization left in `dir`.
pub fn clear_pages(dir: &Path) -> Result<(), PagemillError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!("Cleared stale page images in {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PagemillError::Workspace {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Enforce `1 ..= max_pages`.
pub fn check_page_count(count: usize, max_pages: usize) -> Result<(), PagemillError> {
    if count == 0 {
        return Err(PagemillError::NoPagesProduced);
    }
    if count > max_pages {
        return Err(PagemillError::TooManyPages {
            count,
            limit: max_pages,
        });
    }
    Ok(())
}
