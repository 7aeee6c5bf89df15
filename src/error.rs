//! Error types for the pagemill library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PagemillError`] (**fatal**): the run cannot proceed at all (bad
//!   input path, unsupported file type, rasterizer missing or timed out,
//!   zero or too many pages). Returned as `Err(PagemillError)` from
//!   [`crate::controller::Pipeline::run`]. Artifacts already on disk stay
//!   there and are reused by the next run.
//!
//! * [`StageError`] (**non-fatal**): one page failed inside one stage.
//!   It is stored on the page ([`crate::state::PageStage::Failed`]) and
//!   never propagated, so a bad page cannot abort the document.
//!
//! Collaborators report failures as [`CollaboratorError`]; the controller
//! tags them with the stage that was running to build a [`StageError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagemill library.
#[derive(Debug, Error)]
pub enum PagemillError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The path exists but is a directory or special file.
    #[error("Input path is not a regular file: '{path}'")]
    NotAFile { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is outside the supported set.
    #[error("Unsupported input '{path}' (extension {extension:?})\nSupported: pdf, png, jpg, jpeg")]
    UnsupportedInput { path: PathBuf, extension: String },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// Could not create or read the per-document working directory.
    #[error("Working directory '{path}' is unusable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// The external rasterizer binary is not installed.
    #[error("{tool} not found. Install poppler-utils to enable PDF rasterization.")]
    RasterizerMissing { tool: String },

    /// The rasterizer did not finish in time; partial output is unusable.
    #[error("Rasterization timed out after {secs}s\nThe file may be very large or malformed.")]
    RasterizeTimeout { secs: u64 },

    /// The rasterizer exited non-zero or could not decode the input.
    #[error("Rasterization failed: {detail}")]
    RasterizeFailed { detail: String },

    /// The rasterizer succeeded but produced no page images.
    #[error("Rasterization produced no page images\nThe document may be empty or unsupported.")]
    NoPagesProduced,

    /// The document has more pages than the configured ceiling.
    #[error("Document produced {count} pages, exceeds limit of {limit}")]
    TooManyPages { count: usize, limit: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the extracted text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure reported by a collaborator (preprocessor, detector, OCR, …).
///
/// Collaborators know nothing about stages; the controller attaches the
/// stage tag when turning this into a [`StageError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<image::ImageError> for CollaboratorError {
    fn from(e: image::ImageError) -> Self {
        Self(e.to_string())
    }
}

/// Pipeline stages that can fail a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Layout,
    Ocr,
    Assemble,
    Normalize,
}

impl Stage {
    /// Tag prefixed to the page error, e.g. `preprocess: <cause>`.
    pub fn tag(self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Layout => "layout",
            Stage::Ocr => "ocr",
            Stage::Assemble => "text",
            Stage::Normalize => "post",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A non-fatal, page-local failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{stage}: {cause}")]
pub struct StageError {
    pub stage: Stage,
    pub cause: String,
}

impl StageError {
    pub fn new(stage: Stage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_display_uses_tag() {
        let e = StageError::new(Stage::Preprocess, "Failed to load image");
        assert_eq!(e.to_string(), "preprocess: Failed to load image");

        let e = StageError::new(Stage::Assemble, "boom");
        assert_eq!(e.to_string(), "text: boom");

        let e = StageError::new(Stage::Normalize, "bad utf8");
        assert_eq!(e.to_string(), "post: bad utf8");
    }

    #[test]
    fn too_many_pages_display() {
        let e = PagemillError::TooManyPages {
            count: 2001,
            limit: 2000,
        };
        let msg = e.to_string();
        assert!(msg.contains("2001"), "got: {msg}");
        assert!(msg.contains("2000"), "got: {msg}");
    }

    #[test]
    fn unsupported_input_display() {
        let e = PagemillError::UnsupportedInput {
            path: PathBuf::from("notes.docx"),
            extension: "docx".into(),
        };
        assert!(e.to_string().contains("docx"));
    }

    #[test]
    fn collaborator_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: CollaboratorError = io.into();
        assert_eq!(e.to_string(), "gone");
    }
}
