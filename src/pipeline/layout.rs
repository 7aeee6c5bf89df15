//! Text-region detection on the preprocessed page.

use super::tesseract;
use crate::error::CollaboratorError;
use crate::state::Region;
use std::path::Path;
use tracing::debug;

/// Finds text regions on a preprocessed page image.
///
/// "No regions found" is an empty list, not an error.
pub trait LayoutDetector: Send + Sync {
    fn detect(&self, image: &Path) -> Result<Vec<Region>, CollaboratorError>;
}

/// Block-level regions from tesseract's automatic page segmentation.
#[derive(Debug, Clone)]
pub struct TesseractLayoutDetector {
    tool: String,
    languages: String,
}

impl TesseractLayoutDetector {
    pub fn new(languages: &[String]) -> Self {
        Self {
            tool: "tesseract".to_string(),
            languages: tesseract::language_codes(languages),
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }
}

impl LayoutDetector for TesseractLayoutDetector {
    fn detect(&self, image: &Path) -> Result<Vec<Region>, CollaboratorError> {
        // psm 1: automatic segmentation with orientation detection.
        let rows = tesseract::run_tsv(&self.tool, image, &self.languages, 1)?;
        let regions = tesseract::block_regions(&rows);
        debug!("{}: {} text regions", image.display(), regions.len());
        Ok(regions)
    }
}
