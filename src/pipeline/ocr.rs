//! Text recognition.
//!
//! With region hints each region is cropped out of the page and recognized
//! on its own as a uniform block, in region order; that keeps multi-column
//! pages from being read straight across the gutter. Without hints (layout
//! disabled, or nothing detected) the whole page is recognized with
//! automatic segmentation.

use super::tesseract;
use crate::error::CollaboratorError;
use crate::state::{Region, TextBlock};
use image::GenericImageView;
use std::path::Path;
use tracing::debug;

/// Recognizes text fragments on an image.
///
/// "Nothing recognized" is an empty list, not an error.
pub trait OcrEngine: Send + Sync {
    fn recognize(
        &self,
        image: &Path,
        regions: Option<&[Region]>,
    ) -> Result<Vec<TextBlock>, CollaboratorError>;
}

/// tesseract-backed engine.
#[derive(Debug, Clone)]
pub struct TesseractOcrEngine {
    tool: String,
    languages: String,
}

impl TesseractOcrEngine {
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

    fn recognize_page(&self, image: &Path) -> Result<Vec<TextBlock>, CollaboratorError> {
        // psm 3: fully automatic segmentation, no OSD.
        let rows = tesseract::run_tsv(&self.tool, image, &self.languages, 3)?;
        Ok(tesseract::line_blocks(&rows))
    }

    fn recognize_regions(
        &self,
        image: &Path,
        regions: &[Region],
    ) -> Result<Vec<TextBlock>, CollaboratorError> {
        let page = image::open(image)?;
        let (width, height) = page.dimensions();
        let mut blocks = Vec::new();

        for region in regions {
            let Some(rect) = clip(region, width, height) else {
                continue;
            };
            let crop = page.crop_imm(rect.left, rect.top, rect.width, rect.height);

            let tmp = tempfile::Builder::new()
                .prefix(".region-")
                .suffix(".png")
                .tempfile()?;
            crop.save_with_format(tmp.path(), image::ImageFormat::Png)?;

            // psm 6: treat the crop as one uniform block of text.
            let rows = tesseract::run_tsv(&self.tool, tmp.path(), &self.languages, 6)?;
            blocks.extend(tesseract::line_blocks(&rows));
        }
        Ok(blocks)
    }
}

/// Clip a region to the image bounds; `None` if nothing is left.
fn clip(region: &Region, width: u32, height: u32) -> Option<Region> {
    if region.left >= width || region.top >= height {
        return None;
    }
    let w = region.width.min(width - region.left);
    let h = region.height.min(height - region.top);
    if w == 0 || h == 0 {
        return None;
    }
    Some(Region {
        left: region.left,
        top: region.top,
        width: w,
        height: h,
    })
}

impl OcrEngine for TesseractOcrEngine {
    fn recognize(
        &self,
        image: &Path,
        regions: Option<&[Region]>,
    ) -> Result<Vec<TextBlock>, CollaboratorError> {
        let blocks = match regions {
            Some(regions) if !regions.is_empty() => self.recognize_regions(image, regions)?,
            _ => self.recognize_page(image)?,
        };
        debug!("{}: {} text blocks", image.display(), blocks.len());
        Ok(blocks)
    }
}
