//! Page image denoising ahead of detection and OCR.
//!
//! Scans carry salt-and-pepper noise, JPEG ringing, and paper texture that
//! detectors mistake for glyph fragments. A small median filter on the
//! grayscale image removes most of it without eroding stroke edges.

use super::write_atomically;
use crate::engines::ComputeDevice;
use crate::error::CollaboratorError;
use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Produces a denoised copy of a page image at `dest`.
///
/// Fails if the source cannot be read or decoded, or `dest` cannot be written.
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, source: &Path, dest: &Path) -> Result<PathBuf, CollaboratorError>;
}

/// Grayscale + median-filter denoiser.
#[derive(Debug, Clone)]
pub struct DenoisePreprocessor {
    device: ComputeDevice,
    radius: u32,
}

impl DenoisePreprocessor {
    pub fn new(device: ComputeDevice) -> Self {
        Self { device, radius: 1 }
    }

    /// Median window radius in pixels (1 → 3×3 window).
    pub fn with_radius(mut self, radius: u32) -> Self {
        self.radius = radius;
        self
    }

    /// The filter itself. Deterministic and identical for every device.
    pub fn denoise(&self, gray: &GrayImage) -> GrayImage {
        imageproc::filter::median_filter(gray, self.radius, self.radius)
    }
}

impl ImagePreprocessor for DenoisePreprocessor {
    fn preprocess(&self, source: &Path, dest: &Path) -> Result<PathBuf, CollaboratorError> {
        let img = image::open(source).map_err(|e| {
            CollaboratorError::new(format!("Failed to load image {}: {e}", source.display()))
        })?;
        let cleaned = self.denoise(&img.to_luma8());

        write_atomically(dest, |file| {
            cleaned
                .write_to(file, image::ImageFormat::Png)
                .map_err(|e| std::io::Error::other(e.to_string()))
        })?;

        debug!(
            "Denoised {} → {} on {}",
            source.display(),
            dest.display(),
            self.device
        );
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use tempfile::TempDir;

    #[test]
    fn median_removes_isolated_speck() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([255u8]));
        img.put_pixel(4, 4, Luma([0u8]));
        let out = DenoisePreprocessor::new(ComputeDevice::Cpu).denoise(&img);
        assert_eq!(out.get_pixel(4, 4), &Luma([255u8]));
    }

    #[test]
    fn writes_grayscale_png() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("page-1.png");
        image::RgbImage::from_pixel(12, 10, image::Rgb([10, 20, 30]))
            .save(&src)
            .unwrap();
        let dest = dir.path().join("preprocessed").join("page-1.png");

        let out = DenoisePreprocessor::new(ComputeDevice::Cpu)
            .preprocess(&src, &dest)
            .unwrap();
        assert_eq!(out, dest);
        let reread = image::open(&dest).unwrap();
        assert_eq!((reread.width(), reread.height()), (12, 10));
    }

    #[test]
    fn unreadable_source_fails() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("page-1.png");
        std::fs::write(&src, b"not an image").unwrap();
        let dest = dir.path().join("out.png");

        let err = DenoisePreprocessor::new(ComputeDevice::Cpu)
            .preprocess(&src, &dest)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to load image"));
        assert!(!dest.exists());
    }

    #[test]
    fn devices_produce_identical_output() {
        let mut img = GrayImage::from_pixel(6, 6, Luma([128u8]));
        img.put_pixel(2, 3, Luma([0u8]));
        let cpu = DenoisePreprocessor::new(ComputeDevice::Cpu).denoise(&img);
        let gpu = DenoisePreprocessor::new(ComputeDevice::Gpu).denoise(&img);
        assert_eq!(cpu, gpu);
    }
}
