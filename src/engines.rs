//! Collaborator handles for one pipeline.
//!
//! Every external capability the controller uses (rasterizer, text-layer
//! probe, preprocessor, layout detector, OCR engine, assembler, normalizer)
//! is held here as an `Arc<dyn Trait>`. The caller builds an [`Engines`]
//! once and hands it to [`crate::controller::Pipeline::new`]; nothing is
//! created lazily behind the caller's back, and tests substitute fakes with
//! the `with_*` methods.
//!
//! ## Compute device
//!
//! GPU availability is probed once per process and cached. The probe only
//! decides which [`ComputeDevice`] is reported and handed to collaborators;
//! every default collaborator produces the same output on either device,
//! so a machine without a GPU loses speed, never results.

use crate::config::PipelineConfig;
use crate::pipeline::assemble::{LineAssembler, TextAssembler};
use crate::pipeline::layout::{LayoutDetector, TesseractLayoutDetector};
use crate::pipeline::ocr::{OcrEngine, TesseractOcrEngine};
use crate::pipeline::postprocess::{TextNormalizer, UnicodeNormalizer};
use crate::pipeline::preprocess::{DenoisePreprocessor, ImagePreprocessor};
use crate::pipeline::render::{PageRasterizer, PopplerRasterizer};
use crate::pipeline::text_layer::{PdfiumTextLayer, TextLayerProbe};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Where compute-heavy collaborators run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Gpu,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComputeDevice::Cpu => "CPU",
            ComputeDevice::Gpu => "GPU",
        })
    }
}

impl ComputeDevice {
    /// Pick a device: GPU only if permitted and present.
    pub fn select(allow_gpu: bool) -> Self {
        if allow_gpu && gpu_available() {
            ComputeDevice::Gpu
        } else {
            ComputeDevice::Cpu
        }
    }
}

static GPU_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Whether a CUDA device is visible to this process. Probed once.
pub fn gpu_available() -> bool {
    *GPU_AVAILABLE.get_or_init(|| {
        let hidden = std::env::var("CUDA_VISIBLE_DEVICES")
            .map(|v| v.trim().is_empty() || v.trim() == "-1")
            .unwrap_or(false);
        !hidden && Path::new("/dev/nvidia0").exists()
    })
}

/// The collaborator set a [`crate::controller::Pipeline`] runs with.
#[derive(Clone)]
pub struct Engines {
    pub device: ComputeDevice,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub text_layer: Arc<dyn TextLayerProbe>,
    pub preprocessor: Arc<dyn ImagePreprocessor>,
    pub layout: Arc<dyn LayoutDetector>,
    pub ocr: Arc<dyn OcrEngine>,
    pub assembler: Arc<dyn TextAssembler>,
    pub normalizer: Arc<dyn TextNormalizer>,
}

impl fmt::Debug for Engines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engines")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl Engines {
    /// Default collaborators for `config`, with the compute device probed once.
    pub fn detect(config: &PipelineConfig) -> Self {
        let device = ComputeDevice::select(config.allow_gpu);
        info!("Compute device: {}", device);
        Self::with_device(config, device)
    }

    /// Default collaborators on an explicit device.
    pub fn with_device(config: &PipelineConfig, device: ComputeDevice) -> Self {
        Self {
            device,
            rasterizer: Arc::new(PopplerRasterizer::default()),
            text_layer: Arc::new(PdfiumTextLayer::new(
                config.min_text_chars,
                config.min_text_words,
            )),
            preprocessor: Arc::new(DenoisePreprocessor::new(device)),
            layout: Arc::new(TesseractLayoutDetector::new(&config.languages)),
            ocr: Arc::new(TesseractOcrEngine::new(&config.languages)),
            assembler: Arc::new(LineAssembler),
            normalizer: Arc::new(UnicodeNormalizer),
        }
    }

    pub fn with_rasterizer(mut self, r: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = r;
        self
    }

    pub fn with_text_layer(mut self, p: Arc<dyn TextLayerProbe>) -> Self {
        self.text_layer = p;
        self
    }

    pub fn with_preprocessor(mut self, p: Arc<dyn ImagePreprocessor>) -> Self {
        self.preprocessor = p;
        self
    }

    pub fn with_layout(mut self, d: Arc<dyn LayoutDetector>) -> Self {
        self.layout = d;
        self
    }

    pub fn with_ocr(mut self, e: Arc<dyn OcrEngine>) -> Self {
        self.ocr = e;
        self
    }

    pub fn with_assembler(mut self, a: Arc<dyn TextAssembler>) -> Self {
        self.assembler = a;
        self
    }

    pub fn with_normalizer(mut self, n: Arc<dyn TextNormalizer>) -> Self {
        self.normalizer = n;
        self
    }
}
