//! Text recognition: `RasterImage` → ordered text regions.
//!
//! [`TextRecognizer`] is engine-agnostic: it asks an [`OcrEngine`] for ranked
//! candidates per detected region and keeps only the top one. Regions stay
//! in the order the engine reported them. This is detection order, which
//! for multi-column pages is not necessarily reading order.
//!
//! The production engine is Tesseract via `leptess`. It is initialised per
//! call, inside the blocking worker that runs it, so no engine state is
//! shared between requests.

use crate::config::{RecognitionLevel, RegionLevel};
use crate::error::RecognitionError;
use crate::output::{RecognitionResult, RegionBox, TextRegion};
use crate::pipeline::raster::RasterImage;
use leptess::{LepTess, Variable};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// One candidate transcription of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    /// Engine confidence in `[0, 1]`, when the engine reports one.
    pub confidence: Option<f32>,
}

/// A region the engine found, with candidates best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedRegion {
    pub candidates: Vec<Candidate>,
    pub bbox: Option<RegionBox>,
}

/// An OCR backend.
///
/// `detect` is blocking. Errors are reported, never panicked: the
/// coordinator turns them into an empty result.
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and errors, e.g. `"tesseract"`.
    fn name(&self) -> &str;

    /// Detect text regions, in the engine's own order, each with its
    /// candidates ranked best-first.
    fn detect(&self, image: &RasterImage) -> Result<Vec<DetectedRegion>, RecognitionError>;
}

/// Tesseract settings.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    pub language: String,
    pub tessdata_dir: Option<PathBuf>,
    pub level: RecognitionLevel,
    pub region_level: RegionLevel,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tessdata_dir: None,
            level: RecognitionLevel::Accurate,
            region_level: RegionLevel::Line,
        }
    }
}

impl TesseractEngine {
    const NAME: &'static str = "tesseract";

    fn init(&self) -> Result<LepTess, RecognitionError> {
        let data_path = self
            .tessdata_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());

        let mut lt = LepTess::new(data_path.as_deref(), &self.language).map_err(|e| {
            RecognitionError::EngineInit {
                engine: Self::NAME.to_string(),
                detail: format!(
                    "language '{}': {}. Make sure the traineddata is installed or set TESSDATA_PREFIX.",
                    self.language, e
                ),
            }
        })?;

        lt.set_variable(
            Variable::TesseditPagesegMode,
            &self.level.page_segmentation_mode().to_string(),
        )
        .map_err(|e| RecognitionError::EngineInit {
            engine: Self::NAME.to_string(),
            detail: format!("failed to set page segmentation mode: {}", e),
        })?;

        Ok(lt)
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn detect(&self, image: &RasterImage) -> Result<Vec<DetectedRegion>, RecognitionError> {
        let mut lt = self.init()?;

        let png = image.encode_png().map_err(|e| RecognitionError::UnsupportedImage {
            engine: Self::NAME.to_string(),
            detail: format!("PNG encoding failed: {}", e),
        })?;
        lt.set_image_from_mem(&png)
            .map_err(|e| RecognitionError::UnsupportedImage {
                engine: Self::NAME.to_string(),
                detail: e.to_string(),
            })?;

        let level = match self.region_level {
            RegionLevel::Line => leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE,
            RegionLevel::Word => leptess::capi::TessPageIteratorLevel_RIL_WORD,
        };

        // No boxes means no text on the page, not a failure.
        let boxes = match lt.get_component_boxes(level, true) {
            Some(boxes) => boxes,
            None => return Ok(Vec::new()),
        };

        let mut regions = Vec::new();
        for bbox in &boxes {
            let geom = bbox.get_geometry();
            lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

            let text = match lt.get_utf8_text() {
                Ok(t) => t.trim().to_string(),
                Err(e) => {
                    warn!("Tesseract returned non-UTF-8 text for a region: {}", e);
                    continue;
                }
            };
            let confidence = (lt.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0);

            regions.push(DetectedRegion {
                candidates: vec![Candidate {
                    text,
                    confidence: Some(confidence),
                }],
                bbox: Some(RegionBox {
                    x: geom.x.max(0) as u32,
                    y: geom.y.max(0) as u32,
                    width: geom.w.max(0) as u32,
                    height: geom.h.max(0) as u32,
                }),
            });
        }

        Ok(regions)
    }
}

/// Runs an [`OcrEngine`] and keeps the top candidate per region.
#[derive(Clone)]
pub struct TextRecognizer {
    engine: Arc<dyn OcrEngine>,
}

impl TextRecognizer {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Recognise text, surfacing engine failures as errors.
    pub fn recognize(&self, image: &RasterImage) -> Result<RecognitionResult, RecognitionError> {
        if image.is_empty() {
            return Err(RecognitionError::UnsupportedImage {
                engine: self.engine.name().to_string(),
                detail: format!("image is {}x{}", image.width(), image.height()),
            });
        }

        let detections = self.engine.detect(image)?;
        let detected = detections.len();
        let regions: Vec<TextRegion> = detections
            .into_iter()
            .filter_map(|region| {
                let top = region.candidates.into_iter().next()?;
                if top.text.trim().is_empty() {
                    return None;
                }
                Some(TextRegion {
                    text: top.text,
                    confidence: top.confidence,
                    bbox: region.bbox,
                })
            })
            .collect();

        debug!(
            "OCR ({}): {} regions detected, {} kept",
            self.engine.name(),
            detected,
            regions.len()
        );
        Ok(RecognitionResult { regions })
    }

    /// Recognise text; on failure return an empty result plus the error.
    pub fn recognize_or_empty(&self, image: &RasterImage) -> (RecognitionResult, Option<RecognitionError>) {
        match self.recognize(image) {
            Ok(result) => (result, None),
            Err(e) => {
                warn!("OCR failed, continuing with no text: {}", e);
                (RecognitionResult::default(), Some(e))
            }
        }
    }
}
