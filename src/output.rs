//! Result types returned by the pipeline.

use crate::error::{FilterError, RecognitionError};
use crate::pipeline::raster::RasterImage;
use crate::pipeline::render::BoxKind;
use crate::progress::RequestId;
use serde::{Deserialize, Serialize};

/// Pixel rectangle of a recognised region (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One recognised region: its top candidate only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    /// Engine confidence in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<RegionBox>,
}

/// Recognised regions in engine detection order (not reading order).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub regions: Vec<TextRegion>,
}

impl RecognitionResult {
    /// The recognised strings, one per region.
    pub fn lines(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Mean confidence over regions that report one.
    pub fn mean_confidence(&self) -> Option<f32> {
        let scores: Vec<f32> = self.regions.iter().filter_map(|r| r.confidence).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f32>() / scores.len() as f32)
        }
    }
}

/// Wall-clock time spent per stage, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub rasterize_ms: u64,
    /// `None` when the filter stage did not run.
    pub filter_ms: Option<u64>,
    pub recognize_ms: u64,
    pub total_ms: u64,
}

/// Everything one request produced.
///
/// `image` is always the image the OCR engine analysed: the filtered image
/// when filters ran, otherwise the display-box render.
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    pub request_id: RequestId,
    /// 1-based page number that was rendered.
    pub page_number: u16,
    pub recognition: RecognitionResult,
    pub image: RasterImage,
    /// Page box the returned image was rendered from.
    pub box_kind: BoxKind,
    /// `true` only when the filter stage ran and succeeded.
    pub filters_applied: bool,
    /// Set when filters were requested but failed and the request fell back
    /// to the unfiltered branch.
    pub filter_error: Option<FilterError>,
    /// Set when the OCR engine failed; `recognition` is then empty.
    pub recognition_error: Option<RecognitionError>,
    pub timings: StageTimings,
}

impl PipelineResponse {
    pub fn lines(&self) -> Vec<&str> {
        self.recognition.lines()
    }

    /// `true` when any stage fell back instead of completing normally.
    pub fn is_degraded(&self) -> bool {
        self.filter_error.is_some() || self.recognition_error.is_some()
    }

    /// Serialisable view without pixel data.
    pub fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            request_id: self.request_id,
            page_number: self.page_number,
            lines: self.lines().into_iter().map(str::to_string).collect(),
            regions: self.recognition.regions.clone(),
            image_width: self.image.width(),
            image_height: self.image.height(),
            box_kind: self.box_kind,
            filters_applied: self.filters_applied,
            filter_error: self.filter_error.clone(),
            recognition_error: self.recognition_error.clone(),
            timings: self.timings.clone(),
        }
    }
}

/// JSON-friendly projection of a [`PipelineResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub request_id: RequestId,
    pub page_number: u16,
    pub lines: Vec<String>,
    pub regions: Vec<TextRegion>,
    pub image_width: u32,
    pub image_height: u32,
    pub box_kind: BoxKind,
    pub filters_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_error: Option<FilterError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognition_error: Option<RecognitionError>,
    pub timings: StageTimings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn region(text: &str, confidence: Option<f32>) -> TextRegion {
        TextRegion {
            text: text.into(),
            confidence,
            bbox: None,
        }
    }

    #[test]
    fn mean_confidence_ignores_missing_scores() {
        let result = RecognitionResult {
            regions: vec![region("a", Some(0.5)), region("b", None), region("c", Some(1.0))],
        };
        assert_eq!(result.mean_confidence(), Some(0.75));
        assert_eq!(RecognitionResult::default().mean_confidence(), None);
    }

    #[test]
    fn summary_serialises_without_pixels() {
        let response = PipelineResponse {
            request_id: RequestId(3),
            page_number: 1,
            recognition: RecognitionResult {
                regions: vec![region("Invoice 2024", Some(0.9))],
            },
            image: RasterImage::from_rgba(RgbaImage::new(30, 20)),
            box_kind: BoxKind::Art,
            filters_applied: false,
            filter_error: None,
            recognition_error: None,
            timings: StageTimings::default(),
        };
        assert!(!response.is_degraded());

        let json = serde_json::to_value(response.summary()).unwrap();
        assert_eq!(json["lines"], serde_json::json!(["Invoice 2024"]));
        assert_eq!(json["image_width"], 30);
        assert_eq!(json["box_kind"], "art");
        assert!(json.get("filter_error").is_none());
    }
}
