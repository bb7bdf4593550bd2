//! Declarative image filtering: `FilterSpec` → new `RasterImage`.
//!
//! OCR engines read small, thin glyphs poorly. Upscaling with a Lanczos
//! kernel gives them more pixels per stroke, and a light box blur afterwards
//! closes the hairline gaps that resampling leaves in anti-aliased text.
//!
//! The chain is data ([`FilterSpec`]) rather than code so it can be logged,
//! serialised and compared in tests. Its JSON form is one object per stage:
//!
//! ```json
//! {"stages": [
//!   {"op": "lanczos_scale", "scale": 3.0, "aspect": 1.0},
//!   {"op": "box_blur", "radius": 2.0}
//! ]}
//! ```

use crate::error::FilterError;
use crate::pipeline::raster::RasterImage;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::filter::box_filter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upscale factor of the default spec.
pub const DEFAULT_SCALE: f32 = 3.0;

/// Box blur radius (pixels) of the default spec.
pub const DEFAULT_BLUR_RADIUS: f32 = 2.0;

/// Largest blur radius a spec may ask for. Kernels wider than the image are
/// clamped to it anyway.
pub const MAX_BLUR_RADIUS: f32 = u16::MAX as f32;

/// Default cap on the pixel count of any stage output (≈ 400 MB of RGBA).
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// One transform in a [`FilterSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterStage {
    /// Lanczos3 resample. Output is `round(w·scale·aspect) × round(h·scale)`.
    LanczosScale { scale: f32, aspect: f32 },
    /// Separable box blur, kernel `2·round(radius)+1` pixels wide.
    BoxBlur { radius: f32 },
}

impl FilterStage {
    pub fn op(&self) -> &'static str {
        match self {
            FilterStage::LanczosScale { .. } => "lanczos_scale",
            FilterStage::BoxBlur { .. } => "box_blur",
        }
    }

    fn validate(&self) -> Result<(), FilterError> {
        let invalid = |detail: String| FilterError::InvalidParameter {
            op: self.op().to_string(),
            detail,
        };
        match *self {
            FilterStage::LanczosScale { scale, aspect } => {
                if !scale.is_finite() || scale <= 0.0 {
                    return Err(invalid(format!("scale must be finite and > 0, got {scale}")));
                }
                if !aspect.is_finite() || aspect <= 0.0 {
                    return Err(invalid(format!("aspect must be finite and > 0, got {aspect}")));
                }
            }
            FilterStage::BoxBlur { radius } => {
                if !radius.is_finite() || !(0.0..=MAX_BLUR_RADIUS).contains(&radius) {
                    return Err(invalid(format!(
                        "radius must be within 0..={MAX_BLUR_RADIUS}, got {radius}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Ordered list of transforms applied by [`FilterPipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub stages: Vec<FilterStage>,
}

impl FilterSpec {
    /// Upscale 3× (aspect 1.0), then box blur with radius 2.
    pub fn ocr_default() -> Self {
        Self {
            stages: vec![
                FilterStage::LanczosScale {
                    scale: DEFAULT_SCALE,
                    aspect: 1.0,
                },
                FilterStage::BoxBlur {
                    radius: DEFAULT_BLUR_RADIUS,
                },
            ],
        }
    }

    /// Check every stage's parameters without touching any pixels.
    pub fn validate(&self) -> Result<(), FilterError> {
        self.stages.iter().try_for_each(FilterStage::validate)
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::ocr_default()
    }
}

/// Applies a [`FilterSpec`] to a [`RasterImage`].
#[derive(Debug, Clone, Copy)]
pub struct FilterPipeline {
    max_output_pixels: u64,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_PIXELS)
    }
}

impl FilterPipeline {
    pub fn new(max_output_pixels: u64) -> Self {
        Self {
            max_output_pixels: max_output_pixels.max(1),
        }
    }

    /// Run every stage in order and return the final image.
    ///
    /// The input is never modified. A zero-area input is rejected before any
    /// stage runs, and parameters are validated before any kernel runs.
    pub fn apply(&self, image: &RasterImage, spec: &FilterSpec) -> Result<RasterImage, FilterError> {
        if image.is_empty() {
            return Err(FilterError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }
        spec.validate()?;

        let mut current = image.clone();
        for stage in &spec.stages {
            let next = self.apply_stage(current.pixels(), stage)?;
            debug!(
                "Filter '{}': {}x{} → {}x{}",
                stage.op(),
                current.width(),
                current.height(),
                next.width(),
                next.height()
            );
            current = RasterImage::from_rgba(next);
        }
        Ok(current)
    }

    fn apply_stage(&self, pixels: &RgbaImage, stage: &FilterStage) -> Result<RgbaImage, FilterError> {
        match *stage {
            FilterStage::LanczosScale { scale, aspect } => {
                let (width, height) = scaled_dimensions(pixels.dimensions(), scale, aspect);
                if width.saturating_mul(height) > self.max_output_pixels
                    || width > u64::from(u32::MAX)
                    || height > u64::from(u32::MAX)
                {
                    return Err(FilterError::OutputTooLarge {
                        op: stage.op().to_string(),
                        width,
                        height,
                        max_pixels: self.max_output_pixels,
                    });
                }
                Ok(imageops::resize(
                    pixels,
                    width as u32,
                    height as u32,
                    FilterType::Lanczos3,
                ))
            }
            FilterStage::BoxBlur { radius } => Ok(box_blur(pixels, radius.round() as u32)),
        }
    }
}

/// Output size of a Lanczos stage, never below 1×1.
fn scaled_dimensions((w, h): (u32, u32), scale: f32, aspect: f32) -> (u64, u64) {
    let width = (f64::from(w) * f64::from(scale) * f64::from(aspect)).round();
    let height = (f64::from(h) * f64::from(scale)).round();
    ((width as u64).max(1), (height as u64).max(1))
}

/// Box blur each RGBA channel independently.
///
/// A radius past the image's longer side averages the same pixels as that
/// side, so it is clamped there.
fn box_blur(pixels: &RgbaImage, radius: u32) -> RgbaImage {
    let (width, height) = pixels.dimensions();
    let radius = radius.min(width.max(height));
    if radius == 0 {
        return pixels.clone();
    }
    let blurred: Vec<GrayImage> = (0..4)
        .map(|c| {
            let channel = GrayImage::from_fn(width, height, |x, y| Luma([pixels.get_pixel(x, y)[c]]));
            box_filter(&channel, radius, radius)
        })
        .collect();

    RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([
            blurred[0].get_pixel(x, y)[0],
            blurred[1].get_pixel(x, y)[0],
            blurred[2].get_pixel(x, y)[0],
            blurred[3].get_pixel(x, y)[0],
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checkerboard(w: u32, h: u32) -> RasterImage {
        RasterImage::from_rgba(RgbaImage::from_fn(w, h, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        }))
    }

    #[test]
    fn default_spec_json_shape() {
        let json = serde_json::to_value(FilterSpec::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"stages": [
                {"op": "lanczos_scale", "scale": 3.0, "aspect": 1.0},
                {"op": "box_blur", "radius": 2.0}
            ]})
        );
        let back: FilterSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, FilterSpec::ocr_default());
    }

    #[test]
    fn default_spec_triples_dimensions() {
        let input = checkerboard(20, 14);
        let out = FilterPipeline::default()
            .apply(&input, &FilterSpec::default())
            .unwrap();
        assert_eq!(out.dimensions(), (60, 42));
        assert_eq!(input.dimensions(), (20, 14), "input must be untouched");
    }

    #[test]
    fn aspect_stretches_width_only() {
        let spec = FilterSpec {
            stages: vec![FilterStage::LanczosScale {
                scale: 2.0,
                aspect: 1.5,
            }],
        };
        let out = FilterPipeline::default().apply(&checkerboard(10, 10), &spec).unwrap();
        assert_eq!(out.dimensions(), (30, 20));
    }

    #[test]
    fn pipeline_is_deterministic() {
        let input = checkerboard(16, 9);
        let pipeline = FilterPipeline::default();
        let a = pipeline.apply(&input, &FilterSpec::default()).unwrap();
        let b = pipeline.apply(&input, &FilterSpec::default()).unwrap();
        assert_eq!(a.dimensions(), b.dimensions());
        assert_eq!(a.pixels().as_raw(), b.pixels().as_raw());
    }

    #[test]
    fn zero_area_fails_fast() {
        let empty = RasterImage::from_rgba(RgbaImage::new(0, 12));
        // An invalid filter spec would report InvalidParameter if any stage were
        // consulted; the empty image must win.
        let spec = FilterSpec {
            stages: vec![FilterStage::BoxBlur { radius: -1.0 }],
        };
        let err = FilterPipeline::default().apply(&empty, &spec).unwrap_err();
        assert_eq!(err, FilterError::EmptyImage { width: 0, height: 12 });
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let img = checkerboard(4, 4);
        for stage in [
            FilterStage::LanczosScale { scale: 0.0, aspect: 1.0 },
            FilterStage::LanczosScale { scale: 2.0, aspect: f32::NAN },
            FilterStage::BoxBlur { radius: f32::INFINITY },
            FilterStage::BoxBlur { radius: 1e10 },
            FilterStage::BoxBlur { radius: MAX_BLUR_RADIUS + 1.0 },
        ] {
            let op = stage.op();
            let spec = FilterSpec { stages: vec![stage] };
            match FilterPipeline::default().apply(&img, &spec) {
                Err(FilterError::InvalidParameter { op: got, .. }) => assert_eq!(got, op),
                other => panic!("expected InvalidParameter, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_output_is_rejected() {
        let err = FilterPipeline::new(100)
            .apply(&checkerboard(10, 10), &FilterSpec::default())
            .unwrap_err();
        assert!(matches!(err, FilterError::OutputTooLarge { width: 30, height: 30, .. }));
    }

    #[test]
    fn blur_keeps_uniform_images_uniform() {
        let flat = RasterImage::from_rgba(RgbaImage::from_pixel(9, 7, Rgba([200, 100, 50, 255])));
        let spec = FilterSpec {
            stages: vec![FilterStage::BoxBlur { radius: 2.0 }],
        };
        let out = FilterPipeline::default().apply(&flat, &spec).unwrap();
        assert_eq!(out.dimensions(), (9, 7));
        assert!(out.pixels().pixels().all(|p| *p == Rgba([200, 100, 50, 255])));
    }

    #[test]
    fn blur_smooths_edges() {
        let input = checkerboard(12, 12);
        let spec = FilterSpec {
            stages: vec![FilterStage::BoxBlur { radius: 2.0 }],
        };
        let out = FilterPipeline::default().apply(&input, &spec).unwrap();
        let centre = out.pixels().get_pixel(6, 6)[0];
        assert!(centre > 0 && centre < 255, "expected a mid-grey, got {centre}");
    }

    #[test]
    fn largest_allowed_radius_blurs_without_panicking() {
        let input = checkerboard(8, 8);
        let spec = FilterSpec {
            stages: vec![FilterStage::BoxBlur { radius: MAX_BLUR_RADIUS }],
        };
        let out = FilterPipeline::default().apply(&input, &spec).unwrap();
        assert_eq!(out.dimensions(), (8, 8));
    }

    #[test]
    fn radius_wider_than_image_matches_image_wide_kernel() {
        let input = checkerboard(8, 6);
        let huge = box_blur(input.pixels(), 5_000);
        let clamped = box_blur(input.pixels(), 8);
        assert_eq!(huge, clamped);
    }

    #[test]
    fn zero_radius_blur_is_identity() {
        let input = checkerboard(6, 6);
        let spec = FilterSpec {
            stages: vec![FilterStage::BoxBlur { radius: 0.0 }],
        };
        let out = FilterPipeline::default().apply(&input, &spec).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn empty_spec_returns_equal_image() {
        let input = checkerboard(5, 3);
        let out = FilterPipeline::default()
            .apply(&input, &FilterSpec { stages: vec![] })
            .unwrap();
        assert_eq!(out, input);
    }
}
