//! Configuration for the page OCR pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via [`PipelineConfigBuilder`].
//! The builder clamps what it can and `build()` rejects what it cannot.

use crate::error::PipelineError;
use crate::pipeline::filter::{FilterSpec, DEFAULT_MAX_OUTPUT_PIXELS};
use crate::pipeline::render::BoxKind;
use crate::progress::ObserverHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Smallest accepted render scale (pixels per PDF point).
pub const MIN_RENDER_SCALE: f32 = 0.1;

/// Largest accepted render scale (pixels per PDF point).
pub const MAX_RENDER_SCALE: f32 = 8.0;

/// Configuration for a [`crate::PipelineCoordinator`].
///
/// # Example
/// ```rust
/// use pdf_page_ocr::{BoxKind, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .render_scale(2.0)
///     .display_box(BoxKind::Crop)
///     .language("eng+deu")
///     .build()
///     .unwrap();
/// assert_eq!(config.render_scale, 2.0);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Box rendered when filters are off. Default: [`BoxKind::Art`].
    pub display_box: BoxKind,

    /// Box rendered when filters are on. Default: [`BoxKind::Media`].
    ///
    /// On pages whose art box is smaller than the media box, toggling filters
    /// changes the analysed region as well as its resolution.
    pub filtering_box: BoxKind,

    /// Pixels per PDF point. Range: 0.1–8.0. Default: 1.0.
    pub render_scale: f32,

    /// Filter chain run when a request enables filters.
    /// Default: [`FilterSpec::ocr_default`].
    pub filter_spec: FilterSpec,

    /// Pixel cap for any filter stage output. Default: 100 000 000.
    pub max_filter_pixels: u64,

    /// Tesseract language code(s), e.g. `"eng"` or `"eng+fra"`. Default: `"eng"`.
    pub language: String,

    /// Directory holding `*.traineddata`. If None, Tesseract uses
    /// `TESSDATA_PREFIX` or its compiled-in default.
    pub tessdata_dir: Option<PathBuf>,

    /// Default: [`RecognitionLevel::Accurate`].
    pub recognition_level: RecognitionLevel,

    /// Granularity of returned regions. Default: [`RegionLevel::Line`].
    pub region_level: RegionLevel,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// pdfium shared library file or directory. If None, `PDFIUM_LIB_PATH`,
    /// then `./`, then the system loader are tried.
    pub pdfium_library_path: Option<PathBuf>,

    /// Abort on filter or recognition failure instead of degrading.
    /// Default: false.
    pub strict: bool,

    /// Receives stage events. Default: None.
    pub observer: Option<ObserverHandle>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            display_box: BoxKind::Art,
            filtering_box: BoxKind::Media,
            render_scale: 1.0,
            filter_spec: FilterSpec::ocr_default(),
            max_filter_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
            language: "eng".to_string(),
            tessdata_dir: None,
            recognition_level: RecognitionLevel::default(),
            region_level: RegionLevel::default(),
            password: None,
            pdfium_library_path: None,
            strict: false,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("display_box", &self.display_box)
            .field("filtering_box", &self.filtering_box)
            .field("render_scale", &self.render_scale)
            .field("filter_spec", &self.filter_spec)
            .field("max_filter_pixels", &self.max_filter_pixels)
            .field("language", &self.language)
            .field("tessdata_dir", &self.tessdata_dir)
            .field("recognition_level", &self.recognition_level)
            .field("region_level", &self.region_level)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("strict", &self.strict)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The box rendered for a request with the given filter flag.
    pub fn box_for(&self, filters_enabled: bool) -> BoxKind {
        if filters_enabled {
            self.filtering_box
        } else {
            self.display_box
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn display_box(mut self, kind: BoxKind) -> Self {
        self.config.display_box = kind;
        self
    }

    pub fn filtering_box(mut self, kind: BoxKind) -> Self {
        self.config.filtering_box = kind;
        self
    }

    /// Not clamped: out-of-range values are reported by `build()`.
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn filter_spec(mut self, spec: FilterSpec) -> Self {
        self.config.filter_spec = spec;
        self
    }

    pub fn max_filter_pixels(mut self, px: u64) -> Self {
        self.config.max_filter_pixels = px.max(1);
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tessdata_dir = Some(dir.into());
        self
    }

    pub fn recognition_level(mut self, level: RecognitionLevel) -> Self {
        self.config.recognition_level = level;
        self
    }

    pub fn region_level(mut self, level: RegionLevel) -> Self {
        self.config.region_level = level;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn strict(mut self, v: bool) -> Self {
        self.config.strict = v;
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if !c.render_scale.is_finite()
            || c.render_scale < MIN_RENDER_SCALE
            || c.render_scale > MAX_RENDER_SCALE
        {
            return Err(PipelineError::InvalidConfig(format!(
                "render scale must be {}–{}, got {}",
                MIN_RENDER_SCALE, MAX_RENDER_SCALE, c.render_scale
            )));
        }
        if c.language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        c.filter_spec
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(format!("filter spec: {}", e)))?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How much page layout analysis Tesseract runs before reading text.
///
/// This selects the page segmentation mode, not the recognition model.
/// `Fast` skips layout analysis and reads the whole image as one text block,
/// which is quicker and fine for simple single-column pages but merges
/// columns and tables.
///
/// | Level | Tesseract page segmentation |
/// |-------|-----------------------------|
/// | `Accurate` | 3: fully automatic layout analysis (default) |
/// | `Fast` | 6: one uniform block, no layout analysis |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionLevel {
    #[default]
    Accurate,
    Fast,
}

impl RecognitionLevel {
    /// Tesseract `tessedit_pageseg_mode` value.
    pub fn page_segmentation_mode(self) -> u32 {
        match self {
            RecognitionLevel::Accurate => 3,
            RecognitionLevel::Fast => 6,
        }
    }
}

/// Granularity of recognised regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    /// One region per text line. (default)
    #[default]
    Line,
    /// One region per word.
    Word,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filter::FilterStage;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.render_scale, 1.0);
        assert_eq!(c.language, "eng");
        assert_eq!(c.recognition_level, RecognitionLevel::Accurate);
        assert_eq!(c.region_level, RegionLevel::Line);
        assert_eq!(c.filter_spec, FilterSpec::ocr_default());
        assert!(!c.strict);
        assert!(c.observer.is_none());
    }

    #[test]
    fn filter_toggle_switches_between_media_and_art_boxes() {
        // Filtered and unfiltered requests analyse different page boxes by
        // default. A page whose art box is a sub-rectangle of the media box
        // therefore yields text from different regions depending on the toggle.
        let c = PipelineConfig::default();
        assert_eq!(c.box_for(true), BoxKind::Media);
        assert_eq!(c.box_for(false), BoxKind::Art);
    }

    #[test]
    fn boxes_can_be_unified() {
        let c = PipelineConfig::builder()
            .display_box(BoxKind::Crop)
            .filtering_box(BoxKind::Crop)
            .build()
            .unwrap();
        assert_eq!(c.box_for(true), c.box_for(false));
    }

    #[test]
    fn render_scale_out_of_range_is_rejected() {
        for bad in [0.0, 0.05, 9.0, f32::NAN, f32::INFINITY] {
            let err = PipelineConfig::builder().render_scale(bad).build().unwrap_err();
            assert!(matches!(err, PipelineError::InvalidConfig(_)), "scale {bad}");
        }
        assert!(PipelineConfig::builder().render_scale(8.0).build().is_ok());
    }

    #[test]
    fn empty_language_is_rejected() {
        assert!(PipelineConfig::builder().language("  ").build().is_err());
    }

    #[test]
    fn invalid_filter_spec_is_rejected_at_build() {
        let spec = FilterSpec {
            stages: vec![FilterStage::LanczosScale {
                scale: -3.0,
                aspect: 1.0,
            }],
        };
        let err = PipelineConfig::builder().filter_spec(spec).build().unwrap_err();
        assert!(err.to_string().contains("lanczos_scale"));
    }

    #[test]
    fn debug_redacts_password() {
        let c = PipelineConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn recognition_levels_map_to_segmentation_modes() {
        assert_eq!(RecognitionLevel::Accurate.page_segmentation_mode(), 3);
        assert_eq!(RecognitionLevel::Fast.page_segmentation_mode(), 6);
        assert_eq!(
            serde_json::to_string(&RecognitionLevel::Fast).unwrap(),
            "\"fast\""
        );
    }
}
