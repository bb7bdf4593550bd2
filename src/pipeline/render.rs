//! PDF rasterisation: render one page box to a `RasterImage` via pdfium.
//!
//! ## Which rectangle gets rendered?
//!
//! A PDF page carries up to five boxes (media, crop, bleed, trim, art) that
//! may all differ. The caller names a [`BoxKind`]; the page's media and crop
//! boxes are pointed at that rectangle on the in-memory document, then pdfium
//! renders its visible page at `render_scale` pixels per point. The output is
//! `box width × box height` pixels at scale 1.0, whatever the document's own
//! crop box is. `/Rotate` is honoured, so a page turned 90° or 270° comes out
//! `box height × box width`.
//! Boxes the document does not define fall back the way PDF viewers resolve
//! them: art/bleed/trim → crop → media.
//!
//! ## Blocking
//!
//! pdfium is a synchronous C++ library. Everything here is blocking; the
//! coordinator calls it from `tokio::task::spawn_blocking`.

use crate::error::{DocumentOpenError, RasterizationError};
use crate::pipeline::raster::RasterImage;
use crate::pipeline::source::DocumentSource;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Env var naming a pdfium shared library file, or a directory holding it.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// A named page rectangle. `Display` and serde both spell it `media`, `art`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxKind {
    /// Physical page size.
    Media,
    /// Region a viewer displays.
    Crop,
    /// Printing extent including bleed.
    Bleed,
    /// Intended finished page size.
    Trim,
    /// Extent of meaningful content.
    Art,
}

impl BoxKind {
    /// The box PDF viewers substitute when this one is absent.
    pub fn fallback(self) -> Option<BoxKind> {
        match self {
            BoxKind::Media => None,
            BoxKind::Crop => Some(BoxKind::Media),
            BoxKind::Bleed | BoxKind::Trim | BoxKind::Art => Some(BoxKind::Crop),
        }
    }
}

impl fmt::Display for BoxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoxKind::Media => "media",
            BoxKind::Crop => "crop",
            BoxKind::Bleed => "bleed",
            BoxKind::Trim => "trim",
            BoxKind::Art => "art",
        };
        f.write_str(s)
    }
}

impl FromStr for BoxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "media" | "media_box" | "mediabox" => Ok(BoxKind::Media),
            "crop" | "crop_box" | "cropbox" => Ok(BoxKind::Crop),
            "bleed" | "bleed_box" | "bleedbox" => Ok(BoxKind::Bleed),
            "trim" | "trim_box" | "trimbox" => Ok(BoxKind::Trim),
            "art" | "art_box" | "artbox" => Ok(BoxKind::Art),
            _ => Err(format!("unknown page box '{s}'")),
        }
    }
}

/// A rectangle in PDF user space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxRect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl BoxRect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    fn from_pdf_rect(rect: &PdfRect) -> Self {
        Self::new(rect.left.value, rect.bottom.value, rect.right.value, rect.top.value)
    }

    fn to_pdf_rect(self) -> PdfRect {
        PdfRect::new_from_values(self.bottom, self.left, self.top, self.right)
    }
}

/// Clockwise page rotation from the page's `/Rotate` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageRotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl PageRotation {
    /// Rotation from a `/Rotate` value in degrees. Non-multiples of 90 are
    /// ignored by viewers and treated as no rotation.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => PageRotation::Quarter,
            180 => PageRotation::Half,
            270 => PageRotation::ThreeQuarter,
            _ => PageRotation::None,
        }
    }

    /// Whether width and height trade places on screen.
    pub fn swaps_axes(self) -> bool {
        matches!(self, PageRotation::Quarter | PageRotation::ThreeQuarter)
    }

    fn of(page: &PdfPage) -> Self {
        match page.rotation() {
            Ok(PdfPageRenderRotation::Degrees90) => PageRotation::Quarter,
            Ok(PdfPageRenderRotation::Degrees180) => PageRotation::Half,
            Ok(PdfPageRenderRotation::Degrees270) => PageRotation::ThreeQuarter,
            _ => PageRotation::None,
        }
    }
}

/// Bitmap size for `target` rendered at `scale` pixels per point on a page
/// with `rotation`.
///
/// Returns `None` when the box rounds to zero pixels on either axis.
pub fn output_size(target: &BoxRect, rotation: PageRotation, scale: f32) -> Option<(u32, u32)> {
    let width = (target.width() * scale).round();
    let height = (target.height() * scale).round();
    if !(width >= 1.0 && height >= 1.0) || width > i32::MAX as f32 || height > i32::MAX as f32 {
        return None;
    }
    let (width, height) = (width as u32, height as u32);
    if rotation.swaps_axes() {
        Some((height, width))
    } else {
        Some((width, height))
    }
}

/// One page's resolved boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBoxes {
    /// 1-based page number.
    pub page_number: u16,
    pub media: BoxRect,
    pub crop: BoxRect,
    pub bleed: BoxRect,
    pub trim: BoxRect,
    pub art: BoxRect,
}

impl PageBoxes {
    pub fn get(&self, kind: BoxKind) -> BoxRect {
        match kind {
            BoxKind::Media => self.media,
            BoxKind::Crop => self.crop,
            BoxKind::Bleed => self.bleed,
            BoxKind::Trim => self.trim,
            BoxKind::Art => self.art,
        }
    }
}

/// Page count and per-page boxes of an opened document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub pages: Vec<PageBoxes>,
}

/// A validated reference to one page of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    number: u16,
}

impl PageHandle {
    /// Validate a 1-based page number against `page_count`.
    ///
    /// 0, negative numbers and numbers past the last page are all
    /// [`RasterizationError::PageOutOfRange`].
    pub fn resolve(page_number: i64, page_count: usize) -> Result<Self, RasterizationError> {
        let out_of_range = || RasterizationError::PageOutOfRange {
            page: page_number,
            total: page_count,
        };
        if page_number < 1 || page_number as u64 > page_count as u64 {
            return Err(out_of_range());
        }
        let number = u16::try_from(page_number).map_err(|_| out_of_range())?;
        Ok(Self { number })
    }

    /// 1-based page number.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// 0-based index as pdfium expects it.
    pub fn index(&self) -> u16 {
        self.number - 1
    }
}

/// Renders a single page box of a document.
///
/// Implementations are blocking and must not keep state between calls: each
/// call opens the document, renders, and releases it.
pub trait PageRasterizer: Send + Sync {
    /// Render `box_kind` of page `page_number` (1-based).
    fn render(
        &self,
        source: &DocumentSource,
        page_number: i64,
        box_kind: BoxKind,
    ) -> Result<RasterImage, RasterizationError>;

    /// Report page count and boxes without rendering.
    fn inspect(&self, source: &DocumentSource) -> Result<DocumentInfo, RasterizationError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
    password: Option<String>,
    render_scale: f32,
}

impl PdfiumRasterizer {
    pub fn new(library_path: Option<PathBuf>, password: Option<String>, render_scale: f32) -> Self {
        Self {
            library_path,
            password,
            render_scale,
        }
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(None, None, 1.0)
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render(
        &self,
        source: &DocumentSource,
        page_number: i64,
        box_kind: BoxKind,
    ) -> Result<RasterImage, RasterizationError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())?;
        let document = open_document(&pdfium, source, self.password.as_deref())?;

        let pages = document.pages();
        let handle = PageHandle::resolve(page_number, pages.len() as usize)?;
        let render_failed = |e: PdfiumError| RasterizationError::RenderFailed {
            page: handle.number(),
            detail: format!("{:?}", e),
        };
        let mut page = pages.get(handle.index()).map_err(render_failed)?;

        let boxes = read_boxes(&page, handle.number());
        let target = boxes.get(box_kind);
        let rotation = PageRotation::of(&page);
        let (width, height) = output_size(&target, rotation, self.render_scale).ok_or_else(|| {
            RasterizationError::DegenerateBox {
                page: handle.number(),
                box_kind: box_kind.to_string(),
                width: target.width(),
                height: target.height(),
            }
        })?;

        // pdfium renders the crop box clipped to the media box. Point both at
        // the target so any box, including one larger than the document's own
        // crop box, comes out whole. The document is never saved.
        let boundaries = page.boundaries_mut();
        boundaries
            .set_media(target.to_pdf_rect())
            .map_err(render_failed)?;
        boundaries
            .set_crop(target.to_pdf_rect())
            .map_err(render_failed)?;

        let render_config = PdfRenderConfig::new().set_target_size(width as i32, height as i32);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(render_failed)?;
        let rendered = bitmap.as_image().into_rgba8();

        debug!(
            "Rendered page {} {} ({:?}) → {}x{} px",
            handle.number(),
            box_kind,
            rotation,
            rendered.width(),
            rendered.height()
        );
        Ok(RasterImage::from_rgba(rendered))
    }

    fn inspect(&self, source: &DocumentSource) -> Result<DocumentInfo, RasterizationError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())?;
        let document = open_document(&pdfium, source, self.password.as_deref())?;

        let pages: Vec<PageBoxes> = document
            .pages()
            .iter()
            .enumerate()
            .map(|(idx, page)| read_boxes(&page, idx as u16 + 1))
            .collect();

        info!("PDF loaded: {} pages", pages.len());
        Ok(DocumentInfo {
            page_count: pages.len(),
            pages,
        })
    }
}

/// Read all five boxes of a page, applying PDF fallback rules for absent ones.
fn read_boxes(page: &PdfPage, page_number: u16) -> PageBoxes {
    let boundaries = page.boundaries();
    let raw = |kind: BoxKind| {
        let result = match kind {
            BoxKind::Media => boundaries.media(),
            BoxKind::Crop => boundaries.crop(),
            BoxKind::Bleed => boundaries.bleed(),
            BoxKind::Trim => boundaries.trim(),
            BoxKind::Art => boundaries.art(),
        };
        result.ok().map(|b| BoxRect::from_pdf_rect(&b.bounds))
    };

    // pdfium reports width and height as displayed; boxes are unrotated.
    let (w, h) = (page.width().value, page.height().value);
    let extent = if PageRotation::of(page).swaps_axes() {
        BoxRect::new(0.0, 0.0, h, w)
    } else {
        BoxRect::new(0.0, 0.0, w, h)
    };
    let resolve = |kind: BoxKind| {
        let mut next = Some(kind);
        while let Some(k) = next {
            if let Some(rect) = raw(k) {
                return rect;
            }
            next = k.fallback();
        }
        extent
    };

    PageBoxes {
        page_number,
        media: resolve(BoxKind::Media),
        crop: resolve(BoxKind::Crop),
        bleed: resolve(BoxKind::Bleed),
        trim: resolve(BoxKind::Trim),
        art: resolve(BoxKind::Art),
    }
}

/// Bind to pdfium: explicit path, then `PDFIUM_LIB_PATH`, then `./`, then
/// the system loader.
pub(crate) fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, DocumentOpenError> {
    let configured = library_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

    let bindings = match configured {
        Some(path) => Pdfium::bind_to_library(library_file(&path)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DocumentOpenError::EngineUnavailable(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// A directory resolves to the platform library name inside it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        let dir = path.to_string_lossy().to_string();
        PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&*dir))
    } else {
        path.to_path_buf()
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    source: &'a DocumentSource,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, DocumentOpenError> {
    let origin = source.describe();
    let loaded = match source {
        DocumentSource::Path(path) => pdfium.load_pdf_from_file(path, password),
        DocumentSource::Bytes(bytes) => pdfium.load_pdf_from_byte_slice(bytes, password),
    };

    loaded.map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                DocumentOpenError::WrongPassword { origin }
            } else {
                DocumentOpenError::PasswordRequired { origin }
            }
        } else {
            DocumentOpenError::Corrupt {
                origin,
                detail: err_str,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_zero_is_out_of_range() {
        let err = PageHandle::resolve(0, 3).unwrap_err();
        assert!(matches!(err, RasterizationError::PageOutOfRange { page: 0, total: 3 }));
    }

    #[test]
    fn negative_page_is_out_of_range() {
        assert!(PageHandle::resolve(-1, 3).unwrap_err().is_page_out_of_range());
        assert!(PageHandle::resolve(i64::MIN, 3).unwrap_err().is_page_out_of_range());
    }

    #[test]
    fn page_past_end_is_out_of_range() {
        assert!(PageHandle::resolve(4, 3).unwrap_err().is_page_out_of_range());
        assert!(PageHandle::resolve(1, 0).unwrap_err().is_page_out_of_range());
    }

    #[test]
    fn valid_pages_map_to_zero_based_index() {
        let first = PageHandle::resolve(1, 3).unwrap();
        assert_eq!((first.number(), first.index()), (1, 0));
        let last = PageHandle::resolve(3, 3).unwrap();
        assert_eq!((last.number(), last.index()), (3, 2));
    }

    #[test]
    fn box_fallback_chain_ends_at_media() {
        assert_eq!(BoxKind::Art.fallback(), Some(BoxKind::Crop));
        assert_eq!(BoxKind::Crop.fallback(), Some(BoxKind::Media));
        assert_eq!(BoxKind::Media.fallback(), None);
    }

    #[test]
    fn box_kind_parses_common_spellings() {
        assert_eq!("ArtBox".parse::<BoxKind>().unwrap(), BoxKind::Art);
        assert_eq!("media_box".parse::<BoxKind>().unwrap(), BoxKind::Media);
        assert_eq!("trim".parse::<BoxKind>().unwrap(), BoxKind::Trim);
        assert!("poster".parse::<BoxKind>().is_err());
    }

    #[test]
    fn box_kind_display_matches_serde() {
        for kind in [BoxKind::Media, BoxKind::Crop, BoxKind::Bleed, BoxKind::Trim, BoxKind::Art] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            assert_eq!(kind.to_string().parse::<BoxKind>().unwrap(), kind);
        }
        assert_eq!(BoxKind::Art.to_string(), "art");
    }

    #[test]
    fn rect_normalises_corners() {
        let r = BoxRect::new(100.0, 50.0, 10.0, 5.0);
        assert_eq!((r.left, r.bottom, r.right, r.top), (10.0, 5.0, 100.0, 50.0));
        assert_eq!((r.width(), r.height()), (90.0, 45.0));
    }

    #[test]
    fn output_size_matches_box_at_scale() {
        let art = BoxRect::new(36.0, 396.0, 576.0, 756.0);
        assert_eq!(output_size(&art, PageRotation::None, 1.0), Some((540, 360)));
        assert_eq!(output_size(&art, PageRotation::None, 2.0), Some((1080, 720)));
    }

    #[test]
    fn output_size_ignores_any_other_box() {
        // A media box is rendered whole even when the crop box is smaller.
        let media = BoxRect::new(0.0, 0.0, 612.0, 792.0);
        let crop = BoxRect::new(0.0, 0.0, 300.0, 400.0);
        assert_eq!(output_size(&media, PageRotation::None, 1.0), Some((612, 792)));
        assert_eq!(output_size(&crop, PageRotation::None, 1.0), Some((300, 400)));
    }

    #[test]
    fn quarter_turns_swap_output_axes() {
        let media = BoxRect::new(0.0, 0.0, 612.0, 792.0);
        assert_eq!(output_size(&media, PageRotation::Quarter, 1.0), Some((792, 612)));
        assert_eq!(output_size(&media, PageRotation::ThreeQuarter, 1.0), Some((792, 612)));
        assert_eq!(output_size(&media, PageRotation::Half, 1.0), Some((612, 792)));
    }

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(PageRotation::from_degrees(90), PageRotation::Quarter);
        assert_eq!(PageRotation::from_degrees(-90), PageRotation::ThreeQuarter);
        assert_eq!(PageRotation::from_degrees(540), PageRotation::Half);
        assert_eq!(PageRotation::from_degrees(45), PageRotation::None);
    }

    #[test]
    fn zero_area_box_has_no_output_size() {
        let flat = BoxRect::new(10.0, 10.0, 90.0, 10.0);
        assert_eq!(output_size(&flat, PageRotation::None, 1.0), None);
        let tiny = BoxRect::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(output_size(&tiny, PageRotation::None, 0.1), None);
    }

    #[test]
    fn page_boxes_lookup() {
        let media = BoxRect::new(0.0, 0.0, 612.0, 792.0);
        let art = BoxRect::new(0.0, 0.0, 306.0, 396.0);
        let boxes = PageBoxes {
            page_number: 1,
            media,
            crop: media,
            bleed: media,
            trim: media,
            art,
        };
        assert_eq!(boxes.get(BoxKind::Art), art);
        assert_eq!(boxes.get(BoxKind::Media), media);
    }
}
