//! Immutable raster images passed between pipeline stages.
//!
//! A [`RasterImage`] wraps an RGBA8 buffer behind an `Arc`, so handing the
//! same page to the filter stage, the OCR stage and back to the caller costs
//! a reference-count bump rather than a multi-megabyte copy. No `&mut`
//! access is exposed: every transform builds a new image.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Pixel layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    /// Non-premultiplied sRGB with alpha, 8 bits per channel.
    #[default]
    Rgba8,
}

impl ColorSpace {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ColorSpace::Rgba8 => 4,
        }
    }
}

/// A width×height pixel buffer produced by rasterisation or filtering.
#[derive(Clone, PartialEq)]
pub struct RasterImage {
    pixels: Arc<RgbaImage>,
    color_space: ColorSpace,
}

impl RasterImage {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
            color_space: ColorSpace::Rgba8,
        }
    }

    /// Convert any decoded image into RGBA8.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::from_rgba(image.into_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// `true` when the image has zero width or zero height.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Borrow the underlying pixel buffer.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.pixels.as_ref().clone())
    }

    /// Encode as PNG.
    ///
    /// PNG is lossless; JPEG artefacts around glyph edges would make the
    /// displayed image disagree with what the OCR engine actually read.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        debug!(
            "Encoded {}x{} image → {} bytes PNG",
            self.width(),
            self.height(),
            buf.len()
        );
        Ok(buf)
    }

    /// Encode as a base64 PNG, ready for a `data:image/png;base64,` URI.
    pub fn encode_png_base64(&self) -> Result<String, image::ImageError> {
        Ok(STANDARD.encode(self.encode_png()?))
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("color_space", &self.color_space)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    #[test]
    fn dynamic_images_become_rgba() {
        let rgb = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let img = RasterImage::from_dynamic(DynamicImage::ImageRgb8(rgb));
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.color_space(), ColorSpace::Rgba8);
        assert_eq!(img.pixels().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn zero_area_is_empty() {
        assert!(RasterImage::from_rgba(RgbaImage::new(0, 10)).is_empty());
        assert!(RasterImage::from_rgba(RgbaImage::new(10, 0)).is_empty());
        assert!(!RasterImage::from_rgba(RgbaImage::new(1, 1)).is_empty());
    }

    #[test]
    fn clones_share_pixels() {
        let img = RasterImage::from_rgba(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4])));
        let copy = img.clone();
        assert!(Arc::ptr_eq(&img.pixels, &copy.pixels));
        assert_eq!(img, copy);
    }

    #[test]
    fn encode_small_image() {
        let img = RasterImage::from_rgba(RgbaImage::from_pixel(10, 6, Rgba([255, 0, 0, 255])));
        let png = img.encode_png().expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");

        let decoded = image::load_from_memory(&png).expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (10, 6));

        let b64 = img.encode_png_base64().unwrap();
        assert_eq!(STANDARD.decode(b64).unwrap(), png);
    }

    #[test]
    fn debug_omits_pixels() {
        let img = RasterImage::from_rgba(RgbaImage::new(2, 2));
        let s = format!("{img:?}");
        assert!(s.contains("width: 2"));
        assert!(!s.contains("ImageBuffer"));
    }
}
