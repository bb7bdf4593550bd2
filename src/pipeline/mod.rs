//! Pipeline stages for single-page OCR.
//!
//! Each submodule implements one step and is independently testable. All of
//! them are synchronous; [`crate::coordinator`] moves them onto blocking
//! worker threads.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ render ──▶ filter ──▶ recognize
//! (path/bytes) (pdfium)  (optional)  (tesseract)
//! ```
//!
//! 1. [`source`]: validate a path or byte buffer as a PDF
//! 2. [`render`]: rasterise one page box via pdfium
//! 3. [`filter`]: Lanczos upscale then box blur, driven by a `FilterSpec`
//! 4. [`recognize`]: run the OCR engine, keep the top candidate per region
//!
//! [`raster`] holds the image type passed between stages.

pub mod filter;
pub mod raster;
pub mod recognize;
pub mod render;
pub mod source;
