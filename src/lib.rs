//! # pdf-page-ocr
//!
//! Render one page of a PDF, optionally clean it up for OCR, and read its
//! text back.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF + page number
//!  │
//!  ├─ 1. Rasterize  render the page box via pdfium (spawn_blocking)
//!  ├─ 2. Filter     optional: Lanczos 3× upscale, then box blur radius 2
//!  ├─ 3. Recognize  Tesseract, top candidate per text line
//!  └─ 4. Assemble   lines + the analysed image + timings
//! ```
//!
//! With filters off the page's art box is rendered; with filters on the media
//! box is rendered and filtered. Both boxes are configurable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_page_ocr::{DocumentSource, PipelineConfig, PipelineCoordinator, PipelineRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = PipelineCoordinator::new(PipelineConfig::default());
//!     let source = DocumentSource::from_path("invoice.pdf")?;
//!
//!     let response = coordinator
//!         .run(PipelineRequest::new(source, 1).with_filters(true))
//!         .await?;
//!     println!("{}", response.lines().join("\n"));
//!     if let Some(err) = &response.recognition_error {
//!         eprintln!("OCR failed: {err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Runtime requirements
//!
//! * pdfium: found via `PDFIUM_LIB_PATH`, the working directory, or the
//!   system loader.
//! * Tesseract with the configured language data (`TESSDATA_PREFIX`).
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `page-ocr` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod coordinator;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, RecognitionLevel, RegionLevel};
pub use coordinator::{Delivery, PendingResponse, PipelineCoordinator, PipelineRequest};
pub use error::{DocumentOpenError, FilterError, PipelineError, RasterizationError, RecognitionError};
pub use output::{PipelineResponse, RecognitionResult, RegionBox, ResponseSummary, StageTimings, TextRegion};
pub use pipeline::filter::{FilterPipeline, FilterSpec, FilterStage};
pub use pipeline::raster::{ColorSpace, RasterImage};
pub use pipeline::recognize::{OcrEngine, TesseractEngine, TextRecognizer};
pub use pipeline::render::{BoxKind, BoxRect, DocumentInfo, PageBoxes, PageRasterizer, PdfiumRasterizer};
pub use pipeline::source::{select_source, DocumentSource, Selection};
pub use progress::{NoopObserver, ObserverHandle, PipelineObserver, RequestId, Stage};
