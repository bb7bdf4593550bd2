//! Error types for the pdf-page-ocr library.
//!
//! Failures fall into two families:
//!
//! * **Structural**: the request cannot produce anything meaningful (the
//!   document is missing or corrupt, the page number does not exist). These
//!   are [`DocumentOpenError`] and [`RasterizationError`], and they abort the
//!   request as `Err(PipelineError)`.
//!
//! * **Degradable**: a later stage failed but a safe fallback exists
//!   ([`FilterError`] → continue unfiltered, [`RecognitionError`] → empty
//!   text). These are `Clone + Serialize` so the coordinator can record them
//!   inside [`crate::output::PipelineResponse`] instead of discarding the
//!   whole request.
//!
//! [`PipelineError`] is what callers of the coordinator see. It always names
//! the [`Stage`] the failure originated in.

use crate::progress::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The PDF source could not be opened.
#[derive(Debug, Error)]
pub enum DocumentOpenError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The source was read but does not start with the `%PDF` magic bytes.
    #[error("Source '{origin}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { origin: String, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{origin}' is corrupt: {detail}")]
    Corrupt { origin: String, detail: String },

    /// PDF requires a password but none was configured.
    #[error("PDF '{origin}' is encrypted and requires a password.")]
    PasswordRequired { origin: String },

    /// A password was configured but it is wrong.
    #[error("Wrong password for PDF '{origin}'")]
    WrongPassword { origin: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory), or install\n\
pdfium system-wide so it can be found by the dynamic loader.\n"
    )]
    EngineUnavailable(String),
}

/// Rendering one page into a [`crate::pipeline::raster::RasterImage`] failed.
#[derive(Debug, Error)]
pub enum RasterizationError {
    /// The document could not be opened.
    #[error(transparent)]
    Open(#[from] DocumentOpenError),

    /// The 1-based page number is zero, negative or beyond the last page.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: i64, total: usize },

    /// The requested box rounds to zero pixels on one axis.
    #[error("Page {page}: {box_kind} has zero area ({width}x{height} pt)")]
    DegenerateBox {
        page: u16,
        box_kind: String,
        width: f32,
        height: f32,
    },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: u16, detail: String },
}

impl RasterizationError {
    /// `true` when the caller asked for a page the document does not have.
    pub fn is_page_out_of_range(&self) -> bool {
        matches!(self, RasterizationError::PageOutOfRange { .. })
    }
}

/// The image filter pipeline could not produce an output.
///
/// Recoverable: the coordinator falls back to the unfiltered branch.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FilterError {
    /// The input image has zero width or height; no stage was run.
    #[error("Cannot filter an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    /// A stage parameter is out of its valid domain.
    #[error("Invalid parameter for '{op}': {detail}")]
    InvalidParameter { op: String, detail: String },

    /// A stage would allocate more pixels than the configured cap.
    #[error("'{op}' output of {width}x{height} exceeds the {max_pixels} pixel cap")]
    OutputTooLarge {
        op: String,
        width: u64,
        height: u64,
        max_pixels: u64,
    },

    /// The filter worker died before returning an image.
    #[error("Filtering aborted: {detail}")]
    Aborted { detail: String },
}

/// The OCR engine failed on an image.
///
/// Recoverable: the coordinator yields an empty recognition result and keeps
/// this error alongside it.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RecognitionError {
    /// The engine could not be initialised (missing language data etc.).
    #[error("OCR engine '{engine}' failed to initialise: {detail}")]
    EngineInit { engine: String, detail: String },

    /// The image could not be handed to the engine.
    #[error("OCR engine '{engine}' rejected the image: {detail}")]
    UnsupportedImage { engine: String, detail: String },

    /// The engine failed while recognising text.
    #[error("OCR engine '{engine}' failed: {detail}")]
    Engine { engine: String, detail: String },
}

/// All errors returned by [`crate::coordinator::PipelineCoordinator`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rendering the page failed; the request cannot continue.
    #[error("rasterize stage failed: {0}")]
    Rasterize(#[from] RasterizationError),

    /// Filtering failed and strict mode forbids degrading.
    #[error("filter stage failed: {0}")]
    Filter(#[from] FilterError),

    /// Recognition failed and strict mode forbids degrading.
    #[error("recognize stage failed: {0}")]
    Recognize(#[from] RecognitionError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking worker panicked or its result was lost.
    #[error("Internal error in {stage} stage: {detail}")]
    Internal { stage: Stage, detail: String },

    /// No async runtime could be created for a synchronous call.
    #[error("Failed to create tokio runtime: {0}")]
    Runtime(String),
}

impl PipelineError {
    /// The stage the failure originated in, if it came from one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Rasterize(_) => Some(Stage::Rasterize),
            PipelineError::Filter(_) => Some(Stage::Filter),
            PipelineError::Recognize(_) => Some(Stage::Recognize),
            PipelineError::InvalidConfig(_) | PipelineError::Runtime(_) => None,
            PipelineError::Internal { stage, .. } => Some(*stage),
        }
    }

    /// `true` for bad document / bad page failures.
    pub fn is_structural(&self) -> bool {
        matches!(self, PipelineError::Rasterize(_))
    }
}

impl From<DocumentOpenError> for PipelineError {
    fn from(e: DocumentOpenError) -> Self {
        PipelineError::Rasterize(RasterizationError::Open(e))
    }
}
