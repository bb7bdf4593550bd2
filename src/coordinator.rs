//! Request orchestration: rasterize → (filter) → recognize → assemble.
//!
//! One request is one task. Every stage is blocking FFI or CPU-bound pixel
//! work, so each runs on `tokio::task::spawn_blocking` and the async caller
//! is never blocked.
//!
//! ## Degradation
//!
//! Bad documents and bad page numbers abort the request. Everything after
//! rasterisation has a fallback:
//!
//! * filter failure → re-render at the display box and continue unfiltered;
//! * recognition failure (including an engine panic) → empty text.
//!
//! The error that caused the fallback is kept on the response. With
//! `strict` set, both fall-backs become hard errors instead.

use crate::config::PipelineConfig;
use crate::error::{FilterError, PipelineError, RasterizationError, RecognitionError};
use crate::output::{PipelineResponse, RecognitionResult, StageTimings};
use crate::pipeline::filter::FilterPipeline;
use crate::pipeline::raster::RasterImage;
use crate::pipeline::recognize::{OcrEngine, TesseractEngine, TextRecognizer};
use crate::pipeline::render::{BoxKind, DocumentInfo, PageRasterizer, PdfiumRasterizer};
use crate::pipeline::source::DocumentSource;
use crate::progress::{NoopObserver, PipelineObserver, RequestId, Stage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One page to process.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source: DocumentSource,
    /// 1-based. Zero and negative values are rejected as out of range.
    pub page_number: i64,
    pub filters_enabled: bool,
}

impl PipelineRequest {
    /// A request with filters off.
    pub fn new(source: DocumentSource, page_number: i64) -> Self {
        Self {
            source,
            page_number,
            filters_enabled: false,
        }
    }

    pub fn with_filters(mut self, enabled: bool) -> Self {
        self.filters_enabled = enabled;
        self
    }
}

/// Message sent by [`PipelineCoordinator::submit_to`].
#[derive(Debug)]
pub struct Delivery {
    pub request_id: RequestId,
    pub result: Result<PipelineResponse, PipelineError>,
}

/// Handle to a request started with [`PipelineCoordinator::submit`].
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    rx: oneshot::Receiver<Result<PipelineResponse, PipelineError>>,
}

impl PendingResponse {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the request to finish.
    pub async fn wait(self) -> Result<PipelineResponse, PipelineError> {
        self.rx.await.map_err(|_| PipelineError::Internal {
            stage: Stage::Assemble,
            detail: format!("request {} was dropped before completing", self.id),
        })?
    }
}

/// Runs page OCR requests.
///
/// Cheap to clone; clones share the request id counter.
#[derive(Clone)]
pub struct PipelineCoordinator {
    config: Arc<PipelineConfig>,
    rasterizer: Arc<dyn PageRasterizer>,
    recognizer: TextRecognizer,
    filters: FilterPipeline,
    next_id: Arc<AtomicU64>,
}

impl PipelineCoordinator {
    /// Coordinator using pdfium and Tesseract as configured.
    pub fn new(config: PipelineConfig) -> Self {
        let rasterizer = PdfiumRasterizer::new(
            config.pdfium_library_path.clone(),
            config.password.clone(),
            config.render_scale,
        );
        let engine = TesseractEngine {
            language: config.language.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
            level: config.recognition_level,
            region_level: config.region_level,
        };
        Self::with_components(config, Arc::new(rasterizer), Arc::new(engine))
    }

    /// Coordinator with caller-supplied rasterizer and OCR engine.
    pub fn with_components(
        config: PipelineConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        engine: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            filters: FilterPipeline::new(config.max_filter_pixels),
            config: Arc::new(config),
            rasterizer,
            recognizer: TextRecognizer::new(engine),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one request and return its response.
    ///
    /// # Errors
    /// Returns `Err` only when the document cannot be opened, the page does
    /// not exist, the rasterizer worker panics, or strict mode is on
    /// and a later stage failed.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        let id = self.next_request_id();
        self.execute(id, request).await
    }

    /// Synchronous wrapper around [`run`](Self::run).
    ///
    /// Creates a private runtime; do not call from inside an async context.
    pub fn run_sync(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| PipelineError::Runtime(e.to_string()))?
            .block_on(self.run(request))
    }

    /// Start a request in the background.
    ///
    /// Must be called from within a Tokio runtime. The request runs to
    /// completion even if a newer one is submitted.
    pub fn submit(&self, request: PipelineRequest) -> PendingResponse {
        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        tokio::spawn(async move {
            // The receiver may have been dropped; nothing else wants the result.
            let _ = tx.send(this.execute(id, request).await);
        });
        PendingResponse { id, rx }
    }

    /// Start a request in the background and send its result to `consumer`.
    ///
    /// Exactly one [`Delivery`] is sent per call. Must be called from within
    /// a Tokio runtime.
    pub fn submit_to(&self, request: PipelineRequest, consumer: mpsc::Sender<Delivery>) -> RequestId {
        let id = self.next_request_id();
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.execute(id, request).await;
            if consumer
                .send(Delivery {
                    request_id: id,
                    result,
                })
                .await
                .is_err()
            {
                debug!("Request {}: consumer channel closed, result dropped", id);
            }
        });
        id
    }

    /// Page count and boxes of a document, without rendering.
    pub async fn inspect(&self, source: DocumentSource) -> Result<DocumentInfo, PipelineError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        tokio::task::spawn_blocking(move || rasterizer.inspect(&source))
            .await
            .map_err(|e| PipelineError::Internal {
                stage: Stage::Rasterize,
                detail: format!("inspect task panicked: {}", e),
            })?
            .map_err(PipelineError::from)
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn observer(&self) -> &dyn PipelineObserver {
        match &self.config.observer {
            Some(o) => o.as_ref(),
            None => &NoopObserver,
        }
    }

    async fn execute(&self, id: RequestId, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        info!(
            "Request {}: page {} of {} (filters {})",
            id,
            request.page_number,
            request.source.describe(),
            if request.filters_enabled { "on" } else { "off" }
        );

        let result = self.process(id, &request).await;
        match &result {
            Ok(response) => {
                info!(
                    "Request {}: {} text regions in {}ms{}",
                    id,
                    response.recognition.len(),
                    response.timings.total_ms,
                    if response.is_degraded() { " (degraded)" } else { "" }
                );
                self.observer().on_request_complete(id, response.recognition.len());
            }
            Err(e) => {
                warn!("Request {} failed: {}", id, e);
                self.observer()
                    .on_request_failed(id, e.stage().unwrap_or(Stage::Assemble), &e.to_string());
            }
        }
        result
    }

    async fn process(&self, id: RequestId, request: &PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        let total_start = Instant::now();
        let mut timings = StageTimings::default();

        // ── Rasterize ────────────────────────────────────────────────────
        let mut box_kind = self.config.box_for(request.filters_enabled);
        let (rendered, ms) = self
            .rasterize(id, &request.source, request.page_number, box_kind)
            .await?;
        timings.rasterize_ms = ms;

        // ── Filter ───────────────────────────────────────────────────────
        let mut filters_applied = false;
        let mut filter_error = None;
        let image = if request.filters_enabled {
            let start = Instant::now();
            self.observer().on_stage_start(id, Stage::Filter);

            let filters = self.filters;
            let spec = self.config.filter_spec.clone();
            let input = rendered.clone();
            let outcome = tokio::task::spawn_blocking(move || filters.apply(&input, &spec))
                .await
                .unwrap_or_else(|e| Err(filter_aborted(e)));
            let ms = start.elapsed().as_millis() as u64;
            timings.filter_ms = Some(ms);

            match outcome {
                Ok(filtered) => {
                    self.observer().on_stage_complete(id, Stage::Filter, ms);
                    filters_applied = true;
                    filtered
                }
                Err(e) if self.config.strict => return Err(e.into()),
                Err(e) => {
                    warn!("Request {}: filtering failed, continuing unfiltered: {}", id, e);
                    self.observer().on_stage_degraded(id, Stage::Filter, &e.to_string());
                    filter_error = Some(e);

                    box_kind = self.config.display_box;
                    let (display, ms) = self
                        .rasterize(id, &request.source, request.page_number, box_kind)
                        .await?;
                    timings.rasterize_ms += ms;
                    display
                }
            }
        } else {
            rendered
        };

        // ── Recognize ────────────────────────────────────────────────────
        let start = Instant::now();
        self.observer().on_stage_start(id, Stage::Recognize);
        let recognizer = self.recognizer.clone();
        let input = image.clone();
        let outcome = tokio::task::spawn_blocking(move || recognizer.recognize(&input))
            .await
            .unwrap_or_else(|e| {
                Err(RecognitionError::Engine {
                    engine: self.recognizer.engine_name().to_string(),
                    detail: format!("engine panicked: {}", e),
                })
            });
        let ms = start.elapsed().as_millis() as u64;
        timings.recognize_ms = ms;

        let (recognition, recognition_error) = match outcome {
            Ok(result) => {
                self.observer().on_stage_complete(id, Stage::Recognize, ms);
                (result, None)
            }
            Err(e) if self.config.strict => return Err(e.into()),
            Err(e) => {
                warn!("Request {}: recognition failed, returning no text: {}", id, e);
                self.observer().on_stage_degraded(id, Stage::Recognize, &e.to_string());
                (RecognitionResult::default(), Some(e))
            }
        };

        // ── Assemble ─────────────────────────────────────────────────────
        // Rasterisation succeeded, so the page number fits a PageHandle.
        let page_number = u16::try_from(request.page_number).map_err(|_| {
            PipelineError::from(RasterizationError::PageOutOfRange {
                page: request.page_number,
                total: 0,
            })
        })?;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        Ok(PipelineResponse {
            request_id: id,
            page_number,
            recognition,
            image,
            box_kind,
            filters_applied,
            filter_error,
            recognition_error,
            timings,
        })
    }

    async fn rasterize(
        &self,
        id: RequestId,
        source: &DocumentSource,
        page_number: i64,
        box_kind: BoxKind,
    ) -> Result<(RasterImage, u64), PipelineError> {
        let start = Instant::now();
        self.observer().on_stage_start(id, Stage::Rasterize);

        let rasterizer = Arc::clone(&self.rasterizer);
        let source = source.clone();
        let image = tokio::task::spawn_blocking(move || rasterizer.render(&source, page_number, box_kind))
            .await
            .map_err(|e| PipelineError::Internal {
                stage: Stage::Rasterize,
                detail: format!("render task panicked: {}", e),
            })??;

        let ms = start.elapsed().as_millis() as u64;
        debug!(
            "Request {}: rendered {} at {}x{} in {}ms",
            id,
            box_kind,
            image.width(),
            image.height(),
            ms
        );
        self.observer().on_stage_complete(id, Stage::Rasterize, ms);
        Ok((image, ms))
    }
}

/// A filter worker that panicked is a filter failure like any other: the
/// request degrades to the unfiltered branch.
fn filter_aborted(e: tokio::task::JoinError) -> FilterError {
    FilterError::Aborted {
        detail: format!("filter task panicked: {}", e),
    }
}
