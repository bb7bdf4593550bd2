//! Pipeline stages and the observer trait for per-stage events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as a
//! request moves through
//! `RASTERIZE → (FILTER) → RECOGNIZE → ASSEMBLE`.
//!
//! # Example
//!
//! ```rust
//! use pdf_page_ocr::{PipelineConfig, PipelineObserver, RequestId, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     finished: AtomicUsize,
//! }
//!
//! impl PipelineObserver for StageCounter {
//!     fn on_stage_complete(&self, _id: RequestId, stage: Stage, elapsed_ms: u64) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} took {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(StageCounter { finished: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier assigned to every request the coordinator accepts.
///
/// Ids increase monotonically per coordinator, so a caller that issued
/// several requests can tell which result is the most recent one and drop
/// the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of work inside one pipeline request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Rasterize,
    Filter,
    Recognize,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Rasterize => "rasterize",
            Stage::Filter => "filter",
            Stage::Recognize => "recognize",
            Stage::Assemble => "assemble",
        };
        f.write_str(s)
    }
}

/// Called by the coordinator as a request moves through its stages.
///
/// Implementations must be `Send + Sync`: stages run on blocking worker
/// threads and several requests may be in flight at once. All methods have
/// no-op defaults so callers only override what they care about.
pub trait PipelineObserver: Send + Sync {
    /// A stage is about to run.
    fn on_stage_start(&self, id: RequestId, stage: Stage) {
        let _ = (id, stage);
    }

    /// A stage finished successfully.
    fn on_stage_complete(&self, id: RequestId, stage: Stage, elapsed_ms: u64) {
        let _ = (id, stage, elapsed_ms);
    }

    /// A stage failed but the request continues with a fallback.
    fn on_stage_degraded(&self, id: RequestId, stage: Stage, error: &str) {
        let _ = (id, stage, error);
    }

    /// The request finished; `line_count` recognised lines were produced.
    fn on_request_complete(&self, id: RequestId, line_count: usize) {
        let _ = (id, line_count);
    }

    /// The request was aborted by a failure in `stage`.
    fn on_request_failed(&self, id: RequestId, stage: Stage, error: &str) {
        let _ = (id, stage, error);
    }
}

/// An observer that ignores every event.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ObserverHandle = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl PipelineObserver for Recording {
        fn on_stage_start(&self, id: RequestId, stage: Stage) {
            self.events.lock().unwrap().push(format!("{id} start {stage}"));
        }

        fn on_stage_degraded(&self, id: RequestId, stage: Stage, error: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{id} degraded {stage}: {error}"));
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_stage_start(RequestId(1), Stage::Rasterize);
        o.on_stage_complete(RequestId(1), Stage::Rasterize, 12);
        o.on_stage_degraded(RequestId(1), Stage::Filter, "nope");
        o.on_request_complete(RequestId(1), 3);
        o.on_request_failed(RequestId(2), Stage::Rasterize, "bad page");
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recording::default();
        rec.on_stage_start(RequestId(7), Stage::Recognize);
        rec.on_stage_degraded(RequestId(7), Stage::Recognize, "engine down");
        rec.on_request_complete(RequestId(7), 0);

        let events = rec.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "#7 start recognize".to_string(),
                "#7 degraded recognize: engine down".to_string(),
            ]
        );
    }

    #[test]
    fn stage_serialises_snake_case() {
        assert_eq!(serde_json::to_string(&Stage::Rasterize).unwrap(), "\"rasterize\"");
        assert_eq!(Stage::Assemble.to_string(), "assemble");
    }

    #[test]
    fn request_ids_order() {
        assert!(RequestId(1) < RequestId(2));
        let handle: ObserverHandle = Arc::new(NoopObserver);
        handle.on_request_complete(RequestId(2), 1);
    }
}
