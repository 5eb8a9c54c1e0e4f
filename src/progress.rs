//! Observer trait for per-stage pipeline events.
//!
//! Pass an [`Arc<dyn PipelineObserver>`] to
//! [`crate::Orchestrator::with_observer`] to receive events as each document
//! moves through parse, classify, extract and analyze. The CLI uses this to
//! drive its spinners; a service could forward events to a channel instead.
//!
//! # Example
//!
//! ```rust
//! use pitchlens::PipelineObserver;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     done: AtomicUsize,
//! }
//!
//! impl PipelineObserver for CountingObserver {
//!     fn on_stage_complete(&self, document_id: &str, stage: &str) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{document_id}: {stage} done");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the orchestrator as a run progresses.
///
/// Runs for different documents may execute concurrently, so methods can be
/// called from several tasks at once. Every method has a no-op default.
pub trait PipelineObserver: Send + Sync {
    /// A run is starting for `filename`.
    fn on_run_start(&self, document_id: &str, filename: &str) {
        let _ = (document_id, filename);
    }

    fn on_stage_start(&self, document_id: &str, stage: &str) {
        let _ = (document_id, stage);
    }

    fn on_stage_complete(&self, document_id: &str, stage: &str) {
        let _ = (document_id, stage);
    }

    /// The stage fell back to degraded output; the run continues.
    fn on_stage_degraded(&self, document_id: &str, stage: &str, cause: &str) {
        let _ = (document_id, stage, cause);
    }

    /// The stage failed and the run is about to be marked failed.
    fn on_stage_failed(&self, document_id: &str, stage: &str, error: &str) {
        let _ = (document_id, stage, error);
    }

    /// Called once per run. `confidence` is `None` when the run failed.
    fn on_run_complete(&self, document_id: &str, confidence: Option<f64>) {
        let _ = (document_id, confidence);
    }
}

/// The default observer.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

pub type SharedObserver = Arc<dyn PipelineObserver>;
