//! Streaming API: process many documents, emit each report as it finishes.
//!
//! At most `config.concurrency` runs are in flight at once. Reports arrive
//! in completion order, not submission order; match on `document_id`. A
//! failed run yields an `Err` outcome for that document only and never
//! stops the stream.

use crate::error::PipelineError;
use crate::model::OutputBundle;
use crate::orchestrator::Orchestrator;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// Outcome of one document's run.
#[derive(Debug)]
pub struct RunReport {
    pub document_id: String,
    pub outcome: Result<OutputBundle, PipelineError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// A boxed stream of run reports.
pub type ReportStream = Pin<Box<dyn Stream<Item = RunReport> + Send>>;

/// Process every id in `ids`, yielding reports as runs complete.
pub fn process_stream<I>(orchestrator: &Orchestrator, ids: I) -> ReportStream
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
{
    let concurrency = orchestrator.config().concurrency.max(1);
    let orch = orchestrator.clone();
    let s = stream::iter(ids.into_iter().map(move |id| {
        let orch = orch.clone();
        async move {
            let outcome = orch.process(&id).await;
            RunReport {
                document_id: id,
                outcome,
            }
        }
    }))
    .buffer_unordered(concurrency);
    Box::pin(s)
}

/// Collect [`process_stream`] into a vector, completion order.
pub async fn process_all<I>(orchestrator: &Orchestrator, ids: I) -> Vec<RunReport>
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
{
    let reports: Vec<RunReport> = process_stream(orchestrator, ids).collect().await;
    let ok = reports.iter().filter(|r| r.is_success()).count();
    info!("Processed {} documents: {} completed, {} failed", reports.len(), ok, reports.len() - ok);
    reports
}
