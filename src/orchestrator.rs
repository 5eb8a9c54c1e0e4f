//! Orchestrator: one document through parse → classify → extract → analyze.
//!
//! ## Lifecycle
//!
//! ```text
//! ingest ──▶ Queued ──process──▶ Processing ──▶ Completed
//!                                           └──▶ Failed
//! ```
//!
//! * Upload validation runs before any write; a rejected upload leaves no
//!   trace in the store.
//! * Parse, extract and persistence failures are fatal: the document moves
//!   to `Failed` with the error text stored verbatim and no result is kept.
//! * Classify and analyze never fail a run. Their degraded output is
//!   recorded in the audit metadata and the run continues.
//! * A `Completed` document may be processed again. The re-run appends a
//!   new [`ResultRecord`] and a fresh audit sequence; the status never moves
//!   backwards, and a failed re-run leaves the document `Completed`.
//!
//! Stages inside one run are strictly sequential. Different documents run
//! independently; [`Orchestrator`] is cheap to clone and every clone shares
//! the same store, gateway and in-flight set.

use crate::audit::{meta, AuditLog, StageSpan};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, StoreError};
use crate::gateway::LlmGateway;
use crate::model::{
    AuditEntry, ConfidenceSummary, Document, DocumentMetadata, DocumentStatus, OutputBundle,
    ParsedDocument, ResultRecord,
};
use crate::pipeline::{Analyzer, Classifier, DeckParser, DocumentParser, Extractor};
use crate::progress::{NoopObserver, SharedObserver};
use crate::store::Store;
use crate::upload::validate_upload;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Number of stages a successful run completes.
const PHASES: u32 = 4;

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    parser: Arc<dyn DocumentParser>,
    gateway: LlmGateway,
    config: PipelineConfig,
    observer: SharedObserver,
    audit: AuditLog,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("gateway", &self.gateway)
            .field("concurrency", &self.config.concurrency)
            .finish_non_exhaustive()
    }
}

/// Removes a document from the in-flight set when the run ends, however it
/// ends.
struct RunClaim {
    id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.id);
    }
}

impl Orchestrator {
    /// Orchestrator with the default [`DeckParser`] and no observer.
    pub fn new(store: Arc<dyn Store>, gateway: LlmGateway, config: PipelineConfig) -> Self {
        Self {
            audit: AuditLog::new(store.clone()),
            store,
            parser: Arc::new(DeckParser),
            gateway,
            config,
            observer: Arc::new(NoopObserver),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ── Upload ──────────────────────────────────────────────────────────────

    /// Validate and store an upload. Returns the new `Queued` document.
    pub async fn ingest(&self, bytes: &[u8], filename: &str) -> Result<Document, PipelineError> {
        let accepted = validate_upload(filename, bytes.len() as u64, &self.config)?;
        let doc = Document::new(filename, accepted.size_bytes, accepted.kind);

        self.store.put_blob(&doc.id, bytes).await?;
        if let Err(e) = self.store.put_document(&doc).await {
            if let Err(cleanup) = self.store.delete_blob(&doc.id).await {
                warn!("[{}] Could not remove upload bytes: {}", doc.id, cleanup);
            }
            return Err(e.into());
        }
        self.audit
            .record(
                &doc.id,
                "upload",
                meta(json!({"filename": filename, "size": accepted.size_bytes})),
            )
            .await?;
        info!("[{}] Ingested {} ({} bytes)", doc.id, filename, accepted.size_bytes);
        Ok(doc)
    }

    // ── Processing ──────────────────────────────────────────────────────────

    /// Run `process` on the tokio runtime.
    pub fn submit(&self, id: &str) -> JoinHandle<Result<OutputBundle, PipelineError>> {
        let this = self.clone();
        let id = id.to_string();
        tokio::spawn(async move { this.process(&id).await })
    }

    /// Run every stage for document `id` and persist the result.
    pub async fn process(&self, id: &str) -> Result<OutputBundle, PipelineError> {
        let _claim = self.claim(id)?;
        let mut doc = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound { id: id.to_string() })?;

        let rerun = doc.status == DocumentStatus::Completed;
        if !rerun && !doc.status.can_transition_to(DocumentStatus::Processing) {
            let hint = match doc.status {
                DocumentStatus::Processing => "a run is already in progress",
                _ => "failed documents must be uploaded again",
            };
            return Err(invalid(&doc, hint));
        }

        let run = doc.runs + 1;
        if !rerun {
            doc.status = DocumentStatus::Processing;
            doc.processing_started_at = Some(Utc::now());
            self.store.put_document(&doc).await?;
        }
        info!(
            "[{}] Run {} started for {} via {}",
            id,
            run,
            doc.filename,
            self.gateway.backend_name()
        );
        self.observer.on_run_start(id, &doc.filename);
        let run_span = match self.audit.begin(id, "processing").await {
            Ok(span) => span,
            Err(e) => {
                let e = PipelineError::from(e);
                self.record_failure(&mut doc, rerun, None, &e).await;
                return Err(e);
            }
        };

        let outcome = match self.run_stages(&mut doc).await {
            Ok(bundle) => self.persist_success(&mut doc, run, bundle).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(bundle) => {
                let confidence = bundle.confidence.overall;
                if let Err(e) = self
                    .audit
                    .complete(
                        &run_span,
                        meta(json!({"confidence": confidence, "phases_completed": PHASES})),
                    )
                    .await
                {
                    error!("[{}] Result stored but run audit entry failed: {}", id, e);
                }
                self.observer.on_run_complete(id, Some(confidence));
                info!("[{}] Run {} completed, confidence {:.2}", id, run, confidence);
                Ok(bundle)
            }
            Err(e) => {
                self.record_failure(&mut doc, rerun, Some(&run_span), &e).await;
                Err(e)
            }
        }
    }

    fn claim(&self, id: &str) -> Result<RunClaim, PipelineError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(id.to_string()) {
            return Err(PipelineError::InvalidTransition {
                id: id.to_string(),
                status: DocumentStatus::Processing.to_string(),
                hint: "a run is already in progress".into(),
            });
        }
        Ok(RunClaim {
            id: id.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }

    async fn run_stages(&self, doc: &mut Document) -> Result<OutputBundle, PipelineError> {
        let id = doc.id.clone();
        let id = id.as_str();

        // Parse (fatal)
        let span = self.begin_stage(id, "parse").await?;
        let parsed = match self.load_and_parse(doc).await {
            Ok(p) => p,
            Err(e) => return Err(self.fail_stage(&span, e).await),
        };
        if parsed.kind != doc.file_type {
            info!(
                "[{}] Recording detected type {} (declared {})",
                id,
                parsed.kind.as_str(),
                doc.file_type.as_str()
            );
            doc.file_type = parsed.kind;
            self.store.put_document(doc).await?;
        }
        self.complete_stage(
            &span,
            json!({
                "method": parsed.extraction_method,
                "slides": parsed.page_count(),
                "file_type": parsed.kind.as_str(),
            }),
        )
        .await?;

        // Classify (degrades)
        let span = self.begin_stage(id, "classify").await?;
        let classified = Classifier::new(self.gateway.clone(), &self.config)
            .classify(&parsed.pages)
            .await;
        let classification_meta = {
            let c = classified.data();
            json!({
                "method": c.method,
                "sections_found": c.section_map.sections_found(),
                "confidence": c.confidence,
                "degraded": classified.is_degraded(),
                "cause": classified.cause(),
            })
        };
        if let Some(cause) = classified.cause() {
            self.observer.on_stage_degraded(id, "classify", cause);
        }
        self.complete_stage(&span, classification_meta).await?;
        let classification = classified.into_data();

        // Extract (fatal)
        let span = self.begin_stage(id, "extract").await?;
        let extraction = match Extractor::new(self.gateway.clone(), &self.config)
            .extract(&parsed.pages, &classification.section_map)
            .await
        {
            Ok(x) => x,
            Err(e) => return Err(self.fail_stage(&span, e.into()).await),
        };
        self.complete_stage(
            &span,
            json!({
                "method": extraction.method,
                "confidence": extraction.overall_confidence,
                "team_members": extraction.data.team.len(),
            }),
        )
        .await?;

        // Analyze (degrades)
        let span = self.begin_stage(id, "analyze").await?;
        let analyzed = Analyzer::new(self.gateway.clone(), &self.config)
            .analyze(&extraction.data)
            .await;
        let analysis_meta = {
            let a = analyzed.data();
            json!({
                "method": self.gateway.model(),
                "green_flags": a.investment_signals.green_flags.len(),
                "red_flags": a.investment_signals.red_flags.len(),
                "yellow_flags": a.investment_signals.yellow_flags.len(),
                "recommendation": a.investment_recommendation.recommendation.map(|r| r.as_str()),
                "degraded": analyzed.is_degraded(),
                "cause": analyzed.cause(),
            })
        };
        if let Some(cause) = analyzed.cause() {
            self.observer.on_stage_degraded(id, "analyze", cause);
        }
        self.complete_stage(&span, analysis_meta).await?;

        Ok(OutputBundle {
            document_metadata: DocumentMetadata {
                document_id: doc.id.clone(),
                filename: doc.filename.clone(),
                total_slides: parsed.page_count(),
                extraction_method: parsed.extraction_method,
            },
            classification,
            confidence: ConfidenceSummary {
                overall: extraction.overall_confidence,
                extraction_timestamp: extraction.extraction_timestamp,
            },
            extracted_data: extraction.data,
            investment_analysis: analyzed.into_data(),
        })
    }

    async fn load_and_parse(&self, doc: &Document) -> Result<ParsedDocument, PipelineError> {
        let bytes = self.store.get_blob(&doc.id).await?.ok_or_else(|| {
            StoreError::Unavailable(format!("upload bytes for '{}' are missing", doc.id))
        })?;
        Ok(self.parser.parse(&bytes, &doc.filename).await?)
    }

    async fn persist_success(
        &self,
        doc: &mut Document,
        run: u32,
        bundle: OutputBundle,
    ) -> Result<OutputBundle, PipelineError> {
        let record = ResultRecord {
            result_id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            run,
            schema_version: self.config.schema_version.clone(),
            created_at: Utc::now(),
            bundle,
        };
        self.store.insert_result(&record).await?;

        doc.status = DocumentStatus::Completed;
        doc.overall_confidence = Some(record.bundle.confidence.overall);
        doc.processing_completed_at = Some(record.created_at);
        doc.error_message = None;
        doc.runs = run;
        self.store.put_document(doc).await?;
        Ok(record.bundle)
    }

    /// Mark the run failed. Audit or store errors here are logged; the run's
    /// own error is what the caller gets.
    async fn record_failure(
        &self,
        doc: &mut Document,
        rerun: bool,
        run_span: Option<&StageSpan>,
        err: &PipelineError,
    ) {
        let message = err.to_string();
        error!("[{}] Run failed at {}: {}", doc.id, err.stage_hint(), message);

        doc.runs += 1;
        if !rerun {
            doc.status = DocumentStatus::Failed;
            doc.error_message = Some(message.clone());
            doc.processing_completed_at = Some(Utc::now());
        }
        if let Err(e) = self.store.put_document(doc).await {
            error!("[{}] Could not record failure on document: {}", doc.id, e);
        }
        if let Some(span) = run_span {
            if let Err(e) = self
                .audit
                .fail(span, &message, meta(json!({"stage": err.stage_hint()})))
                .await
            {
                error!("[{}] Could not write failure audit entry: {}", doc.id, e);
            }
        }
        self.observer.on_run_complete(&doc.id, None);
    }

    async fn begin_stage(&self, id: &str, stage: &str) -> Result<StageSpan, PipelineError> {
        self.observer.on_stage_start(id, stage);
        Ok(self.audit.begin(id, stage).await?)
    }

    async fn complete_stage(
        &self,
        span: &StageSpan,
        metadata: serde_json::Value,
    ) -> Result<(), PipelineError> {
        let mut metadata = meta(metadata);
        metadata.retain(|_, v| !v.is_null());
        self.audit.complete(span, metadata).await?;
        self.observer.on_stage_complete(&span.document_id, &span.stage);
        Ok(())
    }

    /// Audit a fatal stage error and hand it back.
    async fn fail_stage(&self, span: &StageSpan, err: PipelineError) -> PipelineError {
        let message = err.to_string();
        if let Err(e) = self.audit.fail(span, &message, Default::default()).await {
            warn!("[{}] Could not write {} failure entry: {}", span.document_id, span.stage, e);
        }
        self.observer
            .on_stage_failed(&span.document_id, &span.stage, &message);
        err
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub async fn document(&self, id: &str) -> Result<Document, PipelineError> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound { id: id.to_string() })
    }

    pub async fn documents(&self) -> Result<Vec<Document>, PipelineError> {
        Ok(self.store.list_documents().await?)
    }

    /// Every result for `id`, oldest first.
    pub async fn results(&self, id: &str) -> Result<Vec<ResultRecord>, PipelineError> {
        self.document(id).await?;
        Ok(self.store.results_for(id).await?)
    }

    /// The newest result, `None` until a run completes.
    pub async fn latest_result(&self, id: &str) -> Result<Option<ResultRecord>, PipelineError> {
        Ok(self.results(id).await?.pop())
    }

    pub async fn audit_trail(&self, id: &str) -> Result<Vec<AuditEntry>, PipelineError> {
        self.document(id).await?;
        Ok(self.audit.trail(id).await?)
    }
}

fn invalid(doc: &Document, hint: &str) -> PipelineError {
    PipelineError::InvalidTransition {
        id: doc.id.clone(),
        status: doc.status.to_string(),
        hint: hint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::gateway::ScriptedBackend;
    use crate::model::{AuditStatus, DocumentKind, ParsedPage};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct TextParser;

    #[async_trait]
    impl DocumentParser for TextParser {
        async fn parse(&self, bytes: &[u8], _filename: &str) -> Result<ParsedDocument, ParseError> {
            let text = String::from_utf8_lossy(bytes);
            Ok(ParsedDocument {
                kind: DocumentKind::Pdf,
                extraction_method: "text".into(),
                pages: text
                    .split("\n\n")
                    .enumerate()
                    .map(|(i, t)| ParsedPage::from_text(i as u32 + 1, t))
                    .collect(),
            })
        }
    }

    fn orchestrator(backend: ScriptedBackend) -> Orchestrator {
        let gateway = LlmGateway::new(Arc::new(backend)).with_retry(0, 0);
        Orchestrator::new(Arc::new(MemoryStore::new()), gateway, PipelineConfig::default())
            .with_parser(Arc::new(TextParser))
    }

    fn replies() -> Vec<String> {
        vec![
            json!({"section_map": {"problem": [1]}, "slide_classifications": []}).to_string(),
            json!({"company": {"name": "Acme", "confidence": 0.8}}).to_string(),
            json!({"investment_recommendation": {"overall_score": 60, "recommendation": "maybe"}})
                .to_string(),
        ]
    }

    #[tokio::test]
    async fn ingest_writes_upload_entry() {
        let orch = orchestrator(ScriptedBackend::new(Vec::<String>::new()));
        let doc = orch.ingest(b"slide one", "deck.pdf").await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Queued);
        let trail = orch.audit_trail(&doc.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].stage, "upload");
        assert_eq!(trail[0].metadata.as_ref().unwrap()["filename"], "deck.pdf");
    }

    #[tokio::test]
    async fn full_run_completes() {
        let orch = orchestrator(ScriptedBackend::new(replies()));
        let doc = orch.ingest(b"We are solving X", "deck.pdf").await.unwrap();
        let bundle = orch.process(&doc.id).await.unwrap();
        assert_eq!(bundle.confidence.overall, 0.8);

        let doc = orch.document(&doc.id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.overall_confidence, Some(0.8));
        assert!(doc.processing_started_at.unwrap() <= doc.processing_completed_at.unwrap());

        let trail = orch.audit_trail(&doc.id).await.unwrap();
        let stages: Vec<(&str, AuditStatus)> =
            trail.iter().map(|e| (e.stage.as_str(), e.status)).collect();
        assert_eq!(
            stages,
            vec![
                ("upload", AuditStatus::Completed),
                ("processing", AuditStatus::Started),
                ("parse", AuditStatus::Started),
                ("parse", AuditStatus::Completed),
                ("classify", AuditStatus::Started),
                ("classify", AuditStatus::Completed),
                ("extract", AuditStatus::Started),
                ("extract", AuditStatus::Completed),
                ("analyze", AuditStatus::Started),
                ("analyze", AuditStatus::Completed),
                ("processing", AuditStatus::Completed),
            ]
        );
        let last = trail.last().unwrap().metadata.as_ref().unwrap();
        assert_eq!(last["phases_completed"], 4);
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let orch = orchestrator(ScriptedBackend::new(Vec::<String>::new()));
        assert!(matches!(
            orch.process("nope").await,
            Err(PipelineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn failed_document_cannot_be_reprocessed() {
        let orch = orchestrator(ScriptedBackend::new(Vec::<String>::new()));
        let doc = orch.ingest(b"x", "deck.pdf").await.unwrap();
        // classify degrades, extract hits the exhausted script and fails
        assert!(orch.process(&doc.id).await.is_err());
        assert_eq!(
            orch.document(&doc.id).await.unwrap().status,
            DocumentStatus::Failed
        );
        assert!(matches!(
            orch.process(&doc.id).await,
            Err(PipelineError::InvalidTransition { .. })
        ));
    }

    /// Delegates to a [`MemoryStore`] but refuses document writes.
    struct RefusingDocuments {
        inner: MemoryStore,
        blob_ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Store for RefusingDocuments {
        async fn put_document(&self, _doc: &Document) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".into()))
        }
        async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
            self.inner.get_document(id).await
        }
        async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
            self.inner.list_documents().await
        }
        async fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
            self.blob_ids.lock().unwrap().push(id.to_string());
            self.inner.put_blob(id, bytes).await
        }
        async fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get_blob(id).await
        }
        async fn delete_blob(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_blob(id).await
        }
        async fn insert_result(&self, record: &ResultRecord) -> Result<(), StoreError> {
            self.inner.insert_result(record).await
        }
        async fn results_for(&self, id: &str) -> Result<Vec<ResultRecord>, StoreError> {
            self.inner.results_for(id).await
        }
        async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
            self.inner.append_audit(entry).await
        }
        async fn audit_trail(&self, id: &str) -> Result<Vec<AuditEntry>, StoreError> {
            self.inner.audit_trail(id).await
        }
    }

    #[tokio::test]
    async fn failed_ingest_leaves_no_upload_bytes() {
        let store = Arc::new(RefusingDocuments {
            inner: MemoryStore::new(),
            blob_ids: Mutex::new(Vec::new()),
        });
        let gateway = LlmGateway::new(Arc::new(ScriptedBackend::new(Vec::<String>::new())));
        let orch = Orchestrator::new(store.clone(), gateway, PipelineConfig::default());

        let err = orch.ingest(b"slide one", "deck.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));

        let ids = store.blob_ids.lock().unwrap().clone();
        assert_eq!(ids.len(), 1);
        assert!(store.inner.get_blob(&ids[0]).await.unwrap().is_none());
        assert!(store.inner.audit_trail(&ids[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn processing_document_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let mut doc = Document::new("deck.pdf", 9, DocumentKind::Pdf);
        doc.status = DocumentStatus::Processing;
        store.put_document(&doc).await.unwrap();

        let gateway = LlmGateway::new(Arc::new(ScriptedBackend::new(Vec::<String>::new())));
        let orch = Orchestrator::new(store, gateway, PipelineConfig::default());
        match orch.process(&doc.id).await {
            Err(PipelineError::InvalidTransition { status, .. }) => assert_eq!(status, "processing"),
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_claim_is_refused() {
        let orch = orchestrator(ScriptedBackend::new(Vec::<String>::new()));
        let _held = orch.claim("doc").unwrap();
        assert!(matches!(
            orch.claim("doc"),
            Err(PipelineError::InvalidTransition { .. })
        ));
        drop(_held);
        assert!(orch.claim("doc").is_ok());
    }
}
