//! Integration tests: the full orchestrator over a scripted LLM backend.
//!
//! No network and no pdfium library are needed. A stub parser splits the
//! upload on blank lines into pages; the scripted backend answers each stage
//! by looking at which prompt it received.

use async_trait::async_trait;
use pitchlens::model::{AuditStatus, SectionCategory};
use pitchlens::{
    process_all, DocumentKind, DocumentParser, DocumentStatus, FsStore, GatewayError, LlmGateway,
    MemoryStore, Orchestrator, ParseError, ParsedDocument, ParsedPage, PipelineConfig,
    PipelineError, ProviderErrorKind, ScriptedBackend, Store, ValidationError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

const DECK: &[u8] = b"We are solving X\n\nOur team: Alice, CEO";

/// Pages split on blank lines; uploads starting with `BROKEN` are corrupt.
struct BlankLineParser;

#[async_trait]
impl DocumentParser for BlankLineParser {
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument, ParseError> {
        if bytes.starts_with(b"BROKEN") {
            return Err(ParseError::CorruptDocument {
                filename: filename.to_string(),
                detail: "truncated xref table".into(),
            });
        }
        let text = String::from_utf8_lossy(bytes);
        Ok(ParsedDocument {
            kind: DocumentKind::Pdf,
            extraction_method: "stub".into(),
            pages: text
                .split("\n\n")
                .enumerate()
                .map(|(i, t)| ParsedPage::from_text(i as u32 + 1, t))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Classify,
    Extract,
    Analyze,
}

fn stage_of(prompt: &str) -> Stage {
    if prompt.starts_with("You are analyzing a startup pitch deck. Classify") {
        Stage::Classify
    } else if prompt.starts_with("Extract structured investment information") {
        Stage::Extract
    } else {
        Stage::Analyze
    }
}

fn classification_reply() -> Value {
    json!({
        "section_map": {"problem": [1], "team": [2]},
        "slide_classifications": [
            {"slide_no": 1, "category": "problem", "confidence": 0.9, "reasoning": "pain point"},
            {"slide_no": 2, "category": "team", "confidence": 0.85, "reasoning": "founders"}
        ]
    })
}

fn extraction_reply() -> Value {
    json!({
        "company": {"name": "Acme"},
        "team": [{"name": "Alice", "title": "CEO", "confidence": 0.9, "source_slide": 2}]
    })
}

fn analysis_reply() -> Value {
    json!({
        "investment_signals": {
            "green_flags": [{"signal": "Clear problem", "reasoning": "slide 1", "importance": "medium"}],
            "red_flags": [{"signal": "Thin team", "reasoning": "one founder", "severity": "high"}],
            "yellow_flags": []
        },
        "investment_recommendation": {"overall_score": 55, "recommendation": "maybe"}
    })
}

/// Backend answering each stage with `reply(stage)`.
fn routed<F>(reply: F) -> ScriptedBackend
where
    F: Fn(Stage) -> Result<String, GatewayError> + Send + Sync + 'static,
{
    ScriptedBackend::new(Vec::<String>::new()).with_handler(move |prompt| reply(stage_of(prompt)))
}

fn happy(stage: Stage) -> Result<String, GatewayError> {
    Ok(match stage {
        Stage::Classify => classification_reply(),
        Stage::Extract => extraction_reply(),
        Stage::Analyze => analysis_reply(),
    }
    .to_string())
}

fn orchestrator_with(store: Arc<dyn Store>, backend: ScriptedBackend) -> Orchestrator {
    let gateway = LlmGateway::new(Arc::new(backend)).with_retry(0, 0);
    Orchestrator::new(store, gateway, PipelineConfig::default())
        .with_parser(Arc::new(BlankLineParser))
}

fn orchestrator(backend: ScriptedBackend) -> Orchestrator {
    orchestrator_with(Arc::new(MemoryStore::new()), backend)
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_slide_deck_completes() {
    let orch = orchestrator(routed(happy));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Queued);

    let bundle = orch.process(&doc.id).await.unwrap();
    let map = &bundle.classification.section_map;
    assert_eq!(map.pages(SectionCategory::Problem), &[1]);
    assert_eq!(map.pages(SectionCategory::Team), &[2]);
    assert_eq!(bundle.document_metadata.total_slides, 2);
    assert_eq!(bundle.extracted_data.team[0].name.as_deref(), Some("Alice"));
    assert_eq!(bundle.extracted_data.team[0].title.as_deref(), Some("CEO"));
    assert_eq!(bundle.investment_analysis.investment_signals.red_flags.len(), 1);

    let stored = orch.document(&doc.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    let confidence = stored.overall_confidence.unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(confidence, bundle.confidence.overall);

    let results = orch.results(&doc.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].run, 1);
    assert_eq!(results[0].schema_version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn unparseable_pdf_fails_the_run() {
    let gateway = LlmGateway::new(Arc::new(routed(happy))).with_retry(0, 0);
    // The real parser: the bytes fail signature sniffing before pdfium is needed.
    let orch = Orchestrator::new(Arc::new(MemoryStore::new()), gateway, PipelineConfig::default());
    let doc = orch.ingest(b"this is not a pdf", "deck.pdf").await.unwrap();

    let err = orch.process(&doc.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Parse(ParseError::UnsupportedFormat { .. })));

    let stored = orch.document(&doc.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Failed);
    let message = stored.error_message.unwrap();
    assert!(!message.is_empty());
    assert_eq!(message, err.to_string());
    assert!(orch.results(&doc.id).await.unwrap().is_empty());

    let trail = orch.audit_trail(&doc.id).await.unwrap();
    let parse_failed = trail
        .iter()
        .find(|e| e.stage == "parse" && e.status == AuditStatus::Failed)
        .expect("parse failure entry");
    assert_eq!(parse_failed.error_details.as_deref(), Some(message.as_str()));
    assert!(!trail.iter().any(|e| e.stage == "classify"));
}

#[tokio::test]
async fn oversized_upload_is_rejected_without_a_trace() {
    let orch = orchestrator(routed(happy));
    let bytes = vec![b'%'; 51 * 1024 * 1024];
    let err = orch.ingest(&bytes, "huge.pdf").await.unwrap_err();
    match err {
        PipelineError::Validation(ValidationError::FileTooLarge { max_mb, .. }) => {
            assert_eq!(max_mb, 50)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(orch.documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let orch = orchestrator(routed(happy));
    let err = assert_err!(orch.ingest(DECK, "deck.docx").await);
    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::UnsupportedExtension { .. })
    ));
    assert!(orch.documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn classifier_timeout_falls_back_and_run_completes() {
    let orch = orchestrator(routed(|stage| match stage {
        Stage::Classify => Err(GatewayError::provider(
            "mock",
            ProviderErrorKind::Timeout,
            "no response within 120s",
        )),
        other => happy(other),
    }));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    let bundle = orch.process(&doc.id).await.unwrap();

    let c = &bundle.classification;
    assert!(c.section_map.is_blank());
    assert_eq!(c.slide_classifications.len(), 1);
    assert_eq!(c.slide_classifications[0].category, SectionCategory::Unclassified);
    assert_eq!(c.slide_classifications[0].confidence, 0.3);
    assert_eq!(c.slide_classifications[0].pages, vec![1, 2]);
    assert_eq!(
        orch.document(&doc.id).await.unwrap().status,
        DocumentStatus::Completed
    );

    let trail = orch.audit_trail(&doc.id).await.unwrap();
    let classify_done = trail
        .iter()
        .find(|e| e.stage == "classify" && e.status == AuditStatus::Completed)
        .unwrap();
    let meta = classify_done.metadata.as_ref().unwrap();
    assert_eq!(meta["degraded"], true);
    assert!(meta["cause"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn analyzer_failure_still_completes() {
    let orch = orchestrator(routed(|stage| match stage {
        Stage::Analyze => Err(GatewayError::provider("mock", ProviderErrorKind::Api, "HTTP 500")),
        other => happy(other),
    }));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    let bundle = orch.process(&doc.id).await.unwrap();

    let analysis = &bundle.investment_analysis;
    assert!(analysis.investment_signals.is_empty());
    assert!(analysis.investment_recommendation.overall_score.is_none());
    assert!(analysis.error.as_deref().unwrap().contains("HTTP 500"));
    assert_eq!(bundle.extracted_data.team[0].name.as_deref(), Some("Alice"));
    assert_eq!(
        orch.document(&doc.id).await.unwrap().status,
        DocumentStatus::Completed
    );
}

#[tokio::test]
async fn fenced_replies_parse_like_bare_ones() {
    let bare = orchestrator(routed(happy));
    let fenced = orchestrator(routed(|stage| {
        happy(stage).map(|body| format!("```json\n{body}\n```"))
    }));

    let a = bare.ingest(DECK, "deck.pdf").await.unwrap();
    let b = fenced.ingest(DECK, "deck.pdf").await.unwrap();
    let a = bare.process(&a.id).await.unwrap();
    let b = fenced.process(&b.id).await.unwrap();

    assert_eq!(a.classification, b.classification);
    assert_eq!(a.extracted_data, b.extracted_data);
    assert_eq!(a.investment_analysis, b.investment_analysis);
    assert_eq!(a.confidence.overall, b.confidence.overall);
}

#[tokio::test]
async fn audit_trail_brackets_every_stage_in_order() {
    let orch = orchestrator(routed(happy));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    orch.process(&doc.id).await.unwrap();

    let trail = orch.audit_trail(&doc.id).await.unwrap();
    assert_eq!(trail[0].stage, "upload");
    assert_eq!(trail[0].metadata.as_ref().unwrap()["size"], DECK.len());

    let stages: Vec<&str> = trail[2..trail.len() - 1]
        .chunks(2)
        .map(|pair| {
            assert_eq!(pair[0].status, AuditStatus::Started);
            assert_eq!(pair[1].status, AuditStatus::Completed);
            assert_eq!(pair[0].stage, pair[1].stage);
            assert!(pair[0].started_at <= pair[1].completed_at.unwrap());
            pair[0].stage.as_str()
        })
        .collect();
    assert_eq!(stages, vec!["parse", "classify", "extract", "analyze"]);

    let run_done = trail.last().unwrap();
    assert_eq!(run_done.stage, "processing");
    assert_eq!(run_done.status, AuditStatus::Completed);
    assert_eq!(run_done.metadata.as_ref().unwrap()["phases_completed"], 4);
}

#[tokio::test]
async fn confidence_defaults_to_half_without_reported_values() {
    let orch = orchestrator(routed(|stage| match stage {
        Stage::Extract => Ok(json!({"company": {"name": "Acme"}, "team": []}).to_string()),
        other => happy(other),
    }));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    let bundle = orch.process(&doc.id).await.unwrap();
    assert_eq!(bundle.confidence.overall, 0.5);
    assert_eq!(orch.document(&doc.id).await.unwrap().overall_confidence, Some(0.5));
}

#[tokio::test]
async fn reported_confidences_are_averaged() {
    let orch = orchestrator(routed(|stage| match stage {
        Stage::Extract => Ok(json!({
            "market": {"TAM": {"value": 5_000_000_000u64, "unit": "USD", "confidence": 0.6}},
            "team": [{"name": "Alice", "confidence": 1.0}]
        })
        .to_string()),
        other => happy(other),
    }));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    let bundle = orch.process(&doc.id).await.unwrap();
    assert!((bundle.confidence.overall - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn reprocessing_appends_a_second_result() {
    let orch = orchestrator(routed(happy));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    let first = orch.process(&doc.id).await.unwrap();
    let second = orch.process(&doc.id).await.unwrap();

    let results = orch.results(&doc.id).await.unwrap();
    assert_eq!(results.iter().map(|r| r.run).collect::<Vec<_>>(), vec![1, 2]);
    assert_ne!(results[0].result_id, results[1].result_id);
    assert_eq!(first.extracted_data, second.extracted_data);
    assert_eq!(orch.latest_result(&doc.id).await.unwrap().unwrap().run, 2);

    let stored = orch.document(&doc.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert_eq!(stored.runs, 2);

    let runs_started = orch
        .audit_trail(&doc.id)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.stage == "processing" && e.status == AuditStatus::Started)
        .count();
    assert_eq!(runs_started, 2);
}

#[tokio::test]
async fn failed_rerun_keeps_the_document_completed() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let doc = {
        let seeded = orchestrator_with(store.clone(), routed(happy));
        let d = seeded.ingest(DECK, "deck.pdf").await.unwrap();
        seeded.process(&d.id).await.unwrap();
        d
    };
    // Same store, a backend whose extraction now fails.
    let broken = orchestrator_with(
        store,
        routed(|stage| match stage {
            Stage::Extract => Err(GatewayError::provider("mock", ProviderErrorKind::Auth, "key revoked")),
            other => happy(other),
        }),
    );
    assert_err!(broken.process(&doc.id).await);

    let stored = broken.document(&doc.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert!(stored.error_message.is_none());
    assert_eq!(broken.results(&doc.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn extraction_failure_fails_the_run() {
    let orch = orchestrator(routed(|stage| match stage {
        Stage::Extract => Ok("Sorry, I cannot help with that.".to_string()),
        other => happy(other),
    }));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    let err = orch.process(&doc.id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Gateway(GatewayError::MalformedResponse { .. })
    ));

    let stored = orch.document(&doc.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Failed);
    assert!(!stored.error_message.unwrap().is_empty());
    assert!(orch.results(&doc.id).await.unwrap().is_empty());
    assert!(!orch
        .audit_trail(&doc.id)
        .await
        .unwrap()
        .iter()
        .any(|e| e.stage == "analyze"));
}

#[tokio::test]
async fn failed_document_is_not_reprocessed() {
    let orch = orchestrator(routed(happy));
    let doc = orch.ingest(b"BROKEN deck", "deck.pdf").await.unwrap();
    assert_err!(orch.process(&doc.id).await);
    let err = assert_err!(orch.process(&doc.id).await);
    assert!(matches!(err, PipelineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn submitted_job_runs_in_background() {
    let orch = orchestrator(routed(happy));
    let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
    let handle = orch.submit(&doc.id);
    let bundle = assert_ok!(handle.await.unwrap());
    assert_eq!(bundle.document_metadata.document_id, doc.id);
}

#[tokio::test]
async fn concurrent_runs_isolate_failures() {
    let orch = orchestrator(routed(happy));
    let good_a = orch.ingest(DECK, "a.pdf").await.unwrap();
    let bad = orch.ingest(b"BROKEN", "b.pdf").await.unwrap();
    let good_c = orch.ingest(DECK, "c.pptx").await.unwrap();

    let ids = vec![good_a.id.clone(), bad.id.clone(), good_c.id.clone()];
    let reports = process_all(&orch, ids).await;
    assert_eq!(reports.len(), 3);
    for r in &reports {
        assert_eq!(r.is_success(), r.document_id != bad.id, "{}", r.document_id);
    }

    assert_eq!(orch.document(&bad.id).await.unwrap().status, DocumentStatus::Failed);
    for id in [&good_a.id, &good_c.id] {
        assert_eq!(orch.document(id).await.unwrap().status, DocumentStatus::Completed);
        assert_eq!(orch.results(id).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn filesystem_store_keeps_runs_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = Arc::new(FsStore::open(dir.path()).await.unwrap());
        let orch = orchestrator_with(store, routed(happy));
        let doc = orch.ingest(DECK, "deck.pdf").await.unwrap();
        orch.process(&doc.id).await.unwrap();
        doc.id
    };

    let store = Arc::new(FsStore::open(dir.path()).await.unwrap());
    let orch = orchestrator_with(store, routed(happy));
    let doc = orch.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
    let latest = orch.latest_result(&id).await.unwrap().unwrap();
    assert_eq!(latest.bundle.extracted_data.team[0].name.as_deref(), Some("Alice"));
    assert_eq!(orch.audit_trail(&id).await.unwrap().len(), 11);
}
