//! Audit trail writer.
//!
//! Every stage attempt is bracketed by two entries: `started` when it
//! begins, then `completed` or `failed` carrying the same start time. Entries
//! go straight to the [`Store`]; nothing is buffered or merged.

use crate::error::StoreError;
use crate::model::AuditEntry;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// An open `started` entry waiting for its outcome.
#[derive(Debug, Clone)]
pub struct StageSpan {
    pub document_id: String,
    pub stage: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn Store>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Write the `started` entry for `stage`.
    pub async fn begin(&self, document_id: &str, stage: &str) -> Result<StageSpan, StoreError> {
        let entry = AuditEntry::started(document_id, stage);
        let span = StageSpan {
            document_id: entry.document_id.clone(),
            stage: entry.stage.clone(),
            started_at: entry.started_at,
        };
        self.store.append_audit(&entry).await?;
        debug!("[{}] {} started", document_id, stage);
        Ok(span)
    }

    pub async fn complete(&self, span: &StageSpan, metadata: Map<String, Value>) -> Result<(), StoreError> {
        let entry = AuditEntry::completed(&span.document_id, &span.stage, span.started_at)
            .with_metadata(metadata);
        self.store.append_audit(&entry).await?;
        debug!("[{}] {} completed", span.document_id, span.stage);
        Ok(())
    }

    pub async fn fail(
        &self,
        span: &StageSpan,
        error: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let entry = AuditEntry::failed(&span.document_id, &span.stage, span.started_at, error)
            .with_metadata(metadata);
        self.store.append_audit(&entry).await?;
        debug!("[{}] {} failed", span.document_id, span.stage);
        Ok(())
    }

    /// A single `completed` entry for an instantaneous event such as upload.
    pub async fn record(
        &self,
        document_id: &str,
        stage: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let entry = AuditEntry::completed(document_id, stage, now).with_metadata(metadata);
        self.store.append_audit(&entry).await
    }

    pub async fn trail(&self, document_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        self.store.audit_trail(document_id).await
    }
}

/// Metadata map from a `json!({..})` object; anything else is empty.
pub fn meta(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
