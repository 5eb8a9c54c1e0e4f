//! Append-only audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Started,
    Completed,
    Failed,
}

/// One stage attempt event. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub document_id: String,
    /// `upload`, `processing`, `parse`, `classify`, `extract` or `analyze`.
    pub stage: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl AuditEntry {
    /// A `started` entry stamped now.
    pub fn started(document_id: &str, stage: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_owned(),
            stage: stage.to_owned(),
            started_at: Utc::now(),
            completed_at: None,
            status: AuditStatus::Started,
            error_details: None,
            metadata: None,
        }
    }

    /// The matching `completed` entry for a stage that began at `started_at`.
    pub fn completed(document_id: &str, stage: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            completed_at: Some(Utc::now()),
            status: AuditStatus::Completed,
            ..Self::started(document_id, stage)
        }
    }

    /// The matching `failed` entry.
    pub fn failed(
        document_id: &str,
        stage: &str,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            started_at,
            completed_at: Some(Utc::now()),
            status: AuditStatus::Failed,
            error_details: Some(error.into()),
            ..Self::started(document_id, stage)
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        if !metadata.is_empty() {
            self.metadata = Some(metadata);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_keeps_start_time() {
        let s = AuditEntry::started("doc", "parse");
        let c = AuditEntry::completed("doc", "parse", s.started_at);
        assert_eq!(c.started_at, s.started_at);
        assert!(c.completed_at.unwrap() >= s.started_at);
        assert_ne!(c.id, s.id);
        assert_eq!(c.status, AuditStatus::Completed);
    }

    #[test]
    fn empty_metadata_is_omitted() {
        let e = AuditEntry::started("doc", "upload").with_metadata(Map::new());
        let v = serde_json::to_value(&e).unwrap();
        assert!(v.get("metadata").is_none());
        assert_eq!(v["status"], "started");
    }
}
