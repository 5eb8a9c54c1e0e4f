//! The uploaded document and its processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Processing status of a [`Document`].
///
/// Transitions are monotonic: `Queued → Processing → {Completed | Failed}`.
/// Terminal states are never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Whether `self → next` is a legal forward transition.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Queued, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Deck container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Pptx,
    /// Binary (OLE2) PowerPoint. Accepted at upload, not parseable.
    LegacyPpt,
}

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

impl DocumentKind {
    /// Detect the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PDF_MAGIC) {
            Some(DocumentKind::Pdf)
        } else if bytes.starts_with(ZIP_MAGIC) {
            Some(DocumentKind::Pptx)
        } else if bytes.starts_with(OLE2_MAGIC) {
            Some(DocumentKind::LegacyPpt)
        } else {
            None
        }
    }

    /// Map a lowercase file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(DocumentKind::Pdf),
            "pptx" => Some(DocumentKind::Pptx),
            "ppt" => Some(DocumentKind::LegacyPpt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Pptx => "pptx",
            DocumentKind::LegacyPpt => "ppt",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded file.
///
/// Created on upload in `Queued`; only the orchestrator mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    /// Type declared by the upload's extension until a run parses the file,
    /// then the type detected from its content.
    pub file_type: DocumentKind,
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_confidence: Option<f64>,
    /// Number of runs that reached a terminal outcome.
    #[serde(default)]
    pub runs: u32,
}

impl Document {
    /// A fresh queued document with a new UUID v4 identifier.
    pub fn new(filename: impl Into<String>, size_bytes: u64, file_type: DocumentKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            size_bytes,
            file_type,
            uploaded_at: Utc::now(),
            status: DocumentStatus::Queued,
            processing_started_at: None,
            processing_completed_at: None,
            error_message: None,
            overall_confidence: None,
            runs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_monotonic() {
        use DocumentStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn sniff_signatures() {
        assert_eq!(DocumentKind::sniff(b"%PDF-1.7\n"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::sniff(b"PK\x03\x04rest"), Some(DocumentKind::Pptx));
        assert_eq!(
            DocumentKind::sniff(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0]),
            Some(DocumentKind::LegacyPpt)
        );
        assert_eq!(DocumentKind::sniff(b"GIF89a"), None);
        assert_eq!(DocumentKind::sniff(b""), None);
        assert_eq!(DocumentKind::sniff(b"%P"), None);
    }

    #[test]
    fn status_serialises_snake_case() {
        let json = serde_json::to_string(&DocumentStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn new_document_is_queued_with_unique_id() {
        let a = Document::new("a.pdf", 10, DocumentKind::Pdf);
        let b = Document::new("a.pdf", 10, DocumentKind::Pdf);
        assert_eq!(a.status, DocumentStatus::Queued);
        assert_ne!(a.id, b.id);
        assert!(a.error_message.is_none());
    }
}
