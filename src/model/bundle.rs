//! The persisted output of one successful run.

use super::{Classification, ExtractedData, InvestmentAnalysis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: String,
    pub filename: String,
    pub total_slides: usize,
    pub extraction_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub overall: f64,
    pub extraction_timestamp: DateTime<Utc>,
}

/// Metadata, classification, extracted data, analysis and confidence for
/// one document run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBundle {
    pub document_metadata: DocumentMetadata,
    pub classification: Classification,
    pub extracted_data: ExtractedData,
    pub investment_analysis: InvestmentAnalysis,
    pub confidence: ConfidenceSummary,
}

/// A stored bundle. Every run inserts a new record; records are never
/// overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub result_id: String,
    pub document_id: String,
    /// 1 for the first run, incremented on each re-run.
    pub run: u32,
    pub schema_version: String,
    pub created_at: DateTime<Utc>,
    pub bundle: OutputBundle,
}
