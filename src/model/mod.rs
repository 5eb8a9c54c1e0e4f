//! Domain records shared by every pipeline stage.

pub mod analysis;
pub mod audit;
pub mod bundle;
pub mod document;
pub mod extraction;
pub mod page;
pub mod section;

pub use analysis::{
    ComparableAnalysis, Flag, InvestmentAnalysis, InvestmentRecommendation, InvestmentSignals,
    KeyMetricsSummary, Recommendation, RiskAssessment, RiskLevel, Tier,
};
pub use audit::{AuditEntry, AuditStatus};
pub use bundle::{ConfidenceSummary, DocumentMetadata, OutputBundle, ResultRecord};
pub use document::{Document, DocumentKind, DocumentStatus};
pub use extraction::{
    BusinessModel, CompanyInfo, Competition, ExtractedData, ExtractedField, ExtractionResult,
    FieldValue, FinancialMetrics, FundingAsk, MarketMetrics, TeamMember, TractionMetrics,
};
pub use page::{BlockKind, BlockPayload, BoundingBox, ContentBlock, ParsedDocument, ParsedPage};
pub use section::{Classification, SectionAssignment, SectionCategory, SectionMap};
