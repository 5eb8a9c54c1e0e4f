//! Semantic section taxonomy and classifier output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pitch-deck section category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionCategory {
    CompanyOverview,
    Problem,
    Solution,
    Market,
    Product,
    BusinessModel,
    Traction,
    Financials,
    Competition,
    Team,
    FundingAsk,
    /// Fallback bucket; never a key of a [`SectionMap`].
    Unclassified,
}

impl SectionCategory {
    /// The eleven deck categories, in prompt order. Excludes `Unclassified`.
    pub const ALL: [SectionCategory; 11] = [
        SectionCategory::CompanyOverview,
        SectionCategory::Problem,
        SectionCategory::Solution,
        SectionCategory::Market,
        SectionCategory::Product,
        SectionCategory::BusinessModel,
        SectionCategory::Traction,
        SectionCategory::Financials,
        SectionCategory::Competition,
        SectionCategory::Team,
        SectionCategory::FundingAsk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionCategory::CompanyOverview => "company_overview",
            SectionCategory::Problem => "problem",
            SectionCategory::Solution => "solution",
            SectionCategory::Market => "market",
            SectionCategory::Product => "product",
            SectionCategory::BusinessModel => "business_model",
            SectionCategory::Traction => "traction",
            SectionCategory::Financials => "financials",
            SectionCategory::Competition => "competition",
            SectionCategory::Team => "team",
            SectionCategory::FundingAsk => "funding_ask",
            SectionCategory::Unclassified => "unclassified",
        }
    }

    /// Parse a model-supplied label. Case, spaces and hyphens are ignored and
    /// a few common aliases are accepted.
    pub fn from_label(label: &str) -> Option<Self> {
        let norm: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        let cat = match norm.as_str() {
            "company_overview" | "overview" | "company" | "introduction" => {
                SectionCategory::CompanyOverview
            }
            "problem" => SectionCategory::Problem,
            "solution" => SectionCategory::Solution,
            "market" | "market_opportunity" => SectionCategory::Market,
            "product" => SectionCategory::Product,
            "business_model" | "businessmodel" => SectionCategory::BusinessModel,
            "traction" => SectionCategory::Traction,
            "financials" | "financial" => SectionCategory::Financials,
            "competition" | "competitors" => SectionCategory::Competition,
            "team" => SectionCategory::Team,
            "funding_ask" | "ask" | "funding" => SectionCategory::FundingAsk,
            "unclassified" => SectionCategory::Unclassified,
            _ => return None,
        };
        Some(cat)
    }
}

impl fmt::Display for SectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category → page ordinals. Every deck category key is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionMap(BTreeMap<SectionCategory, Vec<u32>>);

impl Default for SectionMap {
    fn default() -> Self {
        Self::empty()
    }
}

impl SectionMap {
    /// All eleven categories mapped to empty lists.
    pub fn empty() -> Self {
        Self(SectionCategory::ALL.iter().map(|c| (*c, Vec::new())).collect())
    }

    /// Add a page to a category, keeping the list sorted and deduplicated.
    /// `Unclassified` is ignored.
    pub fn insert(&mut self, category: SectionCategory, page: u32) {
        if category == SectionCategory::Unclassified {
            return;
        }
        let pages = self.0.entry(category).or_default();
        if let Err(pos) = pages.binary_search(&page) {
            pages.insert(pos, page);
        }
    }

    pub fn pages(&self, category: SectionCategory) -> &[u32] {
        self.0.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SectionCategory, &Vec<u32>)> {
        self.0.iter()
    }

    /// Number of categories with at least one page.
    pub fn sections_found(&self) -> usize {
        self.0.values().filter(|v| !v.is_empty()).count()
    }

    /// `true` when every category is empty.
    pub fn is_blank(&self) -> bool {
        self.sections_found() == 0
    }
}

/// One classifier claim: these pages belong to this category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAssignment {
    pub pages: Vec<u32>,
    pub category: SectionCategory,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Classifier output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub section_map: SectionMap,
    pub slide_classifications: Vec<SectionAssignment>,
    /// Model that produced the classification, or `"fallback"`.
    pub method: String,
    /// Mean assignment confidence (0.5 when there are none).
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Classification {
    /// Mean confidence over assignments, 0.5 when there are none.
    pub fn mean_confidence(assignments: &[SectionAssignment]) -> f64 {
        if assignments.is_empty() {
            return 0.5;
        }
        assignments.iter().map(|a| a.confidence).sum::<f64>() / assignments.len() as f64
    }
}
