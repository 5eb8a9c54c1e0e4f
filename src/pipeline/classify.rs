//! Classifier stage: pages → section map.
//!
//! Never fatal. Any gateway failure, or a reply without a usable
//! `section_map` object, yields the degraded fallback: every category empty
//! and one `unclassified` assignment covering all pages at the configured
//! fallback confidence.

use super::outcome::StageOutcome;
use crate::config::PipelineConfig;
use crate::gateway::LlmGateway;
use crate::model::extraction::confidence_value;
use crate::model::{Classification, ParsedPage, SectionAssignment, SectionCategory, SectionMap};
use crate::prompts::classification_prompt;
use serde_json::Value;
use tracing::{info, warn};

/// Confidence given to an assignment that carries none.
const DEFAULT_ASSIGNMENT_CONFIDENCE: f64 = 0.5;

/// `method` recorded on fallback classifications.
pub const FALLBACK_METHOD: &str = "fallback";

#[derive(Debug, Clone)]
pub struct Classifier {
    gateway: LlmGateway,
    page_chars: usize,
    budget_chars: usize,
    fallback_confidence: f64,
    temperature: f32,
}

impl Classifier {
    pub fn new(gateway: LlmGateway, config: &PipelineConfig) -> Self {
        Self {
            gateway,
            page_chars: config.classifier_page_chars,
            budget_chars: config.classifier_budget_chars,
            fallback_confidence: config.classifier_fallback_confidence,
            temperature: config.classifier_temperature,
        }
    }

    pub async fn classify(&self, pages: &[ParsedPage]) -> StageOutcome<Classification> {
        let prompt = classification_prompt(pages, self.page_chars, self.budget_chars);
        let reply = match self.gateway.generate_json(&prompt, self.temperature).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Classification failed, using fallback: {}", e);
                return self.fallback(pages, e.to_string());
            }
        };

        match parse_classification(&reply, pages, self.gateway.model()) {
            Ok(c) => {
                info!(
                    "Classified {} pages into {} sections",
                    pages.len(),
                    c.section_map.sections_found()
                );
                StageOutcome::Success(c)
            }
            Err(cause) => {
                warn!("Classification reply unusable, using fallback: {}", cause);
                self.fallback(pages, cause)
            }
        }
    }

    /// The degraded classification for `pages`.
    pub fn fallback(&self, pages: &[ParsedPage], cause: String) -> StageOutcome<Classification> {
        let data = Classification {
            section_map: SectionMap::empty(),
            slide_classifications: vec![SectionAssignment {
                pages: pages.iter().map(|p| p.number).collect(),
                category: SectionCategory::Unclassified,
                confidence: self.fallback_confidence,
                reasoning: cause.clone(),
            }],
            method: FALLBACK_METHOD.to_string(),
            confidence: self.fallback_confidence,
            error: Some(cause.clone()),
        };
        StageOutcome::degraded(data, cause)
    }
}

fn page_number(v: &Value, valid: &[u32]) -> Option<u32> {
    let n = match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let n = u32::try_from(n).ok()?;
    valid.contains(&n).then_some(n)
}

fn page_list(v: &Value, valid: &[u32]) -> Vec<u32> {
    match v {
        Value::Array(items) => items.iter().filter_map(|i| page_number(i, valid)).collect(),
        single => page_number(single, valid).into_iter().collect(),
    }
}

/// Lenient read of a classifier reply.
///
/// Unknown section keys and out-of-range pages are dropped. Assignments
/// with a known category also add their pages to the section map.
pub fn parse_classification(
    reply: &Value,
    pages: &[ParsedPage],
    method: &str,
) -> Result<Classification, String> {
    let valid: Vec<u32> = pages.iter().map(|p| p.number).collect();
    let raw_map = reply
        .get("section_map")
        .and_then(Value::as_object)
        .ok_or_else(|| "reply has no section_map object".to_string())?;

    let mut section_map = SectionMap::empty();
    for (label, pages_value) in raw_map {
        match SectionCategory::from_label(label) {
            Some(SectionCategory::Unclassified) => {}
            Some(category) => {
                for page in page_list(pages_value, &valid) {
                    section_map.insert(category, page);
                }
            }
            None => warn!("Dropping unknown section '{}'", label),
        }
    }

    let mut assignments = Vec::new();
    if let Some(items) = reply.get("slide_classifications").and_then(Value::as_array) {
        for item in items.iter().filter_map(Value::as_object) {
            let mut item_pages = ["slide_no", "slide", "page", "pages"]
                .iter()
                .find_map(|k| item.get(*k))
                .map(|v| page_list(v, &valid))
                .unwrap_or_default();
            item_pages.sort_unstable();
            item_pages.dedup();
            if item_pages.is_empty() {
                continue;
            }
            let category = item
                .get("category")
                .and_then(Value::as_str)
                .and_then(SectionCategory::from_label)
                .unwrap_or(SectionCategory::Unclassified);
            for page in &item_pages {
                section_map.insert(category, *page);
            }
            assignments.push(SectionAssignment {
                pages: item_pages,
                category,
                confidence: item
                    .get("confidence")
                    .and_then(confidence_value)
                    .unwrap_or(DEFAULT_ASSIGNMENT_CONFIDENCE),
                reasoning: ["reasoning", "rationale"]
                    .iter()
                    .find_map(|k| item.get(*k).and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    Ok(Classification {
        confidence: Classification::mean_confidence(&assignments),
        section_map,
        slide_classifications: assignments,
        method: method.to_string(),
        error: None,
    })
}
