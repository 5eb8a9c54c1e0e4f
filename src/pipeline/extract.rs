//! Extractor stage: pages + section map → structured investment record.
//!
//! Fatal on failure. A gateway error or a reply that is not a JSON object is
//! returned to the orchestrator, which fails the run.
//!
//! ## Overall confidence
//!
//! Computed from the raw reply, before typed parsing: every object key named
//! `confidence`, at any depth, contributes its value when that value is a
//! number or numeric string (clamped to `[0, 1]`). When the value is itself
//! an object (a per-field confidence map), each numeric entry contributes.
//! The overall score is the arithmetic mean of the contributions, or exactly
//! `0.5` when there are none. Defaults filled in by the typed schema never
//! contribute.

use crate::config::PipelineConfig;
use crate::error::GatewayError;
use crate::gateway::LlmGateway;
use crate::model::extraction::confidence_value;
use crate::model::{ExtractedData, ExtractionResult, ParsedPage, SectionMap};
use crate::gateway::json::EXCERPT_CHARS;
use crate::prompts::{extraction_prompt, truncate_chars};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

/// Overall confidence when the reply carries no confidence values.
pub const DEFAULT_OVERALL_CONFIDENCE: f64 = 0.5;

/// Every confidence value in `value`, in document order.
pub fn collect_confidences(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if key == "confidence" {
                    match v {
                        Value::Object(per_field) => {
                            out.extend(per_field.values().filter_map(confidence_value))
                        }
                        other => out.extend(confidence_value(other)),
                    }
                } else {
                    collect_confidences(v, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_confidences(v, out)),
        _ => {}
    }
}

/// Mean of every confidence in `value`, 0.5 when none.
pub fn overall_confidence(value: &Value) -> f64 {
    let mut scores = Vec::new();
    collect_confidences(value, &mut scores);
    if scores.is_empty() {
        DEFAULT_OVERALL_CONFIDENCE
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    gateway: LlmGateway,
    budget_chars: usize,
    temperature: f32,
}

impl Extractor {
    pub fn new(gateway: LlmGateway, config: &PipelineConfig) -> Self {
        Self {
            gateway,
            budget_chars: config.extractor_budget_chars,
            temperature: config.extractor_temperature,
        }
    }

    pub async fn extract(
        &self,
        pages: &[ParsedPage],
        section_map: &SectionMap,
    ) -> Result<ExtractionResult, GatewayError> {
        let prompt = extraction_prompt(pages, section_map, self.budget_chars);
        debug!("Extraction prompt: {} chars", prompt.len());

        let reply = self.gateway.generate_json(&prompt, self.temperature).await?;
        let Value::Object(root) = &reply else {
            return Err(GatewayError::MalformedResponse {
                detail: format!("expected a JSON object, got {}", json_kind(&reply)),
                excerpt: truncate_chars(&reply.to_string(), EXCERPT_CHARS).to_string(),
            });
        };

        let overall = overall_confidence(&reply);
        let data = ExtractedData::from_json(root);
        info!(
            "Extracted {} team members, overall confidence {:.2}",
            data.team.len(),
            overall
        );
        Ok(ExtractionResult {
            data,
            overall_confidence: overall,
            extraction_timestamp: Utc::now(),
            method: self.gateway.model().to_string(),
        })
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
