//! Analyzer stage: extracted data → investment signals and recommendation.
//!
//! Never fatal. On any failure the run still completes with an empty
//! [`InvestmentAnalysis`] whose `error` names the cause.

use super::outcome::StageOutcome;
use crate::config::PipelineConfig;
use crate::gateway::LlmGateway;
use crate::model::{ExtractedData, InvestmentAnalysis};
use crate::prompts::analysis_prompt;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Analyzer {
    gateway: LlmGateway,
    budget_chars: usize,
    temperature: f32,
}

impl Analyzer {
    pub fn new(gateway: LlmGateway, config: &PipelineConfig) -> Self {
        Self {
            gateway,
            budget_chars: config.analyzer_budget_chars,
            temperature: config.analyzer_temperature,
        }
    }

    pub async fn analyze(&self, data: &ExtractedData) -> StageOutcome<InvestmentAnalysis> {
        let json = match serde_json::to_string_pretty(data) {
            Ok(s) => s,
            Err(e) => return degrade(format!("cannot serialise extracted data: {e}")),
        };
        let prompt = analysis_prompt(&json, self.budget_chars);

        let reply = match self.gateway.generate_json(&prompt, self.temperature).await {
            Ok(v) => v,
            Err(e) => return degrade(e.to_string()),
        };
        let Value::Object(root) = &reply else {
            return degrade("analysis reply is not a JSON object".to_string());
        };

        let analysis = InvestmentAnalysis::from_json(root);
        info!(
            "Analysis: {} green, {} red, {} yellow flags",
            analysis.investment_signals.green_flags.len(),
            analysis.investment_signals.red_flags.len(),
            analysis.investment_signals.yellow_flags.len()
        );
        StageOutcome::Success(analysis)
    }
}

fn degrade(cause: String) -> StageOutcome<InvestmentAnalysis> {
    warn!("Analysis failed, continuing without it: {}", cause);
    StageOutcome::degraded(InvestmentAnalysis::degraded(cause.clone()), cause)
}
