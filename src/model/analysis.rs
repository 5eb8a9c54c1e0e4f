//! Qualitative investment analysis produced by the analyzer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Importance (green flags) or severity (red flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" => Some(Tier::High),
            "medium" | "moderate" => Some(Tier::Medium),
            "low" => Some(Tier::Low),
            _ => None,
        }
    }
}

/// Risk rating for one dimension. Same scale as [`Tier`].
pub type RiskLevel = Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongPass,
    Pass,
    Maybe,
    NoPass,
}

impl Recommendation {
    fn parse(s: &str) -> Option<Self> {
        let norm: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match norm.as_str() {
            "strong_pass" => Some(Recommendation::StrongPass),
            "pass" => Some(Recommendation::Pass),
            "maybe" => Some(Recommendation::Maybe),
            "no_pass" => Some(Recommendation::NoPass),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::StrongPass => "strong_pass",
            Recommendation::Pass => "pass",
            Recommendation::Maybe => "maybe",
            Recommendation::NoPass => "no_pass",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Flag {
    pub signal: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

impl Flag {
    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) if !s.trim().is_empty() => Some(Flag {
                signal: s.clone(),
                ..Flag::default()
            }),
            Value::Object(o) => {
                let signal = o.get("signal").and_then(Value::as_str)?.to_owned();
                Some(Flag {
                    signal,
                    reasoning: str_at(o, "reasoning").unwrap_or_default(),
                    tier: ["importance", "severity", "tier"]
                        .iter()
                        .find_map(|k| o.get(*k).and_then(Value::as_str).and_then(Tier::parse)),
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvestmentSignals {
    pub green_flags: Vec<Flag>,
    pub red_flags: Vec<Flag>,
    pub yellow_flags: Vec<Flag>,
}

impl InvestmentSignals {
    pub fn is_empty(&self) -> bool {
        self.green_flags.is_empty() && self.red_flags.is_empty() && self.yellow_flags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyMetricsSummary {
    pub revenue_status: Option<String>,
    pub growth_trajectory: Option<String>,
    pub market_opportunity: Option<String>,
    pub team_strength: Option<String>,
    pub competitive_position: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvestmentRecommendation {
    /// 0–100.
    pub overall_score: Option<f64>,
    pub recommendation: Option<Recommendation>,
    pub key_strengths: Vec<String>,
    pub key_concerns: Vec<String>,
    pub suggested_next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparableAnalysis {
    pub similar_companies: Vec<String>,
    pub market_positioning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub market_risk: Option<RiskLevel>,
    pub execution_risk: Option<RiskLevel>,
    pub financial_risk: Option<RiskLevel>,
    pub competitive_risk: Option<RiskLevel>,
}

/// Analyzer output. The default value is the degraded analysis: no flags,
/// no score, no ratings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvestmentAnalysis {
    pub investment_signals: InvestmentSignals,
    pub key_metrics_summary: KeyMetricsSummary,
    pub investment_recommendation: InvestmentRecommendation,
    pub comparable_analysis: ComparableAnalysis,
    pub risk_assessment: RiskAssessment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn str_at(o: &Map<String, Value>, key: &str) -> Option<String> {
    o.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
}

fn list_at(o: &Map<String, Value>, key: &str) -> Vec<String> {
    match o.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn flags_at(o: &Map<String, Value>, key: &str) -> Vec<Flag> {
    o.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Flag::from_json).collect())
        .unwrap_or_default()
}

fn object_at<'a>(o: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    o.get(key).and_then(Value::as_object)
}

fn risk_at(o: &Map<String, Value>, key: &str) -> Option<RiskLevel> {
    o.get(key).and_then(Value::as_str).and_then(Tier::parse)
}

fn score_of(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches("/100").trim().parse().ok()?,
        _ => return None,
    };
    (!n.is_nan()).then(|| n.clamp(0.0, 100.0))
}

impl InvestmentAnalysis {
    /// Empty analysis carrying the failure cause.
    pub fn degraded(cause: impl Into<String>) -> Self {
        Self {
            error: Some(cause.into()),
            ..Self::default()
        }
    }

    /// Lenient parse of a model response. Missing or malformed sections fall
    /// back to their defaults.
    pub fn from_json(root: &Map<String, Value>) -> Self {
        let empty = Map::new();

        let signals = object_at(root, "investment_signals").unwrap_or(&empty);
        let investment_signals = InvestmentSignals {
            green_flags: flags_at(signals, "green_flags"),
            red_flags: flags_at(signals, "red_flags"),
            yellow_flags: flags_at(signals, "yellow_flags"),
        };

        let key_metrics_summary = match object_at(root, "key_metrics_summary") {
            Some(km) => {
                let mut extra = km.clone();
                for k in [
                    "revenue_status",
                    "growth_trajectory",
                    "market_opportunity",
                    "team_strength",
                    "competitive_position",
                ] {
                    extra.remove(k);
                }
                KeyMetricsSummary {
                    revenue_status: str_at(km, "revenue_status"),
                    growth_trajectory: str_at(km, "growth_trajectory"),
                    market_opportunity: str_at(km, "market_opportunity"),
                    team_strength: str_at(km, "team_strength"),
                    competitive_position: str_at(km, "competitive_position"),
                    extra,
                }
            }
            None => KeyMetricsSummary::default(),
        };

        let rec = object_at(root, "investment_recommendation").unwrap_or(&empty);
        let investment_recommendation = InvestmentRecommendation {
            overall_score: rec.get("overall_score").and_then(score_of),
            recommendation: rec
                .get("recommendation")
                .and_then(Value::as_str)
                .and_then(Recommendation::parse),
            key_strengths: list_at(rec, "key_strengths"),
            key_concerns: list_at(rec, "key_concerns"),
            suggested_next_steps: list_at(rec, "suggested_next_steps"),
        };

        let comp = object_at(root, "comparable_analysis").unwrap_or(&empty);
        let comparable_analysis = ComparableAnalysis {
            similar_companies: list_at(comp, "similar_companies"),
            market_positioning: str_at(comp, "market_positioning"),
        };

        let risk = object_at(root, "risk_assessment").unwrap_or(&empty);
        let risk_assessment = RiskAssessment {
            market_risk: risk_at(risk, "market_risk"),
            execution_risk: risk_at(risk, "execution_risk"),
            financial_risk: risk_at(risk, "financial_risk"),
            competitive_risk: risk_at(risk, "competitive_risk"),
        };

        Self {
            investment_signals,
            key_metrics_summary,
            investment_recommendation,
            comparable_analysis,
            risk_assessment,
            error: None,
        }
    }
}
