//! Structured investment record produced by the extractor.
//!
//! The model is asked for a fixed JSON shape, but nothing guarantees it
//! complies. Every section here is parsed leniently from raw JSON:
//!
//! * a field that is missing or has an unexpected shape becomes a null
//!   [`ExtractedField`] with confidence `0.0`, never an error;
//! * keys the schema does not know are kept in each section's `extra` map so
//!   drift stays visible in the output bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Leaf values ──────────────────────────────────────────────────────────────

/// Scalar payload of an extracted field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Bool(bool),
    #[default]
    Null,
}

impl FieldValue {
    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Read a confidence score: a number or a numeric string, clamped to
/// `[0, 1]`. Anything else (including NaN) yields `None`.
pub fn confidence_value(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.is_nan() {
        return None;
    }
    Some(n.clamp(0.0, 1.0))
}

fn page_value(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|p| u32::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

const SOURCE_KEYS: [&str; 3] = ["source_slide", "source_page", "page"];

/// One leaf datum with unit, confidence and source page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<u32>,
    /// Extra descriptors such as `period` or valuation `type`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub qualifiers: Map<String, Value>,
    /// Original JSON when it could not be read as a field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ExtractedField {
    /// The "unknown" state: null value, confidence 0.
    pub fn null() -> Self {
        Self::default()
    }

    /// Parse either a bare scalar or an object
    /// `{value, unit|currency, confidence, source_slide|source_page|page, ..}`.
    pub fn from_json(v: &Value) -> Self {
        if let Some(value) = FieldValue::from_json(v) {
            return Self {
                value,
                ..Self::default()
            };
        }
        let Some(obj) = v.as_object() else {
            return Self {
                raw: Some(v.clone()),
                ..Self::default()
            };
        };

        let mut field = Self::default();
        let mut unreadable = false;
        for (key, val) in obj {
            match key.as_str() {
                "value" => match FieldValue::from_json(val) {
                    Some(fv) => field.value = fv,
                    None => unreadable = true,
                },
                "unit" | "currency" if field.unit.is_none() => {
                    field.unit = val.as_str().map(str::to_owned);
                }
                "confidence" => field.confidence = confidence_value(val).unwrap_or(0.0),
                k if SOURCE_KEYS.contains(&k) => {
                    if field.source_page.is_none() {
                        field.source_page = page_value(val);
                    }
                }
                _ => {
                    field.qualifiers.insert(key.clone(), val.clone());
                }
            }
        }
        if unreadable {
            field.value = FieldValue::Null;
            field.raw = Some(v.clone());
        }
        field
    }

    /// Field at `key` of `obj`, or the null field when absent.
    fn take(obj: &mut Map<String, Value>, key: &str) -> Self {
        obj.remove(key)
            .map(|v| Self::from_json(&v))
            .unwrap_or_default()
    }
}

// ── Lenient readers ──────────────────────────────────────────────────────────

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(o) => o.get("value").and_then(text_of),
        _ => None,
    }
}

fn take_text(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    obj.remove(key).as_ref().and_then(text_of)
}

fn take_list(obj: &mut Map<String, Value>, key: &str) -> Vec<String> {
    match obj.remove(key) {
        Some(Value::Array(items)) => items.iter().filter_map(text_of).collect(),
        Some(other) => text_of(&other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn take_section(root: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match root.remove(key) {
        Some(Value::Object(m)) => m,
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            let mut m = Map::new();
            m.insert("unparsed".into(), other);
            m
        }
    }
}

// ── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub name: Option<String>,
    pub founding_date: Option<String>,
    pub location: Option<String>,
    pub industry: Option<String>,
    pub mission: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompanyInfo {
    fn from_map(mut m: Map<String, Value>) -> Self {
        Self {
            name: take_text(&mut m, "name"),
            founding_date: take_text(&mut m, "founding_date"),
            location: take_text(&mut m, "location"),
            industry: take_text(&mut m, "industry"),
            mission: take_text(&mut m, "mission"),
            extra: m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketMetrics {
    #[serde(rename = "TAM")]
    pub tam: ExtractedField,
    #[serde(rename = "SAM")]
    pub sam: ExtractedField,
    #[serde(rename = "SOM")]
    pub som: ExtractedField,
    #[serde(rename = "CAGR")]
    pub cagr: ExtractedField,
    pub target_customer: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MarketMetrics {
    fn from_map(mut m: Map<String, Value>) -> Self {
        Self {
            tam: ExtractedField::take(&mut m, "TAM"),
            sam: ExtractedField::take(&mut m, "SAM"),
            som: ExtractedField::take(&mut m, "SOM"),
            cagr: ExtractedField::take(&mut m, "CAGR"),
            target_customer: take_text(&mut m, "target_customer"),
            extra: m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TractionMetrics {
    pub revenue: ExtractedField,
    #[serde(rename = "ARR")]
    pub arr: ExtractedField,
    #[serde(rename = "MRR")]
    pub mrr: ExtractedField,
    pub users: ExtractedField,
    pub growth_rate: ExtractedField,
    pub key_milestones: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TractionMetrics {
    fn from_map(mut m: Map<String, Value>) -> Self {
        Self {
            revenue: ExtractedField::take(&mut m, "revenue"),
            arr: ExtractedField::take(&mut m, "ARR"),
            mrr: ExtractedField::take(&mut m, "MRR"),
            users: ExtractedField::take(&mut m, "users"),
            growth_rate: ExtractedField::take(&mut m, "growth_rate"),
            key_milestones: take_list(&mut m, "key_milestones"),
            extra: m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub burn_rate: ExtractedField,
    pub runway_months: ExtractedField,
    #[serde(rename = "EBITDA")]
    pub ebitda: ExtractedField,
    pub gross_margin: ExtractedField,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FinancialMetrics {
    fn from_map(mut m: Map<String, Value>) -> Self {
        Self {
            burn_rate: ExtractedField::take(&mut m, "burn_rate"),
            runway_months: ExtractedField::take(&mut m, "runway_months"),
            ebitda: ExtractedField::take(&mut m, "EBITDA"),
            gross_margin: ExtractedField::take(&mut m, "gross_margin"),
            extra: m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FundingAsk {
    pub ask_amount: ExtractedField,
    pub valuation: ExtractedField,
    pub previous_funding: ExtractedField,
    pub use_of_funds: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FundingAsk {
    fn from_map(mut m: Map<String, Value>) -> Self {
        Self {
            ask_amount: ExtractedField::take(&mut m, "ask_amount"),
            valuation: ExtractedField::take(&mut m, "valuation"),
            previous_funding: ExtractedField::take(&mut m, "previous_funding"),
            use_of_funds: take_list(&mut m, "use_of_funds"),
            extra: m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: Option<String>,
    pub title: Option<String>,
    pub experience: Option<String>,
    pub linkedin: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TeamMember {
    fn from_json(v: &Value) -> Option<Self> {
        let mut m = match v {
            Value::Object(m) => m.clone(),
            Value::String(name) if !name.trim().is_empty() => {
                return Some(Self {
                    name: Some(name.clone()),
                    ..Self::default()
                })
            }
            _ => return None,
        };
        let confidence = m
            .remove("confidence")
            .as_ref()
            .and_then(confidence_value)
            .unwrap_or(0.0);
        let source_page = SOURCE_KEYS
            .iter()
            .filter_map(|k| m.remove(*k))
            .find_map(|v| page_value(&v));
        Some(Self {
            name: take_text(&mut m, "name"),
            title: take_text(&mut m, "title").or_else(|| take_text(&mut m, "role")),
            experience: take_text(&mut m, "experience")
                .or_else(|| take_text(&mut m, "background")),
            linkedin: take_text(&mut m, "linkedin"),
            confidence,
            source_page,
            extra: m,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BusinessModel {
    pub revenue_streams: Vec<String>,
    pub pricing_model: Option<String>,
    pub customer_acquisition_cost: ExtractedField,
    pub lifetime_value: ExtractedField,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BusinessModel {
    fn from_map(mut m: Map<String, Value>) -> Self {
        Self {
            revenue_streams: take_list(&mut m, "revenue_streams"),
            pricing_model: take_text(&mut m, "pricing_model"),
            customer_acquisition_cost: ExtractedField::take(&mut m, "customer_acquisition_cost"),
            lifetime_value: ExtractedField::take(&mut m, "lifetime_value"),
            extra: m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Competition {
    pub competitors: Vec<String>,
    pub competitive_advantages: Vec<String>,
    pub moat: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Competition {
    fn from_map(mut m: Map<String, Value>) -> Self {
        Self {
            competitors: take_list(&mut m, "competitors"),
            competitive_advantages: take_list(&mut m, "competitive_advantages"),
            moat: take_text(&mut m, "moat"),
            extra: m,
        }
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

/// The eight investment sections plus any top-level keys the schema does not
/// know. Serialises as the bundle's `extracted_data` object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedData {
    pub company: CompanyInfo,
    pub market: MarketMetrics,
    pub traction: TractionMetrics,
    pub financials: FinancialMetrics,
    pub funding: FundingAsk,
    pub team: Vec<TeamMember>,
    pub business_model: BusinessModel,
    pub competition: Competition,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractedData {
    /// Parse a model response object. Never fails; see the module docs.
    pub fn from_json(root: &Map<String, Value>) -> Self {
        let mut root = root.clone();
        let team = match root.remove("team") {
            Some(Value::Array(items)) => items.iter().filter_map(TeamMember::from_json).collect(),
            Some(single @ Value::Object(_)) => TeamMember::from_json(&single).into_iter().collect(),
            _ => Vec::new(),
        };
        // `ask` is an accepted alias for the funding section.
        let funding = if root.contains_key("funding") {
            take_section(&mut root, "funding")
        } else {
            take_section(&mut root, "ask")
        };
        Self {
            company: CompanyInfo::from_map(take_section(&mut root, "company")),
            market: MarketMetrics::from_map(take_section(&mut root, "market")),
            traction: TractionMetrics::from_map(take_section(&mut root, "traction")),
            financials: FinancialMetrics::from_map(take_section(&mut root, "financials")),
            funding: FundingAsk::from_map(funding),
            team,
            business_model: BusinessModel::from_map(take_section(&mut root, "business_model")),
            competition: Competition::from_map(take_section(&mut root, "competition")),
            extra: root,
        }
    }
}

/// Extractor output for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub data: ExtractedData,
    /// Mean of every `confidence` the model reported, 0.5 when none.
    pub overall_confidence: f64,
    pub extraction_timestamp: DateTime<Utc>,
    /// Model that produced the extraction.
    pub method: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_from_object() {
        let f = ExtractedField::from_json(&json!({
            "value": 5_000_000, "currency": "USD", "confidence": 0.8,
            "source_slide": 4, "type": "pre"
        }));
        assert_eq!(f.value, FieldValue::Number(5_000_000.0));
        assert_eq!(f.unit.as_deref(), Some("USD"));
        assert_eq!(f.confidence, 0.8);
        assert_eq!(f.source_page, Some(4));
        assert_eq!(f.qualifiers.get("type"), Some(&json!("pre")));
        assert!(f.raw.is_none());
    }

    #[test]
    fn field_from_bare_scalar_has_zero_confidence() {
        let f = ExtractedField::from_json(&json!("$2B"));
        assert_eq!(f.value, FieldValue::Text("$2B".into()));
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn field_with_odd_shape_degrades_to_null() {
        let f = ExtractedField::from_json(&json!([1, 2, 3]));
        assert!(f.value.is_null());
        assert_eq!(f.confidence, 0.0);
        assert_eq!(f.raw, Some(json!([1, 2, 3])));

        let f = ExtractedField::from_json(&json!({"value": {"low": 1}, "confidence": 0.4}));
        assert!(f.value.is_null());
        assert_eq!(f.confidence, 0.4);
        assert!(f.raw.is_some());
    }

    #[test]
    fn confidence_is_clamped_and_accepts_strings() {
        assert_eq!(confidence_value(&json!(1.7)), Some(1.0));
        assert_eq!(confidence_value(&json!(-0.2)), Some(0.0));
        assert_eq!(confidence_value(&json!("0.65")), Some(0.65));
        assert_eq!(confidence_value(&json!("high")), None);
        assert_eq!(confidence_value(&json!(null)), None);
    }

    #[test]
    fn data_parses_known_sections_and_keeps_unknown_keys() {
        let raw = json!({
            "company": {"name": "Acme", "industry": "Fintech", "ticker": "ACME"},
            "team": [
                {"name": "Alice", "title": "CEO", "confidence": 0.9, "source_slide": 2},
                "Bob",
                42
            ],
            "market": {"TAM": {"value": 1e9, "unit": "USD", "confidence": 0.7}},
            "esg": {"score": "A"}
        });
        let data = ExtractedData::from_json(raw.as_object().unwrap());
        assert_eq!(data.company.name.as_deref(), Some("Acme"));
        assert_eq!(data.company.extra.get("ticker"), Some(&json!("ACME")));
        assert_eq!(data.team.len(), 2);
        assert_eq!(data.team[0].title.as_deref(), Some("CEO"));
        assert_eq!(data.team[0].source_page, Some(2));
        assert_eq!(data.team[1].name.as_deref(), Some("Bob"));
        assert_eq!(data.market.tam.value.as_f64(), Some(1e9));
        assert!(data.market.sam.value.is_null());
        assert!(data.extra.contains_key("esg"));
    }

    #[test]
    fn non_object_section_is_kept_as_unparsed() {
        let raw = json!({"traction": "strong growth"});
        let data = ExtractedData::from_json(raw.as_object().unwrap());
        assert_eq!(
            data.traction.extra.get("unparsed"),
            Some(&json!("strong growth"))
        );
    }

    #[test]
    fn serialised_data_has_bundle_keys() {
        let v = serde_json::to_value(ExtractedData::default()).unwrap();
        for key in [
            "company", "market", "traction", "financials", "funding", "team",
            "business_model", "competition",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert!(v["market"].get("TAM").is_some());
    }
}
