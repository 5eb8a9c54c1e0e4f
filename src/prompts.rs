//! Prompt templates for the LLM stages.
//!
//! Each template holds one `{placeholder}` per dynamic part and is filled by
//! the matching `*_prompt` function. Page text is always inserted last so a
//! deck that happens to contain `{content}` cannot inject into the template.

use crate::model::{ParsedPage, SectionMap};

/// Appended by the gateway to every JSON request.
pub const JSON_ONLY_INSTRUCTION: &str = "Respond with valid JSON only, no additional text.";

/// Classifier prompt. Placeholder: `{slides_content}`.
pub const CLASSIFICATION_PROMPT: &str = r#"You are analyzing a startup pitch deck. Classify each slide into ONE of these categories:

Categories:
1. company_overview - Company introduction, mission, vision
2. problem - Problem statement, pain points, market gap
3. solution - Solution description, value proposition
4. market - Market size (TAM/SAM/SOM), market opportunity, target market
5. product - Product features, demo, technology
6. business_model - Revenue model, pricing, go-to-market strategy
7. traction - Metrics, growth, achievements, milestones, revenue
8. financials - Financial projections, P&L, burn rate, runway
9. competition - Competitive landscape, competitive advantages
10. team - Founders, team members, advisors, experience
11. funding_ask - Funding amount, use of funds, valuation

Analyze these slides and classify each one:

{slides_content}

Respond with JSON in this EXACT format:
{
  "section_map": {
    "company_overview": [slide_numbers],
    "problem": [slide_numbers],
    "solution": [slide_numbers],
    "market": [slide_numbers],
    "product": [slide_numbers],
    "business_model": [slide_numbers],
    "traction": [slide_numbers],
    "financials": [slide_numbers],
    "competition": [slide_numbers],
    "team": [slide_numbers],
    "funding_ask": [slide_numbers]
  },
  "slide_classifications": [
    {
      "slide_no": 1,
      "category": "company_overview",
      "confidence": 0.95,
      "reasoning": "brief explanation"
    }
  ]
}"#;

/// Extractor prompt. Placeholders: `{section_map}`, `{content}`.
pub const EXTRACTION_PROMPT: &str = r#"Extract structured investment information from this pitch deck.

Slides Content:
{content}

Section Map:
{section_map}

Extract the following with EXACT field names and include source tracking:

{
  "company": {
    "name": "string or null",
    "founding_date": "YYYY-MM-DD or null",
    "location": "string or null",
    "industry": "string or null",
    "mission": "string or null"
  },
  "market": {
    "TAM": {"value": number, "unit": "USD/users", "confidence": 0-1, "source_slide": number},
    "SAM": {"value": number, "unit": "USD/users", "confidence": 0-1, "source_slide": number},
    "SOM": {"value": number, "unit": "USD/users", "confidence": 0-1, "source_slide": number},
    "CAGR": {"value": number, "unit": "percent", "confidence": 0-1, "source_slide": number},
    "target_customer": "string or null"
  },
  "traction": {
    "revenue": {"value": number, "currency": "USD", "confidence": 0-1, "source_slide": number},
    "ARR": {"value": number, "currency": "USD", "confidence": 0-1, "source_slide": number},
    "MRR": {"value": number, "currency": "USD", "confidence": 0-1, "source_slide": number},
    "users": {"value": number, "confidence": 0-1, "source_slide": number},
    "growth_rate": {"value": number, "unit": "percent", "period": "monthly/yearly", "confidence": 0-1, "source_slide": number},
    "key_milestones": ["string"]
  },
  "financials": {
    "burn_rate": {"value": number, "currency": "USD", "period": "monthly", "confidence": 0-1, "source_slide": number},
    "runway_months": {"value": number, "confidence": 0-1, "source_slide": number},
    "EBITDA": {"value": number, "currency": "USD", "confidence": 0-1, "source_slide": number},
    "gross_margin": {"value": number, "unit": "percent", "confidence": 0-1, "source_slide": number}
  },
  "funding": {
    "ask_amount": {"value": number, "currency": "USD", "confidence": 0-1, "source_slide": number},
    "valuation": {"value": number, "currency": "USD", "type": "pre/post", "confidence": 0-1, "source_slide": number},
    "previous_funding": {"value": number, "currency": "USD", "confidence": 0-1, "source_slide": number},
    "use_of_funds": ["string"]
  },
  "team": [
    {
      "name": "string",
      "title": "string",
      "experience": "string",
      "linkedin": "url or null",
      "confidence": 0-1,
      "source_slide": number
    }
  ],
  "business_model": {
    "revenue_streams": ["string"],
    "pricing_model": "string or null",
    "customer_acquisition_cost": {"value": number, "currency": "USD", "confidence": 0-1},
    "lifetime_value": {"value": number, "currency": "USD", "confidence": 0-1}
  },
  "competition": {
    "competitors": ["string"],
    "competitive_advantages": ["string"],
    "moat": "string or null"
  }
}

IMPORTANT:
- Use null for missing data
- Extract numbers without currency symbols in the value field
- Confidence should reflect extraction certainty (0.0 to 1.0)
- source_slide must be the actual slide number where data was found
- For arrays, include all items found"#;

/// Analyzer prompt. Placeholder: `{extracted_data}`.
pub const ANALYSIS_PROMPT: &str = r#"Analyze this startup pitch deck data and generate investment signals.

Extracted Data:
{extracted_data}

Generate a comprehensive investment analysis with:

{
  "investment_signals": {
    "green_flags": [
      {"signal": "string", "reasoning": "string", "importance": "high/medium/low"}
    ],
    "red_flags": [
      {"signal": "string", "reasoning": "string", "severity": "high/medium/low"}
    ],
    "yellow_flags": [
      {"signal": "string", "reasoning": "string"}
    ]
  },
  "key_metrics_summary": {
    "revenue_status": "string",
    "growth_trajectory": "string",
    "market_opportunity": "string",
    "team_strength": "string",
    "competitive_position": "string"
  },
  "investment_recommendation": {
    "overall_score": 0-100,
    "recommendation": "strong_pass/pass/maybe/no_pass",
    "key_strengths": ["string"],
    "key_concerns": ["string"],
    "suggested_next_steps": ["string"]
  },
  "comparable_analysis": {
    "similar_companies": ["string"],
    "market_positioning": "string"
  },
  "risk_assessment": {
    "market_risk": "high/medium/low",
    "execution_risk": "high/medium/low",
    "financial_risk": "high/medium/low",
    "competitive_risk": "high/medium/low"
  }
}

Be specific and data-driven in your analysis."#;

/// The first `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Slide listing for the classifier: a `--- Slide N ---` marker plus the
/// first `page_chars` characters of each page, stopping at `budget`
/// characters. A marker is never cut; the page text after it may be.
pub fn classification_prompt(pages: &[ParsedPage], page_chars: usize, budget: usize) -> String {
    let mut listing = String::new();
    let mut used = 0usize;
    for page in pages {
        let marker = format!("\n--- Slide {} ---\n", page.number);
        let marker_len = marker.chars().count();
        if used + marker_len > budget {
            break;
        }
        listing.push_str(&marker);
        used += marker_len;

        let room = budget - used;
        let snippet = truncate_chars(truncate_chars(&page.raw_text, page_chars), room.saturating_sub(1));
        listing.push_str(snippet);
        listing.push('\n');
        used += snippet.chars().count() + 1;
    }
    CLASSIFICATION_PROMPT.replacen("{slides_content}", &listing, 1)
}

/// `category: slides [..]` lines for every non-empty section.
pub fn section_map_summary(map: &SectionMap) -> String {
    map.iter()
        .filter(|(_, pages)| !pages.is_empty())
        .map(|(cat, pages)| format!("{cat}: slides {pages:?}\n"))
        .collect()
}

/// Extraction prompt: every page under a `=== Slide N ===` header, the whole
/// listing cut to `budget` characters, plus the section map summary.
pub fn extraction_prompt(pages: &[ParsedPage], section_map: &SectionMap, budget: usize) -> String {
    let mut content = String::new();
    for page in pages {
        content.push_str(&format!("\n=== Slide {} ===\n", page.number));
        content.push_str(&page.raw_text);
        content.push('\n');
    }
    EXTRACTION_PROMPT
        .replacen("{section_map}", &section_map_summary(section_map), 1)
        .replacen("{content}", truncate_chars(&content, budget), 1)
}

/// Analysis prompt over already-serialised extraction data.
pub fn analysis_prompt(extracted_json: &str, budget: usize) -> String {
    ANALYSIS_PROMPT.replacen("{extracted_data}", truncate_chars(extracted_json, budget), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SectionCategory;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn classification_prompt_limits_each_page() {
        let pages = vec![
            ParsedPage::from_text(1, "x".repeat(900)),
            ParsedPage::from_text(2, "Our team: Alice, CEO"),
        ];
        let p = classification_prompt(&pages, 500, 8000);
        assert!(p.contains("--- Slide 1 ---"));
        assert!(p.contains("--- Slide 2 ---\nOur team: Alice, CEO"));
        assert!(p.contains(&"x".repeat(500)));
        assert!(!p.contains(&"x".repeat(501)));
        assert!(!p.contains("{slides_content}"));
    }

    #[test]
    fn classification_prompt_respects_total_budget() {
        let pages: Vec<_> = (1..=100)
            .map(|n| ParsedPage::from_text(n, "y".repeat(500)))
            .collect();
        let p = classification_prompt(&pages, 500, 8000);
        let listing_len = p.chars().count() - CLASSIFICATION_PROMPT.chars().count()
            + "{slides_content}".len();
        assert!(listing_len <= 8000, "listing was {listing_len}");
        assert!(!p.contains("--- Slide 100 ---"));
    }

    #[test]
    fn extraction_prompt_lists_sections_and_pages() {
        let pages = vec![ParsedPage::from_text(1, "We are solving X")];
        let mut map = SectionMap::empty();
        map.insert(SectionCategory::Problem, 1);
        let p = extraction_prompt(&pages, &map, 12_000);
        assert!(p.contains("=== Slide 1 ===\nWe are solving X"));
        assert!(p.contains("problem: slides [1]"));
        assert!(!p.contains("team: slides"));
    }

    #[test]
    fn page_text_is_not_templated() {
        let pages = vec![ParsedPage::from_text(1, "literal {section_map} here")];
        let p = extraction_prompt(&pages, &SectionMap::empty(), 12_000);
        assert!(p.contains("literal {section_map} here"));
    }
}
