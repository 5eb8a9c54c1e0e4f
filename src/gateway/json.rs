//! Recover a JSON value from a free-text completion.
//!
//! Models asked for "JSON only" still wrap the payload in Markdown fences or
//! prefix it with a byte-order mark. The rules below run in order:
//!
//! 1. Trim and drop invisible leading characters (BOM, zero-width spaces)
//! 2. Strip a leading ```` ```json ```` or ```` ``` ```` fence (any case)
//! 3. Strip a trailing ```` ``` ```` fence
//! 4. Parse with `serde_json`

use crate::error::GatewayError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Characters of the completion kept in a [`GatewayError::MalformedResponse`].
pub const EXCERPT_CHARS: usize = 500;

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?[ \t]*").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\s*$").unwrap());

const INVISIBLE: [char; 5] = ['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

/// Remove Markdown code-fence markers around a completion.
pub fn strip_fences(raw: &str) -> &str {
    let s = raw.trim().trim_start_matches(INVISIBLE).trim();
    let s = match RE_LEADING_FENCE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = match RE_TRAILING_FENCE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim()
}

/// Parse a completion into JSON after fence stripping.
pub fn parse_completion(raw: &str) -> Result<Value, GatewayError> {
    let body = strip_fences(raw);
    serde_json::from_str(body).map_err(|e| GatewayError::MalformedResponse {
        detail: e.to_string(),
        excerpt: crate::prompts::truncate_chars(raw, EXCERPT_CHARS).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_and_bare_payloads_parse_identically() {
        let bare = r#"{"problem": [1], "team": [2]}"#;
        let fenced = format!("```json\n{bare}\n```");
        assert_eq!(parse_completion(bare).unwrap(), parse_completion(&fenced).unwrap());
    }

    #[test]
    fn strips_plain_and_uppercase_fences() {
        assert_eq!(strip_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("```JSON\n{}\n```  \n"), "{}");
        assert_eq!(strip_fences("\u{FEFF}```json {\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn unbalanced_fences_are_tolerated() {
        assert_eq!(parse_completion("```json\n{\"a\": 1}").unwrap(), json!({"a": 1}));
        assert_eq!(parse_completion("{\"a\": 1}\n```").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn prose_is_malformed_with_excerpt() {
        let raw = format!("Sure! Here is the JSON you asked for: {}", "x".repeat(800));
        match parse_completion(&raw) {
            Err(GatewayError::MalformedResponse { excerpt, detail }) => {
                assert_eq!(excerpt.chars().count(), EXCERPT_CHARS);
                assert!(excerpt.starts_with("Sure!"));
                assert!(!detail.is_empty());
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn empty_completion_is_malformed() {
        assert!(matches!(
            parse_completion("   "),
            Err(GatewayError::MalformedResponse { .. })
        ));
    }
}
