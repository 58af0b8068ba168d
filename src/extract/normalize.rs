//! Response normalization into the canonical [`ExtractionRecord`].
//!
//! Provider adapters hand over a parsed JSON payload; everything here is
//! provider-agnostic. Vocabulary differences between backends are absorbed
//! by the alias table rather than by branching on the provider.

use serde_json::{Map, Value};
use thiserror::Error;

use super::record::ExtractionRecord;

/// Errors produced while turning provider output into a record.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unexpected payload shape: {0}")]
    Schema(String),
}

const RECIPIENT_KEYS: &[&str] = &["recipient", "recipient_name", "name"];
const ADDRESS_KEYS: &[&str] = &["addressLine", "address_line", "address", "text", "street"];
const POSTAL_CODE_KEYS: &[&str] = &[
    "postalCode",
    "postal_code",
    "pin_code",
    "pincode",
    "zip",
    "zip_code",
    "pin",
];
const CITY_KEYS: &[&str] = &["city", "town"];
const REGION_KEYS: &[&str] = &["region", "state", "province"];
const COUNTRY_KEYS: &[&str] = &["country"];
const SORTING_CENTER_ID_KEYS: &[&str] = &["sortingCenterId", "sorting_center_id"];
const SORTING_CENTER_NAME_KEYS: &[&str] = &["sortingCenterName", "sorting_center_name"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "confidence_score"];

/// Remove markdown code fences around model output.
///
/// Handles ```` ```json ```` and bare ```` ``` ```` fences, fenced blocks
/// embedded in prose, and an unterminated opening fence (truncated output).
/// Text without fences is returned trimmed.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after_open = &trimmed[open + 3..];
    let tag_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let body = &after_open[tag_len..];

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Fence-strip and parse a provider's text output as JSON.
///
/// A JSON string whose content is itself JSON is unwrapped. If the text has
/// prose around an unfenced object, the outermost `{...}` span is tried,
/// first in the fence-stripped text and then in the raw text (a stray
/// closing fence after the object strips to nothing).
pub fn parse_payload(text: &str) -> Result<Value, NormalizeError> {
    let stripped = strip_fences(text);
    let raw = text.trim();

    let value = if stripped.is_empty() {
        outer_object(raw).ok_or_else(|| NormalizeError::Malformed("empty response".to_string()))?
    } else {
        match serde_json::from_str::<Value>(stripped) {
            Ok(value) => value,
            Err(err) => outer_object(stripped)
                .or_else(|| outer_object(raw))
                .ok_or_else(|| NormalizeError::Malformed(err.to_string()))?,
        }
    };

    match value {
        Value::String(inner) => parse_payload(&inner),
        other => Ok(other),
    }
}

fn outer_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Map a parsed payload onto the canonical record.
///
/// Only a non-object payload is rejected. Missing fields default to empty
/// strings and an empty object yields a blank record with confidence 0, so
/// the operator still sees what the backend produced.
pub fn normalize(payload: &Value) -> Result<ExtractionRecord, NormalizeError> {
    let object = match payload {
        Value::Object(map) => map,
        Value::Array(items) => items.iter().find_map(Value::as_object).ok_or_else(|| {
            NormalizeError::Schema("array contains no object candidates".to_string())
        })?,
        other => {
            return Err(NormalizeError::Schema(format!(
                "expected a JSON object, got {}",
                json_type(other)
            )))
        }
    };

    let region = text_field(object, REGION_KEYS);

    Ok(ExtractionRecord {
        recipient: text_field(object, RECIPIENT_KEYS),
        address_line: text_field(object, ADDRESS_KEYS),
        postal_code: text_field(object, POSTAL_CODE_KEYS),
        city: text_field(object, CITY_KEYS),
        region: (!region.is_empty()).then_some(region),
        country: text_field(object, COUNTRY_KEYS),
        sorting_center_id: text_field(object, SORTING_CENTER_ID_KEYS),
        sorting_center_name: text_field(object, SORTING_CENTER_NAME_KEYS),
        confidence: confidence_field(object),
    })
}

/// Parse and normalize in one step.
pub fn normalize_text(text: &str) -> Result<ExtractionRecord, NormalizeError> {
    normalize(&parse_payload(text)?)
}

/// Scale a reported confidence to an integer percentage.
///
/// Values in `(0, 1]` are fractions and are multiplied by 100; anything else
/// is taken as already scaled. The result is clamped into `0..=100`.
pub fn normalize_confidence(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    let scaled = if value > 0.0 && value <= 1.0 {
        value * 100.0
    } else {
        value
    };
    scaled.round().clamp(0.0, 100.0) as u8
}

fn confidence_field(object: &Map<String, Value>) -> u8 {
    CONFIDENCE_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_f64))
        .map(normalize_confidence)
        .unwrap_or(0)
}

/// First non-empty value among the aliases, rendered as a trimmed string.
fn text_field(object: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .map(value_text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        // Multi-line addresses sometimes come back as a list of lines
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Bool(_) | Value::Object(_) => String::new(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_confidence_units() {
        let cases = [
            (0.0, 0),
            (0.01, 1),
            (0.5, 50),
            (1.0, 100),
            (50.0, 50),
            (95.4, 95),
            (100.0, 100),
            (150.0, 100),
            (-3.0, 0),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_confidence(input), expected, "input {}", input);
        }
    }

    #[test]
    fn test_confidence_integer_one_is_a_fraction() {
        let record = normalize(&json!({"confidence": 1})).unwrap();
        assert_eq!(record.confidence, 100);
    }

    #[test]
    fn test_confidence_absent_or_non_numeric() {
        assert_eq!(normalize(&json!({})).unwrap().confidence, 0);
        assert_eq!(normalize(&json!({"confidence": "high"})).unwrap().confidence, 0);
        assert_eq!(normalize(&json!({"confidence": null})).unwrap().confidence, 0);
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(
            strip_fences("Here you go:\n```json\n{\"a\":1}\n```\nAnything else?"),
            "{\"a\":1}"
        );
        assert_eq!(strip_fences("```json\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_fences("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_payload_prose_around_object() {
        let value = parse_payload("Sure! {\"city\": \"Chennai\"} Hope that helps.").unwrap();
        assert_eq!(value["city"], "Chennai");
    }

    #[test]
    fn test_parse_payload_double_encoded() {
        let value = parse_payload(r#""{\"city\": \"Kochi\"}""#).unwrap();
        assert_eq!(value["city"], "Kochi");
    }

    #[test]
    fn test_parse_payload_trailing_fence_only() {
        let value = parse_payload("{\"recipient\":\"A\",\"pin_code\":\"400001\"}\n```").unwrap();
        assert_eq!(value["pin_code"], "400001");

        let record = normalize_text("Result:\n{\"pin_code\":\"400001\"}\n```").unwrap();
        assert_eq!(record.postal_code, "400001");
    }

    #[test]
    fn test_parse_payload_malformed() {
        assert!(matches!(
            parse_payload("I could not read the envelope."),
            Err(NormalizeError::Malformed(_))
        ));
        assert!(matches!(parse_payload("```json\n```"), Err(NormalizeError::Malformed(_))));
    }

    #[test]
    fn test_aliases() {
        let record = normalize(&json!({
            "name": "A. Kumar",
            "text": "14 Park Street",
            "pin": 700016,
            "town": "Kolkata",
            "state": "West Bengal",
            "country": "India",
            "sorting_center_id": "KOL-NSH",
            "sorting_center_name": "Kolkata NSH",
            "confidence": 0.874
        }))
        .unwrap();

        assert_eq!(record.recipient, "A. Kumar");
        assert_eq!(record.address_line, "14 Park Street");
        assert_eq!(record.postal_code, "700016");
        assert_eq!(record.city, "Kolkata");
        assert_eq!(record.region.as_deref(), Some("West Bengal"));
        assert_eq!(record.sorting_center_name, "Kolkata NSH");
        assert_eq!(record.confidence, 87);
    }

    #[test]
    fn test_empty_alias_falls_through() {
        let record = normalize(&json!({"address": "", "text": "5 Lake Road"})).unwrap();
        assert_eq!(record.address_line, "5 Lake Road");
    }

    #[test]
    fn test_address_lines_joined() {
        let record = normalize(&json!({"address": ["Flat 3", "", "Hill View"]})).unwrap();
        assert_eq!(record.address_line, "Flat 3, Hill View");
    }

    #[test]
    fn test_canonical_record_is_fixed_point() {
        let record = ExtractionRecord {
            recipient: "J. Doe".to_string(),
            address_line: "221B Baker Street".to_string(),
            postal_code: "NW1 6XE".to_string(),
            city: "London".to_string(),
            region: Some("Greater London".to_string()),
            country: "UK".to_string(),
            sorting_center_id: "LDN-MC".to_string(),
            sorting_center_name: "London Mail Centre".to_string(),
            confidence: 88,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(normalize(&value).unwrap(), record);

        let blank = ExtractionRecord::default();
        let value = serde_json::to_value(&blank).unwrap();
        assert_eq!(normalize(&value).unwrap(), blank);
    }

    #[test]
    fn test_empty_object_is_blank_record() {
        let record = normalize(&json!({})).unwrap();
        assert_eq!(record, ExtractionRecord::default());
    }

    #[test]
    fn test_array_candidates() {
        let record = normalize(&json!([1, {"city": "Agra"}, {"city": "Delhi"}])).unwrap();
        assert_eq!(record.city, "Agra");
        assert!(matches!(normalize(&json!([])), Err(NormalizeError::Schema(_))));
    }

    #[test]
    fn test_non_object_is_schema_error() {
        assert!(matches!(normalize(&json!("text")), Err(NormalizeError::Schema(_))));
        assert!(matches!(normalize(&json!(42)), Err(NormalizeError::Schema(_))));
    }

    #[test]
    fn test_fenced_fraction_confidence() {
        let text = "```json\n{\"recipient\":\"J. Doe\",\"pin_code\":\"400001\",\"confidence\":0.92}\n```";
        let record = normalize_text(text).unwrap();
        assert_eq!(record.recipient, "J. Doe");
        assert_eq!(record.postal_code, "400001");
        assert_eq!(record.confidence, 92);
        assert_eq!(record.address_line, "");
        assert_eq!(record.city, "");
        assert_eq!(record.country, "");
        assert_eq!(record.region, None);
    }
}
