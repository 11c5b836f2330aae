use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use regcheck_core::Severity;

/// A violation as reported by the model, before it is tagged with a rule id.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub start_line: u32,
    pub end_line: u32,
    pub description: String,
    pub severity: Severity,
}

/// A model-invocation site as reported by the model, before pricing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCall {
    #[serde(deserialize_with = "lenient_line")]
    pub start_line: u32,
    #[serde(default, deserialize_with = "lenient_optional_line")]
    pub end_line: Option<u32>,
    #[serde(default = "unknown_model")]
    pub model: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub estimated_input_tokens: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub estimated_output_tokens: u64,
    #[serde(default = "other_call_type")]
    pub call_type: String,
    #[serde(default)]
    pub description: String,
}

fn unknown_model() -> String {
    "unknown".to_string()
}

fn other_call_type() -> String {
    "other".to_string()
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let v = Value::deserialize(d)?;
    count(&v).ok_or_else(|| D::Error::custom(format!("expected a non-negative count, got {v}")))
}

fn lenient_line<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = Value::deserialize(d)?;
    count(&v)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| D::Error::custom(format!("expected a line number, got {v}")))
}

fn lenient_optional_line<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        v => count(&v)
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected a line number, got {v}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed model output: {reason}")]
pub struct MalformedOutput {
    pub reason: String,
}

impl MalformedOutput {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub const FALLBACK_DESCRIPTION: &str = "The model response could not be parsed as JSON. \
Manual review of the whole file is required for this rule.";

/// The record substituted for a rule whose model output was unparseable:
/// the whole file, flagged for human review.
pub fn fallback_finding(total_lines: u32) -> Finding {
    Finding {
        start_line: 1,
        end_line: total_lines.max(1),
        description: FALLBACK_DESCRIPTION.to_string(),
        severity: Severity::Medium,
    }
}

/// Parse `{"violations": [...]}` out of raw model output. Only a failed decode
/// is malformed; an object without a `violations` array reports nothing.
pub fn parse_violations(raw: &str) -> Result<Vec<Finding>, MalformedOutput> {
    let root = decode_object(raw)?;
    let Some(items) = root.get("violations").and_then(Value::as_array) else {
        warn!("model output has no \"violations\" array; treating as no findings");
        return Ok(Vec::new());
    };

    Ok(items.iter().filter_map(finding_from_value).collect())
}

/// Parse `{"llm_calls": [...]}` out of raw model output. Items that do not
/// decode are skipped.
pub fn parse_cost_calls(raw: &str) -> Result<Vec<RawCall>, MalformedOutput> {
    let root = decode_object(raw)?;
    let items = root
        .get("llm_calls")
        .and_then(Value::as_array)
        .ok_or_else(|| MalformedOutput::new("missing \"llm_calls\" array"))?;

    Ok(items
        .iter()
        .filter_map(|item| match RawCall::deserialize(item) {
            Ok(call) => Some(call),
            Err(e) => {
                warn!(error = %e, "skipping undecodable llm_calls entry");
                None
            }
        })
        .collect())
}

/// Strict decode first, then the outermost `{...}` span (drops markdown fences
/// and any prose around the object).
fn decode_object(raw: &str) -> Result<Value, MalformedOutput> {
    let trimmed = raw.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let candidate = extract_json_object(trimmed)
        .ok_or_else(|| MalformedOutput::new("no JSON object in output"))?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(MalformedOutput::new("top-level JSON is not an object")),
        Err(e) => Err(MalformedOutput::new(e.to_string())),
    }
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

fn finding_from_value(item: &Value) -> Option<Finding> {
    let obj = item.as_object()?;
    let start_line = obj.get("start_line").and_then(line_number).unwrap_or(1);
    let end_line = obj
        .get("end_line")
        .and_then(line_number)
        .unwrap_or(start_line);
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let severity = Severity::parse_lenient(obj.get("severity").and_then(Value::as_str));

    Some(Finding {
        start_line,
        end_line,
        description,
        severity,
    })
}

fn line_number(v: &Value) -> Option<u32> {
    count(v)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= 1)
}

/// Models sometimes emit integers as floats or strings.
fn count(v: &Value) -> Option<u64> {
    let whole = |f: f64| (f.is_finite() && f >= 0.0).then(|| f as u64);
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_strict_json() {
        let raw = r#"{"violations":[{"start_line":1,"end_line":1,"description":"logs PII","severity":"high"}]}"#;
        assert_eq!(
            parse_violations(raw).unwrap(),
            vec![Finding {
                start_line: 1,
                end_line: 1,
                description: "logs PII".into(),
                severity: Severity::High,
            }]
        );
    }

    #[test]
    fn empty_array_means_no_findings() {
        assert!(parse_violations(r#"{"violations": []}"#).unwrap().is_empty());
    }

    #[test]
    fn repairs_fenced_output() {
        let raw = "Here you go:\n```json\n{\"violations\": [{\"start_line\": 3, \"end_line\": 5, \"description\": \"x\", \"severity\": \"low\"}]}\n```\n";
        let findings = parse_violations(raw).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line, 3);
        assert_eq!(findings[0].end_line, 5);
        assert_eq!(findings[0].severity, Severity::Low);
    }

    #[test]
    fn fills_defaults_for_sparse_items() {
        let raw = r#"{"violations":[{"start_line":"4","description":"d","severity":"critical"}, "junk"]}"#;
        assert_eq!(
            parse_violations(raw).unwrap(),
            vec![Finding {
                start_line: 4,
                end_line: 4,
                description: "d".into(),
                severity: Severity::Medium,
            }]
        );
    }

    #[test]
    fn prose_is_malformed() {
        assert!(parse_violations("I could not find any problems.").is_err());
        assert!(parse_violations("{not json at all}").is_err());
        assert!(parse_violations("[]").is_err());
    }

    #[test]
    fn decoded_object_without_array_has_no_findings() {
        for raw in [
            "{}",
            r#"{"violations": null}"#,
            r#"{"violations": "none"}"#,
            "```json\n{\"result\": \"clean\"}\n```",
        ] {
            assert!(parse_violations(raw).unwrap().is_empty(), "{raw}");
        }
    }

    #[test]
    fn fallback_spans_whole_file() {
        let f = fallback_finding(42);
        assert_eq!((f.start_line, f.end_line, f.severity), (1, 42, Severity::Medium));
        assert!(f.description.contains("Manual review"));
        assert_eq!(fallback_finding(0).end_line, 1);
    }

    #[test]
    fn parses_cost_calls_and_skips_bad_items() {
        let raw = r#"{"llm_calls": [
            {"start_line": 10, "end_line": 15, "model": "gpt-4", "estimated_input_tokens": 300,
             "estimated_output_tokens": 500, "call_type": "chat", "description": "summary"},
            {"start_line": 20, "estimated_input_tokens": -5},
            {"start_line": 30}
        ]}"#;
        let calls = parse_cost_calls(raw).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "gpt-4");
        assert_eq!(calls[0].end_line, Some(15));
        assert_eq!(calls[1].model, "unknown");
        assert_eq!(calls[1].call_type, "other");
        assert_eq!(calls[1].estimated_input_tokens, 0);
    }

    #[test]
    fn cost_numbers_accept_floats_and_strings() {
        let raw = r#"{"llm_calls": [
            {"start_line": "12", "end_line": 14.0, "model": "gpt-4",
             "estimated_input_tokens": 350.0, "estimated_output_tokens": "120"},
            {"start_line": 20, "end_line": null, "estimated_input_tokens": "lots"}
        ]}"#;
        let calls = parse_cost_calls(raw).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].start_line, 12);
        assert_eq!(calls[0].end_line, Some(14));
        assert_eq!(calls[0].estimated_input_tokens, 350);
        assert_eq!(calls[0].estimated_output_tokens, 120);
    }

    #[test]
    fn cost_output_without_array_is_malformed() {
        assert!(parse_cost_calls(r#"{"calls": []}"#).is_err());
        assert!(parse_cost_calls("no calls found").is_err());
    }
}
