pub mod error;
pub mod pricing;
pub mod registry;

pub use error::Error;
pub use pricing::{ModelPrice, PriceTable};
pub use registry::RuleRegistry;

use serde::{Deserialize, Serialize};

// --- Rules ---

/// A named rule the model checks source files against. Regulations and code
/// rules share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Rule {
    /// Unique identifier within its registry, e.g. "GDPR-5"
    pub id: String,
    /// What the rule enforces, in plain language
    pub description: String,
}

impl Rule {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Regulation,
    CodeRule,
}

impl RuleKind {
    pub fn label(self) -> &'static str {
        match self {
            RuleKind::Regulation => "regulation",
            RuleKind::CodeRule => "code rule",
        }
    }
}

// --- Findings ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Lenient parse for model output. Anything unrecognised is `Medium`.
    pub fn parse_lenient(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Severity::Low,
            Some("high") => Severity::High,
            _ => Severity::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub start_line: u32,
    pub end_line: u32,
    pub rule_id: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
}

/// One model-invocation site found in a source file, priced against the
/// active [`PriceTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub start_line: u32,
    pub end_line: u32,
    pub model: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub call_type: String,
    pub description: String,
    pub estimated_cost: f64,
}

// --- Uploaded source ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub filename: String,
    pub text: String,
    pub total_lines: u32,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let total_lines = u32::try_from(text.lines().count()).unwrap_or(u32::MAX);
        Self {
            filename: filename.into(),
            text,
            total_lines,
        }
    }

    /// Decode an uploaded file. Non-UTF-8 content is rejected.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, Error> {
        let filename = filename.into();
        let text = String::from_utf8(bytes).map_err(|e| Error::Decode {
            filename: filename.clone(),
            reason: e.utf8_error().to_string(),
        })?;
        Ok(Self::new(filename, text))
    }
}

// --- Responses ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub filename: String,
    pub total_lines: u32,
    pub total_violations: usize,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub filename: String,
    pub total_lines: u32,
    pub total_calls: usize,
    pub total_estimated_cost: f64,
    pub llm_calls: Vec<CostEstimate>,
}

// --- Gateway settings ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewaySettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

impl GatewaySettings {
    pub fn is_configured(&self) -> bool {
        !self.provider.is_empty()
            && !self.model.is_empty()
            && (self.provider == "ollama" || !self.api_key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_falls_back_to_medium() {
        assert_eq!(Severity::parse_lenient(Some("HIGH")), Severity::High);
        assert_eq!(Severity::parse_lenient(Some(" low ")), Severity::Low);
        assert_eq!(Severity::parse_lenient(Some("critical")), Severity::Medium);
        assert_eq!(Severity::parse_lenient(None), Severity::Medium);
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
    }

    #[test]
    fn source_file_counts_lines() {
        assert_eq!(SourceFile::new("a.py", "").total_lines, 0);
        assert_eq!(SourceFile::new("a.py", "x = 1").total_lines, 1);
        assert_eq!(SourceFile::new("a.py", "x = 1\ny = 2\n").total_lines, 2);
        assert_eq!(SourceFile::new("a.py", "x = 1\r\ny = 2\r\nz").total_lines, 3);
    }

    #[test]
    fn source_file_rejects_non_utf8() {
        let err = SourceFile::from_bytes("bad.py", vec![0x66, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, Error::Decode { ref filename, .. } if filename == "bad.py"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let settings = GatewaySettings {
            provider: "ollama".into(),
            api_key: String::new(),
            model: "llama3".into(),
        };
        assert!(settings.is_configured());

        let settings = GatewaySettings {
            provider: "openai".into(),
            ..settings
        };
        assert!(!settings.is_configured());
    }
}
