use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Error;

pub const DEFAULT_ROW: &str = "default";

/// USD per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

const BUILTIN: &[(&str, ModelPrice)] = &[
    ("gpt-4", ModelPrice::new(0.03, 0.06)),
    ("gpt-4-32k", ModelPrice::new(0.06, 0.12)),
    ("gpt-4-turbo", ModelPrice::new(0.01, 0.03)),
    ("gpt-4o", ModelPrice::new(0.0025, 0.01)),
    ("gpt-4o-mini", ModelPrice::new(0.00015, 0.0006)),
    ("gpt-3.5-turbo", ModelPrice::new(0.0005, 0.0015)),
    ("text-embedding-ada-002", ModelPrice::new(0.0001, 0.0)),
    ("text-embedding-3-small", ModelPrice::new(0.00002, 0.0)),
    ("text-embedding-3-large", ModelPrice::new(0.00013, 0.0)),
    ("claude-3-opus", ModelPrice::new(0.015, 0.075)),
    ("claude-3-sonnet", ModelPrice::new(0.003, 0.015)),
    ("claude-3-5-sonnet", ModelPrice::new(0.003, 0.015)),
    ("claude-3-haiku", ModelPrice::new(0.00025, 0.00125)),
    (DEFAULT_ROW, ModelPrice::new(0.002, 0.002)),
];

/// Per-model token rates. Always carries a `default` row, which prices any
/// model name not listed explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    rows: BTreeMap<String, ModelPrice>,
}

impl PriceTable {
    pub fn new(rows: BTreeMap<String, ModelPrice>) -> Result<Self, Error> {
        if !rows.contains_key(DEFAULT_ROW) {
            return Err(Error::InvalidPriceTable(format!(
                "missing required '{DEFAULT_ROW}' row"
            )));
        }
        for (model, price) in &rows {
            let valid = |v: f64| v.is_finite() && v >= 0.0;
            if !valid(price.input) || !valid(price.output) {
                return Err(Error::InvalidPriceTable(format!(
                    "rates for '{model}' must be finite and non-negative"
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn builtin() -> Self {
        Self {
            rows: BUILTIN
                .iter()
                .map(|(model, price)| (model.to_string(), *price))
                .collect(),
        }
    }

    /// Parse a table of the form `{"gpt-4": {"input": 0.03, "output": 0.06}, ...}`.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let rows: BTreeMap<String, ModelPrice> =
            serde_json::from_str(raw).map_err(|e| Error::InvalidPriceTable(e.to_string()))?;
        Self::new(rows)
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidPriceTable(format!("read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// The table at `path` if one is configured, otherwise the built-in rates.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.rows
            .get(model)
            .or_else(|| self.rows.get(DEFAULT_ROW))
            .copied()
            // `new` and `builtin` both guarantee the default row.
            .unwrap_or(ModelPrice::new(0.0, 0.0))
    }

    /// Unrounded cost of one call.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let price = self.price_for(model);
        (input_tokens as f64 / 1000.0) * price.input + (output_tokens as f64 / 1000.0) * price.output
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Round to 6 decimal places.
pub fn round_cost(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_default_row() {
        let table = PriceTable::builtin();
        assert!(table.models().any(|m| m == DEFAULT_ROW));
        assert!(PriceTable::new(table.rows.clone()).is_ok());
    }

    #[test]
    fn cost_uses_per_thousand_rates() {
        let table = PriceTable::builtin();
        // 1500/1000 * 0.03 + 500/1000 * 0.06
        let cost = table.cost("gpt-4", 1500, 500);
        assert!((cost - 0.075).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_uses_default_row() {
        let table = PriceTable::builtin();
        assert_eq!(table.price_for("some-new-model"), ModelPrice::new(0.002, 0.002));
        let cost = table.cost("some-new-model", 1000, 1000);
        assert!((cost - 0.004).abs() < 1e-12);
    }

    #[test]
    fn table_without_default_is_rejected() {
        let err = PriceTable::from_json(r#"{"gpt-4": {"input": 0.03, "output": 0.06}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPriceTable(msg) if msg.contains("default")));
    }

    #[test]
    fn negative_rates_are_rejected() {
        let err = PriceTable::from_json(r#"{"default": {"input": -1.0, "output": 0.0}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPriceTable(_)));
    }

    #[test]
    fn override_table_is_honoured() {
        let table = PriceTable::from_json(
            r#"{"default": {"input": 1.0, "output": 2.0}, "tiny": {"input": 0.5, "output": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(table.price_for("tiny"), ModelPrice::new(0.5, 0.5));
        assert_eq!(table.price_for("gpt-4"), ModelPrice::new(1.0, 2.0));
    }

    #[test]
    fn loads_table_from_file_or_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.json");
        std::fs::write(&path, r#"{"default": {"input": 0.1, "output": 0.2}}"#).unwrap();

        let table = PriceTable::load(Some(path.as_path())).unwrap();
        assert_eq!(table.price_for("gpt-4"), ModelPrice::new(0.1, 0.2));
        assert_eq!(PriceTable::load(None).unwrap(), PriceTable::builtin());

        let missing = dir.path().join("missing.json");
        let err = PriceTable::load(Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, Error::InvalidPriceTable(msg) if msg.contains("missing.json")));
    }

    #[test]
    fn rounds_to_six_places() {
        assert_eq!(round_cost(0.000_000_4), 0.0);
        assert_eq!(round_cost(0.123_456_7), 0.123_457);
        assert_eq!(round_cost(0.0), 0.0);
    }
}
