//! Per-model pricing and cost calculation.
//!
//! The table is injected into the execution engine rather than living as
//! global state: lookup is exact model match first, then longest matching
//! prefix, then a default tier for unknown models.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Price per 1K tokens for one model or model-name prefix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPricing {
    pub per_k_input: f64,
    pub per_k_output: f64,
}

/// Ordered pricing lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    entries: Vec<(String, ModelPricing)>,
    default: ModelPricing,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            entries: vec![
                ("gpt-4o-mini".into(), ModelPricing { per_k_input: 0.00015, per_k_output: 0.0006 }),
                ("gpt-4o".into(), ModelPricing { per_k_input: 0.0025, per_k_output: 0.01 }),
                ("gpt-4-turbo".into(), ModelPricing { per_k_input: 0.01, per_k_output: 0.03 }),
                ("gpt-4".into(), ModelPricing { per_k_input: 0.03, per_k_output: 0.06 }),
                ("gpt-3.5-turbo".into(), ModelPricing { per_k_input: 0.0005, per_k_output: 0.0015 }),
                ("claude-3-opus".into(), ModelPricing { per_k_input: 0.015, per_k_output: 0.075 }),
                ("claude-3-sonnet".into(), ModelPricing { per_k_input: 0.003, per_k_output: 0.015 }),
                ("claude-3-haiku".into(), ModelPricing { per_k_input: 0.00025, per_k_output: 0.00125 }),
            ],
            // Baseline tier for unknown models.
            default: ModelPricing { per_k_input: 0.001, per_k_output: 0.002 },
        }
    }
}

impl PricingTable {
    /// Build a table from explicit entries plus a default tier.
    pub fn new(entries: Vec<(String, ModelPricing)>, default: ModelPricing) -> Self {
        Self { entries, default }
    }

    /// Load a table from a JSON file (same shape as the serialized table).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| crate::error::PromptabError::Parse(format!("pricing table: {e}")))
    }

    /// Pricing for `model`: exact match, then longest-prefix match, then
    /// the default tier.
    pub fn lookup(&self, model: &str) -> ModelPricing {
        if let Some((_, p)) = self.entries.iter().find(|(name, _)| name == model) {
            return *p;
        }
        self.entries
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, p)| *p)
            .unwrap_or(self.default)
    }

    /// Cost in dollars for one completion, rounded to 6 decimal places.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let p = self.lookup(model);
        let raw = (input_tokens as f64 / 1000.0) * p.per_k_input
            + (output_tokens as f64 / 1000.0) * p.per_k_output;
        (raw * 1_000_000.0).round() / 1_000_000.0
    }
}
