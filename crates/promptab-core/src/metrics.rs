//! Per-version metrics aggregation.

use serde::{Deserialize, Serialize};

use crate::runner::CaseResult;

/// Summary statistics for one version's run over a dataset.
///
/// Averages are arithmetic means over successful cases only; the success
/// rate is over all cases. With zero successes every average is 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub avg_latency_ms: f64,
    pub avg_input_tokens: f64,
    pub avg_output_tokens: f64,
    pub avg_cost: f64,
    pub success_rate: f64,
    pub total_count: usize,
    pub success_count: usize,
}

impl MetricsSummary {
    /// Reduce a result list into summary statistics. Pure: `results` is
    /// never mutated.
    pub fn from_results(results: &[CaseResult]) -> Self {
        let total_count = results.len();
        let successes: Vec<&CaseResult> = results.iter().filter(|r| r.success).collect();
        let success_count = successes.len();

        let success_rate = if total_count == 0 {
            0.0
        } else {
            success_count as f64 / total_count as f64
        };

        if success_count == 0 {
            return Self {
                success_rate,
                total_count,
                success_count,
                ..Self::default()
            };
        }

        let n = success_count as f64;
        Self {
            avg_latency_ms: successes.iter().map(|r| r.latency_ms).sum::<f64>() / n,
            avg_input_tokens: successes.iter().map(|r| r.input_tokens as f64).sum::<f64>() / n,
            avg_output_tokens: successes.iter().map(|r| r.output_tokens as f64).sum::<f64>() / n,
            avg_cost: successes.iter().map(|r| r.cost).sum::<f64>() / n,
            success_rate,
            total_count,
            success_count,
        }
    }
}

/// One version's complete run: per-case results plus their summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionResult {
    pub test_cases: Vec<CaseResult>,
    pub summary: MetricsSummary,
}

impl VersionResult {
    pub fn new(test_cases: Vec<CaseResult>) -> Self {
        let summary = MetricsSummary::from_results(&test_cases);
        Self {
            test_cases,
            summary,
        }
    }
}
