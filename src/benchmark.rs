use crate::aggregate::ProviderSummary;
use crate::schema::BillingRecord;
use crate::utils::sum_present;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UtilityRates {
    #[schemars(description = "Reference usage per unit per month (kWh, therms, gallons)")]
    pub usage_per_unit: f64,

    #[schemars(description = "Reference cost per unit per month")]
    pub cost_per_unit: f64,
}

/// Reference tables the benchmark engine reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BenchmarkConfig {
    #[schemars(description = "Per-unit reference rates keyed by utility type (e.g. 'Electricity')")]
    pub utilities: BTreeMap<String, UtilityRates>,

    #[schemars(description = "Cost per usage unit keyed by provider code (e.g. 'TXU')")]
    pub providers: BTreeMap<String, f64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        let utilities = [
            ("Electricity", 1200.0, 150.0),
            ("Gas", 300.0, 40.0),
            ("Water", 25000.0, 60.0),
        ]
        .into_iter()
        .map(|(name, usage_per_unit, cost_per_unit)| {
            (
                name.to_string(),
                UtilityRates {
                    usage_per_unit,
                    cost_per_unit,
                },
            )
        })
        .collect();

        let providers = [
            ("TXU", 0.14),
            ("ONCOR", 0.12),
            ("RELIANT", 0.13),
            ("CONSTELLATION", 0.15),
        ]
        .into_iter()
        .map(|(code, rate)| (code.to_string(), rate))
        .collect();

        Self {
            utilities,
            providers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilityBenchmark {
    pub usage: f64,
    pub cost: f64,
}

/// Actual vs benchmark for one (property, utility) slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyBenchmark {
    pub property: String,
    pub utility: String,
    pub units: Option<f64>,
    pub actual_usage: f64,
    pub benchmark_usage: Option<f64>,
    pub usage_deviation_pct: Option<f64>,
    pub actual_cost: f64,
    pub benchmark_cost: Option<f64>,
    pub cost_deviation_pct: Option<f64>,
    pub efficiency_score: Option<f64>,
}

/// Actual vs rate-implied cost for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBenchmark {
    pub provider_code: String,
    pub actual_usage: f64,
    pub actual_cost: f64,
    pub benchmark_cost: Option<f64>,
    pub cost_deviation_pct: Option<f64>,
    pub efficiency_score: Option<f64>,
}

pub struct BenchmarkEngine<'a> {
    config: &'a BenchmarkConfig,
}

impl<'a> BenchmarkEngine<'a> {
    pub fn new(config: &'a BenchmarkConfig) -> Self {
        Self { config }
    }

    /// Benchmark usage and cost for `units` of the given utility type; `None`
    /// for an unknown utility or a missing/non-positive unit count.
    pub fn utility_benchmark(&self, utility: &str, units: Option<f64>) -> Option<UtilityBenchmark> {
        let rates = self.config.utilities.get(utility)?;
        let units = units.filter(|u| *u > 0.0)?;

        Some(UtilityBenchmark {
            usage: units * rates.usage_per_unit,
            cost: units * rates.cost_per_unit,
        })
    }

    pub fn provider_benchmark(&self, provider_code: &str, usage: Option<f64>) -> Option<f64> {
        let rate = self.config.providers.get(provider_code)?;
        usage.map(|u| u * rate)
    }

    /// Summarizes a slice already filtered to a single property and utility.
    /// The first record supplies the representative utility and unit count.
    pub fn property_benchmark_summary(
        &self,
        records: &[BillingRecord],
    ) -> Option<PropertyBenchmark> {
        let first = records.first()?;
        let benchmark = self.utility_benchmark(&first.utility, first.units);

        let actual_usage = sum_present(records.iter().map(|r| r.usage));
        let actual_cost = sum_present(records.iter().map(|r| r.cost));
        let benchmark_usage = benchmark.map(|b| b.usage);
        let benchmark_cost = benchmark.map(|b| b.cost);

        Some(PropertyBenchmark {
            property: first.property.clone(),
            utility: first.utility.clone(),
            units: first.units,
            actual_usage,
            benchmark_usage,
            usage_deviation_pct: deviation_percent(Some(actual_usage), benchmark_usage),
            actual_cost,
            benchmark_cost,
            cost_deviation_pct: deviation_percent(Some(actual_cost), benchmark_cost),
            efficiency_score: efficiency_score(Some(actual_usage), benchmark_usage),
        })
    }

    pub fn provider_benchmark_table(
        &self,
        providers: &[ProviderSummary],
    ) -> Vec<ProviderBenchmark> {
        providers
            .iter()
            .map(|p| {
                let benchmark_cost = self.provider_benchmark(&p.provider_code, Some(p.total_usage));
                ProviderBenchmark {
                    provider_code: p.provider_code.clone(),
                    actual_usage: p.total_usage,
                    actual_cost: p.total_cost,
                    benchmark_cost,
                    cost_deviation_pct: deviation_percent(Some(p.total_cost), benchmark_cost),
                    efficiency_score: efficiency_score(Some(p.total_cost), benchmark_cost),
                }
            })
            .collect()
    }
}

/// Signed percent difference of `actual` from `benchmark`; positive means the
/// actual value exceeds the benchmark.
pub fn deviation_percent(actual: Option<f64>, benchmark: Option<f64>) -> Option<f64> {
    match (actual, benchmark) {
        (Some(a), Some(b)) if b > 0.0 => Some((a - b) / b * 100.0),
        _ => None,
    }
}

/// 0–100 score: 100 at or below the benchmark, 50 at 1.5× and 0 from 2×.
pub fn efficiency_score(actual: Option<f64>, benchmark: Option<f64>) -> Option<f64> {
    match (actual, benchmark) {
        (Some(a), Some(b)) if b > 0.0 => {
            let ratio = a / b;
            Some((100.0 - (ratio - 1.0) * 100.0).clamp(0.0, 100.0))
        }
        _ => None,
    }
}
