use crate::aggregate::RankingMetric;
use crate::benchmark::BenchmarkConfig;
use crate::error::{GridForgeError, Result};
use crate::forecast::MIN_SEASONAL_MONTHS;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AlertThresholds {
    #[schemars(description = "Month-over-month increase (percent) that flags a spike")]
    pub spike_threshold_pct: f64,

    #[schemars(description = "Absolute month-over-month occupancy change (percent) to flag")]
    pub occupancy_threshold_pct: f64,

    #[schemars(description = "Shortest regular billing period in days")]
    pub min_period_days: f64,

    #[schemars(description = "Longest regular billing period in days")]
    pub max_period_days: f64,

    #[schemars(description = "Absolute z-score at which a meter's total usage is an outlier")]
    pub meter_z_threshold: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            spike_threshold_pct: 40.0,
            occupancy_threshold_pct: 20.0,
            min_period_days: 25.0,
            max_period_days: 35.0,
            meter_z_threshold: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ForecastConfig {
    #[schemars(description = "Number of future months to forecast")]
    pub periods: u32,

    #[schemars(description = "Months of history required before a forecast is attempted")]
    pub min_history_months: usize,

    #[schemars(description = "Coverage of the uncertainty interval, between 0 and 1 (0.8 = 80%)")]
    pub interval_width: f64,

    #[schemars(description = "History length that enables yearly seasonality (at least 24)")]
    pub seasonal_min_months: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            periods: 12,
            min_history_months: 6,
            interval_width: 0.8,
            seasonal_min_months: MIN_SEASONAL_MONTHS,
        }
    }
}

/// Everything the analytic components read besides the records themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub benchmarks: BenchmarkConfig,
    pub alerts: AlertThresholds,
    pub forecast: ForecastConfig,

    #[schemars(description = "How many properties the portfolio top/bottom rankings keep")]
    pub ranking_top_n: usize,

    #[schemars(description = "Whether portfolio rankings order properties by usage or cost")]
    pub ranking_metric: RankingMetric,

    #[schemars(description = "Enrich monthly aggregates with per-occupied-unit usage and cost")]
    pub normalize_occupancy: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            benchmarks: BenchmarkConfig::default(),
            alerts: AlertThresholds::default(),
            forecast: ForecastConfig::default(),
            ranking_top_n: 5,
            ranking_metric: RankingMetric::Usage,
            normalize_occupancy: false,
        }
    }
}

impl AnalyticsConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalyticsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let alerts = &self.alerts;
        if alerts.min_period_days > alerts.max_period_days {
            return Err(GridForgeError::InvalidConfig(format!(
                "min_period_days ({}) exceeds max_period_days ({})",
                alerts.min_period_days, alerts.max_period_days
            )));
        }
        if alerts.meter_z_threshold <= 0.0 {
            return Err(GridForgeError::InvalidConfig(format!(
                "meter_z_threshold must be positive (got {})",
                alerts.meter_z_threshold
            )));
        }

        let forecast = &self.forecast;
        if !(forecast.interval_width > 0.0 && forecast.interval_width < 1.0) {
            return Err(GridForgeError::InvalidConfig(format!(
                "interval_width must be between 0 and 1 (got {})",
                forecast.interval_width
            )));
        }
        if forecast.seasonal_min_months < MIN_SEASONAL_MONTHS {
            return Err(GridForgeError::InvalidConfig(format!(
                "seasonal_min_months must be at least {} (got {})",
                MIN_SEASONAL_MONTHS, forecast.seasonal_min_months
            )));
        }

        for (utility, rates) in &self.benchmarks.utilities {
            if rates.usage_per_unit < 0.0 || rates.cost_per_unit < 0.0 {
                return Err(GridForgeError::InvalidConfig(format!(
                    "benchmark rates for '{}' must be non-negative",
                    utility
                )));
            }
        }
        for (provider, rate) in &self.benchmarks.providers {
            if *rate < 0.0 {
                return Err(GridForgeError::InvalidConfig(format!(
                    "provider rate for '{}' must be non-negative",
                    provider
                )));
            }
        }

        Ok(())
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalyticsConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}
