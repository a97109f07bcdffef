//! # GridForge
//!
//! A library for turning utility-billing exports into decision-ready signals:
//! monthly aggregates, anomaly alerts, benchmark efficiency scores and a
//! seasonal usage forecast with uncertainty bounds.
//!
//! ## Core Concepts
//!
//! - **Canonical records**: raw rows (CSV or JSON) are normalized into
//!   [`BillingRecord`]s; malformed cells become `None` instead of errors
//! - **Slices**: most analytics run on one (property, utility) slice chosen
//!   with a [`RecordFilter`]
//! - **Benchmarks**: per-unit and per-provider reference rates injected via
//!   [`BenchmarkConfig`]
//! - **Forecasts**: a gap-free monthly usage series fitted by a
//!   [`SeasonalModel`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use gridforge::*;
//!
//! let config = AnalyticsConfig::default();
//! let analyzer = BillingAnalyzer::new(&config);
//!
//! let records = analyzer.load("billing_export.csv")?;
//! let slice = RecordFilter::new()
//!     .property("Oak Terrace")
//!     .utility("Electricity")
//!     .apply(&records);
//!
//! let report = analyzer.slice_report(&slice);
//! println!("{} alerts", report.alerts.total());
//! if let ForecastOutcome::Ready(forecast) = &report.forecast {
//!     if let Some(summary) = &forecast.summary {
//!         println!("{}", summary);
//!     }
//! }
//! ```

pub mod aggregate;
pub mod alerts;
pub mod benchmark;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod forecast;
pub mod ingestion;
pub mod normalizer;
pub mod schema;
pub mod utils;

pub use aggregate::*;
pub use alerts::*;
pub use benchmark::*;
pub use config::{AlertThresholds, AnalyticsConfig, ForecastConfig};
pub use error::{GridForgeError, Result};
pub use export::{alert_tables, ranking_to_csv, spikes_to_csv, to_csv, write_csv, TableRow};
pub use filter::RecordFilter;
pub use forecast::*;
pub use ingestion::*;
pub use normalizer::{normalize, normalize_row};
pub use schema::*;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Window for the "last N months" KPIs of a slice report.
pub const TRAILING_WINDOW_MONTHS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub series: Vec<MonthlyPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub merged: Vec<MergedForecastRow>,
    pub benchmark_overlay: Option<Vec<BenchmarkPoint>>,
    pub summary: Option<ForecastSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForecastOutcome {
    Ready(ForecastReport),
    /// The slice covers fewer months than the configured minimum.
    InsufficientHistory { months: usize, required: usize },
    /// No dated usage, or the model could not be fitted.
    Unavailable,
}

impl ForecastOutcome {
    pub fn report(&self) -> Option<&ForecastReport> {
        match self {
            Self::Ready(report) => Some(report),
            _ => None,
        }
    }
}

/// Everything computed for one (property, utility) slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceReport {
    pub monthly: Vec<MonthlyAggregate>,
    pub yearly: Vec<YearSummary>,
    pub alerts: AlertSummary,
    pub benchmark: Option<PropertyBenchmark>,
    pub trailing: Option<TrailingAverages>,
    pub occupancy: Option<OccupancyInsights>,
    pub forecast: ForecastOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub summary: Option<PortfolioSummary>,
    pub utilities: Vec<UtilitySummary>,
    pub providers: Vec<ProviderSummary>,
    pub provider_benchmarks: Vec<ProviderBenchmark>,
    pub top_properties: PropertyRanking,
    pub bottom_properties: PropertyRanking,
}

pub struct BillingAnalyzer<'a> {
    config: &'a AnalyticsConfig,
}

impl<'a> BillingAnalyzer<'a> {
    pub fn new(config: &'a AnalyticsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        self.config
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Vec<BillingRecord>> {
        load_records(path)
    }

    /// Runs every slice-level analytic over `records`, which should already
    /// be narrowed to one property and utility.
    pub fn slice_report(&self, records: &[BillingRecord]) -> SliceReport {
        let engine = BenchmarkEngine::new(&self.config.benchmarks);

        let mut monthly = monthly_aggregate(records);
        let occupancy = if self.config.normalize_occupancy {
            monthly = occupancy_normalize(&monthly);
            occupancy_insights(&monthly)
        } else {
            None
        };

        let report = SliceReport {
            yearly: yoy_comparison(records),
            alerts: AlertSummary::build(records, &self.config.alerts),
            benchmark: engine.property_benchmark_summary(records),
            trailing: trailing_averages(&monthly, TRAILING_WINDOW_MONTHS),
            forecast: self.forecast(&engine, records),
            occupancy,
            monthly,
        };

        info!(
            "Slice report: {} months, {} alerts",
            report.monthly.len(),
            report.alerts.total()
        );
        report
    }

    fn forecast(&self, engine: &BenchmarkEngine, records: &[BillingRecord]) -> ForecastOutcome {
        let settings = &self.config.forecast;
        let (series, _) = prepare_monthly_series(records);

        if series.is_empty() {
            return ForecastOutcome::Unavailable;
        }
        if !has_sufficient_history(&series, settings.min_history_months) {
            debug!(
                "Skipping forecast: {} months of history, {} required",
                series.len(),
                settings.min_history_months
            );
            return ForecastOutcome::InsufficientHistory {
                months: series.len(),
                required: settings.min_history_months,
            };
        }

        let model = SeasonalDecomposition::from_config(settings);
        let Some((forecast, _)) = run_forecast(&model, &series, settings.periods) else {
            return ForecastOutcome::Unavailable;
        };

        let benchmark = benchmark_for_forecast(engine, records);
        ForecastOutcome::Ready(ForecastReport {
            merged: merge_actual_and_forecast(&series, &forecast),
            benchmark_overlay: build_benchmark_overlay(&forecast, benchmark),
            summary: forecast_summary(&series, &forecast, benchmark),
            series,
            forecast,
        })
    }

    /// Cross-property rollups over an unsliced record set.
    pub fn portfolio_report(&self, records: &[BillingRecord]) -> PortfolioReport {
        let engine = BenchmarkEngine::new(&self.config.benchmarks);
        let n = self.config.ranking_top_n;
        let metric = self.config.ranking_metric;
        let providers = provider_group(records);

        PortfolioReport {
            summary: portfolio_summary(records),
            utilities: utility_group(records),
            provider_benchmarks: engine.provider_benchmark_table(&providers),
            providers,
            top_properties: property_ranking(records, metric, Some(n)),
            bottom_properties: bottom_properties(records, metric, n),
        }
    }
}
