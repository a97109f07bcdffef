//! Monthly usage forecasting.
//!
//! The pipeline turns a slice of billing records into a gap-free monthly
//! series, fits a [`SeasonalModel`] to it and predicts the history plus a
//! future horizon. The shipped model, [`SeasonalDecomposition`], runs on augurs:
//! MSTL with a 12-month period over an AutoETS trend when the history covers
//! two full years, non-seasonal AutoETS otherwise.

use crate::benchmark::BenchmarkEngine;
use crate::config::ForecastConfig;
use crate::error::{GridForgeError, Result};
use crate::schema::BillingRecord;
use crate::utils::{
    add_months, format_thousands, month_start, month_starts_in_range, months_between,
};
use augurs::{
    ets::AutoETS,
    forecaster::{transforms::LinearInterpolator, Forecaster, Transformer},
    mstl::MSTLModel,
    Forecast,
};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    pub ds: NaiveDate,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergedForecastRow {
    pub ds: NaiveDate,
    pub actual: Option<f64>,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPoint {
    pub ds: NaiveDate,
    pub benchmark: f64,
}

/// A forecasting model the pipeline can fit and query without knowing how it
/// works inside.
pub trait SeasonalModel {
    type Fitted;

    fn fit(&self, series: &[MonthlyPoint]) -> Result<Self::Fitted>;

    /// Predictions for the given month starts. Every point satisfies
    /// `yhat_lower <= yhat <= yhat_upper`.
    fn predict(
        &self,
        fitted: &Self::Fitted,
        months: &[NaiveDate],
    ) -> Result<Vec<ForecastPoint>>;
}

/// Yearly seasonality on a monthly grid.
pub const SEASONAL_PERIOD_MONTHS: usize = 12;

/// MSTL needs two full cycles to separate the seasonal component.
pub const MIN_SEASONAL_MONTHS: usize = 2 * SEASONAL_PERIOD_MONTHS;

/// augurs-backed model: MSTL with a 12-month period over an AutoETS trend once
/// the history covers `seasonal_min_months`, plain non-seasonal AutoETS below
/// that.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalDecomposition {
    pub interval_width: f64,
    pub seasonal_min_months: usize,
}

impl Default for SeasonalDecomposition {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

impl SeasonalDecomposition {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            interval_width: config.interval_width,
            seasonal_min_months: config.seasonal_min_months.max(MIN_SEASONAL_MONTHS),
        }
    }

    pub fn uses_seasonal_decomposition(&self, months: usize) -> bool {
        months >= self.seasonal_min_months
    }
}

enum Horizon {
    InSample,
    Ahead(usize),
}

type Projection = Box<dyn Fn(Horizon, f64) -> std::result::Result<Forecast, String>>;

macro_rules! projection {
    ($model:expr, $values:expr, $label:literal) => {{
        let transformers: Vec<Box<dyn Transformer>> =
            vec![Box::new(LinearInterpolator::default())];
        let mut forecaster = Forecaster::new($model).with_transformers(transformers);
        forecaster
            .fit($values)
            .map_err(|e| GridForgeError::ModelFit(format!("{} fit error: {}", $label, e)))?;

        let projection: Projection = Box::new(move |horizon: Horizon, level: f64| {
            match horizon {
                Horizon::InSample => forecaster.predict_in_sample(level),
                Horizon::Ahead(steps) => forecaster.predict(steps, level),
            }
            .map_err(|e| format!("{} predict error: {}", $label, e))
        });
        projection
    }};
}

pub struct FittedSeasonalDecomposition {
    pub start: NaiveDate,
    pub last_observed: NaiveDate,
    pub seasonal: bool,
    projection: Projection,
}

impl fmt::Debug for FittedSeasonalDecomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittedSeasonalDecomposition")
            .field("start", &self.start)
            .field("last_observed", &self.last_observed)
            .field("seasonal", &self.seasonal)
            .finish_non_exhaustive()
    }
}

impl SeasonalModel for SeasonalDecomposition {
    type Fitted = FittedSeasonalDecomposition;

    fn fit(&self, series: &[MonthlyPoint]) -> Result<FittedSeasonalDecomposition> {
        let (start, last_observed) = match (series.first(), series.last()) {
            (Some(first), Some(last)) => (first.ds, last.ds),
            _ => {
                return Err(GridForgeError::ModelFit(
                    "cannot fit an empty series".to_string(),
                ))
            }
        };

        let values: Vec<f64> = series.iter().map(|p| p.y).collect();
        let seasonal = self.uses_seasonal_decomposition(values.len());

        let projection = if seasonal {
            let trend = AutoETS::non_seasonal().into_trend_model();
            let mstl = MSTLModel::new(vec![SEASONAL_PERIOD_MONTHS], trend);
            projection!(mstl, values.as_slice(), "MSTL")
        } else {
            projection!(AutoETS::non_seasonal(), values.as_slice(), "ETS")
        };

        debug!(
            "Fitted {} model on {} months",
            if seasonal { "MSTL" } else { "ETS" },
            values.len()
        );

        Ok(FittedSeasonalDecomposition {
            start,
            last_observed,
            seasonal,
            projection,
        })
    }

    /// Months before the first observation are skipped.
    fn predict(
        &self,
        fitted: &FittedSeasonalDecomposition,
        months: &[NaiveDate],
    ) -> Result<Vec<ForecastPoint>> {
        let steps_ahead = months
            .iter()
            .map(|&ds| months_between(fitted.last_observed, ds))
            .max()
            .unwrap_or(0);

        let level = self.interval_width;
        let in_sample =
            (fitted.projection)(Horizon::InSample, level).map_err(GridForgeError::ModelFit)?;
        let ahead = if steps_ahead > 0 {
            let horizon = Horizon::Ahead(steps_ahead as usize);
            Some((fitted.projection)(horizon, level).map_err(GridForgeError::ModelFit)?)
        } else {
            None
        };

        let points = months
            .iter()
            .filter_map(|&ds| {
                let offset = months_between(fitted.last_observed, ds);
                let (forecast, index) = if offset > 0 {
                    (ahead.as_ref()?, (offset - 1) as usize)
                } else {
                    let index = usize::try_from(months_between(fitted.start, ds)).ok()?;
                    (&in_sample, index)
                };
                bounded_point(ds, forecast, index)
            })
            .collect();

        Ok(points)
    }
}

/// Usage cannot go negative, so the estimate and bounds are floored at zero.
/// A forecast without intervals gets a ±20% band.
fn bounded_point(ds: NaiveDate, forecast: &Forecast, index: usize) -> Option<ForecastPoint> {
    let yhat = (*forecast.point.get(index)?).max(0.0);

    let (lower, upper) = match &forecast.intervals {
        Some(intervals) => (
            intervals.lower.get(index).copied().unwrap_or(yhat),
            intervals.upper.get(index).copied().unwrap_or(yhat),
        ),
        None => (yhat * 0.8, yhat * 1.2),
    };
    let lower = if lower.is_finite() { lower.max(0.0) } else { yhat };
    let upper = if upper.is_finite() { upper.max(0.0) } else { yhat };

    Some(ForecastPoint {
        ds,
        yhat,
        yhat_lower: lower.min(yhat),
        yhat_upper: upper.max(yhat),
    })
}

/// Sums usage per month over the dated records and fills every month between
/// the first and last bill, using zero for months without one. Also returns
/// the dated records the series was built from, in date order.
pub fn prepare_monthly_series(
    records: &[BillingRecord],
) -> (Vec<MonthlyPoint>, Vec<BillingRecord>) {
    let mut source: Vec<BillingRecord> = records
        .iter()
        .filter(|r| r.date.is_some())
        .cloned()
        .collect();
    source.sort_by_key(|r| r.date);

    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in &source {
        if let Some(date) = record.date {
            *totals.entry(month_start(date)).or_insert(0.0) += record.usage.unwrap_or(0.0);
        }
    }

    let series = match (totals.keys().next(), totals.keys().next_back()) {
        (Some(&first), Some(&last)) => month_starts_in_range(first, last)
            .into_iter()
            .map(|ds| MonthlyPoint {
                ds,
                y: totals.get(&ds).copied().unwrap_or(0.0),
            })
            .collect(),
        _ => Vec::new(),
    };

    debug!(
        "Prepared monthly series of {} months from {} dated records",
        series.len(),
        source.len()
    );
    (series, source)
}

pub fn has_sufficient_history(series: &[MonthlyPoint], min_months: usize) -> bool {
    series.len() >= min_months
}

/// Fits `model` and predicts every historical month plus `periods` future
/// months. `None` for an empty series or a failed fit.
pub fn run_forecast<M: SeasonalModel>(
    model: &M,
    series: &[MonthlyPoint],
    periods: u32,
) -> Option<(Vec<ForecastPoint>, M::Fitted)> {
    let last = series.last()?.ds;

    let months: Vec<NaiveDate> = series
        .iter()
        .map(|p| p.ds)
        .chain((1..=periods).map_while(|step| add_months(last, step)))
        .collect();

    let (forecast, fitted) = match model
        .fit(series)
        .and_then(|fitted| Ok((model.predict(&fitted, &months)?, fitted)))
    {
        Ok(result) => result,
        Err(e) => {
            warn!("Forecast unavailable: {}", e);
            return None;
        }
    };

    info!(
        "Forecast produced for {} history months and {} future months",
        series.len(),
        periods
    );
    Some((forecast, fitted))
}

/// One row per forecast month, with the actual value where the month was
/// observed.
pub fn merge_actual_and_forecast(
    series: &[MonthlyPoint],
    forecast: &[ForecastPoint],
) -> Vec<MergedForecastRow> {
    let actuals: BTreeMap<NaiveDate, f64> = series.iter().map(|p| (p.ds, p.y)).collect();

    forecast
        .iter()
        .map(|point| MergedForecastRow {
            ds: point.ds,
            actual: actuals.get(&point.ds).copied(),
            yhat: point.yhat,
            yhat_lower: point.yhat_lower,
            yhat_upper: point.yhat_upper,
        })
        .collect()
}

/// A constant benchmark line across every forecast month.
pub fn build_benchmark_overlay(
    forecast: &[ForecastPoint],
    benchmark: Option<f64>,
) -> Option<Vec<BenchmarkPoint>> {
    let benchmark = benchmark?;
    Some(
        forecast
            .iter()
            .map(|point| BenchmarkPoint {
                ds: point.ds,
                benchmark,
            })
            .collect(),
    )
}

/// Benchmark usage for the slice, taken from its first record's utility and
/// unit count.
pub fn benchmark_for_forecast(engine: &BenchmarkEngine, records: &[BillingRecord]) -> Option<f64> {
    let first = records.first()?;
    engine
        .utility_benchmark(&first.utility, first.units)
        .map(|b| b.usage)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub last_actual: f64,
    pub avg_forecast_next_3: f64,
    pub benchmark: Option<f64>,
}

impl ForecastSummary {
    pub fn deviation_pct(&self) -> Option<f64> {
        let benchmark = self.benchmark.filter(|b| *b > 0.0)?;
        Some((self.avg_forecast_next_3 - benchmark) / benchmark * 100.0)
    }

    pub fn direction(&self) -> Option<&'static str> {
        self.deviation_pct()
            .map(|pct| if pct > 0.0 { "above" } else { "below" })
    }
}

impl fmt::Display for ForecastSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Last actual month usage: {}",
            format_thousands(self.last_actual)
        )?;
        write!(
            f,
            "Average forecasted usage (next 3 months): {}",
            format_thousands(self.avg_forecast_next_3)
        )?;

        if let (Some(benchmark), Some(pct), Some(direction)) =
            (self.benchmark, self.deviation_pct(), self.direction())
        {
            writeln!(f)?;
            writeln!(f, "Benchmark usage: {}", format_thousands(benchmark))?;
            write!(f, "Forecast is {:.1}% {} the benchmark.", pct.abs(), direction)?;
        }

        Ok(())
    }
}

/// Last actual, mean of the first three future predictions and the optional
/// benchmark. `None` when there is no history or no future month.
pub fn forecast_summary(
    series: &[MonthlyPoint],
    forecast: &[ForecastPoint],
    benchmark: Option<f64>,
) -> Option<ForecastSummary> {
    let last = series.last()?;

    let next: Vec<f64> = forecast
        .iter()
        .filter(|p| p.ds > last.ds)
        .take(3)
        .map(|p| p.yhat)
        .collect();
    if next.is_empty() {
        return None;
    }

    Some(ForecastSummary {
        last_actual: last.y,
        avg_forecast_next_3: next.iter().sum::<f64>() / next.len() as f64,
        benchmark,
    })
}
