//! Grouped summaries over a slice of [`BillingRecord`]s.
//!
//! Every function here is a pure grouping: sums skip missing values, means
//! are taken over present values only, and empty input yields empty output.

use crate::schema::BillingRecord;
use crate::utils::{mean_present, month_start, safe_ratio, sum_present};
use chrono::{Datelike, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub month_start: NaiveDate,
    pub usage: f64,
    pub cost: f64,
    pub occupancy: Option<f64>,
    pub units: Option<f64>,
    pub usage_per_day: Option<f64>,
    pub cost_per_day: Option<f64>,
    pub usage_per_occupied_unit: Option<f64>,
    pub cost_per_occupied_unit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSummary {
    pub meter_number: String,
    pub total_usage: f64,
    pub total_cost: f64,
    pub avg_usage_per_day: Option<f64>,
    pub avg_cost_per_day: Option<f64>,
    pub reading_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub provider_code: String,
    pub total_usage: f64,
    pub total_cost: f64,
    pub avg_usage_per_day: Option<f64>,
    pub avg_cost_per_day: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilitySummary {
    pub utility: String,
    pub total_usage: f64,
    pub total_cost: f64,
    pub avg_usage_per_day: Option<f64>,
    pub avg_cost_per_day: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSummary {
    pub year: i32,
    pub total_usage: f64,
    pub total_cost: f64,
    pub avg_usage_per_day: Option<f64>,
    pub avg_cost_per_day: Option<f64>,
    /// Difference from the previous year row; `None` on the first row.
    pub usage_change: Option<f64>,
    pub cost_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_usage: f64,
    pub total_cost: f64,
    pub avg_usage_per_day: Option<f64>,
    pub avg_cost_per_day: Option<f64>,
    pub total_properties: usize,
    /// `None` when no record carries a meter number.
    pub total_meters: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    Usage,
    Cost,
}

impl RankingMetric {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::Cost => "cost",
        }
    }

    pub fn value(&self, record: &BillingRecord) -> Option<f64> {
        match self {
            Self::Usage => record.usage,
            Self::Cost => record.cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRank {
    pub property: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRanking {
    pub metric: RankingMetric,
    pub rows: Vec<PropertyRank>,
}

impl PropertyRanking {
    pub fn columns(&self) -> [&'static str; 2] {
        ["property", self.metric.column()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingAverages {
    pub months: usize,
    pub usage: f64,
    pub cost: f64,
    pub occupancy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyInsights {
    pub avg_occupancy: Option<f64>,
    pub avg_usage_per_occupied_unit: Option<f64>,
    pub avg_cost_per_occupied_unit: Option<f64>,
}

#[derive(Default)]
struct GroupTotals {
    usage: f64,
    cost: f64,
    usage_per_day: Vec<Option<f64>>,
    cost_per_day: Vec<Option<f64>>,
    reading_delta: Vec<Option<f64>>,
    occupancy: Vec<Option<f64>>,
    units: Vec<Option<f64>>,
}

impl GroupTotals {
    fn add(&mut self, record: &BillingRecord) {
        self.usage += record.usage.unwrap_or(0.0);
        self.cost += record.cost.unwrap_or(0.0);
        self.usage_per_day.push(record.usage_per_day);
        self.cost_per_day.push(record.cost_per_day);
        self.reading_delta.push(record.reading_delta);
        self.occupancy.push(record.occupancy);
        self.units.push(record.units);
    }

    fn avg_usage_per_day(&self) -> Option<f64> {
        mean_present(self.usage_per_day.iter().copied())
    }

    fn avg_cost_per_day(&self) -> Option<f64> {
        mean_present(self.cost_per_day.iter().copied())
    }
}

fn group_by<K, F>(records: &[BillingRecord], key: F) -> BTreeMap<K, GroupTotals>
where
    K: Ord,
    F: Fn(&BillingRecord) -> Option<K>,
{
    let mut groups: BTreeMap<K, GroupTotals> = BTreeMap::new();
    for record in records {
        if let Some(k) = key(record) {
            groups.entry(k).or_default().add(record);
        }
    }
    groups
}

/// One row per month present in the input, ordered by month. Undated records
/// do not contribute.
pub fn monthly_aggregate(records: &[BillingRecord]) -> Vec<MonthlyAggregate> {
    let monthly: Vec<MonthlyAggregate> = group_by(records, |r| r.date.map(month_start))
        .into_iter()
        .map(|(month, totals)| MonthlyAggregate {
            month_start: month,
            usage: totals.usage,
            cost: totals.cost,
            occupancy: mean_present(totals.occupancy.iter().copied()),
            units: mean_present(totals.units.iter().copied()),
            usage_per_day: totals.avg_usage_per_day(),
            cost_per_day: totals.avg_cost_per_day(),
            usage_per_occupied_unit: None,
            cost_per_occupied_unit: None,
        })
        .collect();

    debug!(
        "Aggregated {} records into {} months",
        records.len(),
        monthly.len()
    );
    monthly
}

pub fn meter_group(records: &[BillingRecord]) -> Vec<MeterSummary> {
    group_by(records, |r| r.meter_number.clone())
        .into_iter()
        .map(|(meter_number, totals)| MeterSummary {
            meter_number,
            total_usage: totals.usage,
            total_cost: totals.cost,
            avg_usage_per_day: totals.avg_usage_per_day(),
            avg_cost_per_day: totals.avg_cost_per_day(),
            reading_delta: mean_present(totals.reading_delta.iter().copied()),
        })
        .collect()
}

pub fn provider_group(records: &[BillingRecord]) -> Vec<ProviderSummary> {
    group_by(records, |r| r.provider_code.clone())
        .into_iter()
        .map(|(provider_code, totals)| ProviderSummary {
            provider_code,
            total_usage: totals.usage,
            total_cost: totals.cost,
            avg_usage_per_day: totals.avg_usage_per_day(),
            avg_cost_per_day: totals.avg_cost_per_day(),
        })
        .collect()
}

pub fn utility_group(records: &[BillingRecord]) -> Vec<UtilitySummary> {
    group_by(records, |r| Some(r.utility.clone()))
        .into_iter()
        .map(|(utility, totals)| UtilitySummary {
            utility,
            total_usage: totals.usage,
            total_cost: totals.cost,
            avg_usage_per_day: totals.avg_usage_per_day(),
            avg_cost_per_day: totals.avg_cost_per_day(),
        })
        .collect()
}

/// Calendar-year totals with deltas against the preceding year row.
pub fn yoy_comparison(records: &[BillingRecord]) -> Vec<YearSummary> {
    let mut previous: Option<(f64, f64)> = None;

    group_by(records, |r| r.date.map(|d| d.year()))
        .into_iter()
        .map(|(year, totals)| {
            let (usage_change, cost_change) = match previous {
                Some((usage, cost)) => (Some(totals.usage - usage), Some(totals.cost - cost)),
                None => (None, None),
            };
            previous = Some((totals.usage, totals.cost));

            YearSummary {
                year,
                total_usage: totals.usage,
                total_cost: totals.cost,
                avg_usage_per_day: totals.avg_usage_per_day(),
                avg_cost_per_day: totals.avg_cost_per_day(),
                usage_change,
                cost_change,
            }
        })
        .collect()
}

pub fn portfolio_summary(records: &[BillingRecord]) -> Option<PortfolioSummary> {
    if records.is_empty() {
        return None;
    }

    let properties: BTreeSet<&str> = records.iter().map(|r| r.property.as_str()).collect();
    let meters: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| r.meter_number.as_deref())
        .collect();

    Some(PortfolioSummary {
        total_usage: sum_present(records.iter().map(|r| r.usage)),
        total_cost: sum_present(records.iter().map(|r| r.cost)),
        avg_usage_per_day: mean_present(records.iter().map(|r| r.usage_per_day)),
        avg_cost_per_day: mean_present(records.iter().map(|r| r.cost_per_day)),
        total_properties: properties.len(),
        total_meters: if meters.is_empty() {
            None
        } else {
            Some(meters.len())
        },
    })
}

/// Properties ordered by the summed metric, largest first. `top_n = None`
/// keeps every property.
pub fn property_ranking(
    records: &[BillingRecord],
    metric: RankingMetric,
    top_n: Option<usize>,
) -> PropertyRanking {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(record.property.as_str()).or_insert(0.0) +=
            metric.value(record).unwrap_or(0.0);
    }

    let mut rows: Vec<PropertyRank> = totals
        .into_iter()
        .map(|(property, value)| PropertyRank {
            property: property.to_string(),
            value,
        })
        .collect();
    rows.sort_by(|a, b| b.value.total_cmp(&a.value));

    if let Some(n) = top_n {
        rows.truncate(n);
    }

    PropertyRanking { metric, rows }
}

/// The last `n` rows of the full descending ranking.
pub fn bottom_properties(
    records: &[BillingRecord],
    metric: RankingMetric,
    n: usize,
) -> PropertyRanking {
    let mut ranking = property_ranking(records, metric, None);
    let skip = ranking.rows.len().saturating_sub(n);
    ranking.rows.drain(..skip);
    ranking
}

/// Values an occupancy normalization can be computed from and written back to.
pub trait OccupancyNormalize {
    fn occupancy(&self) -> Option<f64>;
    fn usage(&self) -> Option<f64>;
    fn cost(&self) -> Option<f64>;
    fn set_per_occupied_unit(&mut self, usage: Option<f64>, cost: Option<f64>);
}

impl OccupancyNormalize for BillingRecord {
    fn occupancy(&self) -> Option<f64> {
        self.occupancy
    }

    fn usage(&self) -> Option<f64> {
        self.usage
    }

    fn cost(&self) -> Option<f64> {
        self.cost
    }

    fn set_per_occupied_unit(&mut self, usage: Option<f64>, cost: Option<f64>) {
        self.usage_per_occupied_unit = usage;
        self.cost_per_occupied_unit = cost;
    }
}

impl OccupancyNormalize for MonthlyAggregate {
    fn occupancy(&self) -> Option<f64> {
        self.occupancy
    }

    fn usage(&self) -> Option<f64> {
        Some(self.usage)
    }

    fn cost(&self) -> Option<f64> {
        Some(self.cost)
    }

    fn set_per_occupied_unit(&mut self, usage: Option<f64>, cost: Option<f64>) {
        self.usage_per_occupied_unit = usage;
        self.cost_per_occupied_unit = cost;
    }
}

/// Returns a copy of `rows` with usage and cost per occupied unit filled in
/// wherever occupancy is positive.
pub fn occupancy_normalize<T>(rows: &[T]) -> Vec<T>
where
    T: OccupancyNormalize + Clone,
{
    rows.iter()
        .cloned()
        .map(|mut row| {
            let usage = safe_ratio(row.usage(), row.occupancy());
            let cost = safe_ratio(row.cost(), row.occupancy());
            row.set_per_occupied_unit(usage, cost);
            row
        })
        .collect()
}

/// Averages over the most recent `window` months; `None` when fewer exist.
pub fn trailing_averages(monthly: &[MonthlyAggregate], window: usize) -> Option<TrailingAverages> {
    if window == 0 || monthly.len() < window {
        return None;
    }

    let mut sorted: Vec<&MonthlyAggregate> = monthly.iter().collect();
    sorted.sort_by_key(|m| m.month_start);
    let tail = &sorted[sorted.len() - window..];

    Some(TrailingAverages {
        months: window,
        usage: tail.iter().map(|m| m.usage).sum::<f64>() / window as f64,
        cost: tail.iter().map(|m| m.cost).sum::<f64>() / window as f64,
        occupancy: mean_present(tail.iter().map(|m| m.occupancy)),
    })
}

/// Occupancy KPIs over an occupancy-normalized monthly set.
pub fn occupancy_insights(monthly: &[MonthlyAggregate]) -> Option<OccupancyInsights> {
    if monthly.is_empty() {
        return None;
    }

    Some(OccupancyInsights {
        avg_occupancy: mean_present(monthly.iter().map(|m| m.occupancy)),
        avg_usage_per_occupied_unit: mean_present(
            monthly.iter().map(|m| m.usage_per_occupied_unit),
        ),
        avg_cost_per_occupied_unit: mean_present(monthly.iter().map(|m| m.cost_per_occupied_unit)),
    })
}
