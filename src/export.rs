//! CSV rendering of result tables.
//!
//! The header row is always written, even for an empty table, and nulls
//! become empty fields.

use crate::aggregate::{
    MeterSummary, MonthlyAggregate, PortfolioSummary, PropertyRanking, ProviderSummary,
    UtilitySummary, YearSummary,
};
use crate::alerts::{
    Alert, AlertSummary, BadReadingRow, IrregularPeriodRow, MeterAnomalyRow, MissingBillRow,
    OccupancyAnomalyRow, SpikeAlerts,
};
use crate::benchmark::{PropertyBenchmark, ProviderBenchmark};
use crate::error::{GridForgeError, Result};
use crate::forecast::{BenchmarkPoint, ForecastPoint, MergedForecastRow};
use crate::schema::BillingRecord;
use csv::WriterBuilder;
use log::debug;
use serde::Serialize;
use std::path::Path;

/// A row type with a fixed column layout. `COLUMNS` lists the serialized
/// fields in declaration order.
pub trait TableRow: Serialize {
    const COLUMNS: &'static [&'static str];
}

macro_rules! table_row {
    ($ty:ty, [$($column:literal),+ $(,)?]) => {
        impl TableRow for $ty {
            const COLUMNS: &'static [&'static str] = &[$($column),+];
        }
    };
}

table_row!(BillingRecord, [
    "property", "provider_code", "city", "state", "units", "occupancy", "utility",
    "meter_number", "unit_of_measure", "account_number", "date", "year", "days_billed",
    "due_date", "previous_reading", "current_reading", "usage", "cost", "usage_per_day",
    "cost_per_day", "reading_delta", "occupancy_rate", "usage_per_occupied_unit",
    "cost_per_occupied_unit",
]);
table_row!(MonthlyAggregate, [
    "month_start", "usage", "cost", "occupancy", "units", "usage_per_day", "cost_per_day",
    "usage_per_occupied_unit", "cost_per_occupied_unit",
]);
table_row!(MeterSummary, [
    "meter_number", "total_usage", "total_cost", "avg_usage_per_day", "avg_cost_per_day",
    "reading_delta",
]);
table_row!(ProviderSummary, [
    "provider_code", "total_usage", "total_cost", "avg_usage_per_day", "avg_cost_per_day",
]);
table_row!(UtilitySummary, [
    "utility", "total_usage", "total_cost", "avg_usage_per_day", "avg_cost_per_day",
]);
table_row!(YearSummary, [
    "year", "total_usage", "total_cost", "avg_usage_per_day", "avg_cost_per_day",
    "usage_change", "cost_change",
]);
table_row!(PortfolioSummary, [
    "total_usage", "total_cost", "avg_usage_per_day", "avg_cost_per_day",
    "total_properties", "total_meters",
]);
table_row!(PropertyBenchmark, [
    "property", "utility", "units", "actual_usage", "benchmark_usage", "usage_deviation_pct",
    "actual_cost", "benchmark_cost", "cost_deviation_pct", "efficiency_score",
]);
table_row!(ProviderBenchmark, [
    "provider_code", "actual_usage", "actual_cost", "benchmark_cost", "cost_deviation_pct",
    "efficiency_score",
]);
table_row!(MissingBillRow, ["missing_month"]);
table_row!(IrregularPeriodRow, ["date", "days_billed", "usage", "cost"]);
table_row!(BadReadingRow, ["date", "previous_reading", "current_reading", "reading_delta"]);
table_row!(MeterAnomalyRow, ["meter_number", "usage", "z_score"]);
table_row!(OccupancyAnomalyRow, ["date", "occupancy", "occ_change_pct"]);
table_row!(Alert, ["kind", "date", "meter_number", "value", "severity"]);
table_row!(ForecastPoint, ["ds", "yhat", "yhat_lower", "yhat_upper"]);
table_row!(MergedForecastRow, ["ds", "actual", "yhat", "yhat_lower", "yhat_upper"]);
table_row!(BenchmarkPoint, ["ds", "benchmark"]);

pub fn to_csv<T: TableRow>(rows: &[T]) -> Result<String> {
    to_csv_with_columns(T::COLUMNS, rows)
}

/// Writes `columns` as the header and each row's fields beneath it. The rows
/// must serialize to as many fields as there are columns.
pub fn to_csv_with_columns<T: Serialize>(columns: &[&str], rows: &[T]) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    wtr.write_record(columns)?;
    for row in rows {
        wtr.serialize(row)?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| GridForgeError::Export(e.to_string()))?;
    String::from_utf8(data).map_err(|e| GridForgeError::Export(e.to_string()))
}

pub fn spikes_to_csv(spikes: &SpikeAlerts) -> Result<String> {
    to_csv_with_columns(&spikes.columns(), &spikes.rows)
}

pub fn ranking_to_csv(ranking: &PropertyRanking) -> Result<String> {
    to_csv_with_columns(&ranking.columns(), &ranking.rows)
}

/// One named CSV table per detector.
pub fn alert_tables(summary: &AlertSummary) -> Result<Vec<(&'static str, String)>> {
    Ok(vec![
        ("usage_spikes", spikes_to_csv(&summary.spikes_usage)?),
        ("cost_spikes", spikes_to_csv(&summary.spikes_cost)?),
        ("missing_bills", to_csv(&summary.missing_bills)?),
        ("irregular_billing", to_csv(&summary.irregular_billing)?),
        ("bad_readings", to_csv(&summary.bad_readings)?),
        ("meter_anomalies", to_csv(&summary.meter_anomalies)?),
        ("occupancy_anomalies", to_csv(&summary.occupancy_anomalies)?),
    ])
}

pub fn write_csv<T: TableRow>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let path = path.as_ref();
    let csv = to_csv(rows)?;
    std::fs::write(path, csv)?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
