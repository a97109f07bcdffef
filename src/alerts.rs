//! Rule and statistics based anomaly detection over one (property, utility)
//! slice.
//!
//! Detectors never fail: input without the fields a rule needs produces an
//! empty table. Spikes only fire on increases, occupancy swings fire in either
//! direction.

use crate::aggregate::meter_group;
use crate::config::AlertThresholds;
use crate::schema::BillingRecord;
use crate::utils::{mean_std, month_start, month_starts_in_range, pct_change};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeMetric {
    Usage,
    Cost,
}

impl SpikeMetric {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::Cost => "cost",
        }
    }

    fn value(&self, record: &BillingRecord) -> Option<f64> {
        match self {
            Self::Usage => record.usage,
            Self::Cost => record.cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeRow {
    pub date: NaiveDate,
    pub value: f64,
    pub pct_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeAlerts {
    pub metric: SpikeMetric,
    pub rows: Vec<SpikeRow>,
}

impl SpikeAlerts {
    /// The value column is named after the metric.
    pub fn columns(&self) -> [&'static str; 3] {
        ["date", self.metric.column(), "pct_change"]
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingBillRow {
    pub missing_month: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrregularPeriodRow {
    pub date: Option<NaiveDate>,
    pub days_billed: f64,
    pub usage: Option<f64>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadReadingRow {
    pub date: Option<NaiveDate>,
    pub previous_reading: Option<f64>,
    pub current_reading: Option<f64>,
    pub reading_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterAnomalyRow {
    pub meter_number: String,
    pub usage: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyAnomalyRow {
    pub date: NaiveDate,
    pub occupancy: f64,
    pub occ_change_pct: f64,
}

fn dated_in_order(records: &[BillingRecord]) -> Vec<(NaiveDate, &BillingRecord)> {
    let mut dated: Vec<(NaiveDate, &BillingRecord)> = records
        .iter()
        .filter_map(|r| r.date.map(|d| (d, r)))
        .collect();
    dated.sort_by_key(|(date, _)| *date);
    dated
}

/// Month-over-month increases of at least `threshold_pct` percent. Each row
/// is compared with the row before it; a missing or non-positive previous
/// value never flags.
pub fn detect_spikes(
    records: &[BillingRecord],
    metric: SpikeMetric,
    threshold_pct: f64,
) -> SpikeAlerts {
    let dated = dated_in_order(records);

    let rows = dated
        .windows(2)
        .filter_map(|pair| {
            let (_, previous) = pair[0];
            let (date, current) = pair[1];
            let value = metric.value(current)?;
            let change = pct_change(Some(value), metric.value(previous))?;
            (change >= threshold_pct).then_some(SpikeRow {
                date,
                value,
                pct_change: change,
            })
        })
        .collect();

    SpikeAlerts { metric, rows }
}

/// Month starts between the first and last billed month that have no bill.
pub fn detect_missing_bills(records: &[BillingRecord]) -> Vec<MissingBillRow> {
    let billed: BTreeSet<NaiveDate> = records
        .iter()
        .filter_map(|r| r.date.map(month_start))
        .collect();

    let (Some(first), Some(last)) = (billed.first(), billed.last()) else {
        return Vec::new();
    };

    month_starts_in_range(*first, *last)
        .into_iter()
        .filter(|month| !billed.contains(month))
        .map(|missing_month| MissingBillRow { missing_month })
        .collect()
}

pub fn detect_irregular_billing_periods(
    records: &[BillingRecord],
    min_days: f64,
    max_days: f64,
) -> Vec<IrregularPeriodRow> {
    let mut rows: Vec<IrregularPeriodRow> = records
        .iter()
        .filter_map(|r| {
            let days = r.days_billed?;
            (days < min_days || days > max_days).then(|| IrregularPeriodRow {
                date: r.date,
                days_billed: days,
                usage: r.usage,
                cost: r.cost,
            })
        })
        .collect();
    rows.sort_by_key(|row| row.date);
    rows
}

/// Non-positive current readings, negative previous readings and readings
/// that went backwards.
pub fn detect_bad_readings(records: &[BillingRecord]) -> Vec<BadReadingRow> {
    let mut rows: Vec<BadReadingRow> = records
        .iter()
        .filter(|r| {
            r.current_reading.is_some_and(|v| v <= 0.0)
                || r.previous_reading.is_some_and(|v| v < 0.0)
                || r.reading_delta.is_some_and(|v| v < 0.0)
        })
        .map(|r| BadReadingRow {
            date: r.date,
            previous_reading: r.previous_reading,
            current_reading: r.current_reading,
            reading_delta: r.reading_delta,
        })
        .collect();
    rows.sort_by_key(|row| row.date);
    rows
}

/// Meters whose total usage sits at least `z_threshold` population standard
/// deviations from the mean meter. Zero spread flags nothing.
pub fn detect_meter_anomalies(records: &[BillingRecord], z_threshold: f64) -> Vec<MeterAnomalyRow> {
    let meters = meter_group(records);
    let usages: Vec<f64> = meters.iter().map(|m| m.total_usage).collect();
    let (mean, std) = mean_std(&usages);

    if std == 0.0 || !std.is_finite() {
        debug!("Meter usage has no spread across {} meters", meters.len());
        return Vec::new();
    }

    meters
        .into_iter()
        .filter_map(|m| {
            let z_score = (m.total_usage - mean) / std;
            (z_score.abs() >= z_threshold).then_some(MeterAnomalyRow {
                meter_number: m.meter_number,
                usage: m.total_usage,
                z_score,
            })
        })
        .collect()
}

/// Month-over-month occupancy swings of at least `threshold_pct` percent in
/// either direction.
pub fn detect_occupancy_anomalies(
    records: &[BillingRecord],
    threshold_pct: f64,
) -> Vec<OccupancyAnomalyRow> {
    let dated = dated_in_order(records);

    dated
        .windows(2)
        .filter_map(|pair| {
            let (_, previous) = pair[0];
            let (date, current) = pair[1];
            let occupancy = current.occupancy?;
            let change = pct_change(Some(occupancy), previous.occupancy)?;
            (change.abs() >= threshold_pct).then_some(OccupancyAnomalyRow {
                date,
                occupancy,
                occ_change_pct: change,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SpikeUsage,
    SpikeCost,
    MissingBill,
    IrregularPeriod,
    BadReading,
    MeterOutlier,
    OccupancySwing,
}

/// One flagged anomaly. `severity` is the percent change or z-score for the
/// kinds that have one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub date: Option<NaiveDate>,
    pub meter_number: Option<String>,
    pub value: Option<f64>,
    pub severity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub spikes_usage: SpikeAlerts,
    pub spikes_cost: SpikeAlerts,
    pub missing_bills: Vec<MissingBillRow>,
    pub irregular_billing: Vec<IrregularPeriodRow>,
    pub bad_readings: Vec<BadReadingRow>,
    pub meter_anomalies: Vec<MeterAnomalyRow>,
    pub occupancy_anomalies: Vec<OccupancyAnomalyRow>,
}

impl AlertSummary {
    pub fn build(records: &[BillingRecord], thresholds: &AlertThresholds) -> Self {
        let spike_pct = thresholds.spike_threshold_pct;
        let summary = Self {
            spikes_usage: detect_spikes(records, SpikeMetric::Usage, spike_pct),
            spikes_cost: detect_spikes(records, SpikeMetric::Cost, spike_pct),
            missing_bills: detect_missing_bills(records),
            irregular_billing: detect_irregular_billing_periods(
                records,
                thresholds.min_period_days,
                thresholds.max_period_days,
            ),
            bad_readings: detect_bad_readings(records),
            meter_anomalies: detect_meter_anomalies(records, thresholds.meter_z_threshold),
            occupancy_anomalies: detect_occupancy_anomalies(
                records,
                thresholds.occupancy_threshold_pct,
            ),
        };

        debug!("Alert summary over {} records: {} alerts", records.len(), summary.total());
        summary
    }

    pub fn total(&self) -> usize {
        self.spikes_usage.rows.len()
            + self.spikes_cost.rows.len()
            + self.missing_bills.len()
            + self.irregular_billing.len()
            + self.bad_readings.len()
            + self.meter_anomalies.len()
            + self.occupancy_anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every flagged anomaly as a flat list, grouped by kind.
    pub fn alerts(&self) -> Vec<Alert> {
        let mut alerts = Vec::with_capacity(self.total());

        for (kind, spikes) in [
            (AlertKind::SpikeUsage, &self.spikes_usage),
            (AlertKind::SpikeCost, &self.spikes_cost),
        ] {
            alerts.extend(spikes.rows.iter().map(|row| Alert {
                kind,
                date: Some(row.date),
                meter_number: None,
                value: Some(row.value),
                severity: Some(row.pct_change),
            }));
        }

        alerts.extend(self.missing_bills.iter().map(|row| Alert {
            kind: AlertKind::MissingBill,
            date: Some(row.missing_month),
            meter_number: None,
            value: None,
            severity: None,
        }));

        alerts.extend(self.irregular_billing.iter().map(|row| Alert {
            kind: AlertKind::IrregularPeriod,
            date: row.date,
            meter_number: None,
            value: Some(row.days_billed),
            severity: None,
        }));

        alerts.extend(self.bad_readings.iter().map(|row| Alert {
            kind: AlertKind::BadReading,
            date: row.date,
            meter_number: None,
            value: row.reading_delta.or(row.current_reading),
            severity: None,
        }));

        alerts.extend(self.meter_anomalies.iter().map(|row| Alert {
            kind: AlertKind::MeterOutlier,
            date: None,
            meter_number: Some(row.meter_number.clone()),
            value: Some(row.usage),
            severity: Some(row.z_score),
        }));

        alerts.extend(self.occupancy_anomalies.iter().map(|row| Alert {
            kind: AlertKind::OccupancySwing,
            date: Some(row.date),
            meter_number: None,
            value: Some(row.occupancy),
            severity: Some(row.occ_change_pct),
        }));

        alerts
    }
}
