//! Raw tabular rows to canonical [`BillingRecord`]s.
//!
//! Normalization is permissive: a malformed cell becomes `None`, a column the
//! source never provides is synthesized as `None` (with one warning), and the
//! only rows removed are the ones with no property or utility.

use crate::schema::{external_names, BillingRecord, RawRow, RawValue, REQUIRED_COLUMNS};
use crate::utils::safe_ratio;
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

/// Spreadsheet serial dates count days from this epoch.
const SERIAL_DATE_EPOCH: (i32, u32, u32) = (1899, 12, 30);

pub fn normalize(rows: &[RawRow]) -> Vec<BillingRecord> {
    report_missing_columns(rows);

    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for row in rows {
        match normalize_row(row) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        info!(
            "Dropped {} of {} billing rows with no property or utility",
            dropped,
            rows.len()
        );
    }
    info!("Normalized {} billing records", records.len());

    records
}

/// Converts one raw row; `None` when property or utility is missing.
pub fn normalize_row(row: &RawRow) -> Option<BillingRecord> {
    let property = text_field(row, "property")?;
    let utility = text_field(row, "utility")?;

    let date = date_field(row, "date");
    let units = number_field(row, "units");
    let occupancy = number_field(row, "occupancy");
    let days_billed = number_field(row, "days_billed");
    let previous_reading = number_field(row, "previous_reading");
    let current_reading = number_field(row, "current_reading");
    let usage = number_field(row, "usage");
    let cost = number_field(row, "cost");

    let year = number_field(row, "year")
        .filter(|y| y.fract() == 0.0)
        .map(|y| y as i32)
        .or_else(|| date.map(|d| d.year()));

    let reading_delta = match (current_reading, previous_reading) {
        (Some(current), Some(previous)) => Some(current - previous),
        _ => None,
    };

    Some(BillingRecord {
        property,
        provider_code: text_field(row, "provider_code"),
        city: text_field(row, "city"),
        state: text_field(row, "state"),
        units,
        occupancy,
        utility,
        meter_number: text_field(row, "meter_number"),
        unit_of_measure: text_field(row, "unit_of_measure"),
        account_number: text_field(row, "account_number"),
        date,
        year,
        days_billed,
        due_date: date_field(row, "due_date"),
        previous_reading,
        current_reading,
        usage,
        cost,
        usage_per_day: safe_ratio(usage, days_billed),
        cost_per_day: safe_ratio(cost, days_billed),
        reading_delta,
        occupancy_rate: safe_ratio(occupancy, units),
        usage_per_occupied_unit: None,
        cost_per_occupied_unit: None,
    })
}

fn report_missing_columns(rows: &[RawRow]) {
    if rows.is_empty() {
        return;
    }

    for column in REQUIRED_COLUMNS {
        let resolvable = rows.iter().any(|row| lookup(row, column).is_some());
        if !resolvable {
            warn!(
                "Source has no '{}' column; synthesizing it as null",
                column
            );
        }
    }
}

/// Finds the cell for a canonical field, trying the external names first and
/// then the canonical name itself.
fn lookup<'a>(row: &'a RawRow, canonical: &str) -> Option<&'a RawValue> {
    external_names(canonical)
        .find_map(|name| row.get(name))
        .or_else(|| row.get(canonical))
}

fn text_field(row: &RawRow, canonical: &str) -> Option<String> {
    lookup(row, canonical).and_then(coerce_text)
}

fn number_field(row: &RawRow, canonical: &str) -> Option<f64> {
    lookup(row, canonical).and_then(coerce_number)
}

fn date_field(row: &RawRow, canonical: &str) -> Option<NaiveDate> {
    let value = lookup(row, canonical)?;
    let parsed = coerce_date(value);
    if parsed.is_none() && !matches!(value, RawValue::Empty) {
        debug!("Unparseable {} value {:?} coerced to null", canonical, value);
    }
    parsed
}

pub fn coerce_text(value: &RawValue) -> Option<String> {
    let text = match value {
        RawValue::Text(s) => s.trim().to_string(),
        RawValue::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{:.0}", n),
        RawValue::Number(n) => n.to_string(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Empty => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn coerce_number(value: &RawValue) -> Option<f64> {
    let number = match value {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => parse_number(s)?,
        RawValue::Bool(_) | RawValue::Empty => return None,
    };

    number.is_finite().then_some(number)
}

fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    let cleaned: String = unsigned
        .strip_prefix('$')
        .unwrap_or(unsigned)
        .chars()
        .filter(|c| *c != ',')
        .collect();

    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

pub fn coerce_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Text(s) => parse_date(s.trim()),
        RawValue::Number(n) => serial_to_date(*n),
        RawValue::Bool(_) | RawValue::Empty => None,
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }

    let (year, month, day) = SERIAL_DATE_EPOCH;
    NaiveDate::from_ymd_opt(year, month, day)?.checked_add_days(Days::new(serial.floor() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, RawValue)]) -> RawRow {
        cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn test_maps_external_columns_and_derives_metrics() {
        let rows = vec![row(&[
            ("Property Name", text("  Oak Terrace ")),
            ("Utility", text("Electricity")),
            ("Provider Code", text("TXU")),
            ("# Units", RawValue::Number(100.0)),
            ("Occupancy", RawValue::Number(90.0)),
            ("Billing Date", text("2024-01-31")),
            ("Number Days Billed", RawValue::Number(30.0)),
            ("Previous Reading", RawValue::Number(1000.0)),
            ("Current Reading", RawValue::Number(1600.0)),
            ("Usage", RawValue::Number(600.0)),
            ("$ Amount", text("$1,200.50")),
        ])];

        let records = normalize(&rows);
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.property, "Oak Terrace");
        assert_eq!(r.provider_code.as_deref(), Some("TXU"));
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(r.year, Some(2024));
        assert_eq!(r.cost, Some(1200.5));
        assert_eq!(r.usage_per_day, Some(20.0));
        assert!((r.cost_per_day.unwrap() - 40.016_666).abs() < 1e-4);
        assert_eq!(r.reading_delta, Some(600.0));
        assert_eq!(r.occupancy_rate, Some(0.9));
        assert_eq!(r.usage_per_occupied_unit, None);
    }

    #[test]
    fn test_accepts_canonical_column_names() {
        let rows = vec![row(&[
            ("property", text("Elm Court")),
            ("utility", text("Gas")),
            ("usage", text("42")),
        ])];

        let records = normalize(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage, Some(42.0));
    }

    #[test]
    fn test_external_column_wins_over_canonical() {
        let both = row(&[
            ("Property Name", text("Oak Terrace")),
            ("property", text("Elm Court")),
            ("Usage", RawValue::Number(10.0)),
            ("usage", RawValue::Number(99.0)),
        ]);

        assert_eq!(lookup(&both, "property"), Some(&text("Oak Terrace")));
        assert_eq!(lookup(&both, "usage"), Some(&RawValue::Number(10.0)));
        assert_eq!(lookup(&both, "utility"), None);
    }

    #[test]
    fn test_drops_rows_without_property_or_utility() {
        let rows = vec![
            row(&[("Property Name", text("A")), ("Utility", text("Gas"))]),
            row(&[("Property Name", text("   ")), ("Utility", text("Gas"))]),
            row(&[("Property Name", text("B"))]),
            row(&[("Utility", text("Water"))]),
        ];

        let records = normalize(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].property, "A");
    }

    #[test]
    fn test_invalid_cells_become_null() {
        let rows = vec![row(&[
            ("Property Name", text("A")),
            ("Utility", text("Water")),
            ("Billing Date", text("not a date")),
            ("Usage", text("n/a")),
            ("Number Days Billed", RawValue::Number(0.0)),
            ("$ Amount", RawValue::Number(50.0)),
            ("# Units", RawValue::Number(0.0)),
            ("Occupancy", RawValue::Number(10.0)),
        ])];

        let r = &normalize(&rows)[0];
        assert_eq!(r.date, None);
        assert_eq!(r.year, None);
        assert_eq!(r.usage, None);
        assert_eq!(r.cost_per_day, None);
        assert_eq!(r.occupancy_rate, None);
        assert_eq!(r.reading_delta, None);
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 3, 5);
        assert_eq!(coerce_date(&text("2023-03-05")), expected);
        assert_eq!(coerce_date(&text("3/5/2023")), expected);
        assert_eq!(coerce_date(&text("2023/03/05")), expected);
        assert_eq!(coerce_date(&text("05-Mar-2023")), expected);
        assert_eq!(coerce_date(&text("2023-03-05 00:00:00")), expected);
        assert_eq!(coerce_date(&text("2023-03-05T10:00:00+00:00")), expected);
        assert_eq!(coerce_date(&RawValue::Number(44990.0)), expected);
        assert_eq!(coerce_date(&RawValue::Number(-3.0)), None);
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(coerce_number(&text(" 12.5 ")), Some(12.5));
        assert_eq!(coerce_number(&text("-$1,000")), Some(-1000.0));
        assert_eq!(coerce_number(&text("NaN")), None);
        assert_eq!(coerce_number(&text("inf")), None);
        assert_eq!(coerce_number(&text("$")), None);
        assert_eq!(coerce_number(&RawValue::Bool(true)), None);
    }

    #[test]
    fn test_numeric_identifiers_render_without_fraction() {
        assert_eq!(
            coerce_text(&RawValue::Number(123456.0)),
            Some("123456".to_string())
        );
        assert_eq!(coerce_text(&RawValue::Number(1.5)), Some("1.5".to_string()));
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize(&[]).is_empty());
    }
}
