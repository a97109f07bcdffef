use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single cell of the source table, before any type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Empty,
}

impl Default for RawValue {
    fn default() -> Self {
        Self::Empty
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(value.to_string())
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One row of the source table keyed by its external column name.
pub type RawRow = BTreeMap<String, RawValue>;

/// External column name to canonical field name.
pub const COLUMN_MAP: &[(&str, &str)] = &[
    ("Property Name", "property"),
    ("Provider Code", "provider_code"),
    ("City", "city"),
    ("State", "state"),
    ("# Units", "units"),
    ("Occupancy", "occupancy"),
    ("Utility", "utility"),
    ("Meter #", "meter_number"),
    ("Unit of Measure", "unit_of_measure"),
    ("Acct Number", "account_number"),
    ("Billing Date", "date"),
    ("Year", "year"),
    ("Number Days Billed", "days_billed"),
    ("Due Date", "due_date"),
    ("Previous Reading", "previous_reading"),
    ("Current Reading", "current_reading"),
    ("Usage", "usage"),
    ("$ Amount", "cost"),
];

/// Canonical fields every source is expected to resolve.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "property",
    "provider_code",
    "city",
    "state",
    "units",
    "occupancy",
    "utility",
    "meter_number",
    "unit_of_measure",
    "account_number",
    "date",
    "days_billed",
    "due_date",
    "previous_reading",
    "current_reading",
    "usage",
    "cost",
];

/// External names that map onto a canonical field, in lookup order.
pub fn external_names(canonical: &str) -> impl Iterator<Item = &'static str> + '_ {
    COLUMN_MAP
        .iter()
        .filter(move |(_, c)| *c == canonical)
        .map(|(external, _)| *external)
}

/// A normalized meter-period bill.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillingRecord {
    pub property: String,
    pub provider_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub units: Option<f64>,
    pub occupancy: Option<f64>,
    pub utility: String,
    pub meter_number: Option<String>,
    pub unit_of_measure: Option<String>,
    pub account_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub days_billed: Option<f64>,
    pub due_date: Option<NaiveDate>,
    pub previous_reading: Option<f64>,
    pub current_reading: Option<f64>,
    pub usage: Option<f64>,
    pub cost: Option<f64>,
    pub usage_per_day: Option<f64>,
    pub cost_per_day: Option<f64>,
    pub reading_delta: Option<f64>,
    pub occupancy_rate: Option<f64>,
    /// Filled by [`crate::occupancy_normalize`].
    pub usage_per_occupied_unit: Option<f64>,
    /// Filled by [`crate::occupancy_normalize`].
    pub cost_per_occupied_unit: Option<f64>,
}

impl BillingRecord {
    pub fn new(property: impl Into<String>, utility: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            utility: utility.into(),
            ..Default::default()
        }
    }
}
