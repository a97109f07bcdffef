use crate::schema::BillingRecord;
use std::collections::BTreeSet;

/// Narrows a record set to a property, a utility and a set of years. Unset
/// criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub property: Option<String>,
    pub utility: Option<String>,
    pub years: BTreeSet<i32>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn utility(mut self, utility: impl Into<String>) -> Self {
        self.utility = Some(utility.into());
        self
    }

    pub fn years(mut self, years: impl IntoIterator<Item = i32>) -> Self {
        self.years = years.into_iter().collect();
        self
    }

    /// A record with no year never matches a year filter.
    pub fn matches(&self, record: &BillingRecord) -> bool {
        if let Some(property) = &self.property {
            if &record.property != property {
                return false;
            }
        }
        if let Some(utility) = &self.utility {
            if &record.utility != utility {
                return false;
            }
        }
        if !self.years.is_empty() && !record.year.is_some_and(|y| self.years.contains(&y)) {
            return false;
        }
        true
    }

    pub fn apply(&self, records: &[BillingRecord]) -> Vec<BillingRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }

    /// The same utility and years for a different property.
    pub fn comparison(&self, property: impl Into<String>) -> Self {
        self.clone().property(property)
    }
}

pub fn properties(records: &[BillingRecord]) -> Vec<String> {
    let names: BTreeSet<&str> = records.iter().map(|r| r.property.as_str()).collect();
    names.into_iter().map(str::to_string).collect()
}

pub fn utilities_for(records: &[BillingRecord], property: &str) -> Vec<String> {
    let utilities: BTreeSet<&str> = records
        .iter()
        .filter(|r| r.property == property)
        .map(|r| r.utility.as_str())
        .collect();
    utilities.into_iter().map(str::to_string).collect()
}

pub fn years(records: &[BillingRecord]) -> Vec<i32> {
    let years: BTreeSet<i32> = records.iter().filter_map(|r| r.year).collect();
    years.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(property: &str, utility: &str, year: Option<i32>) -> BillingRecord {
        BillingRecord {
            year,
            ..BillingRecord::new(property, utility)
        }
    }

    fn sample() -> Vec<BillingRecord> {
        vec![
            record("Oak Terrace", "Electricity", Some(2022)),
            record("Oak Terrace", "Electricity", Some(2023)),
            record("Oak Terrace", "Gas", Some(2023)),
            record("Elm Court", "Electricity", Some(2023)),
            record("Elm Court", "Water", None),
        ]
    }

    #[test]
    fn test_filter_by_all_criteria() {
        let records = sample();

        let filter = RecordFilter::new()
            .property("Oak Terrace")
            .utility("Electricity")
            .years([2023]);
        let selected = filter.apply(&records);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].year, Some(2023));

        assert_eq!(RecordFilter::new().apply(&records).len(), records.len());
        assert_eq!(RecordFilter::new().years([2023]).apply(&records).len(), 3);
    }

    #[test]
    fn test_comparison_keeps_utility_and_years() {
        let records = sample();
        let filter = RecordFilter::new()
            .property("Oak Terrace")
            .utility("Electricity")
            .years([2023]);

        let other = filter.comparison("Elm Court");
        assert_eq!(other.utility.as_deref(), Some("Electricity"));
        assert_eq!(other.years, filter.years);
        assert_eq!(other.apply(&records).len(), 1);
        assert_eq!(filter.property.as_deref(), Some("Oak Terrace"));
    }

    #[test]
    fn test_listing_helpers() {
        let records = sample();
        assert_eq!(properties(&records), vec!["Elm Court", "Oak Terrace"]);
        assert_eq!(utilities_for(&records, "Oak Terrace"), vec!["Electricity", "Gas"]);
        assert_eq!(years(&records), vec![2022, 2023]);
        assert!(properties(&[]).is_empty());
    }
}
