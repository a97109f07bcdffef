use crate::error::{GridForgeError, Result};
use crate::normalizer::normalize;
use crate::schema::{BillingRecord, RawRow, RawValue};
use log::{debug, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Reads raw rows from any CSV source whose first line is the header.
pub fn raw_rows_from_reader<R: Read>(reader: R) -> Result<Vec<RawRow>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable CSV line {}: {}", idx + 2, e);
                continue;
            }
        };

        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.trim().to_string(), RawValue::from(cell)))
            .collect();
        rows.push(row);
    }

    debug!("Read {} raw rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

/// Reads raw rows from a CSV file. A missing file is the one hard failure of
/// the pipeline.
pub fn read_raw_csv(path: impl AsRef<Path>) -> Result<Vec<RawRow>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(GridForgeError::SourceNotFound(path.display().to_string()));
    }

    let file = std::fs::File::open(path)?;
    raw_rows_from_reader(file)
}

/// Parses a JSON array of objects, e.g. an API response, into raw rows.
pub fn raw_rows_from_json(json: &str) -> Result<Vec<RawRow>> {
    let rows: Vec<RawRow> = serde_json::from_str(json)?;
    Ok(rows)
}

/// Reads and normalizes a CSV billing export in one step.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<BillingRecord>> {
    let path = path.as_ref();
    let rows = read_raw_csv(path)?;
    info!("Loaded {} raw rows from {}", rows.len(), path.display());
    Ok(normalize(&rows))
}

/// The normalized record set of one source, loaded on first use and kept until
/// [`CachedDataset::clear`] is called.
#[derive(Debug)]
pub struct CachedDataset {
    path: PathBuf,
    records: Mutex<Option<Arc<Vec<BillingRecord>>>>,
}

impl CachedDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<Arc<Vec<BillingRecord>>> {
        let mut slot = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(records) = slot.as_ref() {
            return Ok(Arc::clone(records));
        }

        let records = Arc::new(load_records(&self.path)?);
        *slot = Some(Arc::clone(&records));
        Ok(records)
    }

    pub fn is_loaded(&self) -> bool {
        self.records
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        let mut slot = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
        debug!("Cleared cached dataset for {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Property Name,Utility,Billing Date,Usage,$ Amount
Oak Terrace,Electricity,2024-01-31,1000,150
Oak Terrace,Electricity,2024-02-29,,160
,Electricity,2024-03-31,900,140
";

    #[test]
    fn test_reads_csv_rows() {
        let rows = raw_rows_from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get("Usage"), Some(&RawValue::Empty));
        assert_eq!(
            rows[0].get("Utility"),
            Some(&RawValue::Text("Electricity".to_string()))
        );

        let records = normalize(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].usage, None);
        assert_eq!(records[1].cost, Some(160.0));
    }

    #[test]
    fn test_missing_source_is_hard_failure() {
        let result = read_raw_csv("/definitely/not/here/billing.csv");
        assert!(matches!(result, Err(GridForgeError::SourceNotFound(_))));

        let dataset = CachedDataset::new("/definitely/not/here/billing.csv");
        assert!(dataset.get().is_err());
        assert!(!dataset.is_loaded());
    }

    #[test]
    fn test_json_rows() {
        let json = r#"[{"Property Name": "A", "Utility": "Gas", "Usage": 12.5}]"#;
        let rows = raw_rows_from_json(json).unwrap();
        let records = normalize(&rows);
        assert_eq!(records[0].usage, Some(12.5));

        assert!(raw_rows_from_json("{not json").is_err());
    }

    #[test]
    fn test_cached_dataset_reloads_after_clear() {
        let path = std::env::temp_dir().join(format!(
            "gridforge_cache_test_{}.csv",
            std::process::id()
        ));
        std::fs::write(&path, SAMPLE).unwrap();

        let dataset = CachedDataset::new(&path);
        let first = dataset.get().unwrap();
        assert_eq!(first.len(), 2);
        assert!(dataset.is_loaded());

        let second = dataset.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        dataset.clear();
        assert!(!dataset.is_loaded());
        let third = dataset.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));

        std::fs::remove_file(&path).unwrap();
    }
}
