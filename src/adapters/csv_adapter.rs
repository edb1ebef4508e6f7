//! CSV file data adapter.
//!
//! One file per symbol, `<base>/<SYMBOL>.csv`. The header row names the
//! columns; the first column is the bar timestamp and every other column is
//! numeric. Rows are sorted by timestamp on load.

use crate::domain::error::SsbtError;
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

/// Accepts full datetimes or plain dates (taken as midnight).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl DataPort for CsvAdapter {
    fn fetch_series(&self, symbol: &str) -> Result<PriceSeries, SsbtError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| SsbtError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| SsbtError::Data {
                reason: format!("CSV header error: {}", e),
            })?
            .clone();
        if headers.len() < 2 {
            return Err(SsbtError::Data {
                reason: format!(
                    "{} needs a timestamp column and at least one value column",
                    path.display()
                ),
            });
        }
        let names: Vec<String> = headers.iter().skip(1).map(str::to_lowercase).collect();

        let mut rows: Vec<(NaiveDateTime, Vec<f64>)> = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| SsbtError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let raw_time = record.get(0).unwrap_or_default();
            let timestamp = parse_timestamp(raw_time).ok_or_else(|| SsbtError::Data {
                reason: format!("row {}: invalid timestamp '{}'", line + 1, raw_time),
            })?;

            let values = names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let raw = record.get(i + 1).unwrap_or_default();
                    raw.parse::<f64>().map_err(|e| SsbtError::Data {
                        reason: format!("row {}: invalid {} value '{}': {}", line + 1, name, raw, e),
                    })
                })
                .collect::<Result<Vec<f64>, SsbtError>>()?;

            rows.push((timestamp, values));
        }

        rows.sort_by_key(|(ts, _)| *ts);

        let timestamps: Vec<NaiveDateTime> = rows.iter().map(|(ts, _)| *ts).collect();
        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            columns.insert(name.clone(), rows.iter().map(|(_, v)| v[i]).collect());
        }

        debug!(symbol, rows = timestamps.len(), path = %path.display(), "loaded price series");
        PriceSeries::new(symbol, timestamps, columns)
    }

    fn list_symbols(&self) -> Result<Vec<String>, SsbtError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| SsbtError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SsbtError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "Date,Open,High,Low,Close,Volume\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n";

        fs::write(path.join("BHP.csv"), csv_content).unwrap();
        fs::write(path.join("CBA.csv"), "timestamp,close\n").unwrap();
        fs::write(path.join("notes.txt"), "not data").unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_series_reads_all_columns() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter.fetch_series("BHP").unwrap();
        assert_eq!(series.symbol, "BHP");
        assert_eq!(series.len(), 3);
        assert_eq!(
            series.column_names().collect::<Vec<_>>(),
            vec!["close", "high", "low", "open", "volume"]
        );
        assert_eq!(series.close_at(0), Some(105.0));
        assert_eq!(series.column("high").unwrap()[0], 110.0);
        assert_eq!(series.column("volume").unwrap()[2], 55000.0);
    }

    #[test]
    fn fetch_series_sorts_rows() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter.fetch_series("BHP").unwrap();
        assert!(series.validate().is_ok());
        assert_eq!(
            series.timestamps()[0],
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn fetch_series_header_only_is_empty() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter.fetch_series("CBA").unwrap();
        assert!(series.is_empty());
        assert!(matches!(series.validate(), Err(SsbtError::EmptySeries)));
    }

    #[test]
    fn fetch_series_missing_file_is_data_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let result = adapter.fetch_series("XYZ");
        assert!(matches!(result, Err(SsbtError::Data { .. })));
    }

    #[test]
    fn fetch_series_bad_number_is_data_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("BAD.csv"),
            "date,close\n2024-01-15,abc\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());

        let result = adapter.fetch_series("BAD");
        assert!(matches!(result, Err(SsbtError::Data { reason }) if reason.contains("close")));
    }

    #[test]
    fn fetch_series_bad_timestamp_is_data_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("BAD.csv"), "date,close\n15/01/2024,1.0\n").unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());

        assert!(matches!(
            adapter.fetch_series("BAD"),
            Err(SsbtError::Data { .. })
        ));
    }

    #[test]
    fn parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-01 09:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T09:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 09:30"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn list_symbols_returns_csv_stems() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let symbols = adapter.list_symbols().unwrap();
        assert_eq!(symbols, vec!["BHP", "CBA"]);
    }

    #[test]
    fn list_symbols_missing_dir_is_error() {
        let adapter = CsvAdapter::new(PathBuf::from("/nonexistent/ssbt/data"));
        assert!(adapter.list_symbols().is_err());
    }
}
