//! Reading the combined series CSV.
//!
//! The file is produced upstream (resampled and gap-filled). This module only
//! checks that it really is: timestamps strictly increasing at the configured
//! cadence, every value present and finite. Nothing is interpolated.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::config::SeriesConfig;
use crate::domain::{ForecastError, Observation, Result, TimeSeries};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse an ISO-8601 timestamp. Offsets are honoured; naive date-times and
/// bare dates are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Read `path` into a [`TimeSeries`] using the column names and cadence in
/// `series`.
///
/// # Errors
///
/// `ForecastError::Data` for a missing file, missing columns, unparseable or
/// missing cells, an empty file, or a series that breaks the cadence.
pub fn read_series_csv(path: &Path, series: &SeriesConfig) -> Result<TimeSeries> {
    if !path.exists() {
        return Err(ForecastError::data(format!(
            "combined series file not found: {:?}",
            path
        )));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
            ForecastError::data(format!("{:?} has no {:?} column", path, name))
        })
    };
    let date_idx = column(&series.date_column)?;
    let value_idx = column(&series.value_column)?;

    let mut observations = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = row + 2;
        let raw_ts = record.get(date_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
            ForecastError::data(format!("line {}: unparseable timestamp {:?}", line, raw_ts))
        })?;
        let raw_value = record.get(value_idx).unwrap_or("").trim();
        if raw_value.is_empty() {
            return Err(ForecastError::data(format!(
                "line {}: missing {} value",
                line, series.value_column
            )));
        }
        let value: f64 = raw_value.parse().map_err(|_| {
            ForecastError::data(format!("line {}: invalid number {:?}", line, raw_value))
        })?;
        observations.push(Observation::new(timestamp, value));
    }

    if observations.is_empty() {
        return Err(ForecastError::data(format!("{:?} contains no observations", path)));
    }
    let ts = TimeSeries::new(series.cadence(), observations)?;
    tracing::debug!(path = %path.display(), len = ts.len(), "series loaded");
    Ok(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn write(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("series.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn cfg() -> SeriesConfig {
        SeriesConfig::default()
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 11, 25, 6, 0, 0).unwrap();
        for raw in [
            "2024-11-25T06:00:00Z",
            "2024-11-25T08:00:00+02:00",
            "2024-11-25 06:00:00",
            "2024-11-25T06:00:00",
            "2024-11-25 06:00",
            "2024-11-25 06:00:00.000",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{}", raw);
        }
        assert_eq!(
            parse_timestamp("2024-11-25"),
            Some(Utc.with_ymd_and_hms(2024, 11, 25, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("25/11/2024"), None);
    }

    #[test]
    fn reads_regular_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "date,pm25\n2024-01-01 00:00:00,12.5\n2024-01-01 06:00:00,13.0\n2024-01-01 12:00:00,9.25\n",
        );
        let ts = read_series_csv(&path, &cfg()).unwrap();
        assert_eq!(ts.values(), &[12.5, 13.0, 9.25]);
        assert_eq!(ts.cadence(), Duration::hours(6));
    }

    #[test]
    fn column_names_are_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "station,ts,value\nA,2024-01-01,1.0\nA,2024-01-02,2.0\n");
        let series = SeriesConfig {
            date_column: "ts".to_string(),
            value_column: "value".to_string(),
            cadence_minutes: 24 * 60,
        };
        assert_eq!(read_series_csv(&path, &series).unwrap().len(), 2);
    }

    #[test]
    fn gap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "date,pm25\n2024-01-01 00:00:00,1\n2024-01-01 12:00:00,2\n",
        );
        assert!(matches!(read_series_csv(&path, &cfg()), Err(ForecastError::Data(_))));
    }

    #[test]
    fn non_monotonic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "date,pm25\n2024-01-01 06:00:00,1\n2024-01-01 00:00:00,2\n",
        );
        assert!(matches!(read_series_csv(&path, &cfg()), Err(ForecastError::Data(_))));
    }

    #[test]
    fn missing_value_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "date,pm25\n2024-01-01 00:00:00,1\n2024-01-01 06:00:00,\n");
        let err = read_series_csv(&path, &cfg()).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn missing_file_and_empty_file_are_data_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_series_csv(&dir.path().join("absent.csv"), &cfg()),
            Err(ForecastError::Data(_))
        ));
        let path = write(&dir, "date,pm25\n");
        assert!(matches!(read_series_csv(&path, &cfg()), Err(ForecastError::Data(_))));
    }

    #[test]
    fn missing_column_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "date,no2\n2024-01-01,1\n");
        assert!(matches!(read_series_csv(&path, &cfg()), Err(ForecastError::Data(_))));
    }
}
