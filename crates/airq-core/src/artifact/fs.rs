use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::{latest, list, ArtifactEntry, ArtifactKind, ArtifactStamp};
use crate::domain::{ForecastError, Observation, Result, TimeSeries};
use crate::ingest::parse_timestamp;
use crate::metrics::METRICS;
use crate::obs;
use crate::trainer::TrainedModel;
use crate::walk_forward::{PredictionRecord, ValidationResult};

const CSV_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MODEL_FORMAT_VERSION: u32 = 1;

/// A typed artifact plus the file it came from.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub entry: ArtifactEntry,
    pub value: T,
}

/// Files written for one trained model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifactPaths {
    pub model: PathBuf,
    pub summary: PathBuf,
}

/// On-disk form of a model artifact. `digest` is the SHA-256 of the
/// compact JSON encoding of `model`.
#[derive(Debug, Serialize, Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    digest: String,
    model: TrainedModel,
}

fn model_digest(model: &TrainedModel) -> Result<String> {
    let bytes = serde_json::to_vec(model)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Append-only artifact directory.
///
/// Layout: `<dir>/<stamp><suffix>` for every [`ArtifactKind`].
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    /// Open (and create if needed) the artifact directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomic, no-clobber write of a new artifact file.
    fn write_new(&self, kind: ArtifactKind, stamp: ArtifactStamp, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(kind.file_name(stamp));

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                ForecastError::ArtifactExists(path.clone())
            } else {
                ForecastError::Io(e.error)
            }
        })?;

        METRICS.inc_artifacts();
        obs::emit_artifact_written(kind.name(), &path);
        Ok(path)
    }

    // ---------------------------------------------------------------------
    // Walk-forward results
    // ---------------------------------------------------------------------

    pub fn write_validation_result(&self, result: &ValidationResult) -> Result<PathBuf> {
        self.write_validation_result_at(ArtifactStamp::now(), result)
    }

    /// Write `<stamp>_walk_forward_results.csv`.
    ///
    /// Columns are `date,y_train,y_test,y_pred`: training rows fill only
    /// `y_train`, test rows fill `y_test` and `y_pred`. Skipped steps write
    /// `NaN` as the prediction.
    pub fn write_validation_result_at(
        &self,
        stamp: ArtifactStamp,
        result: &ValidationResult,
    ) -> Result<PathBuf> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(["date", "y_train", "y_test", "y_pred"])?;
        for point in result.train().iter() {
            wtr.write_record([
                point.timestamp.format(CSV_DATE_FORMAT).to_string(),
                point.value.to_string(),
                String::new(),
                String::new(),
            ])?;
        }
        for rec in result.records() {
            wtr.write_record([
                rec.timestamp.format(CSV_DATE_FORMAT).to_string(),
                String::new(),
                rec.actual.to_string(),
                rec.predicted.to_string(),
            ])?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| ForecastError::Io(e.into_error()))?;
        self.write_new(ArtifactKind::WalkForwardResults, stamp, &bytes)
    }

    pub fn load_latest_validation(&self) -> Result<Loaded<ValidationResult>> {
        let entry = self.latest(ArtifactKind::WalkForwardResults)?;
        let value = read_validation_csv(&entry.path)?;
        Ok(Loaded { entry, value })
    }

    // ---------------------------------------------------------------------
    // Models
    // ---------------------------------------------------------------------

    pub fn write_model(&self, model: &TrainedModel) -> Result<ModelArtifactPaths> {
        self.write_model_at(ArtifactStamp::now(), model)
    }

    /// Write `<stamp>_sarima_summary.txt` and then `<stamp>_sarima_model.json`.
    ///
    /// The summary lands first so a model file never exists without its
    /// companion; if the model write fails the summary is removed again.
    pub fn write_model_at(
        &self,
        stamp: ArtifactStamp,
        model: &TrainedModel,
    ) -> Result<ModelArtifactPaths> {
        let envelope = ModelEnvelope {
            format_version: MODEL_FORMAT_VERSION,
            digest: model_digest(model)?,
            model: model.clone(),
        };
        let json = serde_json::to_vec_pretty(&envelope)?;
        let summary_path =
            self.write_new(ArtifactKind::SarimaSummary, stamp, model.summary().as_bytes())?;
        let model_path = match self.write_new(ArtifactKind::SarimaModel, stamp, &json) {
            Ok(path) => path,
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&summary_path) {
                    tracing::warn!(
                        path = %summary_path.display(),
                        error = %cleanup,
                        "failed to remove orphaned model summary"
                    );
                }
                return Err(err);
            }
        };
        Ok(ModelArtifactPaths {
            model: model_path,
            summary: summary_path,
        })
    }

    /// Load and integrity-check the newest model artifact.
    ///
    /// # Errors
    ///
    /// `ArtifactNotFound` when none exists; `DigestMismatch` when the stored
    /// digest does not match the payload.
    pub fn load_latest_model(&self) -> Result<Loaded<TrainedModel>> {
        let entry = self.latest(ArtifactKind::SarimaModel)?;
        let value = read_model_json(&entry.path)?;
        Ok(Loaded { entry, value })
    }

    // ---------------------------------------------------------------------
    // Listing
    // ---------------------------------------------------------------------

    pub fn latest(&self, kind: ArtifactKind) -> Result<ArtifactEntry> {
        latest(&self.dir, kind.suffix())
    }

    /// All artifacts of `kind`, oldest first.
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<ArtifactEntry>> {
        list(&self.dir, kind.suffix())
    }
}

/// Read a model artifact written by [`FsArtifactSink::write_model_at`].
pub fn read_model_json(path: &Path) -> Result<TrainedModel> {
    let bytes = fs::read(path)?;
    let envelope: ModelEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.format_version != MODEL_FORMAT_VERSION {
        return Err(ForecastError::data(format!(
            "{:?}: unsupported model format version {}",
            path, envelope.format_version
        )));
    }

    let actual = model_digest(&envelope.model)?;
    if actual != envelope.digest {
        return Err(ForecastError::DigestMismatch {
            expected: envelope.digest,
            actual,
        });
    }
    Ok(envelope.model)
}

fn parse_cell(raw: &str, line: usize, column: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| {
        ForecastError::data(format!("line {}: invalid {} value {:?}", line, column, raw))
    })
}

/// Read a walk-forward results CSV.
///
/// The `y_train` column is optional. The cadence is taken from the first two
/// rows. An empty or `NaN` prediction marks a skipped step.
pub fn read_validation_csv(path: &Path) -> Result<ValidationResult> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);
    let required = |name: &str| {
        position(name)
            .ok_or_else(|| ForecastError::data(format!("{:?} has no {:?} column", path, name)))
    };
    let date_idx = required("date")?;
    let test_idx = required("y_test")?;
    let pred_idx = required("y_pred")?;
    let train_idx = position("y_train");

    let mut stamps: Vec<DateTime<Utc>> = Vec::new();
    let mut train = Vec::new();
    let mut records = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let raw_ts = record.get(date_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
            ForecastError::data(format!("line {}: unparseable timestamp {:?}", line, raw_ts))
        })?;
        stamps.push(timestamp);

        let cell = |idx: usize, name: &str| parse_cell(record.get(idx).unwrap_or(""), line, name);
        if let Some(actual) = cell(test_idx, "y_test")? {
            let predicted = cell(pred_idx, "y_pred")?.unwrap_or(f64::NAN);
            records.push(PredictionRecord {
                timestamp,
                actual,
                predicted,
                skipped: !predicted.is_finite(),
            });
        } else if let Some(idx) = train_idx {
            if let Some(value) = cell(idx, "y_train")? {
                train.push(Observation::new(timestamp, value));
            }
        }
    }

    if records.is_empty() {
        return Err(ForecastError::data(format!("{:?} has no test rows", path)));
    }
    let cadence = match stamps.as_slice() {
        [first, second, ..] => *second - *first,
        _ => {
            return Err(ForecastError::data(format!(
                "{:?}: need at least two rows to infer the cadence",
                path
            )))
        }
    };
    let train = if train.is_empty() {
        TimeSeries::empty(cadence)
    } else {
        TimeSeries::new(cadence, train)?
    };
    Ok(ValidationResult::new(records, train))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelOrder, SarimaConfig, SeasonalOrder};
    use crate::fakes::{FailingForecaster, HistoricalMean};
    use crate::trainer::train_once;
    use crate::walk_forward::{FitFailurePolicy, WalkForwardOptions, WalkForwardValidator};
    use chrono::{Duration, TimeZone};

    fn stamp(raw: &str) -> ArtifactStamp {
        ArtifactStamp::parse(raw).unwrap()
    }

    fn split(train: Vec<f64>, test: Vec<f64>) -> (TimeSeries, TimeSeries) {
        let start = Utc.with_ymd_and_hms(2024, 11, 20, 0, 0, 0).unwrap();
        let cadence = Duration::hours(6);
        let n = train.len() as i32;
        (
            TimeSeries::regular(start, cadence, train).unwrap(),
            TimeSeries::regular(start + cadence * n, cadence, test).unwrap(),
        )
    }

    fn sample_result() -> ValidationResult {
        let (train, test) = split(vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0]);
        WalkForwardValidator::new(HistoricalMean)
            .validate(&train, &test)
            .unwrap()
    }

    fn sample_model() -> TrainedModel {
        let values: Vec<f64> = (0..48).map(|i| 20.0 + (i as f64 * 0.9).cos() * 4.0).collect();
        let (train, _) = split(values, vec![0.0]);
        let cfg = SarimaConfig::new(ModelOrder::new(1, 0, 0), SeasonalOrder::none());
        train_once(&train, &cfg).unwrap()
    }

    #[test]
    fn validation_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        let path = sink
            .write_validation_result_at(stamp("2024-11-25T10-30-00"), &sample_result())
            .unwrap();

        assert!(path.ends_with("2024-11-25T10-30-00_walk_forward_results.csv"));
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,y_train,y_test,y_pred");
        assert_eq!(lines[1], "2024-11-20 00:00:00,1,,");
        assert_eq!(lines[5], "2024-11-21 00:00:00,,5,2.5");
        assert_eq!(lines[6], "2024-11-21 06:00:00,,6,3");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn validation_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        let original = sample_result();
        sink.write_validation_result(&original).unwrap();

        let loaded = sink.load_latest_validation().unwrap();
        assert_eq!(loaded.value, original);
        assert_eq!(loaded.value.metrics().unwrap().mse, 7.625);
    }

    #[test]
    fn skipped_steps_survive_persistence() {
        let (train, test) = split(vec![1.0, 2.0], vec![3.0, 4.0, 5.0]);
        let result = WalkForwardValidator::new(FailingForecaster { fail_at_len: 3 })
            .with_options(
                WalkForwardOptions::default()
                    .with_failure_policy(FitFailurePolicy::SkipWithSentinel),
            )
            .validate(&train, &test)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        let path = sink.write_validation_result(&result).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains(",,4,NaN"));

        let back = read_validation_csv(&path).unwrap();
        assert_eq!(back.skipped_count(), 1);
        assert_eq!(back.metrics().unwrap(), result.metrics().unwrap());
    }

    #[test]
    fn existing_artifact_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        let s = stamp("2024-11-25T10-30-00");
        let first = sink.write_validation_result_at(s, &sample_result()).unwrap();
        let before = fs::read(&first).unwrap();

        let err = sink.write_validation_result_at(s, &sample_result()).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactExists(_)));
        assert_eq!(fs::read(&first).unwrap(), before);
    }

    #[test]
    fn model_artifact_roundtrip_with_summary() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        let model = sample_model();
        let paths = sink.write_model_at(stamp("2024-11-25T10-30-00"), &model).unwrap();

        assert!(paths.summary.ends_with("2024-11-25T10-30-00_sarima_summary.txt"));
        let summary = fs::read_to_string(&paths.summary).unwrap();
        assert!(summary.contains("SARIMA(1,0,0)"));

        let loaded = sink.load_latest_model().unwrap();
        assert_eq!(loaded.value, model);
        assert_eq!(loaded.entry.path, paths.model);
    }

    #[test]
    fn failed_model_write_leaves_no_orphan_summary() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        let s = stamp("2024-11-25T10-30-00");
        fs::write(dir.path().join(ArtifactKind::SarimaModel.file_name(s)), b"{}").unwrap();

        let err = sink.write_model_at(s, &sample_model()).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactExists(_)));
        assert!(sink.list(ArtifactKind::SarimaSummary).unwrap().is_empty());
    }

    #[test]
    fn tampered_model_fails_digest_check() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        let paths = sink.write_model(&sample_model()).unwrap();

        let text = fs::read_to_string(&paths.model).unwrap();
        let mut raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        raw["model"]["train_len"] = serde_json::json!(1);
        fs::write(&paths.model, serde_json::to_vec(&raw).unwrap()).unwrap();

        let err = sink.load_latest_model().unwrap_err();
        assert!(matches!(err, ForecastError::DigestMismatch { .. }));
    }

    #[test]
    fn latest_model_absent_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        assert!(sink.load_latest_model().unwrap_err().is_not_found());
        assert!(sink.load_latest_validation().unwrap_err().is_not_found());
    }

    #[test]
    fn list_is_a_monotonic_version_index() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path()).unwrap();
        for s in ["2024-11-26T00-00-00", "2024-11-24T00-00-00", "2024-11-25T00-00-00"] {
            sink.write_validation_result_at(stamp(s), &sample_result()).unwrap();
        }
        let stamps: Vec<String> = sink
            .list(ArtifactKind::WalkForwardResults)
            .unwrap()
            .iter()
            .map(|e| e.stamp.to_string())
            .collect();
        assert_eq!(
            stamps,
            vec!["2024-11-24T00-00-00", "2024-11-25T00-00-00", "2024-11-26T00-00-00"]
        );
        assert!(sink.list(ArtifactKind::SarimaModel).unwrap().is_empty());
    }
}
