//! Application configuration.
//!
//! Loaded once at startup from a TOML file and passed by reference to each
//! component. Relative paths are resolved against the directory holding the
//! config file.
//!
//! ```toml
//! [paths]
//! raw_data_dir = "data/raw"
//! combined_series = "data/processed/pm25_6h.csv"
//! model_dir = "models"
//! results_dir = "results"
//!
//! [series]
//! value_column = "pm25"
//! cadence_minutes = 360
//!
//! [split]
//! test_start = "2024-11-25"
//!
//! [model]
//! order = [2, 1, 3]
//! seasonal_order = [1, 0, 1, 28]
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ForecastError, Result, SarimaConfig, TimeSeries, TrainTestSplit};
use crate::ingest::parse_timestamp;
use crate::trainer::HorizonSet;
use crate::walk_forward::{FitFailurePolicy, WalkForwardOptions};

const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub series: SeriesConfig,
    #[serde(default)]
    pub split: SplitConfig,
    pub model: SarimaConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

/// Filesystem locations. All required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory of raw monthly exports.
    pub raw_data_dir: PathBuf,
    /// The combined, gap-filled series CSV.
    pub combined_series: PathBuf,
    pub model_dir: PathBuf,
    pub results_dir: PathBuf,
}

/// Layout of the combined series file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SeriesConfig {
    pub date_column: String,
    pub value_column: String,
    pub cadence_minutes: i64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            date_column: "date".to_string(),
            value_column: "pm25".to_string(),
            cadence_minutes: 360,
        }
    }
}

impl SeriesConfig {
    pub fn cadence(&self) -> Duration {
        Duration::minutes(self.cadence_minutes)
    }
}

/// Where the test segment begins. At most one of the two keys may be set;
/// with neither, the first 80% of the series trains.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub test_start: Option<String>,
    pub train_fraction: Option<f64>,
}

/// Parsed form of [`SplitConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitRule {
    AtTime(DateTime<Utc>),
    Fraction(f64),
}

impl SplitConfig {
    pub fn rule(&self) -> Result<SplitRule> {
        match (&self.test_start, self.train_fraction) {
            (Some(_), Some(_)) => Err(ForecastError::config(
                "split: set either test_start or train_fraction, not both",
            )),
            (Some(raw), None) => parse_timestamp(raw)
                .map(SplitRule::AtTime)
                .ok_or_else(|| ForecastError::config(format!("split: invalid test_start {:?}", raw))),
            (None, Some(f)) if f > 0.0 && f < 1.0 => Ok(SplitRule::Fraction(f)),
            (None, Some(f)) => Err(ForecastError::config(format!(
                "split: train_fraction must lie in (0, 1), got {}",
                f
            ))),
            (None, None) => Ok(SplitRule::Fraction(DEFAULT_TRAIN_FRACTION)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Refit every k steps; 1 reproduces the full walk-forward procedure.
    pub refit_every: usize,
    pub on_fit_failure: FitFailurePolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            refit_every: 1,
            on_fit_failure: FitFailurePolicy::FailFast,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub horizons: HorizonSet,
}

impl AppConfig {
    /// Load, resolve and validate a config file.
    ///
    /// # Errors
    ///
    /// `ForecastError::Config` for a missing or unreadable file, malformed
    /// TOML, missing keys, or values that fail [`AppConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::config(format!("cannot read config file {:?}: {}", path, e))
        })?;
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Self::from_toml_str(&raw, &root)
    }

    /// Parse from TOML text, resolving relative paths against `root`.
    pub fn from_toml_str(raw: &str, root: &Path) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(raw)
            .map_err(|e| ForecastError::config(format!("malformed config: {}", e)))?;
        config.resolve_paths(root);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, root: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        resolve(&mut self.paths.raw_data_dir);
        resolve(&mut self.paths.combined_series);
        resolve(&mut self.paths.model_dir);
        resolve(&mut self.paths.results_dir);
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        if self.series.cadence_minutes <= 0 {
            return Err(ForecastError::config(format!(
                "series.cadence_minutes must be positive, got {}",
                self.series.cadence_minutes
            )));
        }
        if self.validation.refit_every == 0 {
            return Err(ForecastError::config("validation.refit_every must be at least 1"));
        }
        self.split.rule()?;
        Ok(())
    }

    /// Partition `series` according to `[split]`.
    pub fn split_series(&self, series: &TimeSeries) -> Result<TrainTestSplit> {
        match self.split.rule()? {
            SplitRule::AtTime(ts) => series.split_at_time(ts),
            SplitRule::Fraction(f) => series.split_by_fraction(f),
        }
    }

    /// Walk-forward options from `[validation]`, without a cancel token.
    pub fn walk_forward_options(&self) -> WalkForwardOptions {
        WalkForwardOptions::default()
            .with_refit_every(self.validation.refit_every)
            .with_failure_policy(self.validation.on_fit_failure)
    }
}
