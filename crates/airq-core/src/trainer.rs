//! One-shot training and multi-step horizon forecasts.
//!
//! Unlike walk-forward validation this fits once over the whole training
//! series. The resulting [`TrainedModel`] is what the model artifact holds
//! and what `airq forecast` projects forward.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ForecastError, Result, SarimaConfig, TimeSeries};
use crate::evaluate::{evaluate, MetricPair};
use crate::metrics::METRICS;
use crate::model::{FittedModel, Forecaster, Sarima, SarimaModel};
use crate::obs;

/// A fitted SARIMA model plus the series context needed to timestamp its
/// forecasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub config: SarimaConfig,
    pub model: SarimaModel,
    pub trained_at: DateTime<Utc>,
    /// Last timestamp of the training series.
    pub last_timestamp: DateTime<Utc>,
    pub cadence_seconds: i64,
    pub train_len: usize,
}

impl TrainedModel {
    pub fn cadence(&self) -> Duration {
        Duration::seconds(self.cadence_seconds)
    }

    /// Human-readable summary, persisted next to the model artifact.
    pub fn summary(&self) -> String {
        let mut s = self.model.summary();
        s.push_str(&format!("Training observations: {}\n", self.train_len));
        s.push_str(&format!("Last observation: {}\n", self.last_timestamp.to_rfc3339()));
        s.push_str(&format!("Cadence: {}s\n", self.cadence_seconds));
        s.push_str(&format!("Trained at: {}\n", self.trained_at.to_rfc3339()));
        s
    }

    /// Forecast `steps` values, timestamped at the training cadence starting
    /// one step after the last training observation.
    ///
    /// # Errors
    ///
    /// `ForecastError::InvalidHorizon` when `steps` is zero; fit errors from
    /// the underlying model.
    pub fn forecast_horizon(&self, steps: usize) -> Result<TimeSeries> {
        if steps == 0 {
            return Err(ForecastError::InvalidHorizon(
                "horizon must be a positive number of steps".to_string(),
            ));
        }
        let values = self.model.forecast(steps)?;
        let cadence = self.cadence();
        TimeSeries::regular(self.last_timestamp + cadence, cadence, values)
    }
}

/// Fit a single SARIMA model over the full training series.
pub fn train_once(train: &TimeSeries, config: &SarimaConfig) -> Result<TrainedModel> {
    let last_timestamp = train
        .last_timestamp()
        .ok_or_else(|| ForecastError::data("train series is empty"))?;

    let started = Instant::now();
    let forecaster = Sarima::new(*config)?;
    METRICS.inc_fits();
    let model = forecaster.fit(train.values())?;

    obs::emit_model_trained(
        &config.to_string(),
        train.len(),
        model.aic(),
        started.elapsed().as_millis() as u64,
    );

    Ok(TrainedModel {
        config: *config,
        model,
        trained_at: Utc::now(),
        last_timestamp,
        cadence_seconds: train.cadence().num_seconds(),
        train_len: train.len(),
    })
}

/// Score one multi-step forecast from `model` over the whole of `test`.
///
/// This is the static baseline the walk-forward run is compared against:
/// no refits and no new observations, just `test.len()` steps projected
/// from the end of training.
///
/// # Errors
///
/// `ForecastError::Data` when `test` is empty or does not start one cadence
/// step after the last training observation.
pub fn evaluate_baseline(model: &TrainedModel, test: &TimeSeries) -> Result<MetricPair> {
    if test.is_empty() {
        return Err(ForecastError::data("test series is empty"));
    }
    let forecast = model.forecast_horizon(test.len())?;
    if forecast.timestamps() != test.timestamps() {
        return Err(ForecastError::data(format!(
            "test series must start one cadence step after training ends (expected {:?}, got {:?})",
            forecast.first_timestamp(),
            test.first_timestamp()
        )));
    }
    let metrics = evaluate(test.values(), forecast.values())?;
    obs::emit_metrics_computed("baseline", test.len(), metrics.mse, metrics.mae);
    Ok(metrics)
}

/// The enumerated set of forecast step counts an operator may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct HorizonSet {
    steps: Vec<usize>,
}

impl HorizonSet {
    /// Build from a list of step counts. Order and duplicates are ignored.
    ///
    /// # Errors
    ///
    /// `ForecastError::Config` when the list is empty or contains zero.
    pub fn new(mut steps: Vec<usize>) -> Result<Self> {
        if steps.is_empty() {
            return Err(ForecastError::config("forecast horizons must not be empty"));
        }
        if steps.contains(&0) {
            return Err(ForecastError::config("forecast horizons must be positive"));
        }
        steps.sort_unstable();
        steps.dedup();
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn contains(&self, steps: usize) -> bool {
        self.steps.binary_search(&steps).is_ok()
    }

    /// Accept `steps` if it is one of the configured horizons.
    pub fn check(&self, steps: usize) -> Result<usize> {
        if self.contains(steps) {
            Ok(steps)
        } else {
            Err(ForecastError::InvalidHorizon(format!(
                "{} steps is not one of the configured horizons {:?}",
                steps, self.steps
            )))
        }
    }
}

impl Default for HorizonSet {
    /// 1, 3, 7 and 14 days at a 6-hour cadence.
    fn default() -> Self {
        Self {
            steps: vec![4, 12, 28, 56],
        }
    }
}

impl TryFrom<Vec<usize>> for HorizonSet {
    type Error = ForecastError;

    fn try_from(steps: Vec<usize>) -> Result<Self> {
        Self::new(steps)
    }
}

impl From<HorizonSet> for Vec<usize> {
    fn from(set: HorizonSet) -> Self {
        set.steps
    }
}
