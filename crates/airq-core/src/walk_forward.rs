//! Expanding-window walk-forward validation.
//!
//! For every timestamp in the test segment, in order:
//!
//! 1. fit a fresh model on the current history,
//! 2. forecast one step ahead,
//! 3. record `(timestamp, actual, predicted)`,
//! 4. append the *observed* value (never the prediction) to the history.
//!
//! # Cost
//!
//! This is the most expensive operation in the system: a test segment of
//! `n` steps triggers `n` model fits, each on a longer history than the
//! last. [`WalkForwardOptions::refit_every`] trades fidelity for time by
//! refitting only every `k` steps and conditioning the last fit on new
//! observations in between. Steps are strictly sequential (step `t+1`
//! depends on the value appended at step `t`), so the loop is not
//! parallelised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ForecastError, History, Result, SarimaConfig, TimeSeries};
use crate::evaluate::{evaluate, MetricPair};
use crate::metrics::METRICS;
use crate::model::{FittedModel, Forecaster, Sarima};
use crate::obs;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One test timestamp with its observed and predicted value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub actual: f64,
    /// `NaN` when `skipped` is set.
    pub predicted: f64,
    /// The step's fit failed under [`FitFailurePolicy::SkipWithSentinel`].
    #[serde(default)]
    pub skipped: bool,
}

/// Ordered prediction records plus the training series they extend.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    records: Vec<PredictionRecord>,
    train: TimeSeries,
}

impl ValidationResult {
    pub fn new(records: Vec<PredictionRecord>, train: TimeSeries) -> Self {
        Self { records, train }
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn train(&self) -> &TimeSeries {
        &self.train
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn actual(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.actual).collect()
    }

    pub fn predicted(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.predicted).collect()
    }

    pub fn skipped_count(&self) -> usize {
        self.records.iter().filter(|r| r.skipped).count()
    }

    /// MSE/MAE over every non-skipped record.
    pub fn metrics(&self) -> Result<MetricPair> {
        let (actual, predicted): (Vec<f64>, Vec<f64>) = self
            .records
            .iter()
            .filter(|r| !r.skipped)
            .map(|r| (r.actual, r.predicted))
            .unzip();
        if actual.is_empty() && !self.records.is_empty() {
            return Err(ForecastError::data("every validation step was skipped"));
        }
        evaluate(&actual, &predicted)
    }
}

/// A finished run: the result plus the model state it ended with.
#[derive(Debug)]
pub struct ValidationOutcome<M> {
    pub run_id: String,
    pub result: ValidationResult,
    /// Model from the last successful fit, conditioned on every test
    /// observation after it, including the final one (absent when no fit
    /// ever succeeded).
    pub last_model: Option<M>,
    pub history_len: usize,
    pub fits: usize,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do when a single step's fit or forecast fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitFailurePolicy {
    /// Abort the run and propagate the error. Nothing is persisted.
    #[default]
    FailFast,
    /// Record `NaN` with `skipped = true` and continue.
    #[serde(rename = "skip")]
    SkipWithSentinel,
}

/// Cooperative cancellation flag checked before every step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for a walk-forward run. The default refits every step, fails fast
/// and cannot be cancelled.
#[derive(Debug, Clone)]
pub struct WalkForwardOptions {
    pub refit_every: usize,
    pub on_fit_failure: FitFailurePolicy,
    pub cancel: Option<CancelToken>,
}

impl Default for WalkForwardOptions {
    fn default() -> Self {
        Self {
            refit_every: 1,
            on_fit_failure: FitFailurePolicy::FailFast,
            cancel: None,
        }
    }
}

impl WalkForwardOptions {
    pub fn with_refit_every(mut self, k: usize) -> Self {
        self.refit_every = k;
        self
    }

    pub fn with_failure_policy(mut self, policy: FitFailurePolicy) -> Self {
        self.on_fit_failure = policy;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Walk-forward validator over any [`Forecaster`].
pub struct WalkForwardValidator<F> {
    forecaster: F,
    options: WalkForwardOptions,
}

impl<F: Forecaster> WalkForwardValidator<F> {
    pub fn new(forecaster: F) -> Self {
        Self {
            forecaster,
            options: WalkForwardOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WalkForwardOptions) -> Self {
        self.options = options;
        self
    }

    pub fn forecaster(&self) -> &F {
        &self.forecaster
    }

    /// Run validation and return only the prediction table.
    pub fn validate(&self, train: &TimeSeries, test: &TimeSeries) -> Result<ValidationResult> {
        self.run(train, test).map(|outcome| outcome.result)
    }

    /// Run validation over `test`, expanding from `train`.
    ///
    /// # Errors
    ///
    /// - `ForecastError::Data` if either segment is empty or `test` does
    ///   not start one cadence step after `train` ends.
    /// - `ForecastError::Config` if `refit_every` is zero.
    /// - The first fit/forecast error under [`FitFailurePolicy::FailFast`].
    /// - `ForecastError::Cancelled` when the cancel token trips.
    pub fn run(&self, train: &TimeSeries, test: &TimeSeries) -> Result<ValidationOutcome<F::Model>> {
        if train.is_empty() {
            return Err(ForecastError::data("train series is empty"));
        }
        if test.is_empty() {
            return Err(ForecastError::data("test series is empty"));
        }
        if !test.follows(train) {
            return Err(ForecastError::data(format!(
                "test must start one cadence step after train ends (train ends {:?}, test starts {:?})",
                train.last_timestamp(),
                test.first_timestamp()
            )));
        }
        let refit_every = self.options.refit_every;
        if refit_every == 0 {
            return Err(ForecastError::config("refit_every must be at least 1"));
        }

        let run_id = format!("wfv-{}", uuid::Uuid::new_v4());
        let _span = obs::RunSpan::enter(&run_id);
        obs::emit_validation_started(&run_id, train.len(), test.len(), refit_every);
        let started = Instant::now();

        let mut history = History::from_series(train);
        let mut model: Option<F::Model> = None;
        let mut records = Vec::with_capacity(test.len());
        let mut fits = 0usize;
        let mut skipped = 0usize;

        for (step, point) in test.iter().enumerate() {
            if let Some(token) = &self.options.cancel {
                if token.is_cancelled() {
                    obs::emit_validation_cancelled(&run_id, step);
                    return Err(ForecastError::Cancelled { completed: step });
                }
            }

            let refit = step % refit_every == 0 || model.is_none();
            if refit {
                fits += 1;
            }

            match self.predict_step(&history, &mut model, refit) {
                Ok(predicted) => {
                    obs::emit_validation_step(step, history.len(), refit, predicted, point.value);
                    records.push(PredictionRecord {
                        timestamp: point.timestamp,
                        actual: point.value,
                        predicted,
                        skipped: false,
                    });
                }
                Err(err) => {
                    obs::emit_fit_failed(step, history.len(), &err);
                    match self.options.on_fit_failure {
                        FitFailurePolicy::FailFast => return Err(err),
                        FitFailurePolicy::SkipWithSentinel => {
                            METRICS.inc_skipped();
                            skipped += 1;
                            model = None;
                            records.push(PredictionRecord {
                                timestamp: point.timestamp,
                                actual: point.value,
                                predicted: f64::NAN,
                                skipped: true,
                            });
                        }
                    }
                }
            }

            // Ground truth, not the prediction, extends the history.
            history.push(point.value);
            let last_step = step + 1 == test.len();
            let next_refits = !last_step && (step + 1) % refit_every == 0;
            if let Some(m) = model.as_mut() {
                if !next_refits {
                    m.append(point.value)?;
                }
            }
            debug_assert_eq!(history.len(), train.len() + step + 1);
        }

        obs::emit_validation_finished(
            &run_id,
            records.len(),
            fits,
            skipped,
            started.elapsed().as_millis() as u64,
        );

        Ok(ValidationOutcome {
            run_id,
            result: ValidationResult::new(records, train.clone()),
            last_model: model,
            history_len: history.len(),
            fits,
        })
    }

    fn predict_step(
        &self,
        history: &History,
        model: &mut Option<F::Model>,
        refit: bool,
    ) -> Result<f64> {
        if refit {
            *model = None;
            METRICS.inc_fits();
            *model = Some(self.forecaster.fit(history.values())?);
        }
        let fitted = model
            .as_ref()
            .ok_or_else(|| ForecastError::fit("no fitted model available for this step"))?;
        METRICS.inc_forecasts();
        fitted.forecast_one()
    }
}

/// Walk-forward validation with the SARIMA adapter and default options.
pub fn walk_forward_validate(
    train: &TimeSeries,
    test: &TimeSeries,
    config: &SarimaConfig,
) -> Result<ValidationResult> {
    WalkForwardValidator::new(Sarima::new(*config)?).validate(train, test)
}
