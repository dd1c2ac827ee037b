//! Deterministic forecasters for tests.
//!
//! These stand in for [`crate::model::Sarima`] wherever a test needs exact,
//! hand-computable predictions or needs to observe what the validator
//! feeds the model.

use std::cell::RefCell;

use crate::domain::{ForecastError, Result};
use crate::model::{FittedModel, Forecaster};

// ---------------------------------------------------------------------------
// HistoricalMean
// ---------------------------------------------------------------------------

/// Forecasts the mean of everything it has seen, for every horizon.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalMean;

/// Fitted state of [`HistoricalMean`].
#[derive(Debug, Clone, PartialEq)]
pub struct MeanModel {
    sum: f64,
    count: usize,
}

impl MeanModel {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Forecaster for HistoricalMean {
    type Model = MeanModel;

    fn fit(&self, history: &[f64]) -> Result<MeanModel> {
        if history.is_empty() {
            return Err(ForecastError::Fit("cannot fit on empty history".to_string()));
        }
        Ok(MeanModel {
            sum: history.iter().sum(),
            count: history.len(),
        })
    }
}

impl FittedModel for MeanModel {
    fn forecast(&self, steps: usize) -> Result<Vec<f64>> {
        Ok(vec![self.sum / self.count as f64; steps])
    }

    fn append(&mut self, observation: f64) -> Result<()> {
        self.sum += observation;
        self.count += 1;
        Ok(())
    }

    fn summary(&self) -> String {
        format!("HistoricalMean(n={})", self.count)
    }
}

// ---------------------------------------------------------------------------
// RecordingForecaster
// ---------------------------------------------------------------------------

/// Wraps [`HistoricalMean`] and records the history length of every fit.
#[derive(Debug, Default)]
pub struct RecordingForecaster {
    fit_lengths: RefCell<Vec<usize>>,
}

impl RecordingForecaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// History lengths seen by each `fit` call, in call order.
    pub fn fit_lengths(&self) -> Vec<usize> {
        self.fit_lengths.borrow().clone()
    }
}

impl Forecaster for RecordingForecaster {
    type Model = MeanModel;

    fn fit(&self, history: &[f64]) -> Result<MeanModel> {
        self.fit_lengths.borrow_mut().push(history.len());
        HistoricalMean.fit(history)
    }
}

// ---------------------------------------------------------------------------
// FailingForecaster
// ---------------------------------------------------------------------------

/// Behaves like [`HistoricalMean`] except that the fit on a history of
/// exactly `fail_at_len` values fails.
#[derive(Debug, Clone, Copy)]
pub struct FailingForecaster {
    pub fail_at_len: usize,
}

impl Forecaster for FailingForecaster {
    type Model = MeanModel;

    fn fit(&self, history: &[f64]) -> Result<MeanModel> {
        if history.len() == self.fail_at_len {
            return Err(ForecastError::Fit(format!(
                "simulated non-convergence at history length {}",
                history.len()
            )));
        }
        HistoricalMean.fit(history)
    }
}
