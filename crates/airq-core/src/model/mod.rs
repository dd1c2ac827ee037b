//! Forecast model adapter.
//!
//! The validator and trainer only see two narrow traits:
//! - [`Forecaster`]: estimate a model from a history of values
//! - [`FittedModel`]: forecast from the estimated model
//!
//! [`sarima::Sarima`] is the production implementation; deterministic
//! stand-ins for tests live in [`crate::fakes`].

pub mod sarima;

use crate::domain::Result;

/// Estimates a fresh model from a series of values.
pub trait Forecaster {
    type Model: FittedModel;

    /// Fit on `history`. Must accept series that fail classical
    /// stationarity tests; only genuine numerical failures are errors.
    fn fit(&self, history: &[f64]) -> Result<Self::Model>;
}

/// A model estimated by a [`Forecaster`].
pub trait FittedModel {
    /// Forecast the next `steps` values after the conditioning data.
    fn forecast(&self, steps: usize) -> Result<Vec<f64>>;

    /// Extend the conditioning data by one observation without
    /// re-estimating parameters.
    fn append(&mut self, observation: f64) -> Result<()>;

    /// Human-readable description of the estimate.
    fn summary(&self) -> String;

    /// One-step-ahead forecast.
    fn forecast_one(&self) -> Result<f64> {
        self.forecast(1)?
            .first()
            .copied()
            .ok_or_else(|| crate::domain::ForecastError::Fit("empty one-step forecast".to_string()))
    }
}

pub use sarima::{Sarima, SarimaModel};
