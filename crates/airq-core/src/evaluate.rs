//! Forecast accuracy metrics.

use serde::{Deserialize, Serialize};

use crate::domain::{ForecastError, Result};

/// Mean squared and mean absolute error of a prediction series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPair {
    pub mse: f64,
    pub mae: f64,
}

impl MetricPair {
    pub fn rmse(&self) -> f64 {
        self.mse.sqrt()
    }
}

/// Reduce `(actual, predicted)` to [`MetricPair`].
///
/// # Errors
///
/// `ForecastError::Data` when the inputs differ in length, are empty, or
/// contain a non-finite value. Nothing is skipped silently.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<MetricPair> {
    if actual.len() != predicted.len() {
        return Err(ForecastError::data(format!(
            "actual and predicted differ in length ({} vs {})",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(ForecastError::data("cannot evaluate an empty series"));
    }
    if let Some(i) = actual
        .iter()
        .zip(predicted.iter())
        .position(|(a, p)| !a.is_finite() || !p.is_finite())
    {
        return Err(ForecastError::data(format!(
            "missing or non-finite value at position {}",
            i
        )));
    }

    let n = actual.len() as f64;
    let (sq, abs) = actual
        .iter()
        .zip(predicted.iter())
        .fold((0.0, 0.0), |(sq, abs), (a, p)| {
            let diff = a - p;
            (sq + diff * diff, abs + diff.abs())
        });

    Ok(MetricPair {
        mse: sq / n,
        mae: abs / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_series_score_zero() {
        let x = [3.5, -1.0, 12.25, 0.0];
        let m = evaluate(&x, &x).unwrap();
        assert_eq!(m, MetricPair { mse: 0.0, mae: 0.0 });
    }

    #[test]
    fn both_metrics_symmetric_under_swap() {
        let a = [5.0, 6.0, 1.5];
        let p = [2.5, 3.0, 4.0];
        assert_eq!(evaluate(&a, &p).unwrap(), evaluate(&p, &a).unwrap());
    }

    #[test]
    fn reference_values() {
        let m = evaluate(&[5.0, 6.0], &[2.5, 3.0]).unwrap();
        assert_eq!(m.mse, 7.625);
        assert_eq!(m.mae, 2.75);
        assert!((m.rmse() - 7.625f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_is_data_error() {
        let err = evaluate(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, ForecastError::Data(_)));
    }

    #[test]
    fn empty_is_data_error() {
        assert!(matches!(evaluate(&[], &[]), Err(ForecastError::Data(_))));
    }

    #[test]
    fn nan_is_rejected_not_skipped() {
        let err = evaluate(&[1.0, f64::NAN], &[1.0, 2.0]).unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }
}
