//! Domain-level error taxonomy for AIRQ.

use std::path::PathBuf;

/// AIRQ domain errors.
///
/// The first four variants are the user-facing taxonomy; the rest are
/// infrastructure failures surfaced unchanged to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Missing, empty or malformed series data. Fatal for the run that needs it.
    #[error("data error: {0}")]
    Data(String),

    /// Model estimation or forecasting failed.
    #[error("fit error: {0}")]
    Fit(String),

    /// No artifact matching `*{suffix}` exists in `dir`.
    #[error("no {suffix} artifact found in {dir:?}")]
    ArtifactNotFound { dir: PathBuf, suffix: String },

    #[error("artifact already exists: {0:?}")]
    ArtifactExists(PathBuf),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid forecast horizon: {0}")]
    InvalidHorizon(String),

    #[error("run cancelled after {completed} steps")]
    Cancelled { completed: usize },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    /// True when the error only means "produce the artifact first".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ForecastError::ArtifactNotFound { .. })
    }

    pub(crate) fn data(msg: impl Into<String>) -> Self {
        ForecastError::Data(msg.into())
    }

    pub(crate) fn fit(msg: impl Into<String>) -> Self {
        ForecastError::Fit(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ForecastError::Config(msg.into())
    }
}

/// Result type for AIRQ domain operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_error_display() {
        let err = ForecastError::Config("missing [model] section".to_string());
        assert!(err.to_string().contains("config error"));

        let err = ForecastError::Data("series is empty".to_string());
        assert!(err.to_string().contains("data error"));

        let err = ForecastError::Fit("singular design matrix".to_string());
        assert!(err.to_string().contains("fit error"));
    }

    #[test]
    fn test_artifact_not_found_is_soft() {
        let err = ForecastError::ArtifactNotFound {
            dir: PathBuf::from("results"),
            suffix: "_walk_forward_results.csv".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("_walk_forward_results.csv"));

        let err = ForecastError::Fit("boom".to_string());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = ForecastError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_cancelled_reports_progress() {
        let err = ForecastError::Cancelled { completed: 7 };
        assert!(err.to_string().contains("7 steps"));
    }
}
