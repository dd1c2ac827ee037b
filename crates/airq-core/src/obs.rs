//! Structured observability hooks for AIRQ run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for validation, training, artifact and metric events
//!
//! Events are emitted at `info!` level except per-step progress (`debug!`)
//! and failures (`warn!`).

use std::path::Path;

use tracing::{debug, info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter("wfv-1234");
/// // every event below is tagged with run_id = "wfv-1234"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("airq.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: walk-forward validation started.
pub fn emit_validation_started(run_id: &str, train_len: usize, test_len: usize, refit_every: usize) {
    info!(
        event = "validation.started",
        run_id = %run_id,
        train_len = train_len,
        test_len = test_len,
        refit_every = refit_every,
    );
}

/// Emit event: one walk-forward step recorded.
pub fn emit_validation_step(step: usize, history_len: usize, refit: bool, predicted: f64, actual: f64) {
    debug!(
        event = "validation.step",
        step = step,
        history_len = history_len,
        refit = refit,
        predicted = predicted,
        actual = actual,
    );
}

/// Emit event: a step's fit or forecast failed (warning level).
pub fn emit_fit_failed(step: usize, history_len: usize, error: &dyn std::fmt::Display) {
    warn!(event = "validation.fit_failed", step = step, history_len = history_len, error = %error);
}

/// Emit event: validation stopped by its cancel token (warning level).
pub fn emit_validation_cancelled(run_id: &str, completed: usize) {
    warn!(event = "validation.cancelled", run_id = %run_id, completed = completed);
}

/// Emit event: walk-forward validation finished.
pub fn emit_validation_finished(run_id: &str, steps: usize, fits: usize, skipped: usize, duration_ms: u64) {
    info!(
        event = "validation.finished",
        run_id = %run_id,
        steps = steps,
        fits = fits,
        skipped = skipped,
        duration_ms = duration_ms,
    );
}

/// Emit event: one-shot model trained.
pub fn emit_model_trained(model: &str, nobs: usize, aic: f64, duration_ms: u64) {
    info!(event = "model.trained", model = %model, nobs = nobs, aic = aic, duration_ms = duration_ms);
}

/// Emit event: artifact persisted.
pub fn emit_artifact_written(kind: &str, path: &Path) {
    info!(event = "artifact.written", kind = %kind, path = %path.display());
}

/// Emit event: accuracy metrics computed.
pub fn emit_metrics_computed(source: &str, n: usize, mse: f64, mae: f64) {
    info!(event = "metrics.computed", source = %source, n = n, mse = mse, mae = mae);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
        emit_validation_started("test-run-id", 4, 2, 1);
        emit_validation_finished("test-run-id", 2, 2, 0, 1);
    }
}
