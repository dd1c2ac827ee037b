//! Global atomic counters for AIRQ runs.
//!
//! Counters are bumped at the call site and emitted together by
//! [`Metrics::flush`], typically once at the end of a command.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters for the expensive parts of a run.
pub struct Metrics {
    fits_performed: AtomicU64,
    forecasts_made: AtomicU64,
    steps_skipped: AtomicU64,
    artifacts_written: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            fits_performed: AtomicU64::new(0),
            forecasts_made: AtomicU64::new(0),
            steps_skipped: AtomicU64::new(0),
            artifacts_written: AtomicU64::new(0),
        }
    }

    /// One model estimation finished (successfully or not).
    pub fn inc_fits(&self) {
        self.fits_performed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fits_performed", "counter incremented");
    }

    pub fn inc_forecasts(&self) {
        self.forecasts_made.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "forecasts_made", "counter incremented");
    }

    /// A walk-forward step was recorded as a sentinel instead of a prediction.
    pub fn inc_skipped(&self) {
        self.steps_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "steps_skipped", "counter incremented");
    }

    pub fn inc_artifacts(&self) {
        self.artifacts_written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "artifacts_written", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            fits_performed = self.fits_performed(),
            forecasts_made = self.forecasts_made(),
            steps_skipped = self.steps_skipped(),
            artifacts_written = self.artifacts_written(),
        );
    }

    pub fn fits_performed(&self) -> u64 {
        self.fits_performed.load(Ordering::Relaxed)
    }

    pub fn forecasts_made(&self) -> u64 {
        self.forecasts_made.load(Ordering::Relaxed)
    }

    pub fn steps_skipped(&self) -> u64 {
        self.steps_skipped.load(Ordering::Relaxed)
    }

    pub fn artifacts_written(&self) -> u64 {
        self.artifacts_written.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.fits_performed.store(0, Ordering::Relaxed);
        self.forecasts_made.store(0, Ordering::Relaxed);
        self.steps_skipped.store(0, Ordering::Relaxed);
        self.artifacts_written.store(0, Ordering::Relaxed);
    }
}
