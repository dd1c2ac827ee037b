//! Domain models for AIRQ.
//!
//! Canonical definitions for the core entities:
//! - `TimeSeries`: Dense fixed-cadence series
//! - `TrainTestSplit`: Contiguous train prefix + test suffix
//! - `History`: Expanding working copy owned by one validation run
//! - `SarimaConfig`: Model orders handed to the adapter

pub mod error;
pub mod model_spec;
pub mod series;

// Re-export main types and errors
pub use error::{ForecastError, Result};
pub use model_spec::{ModelOrder, SarimaConfig, SeasonalOrder};
pub use series::{History, Observation, TimeSeries, TrainTestSplit};
