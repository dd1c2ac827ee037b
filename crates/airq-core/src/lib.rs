//! AIRQ Core Library
//!
//! Walk-forward validation of SARIMA forecasts for a single air-quality
//! series, plus the one-shot trainer, evaluator and timestamped artifact
//! store around it.

pub mod artifact;
pub mod config;
pub mod domain;
pub mod evaluate;
pub mod fakes;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod reporting;
pub mod telemetry;
pub mod trainer;
pub mod walk_forward;

pub use domain::{
    ForecastError, History, ModelOrder, Observation, Result, SarimaConfig, SeasonalOrder,
    TimeSeries, TrainTestSplit,
};

pub use artifact::{
    load_latest, ArtifactEntry, ArtifactKind, ArtifactStamp, FsArtifactSink, Loaded,
    LoadedArtifact, ModelArtifactPaths,
};
pub use config::{AppConfig, PathsConfig, SeriesConfig, SplitConfig, SplitRule};
pub use evaluate::{evaluate, MetricPair};
pub use ingest::read_series_csv;
pub use model::{FittedModel, Forecaster, Sarima, SarimaModel};
pub use reporting::{render_metrics_md, render_metrics_text, write_forecast_csv, MetricsReport};
pub use trainer::{evaluate_baseline, train_once, HorizonSet, TrainedModel};
pub use walk_forward::{
    walk_forward_validate, CancelToken, FitFailurePolicy, PredictionRecord, ValidationOutcome,
    ValidationResult, WalkForwardOptions, WalkForwardValidator,
};

/// AIRQ version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
