//! AIRQ - PM2.5 forecasting CLI
//!
//! The `airq` command trains SARIMA models on the combined air-quality
//! series and backtests them with walk-forward validation.
//!
//! ## Commands
//!
//! - `train`: Fit one model on the training split and persist it
//! - `validate`: Walk-forward validation over the test split
//! - `evaluate`: Metrics of the latest validation results
//! - `forecast`: Multi-step forecast from the latest model
//! - `status`: Latest model and validation results at a glance
//! - `pipeline`: train, score the static baseline, validate and evaluate

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use airq_core::metrics::METRICS;
use airq_core::reporting::write_metrics_json;
use airq_core::{
    evaluate_baseline, read_series_csv, render_metrics_md, render_metrics_text, train_once,
    write_forecast_csv,
    AppConfig, CancelToken, FitFailurePolicy, FsArtifactSink, Loaded, MetricsReport,
    ModelArtifactPaths, Sarima, TrainTestSplit, TrainedModel, ValidationResult,
    WalkForwardOptions, WalkForwardValidator,
};

const NO_MODEL_MESSAGE: &str = "No saved SARIMA model found. Please train the model first.";

#[derive(Parser)]
#[command(name = "airq")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "PM2.5 SARIMA forecasting with walk-forward validation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the TOML config file
    #[arg(long, global = true, env = "AIRQ_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a SARIMA model on the training split and save it
    Train,

    /// Run walk-forward validation over the test split and save the results
    Validate {
        /// Refit every K steps instead of every step
        #[arg(long)]
        refit_every: Option<usize>,

        /// Record failed steps as NaN and continue instead of aborting
        #[arg(long)]
        skip_failed: bool,
    },

    /// Print metrics of the latest walk-forward results
    Evaluate {
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Also write the metrics report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forecast future values from the latest saved model
    Forecast {
        /// Number of steps; must be one of the configured horizons
        #[arg(short, long)]
        steps: usize,

        /// Write the forecast as CSV to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the latest model and validation results
    Status,

    /// Train, validate and evaluate in one go
    Pipeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    airq_core::telemetry::init_tracing(cli.json, level);

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {:?}", cli.config))?;

    let result = match cli.command {
        Commands::Train => cmd_train(&config).map(|_| ()),
        Commands::Validate {
            refit_every,
            skip_failed,
        } => cmd_validate(&config, refit_every, skip_failed).await,
        Commands::Evaluate { format, output } => {
            cmd_evaluate(&config, format, output.as_deref())
        }
        Commands::Forecast { steps, output } => cmd_forecast(&config, steps, output.as_deref()),
        Commands::Status => cmd_status(&config),
        Commands::Pipeline => cmd_pipeline(&config).await,
    };

    METRICS.flush();
    result
}

fn load_split(config: &AppConfig) -> Result<TrainTestSplit> {
    let series = read_series_csv(&config.paths.combined_series, &config.series)
        .context("Failed to load combined series")?;
    let split = config
        .split_series(&series)
        .context("Failed to split series")?;
    info!(
        train = split.train.len(),
        test = split.test.len(),
        "series split"
    );
    Ok(split)
}

/// Latest model, or a hard stop telling the operator to train first.
fn load_model_or_stop(config: &AppConfig) -> Result<Loaded<TrainedModel>> {
    let sink = FsArtifactSink::new(&config.paths.model_dir)?;
    match sink.load_latest_model() {
        Ok(model) => Ok(model),
        Err(e) if e.is_not_found() => anyhow::bail!(NO_MODEL_MESSAGE),
        Err(e) => Err(e).context("Failed to load latest model"),
    }
}

/// Fit one model over the training split and persist it
fn cmd_train(config: &AppConfig) -> Result<ModelArtifactPaths> {
    let split = load_split(config)?;
    train_and_save(config, &split).map(|(_, paths)| paths)
}

fn train_and_save(
    config: &AppConfig,
    split: &TrainTestSplit,
) -> Result<(TrainedModel, ModelArtifactPaths)> {
    let trained = train_once(&split.train, &config.model).context("Training failed")?;

    let sink = FsArtifactSink::new(&config.paths.model_dir)?;
    let paths = sink
        .write_model(&trained)
        .context("Failed to save model artifact")?;

    println!("Trained {} on {} observations", config.model, trained.train_len);
    println!("  AIC: {:.3}", trained.model.aic());
    println!("  Model:   {:?}", paths.model);
    println!("  Summary: {:?}", paths.summary);
    Ok((trained, paths))
}

fn run_validation(config: &AppConfig, options: WalkForwardOptions) -> Result<ValidationResult> {
    let split = load_split(config)?;
    let forecaster = Sarima::new(config.model)?;
    let outcome = WalkForwardValidator::new(forecaster)
        .with_options(options)
        .run(&split.train, &split.test)?;
    info!(
        run_id = %outcome.run_id,
        fits = outcome.fits,
        "walk-forward validation complete"
    );
    Ok(outcome.result)
}

/// Walk-forward validation on a blocking worker; Ctrl-C cancels between steps
async fn cmd_validate(
    config: &AppConfig,
    refit_every: Option<usize>,
    skip_failed: bool,
) -> Result<()> {
    let mut options = config.walk_forward_options();
    if let Some(k) = refit_every {
        options = options.with_refit_every(k);
    }
    if skip_failed {
        options = options.with_failure_policy(FitFailurePolicy::SkipWithSentinel);
    }

    let token = CancelToken::new();
    options = options.with_cancel(token.clone());
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            token.cancel();
        }
    });

    let worker_config = config.clone();
    let outcome =
        tokio::task::spawn_blocking(move || run_validation(&worker_config, options)).await;
    listener.abort();
    let result = outcome
        .context("Validation worker panicked")?
        .context("Walk-forward validation failed")?;

    let sink = FsArtifactSink::new(&config.paths.results_dir)?;
    let path = sink
        .write_validation_result(&result)
        .context("Failed to save walk-forward results")?;

    println!("Walk-forward validation: {} steps", result.len());
    if result.skipped_count() > 0 {
        println!("  Skipped: {}", result.skipped_count());
    }
    let metrics = result.metrics()?;
    println!("  MSE: {:.4}", metrics.mse);
    println!("  MAE: {:.4}", metrics.mae);
    println!("  Results: {:?}", path);
    Ok(())
}

fn render_report(report: &MetricsReport, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Text => render_metrics_text(report),
        ReportFormat::Json => serde_json::to_string_pretty(report)? + "\n",
        ReportFormat::Markdown => render_metrics_md(report),
    })
}

/// Metrics of the latest results; a missing artifact is only a warning
fn cmd_evaluate(config: &AppConfig, format: ReportFormat, output: Option<&Path>) -> Result<()> {
    let sink = FsArtifactSink::new(&config.paths.results_dir)?;
    let loaded = match sink.load_latest_validation() {
        Ok(loaded) => loaded,
        Err(e) if e.is_not_found() => {
            warn!(dir = ?config.paths.results_dir, "no walk-forward results found");
            eprintln!("Warning: walk-forward validation results not found. Run `airq validate` first.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to load walk-forward results"),
    };

    let report = MetricsReport::from_result(&loaded.entry.file_name(), &loaded.value, Utc::now())?;
    print!("{}", render_report(&report, format)?);
    if let Some(path) = output {
        write_metrics_json(path, &report)
            .with_context(|| format!("Failed to write metrics report {:?}", path))?;
        println!("Wrote metrics report to {:?}", path);
    }
    Ok(())
}

/// Multi-step forecast from the latest model
fn cmd_forecast(config: &AppConfig, steps: usize, output: Option<&Path>) -> Result<()> {
    let steps = config.forecast.horizons.check(steps)?;
    let model = load_model_or_stop(config)?;
    let forecast = model
        .value
        .forecast_horizon(steps)
        .context("Forecast failed")?;

    if let Some(path) = output {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create forecast file {:?}", path))?;
        write_forecast_csv(file, &forecast)?;
        println!("Wrote {} forecast steps to {:?}", forecast.len(), path);
    } else {
        write_forecast_csv(std::io::stdout().lock(), &forecast)?;
    }
    Ok(())
}

/// Dashboard-style overview. No model is a hard stop; no results is a warning.
fn cmd_status(config: &AppConfig) -> Result<()> {
    let model = load_model_or_stop(config)?;
    println!("Model: {}", model.entry.file_name());
    println!("  Spec:       {}", model.value.config);
    println!("  Trained at: {}", model.value.trained_at.to_rfc3339());
    println!("  Train obs:  {}", model.value.train_len);
    println!("  AIC:        {:.3}", model.value.model.aic());

    let sink = FsArtifactSink::new(&config.paths.results_dir)?;
    match sink.load_latest_validation() {
        Ok(loaded) => {
            let report =
                MetricsReport::from_result(&loaded.entry.file_name(), &loaded.value, Utc::now())?;
            print!("{}", render_metrics_text(&report));
        }
        Err(e) if e.is_not_found() => {
            println!("Walk-forward validation results not found. Run `airq validate` to produce them.");
        }
        Err(e) => return Err(e).context("Failed to load walk-forward results"),
    }
    Ok(())
}

async fn cmd_pipeline(config: &AppConfig) -> Result<()> {
    let split = load_split(config)?;
    let (trained, _) = train_and_save(config, &split)?;

    let baseline =
        evaluate_baseline(&trained, &split.test).context("Baseline forecast failed")?;
    println!(
        "SARIMA forecast baseline ({} steps) -> MSE: {:.4}, MAE: {:.4}",
        split.test.len(),
        baseline.mse,
        baseline.mae
    );

    cmd_validate(config, None, false).await?;
    cmd_evaluate(config, ReportFormat::Text, None)
}
