use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Result, TimeSeries};
use crate::obs;
use crate::walk_forward::ValidationResult;

pub const METRICS_SCHEMA_VERSION: &str = "1.0";

/// Accuracy metrics of one walk-forward results artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    /// File name of the results artifact the metrics were computed from.
    pub source: String,
    pub records: usize,
    pub scored: usize,
    pub skipped: usize,
    pub mse: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl MetricsReport {
    /// Compute metrics over the non-skipped records of `result`.
    pub fn from_result(
        source: &str,
        result: &ValidationResult,
        generated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let metrics = result.metrics()?;
        let skipped = result.skipped_count();
        let scored = result.len() - skipped;
        obs::emit_metrics_computed(source, scored, metrics.mse, metrics.mae);
        Ok(Self {
            schema_version: METRICS_SCHEMA_VERSION.to_string(),
            generated_at,
            source: source.to_string(),
            records: result.len(),
            scored,
            skipped,
            mse: metrics.mse,
            mae: metrics.mae,
            rmse: metrics.rmse(),
        })
    }
}

/// Write the report in pretty JSON format.
pub fn write_metrics_json(path: &Path, report: &MetricsReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Plain text for terminal output.
pub fn render_metrics_text(report: &MetricsReport) -> String {
    let mut out = format!("Walk-forward results: {}\n", report.source);
    out.push_str(&format!("  Steps: {} ({} skipped)\n", report.records, report.skipped));
    out.push_str(&format!("  MSE:   {:.4}\n", report.mse));
    out.push_str(&format!("  MAE:   {:.4}\n", report.mae));
    out.push_str(&format!("  RMSE:  {:.4}\n", report.rmse));
    out
}

/// Render markdown summary for reports and PR comments.
pub fn render_metrics_md(report: &MetricsReport) -> String {
    let mut out = String::new();
    out.push_str("# Walk-Forward Validation\n\n");
    out.push_str(&format!(
        "- source: `{}`\n- records: {}\n- scored: {}\n- skipped: {}\n\n",
        report.source, report.records, report.scored, report.skipped
    ));
    out.push_str("| metric | value |\n|---|---|\n");
    out.push_str(&format!(
        "| MSE | {:.4} |\n| MAE | {:.4} |\n| RMSE | {:.4} |\n",
        report.mse, report.mae, report.rmse
    ));
    out
}

/// Write a forecast as `date,forecast` CSV.
pub fn write_forecast_csv<W: Write>(writer: W, forecast: &TimeSeries) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["date", "forecast"])?;
    for point in forecast.iter() {
        wtr.write_record([
            point.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            point.value.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
