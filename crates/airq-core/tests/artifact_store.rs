//! Artifact store tests: latest-selection, not-found handling and a full
//! ingest -> validate -> persist -> reload cycle.

use std::path::Path;

use airq_core::artifact::{self, ArtifactKind};
use airq_core::fakes::HistoricalMean;
use airq_core::{
    load_latest, read_series_csv, train_once, AppConfig, ArtifactStamp, FsArtifactSink,
    MetricsReport, WalkForwardValidator,
};
use chrono::Utc;

const RESULTS: &str = "_walk_forward_results.csv";

#[test]
fn load_latest_picks_greatest_stamp() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, body) in [
        ("2024-11-25T09-00-00_walk_forward_results.csv", "second"),
        ("2024-11-24T23-59-59_walk_forward_results.csv", "first"),
        ("2024-11-26T00-00-00_walk_forward_results.csv", "third"),
    ] {
        std::fs::write(dir.path().join(name), body).expect("write");
    }

    let loaded = load_latest(dir.path(), RESULTS).expect("latest");
    assert_eq!(loaded.entry.file_name(), "2024-11-26T00-00-00_walk_forward_results.csv");
    assert_eq!(loaded.bytes, b"third");
}

#[test]
fn load_latest_with_no_match_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("2024-11-26T00-00-00_sarima_model.json"), "{}").expect("write");

    let err = load_latest(dir.path(), RESULTS).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains(RESULTS));
}

#[test]
fn sink_latest_follows_write_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = FsArtifactSink::new(dir.path()).expect("sink");
    let series = airq_core::TimeSeries::regular(
        Utc::now(),
        chrono::Duration::hours(6),
        (0..40).map(|i| 20.0 + (i % 4) as f64).collect(),
    )
    .expect("series");
    let cfg = airq_core::SarimaConfig::new(
        airq_core::ModelOrder::new(1, 0, 0),
        airq_core::SeasonalOrder::none(),
    );
    let model = train_once(&series, &cfg).expect("train");

    for raw in ["2024-01-01T00-00-00", "2024-03-01T00-00-00", "2024-02-01T00-00-00"] {
        let stamp = ArtifactStamp::parse(raw).expect("stamp");
        sink.write_model_at(stamp, &model).expect("write");
    }

    let latest = sink.latest(ArtifactKind::SarimaModel).expect("latest");
    assert_eq!(latest.stamp.to_string(), "2024-03-01T00-00-00");
    assert_eq!(sink.list(ArtifactKind::SarimaSummary).expect("list").len(), 3);
    assert_eq!(
        artifact::latest(dir.path(), ArtifactKind::SarimaSummary.suffix())
            .expect("summary")
            .stamp,
        latest.stamp
    );
}

fn write_project(root: &Path) -> AppConfig {
    std::fs::create_dir_all(root.join("data")).expect("mkdir");
    let mut csv = String::from("date,pm25\n");
    for day in 1..=6 {
        for hour in [0, 6, 12, 18] {
            let value = 30.0 + day as f64 + hour as f64 / 6.0;
            csv.push_str(&format!("2024-11-{:02} {:02}:00:00,{}\n", day, hour, value));
        }
    }
    std::fs::write(root.join("data/pm25_6h.csv"), csv).expect("write csv");

    let config = r#"
[paths]
raw_data_dir = "data/raw"
combined_series = "data/pm25_6h.csv"
model_dir = "models"
results_dir = "results"

[split]
test_start = "2024-11-05"

[model]
order = [1, 0, 0]
"#;
    std::fs::write(root.join("config.toml"), config).expect("write config");
    AppConfig::load(root.join("config.toml")).expect("config")
}

#[test]
fn ingest_validate_persist_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = write_project(dir.path());

    let series = read_series_csv(&cfg.paths.combined_series, &cfg.series).expect("series");
    assert_eq!(series.len(), 24);
    let split = cfg.split_series(&series).expect("split");
    assert_eq!(split.train.len(), 16);
    assert_eq!(split.test.len(), 8);

    let result = WalkForwardValidator::new(HistoricalMean)
        .with_options(cfg.walk_forward_options())
        .validate(&split.train, &split.test)
        .expect("validate");

    let sink = FsArtifactSink::new(&cfg.paths.results_dir).expect("sink");
    let path = sink.write_validation_result(&result).expect("persist");
    assert!(path.starts_with(dir.path().join("results")));

    let loaded = sink.load_latest_validation().expect("reload");
    assert_eq!(loaded.value, result);

    let report = MetricsReport::from_result(&loaded.entry.file_name(), &loaded.value, Utc::now())
        .expect("report");
    let direct = result.metrics().expect("metrics");
    assert_eq!(report.mse, direct.mse);
    assert_eq!(report.mae, direct.mae);
    assert_eq!(report.records, 8);
}
