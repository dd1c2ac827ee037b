//! Fixed-cadence time series, train/test splits and the per-run history.
//!
//! A [`TimeSeries`] is dense: timestamps advance by exactly one `cadence`
//! per observation. Gap filling happens upstream; construction rejects
//! anything that is not already regular.

use chrono::{DateTime, Duration, Utc};

use crate::domain::error::{ForecastError, Result};

/// A single `(timestamp, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered, gap-free numeric series sampled at a fixed cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    cadence: Duration,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Build a series from observations, validating the cadence invariant.
    ///
    /// # Errors
    ///
    /// `ForecastError::Data` when `cadence` is not positive, a value is not
    /// finite, or two consecutive timestamps are not exactly `cadence` apart
    /// (which also covers duplicates and out-of-order rows).
    pub fn new(cadence: Duration, observations: Vec<Observation>) -> Result<Self> {
        if cadence <= Duration::zero() {
            return Err(ForecastError::data(format!(
                "cadence must be positive, got {}s",
                cadence.num_seconds()
            )));
        }

        let mut timestamps: Vec<DateTime<Utc>> = Vec::with_capacity(observations.len());
        let mut values = Vec::with_capacity(observations.len());

        for (i, obs) in observations.into_iter().enumerate() {
            if !obs.value.is_finite() {
                return Err(ForecastError::data(format!(
                    "non-finite value {} at {}",
                    obs.value, obs.timestamp
                )));
            }
            if let Some(prev) = timestamps.last() {
                let step = obs.timestamp - *prev;
                if step <= Duration::zero() {
                    return Err(ForecastError::data(format!(
                        "timestamps not strictly increasing at row {}: {} after {}",
                        i, obs.timestamp, prev
                    )));
                }
                if step != cadence {
                    return Err(ForecastError::data(format!(
                        "gap or irregular step at row {}: {} after {} (expected {}s, got {}s)",
                        i,
                        obs.timestamp,
                        prev,
                        cadence.num_seconds(),
                        step.num_seconds()
                    )));
                }
            }
            timestamps.push(obs.timestamp);
            values.push(obs.value);
        }

        Ok(Self {
            cadence,
            timestamps,
            values,
        })
    }

    /// Build a series of `values` starting at `start`, one per `cadence`.
    pub fn regular(start: DateTime<Utc>, cadence: Duration, values: Vec<f64>) -> Result<Self> {
        let observations = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start + cadence * i as i32, v))
            .collect();
        Self::new(cadence, observations)
    }

    /// An empty series with the given cadence.
    pub fn empty(cadence: Duration) -> Self {
        Self {
            cadence,
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// The timestamp one cadence step after the last observation.
    pub fn next_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp().map(|ts| ts + self.cadence)
    }

    /// Iterate observations in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = Observation> + '_ {
        self.timestamps
            .iter()
            .zip(self.values.iter())
            .map(|(ts, v)| Observation::new(*ts, *v))
    }

    /// Value observed at `ts`, if `ts` lies on the series grid.
    ///
    /// Grid membership is checked at nanosecond resolution, so sub-second
    /// cadences and sub-second offsets are handled exactly.
    pub fn value_at(&self, ts: DateTime<Utc>) -> Option<f64> {
        let start = self.first_timestamp()?;
        let offset = (ts - start).num_nanoseconds()?;
        let step = self.cadence.num_nanoseconds()?;
        if step <= 0 || offset < 0 || offset % step != 0 {
            return None;
        }
        let idx = usize::try_from(offset / step).ok()?;
        self.values.get(idx).copied()
    }

    /// True when `self` starts exactly one cadence step after `earlier` ends.
    pub fn follows(&self, earlier: &TimeSeries) -> bool {
        match (earlier.next_timestamp(), self.first_timestamp()) {
            (Some(expected), Some(first)) => self.cadence == earlier.cadence && first == expected,
            _ => false,
        }
    }

    fn slice(&self, start: usize, end: usize) -> TimeSeries {
        TimeSeries {
            cadence: self.cadence,
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
        }
    }

    /// Partition into `train = [..index)` and `test = [index..)`.
    ///
    /// # Errors
    ///
    /// `ForecastError::Data` unless both parts are non-empty.
    pub fn split_at(&self, index: usize) -> Result<TrainTestSplit> {
        if index == 0 || index >= self.len() {
            return Err(ForecastError::data(format!(
                "split index {} leaves an empty segment (series length {})",
                index,
                self.len()
            )));
        }
        TrainTestSplit::new(self.slice(0, index), self.slice(index, self.len()))
    }

    /// Split so that `test` starts at the first timestamp `>= test_start`.
    pub fn split_at_time(&self, test_start: DateTime<Utc>) -> Result<TrainTestSplit> {
        let index = self.timestamps.partition_point(|ts| *ts < test_start);
        self.split_at(index)
    }

    /// Split so that the first `floor(len * train_fraction)` observations train.
    pub fn split_by_fraction(&self, train_fraction: f64) -> Result<TrainTestSplit> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(ForecastError::data(format!(
                "train fraction must lie in (0, 1), got {}",
                train_fraction
            )));
        }
        let index = (self.len() as f64 * train_fraction).floor() as usize;
        self.split_at(index)
    }
}

/// A series partitioned into a training prefix and a test suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: TimeSeries,
    pub test: TimeSeries,
}

impl TrainTestSplit {
    /// Pair two series after checking they are non-empty and contiguous.
    pub fn new(train: TimeSeries, test: TimeSeries) -> Result<Self> {
        if train.is_empty() {
            return Err(ForecastError::data("train series is empty"));
        }
        if test.is_empty() {
            return Err(ForecastError::data("test series is empty"));
        }
        if !test.follows(&train) {
            return Err(ForecastError::data(format!(
                "test series must start one cadence step after train ends (train ends {:?}, test starts {:?})",
                train.last_timestamp(),
                test.first_timestamp()
            )));
        }
        Ok(Self { train, test })
    }
}

/// Expanding working copy of the training values for one validation run.
///
/// Grows by exactly one observation per step and never shrinks.
#[derive(Debug, Clone)]
pub struct History {
    values: Vec<f64>,
}

impl History {
    pub fn from_series(series: &TimeSeries) -> Self {
        Self {
            values: series.values().to_vec(),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
