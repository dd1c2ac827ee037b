//! Timestamped, append-only artifact storage.
//!
//! Every artifact file is named `<stamp><suffix>` where the stamp is
//! `YYYY-MM-DDTHH-MM-SS` in UTC. The stamp is fixed-width and zero-padded,
//! so sorting file names as text sorts them by time, and "latest" is simply
//! the greatest matching name.
//!
//! Files are never overwritten. [`fs::FsArtifactSink`] writes the typed
//! artifacts; the free functions here implement directory listing and
//! latest-selection over any suffix.

pub mod fs;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;

use crate::domain::{ForecastError, Result};

pub use fs::{FsArtifactSink, Loaded, ModelArtifactPaths};

/// Text form of an [`ArtifactStamp`].
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Second-resolution UTC timestamp used as an artifact file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactStamp(DateTime<Utc>);

impl ArtifactStamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Truncates to whole seconds.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Parse the stamp text, e.g. `2024-11-25T10-30-00`.
    pub fn parse(raw: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(raw, STAMP_FORMAT)
            .ok()
            .map(|naive| Self(naive.and_utc()))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for ArtifactStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

/// The artifact types this crate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    WalkForwardResults,
    SarimaModel,
    SarimaSummary,
}

impl ArtifactKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::WalkForwardResults => "_walk_forward_results.csv",
            ArtifactKind::SarimaModel => "_sarima_model.json",
            ArtifactKind::SarimaSummary => "_sarima_summary.txt",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::WalkForwardResults => "walk_forward_results",
            ArtifactKind::SarimaModel => "sarima_model",
            ArtifactKind::SarimaSummary => "sarima_summary",
        }
    }

    pub fn file_name(&self, stamp: ArtifactStamp) -> String {
        format!("{}{}", stamp, self.suffix())
    }
}

/// One artifact file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub stamp: ArtifactStamp,
    pub path: PathBuf,
}

impl ArtifactEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An artifact's location together with its raw contents.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub entry: ArtifactEntry,
    pub bytes: Vec<u8>,
}

fn stamp_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2})(?:\.\d+)?(.+)$")
            .expect("stamp regex is valid")
    })
}

/// Every file in `dir` named `<stamp><suffix>`, oldest first.
///
/// The position in the returned list is the artifact's version index. A
/// missing directory yields an empty list. Names without a valid stamp
/// prefix are ignored.
pub fn list(dir: &Path, suffix: &str) -> Result<Vec<ArtifactEntry>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ForecastError::Io(e)),
    };

    let mut entries: Vec<(String, ArtifactEntry)> = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(caps) = stamp_prefix().captures(&name) else {
            continue;
        };
        if &caps[2] != suffix {
            continue;
        }
        if let Some(stamp) = ArtifactStamp::parse(&caps[1]) {
            entries.push((
                name,
                ArtifactEntry {
                    stamp,
                    path: entry.path(),
                },
            ));
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries.into_iter().map(|(_, e)| e).collect())
}

/// The lexicographically greatest (and therefore newest) `<stamp><suffix>`
/// file in `dir`.
///
/// # Errors
///
/// `ForecastError::ArtifactNotFound` when no file matches.
pub fn latest(dir: &Path, suffix: &str) -> Result<ArtifactEntry> {
    list(dir, suffix)?
        .pop()
        .ok_or_else(|| ForecastError::ArtifactNotFound {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
        })
}

/// Read the newest `<stamp><suffix>` file in `dir`.
///
/// # Errors
///
/// `ForecastError::ArtifactNotFound` when no file matches; `Io` if the
/// selected file cannot be read.
pub fn load_latest(dir: &Path, suffix: &str) -> Result<LoadedArtifact> {
    let entry = latest(dir, suffix)?;
    let bytes = std::fs::read(&entry.path)?;
    tracing::debug!(path = %entry.path.display(), "loaded latest artifact");
    Ok(LoadedArtifact { entry, bytes })
}
