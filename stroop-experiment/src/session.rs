//! Session identity and the per-run context handed to the writer.

use crate::config::ExperimentConfig;
use crate::summary::SessionSummary;
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use stroop_core::{Result, StroopError};
use stroop_timing::CalibrationStats;
use tracing::info;
use uuid::Uuid;

pub const DATA_EXTENSION: &str = "csv";
pub const METADATA_EXTENSION: &str = "json";

/// `session_<YYYYMMDD>_<8 hex digits>`. The suffix carries 32 random bits,
/// so two ids minted on the same day collide with probability 2^-32.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self::generate_at(&Local::now())
    }

    /// Mints an id dated by `now`
    pub fn generate_at(now: &DateTime<Local>) -> Self {
        Self::from_parts(now.date_naive(), Uuid::new_v4())
    }

    fn from_parts(date: NaiveDate, uuid: Uuid) -> Self {
        let suffix = uuid.simple().to_string();
        Self(format!("session_{}_{}", date.format("%Y%m%d"), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Created once at startup and passed by reference; never mutated.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Local>,
    output_dir: PathBuf,
    output_path: PathBuf,
}

impl Session {
    /// Mints a fresh id and makes sure `output_dir` exists.
    pub fn start(output_dir: &Path) -> Result<Self> {
        Self::start_at(output_dir, Local::now())
    }

    /// The id's date stamp and `created_at` both come from `now`.
    fn start_at(output_dir: &Path, now: DateTime<Local>) -> Result<Self> {
        ensure_output_dir(output_dir)?;
        let id = SessionId::generate_at(&now);
        let output_path = output_dir.join(format!("{}.{}", id, DATA_EXTENSION));
        info!("Session {} writing to {}", id, output_path.display());
        Ok(Self {
            id,
            created_at: now,
            output_dir: output_dir.to_path_buf(),
            output_path,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Trial data file
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Sidecar file next to the trial data
    pub fn metadata_path(&self) -> PathBuf {
        self.output_path.with_extension(METADATA_EXTENSION)
    }
}

/// Creates the directory if absent. Succeeds when it already exists.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(StroopError::Configuration(
            "output directory path is empty".into(),
        ));
    }
    if dir.exists() && !dir.is_dir() {
        return Err(StroopError::Configuration(format!(
            "output path {} exists and is not a directory",
            dir.display()
        )));
    }
    fs::create_dir_all(dir).map_err(|e| StroopError::io(dir, e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Aborted,
}

/// Everything about a run that is not per-trial data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: SessionId,
    pub created_at: DateTime<Local>,
    pub status: SessionStatus,
    pub seed: u64,
    pub data_file: String,
    pub config: ExperimentConfig,
    pub calibration: Option<CalibrationStats>,
    pub practice: SessionSummary,
    pub summary: SessionSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn id_has_date_prefix_and_hex_suffix() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let uuid = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let id = SessionId::from_parts(date, uuid);
        assert_eq!(id.as_str(), "session_20250314_a1b2c3d4");
    }

    #[test]
    fn generated_ids_differ() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        let suffix = a.as_str().rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn id_date_matches_creation_time_at_midnight() {
        let tmp = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let session = Session::start_at(tmp.path(), now).unwrap();
        assert!(session.id().as_str().starts_with("session_20251231_"));
        assert_eq!(session.created_at(), now);
    }

    #[test]
    fn start_creates_missing_directory_idempotently() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("StroopData");
        let first = Session::start(&dir).unwrap();
        let second = Session::start(&dir).unwrap();
        assert!(dir.is_dir());
        assert_ne!(first.id(), second.id());
        assert_eq!(first.output_path().parent(), Some(dir.as_path()));
        assert_eq!(
            first.output_path().file_name().unwrap().to_string_lossy(),
            format!("{}.csv", first.id())
        );
        assert_eq!(first.metadata_path().extension().unwrap(), "json");
    }

    #[test]
    fn file_in_place_of_directory_is_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();
        let err = Session::start(&blocker).unwrap_err();
        assert!(matches!(err, StroopError::Configuration(_)));
    }
}
