use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stroop_core::{KeyMap, Result, StroopError};

/// Environment variable overriding the output directory
pub const OUTPUT_DIR_ENV: &str = "STROOP_OUTPUT_DIR";

/// Longest accepted duration for any timed setting: ten minutes
pub const MAX_DURATION_MS: u64 = 10 * 60 * 1000;

/// What happens when a response maps onto no palette colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidResponsePolicy {
    /// Record the trial as answered-invalid (incorrect) and move on
    #[default]
    RecordInvalid,
    /// Reject the token and keep waiting; the timeout keeps running
    Reprompt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub practice_trials: usize,
    pub experiment_trials: usize,
    /// Share of congruent trials in each block, 0.0..=1.0
    pub congruent_ratio: f64,
    pub fixation_range_ms: (u64, u64),
    pub response_timeout_ms: u64,
    pub feedback_duration_ms: u64,
    pub inter_trial_interval_ms: u64,
    /// Frames sampled before practice starts; 0 skips calibration
    pub calibration_frames: usize,
    pub invalid_response: InvalidResponsePolicy,
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
    pub keys: KeyMap,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            practice_trials: 8,
            experiment_trials: 40,
            congruent_ratio: 0.5,
            fixation_range_ms: (500, 1000),
            response_timeout_ms: 2000,
            feedback_duration_ms: 500,
            inter_trial_interval_ms: 500,
            calibration_frames: 120,
            invalid_response: InvalidResponsePolicy::default(),
            seed: None,
            output_dir: default_output_dir(),
            keys: KeyMap::default(),
        }
    }
}

/// `~/Documents/StroopData`, falling back to the home directory and then
/// the working directory when the platform has no documents folder.
pub fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("StroopData"))
        .unwrap_or_else(|| PathBuf::from("StroopData"))
}

impl ExperimentConfig {
    /// Loads a TOML file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StroopError::io(path, e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            StroopError::Configuration(msg) => {
                StroopError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StroopError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.experiment_trials == 0 {
            return Err(StroopError::Configuration(
                "experiment_trials must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.congruent_ratio) {
            return Err(StroopError::Configuration(format!(
                "congruent_ratio {} is outside 0.0..=1.0",
                self.congruent_ratio
            )));
        }
        if self.response_timeout_ms == 0 {
            return Err(StroopError::Configuration(
                "response_timeout_ms must be positive".into(),
            ));
        }
        let (lo, hi) = self.fixation_range_ms;
        if lo > hi {
            return Err(StroopError::Configuration(format!(
                "fixation_range_ms ({}, {}) is inverted",
                lo, hi
            )));
        }
        let durations = [
            ("response_timeout_ms", self.response_timeout_ms),
            ("feedback_duration_ms", self.feedback_duration_ms),
            ("inter_trial_interval_ms", self.inter_trial_interval_ms),
            ("fixation_range_ms", hi),
        ];
        if let Some((name, ms)) = durations.iter().find(|(_, ms)| *ms > MAX_DURATION_MS) {
            return Err(StroopError::Configuration(format!(
                "{} of {} ms exceeds the {} ms ceiling",
                name, ms, MAX_DURATION_MS
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(StroopError::Configuration(
                "output_dir must not be empty".into(),
            ));
        }
        if let Some(key) = self.keys.duplicate_key() {
            return Err(StroopError::Configuration(format!(
                "response key '{}' is bound to more than one colour",
                key
            )));
        }
        if let Some((key, color)) = self.keys.key_shadowing_name() {
            return Err(StroopError::Configuration(format!(
                "response key '{}' is also the name of {}",
                key, color
            )));
        }
        Ok(())
    }
}
