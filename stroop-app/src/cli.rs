use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use stroop_experiment::{ExperimentConfig, InvalidResponsePolicy, OUTPUT_DIR_ENV};

#[derive(Parser, Debug)]
#[command(name = "stroop", version, about = "Stroop colour-word task", long_about = None)]
pub struct Cli {
    /// TOML file with experiment settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for session data files
    #[arg(short, long, env = OUTPUT_DIR_ENV)]
    pub output_dir: Option<PathBuf>,

    /// Number of experiment trials
    #[arg(long)]
    pub trials: Option<usize>,

    /// Number of practice trials
    #[arg(long)]
    pub practice: Option<usize>,

    /// Share of congruent trials, 0.0 to 1.0
    #[arg(long)]
    pub congruent_ratio: Option<f64>,

    /// Response window in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Seed for trial order; drawn at random when absent
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep waiting after an unmapped key instead of recording it
    #[arg(long)]
    pub reprompt: bool,

    /// TrueType font for on-screen text
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Run without a window against a simulated participant
    #[arg(long)]
    pub simulate: bool,

    /// Share of wrong answers given by the simulated participant
    #[arg(long, default_value_t = 0.1)]
    pub error_rate: f64,
}

impl Cli {
    /// Defaults, then the TOML file, then the environment, then flags.
    pub fn build_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => ExperimentConfig::default(),
        };

        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(n) = self.trials {
            config.experiment_trials = n;
        }
        if let Some(n) = self.practice {
            config.practice_trials = n;
        }
        if let Some(ratio) = self.congruent_ratio {
            config.congruent_ratio = ratio;
        }
        if let Some(ms) = self.timeout_ms {
            config.response_timeout_ms = ms;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.reprompt {
            config.invalid_response = InvalidResponsePolicy::Reprompt;
        }
        if !(0.0..=1.0).contains(&self.error_rate) {
            bail!("--error-rate {} is outside 0.0..=1.0", self.error_rate);
        }

        config.validate().context("invalid experiment settings")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stroop").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&["--trials", "12", "--practice", "0", "--seed", "5", "--reprompt"])
            .build_config()
            .unwrap();
        assert_eq!(config.experiment_trials, 12);
        assert_eq!(config.practice_trials, 0);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.invalid_response, InvalidResponsePolicy::Reprompt);
        assert_eq!(config.response_timeout_ms, 2000);
    }

    #[test]
    fn flags_override_the_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "experiment_trials = 60\nresponse_timeout_ms = 1500").unwrap();
        let path = file.path().to_str().unwrap();

        let config = parse(&["--config", path]).build_config().unwrap();
        assert_eq!(config.experiment_trials, 60);
        assert_eq!(config.response_timeout_ms, 1500);

        let config = parse(&["--config", path, "--trials", "10"]).build_config().unwrap();
        assert_eq!(config.experiment_trials, 10);
        assert_eq!(config.response_timeout_ms, 1500);
    }

    #[test]
    fn output_dir_flag_is_applied() {
        let config = parse(&["--output-dir", "/tmp/stroop-out"]).build_config().unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/stroop-out"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(parse(&["--trials", "0"]).build_config().is_err());
        assert!(parse(&["--congruent-ratio", "1.5"]).build_config().is_err());
        assert!(parse(&["--error-rate", "2"]).build_config().is_err());
        assert!(parse(&["--timeout-ms", "20000000000000"]).build_config().is_err());
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let err = parse(&["--config", "/nonexistent/stroop.toml"])
            .build_config()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/stroop.toml"));
    }
}
