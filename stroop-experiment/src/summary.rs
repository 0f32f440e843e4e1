use serde::{Deserialize, Serialize};
use stroop_core::{ResponseOutcome, ResponseRecord};
use tracing::info;

/// Aggregate performance over one block of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub trials: usize,
    pub answered: usize,
    pub correct: usize,
    pub timeouts: usize,
    pub invalid: usize,
    /// Correct over all trials, 0.0..=1.0
    pub accuracy: f64,
    /// Mean reaction time of correct congruent trials
    pub mean_rt_congruent_ms: Option<f64>,
    pub mean_rt_incongruent_ms: Option<f64>,
    /// Incongruent minus congruent mean; the Stroop interference effect
    pub interference_ms: Option<f64>,
}

impl SessionSummary {
    pub fn from_records(records: &[ResponseRecord]) -> Self {
        let count = |outcome: ResponseOutcome| records.iter().filter(|r| r.outcome == outcome).count();
        let correct = records.iter().filter(|r| r.correct).count();

        let mean_rt = |congruent: bool| {
            let times: Vec<f64> = records
                .iter()
                .filter(|r| r.correct && r.trial.congruent() == congruent)
                .map(|r| r.reaction_time_ms as f64)
                .collect();
            (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64)
        };
        let mean_rt_congruent_ms = mean_rt(true);
        let mean_rt_incongruent_ms = mean_rt(false);

        Self {
            trials: records.len(),
            answered: count(ResponseOutcome::Answered),
            correct,
            timeouts: count(ResponseOutcome::TimedOut),
            invalid: count(ResponseOutcome::Invalid),
            accuracy: if records.is_empty() {
                0.0
            } else {
                correct as f64 / records.len() as f64
            },
            mean_rt_congruent_ms,
            mean_rt_incongruent_ms,
            interference_ms: mean_rt_congruent_ms
                .zip(mean_rt_incongruent_ms)
                .map(|(c, i)| i - c),
        }
    }

    pub fn log(&self, label: &str) {
        info!(
            "{} results: {} trials, {} answered, {} timeouts, {} invalid, accuracy {:.1}%",
            label,
            self.trials,
            self.answered,
            self.timeouts,
            self.invalid,
            self.accuracy * 100.0
        );
        if let (Some(c), Some(i)) = (self.mean_rt_congruent_ms, self.mean_rt_incongruent_ms) {
            info!(
                "{} reaction times: congruent {:.1} ms, incongruent {:.1} ms, interference {:.1} ms",
                label,
                c,
                i,
                i - c
            );
        }
    }
}
