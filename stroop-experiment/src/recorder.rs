use crate::config::{ExperimentConfig, InvalidResponsePolicy};
use std::time::Duration;
use stroop_core::{
    InkColor, KeyMap, ResponseOutcome, ResponseRecord, ResponseToken, Result, StroopError, Trial,
    TrialState,
};
use tracing::{debug, warn};

/// Times stimulus onset to response and keeps the ordered record list.
///
/// At most one trial is pending at a time. A pending trial leaves the
/// `Presented` state exactly once, through `submit`, `expire` or
/// `record_response`, and yields exactly one record.
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    timeout_ms: u64,
    policy: InvalidResponsePolicy,
    keys: KeyMap,
    pending: Option<Trial>,
    records: Vec<ResponseRecord>,
}

impl ResponseRecorder {
    pub fn new(timeout_ms: u64, policy: InvalidResponsePolicy, keys: KeyMap) -> Self {
        Self {
            timeout_ms,
            policy,
            keys,
            pending: None,
            records: Vec::new(),
        }
    }

    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self::new(
            config.response_timeout_ms,
            config.invalid_response,
            config.keys.clone(),
        )
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn state(&self) -> TrialState {
        if self.pending.is_some() {
            TrialState::Presented
        } else {
            TrialState::Recorded
        }
    }

    pub fn pending(&self) -> Option<&Trial> {
        self.pending.as_ref()
    }

    /// Starts the response window for `trial`. A trial still pending at this
    /// point is closed out as a timeout first.
    pub fn present(&mut self, trial: Trial) {
        if let Some(stale) = self.pending.take() {
            warn!(
                "Trial {} was still awaiting a response; recording it as a timeout",
                stale.index()
            );
            self.record_response(stale, None, self.timeout_ms);
        }
        self.pending = Some(trial);
    }

    /// Handles a response token for the pending trial.
    ///
    /// Returns `Ok(None)` when nothing is pending. Under the reprompt policy a
    /// token outside the palette is rejected with `StroopError::Input` and the
    /// trial stays pending.
    pub fn submit(&mut self, token: &ResponseToken, now: u64) -> Result<Option<ResponseRecord>> {
        let Some(elapsed_ms) = self.pending.as_ref().map(|trial| elapsed_ms(trial, now)) else {
            debug!("Response '{}' arrived with no trial pending", token);
            return Ok(None);
        };
        let color = self.keys.resolve(token);
        if color.is_none() && self.policy == InvalidResponsePolicy::Reprompt {
            return Err(StroopError::Input(format!(
                "'{}' does not map to a colour",
                token
            )));
        }

        let Some(trial) = self.pending.take() else {
            return Ok(None);
        };
        let record = match color {
            Some(color) => self.record_response(trial, Some(color), elapsed_ms),
            None => self.record_invalid(trial, elapsed_ms),
        };
        Ok(Some(record))
    }

    pub fn is_timed_out(&self, now: u64) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|trial| elapsed_ms(trial, now) >= self.timeout_ms)
    }

    /// Time left in the response window, `None` when nothing is pending
    pub fn time_remaining(&self, now: u64) -> Option<Duration> {
        self.pending.as_ref().map(|trial| {
            let deadline = trial
                .presented_at()
                .saturating_add(self.timeout_ms.saturating_mul(1_000_000));
            Duration::from_nanos(deadline.saturating_sub(now))
        })
    }

    /// Records the pending trial as a timeout once its window has elapsed
    pub fn expire(&mut self, now: u64) -> Option<ResponseRecord> {
        if !self.is_timed_out(now) {
            return None;
        }
        let trial = self.pending.take()?;
        Some(self.record_response(trial, None, self.timeout_ms))
    }

    /// Drops the pending trial without recording it
    pub fn discard_pending(&mut self) -> Option<Trial> {
        self.pending.take()
    }

    /// Classifies and appends one record.
    ///
    /// A missing response, or one at or past the timeout, is recorded as a
    /// timeout with `reaction_time_ms` equal to the timeout.
    pub fn record_response(
        &mut self,
        trial: Trial,
        response_color: Option<InkColor>,
        elapsed_ms: u64,
    ) -> ResponseRecord {
        let record = match response_color {
            Some(color) if elapsed_ms < self.timeout_ms => ResponseRecord {
                correct: color == trial.ink_color(),
                trial,
                response_color: Some(color),
                reaction_time_ms: elapsed_ms,
                outcome: ResponseOutcome::Answered,
            },
            _ => ResponseRecord {
                trial,
                response_color: None,
                reaction_time_ms: self.timeout_ms,
                correct: false,
                outcome: ResponseOutcome::TimedOut,
            },
        };
        self.records.push(record.clone());
        record
    }

    fn record_invalid(&mut self, trial: Trial, elapsed_ms: u64) -> ResponseRecord {
        if elapsed_ms >= self.timeout_ms {
            return self.record_response(trial, None, elapsed_ms);
        }
        let record = ResponseRecord {
            trial,
            response_color: None,
            reaction_time_ms: elapsed_ms,
            correct: false,
            outcome: ResponseOutcome::Invalid,
        };
        self.records.push(record.clone());
        record
    }

    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn elapsed_ms(trial: &Trial, now: u64) -> u64 {
    now.saturating_sub(trial.presented_at()) / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn recorder(policy: InvalidResponsePolicy) -> ResponseRecorder {
        ResponseRecorder::new(2000, policy, KeyMap::default())
    }

    #[test]
    fn incongruent_trial_answered_with_ink_is_correct() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        rec.present(Trial::new(0, InkColor::Red, InkColor::Green, 1_000 * MS));
        let record = rec
            .submit(&"g".into(), 1_500 * MS)
            .unwrap()
            .expect("recorded");
        assert!(record.correct);
        assert_eq!(record.response_color, Some(InkColor::Green));
        assert_eq!(record.reaction_time_ms, 500);
        assert_eq!(record.outcome, ResponseOutcome::Answered);
        assert_eq!(rec.state(), TrialState::Recorded);
    }

    #[test]
    fn reading_the_word_is_incorrect() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        rec.present(Trial::new(0, InkColor::Red, InkColor::Green, 0));
        let record = rec.submit(&"red".into(), 640 * MS).unwrap().unwrap();
        assert!(!record.correct);
        assert_eq!(record.reaction_time_ms, 640);
    }

    #[test]
    fn congruent_trial_without_response_times_out() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        rec.present(Trial::new(0, InkColor::Blue, InkColor::Blue, 0));
        assert!(rec.expire(1_999 * MS).is_none());
        assert_eq!(rec.state(), TrialState::Presented);
        let record = rec.expire(2_000 * MS).expect("timed out");
        assert_eq!(record.response_color, None);
        assert!(!record.correct);
        assert_eq!(record.reaction_time_ms, 2000);
        assert_eq!(record.outcome, ResponseOutcome::TimedOut);
    }

    #[test]
    fn late_response_counts_as_timeout() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        rec.present(Trial::new(0, InkColor::Blue, InkColor::Blue, 0));
        let record = rec.submit(&"b".into(), 2_600 * MS).unwrap().unwrap();
        assert_eq!(record.outcome, ResponseOutcome::TimedOut);
        assert_eq!(record.reaction_time_ms, 2000);
        assert!(!record.correct);
    }

    #[test]
    fn malformed_token_recorded_as_invalid() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        rec.present(Trial::new(0, InkColor::Yellow, InkColor::Red, 0));
        let record = rec.submit(&"q".into(), 300 * MS).unwrap().unwrap();
        assert_eq!(record.outcome, ResponseOutcome::Invalid);
        assert_eq!(record.response_color, None);
        assert_eq!(record.reaction_time_ms, 300);
        assert!(!record.correct);
    }

    #[test]
    fn malformed_token_reprompts_and_keeps_trial() {
        let mut rec = recorder(InvalidResponsePolicy::Reprompt);
        rec.present(Trial::new(0, InkColor::Yellow, InkColor::Red, 0));
        let err = rec.submit(&"q".into(), 300 * MS).unwrap_err();
        assert!(matches!(err, StroopError::Input(_)));
        assert_eq!(rec.state(), TrialState::Presented);
        assert!(rec.is_empty());

        let record = rec.submit(&"r".into(), 800 * MS).unwrap().unwrap();
        assert!(record.correct);
        assert_eq!(record.reaction_time_ms, 800);
    }

    #[test]
    fn each_trial_recorded_once() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        rec.present(Trial::new(0, InkColor::Red, InkColor::Red, 0));
        assert!(rec.submit(&"r".into(), 100 * MS).unwrap().is_some());
        assert!(rec.submit(&"r".into(), 200 * MS).unwrap().is_none());
        assert!(rec.expire(5_000 * MS).is_none());
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn presenting_over_a_pending_trial_closes_it_out() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        rec.present(Trial::new(0, InkColor::Red, InkColor::Blue, 0));
        rec.present(Trial::new(1, InkColor::Green, InkColor::Green, 10 * MS));
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.records()[0].outcome, ResponseOutcome::TimedOut);
        assert_eq!(rec.pending().map(|t| t.index()), Some(1));
    }

    #[test]
    fn remaining_window_shrinks() {
        let mut rec = recorder(InvalidResponsePolicy::RecordInvalid);
        assert!(rec.time_remaining(0).is_none());
        rec.present(Trial::new(0, InkColor::Red, InkColor::Blue, 100 * MS));
        assert_eq!(
            rec.time_remaining(600 * MS),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(rec.time_remaining(9_000 * MS), Some(Duration::ZERO));
    }

    #[test]
    fn huge_timeout_pins_the_deadline() {
        let mut rec = ResponseRecorder::new(u64::MAX / 2, InvalidResponsePolicy::RecordInvalid, KeyMap::default());
        rec.present(Trial::new(0, InkColor::Red, InkColor::Blue, 100 * MS));
        assert_eq!(
            rec.time_remaining(600 * MS),
            Some(Duration::from_nanos(u64::MAX - 600 * MS))
        );
        assert!(!rec.is_timed_out(u64::MAX));
    }
}
