use crate::config::ExperimentConfig;
use crate::recorder::ResponseRecorder;
use crate::sequencer::TrialSequencer;
use crate::summary::SessionSummary;
use rand::Rng;
use std::time::Duration;
use stroop_core::{Phase, ResponseRecord, ResponseToken, StroopError, Trial, TrialState};
use stroop_timing::{CalibrationStats, Timer};
use tracing::{debug, info, warn};

/// Mixed into the session seed so practice and experiment orders differ
const PRACTICE_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    SpacePressed,
    CalibrationComplete,
    StimulusOnset,
    ResponseReceived(ResponseToken),
    Timeout,
    TrialComplete,
    PhaseComplete,
}

#[derive(Debug, Clone)]
struct TrialCycle {
    state: TrialState,
    entered_at: u64,
    fixation_ms: u64,
}

/// Sequencer and recorder for one run of trials
#[derive(Debug, Clone)]
struct Block {
    sequencer: TrialSequencer,
    recorder: ResponseRecorder,
}

impl Block {
    fn new(config: &ExperimentConfig, trials: usize, seed: u64) -> Self {
        Self {
            sequencer: TrialSequencer::new(trials, config.congruent_ratio, seed),
            recorder: ResponseRecorder::from_config(config),
        }
    }
}

/// Drives phases and the per-trial cycle. Nothing here blocks: `update`
/// compares the clock against the current deadline and reports what became
/// due, `handle_event` applies it.
pub struct ExperimentStateMachine<P, T, R>
where
    P: Phase,
    T: Timer,
    R: Rng,
{
    pub phase: P,
    pub timer: T,
    pub rng: R,
    pub config: ExperimentConfig,
    seed: u64,
    practice: Block,
    experiment: Block,
    cycle: Option<TrialCycle>,
    last_record: Option<ResponseRecord>,
    calibration: Option<CalibrationStats>,
    calibrated: bool,
    aborted: bool,
}

impl<P, T, R> ExperimentStateMachine<P, T, R>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub fn new(config: ExperimentConfig, seed: u64, timer: T, rng: R) -> Self {
        let practice = Block::new(&config, config.practice_trials, seed ^ PRACTICE_SEED_SALT);
        let experiment = Block::new(&config, config.experiment_trials, seed);
        Self {
            phase: P::default(),
            timer,
            rng,
            config,
            seed,
            practice,
            experiment,
            cycle: None,
            last_record: None,
            calibration: None,
            calibrated: false,
            aborted: false,
        }
    }

    pub fn advance_phase(&mut self) -> bool {
        let Some(next) = self.phase.next() else {
            return false;
        };
        info!("Phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.cycle = None;

        if next.runs_trials() {
            let total = self.active_block().sequencer.total();
            info!("Starting {} trials", total);
            if total > 0 {
                self.begin_cycle();
            }
        } else if next.is_debrief() {
            self.practice_summary().log("Practice");
            self.summary().log("Experiment");
        }
        true
    }

    pub fn apply_calibration(&mut self) {
        self.calibrated = true;
        if self.timer.frame_count() == 0 {
            info!("Calibration skipped");
            return;
        }
        let stats = self.timer.calibration_stats();
        info!(
            "Calibration: {:.3} ms/frame, {:.1} Hz, jitter {:.3} ms",
            stats.average_frame_time_ns / 1_000_000.0,
            stats.effective_fps,
            stats.jitter_ns / 1_000_000.0,
        );
        self.calibration = Some(stats);
    }

    pub fn update(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        if self.aborted {
            return events;
        }

        match self.phase {
            phase if phase.is_welcome() => {
                // Waiting for space press
            }
            phase if phase.requires_calibration() => {
                if !self.calibrated && self.timer.frame_count() >= self.config.calibration_frames {
                    events.push(ExperimentEvent::CalibrationComplete);
                }
            }
            phase if phase.runs_trials() => {
                self.update_trial(&mut events);
                if self.cycle.is_none() && self.active_block().sequencer.remaining() == 0 {
                    events.push(ExperimentEvent::PhaseComplete);
                }
            }
            _ => {}
        }

        events
    }

    pub fn handle_event(&mut self, event: ExperimentEvent) -> bool {
        if self.aborted {
            return false;
        }
        match (self.phase, event) {
            (phase, ExperimentEvent::SpacePressed) if phase.is_welcome() => self.advance_phase(),

            (phase, ExperimentEvent::CalibrationComplete) if phase.requires_calibration() => {
                self.apply_calibration();
                self.advance_phase()
            }

            (phase, ExperimentEvent::StimulusOnset) if phase.runs_trials() => self.present_next(),

            (phase, ExperimentEvent::ResponseReceived(token)) if phase.runs_trials() => {
                self.submit_response(&token)
            }

            (phase, ExperimentEvent::Timeout) if phase.runs_trials() => {
                let now = self.timer.now();
                let expired = self.active_block_mut().recorder.expire(now);
                match expired {
                    Some(record) => {
                        self.finish_trial(record, now);
                        true
                    }
                    None => false,
                }
            }

            (phase, ExperimentEvent::TrialComplete) if phase.runs_trials() => {
                self.cycle = None;
                if self.active_block().sequencer.remaining() > 0 {
                    self.begin_cycle();
                }
                true
            }

            (_, ExperimentEvent::PhaseComplete) => self.advance_phase(),

            _ => false,
        }
    }

    /// Stops the session where it stands. The trial on screen, if any, is
    /// dropped; everything recorded so far stays available for flushing.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.cycle = None;
        if self.phase.runs_trials() {
            if let Some(trial) = self.active_block_mut().recorder.discard_pending() {
                debug!("Discarded unanswered trial {}", trial.index());
            }
        }
        info!(
            "Session aborted in {:?} after {} experiment trials",
            self.phase,
            self.experiment.recorder.len()
        );
    }

    fn update_trial(&mut self, events: &mut Vec<ExperimentEvent>) {
        let now = self.timer.now();
        let feedback_ns = self.config.feedback_duration_ms.saturating_mul(1_000_000);
        let iti_ns = self.config.inter_trial_interval_ms.saturating_mul(1_000_000);
        let timed_out = self.active_block().recorder.is_timed_out(now);

        let Some(cycle) = &mut self.cycle else {
            return;
        };
        let in_state = now.saturating_sub(cycle.entered_at);
        match cycle.state {
            TrialState::Fixation => {
                if in_state >= cycle.fixation_ms.saturating_mul(1_000_000) {
                    events.push(ExperimentEvent::StimulusOnset);
                }
            }
            TrialState::Presented => {
                if timed_out {
                    events.push(ExperimentEvent::Timeout);
                }
            }
            TrialState::Feedback => {
                if in_state >= feedback_ns {
                    cycle.state = TrialState::Recorded;
                    cycle.entered_at = now;
                }
            }
            TrialState::Recorded => {
                if in_state >= iti_ns {
                    events.push(ExperimentEvent::TrialComplete);
                }
            }
        }
    }

    fn begin_cycle(&mut self) {
        let (lo, hi) = self.config.fixation_range_ms;
        let fixation_ms = self.rng.random_range(lo..=hi);
        let now = self.timer.now();
        self.cycle = Some(TrialCycle {
            state: TrialState::Fixation,
            entered_at: now,
            fixation_ms,
        });
        debug!("Fixation for {} ms from {} ns", fixation_ms, now);
    }

    fn present_next(&mut self) -> bool {
        if !matches!(&self.cycle, Some(c) if c.state == TrialState::Fixation) {
            return false;
        }
        let now = self.timer.now();
        let block = self.active_block_mut();
        let Some(trial) = block.sequencer.next_trial(now) else {
            self.cycle = None;
            return false;
        };
        debug!(
            "Trial {}: {} in {} at {} ns",
            trial.index(),
            trial.word_text(),
            trial.ink_color(),
            now
        );
        block.recorder.present(trial);
        if let Some(cycle) = &mut self.cycle {
            cycle.state = TrialState::Presented;
            cycle.entered_at = now;
        }
        true
    }

    fn submit_response(&mut self, token: &ResponseToken) -> bool {
        if self.current_trial_state() != Some(TrialState::Presented) {
            debug!("Ignoring response '{}' outside the response window", token);
            return false;
        }
        let now = self.timer.now();
        let submitted = self.active_block_mut().recorder.submit(token, now);
        match submitted {
            Ok(Some(record)) => {
                self.finish_trial(record, now);
                true
            }
            Ok(None) => false,
            Err(StroopError::Input(msg)) => {
                warn!("{}; waiting for another response", msg);
                false
            }
            Err(e) => {
                warn!("Unexpected error while recording response: {}", e);
                false
            }
        }
    }

    fn finish_trial(&mut self, record: ResponseRecord, now: u64) {
        info!(
            "Trial {} ({}): {:?}, RT {} ms, {}",
            record.trial.index(),
            if record.trial.congruent() { "congruent" } else { "incongruent" },
            record.outcome,
            record.reaction_time_ms,
            if record.correct { "correct" } else { "incorrect" },
        );
        let feedback = self.phase.is_practice() && self.config.feedback_duration_ms > 0;
        if let Some(cycle) = &mut self.cycle {
            cycle.state = if feedback {
                TrialState::Feedback
            } else {
                TrialState::Recorded
            };
            cycle.entered_at = now;
        }
        self.last_record = Some(record);
    }

    fn active_block(&self) -> &Block {
        if self.phase.is_practice() {
            &self.practice
        } else {
            &self.experiment
        }
    }

    fn active_block_mut(&mut self) -> &mut Block {
        if self.phase.is_practice() {
            &mut self.practice
        } else {
            &mut self.experiment
        }
    }

    /// Time until the next timed transition is due, `None` outside trials
    pub fn time_until_next_transition(&self) -> Option<Duration> {
        let cycle = self.cycle.as_ref()?;
        let now = self.timer.now();
        let due_ms = match cycle.state {
            TrialState::Fixation => cycle.fixation_ms,
            TrialState::Presented => {
                return self.active_block().recorder.time_remaining(now);
            }
            TrialState::Feedback => self.config.feedback_duration_ms,
            TrialState::Recorded => self.config.inter_trial_interval_ms,
        };
        let deadline = cycle.entered_at.saturating_add(due_ms.saturating_mul(1_000_000));
        Some(Duration::from_nanos(deadline.saturating_sub(now)))
    }

    /// Returns current phase
    pub fn current_phase(&self) -> &P {
        &self.phase
    }

    /// Trial on screen, only while the response window is open
    pub fn current_trial(&self) -> Option<&Trial> {
        if self.current_trial_state() == Some(TrialState::Presented) {
            self.active_block().recorder.pending()
        } else {
            None
        }
    }

    pub fn current_trial_state(&self) -> Option<TrialState> {
        self.cycle.as_ref().map(|c| c.state)
    }

    /// Outcome to show while the feedback screen is up
    pub fn feedback(&self) -> Option<&ResponseRecord> {
        if self.current_trial_state() == Some(TrialState::Feedback) {
            self.last_record.as_ref()
        } else {
            None
        }
    }

    /// (current, total) within the running block, 1-based
    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        if !self.phase.runs_trials() {
            return None;
        }
        let seq = &self.active_block().sequencer;
        let current = match self.current_trial_state() {
            Some(TrialState::Fixation) | None => seq.issued() + 1,
            _ => seq.issued(),
        };
        Some((current.min(seq.total()), seq.total()))
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn calibration(&self) -> Option<&CalibrationStats> {
        self.calibration.as_ref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Debrief reached or session aborted; records are final
    pub fn is_finished(&self) -> bool {
        self.aborted || self.phase.is_debrief()
    }

    /// Experiment-block records, the ones written to the data file
    pub fn experiment_records(&self) -> &[ResponseRecord] {
        self.experiment.recorder.records()
    }

    pub fn practice_records(&self) -> &[ResponseRecord] {
        self.practice.recorder.records()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_records(self.experiment_records())
    }

    pub fn practice_summary(&self) -> SessionSummary {
        SessionSummary::from_records(self.practice_records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use stroop_core::{ResponseOutcome, StandardPhase};
    use stroop_timing::ManualTimer;

    type Machine = ExperimentStateMachine<StandardPhase, ManualTimer, StdRng>;

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            practice_trials: 2,
            experiment_trials: 3,
            fixation_range_ms: (500, 500),
            response_timeout_ms: 2000,
            feedback_duration_ms: 300,
            inter_trial_interval_ms: 200,
            calibration_frames: 0,
            ..Default::default()
        }
    }

    fn machine(config: ExperimentConfig) -> (Machine, ManualTimer) {
        let timer = ManualTimer::new();
        let m = Machine::new(config, 99, timer.clone(), StdRng::seed_from_u64(1));
        (m, timer)
    }

    fn pump(m: &mut Machine) {
        for event in m.update() {
            m.handle_event(event);
        }
    }

    fn into_trials(m: &mut Machine) {
        assert!(m.handle_event(ExperimentEvent::SpacePressed));
        pump(m);
        assert_eq!(m.phase, StandardPhase::Practice);
    }

    #[test]
    fn welcome_waits_for_space() {
        let (mut m, timer) = machine(config());
        timer.advance_ms(10_000);
        assert!(m.update().is_empty());
        assert!(!m.handle_event(ExperimentEvent::Timeout));
        assert_eq!(m.phase, StandardPhase::Welcome);
    }

    #[test]
    fn calibration_waits_for_frames() {
        let (mut m, _timer) = machine(ExperimentConfig {
            calibration_frames: 3,
            ..config()
        });
        m.handle_event(ExperimentEvent::SpacePressed);
        assert_eq!(m.phase, StandardPhase::Calibration);
        assert!(m.update().is_empty());
        for _ in 0..3 {
            m.timer.record_frame(Duration::from_millis(16));
        }
        assert_eq!(m.update(), vec![ExperimentEvent::CalibrationComplete]);
        pump(&mut m);
        assert_eq!(m.phase, StandardPhase::Practice);
        assert!(m.calibration().is_some());
    }

    #[test]
    fn fixation_then_stimulus_then_response() {
        let (mut m, timer) = machine(config());
        into_trials(&mut m);
        assert_eq!(m.current_trial_state(), Some(TrialState::Fixation));
        assert!(m.current_trial().is_none());

        timer.advance_ms(499);
        assert!(m.update().is_empty());
        timer.advance_ms(1);
        assert_eq!(m.update(), vec![ExperimentEvent::StimulusOnset]);
        m.handle_event(ExperimentEvent::StimulusOnset);
        let ink = m.current_trial().expect("on screen").ink_color();

        timer.advance_ms(450);
        let key = m.config.keys.key_for(ink).to_string();
        assert!(m.handle_event(ExperimentEvent::ResponseReceived(key.as_str().into())));
        assert_eq!(m.current_trial_state(), Some(TrialState::Feedback));
        let fb = m.feedback().expect("feedback shown");
        assert!(fb.correct);
        assert_eq!(fb.reaction_time_ms, 450);
    }

    #[test]
    fn responses_outside_the_window_are_ignored() {
        let (mut m, _timer) = machine(config());
        into_trials(&mut m);
        assert!(!m.handle_event(ExperimentEvent::ResponseReceived("r".into())));
        assert!(m.practice_records().is_empty());
    }

    #[test]
    fn timeout_records_and_moves_on() {
        let (mut m, timer) = machine(config());
        into_trials(&mut m);
        timer.advance_ms(500);
        pump(&mut m);
        timer.advance_ms(2000);
        assert_eq!(m.update(), vec![ExperimentEvent::Timeout]);
        m.handle_event(ExperimentEvent::Timeout);
        let rec = &m.practice_records()[0];
        assert_eq!(rec.outcome, ResponseOutcome::TimedOut);
        assert_eq!(rec.reaction_time_ms, 2000);

        timer.advance_ms(300);
        pump(&mut m);
        assert_eq!(m.current_trial_state(), Some(TrialState::Recorded));
        timer.advance_ms(200);
        pump(&mut m);
        assert_eq!(m.current_trial_state(), Some(TrialState::Fixation));
        assert_eq!(m.trial_progress(), Some((2, 2)));
    }

    #[test]
    fn blocks_run_to_debrief() {
        let (mut m, timer) = machine(config());
        into_trials(&mut m);
        let mut guard = 0;
        while !m.phase.is_debrief() {
            timer.advance_ms(100);
            pump(&mut m);
            guard += 1;
            assert!(guard < 1000, "state machine stalled in {:?}", m.phase);
        }
        assert_eq!(m.practice_records().len(), 2);
        assert_eq!(m.experiment_records().len(), 3);
        assert!(m.is_finished());
        assert_eq!(m.summary().timeouts, 3);
        assert!(m.time_until_next_transition().is_none());
    }

    #[test]
    fn abort_discards_the_trial_on_screen() {
        let (mut m, timer) = machine(config());
        into_trials(&mut m);
        timer.advance_ms(500);
        pump(&mut m);
        assert!(m.current_trial().is_some());
        m.abort();
        assert!(m.is_aborted());
        assert!(m.practice_records().is_empty());
        timer.advance_ms(10_000);
        assert!(m.update().is_empty());
        assert!(!m.handle_event(ExperimentEvent::ResponseReceived("r".into())));
    }

    #[test]
    fn next_transition_tracks_the_cycle() {
        let (mut m, timer) = machine(config());
        assert!(m.time_until_next_transition().is_none());
        into_trials(&mut m);
        assert_eq!(m.time_until_next_transition(), Some(Duration::from_millis(500)));
        timer.advance_ms(500);
        pump(&mut m);
        timer.advance_ms(1500);
        assert_eq!(m.time_until_next_transition(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn oversized_durations_saturate() {
        let huge = 20_000_000_000_000;
        let (mut m, timer) = machine(ExperimentConfig {
            response_timeout_ms: huge,
            inter_trial_interval_ms: huge,
            ..config()
        });
        into_trials(&mut m);
        timer.advance_ms(500);
        pump(&mut m);
        let ink = m.current_trial().expect("on screen").ink_color();
        let year = Duration::from_secs(365 * 24 * 3600);
        assert!(m.time_until_next_transition().is_some_and(|d| d > year));

        let key = m.config.keys.key_for(ink).to_string();
        assert!(m.handle_event(ExperimentEvent::ResponseReceived(key.as_str().into())));
        timer.advance_ms(300);
        pump(&mut m);
        assert_eq!(m.current_trial_state(), Some(TrialState::Recorded));
        timer.advance_ms(60_000);
        assert!(m.update().is_empty());
        assert!(m.time_until_next_transition().is_some_and(|d| d > year));
    }
}
