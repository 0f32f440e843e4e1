//! Windowless session loop.
//!
//! Instead of rendering frames, the driver asks the input source to wait for
//! at most the time left until the machine's next deadline, then lets
//! `update` report whatever became due.

use crate::state::{ExperimentEvent, ExperimentStateMachine};
use rand::Rng;
use std::time::Duration;
use stroop_core::{Phase, ResponseRecord, ResponseToken, Trial};
use stroop_timing::Timer;
use tracing::{debug, info};

/// Shows stimuli to the participant
pub trait Presenter {
    fn present(&mut self, trial: &Trial);

    fn feedback(&mut self, _record: &ResponseRecord) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Response(ResponseToken),
    Abort,
}

pub trait InputSource {
    /// Waits up to `timeout` for the next input
    fn poll_input(&mut self, timeout: Duration) -> Option<InputEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted,
}

/// Runs the machine from wherever it stands until debrief or abort.
///
/// Welcome is acknowledged and calibration is skipped with whatever frames
/// the timer already holds, since nothing is drawn.
pub fn run_session<P, T, R, D, I>(
    machine: &mut ExperimentStateMachine<P, T, R>,
    display: &mut D,
    input: &mut I,
) -> RunOutcome
where
    P: Phase,
    T: Timer<Timestamp = u64>,
    R: Rng,
    D: Presenter + ?Sized,
    I: InputSource + ?Sized,
{
    loop {
        if machine.is_aborted() {
            return RunOutcome::Aborted;
        }
        if machine.phase.is_debrief() {
            return RunOutcome::Completed;
        }

        if machine.phase.is_welcome() {
            machine.handle_event(ExperimentEvent::SpacePressed);
            continue;
        }
        if machine.phase.requires_calibration() && !machine.is_calibrated() {
            machine.handle_event(ExperimentEvent::CalibrationComplete);
            continue;
        }

        let events = machine.update();
        if !events.is_empty() {
            for event in events {
                let onset = event == ExperimentEvent::StimulusOnset;
                machine.handle_event(event);
                if onset {
                    if let Some(trial) = machine.current_trial() {
                        display.present(trial);
                    }
                }
                if let Some(record) = machine.feedback() {
                    display.feedback(record);
                }
            }
            continue;
        }

        let budget = machine
            .time_until_next_transition()
            .unwrap_or(Duration::ZERO);
        match input.poll_input(budget) {
            Some(InputEvent::Abort) => {
                info!("Abort requested");
                machine.abort();
            }
            Some(InputEvent::Response(token)) => {
                if machine.handle_event(ExperimentEvent::ResponseReceived(token)) {
                    if let Some(record) = machine.feedback() {
                        display.feedback(record);
                    }
                }
            }
            None => debug!("No input within {:?}", budget),
        }
    }
}
