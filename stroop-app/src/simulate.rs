//! Windowless dry run against a simulated participant.

use crate::results::save_results;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};
use stroop_core::{KeyMap, PALETTE, ResponseToken, StandardPhase, Trial};
use stroop_experiment::{
    ExperimentConfig, ExperimentStateMachine, InputEvent, InputSource, Presenter, RunOutcome,
    Session, run_session,
};
use stroop_timing::HighPrecisionTimer;
use tracing::{debug, info};

/// Extra reaction time on incongruent trials
const INTERFERENCE_MS: u64 = 80;

struct LogPresenter {
    shown: Sender<Trial>,
}

impl Presenter for LogPresenter {
    fn present(&mut self, trial: &Trial) {
        debug!("Showing {} in {}", trial.word_text(), trial.ink_color());
        let _ = self.shown.send(trial.clone());
    }
}

/// Answers each trial after a random delay, naming the ink most of the time.
pub struct SimulatedParticipant<R: Rng> {
    rng: R,
    keys: KeyMap,
    error_rate: f64,
    shown: Receiver<Trial>,
    due: Option<(Instant, ResponseToken)>,
}

impl<R: Rng> SimulatedParticipant<R> {
    fn new(rng: R, keys: KeyMap, error_rate: f64, shown: Receiver<Trial>) -> Self {
        Self {
            rng,
            keys,
            error_rate,
            shown,
            due: None,
        }
    }

    fn plan(&mut self, trial: &Trial) -> (Duration, ResponseToken) {
        let mut rt = self.rng.random_range(380..=900);
        if !trial.congruent() {
            rt += INTERFERENCE_MS;
        }
        let color = if self.rng.random_bool(self.error_rate) {
            let wrong: Vec<_> = PALETTE
                .iter()
                .copied()
                .filter(|c| *c != trial.ink_color())
                .collect();
            wrong[self.rng.random_range(0..wrong.len())]
        } else {
            trial.ink_color()
        };
        (
            Duration::from_millis(rt),
            ResponseToken::from(self.keys.key_for(color)),
        )
    }
}

impl<R: Rng> InputSource for SimulatedParticipant<R> {
    fn poll_input(&mut self, timeout: Duration) -> Option<InputEvent> {
        if let Ok(trial) = self.shown.try_recv() {
            let (rt, token) = self.plan(&trial);
            self.due = Some((Instant::now() + rt, token));
        }

        let now = Instant::now();
        match self.due.take() {
            Some((at, token)) if at <= now + timeout => {
                std::thread::sleep(at.saturating_duration_since(now));
                Some(InputEvent::Response(token))
            }
            pending => {
                self.due = pending;
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

pub fn run(config: ExperimentConfig, seed: u64, session: &Session, error_rate: f64) -> Result<()> {
    let (tx, rx) = channel();
    let participant_rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut participant = SimulatedParticipant::new(participant_rng, config.keys.clone(), error_rate, rx);
    let mut presenter = LogPresenter { shown: tx };

    let mut machine: ExperimentStateMachine<StandardPhase, _, _> = ExperimentStateMachine::new(
        config,
        seed,
        HighPrecisionTimer::new(),
        StdRng::seed_from_u64(seed),
    );
    info!("Simulating participant with error rate {:.2}", error_rate);
    let outcome = run_session(&mut machine, &mut presenter, &mut participant);
    if outcome == RunOutcome::Aborted {
        info!("Simulated session aborted");
    }
    save_results(session, &machine).context("saving session results")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stroop_core::InkColor;

    fn participant(error_rate: f64) -> SimulatedParticipant<StdRng> {
        let (_tx, rx) = channel();
        SimulatedParticipant::new(StdRng::seed_from_u64(9), KeyMap::default(), error_rate, rx)
    }

    #[test]
    fn accurate_participant_names_the_ink() {
        let mut p = participant(0.0);
        let trial = Trial::new(0, InkColor::Red, InkColor::Blue, 0);
        for _ in 0..20 {
            let (rt, token) = p.plan(&trial);
            assert_eq!(token.as_str(), "b");
            assert!(rt >= Duration::from_millis(380 + INTERFERENCE_MS));
        }
    }

    #[test]
    fn careless_participant_never_names_the_ink() {
        let mut p = participant(1.0);
        let trial = Trial::new(0, InkColor::Green, InkColor::Green, 0);
        for _ in 0..20 {
            let (rt, token) = p.plan(&trial);
            assert_ne!(token.as_str(), "g");
            assert!(rt <= Duration::from_millis(900));
        }
    }

    #[test]
    fn scheduled_answer_arrives_within_the_window() {
        let (tx, rx) = channel();
        let mut p = SimulatedParticipant::new(StdRng::seed_from_u64(1), KeyMap::default(), 0.0, rx);
        tx.send(Trial::new(0, InkColor::Yellow, InkColor::Yellow, 0)).unwrap();
        match p.poll_input(Duration::from_millis(1000)) {
            Some(InputEvent::Response(token)) => assert_eq!(token.as_str(), "y"),
            other => panic!("expected a response, got {:?}", other),
        }
        assert!(p.poll_input(Duration::from_millis(1)).is_none());
    }
}
