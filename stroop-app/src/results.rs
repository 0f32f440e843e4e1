use rand::Rng;
use stroop_core::{KeyMap, PALETTE, Phase, Result};
use stroop_experiment::{
    ExperimentStateMachine, Session, SessionMetadata, SessionStatus, SessionSummary, SessionWriter,
};
use stroop_timing::Timer;

/// Writes the experiment records and the metadata sidecar. Called once, when
/// the session reaches debrief or is aborted.
pub fn save_results<P, T, R>(session: &Session, machine: &ExperimentStateMachine<P, T, R>) -> Result<()>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    let writer = SessionWriter::new();
    writer.flush(session, machine.experiment_records())?;

    let status = if machine.is_aborted() {
        SessionStatus::Aborted
    } else {
        SessionStatus::Completed
    };
    let data_file = session
        .output_path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = SessionMetadata {
        session_id: session.id().clone(),
        created_at: session.created_at(),
        status,
        seed: machine.seed(),
        data_file,
        config: machine.config.clone(),
        calibration: machine.calibration().cloned(),
        practice: machine.practice_summary(),
        summary: machine.summary(),
    };
    writer.write_metadata(session, &metadata)
}

pub fn welcome_lines(keys: &KeyMap) -> Vec<String> {
    let mapping = PALETTE
        .iter()
        .map(|c| format!("{} = {}", keys.key_for(*c).to_uppercase(), c.name().to_lowercase()))
        .collect::<Vec<_>>()
        .join("   ");
    vec![
        "STROOP TASK".to_string(),
        String::new(),
        "Name the INK COLOUR of each word.".to_string(),
        "Ignore what the word says.".to_string(),
        mapping,
        String::new(),
        "Press SPACE to begin".to_string(),
    ]
}

pub fn debrief_lines(summary: &SessionSummary) -> Vec<String> {
    let mut lines = vec![
        "Thank you!".to_string(),
        String::new(),
        format!("Accuracy: {:.1}%", summary.accuracy * 100.0),
    ];
    if let (Some(c), Some(i)) = (summary.mean_rt_congruent_ms, summary.mean_rt_incongruent_ms) {
        lines.push(format!("Congruent: {:.0} ms   Incongruent: {:.0} ms", c, i));
        lines.push(format!("Interference: {:.0} ms", i - c));
    }
    lines.push(String::new());
    lines.push("Press SPACE or ESC to exit".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use stroop_core::StandardPhase;
    use stroop_experiment::{ExperimentConfig, ExperimentEvent, read_rows};
    use stroop_timing::ManualTimer;

    type Machine = ExperimentStateMachine<StandardPhase, ManualTimer, StdRng>;

    #[test]
    fn welcome_lists_the_keys() {
        let lines = welcome_lines(&KeyMap::default());
        assert!(lines.contains(&"R = red   G = green   B = blue   Y = yellow".to_string()));
    }

    #[test]
    fn debrief_shows_interference_when_both_means_exist() {
        let summary = SessionSummary {
            accuracy: 0.9,
            mean_rt_congruent_ms: Some(600.0),
            mean_rt_incongruent_ms: Some(690.0),
            ..Default::default()
        };
        let lines = debrief_lines(&summary);
        assert!(lines.contains(&"Accuracy: 90.0%".to_string()));
        assert!(lines.contains(&"Interference: 90 ms".to_string()));

        let lines = debrief_lines(&SessionSummary::default());
        assert!(!lines.iter().any(|l| l.starts_with("Interference")));
    }

    #[test]
    fn aborted_session_is_saved_with_status() {
        let tmp = tempfile::tempdir().unwrap();
        let session = Session::start(tmp.path()).unwrap();
        let config = ExperimentConfig {
            practice_trials: 0,
            experiment_trials: 5,
            calibration_frames: 0,
            ..Default::default()
        };
        let timer = ManualTimer::new();
        let mut machine = Machine::new(config, 3, timer, StdRng::seed_from_u64(3));
        machine.handle_event(ExperimentEvent::SpacePressed);
        machine.abort();
        save_results(&session, &machine).unwrap();

        assert!(read_rows(session.output_path()).unwrap().is_empty());
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(session.metadata_path()).unwrap()).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["seed"], 3);
        assert_eq!(json["data_file"], format!("{}.csv", session.id()));
    }
}
