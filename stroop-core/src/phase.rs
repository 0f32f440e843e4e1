/// Defines experiment phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn allows_input(&self) -> bool;
    fn requires_calibration(&self) -> bool;
    fn next(&self) -> Option<Self>;

    fn is_practice(&self) -> bool {
        false
    }
    fn is_experiment(&self) -> bool {
        false
    }

    fn is_welcome(&self) -> bool {
        false
    }

    fn is_debrief(&self) -> bool {
        false
    }

    /// Whether trials run in this phase
    fn runs_trials(&self) -> bool {
        self.is_practice() || self.is_experiment()
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum StandardPhase {
    #[default]
    Welcome,
    Calibration,
    Practice,
    Experiment,
    Debrief,
}

impl Phase for StandardPhase {
    fn allows_input(&self) -> bool {
        !matches!(self, Self::Calibration)
    }
    fn requires_calibration(&self) -> bool {
        matches!(self, Self::Calibration)
    }
    fn next(&self) -> Option<Self> {
        use StandardPhase::*;
        Some(match self {
            Welcome => Calibration,
            Calibration => Practice,
            Practice => Experiment,
            Experiment => Debrief,
            Debrief => return None,
        })
    }

    fn is_practice(&self) -> bool {
        matches!(self, StandardPhase::Practice)
    }

    fn is_experiment(&self) -> bool {
        matches!(self, StandardPhase::Experiment)
    }

    fn is_welcome(&self) -> bool {
        matches!(self, StandardPhase::Welcome)
    }

    fn is_debrief(&self) -> bool {
        matches!(self, StandardPhase::Debrief)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_phases_run_in_order() {
        let mut phase = StandardPhase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(
            seen,
            vec![
                StandardPhase::Welcome,
                StandardPhase::Calibration,
                StandardPhase::Practice,
                StandardPhase::Experiment,
                StandardPhase::Debrief,
            ]
        );
    }

    #[test]
    fn only_practice_and_experiment_run_trials() {
        assert!(StandardPhase::Practice.runs_trials());
        assert!(StandardPhase::Experiment.runs_trials());
        assert!(!StandardPhase::Welcome.runs_trials());
        assert!(!StandardPhase::Calibration.allows_input());
        assert!(StandardPhase::Debrief.is_debrief());
    }
}
