use crate::color::InkColor;
use serde::{Deserialize, Serialize};

/// Per-trial cycle. A trial is recorded exactly once, on leaving `Presented`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Fixation,
    Presented,
    Feedback,
    Recorded,
}

/// One word/ink pairing as shown to the participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TrialFields")]
pub struct Trial {
    index: usize,
    word: InkColor,
    ink_color: InkColor,
    congruent: bool,
    presented_at: u64,
}

impl Trial {
    /// `presented_at` is the stimulus onset in nanoseconds on the experiment clock
    pub fn new(index: usize, word: InkColor, ink_color: InkColor, presented_at: u64) -> Self {
        Self {
            index,
            word,
            ink_color,
            congruent: word == ink_color,
            presented_at,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn word(&self) -> InkColor {
        self.word
    }

    /// Text drawn on screen
    pub fn word_text(&self) -> &'static str {
        self.word.name()
    }

    pub fn ink_color(&self) -> InkColor {
        self.ink_color
    }

    pub fn congruent(&self) -> bool {
        self.congruent
    }

    pub fn presented_at(&self) -> u64 {
        self.presented_at
    }
}

/// Serialized form of a `Trial`. `congruent` is recomputed on the way in.
#[derive(Deserialize)]
struct TrialFields {
    index: usize,
    word: InkColor,
    ink_color: InkColor,
    presented_at: u64,
}

impl From<TrialFields> for Trial {
    fn from(f: TrialFields) -> Self {
        Trial::new(f.index, f.word, f.ink_color, f.presented_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Answered,
    TimedOut,
    Invalid,
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub trial: Trial,
    pub response_color: Option<InkColor>,
    pub reaction_time_ms: u64,
    pub correct: bool,
    pub outcome: ResponseOutcome,
}
