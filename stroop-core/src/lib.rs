pub mod color;
pub mod error;
pub mod phase;
pub mod trial;

pub use color::{InkColor, KeyMap, PALETTE, ResponseToken};
pub use error::{Result, StroopError};
pub use phase::{Phase, StandardPhase};
pub use trial::{ResponseOutcome, ResponseRecord, Trial, TrialState};
