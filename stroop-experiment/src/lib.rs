pub mod config;
pub mod driver;
pub mod recorder;
pub mod sequencer;
pub mod session;
pub mod state;
pub mod summary;
pub mod writer;

pub use config::{ExperimentConfig, InvalidResponsePolicy, MAX_DURATION_MS, OUTPUT_DIR_ENV};
pub use driver::{InputEvent, InputSource, Presenter, RunOutcome, run_session};
pub use recorder::ResponseRecorder;
pub use sequencer::TrialSequencer;
pub use session::{Session, SessionId, SessionMetadata, SessionStatus};
pub use state::{ExperimentEvent, ExperimentStateMachine};
pub use summary::SessionSummary;
pub use writer::{CSV_HEADER, CsvRow, SessionWriter, read_rows};
