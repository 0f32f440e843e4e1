pub mod timer;

pub use timer::{CalibrationStats, FrameSampler, HighPrecisionTimer, ManualTimer, Timer};
