//! Error type shared by the experiment crates.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StroopError>;

#[derive(Error, Debug)]
pub enum StroopError {
    /// Bad configuration value or unusable output path. Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Filesystem failure while writing session data. Fatal.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Response token that maps onto no palette colour. Recovered locally.
    #[error("Input error: {0}")]
    Input(String),
}

impl StroopError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StroopError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that end the session
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StroopError::Input(_))
    }
}
