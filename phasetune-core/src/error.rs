//! Error types for the pitch detection engine.
//!
//! Errors are only produced while building a detector or loading its
//! configuration. Per-frame processing never fails: degenerate frames come
//! back as an invalid [`PitchResult`](crate::PitchResult).

use std::fmt;

/// Errors that can occur while constructing or configuring the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TunerError {
    /// A constructor precondition was violated (e.g. non-power-of-two FFT size)
    InvalidInput(String),

    /// A configuration value is out of range or inconsistent
    InvalidConfig(String),

    /// Audio capture could not be set up
    Audio(String),

    /// Reading or writing a file failed
    Io(String),
}

impl fmt::Display for TunerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunerError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            TunerError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            TunerError::Audio(msg) => write!(f, "Audio error: {}", msg),
            TunerError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TunerError {}

impl From<std::io::Error> for TunerError {
    fn from(err: std::io::Error) -> Self {
        TunerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TunerError {
    fn from(err: serde_json::Error) -> Self {
        TunerError::Io(err.to_string())
    }
}
