// phasetune-core/src/lib.rs

//! The core logic for the phasetune pitch detector.
//! This crate is responsible for audio capture, spectral analysis, pitch
//! detection, multi-note clustering and accordion reed analysis. It is
//! completely headless and contains no display code.

pub mod audio;
pub mod buffer;
pub mod cluster;
pub mod config;
pub mod detector;
pub mod error;
pub mod fft;
pub mod hold;
pub mod hps;
pub mod maxima;
pub mod reeds;
pub mod session_log;
pub mod tuning;
pub mod vocoder;

use serde::{Deserialize, Serialize};

pub use buffer::Sample;
pub use cluster::{DetectedNote, MultiNoteReport, NoteClusterer};
pub use config::{DetectorConfig, NoteFilter, TemperamentSetting};
pub use detector::{FrameReport, PitchDetector, SpectrumMarkers};
pub use error::TunerError;
pub use hold::NoteHold;
pub use maxima::Maximum;
pub use reeds::{Reed, ReedDetector, ReedReport};
pub use session_log::FrequencyLog;
pub use tuning::{Temperament, TemperamentTable, Tuning};

/// Represents the result of a single analysis frame.
///
/// When `valid` is false every other field is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PitchResult {
    pub valid: bool,
    /// The detected frequency in Hz.
    pub frequency: f64,
    /// The temperament-adjusted frequency of the nearest note in Hz.
    pub reference_frequency: f64,
    /// The deviation from the reference frequency in cents.
    pub cents: f64,
    /// Note number, C0 = 0.
    pub note: i32,
    pub octave: i32,
    /// Amplitude of the chosen peak relative to the loudest bin (0.0 to 1.0).
    pub confidence: f64,
}

impl PitchResult {
    /// Pitch class name of the detected note.
    pub fn note_name(&self) -> &'static str {
        tuning::note_name(self.note)
    }

    /// Note name with octave, shifted by `transpose` semitones for display.
    pub fn label(&self, transpose: i32) -> String {
        tuning::note_label(self.note, transpose)
    }
}
