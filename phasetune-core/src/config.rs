//! Configuration parameters for the pitch detector

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::TunerError;
use crate::maxima::MIN_AMPLITUDE;
use crate::tuning::{A4_REFERENCE, Temperament, TemperamentTable, Tuning};

/// Lowest accepted reference pitch in Hz.
pub const MIN_REFERENCE: f64 = 380.0;
/// Highest accepted reference pitch in Hz.
pub const MAX_REFERENCE: f64 = 500.0;

/// Which temperament the detector tunes against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperamentSetting {
    BuiltIn(Temperament),
    Custom(TemperamentTable),
}

impl TemperamentSetting {
    pub fn table(&self) -> TemperamentTable {
        match self {
            TemperamentSetting::BuiltIn(t) => t.table().clone(),
            TemperamentSetting::Custom(table) => table.clone(),
        }
    }
}

impl Default for TemperamentSetting {
    fn default() -> Self {
        TemperamentSetting::BuiltIn(Temperament::Equal)
    }
}

/// Pitch classes and octaves the note filter lets through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFilter {
    /// Enabled pitch classes, C first
    pub notes: [bool; 12],
    /// Enabled octaves 0-8; notes in higher octaves are always rejected
    pub octaves: [bool; 9],
}

impl NoteFilter {
    /// Whether `note` (C0 = 0) passes the filter.
    pub fn allows(&self, note: i32) -> bool {
        if note < 0 {
            return false;
        }
        let n = (note % 12) as usize;
        let o = (note / 12) as usize;
        o < self.octaves.len() && self.notes[n] && self.octaves[o]
    }
}

impl Default for NoteFilter {
    fn default() -> Self {
        Self {
            notes: [true; 12],
            octaves: [true; 9],
        }
    }
}

/// Detector configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Capture sample rate in Hz (default: 11025)
    pub sample_rate: u32,

    /// FFT length, a power of two (default: 16384)
    pub fft_size: usize,

    /// Frames per FFT length; the hop is `fft_size / oversample` (default: 16)
    pub oversample: usize,

    /// Maximum number of peaks reported per frame (default: 8)
    pub max_peaks: usize,

    /// Pitch of A4 in Hz (default: 440.0)
    pub reference: f64,

    pub temperament: TemperamentSetting,

    /// Tonic of the temperament, 0 = C (default: 0)
    pub key: usize,

    /// One-pole pre-filter, ~3 dB/octave rolloff (default: false)
    pub pre_filter: bool,

    /// Harmonic product spectrum (default: false)
    pub hps: bool,

    /// Only keep peaks in the first peak's pitch class (default: false)
    pub fundamental_filter: bool,

    /// Apply `filters` to candidate notes (default: false)
    pub note_filter: bool,

    pub filters: NoteFilter,

    /// Stop the peak search an octave above each accepted peak; ignored
    /// while `hps` is on (default: true)
    pub octave_limit: bool,

    /// Amplitude a peak must exceed, and the loudest bin must exceed for a
    /// frame to be valid (default: 0.5)
    pub min_amplitude: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 11025,
            fft_size: 16384,
            oversample: 16,
            max_peaks: 8,
            reference: A4_REFERENCE,
            temperament: TemperamentSetting::default(),
            key: 0,
            pre_filter: false,
            hps: false,
            fundamental_filter: false,
            note_filter: false,
            filters: NoteFilter::default(),
            octave_limit: true,
            min_amplitude: MIN_AMPLITUDE,
        }
    }
}

impl DetectorConfig {
    /// Samples consumed per frame.
    pub fn step(&self) -> usize {
        self.fft_size / self.oversample
    }

    /// Number of analysed bins, 7/16 of the FFT length.
    pub fn range(&self) -> usize {
        self.fft_size * 7 / 16
    }

    /// Width of one FFT bin in Hz.
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.fft_size as f64
    }

    pub fn tuning(&self) -> Tuning {
        Tuning::new(self.reference, self.temperament.table(), self.key)
    }

    /// Checks every value the detector relies on.
    ///
    /// # Errors
    /// * `TunerError::InvalidInput` - FFT size not a power of two
    /// * `TunerError::InvalidConfig` - any other out-of-range value
    pub fn validate(&self) -> Result<(), TunerError> {
        if self.fft_size < 64 || !self.fft_size.is_power_of_two() {
            return Err(TunerError::InvalidInput(format!(
                "FFT size must be a power of two of at least 64, got {}",
                self.fft_size
            )));
        }
        if self.oversample == 0
            || self.oversample > self.fft_size
            || self.fft_size % self.oversample != 0
        {
            return Err(TunerError::InvalidConfig(format!(
                "oversample {} must evenly divide the FFT size {}",
                self.oversample, self.fft_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(TunerError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.max_peaks == 0 {
            return Err(TunerError::InvalidConfig("max_peaks must be at least 1".into()));
        }
        if !(MIN_REFERENCE..=MAX_REFERENCE).contains(&self.reference) {
            return Err(TunerError::InvalidConfig(format!(
                "reference {} Hz outside {}..={} Hz",
                self.reference, MIN_REFERENCE, MAX_REFERENCE
            )));
        }
        if self.key > 11 {
            return Err(TunerError::InvalidConfig(format!(
                "key must be 0-11, got {}",
                self.key
            )));
        }
        if !(self.min_amplitude.is_finite() && self.min_amplitude > 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "min_amplitude must be positive, got {}",
                self.min_amplitude
            )));
        }
        if let TemperamentSetting::Custom(table) = &self.temperament {
            table.validate()?;
        }
        Ok(())
    }

    /// Loads and validates a configuration saved as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TunerError> {
        let data = fs::read_to_string(path)?;
        let config: DetectorConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TunerError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
