//! # Pitch Detector
//!
//! The frame pipeline: sliding buffer, window, FFT, phase vocoder, optional
//! harmonic product spectrum, peak extraction and result selection. One
//! [`PitchDetector`] owns all cross-frame state (samples, filter history,
//! peak tracker, previous phases), so independent detectors never interfere.
//!
//! Each call to [`PitchDetector::process_buffer`] consumes one hop of
//! samples and runs to completion; the detector is `Send` but must only be
//! driven from one thread at a time. Hand other threads a
//! [`FrameReport`] snapshot rather than references into the detector.

use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::PitchResult;
use crate::buffer::{Sample, SampleBuffer};
use crate::config::{DetectorConfig, MAX_REFERENCE, MIN_REFERENCE, NoteFilter, TemperamentSetting};
use crate::error::TunerError;
use crate::fft::Fft;
use crate::hps::HarmonicProduct;
use crate::maxima::{self, Loudest, Maximum, PeakOptions};
use crate::tuning::{self, C5_OFFSET, Tuning};
use crate::vocoder::PhaseVocoder;

/// Largest accepted deviation from the reference note, in cents.
pub const MAX_CENTS: f64 = 60.0;

/// Half-width of the display band around the reference note, in semitones.
const BAND_SEMITONES: f64 = 0.55;

/// Positions for a spectrum display, in FFT-bin units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMarkers {
    pub frequency: f64,
    pub reference: f64,
    pub low: f64,
    pub high: f64,
}

/// An owned copy of everything a frame produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub result: PitchResult,
    pub maxima: Vec<Maximum>,
    pub spectrum: Vec<f64>,
    pub markers: SpectrumMarkers,
}

/// Real-time pitch detector.
#[derive(Debug, Clone)]
pub struct PitchDetector {
    config: DetectorConfig,
    tuning: Tuning,
    fft: Fft,
    buffer: SampleBuffer,
    bins: Vec<Complex64>,
    vocoder: PhaseVocoder,
    hps: HarmonicProduct,
    amplitude: Vec<f64>,
    difference: Vec<f64>,
    maxima: Vec<Maximum>,
    loudest: Loudest,
    markers: SpectrumMarkers,
    result: PitchResult,
}

impl PitchDetector {
    /// Builds a detector from a configuration.
    ///
    /// # Errors
    /// Returns the first problem found by [`DetectorConfig::validate`].
    pub fn new(config: DetectorConfig) -> Result<Self, TunerError> {
        config.validate()?;

        let fft_size = config.fft_size;
        let range = config.range();
        let step = config.step();

        log::debug!(
            "Creating pitch detector: {} Hz, N={}, step={}, range={} bins ({:.1} Hz)",
            config.sample_rate,
            fft_size,
            step,
            range,
            range as f64 * config.bin_width()
        );

        Ok(Self {
            tuning: config.tuning(),
            fft: Fft::new(fft_size)?,
            buffer: SampleBuffer::new(fft_size, step, config.pre_filter),
            bins: vec![Complex64::new(0.0, 0.0); fft_size],
            vocoder: PhaseVocoder::new(range, fft_size, step, config.sample_rate as f64),
            hps: HarmonicProduct::new(range),
            amplitude: vec![0.0; range],
            difference: vec![0.0; range],
            maxima: Vec::with_capacity(config.max_peaks),
            loudest: Loudest::default(),
            markers: SpectrumMarkers::default(),
            result: PitchResult::default(),
            config,
        })
    }

    /// Processes one block of samples and returns the frame's result.
    ///
    /// Blocks should hold [`DetectorConfig::step`] samples; only that many
    /// are consumed from longer blocks.
    pub fn process_buffer<S: Sample>(&mut self, samples: &[S]) -> PitchResult {
        self.buffer.push(samples);
        self.buffer.condition(&mut self.bins);
        self.fft.transform(&mut self.bins);

        self.vocoder
            .update(&self.bins, &mut self.amplitude, &mut self.difference);

        if self.config.hps {
            self.hps.apply(&mut self.amplitude, &mut self.difference);
        }

        let filter = self.config.note_filter.then_some(&self.config.filters);
        let options = PeakOptions {
            max_peaks: self.config.max_peaks,
            fundamental_filter: self.config.fundamental_filter,
            note_filter: filter,
            octave_limit: self.config.octave_limit && !self.config.hps,
            min_amplitude: self.config.min_amplitude,
        };
        self.loudest = maxima::find_maxima(
            &self.amplitude,
            &self.difference,
            self.vocoder.frequencies(),
            &self.tuning,
            &options,
            &mut self.maxima,
        );

        self.result = self.select_result();
        if self.result.valid {
            log::trace!(
                "{}{} {:.2} Hz {:+.1} cents",
                self.result.note_name(),
                self.result.octave,
                self.result.frequency,
                self.result.cents
            );
        }
        self.result
    }

    /// Chooses the fundamental among this frame's maxima.
    ///
    /// The first maximum names the note, or the strongest one when HPS is on.
    fn select_result(&mut self) -> PitchResult {
        let provisional = if self.config.hps {
            self.maxima.iter().max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
        } else {
            self.maxima.first()
        };
        let first = match provisional {
            Some(first) => *first,
            None => {
                self.markers = SpectrumMarkers::default();
                return PitchResult::default();
            }
        };

        if self.loudest.amplitude <= self.config.min_amplitude {
            return PitchResult::default();
        }

        let note = match self.tuning.note_for_frequency(first.frequency) {
            Some(note) => note,
            None => return PitchResult::default(),
        };

        let reference = self.tuning.reference;
        let semitones = (note - C5_OFFSET) as f64;
        let adjust = self.tuning.temper_adjust(note);
        let reference_frequency = self.tuning.reference_frequency(note);
        let low = reference * 2.0_f64.powf((semitones - BAND_SEMITONES) / 12.0) * adjust;
        let high = reference * 2.0_f64.powf((semitones + BAND_SEMITONES) / 12.0) * adjust;

        // The maximum nearest the reference note is the best estimate
        let chosen = self
            .maxima
            .iter()
            .min_by(|a, b| {
                let da = (a.frequency - reference_frequency).abs();
                let db = (b.frequency - reference_frequency).abs();
                da.total_cmp(&db)
            })
            .copied()
            .unwrap_or(first);

        let cents = tuning::cents_deviation(chosen.frequency, reference_frequency);
        if !cents.is_finite() || cents.abs() > MAX_CENTS {
            return PitchResult::default();
        }

        let bin_width = self.config.bin_width();
        self.markers = SpectrumMarkers {
            frequency: chosen.frequency / bin_width,
            reference: reference_frequency / bin_width,
            low: low / bin_width,
            high: high / bin_width,
        };

        PitchResult {
            valid: true,
            frequency: chosen.frequency,
            reference_frequency,
            cents,
            note,
            octave: tuning::octave_of(note),
            confidence: (chosen.amplitude / self.loudest.amplitude).clamp(0.0, 1.0),
        }
    }

    /// Result of the last processed frame.
    pub fn result(&self) -> &PitchResult {
        &self.result
    }

    /// Amplitude of each analysed bin in the last frame (after HPS if enabled).
    pub fn spectrum(&self) -> &[f64] {
        &self.amplitude
    }

    /// Phase vocoder frequency of each analysed bin in the last frame.
    pub fn frequencies(&self) -> &[f64] {
        self.vocoder.frequencies()
    }

    /// Peaks found in the last frame, in discovery order.
    pub fn maxima(&self) -> &[Maximum] {
        &self.maxima
    }

    /// The loudest bin of the last frame.
    pub fn loudest(&self) -> Loudest {
        self.loudest
    }

    pub fn markers(&self) -> SpectrumMarkers {
        self.markers
    }

    /// Owned copy of the last frame's outputs.
    pub fn snapshot(&self) -> FrameReport {
        FrameReport {
            result: self.result,
            maxima: self.maxima.clone(),
            spectrum: self.amplitude.clone(),
            markers: self.markers,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Changes the pitch of A4.
    ///
    /// # Errors
    /// * `TunerError::InvalidConfig` - outside the accepted reference range
    pub fn set_reference(&mut self, reference: f64) -> Result<(), TunerError> {
        if !(MIN_REFERENCE..=MAX_REFERENCE).contains(&reference) {
            return Err(TunerError::InvalidConfig(format!(
                "reference {} Hz outside {}..={} Hz",
                reference, MIN_REFERENCE, MAX_REFERENCE
            )));
        }
        log::debug!("Reference set to {:.2} Hz", reference);
        self.config.reference = reference;
        self.tuning.reference = reference;
        Ok(())
    }

    /// Changes the temperament.
    ///
    /// # Errors
    /// * `TunerError::InvalidConfig` - a custom table with a bad ratio
    pub fn set_temperament(&mut self, temperament: TemperamentSetting) -> Result<(), TunerError> {
        let table = temperament.table();
        table.validate()?;
        log::debug!("Temperament set to {}", table.name);
        self.tuning.table = table;
        self.config.temperament = temperament;
        Ok(())
    }

    /// Changes the temperament's tonic (0 = C).
    ///
    /// # Errors
    /// * `TunerError::InvalidConfig` - key above 11
    pub fn set_key(&mut self, key: usize) -> Result<(), TunerError> {
        if key > 11 {
            return Err(TunerError::InvalidConfig(format!("key must be 0-11, got {}", key)));
        }
        log::debug!("Key set to {}", tuning::note_name(key as i32));
        self.config.key = key;
        self.tuning.key = key;
        Ok(())
    }

    pub fn set_pre_filter(&mut self, enable: bool) {
        self.config.pre_filter = enable;
        self.buffer.set_pre_filter(enable);
    }

    pub fn set_hps(&mut self, enable: bool) {
        self.config.hps = enable;
    }

    pub fn set_fundamental_filter(&mut self, enable: bool) {
        self.config.fundamental_filter = enable;
    }

    pub fn set_octave_limit(&mut self, enable: bool) {
        self.config.octave_limit = enable;
    }

    /// Changes the peak threshold.
    ///
    /// # Errors
    /// * `TunerError::InvalidConfig` - not a positive finite number
    pub fn set_min_amplitude(&mut self, min_amplitude: f64) -> Result<(), TunerError> {
        if !(min_amplitude.is_finite() && min_amplitude > 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "min_amplitude must be positive, got {}",
                min_amplitude
            )));
        }
        self.config.min_amplitude = min_amplitude;
        Ok(())
    }

    /// Enables or disables the note filter and replaces its tables.
    pub fn set_note_filter(&mut self, enable: bool, filters: NoteFilter) {
        self.config.note_filter = enable;
        self.config.filters = filters;
    }

    /// Clears all cross-frame state.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.vocoder.reset();
        self.amplitude.iter_mut().for_each(|a| *a = 0.0);
        self.difference.iter_mut().for_each(|d| *d = 0.0);
        self.maxima.clear();
        self.loudest = Loudest::default();
        self.markers = SpectrumMarkers::default();
        self.result = PitchResult::default();
    }
}
