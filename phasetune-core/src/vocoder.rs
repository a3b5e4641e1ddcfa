//! # Phase Vocoder Module
//!
//! Refines the frequency of every FFT bin from the phase drift between two
//! consecutive overlapping frames. A bin at index `i` is expected to advance
//! by `i * 2*pi*step/N` per hop; whatever is left over after wrapping is the
//! sub-bin offset of the partial that dominates the bin.

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Wraps a phase difference into (-pi, pi] by removing an even multiple of pi.
pub fn wrap_phase(delta: f64) -> f64 {
    let mut qpd = (delta / PI) as i64;
    if qpd >= 0 {
        qpd += qpd & 1;
    } else {
        qpd -= qpd & 1;
    }
    delta - PI * qpd as f64
}

/// Per-bin frequency estimator. Owns the previous frame's phases.
#[derive(Debug, Clone)]
pub struct PhaseVocoder {
    prev_phase: Vec<f64>,
    frequency: Vec<f64>,
    /// Expected phase advance per bin index and hop
    expected: f64,
    oversample: f64,
    bin_width: f64,
}

impl PhaseVocoder {
    /// Creates an estimator for `range` bins of an `fft_size` transform
    /// advanced by `step` samples per frame.
    pub fn new(range: usize, fft_size: usize, step: usize, sample_rate: f64) -> Self {
        Self {
            prev_phase: vec![0.0; range],
            frequency: vec![0.0; range],
            expected: 2.0 * PI * step as f64 / fft_size as f64,
            oversample: fft_size as f64 / step as f64,
            bin_width: sample_rate / fft_size as f64,
        }
    }

    /// Number of bins covered.
    pub fn range(&self) -> usize {
        self.frequency.len()
    }

    /// Corrected frequency of each bin in Hz, from the last [`PhaseVocoder::update`].
    /// Bin 0 is always 0.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequency
    }

    /// Consumes one transformed frame.
    ///
    /// Fills `amplitude` with bin magnitudes and `difference` with the
    /// first difference `amplitude[i] - amplitude[i - 1]`, updates the
    /// frequency estimates and remembers this frame's phases. Index 0 of all
    /// outputs is left at zero.
    pub fn update(&mut self, bins: &[Complex64], amplitude: &mut [f64], difference: &mut [f64]) {
        let range = self.range();
        debug_assert!(bins.len() >= range);
        debug_assert!(amplitude.len() >= range && difference.len() >= range);

        amplitude[0] = 0.0;
        difference[0] = 0.0;

        for i in 1..range {
            let bin = bins[i];
            amplitude[i] = bin.norm();

            let phase = bin.arg();
            let advance = phase - self.prev_phase[i];
            self.prev_phase[i] = phase;

            let delta = wrap_phase(advance - i as f64 * self.expected);
            let deviation = self.oversample * delta / (2.0 * PI);

            self.frequency[i] = (i as f64 + deviation) * self.bin_width;
            difference[i] = amplitude[i] - amplitude[i - 1];
        }
    }

    /// Forgets the previous frame's phases.
    pub fn reset(&mut self) {
        self.prev_phase.iter_mut().for_each(|p| *p = 0.0);
        self.frequency.iter_mut().for_each(|f| *f = 0.0);
    }
}
