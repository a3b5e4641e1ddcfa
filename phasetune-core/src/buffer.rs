//! # Sample Buffering Module
//!
//! Holds the most recent N samples of input and prepares them for the FFT.
//!
//! ## Features
//! - Fixed-length sliding buffer, advanced by one hop per block
//! - Optional one-pole/one-zero pre-filter (~3 dB/octave rolloff)
//! - Peak normalization with a floor so near-silence is not amplified
//! - Raised-cosine (Hann) windowing

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Lowest peak value used for normalization, in units where full scale is 1.0.
///
/// Corresponds to 4096 for raw 16-bit input.
pub const PEAK_FLOOR: f64 = 0.125;

const FILTER_GAIN: f64 = 3.023332184e+01;
const FILTER_POLE: f64 = 0.9338478249;

/// An input sample format accepted by the detector.
pub trait Sample: Copy {
    /// The sample scaled so that full scale is 1.0.
    fn to_f64(self) -> f64;
}

impl Sample for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    fn to_f64(self) -> f64 {
        self
    }
}

impl Sample for i16 {
    fn to_f64(self) -> f64 {
        self as f64 / 32768.0
    }
}

/// Two-tap state of the pre-filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreFilter {
    xv: [f64; 2],
    yv: [f64; 2],
}

impl PreFilter {
    /// Filters one sample. Unity gain at DC, zero at Nyquist.
    pub fn process(&mut self, sample: f64) -> f64 {
        self.xv[0] = self.xv[1];
        self.xv[1] = sample / FILTER_GAIN;

        self.yv[0] = self.yv[1];
        self.yv[1] = (self.xv[0] + self.xv[1]) + (FILTER_POLE * self.yv[0]);
        self.yv[1]
    }
}

/// Sliding window of the most recent samples.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<f64>,
    window: Vec<f64>,
    step: usize,
    filter: Option<PreFilter>,
    peak: f64,
}

impl SampleBuffer {
    /// Creates a zeroed buffer of `size` samples advanced by `step` per block.
    pub fn new(size: usize, step: usize, pre_filter: bool) -> Self {
        let window = (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos())
            .collect();

        Self {
            samples: vec![0.0; size],
            window,
            step,
            filter: pre_filter.then(PreFilter::default),
            peak: PEAK_FLOOR,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn pre_filter_enabled(&self) -> bool {
        self.filter.is_some()
    }

    /// Turns the pre-filter on or off. Turning it on starts from a clear state.
    pub fn set_pre_filter(&mut self, enable: bool) {
        if enable != self.filter.is_some() {
            self.filter = enable.then(PreFilter::default);
        }
    }

    /// Peak absolute value seen by the last [`SampleBuffer::condition`] call.
    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Shifts the buffer left and appends `block` at the tail.
    ///
    /// At most one hop of samples is taken from the block; the rest is ignored.
    pub fn push<S: Sample>(&mut self, block: &[S]) {
        let count = block.len().min(self.step).min(self.samples.len());
        if count == 0 {
            return;
        }

        let n = self.samples.len();
        self.samples.copy_within(count.., 0);

        let tail = &mut self.samples[n - count..];
        match self.filter.as_mut() {
            Some(filter) => {
                for (dst, src) in tail.iter_mut().zip(block) {
                    *dst = filter.process(src.to_f64());
                }
            }
            None => {
                for (dst, src) in tail.iter_mut().zip(block) {
                    *dst = src.to_f64();
                }
            }
        }
    }

    /// Writes the normalized, windowed buffer into `out` as real-valued input
    /// for the FFT.
    ///
    /// The divisor is the peak of the previous frame (never below
    /// [`PEAK_FLOOR`]); the tracker is then reseeded from this frame's peak.
    pub fn condition(&mut self, out: &mut [Complex64]) {
        debug_assert_eq!(out.len(), self.samples.len());

        let norm = self.peak.max(PEAK_FLOOR);
        let mut peak: f64 = 0.0;

        for ((dst, &sample), &w) in out.iter_mut().zip(&self.samples).zip(&self.window) {
            peak = peak.max(sample.abs());
            *dst = Complex64::new(sample / norm * w, 0.0);
        }

        self.peak = peak.max(PEAK_FLOOR);
    }

    /// Clears samples, filter state and the peak tracker.
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        if let Some(filter) = self.filter.as_mut() {
            *filter = PreFilter::default();
        }
        self.peak = PEAK_FLOOR;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_shifts_by_one_hop() {
        let mut buffer = SampleBuffer::new(8, 2, false);
        buffer.push(&[1.0f64, 2.0]);
        buffer.push(&[3.0f64, 4.0]);
        assert_eq!(buffer.samples(), &[0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);

        // Longer blocks only contribute one hop
        buffer.push(&[5.0f64, 6.0, 7.0]);
        assert_eq!(buffer.samples(), &[0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        // Shorter blocks shift by their own length
        buffer.push(&[9.0f64]);
        assert_eq!(buffer.samples(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 9.0]);
    }

    #[test]
    fn test_integer_samples_are_scaled() {
        let mut buffer = SampleBuffer::new(4, 4, false);
        buffer.push(&[16384i16, -32768, 0, 8192]);
        assert_eq!(buffer.samples(), &[0.5, -1.0, 0.0, 0.25]);
    }

    #[test]
    fn test_pre_filter_passes_dc_and_blocks_nyquist() {
        let mut dc = PreFilter::default();
        let mut out = 0.0;
        for _ in 0..2000 {
            out = dc.process(1.0);
        }
        assert!((out - 1.0).abs() < 1e-3, "DC gain {}", out);

        let mut nyquist = PreFilter::default();
        let mut last = 0.0;
        for i in 0..2000 {
            let s = if i % 2 == 0 { 1.0 } else { -1.0 };
            last = nyquist.process(s);
        }
        assert!(last.abs() < 0.05, "Nyquist gain {}", last);
    }

    #[test]
    fn test_filter_state_persists_across_blocks() {
        let mut split = SampleBuffer::new(8, 4, true);
        split.push(&[1.0f64, 1.0, 1.0, 1.0]);
        split.push(&[1.0f64, 1.0, 1.0, 1.0]);

        let mut filter = PreFilter::default();
        let expected: Vec<f64> = (0..8).map(|_| filter.process(1.0)).collect();
        assert_eq!(split.samples(), expected.as_slice());
    }

    #[test]
    fn test_condition_normalizes_with_previous_peak() {
        let mut buffer = SampleBuffer::new(4, 4, false);
        buffer.push(&[0.0f64, 0.5, 1.0, 0.5]);

        let mut out = vec![Complex64::new(0.0, 0.0); 4];
        // First frame still divides by the floor
        buffer.condition(&mut out);
        assert!((out[2].re - 1.0 / PEAK_FLOOR).abs() < 1e-12);
        assert_eq!(buffer.peak(), 1.0);

        // Second frame divides by the first frame's peak
        buffer.condition(&mut out);
        assert!((out[2].re - 1.0).abs() < 1e-12);
        assert!((out[1].re - 0.25).abs() < 1e-12);
        assert!(out.iter().all(|c| c.im == 0.0));
    }

    #[test]
    fn test_silence_stays_at_floor() {
        let mut buffer = SampleBuffer::new(16, 4, false);
        let mut out = vec![Complex64::new(0.0, 0.0); 16];
        for _ in 0..4 {
            buffer.push(&[0.0f32; 4]);
            buffer.condition(&mut out);
        }
        assert_eq!(buffer.peak(), PEAK_FLOOR);
        assert!(out.iter().all(|c| c.re == 0.0));
    }

    #[test]
    fn test_reset() {
        let mut buffer = SampleBuffer::new(4, 2, true);
        buffer.push(&[0.9f64, 0.9]);
        buffer.reset();
        assert!(buffer.samples().iter().all(|&s| s == 0.0));
        assert_eq!(buffer.peak(), PEAK_FLOOR);
    }
}
