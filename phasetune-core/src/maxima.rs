//! # Peak Extraction Module
//!
//! Finds the candidate partials of a frame: local maxima of the amplitude
//! spectrum that are loud enough, mapped to note numbers and their
//! temperament-adjusted reference frequencies.

use serde::{Deserialize, Serialize};

use crate::config::NoteFilter;
use crate::tuning::{self, OCTAVE, Tuning};

/// Default amplitude a bin must exceed to count as a peak, and the frame's
/// loudest bin must exceed for the frame to be valid.
pub const MIN_AMPLITUDE: f64 = 0.5;

/// One spectral peak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Maximum {
    /// Phase vocoder frequency of the peak bin in Hz
    pub frequency: f64,
    /// Tempered frequency of the nearest note in Hz
    pub reference_frequency: f64,
    /// Note number, C0 = 0
    pub note: i32,
    /// Bin amplitude
    pub amplitude: f64,
}

impl Maximum {
    /// Deviation from the reference frequency in cents.
    pub fn cents(&self) -> f64 {
        tuning::cents_deviation(self.frequency, self.reference_frequency)
    }
}

/// The single loudest bin of a frame, among bins that passed the note filters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Loudest {
    pub frequency: f64,
    pub amplitude: f64,
}

/// Peak search options.
#[derive(Debug, Clone, Copy)]
pub struct PeakOptions<'a> {
    pub max_peaks: usize,
    /// Reject notes whose pitch class differs from the first peak's
    pub fundamental_filter: bool,
    /// Reject notes the filter does not allow
    pub note_filter: Option<&'a NoteFilter>,
    /// Stop searching an octave above each accepted peak
    pub octave_limit: bool,
    /// Amplitude a peak must exceed
    pub min_amplitude: f64,
}

/// Scans `amplitude` for peaks, appending them to `out` in ascending bin order.
///
/// `out` is cleared first. `difference[i]` must hold
/// `amplitude[i] - amplitude[i - 1]` and `frequency[i]` the estimated
/// frequency of bin `i`. Returns the loudest bin seen.
pub fn find_maxima(
    amplitude: &[f64],
    difference: &[f64],
    frequency: &[f64],
    tuning: &Tuning,
    options: &PeakOptions<'_>,
    out: &mut Vec<Maximum>,
) -> Loudest {
    out.clear();

    let range = amplitude.len();
    let mut loudest = Loudest::default();
    let mut limit = range.saturating_sub(1);

    for i in 1..range.saturating_sub(1) {
        if i >= limit {
            break;
        }

        let note = match tuning.note_for_frequency(frequency[i]) {
            Some(note) => note,
            None => continue,
        };

        if options.fundamental_filter {
            if let Some(first) = out.first() {
                if note % OCTAVE != first.note % OCTAVE {
                    continue;
                }
            }
        }

        if let Some(filter) = options.note_filter {
            if !filter.allows(note) {
                continue;
            }
        }

        let amp = amplitude[i];
        if amp > loudest.amplitude {
            loudest = Loudest {
                frequency: frequency[i],
                amplitude: amp,
            };
        }

        let is_peak = difference[i] > 0.0 && difference[i + 1] < 0.0;
        if out.len() < options.max_peaks
            && amp > options.min_amplitude
            && amp > loudest.amplitude / 4.0
            && is_peak
        {
            out.push(Maximum {
                frequency: frequency[i],
                reference_frequency: tuning.reference_frequency(note),
                note,
                amplitude: amp,
            });

            if options.octave_limit && limit > i * 2 {
                limit = i * 2 - 1;
            }
        }
    }

    loudest
}
