//! # Reed Detection Module
//!
//! Accordion voices sound two to four reeds on one note, tuned a few cents
//! apart for tremolo or musette. This module groups the maxima of a frame
//! that belong to the first maximum's note and reports each reed's
//! deviation and the beat rate between neighbouring reeds.
//!
//! Closely spaced reeds only show up as separate maxima when the octave
//! limit is off and the FFT is long enough to resolve them; see
//! [`reed_config`].

use serde::{Deserialize, Serialize};

use crate::PitchResult;
use crate::config::DetectorConfig;
use crate::maxima::Maximum;
use crate::tuning::{self, cents_deviation};

/// Most reeds reported for one note.
pub const MAX_REEDS: usize = 4;
/// Default largest distance from the note's reference, in cents.
pub const DEFAULT_REED_SPREAD: f64 = 50.0;
/// Accepted spread range in cents.
pub const MIN_REED_SPREAD: f64 = 10.0;
pub const MAX_REED_SPREAD: f64 = 100.0;
/// Peak threshold suited to microphone levels.
pub const REED_MIN_AMPLITUDE: f64 = 0.1;

/// One reed of a note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reed {
    pub frequency: f64,
    /// Deviation from the note's tempered reference
    pub cents: f64,
    pub amplitude: f64,
}

/// The reeds found in one frame, lowest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReedReport {
    pub valid: bool,
    pub note: i32,
    pub octave: i32,
    pub name: String,
    pub reference_frequency: f64,
    pub reeds: Vec<Reed>,
    /// `|f[i] - f[i + 1]|` for each pair of neighbouring reeds
    pub beat_frequencies: Vec<f64>,
}

impl ReedReport {
    pub fn reed_count(&self) -> usize {
        self.reeds.len()
    }

    /// Mean deviation of the reeds, or 0 without reeds.
    pub fn average_cents(&self) -> f64 {
        if self.reeds.is_empty() {
            return 0.0;
        }
        self.reeds.iter().map(|r| r.cents).sum::<f64>() / self.reeds.len() as f64
    }
}

/// Detector settings for reed analysis: no octave limit and a low peak
/// threshold, on top of `base`.
pub fn reed_config(base: DetectorConfig) -> DetectorConfig {
    DetectorConfig {
        octave_limit: false,
        min_amplitude: REED_MIN_AMPLITUDE,
        ..base
    }
}

/// Groups a frame's maxima into reeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReedDetector {
    max_reeds: usize,
    spread_cents: f64,
}

impl Default for ReedDetector {
    fn default() -> Self {
        Self {
            max_reeds: MAX_REEDS,
            spread_cents: DEFAULT_REED_SPREAD,
        }
    }
}

impl ReedDetector {
    /// `max_reeds` is clamped to 1..=4 and `spread_cents` to 10..=100.
    pub fn new(max_reeds: usize, spread_cents: f64) -> Self {
        let mut detector = Self::default();
        detector.set_max_reeds(max_reeds);
        detector.set_spread(spread_cents);
        detector
    }

    pub fn max_reeds(&self) -> usize {
        self.max_reeds
    }

    pub fn spread(&self) -> f64 {
        self.spread_cents
    }

    pub fn set_max_reeds(&mut self, count: usize) {
        self.max_reeds = count.clamp(1, MAX_REEDS);
    }

    pub fn set_spread(&mut self, cents: f64) {
        self.spread_cents = if cents.is_nan() {
            DEFAULT_REED_SPREAD
        } else {
            cents.clamp(MIN_REED_SPREAD, MAX_REED_SPREAD)
        };
    }

    /// Builds the reed report of a frame. Invalid frames give an invalid report.
    ///
    /// The first maximum names the note. Maxima up to one semitone away
    /// whose distance from that note's reference is within the spread are
    /// kept, up to the reed limit.
    pub fn analyze(&self, result: &PitchResult, maxima: &[Maximum]) -> ReedReport {
        let primary = match maxima.first() {
            Some(first) if result.valid => *first,
            _ => return ReedReport::default(),
        };

        let mut reeds: Vec<Reed> = Vec::with_capacity(self.max_reeds);
        for m in maxima {
            if reeds.len() >= self.max_reeds {
                break;
            }
            if (m.note - primary.note).abs() > 1 {
                continue;
            }
            let cents = if primary.reference_frequency > 0.0 {
                cents_deviation(m.frequency, primary.reference_frequency)
            } else {
                m.cents()
            };
            if !cents.is_finite() || cents.abs() > self.spread_cents {
                continue;
            }
            reeds.push(Reed {
                frequency: m.frequency,
                cents,
                amplitude: m.amplitude,
            });
        }

        if reeds.is_empty() {
            return ReedReport::default();
        }
        reeds.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

        let beat_frequencies = reeds
            .windows(2)
            .map(|pair| (pair[0].frequency - pair[1].frequency).abs())
            .collect();

        log::trace!(
            "{}{}: {} reeds",
            tuning::note_name(primary.note),
            tuning::octave_of(primary.note),
            reeds.len()
        );

        ReedReport {
            valid: true,
            note: primary.note,
            octave: tuning::octave_of(primary.note),
            name: tuning::note_name(primary.note).to_string(),
            reference_frequency: primary.reference_frequency,
            reeds,
            beat_frequencies,
        }
    }
}
