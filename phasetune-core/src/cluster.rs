//! # Multi-Note Clustering Module
//!
//! Batch analysis of a recording: the maxima of every valid frame are grouped
//! by frequency, and the groups that persist across enough frames become the
//! notes of the recording.
//!
//! ## Steps
//! 1. [`NoteClusterer::add_frame`] joins each maximum to the first cluster
//!    whose running mean is within [`CLUSTER_TOLERANCE`]
//! 2. [`NoteClusterer::finish`] keeps clusters seen in at least a quarter of
//!    the valid frames
//! 3. Kept notes are sorted by frequency and octave/twelfth duplicates of a
//!    lower note are removed

use serde::{Deserialize, Serialize};

use crate::PitchResult;
use crate::maxima::Maximum;
use crate::tuning::{self, C5_OFFSET};

/// Most clusters tracked at once; further candidates are dropped.
pub const MAX_CLUSTERS: usize = 64;
/// Largest distance in Hz between a candidate and a cluster mean.
pub const CLUSTER_TOLERANCE: f64 = 1.5;
/// Distance from an exact 2:1 or 3:1 ratio treated as a harmonic.
pub const HARMONIC_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
struct Cluster {
    frequency_sum: f64,
    cents_sum: f64,
    count: usize,
}

impl Cluster {
    fn mean(&self) -> f64 {
        self.frequency_sum / self.count as f64
    }

    fn add(&mut self, maximum: &Maximum) {
        self.frequency_sum += maximum.frequency;
        self.cents_sum += maximum.cents();
        self.count += 1;
    }
}

/// One note found in a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedNote {
    /// Average frequency over the frames it appeared in
    pub frequency: f64,
    /// Equal-tempered frequency of the nearest note
    pub reference_frequency: f64,
    /// Average deviation from the tempered reference in cents
    pub cents: f64,
    pub note: i32,
    pub octave: i32,
    pub name: String,
    /// Number of frames it appeared in
    pub count: usize,
}

/// Notes found in a recording, lowest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiNoteReport {
    pub notes: Vec<DetectedNote>,
    pub valid_frames: usize,
}

impl MultiNoteReport {
    /// The note seen in the most frames; the lowest one wins a tie.
    pub fn primary(&self) -> Option<&DetectedNote> {
        self.notes
            .iter()
            .rev()
            .max_by_key(|n| n.count)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Accumulates maxima across frames.
#[derive(Debug, Clone)]
pub struct NoteClusterer {
    clusters: Vec<Cluster>,
    valid_frames: usize,
    max_notes: usize,
    dropped: usize,
}

impl NoteClusterer {
    /// Creates a clusterer reporting at most `max_notes` notes.
    pub fn new(max_notes: usize) -> Self {
        Self {
            clusters: Vec::with_capacity(MAX_CLUSTERS),
            valid_frames: 0,
            max_notes,
            dropped: 0,
        }
    }

    pub fn valid_frames(&self) -> usize {
        self.valid_frames
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Adds one frame. Invalid frames are ignored.
    pub fn add_frame(&mut self, result: &PitchResult, maxima: &[Maximum]) {
        if !result.valid {
            return;
        }
        self.valid_frames += 1;

        for maximum in maxima {
            let existing = self
                .clusters
                .iter()
                .position(|c| (maximum.frequency - c.mean()).abs() < CLUSTER_TOLERANCE);

            match existing {
                Some(index) => self.clusters[index].add(maximum),
                None if self.clusters.len() < MAX_CLUSTERS => {
                    let mut cluster = Cluster { frequency_sum: 0.0, cents_sum: 0.0, count: 0 };
                    cluster.add(maximum);
                    self.clusters.push(cluster);
                }
                None => {
                    if self.dropped == 0 {
                        log::warn!("Cluster table full, dropping {:.2} Hz", maximum.frequency);
                    }
                    self.dropped += 1;
                }
            }
        }
    }

    /// Reduces the clusters to a note report, using `reference` for A4.
    pub fn finish(&self, reference: f64) -> MultiNoteReport {
        if self.valid_frames == 0 {
            return MultiNoteReport::default();
        }

        let mut persistent: Vec<&Cluster> = self
            .clusters
            .iter()
            .filter(|c| c.count * 4 >= self.valid_frames)
            .collect();
        persistent.sort_by(|a, b| b.count.cmp(&a.count));
        persistent.truncate(self.max_notes);

        let mut candidates: Vec<DetectedNote> = persistent
            .into_iter()
            .filter_map(|c| {
                let frequency = c.mean();
                let note = tuning::note_for_frequency(frequency, reference)?;
                let reference_frequency =
                    reference * 2.0_f64.powf((note - C5_OFFSET) as f64 / 12.0);
                Some(DetectedNote {
                    frequency,
                    reference_frequency,
                    cents: c.cents_sum / c.count as f64,
                    note,
                    octave: tuning::octave_of(note),
                    name: tuning::note_name(note).to_string(),
                    count: c.count,
                })
            })
            .collect();
        candidates.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

        let mut notes: Vec<DetectedNote> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let harmonic = notes.iter().any(|lower| {
                let ratio = candidate.frequency / lower.frequency;
                (ratio - 2.0).abs() < HARMONIC_TOLERANCE || (ratio - 3.0).abs() < HARMONIC_TOLERANCE
            });
            if harmonic {
                log::debug!("Dropping {:.2} Hz as a harmonic", candidate.frequency);
                continue;
            }
            notes.push(candidate);
        }

        log::debug!(
            "{} notes from {} clusters over {} frames",
            notes.len(),
            self.clusters.len(),
            self.valid_frames
        );

        MultiNoteReport { notes, valid_frames: self.valid_frames }
    }

    pub fn reset(&mut self) {
        self.clusters.clear();
        self.valid_frames = 0;
        self.dropped = 0;
    }
}
