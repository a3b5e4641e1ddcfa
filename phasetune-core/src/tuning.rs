//! # Musical Tuning Module
//!
//! Note numbering, temperaments and temperament-adjusted reference
//! frequencies.
//!
//! Notes are numbered from C0 = 0, so the reference pitch A4 is note 57
//! ([`C5_OFFSET`]). A temperament is a table of 12 frequency ratios for
//! C, C#, D, ... B relative to the tonic; the key rotates the table so its
//! first entry lands on another pitch class.
//!
//! ## Features
//! - Built-in historical temperaments
//! - Validated custom ratio tables from external storage
//! - Reference frequency lookup anchored on A
//! - Cent deviation and note naming, with display transposition

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TunerError;

/// Note number of the reference pitch (A4) when C0 is note 0.
pub const C5_OFFSET: i32 = 57;
/// Pitch class of A.
pub const A_OFFSET: usize = 9;
/// Semitones per octave.
pub const OCTAVE: i32 = 12;
/// Default reference pitch for A4 in Hz.
pub const A4_REFERENCE: f64 = 440.0;

/// Note names indexed by pitch class.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Equal temperament ratios. Temperament adjustments are always measured
/// against this table, whatever temperament is active.
pub const EQUAL_RATIOS: [f64; 12] = [
    1.000000000, 1.059463094, 1.122462048, 1.189207115,
    1.259921050, 1.334839854, 1.414213562, 1.498307077,
    1.587401052, 1.681792831, 1.781797436, 1.887748625,
];

/// The built-in temperaments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperament {
    Equal,
    Pythagorean,
    Just,
    /// Quarter-comma meantone
    Meantone,
    WerckmeisterIii,
    KirnbergerIii,
    Vallotti,
    /// Fifth-comma meantone
    MeantoneFifth,
    /// Sixth-comma meantone
    MeantoneSixth,
}

impl Temperament {
    pub const ALL: [Temperament; 9] = [
        Temperament::Equal,
        Temperament::Pythagorean,
        Temperament::Just,
        Temperament::Meantone,
        Temperament::WerckmeisterIii,
        Temperament::KirnbergerIii,
        Temperament::Vallotti,
        Temperament::MeantoneFifth,
        Temperament::MeantoneSixth,
    ];

    /// Human readable name.
    pub fn name(self) -> &'static str {
        match self {
            Temperament::Equal => "Equal Temperament",
            Temperament::Pythagorean => "Pythagorean",
            Temperament::Just => "Just",
            Temperament::Meantone => "Meantone (-1/4)",
            Temperament::WerckmeisterIii => "Werckmeister III",
            Temperament::KirnbergerIii => "Kirnberger III",
            Temperament::Vallotti => "Vallotti",
            Temperament::MeantoneFifth => "Meantone (-1/5)",
            Temperament::MeantoneSixth => "Meantone (-1/6)",
        }
    }

    /// The ratio table for this temperament.
    pub fn table(self) -> &'static TemperamentTable {
        &BUILT_IN[self as usize]
    }
}

impl fmt::Display for Temperament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Twelve ratios for C through B relative to the tonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperamentTable {
    pub name: String,
    ratios: [f64; 12],
}

impl TemperamentTable {
    /// Builds a table from externally stored ratios.
    ///
    /// # Errors
    /// * `TunerError::InvalidConfig` - if any ratio is not a positive finite number
    pub fn new(name: impl Into<String>, ratios: [f64; 12]) -> Result<Self, TunerError> {
        let name = name.into();
        if let Some(bad) = ratios.iter().find(|r| !r.is_finite() || **r <= 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "temperament '{}' has an invalid ratio {}",
                name, bad
            )));
        }
        Ok(Self { name, ratios })
    }

    pub fn ratios(&self) -> &[f64; 12] {
        &self.ratios
    }

    /// Checks a deserialized table, which bypasses [`TemperamentTable::new`].
    pub fn validate(&self) -> Result<(), TunerError> {
        Self::new(self.name.clone(), self.ratios).map(|_| ())
    }
}

/// Built-in tables, in the order of [`Temperament::ALL`].
static BUILT_IN: Lazy<Vec<TemperamentTable>> = Lazy::new(|| {
    let table = |t: Temperament, ratios: [f64; 12]| TemperamentTable {
        name: t.name().to_string(),
        ratios,
    };
    vec![
        table(Temperament::Equal, EQUAL_RATIOS),
        table(
            Temperament::Pythagorean,
            [
                1.0, 1.053498, 1.125000, 1.185185, 1.265625, 1.333333,
                1.404664, 1.500000, 1.580247, 1.687500, 1.777778, 1.898437,
            ],
        ),
        table(
            Temperament::Just,
            [
                1.0, 1.041667, 1.125000, 1.200000, 1.250000, 1.333333,
                1.406250, 1.500000, 1.600000, 1.666667, 1.800000, 1.875000,
            ],
        ),
        table(
            Temperament::Meantone,
            [
                1.0, 1.044907, 1.118034, 1.196279, 1.250000, 1.337481,
                1.397542, 1.495349, 1.562500, 1.671851, 1.788854, 1.869186,
            ],
        ),
        table(
            Temperament::WerckmeisterIii,
            [
                1.0, 1.053497942, 1.117403309, 1.185185185, 1.252827249, 1.333333333,
                1.404663923, 1.494926960, 1.580246914, 1.670436332, 1.777777778, 1.879240873,
            ],
        ),
        table(
            Temperament::KirnbergerIii,
            [
                1.0, 1.053497942, 1.118033989, 1.185185185, 1.250000000, 1.333333333,
                1.406250000, 1.495348781, 1.580246914, 1.671850762, 1.777777778, 1.875000000,
            ],
        ),
        table(
            Temperament::Vallotti,
            [
                1.0, 1.055879962, 1.119929822, 1.187864958, 1.254242806, 1.336348077,
                1.407839950, 1.496616064, 1.583819943, 1.676104963, 1.781797436, 1.877119933,
            ],
        ),
        table(
            Temperament::MeantoneFifth,
            [
                1.0, 1.049459749, 1.119423732, 1.194051981, 1.253109491, 1.336650124,
                1.402760503, 1.496277870, 1.570283397, 1.674968957, 1.786633554, 1.875000000,
            ],
        ),
        table(
            Temperament::MeantoneSixth,
            [
                1.0, 1.052506113, 1.120351187, 1.192569588, 1.255186781, 1.336096753,
                1.406250000, 1.496897583, 1.575493856, 1.677050983, 1.785154534, 1.878886059,
            ],
        ),
    ]
});

/// Looks up a built-in temperament by its display name or serde name.
pub fn find_temperament(name: &str) -> Option<Temperament> {
    let wanted = name.trim().to_lowercase();
    Temperament::ALL.into_iter().find(|t| {
        t.name().to_lowercase() == wanted
            || serde_json::to_value(t)
                .ok()
                .and_then(|v| v.as_str().map(|s| s == wanted))
                .unwrap_or(false)
    })
}

/// Temperament correction factor for a note in a key.
///
/// The ratio of the note to A in the active temperament, divided by the same
/// ratio in equal temperament. Exactly 1.0 when `ratios` is the equal table.
pub fn temper_adjust(note: i32, key: usize, ratios: &[f64; 12]) -> f64 {
    let key = key as i32 % OCTAVE;
    let n = (note - key).rem_euclid(OCTAVE) as usize;
    let a = (A_OFFSET as i32 - key).rem_euclid(OCTAVE) as usize;

    let temper_ratio = ratios[n] / ratios[a];
    let equal_ratio = EQUAL_RATIOS[n] / EQUAL_RATIOS[a];
    temper_ratio / equal_ratio
}

/// Temperament-adjusted reference frequency of `note` in Hz.
///
/// `reference` is the pitch of A4 (note 57).
pub fn reference_frequency_for(note: i32, key: usize, reference: f64, ratios: &[f64; 12]) -> f64 {
    let semitones = (note - C5_OFFSET) as f64;
    reference * 2.0_f64.powf(semitones / 12.0) * temper_adjust(note, key, ratios)
}

/// Semitones (fractional) of `frequency` above the reference pitch.
///
/// Non-finite for non-positive frequencies.
pub fn semitones_from_reference(frequency: f64, reference: f64) -> f64 {
    -12.0 * (reference / frequency).log2()
}

/// Nearest note number to `frequency`, or `None` when it is below C0 or not
/// a usable number.
pub fn note_for_frequency(frequency: f64, reference: f64) -> Option<i32> {
    let cf = semitones_from_reference(frequency, reference);
    if !cf.is_finite() {
        return None;
    }
    let note = cf.round() as i32 + C5_OFFSET;
    (note >= 0).then_some(note)
}

/// Deviation of `frequency` from `target` in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_deviation(frequency: f64, target: f64) -> f64 {
    -1200.0 * (target / frequency).log2()
}

/// Pitch class name of a note number.
pub fn note_name(note: i32) -> &'static str {
    NOTE_NAMES[note.rem_euclid(OCTAVE) as usize]
}

/// Octave of a note number (C4 starts octave 4).
pub fn octave_of(note: i32) -> i32 {
    note.div_euclid(OCTAVE)
}

/// Note name with octave, shifted by `transpose` semitones for display.
pub fn note_label(note: i32, transpose: i32) -> String {
    let shown = note + transpose.clamp(-6, 6);
    format!("{}{}", note_name(shown), octave_of(shown))
}

/// The active tuning: reference pitch, temperament and key.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    pub reference: f64,
    pub table: TemperamentTable,
    pub key: usize,
}

impl Tuning {
    pub fn new(reference: f64, table: TemperamentTable, key: usize) -> Self {
        Self {
            reference,
            table,
            key: key % OCTAVE as usize,
        }
    }

    /// Equal temperament in C at the given reference pitch.
    pub fn equal(reference: f64) -> Self {
        Self::new(reference, Temperament::Equal.table().clone(), 0)
    }

    pub fn temper_adjust(&self, note: i32) -> f64 {
        temper_adjust(note, self.key, self.table.ratios())
    }

    pub fn reference_frequency(&self, note: i32) -> f64 {
        reference_frequency_for(note, self.key, self.reference, self.table.ratios())
    }

    pub fn note_for_frequency(&self, frequency: f64) -> Option<i32> {
        note_for_frequency(frequency, self.reference)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::equal(A4_REFERENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_temperament_has_no_adjustment() {
        for key in 0..12 {
            for note in 0..120 {
                assert_eq!(temper_adjust(note, key, &EQUAL_RATIOS), 1.0);
            }
        }
    }

    #[test]
    fn test_equal_reference_is_exact() {
        let reference = 440.0;
        for note in 0..12 {
            let cf = (note - C5_OFFSET) as f64;
            let expected = reference * 2.0_f64.powf(cf.round() / 12.0);
            assert_eq!(
                reference_frequency_for(note, 0, reference, &EQUAL_RATIOS),
                expected
            );
        }
    }

    #[test]
    fn test_key_does_not_move_equal_temperament() {
        let base = Tuning::new(442.0, Temperament::Equal.table().clone(), 0);
        for key in 1..12 {
            let rotated = Tuning::new(442.0, Temperament::Equal.table().clone(), key);
            for note in 30..80 {
                assert_eq!(base.reference_frequency(note), rotated.reference_frequency(note));
            }
        }
    }

    #[test]
    fn test_a_is_anchored_in_every_temperament() {
        for t in Temperament::ALL {
            for key in 0..12 {
                let tuning = Tuning::new(440.0, t.table().clone(), key);
                let a4 = tuning.reference_frequency(C5_OFFSET);
                assert!((a4 - 440.0).abs() < 1e-9, "{} key {}: {}", t, key, a4);
            }
        }
    }

    #[test]
    fn test_key_rotates_unequal_temperament() {
        let c_major = Tuning::new(440.0, Temperament::Just.table().clone(), 0);
        let d_major = Tuning::new(440.0, Temperament::Just.table().clone(), 2);
        // F#4 is the augmented fourth of C but the major third of D
        let f_sharp4 = 54;
        let in_c = c_major.reference_frequency(f_sharp4);
        let in_d = d_major.reference_frequency(f_sharp4);
        assert!((in_c - in_d).abs() > 1.0, "{} vs {}", in_c, in_d);
    }

    #[test]
    fn test_just_third_is_pure() {
        // In C, E4 sits a pure 5/4 above C4 whatever A is pinned to
        let tuning = Tuning::new(440.0, Temperament::Just.table().clone(), 0);
        let ratio = tuning.reference_frequency(52) / tuning.reference_frequency(48);
        assert!((ratio - 1.25).abs() < 1e-5, "ratio {}", ratio);
    }

    #[test]
    fn test_meantone_fifths_are_tempered() {
        // C to G narrowed by a fifth and a sixth of the syntonic comma
        let comma = 1200.0 * (81.0_f64 / 80.0).log2();
        for (t, share) in [(Temperament::MeantoneFifth, 5.0), (Temperament::MeantoneSixth, 6.0)] {
            let ratios = t.table().ratios();
            let fifth = 1200.0 * (ratios[7] / ratios[0]).log2();
            assert!((fifth - (701.955 - comma / share)).abs() < 0.01, "{}: {}", t, fifth);
        }
        assert_eq!(Temperament::ALL.len(), BUILT_IN.len());
        for (i, t) in Temperament::ALL.iter().enumerate() {
            assert_eq!(*t as usize, i);
            assert_eq!(t.table().name, t.name());
        }
    }

    #[test]
    fn test_note_numbers() {
        assert_eq!(note_for_frequency(440.0, 440.0), Some(57));
        assert_eq!(note_for_frequency(261.63, 440.0), Some(48));
        assert_eq!(note_for_frequency(8.0, 440.0), None);
        assert_eq!(note_for_frequency(0.0, 440.0), None);
        assert_eq!(note_for_frequency(-5.0, 440.0), None);
        assert_eq!(note_name(57), "A");
        assert_eq!(octave_of(57), 4);
    }

    #[test]
    fn test_cents() {
        assert!(cents_deviation(440.0, 440.0).abs() < 1e-12);
        let sharp = 440.0 * 2.0_f64.powf(10.0 / 1200.0);
        assert!((cents_deviation(sharp, 440.0) - 10.0).abs() < 1e-9);
        assert!(!cents_deviation(0.0, 440.0).is_finite());
    }

    #[test]
    fn test_note_label_transposes() {
        assert_eq!(note_label(57, 0), "A4");
        // B-flat instrument: concert A shows as B
        assert_eq!(note_label(57, 2), "B4");
        assert_eq!(note_label(48, -1), "B3");
        assert_eq!(note_label(57, 20), "Eb5");
    }

    #[test]
    fn test_custom_table_validation() {
        let mut ratios = EQUAL_RATIOS;
        assert!(TemperamentTable::new("mine", ratios).is_ok());
        ratios[3] = 0.0;
        assert!(TemperamentTable::new("mine", ratios).is_err());
        ratios[3] = f64::NAN;
        assert!(TemperamentTable::new("mine", ratios).is_err());
    }

    #[test]
    fn test_find_temperament() {
        assert_eq!(find_temperament("vallotti"), Some(Temperament::Vallotti));
        assert_eq!(find_temperament("Werckmeister III"), Some(Temperament::WerckmeisterIii));
        assert_eq!(find_temperament("werckmeister_iii"), Some(Temperament::WerckmeisterIii));
        assert_eq!(find_temperament("nope"), None);
    }
}
