//! Harmonic product spectrum.
//!
//! Multiplies the amplitude spectrum by copies of itself decimated by 2, 3,
//! 4 and 5, so a bin stays strong only when its harmonics are present too.
//! This pulls detection toward the true fundamental of harmonically rich
//! tones and suppresses isolated partials and noise.

/// Decimation factors applied to the spectrum.
pub const FACTORS: [usize; 4] = [2, 3, 4, 5];

/// Smallest value a decimated factor contributes. A tone with only one or
/// two strong harmonics keeps its own amplitude instead of collapsing to
/// zero on the missing ones.
pub const FACTOR_FLOOR: f64 = 1.0;

/// Scratch buffers for the decimated spectra.
#[derive(Debug, Clone)]
pub struct HarmonicProduct {
    decimated: Vec<Vec<f64>>,
}

impl HarmonicProduct {
    /// Allocates scratch space for a spectrum of `range` bins.
    pub fn new(range: usize) -> Self {
        Self {
            decimated: FACTORS.iter().map(|&k| vec![0.0; range / k]).collect(),
        }
    }

    /// Applies the product in place and recomputes `difference`.
    ///
    /// In-range factors are floored at [`FACTOR_FLOOR`]. Bins whose decimated
    /// index runs past the end of a copy are multiplied by zero, which
    /// silences the top of the band.
    pub fn apply(&mut self, amplitude: &mut [f64], difference: &mut [f64]) {
        for (ds, &k) in self.decimated.iter_mut().zip(FACTORS.iter()) {
            for (i, value) in ds.iter_mut().enumerate() {
                *value = amplitude[i * k..i * k + k].iter().sum();
            }
        }

        for i in 1..amplitude.len() {
            for ds in &self.decimated {
                amplitude[i] *= ds.get(i).map_or(0.0, |&d| d.max(FACTOR_FLOOR));
            }
            difference[i] = amplitude[i] - amplitude[i - 1];
        }
    }
}
