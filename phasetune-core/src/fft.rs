//! # Fast Fourier Transform (FFT) Module
//!
//! A fixed-size, in-place radix-2 Cooley-Tukey transform used by the pitch
//! detector. The size is chosen once when the detector is built, so twiddle
//! factors and the bit-reversal table are computed up front and every frame
//! runs without allocating.
//!
//! ## Features
//! - Iterative decimation-in-time butterflies
//! - `sqrt(1/N)` normalization folded into the bit-reversal pass
//! - Output is a forward transform (`exp(-j...)` twiddles); for real input
//!   only the first N/2 bins carry information

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::TunerError;

/// A precomputed radix-2 transform of one fixed power-of-two size.
#[derive(Debug, Clone)]
pub struct Fft {
    size: usize,
    norm: f64,
    /// `exp(-j*2*pi*k/N)` for k in `0..N/2`
    twiddles: Vec<Complex64>,
    /// Bit-reversed position of every index
    reversed: Vec<usize>,
}

impl Fft {
    /// Builds a transform for `size` points.
    ///
    /// # Errors
    /// * `TunerError::InvalidInput` - if `size` is not a power of two, or is
    ///   smaller than 2
    pub fn new(size: usize) -> Result<Self, TunerError> {
        if size < 2 || !size.is_power_of_two() {
            return Err(TunerError::InvalidInput(format!(
                "FFT size must be a power of two, got {}",
                size
            )));
        }

        let twiddles = (0..size / 2)
            .map(|k| {
                let w = -2.0 * PI * k as f64 / size as f64;
                Complex64::new(w.cos(), w.sin())
            })
            .collect();

        let bits = size.trailing_zeros();
        let reversed = (0..size)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();

        Ok(Self {
            size,
            norm: (1.0 / size as f64).sqrt(),
            twiddles,
            reversed,
        })
    }

    /// Number of points this transform operates on.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transforms `data` in place.
    ///
    /// # Panics
    /// * If `data.len()` differs from the size given to [`Fft::new`]
    pub fn transform(&self, data: &mut [Complex64]) {
        assert_eq!(
            data.len(),
            self.size,
            "Input length must be equal to the FFT size"
        );

        let n = self.size;

        // Bit-reversal permutation, scaling each element exactly once
        for i in 0..n {
            let r = self.reversed[i];
            if i < r {
                data.swap(i, r);
                data[i] *= self.norm;
                data[r] *= self.norm;
            } else if i == r {
                data[i] *= self.norm;
            }
        }

        // Danielson-Lanczos butterflies
        let mut mmax = 1;
        while mmax < n {
            let istep = mmax * 2;
            let stride = n / istep;
            for m in 0..mmax {
                let w = self.twiddles[m * stride];
                let mut i = m;
                while i < n {
                    let j = i + mmax;
                    let t = w * data[j];
                    data[j] = data[i] - t;
                    data[i] += t;
                    i += istep;
                }
            }
            mmax = istep;
        }
    }
}
