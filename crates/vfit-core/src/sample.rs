//! Frequency-response samples
//!
//! A sample pairs a complex frequency with the response of every output
//! channel at that frequency.

use num_complex::Complex64;
use std::f64::consts::PI;

/// One `(s, [H_1(s), ..., H_M(s)])` pair
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Complex frequency `s` (typically `j·ω`)
    pub freq: Complex64,
    /// Response value for each channel
    pub values: Vec<Complex64>,
}

impl Sample {
    /// Create a sample at an arbitrary complex frequency
    pub fn new(freq: Complex64, values: Vec<Complex64>) -> Self {
        Self { freq, values }
    }

    /// Create a sample at a real frequency in Hz, placed at `s = j·2π·f`
    pub fn from_hz(f: f64, values: Vec<Complex64>) -> Self {
        Self::new(Complex64::new(0.0, 2.0 * PI * f), values)
    }

    /// Number of channels
    #[inline]
    pub fn n_channels(&self) -> usize {
        self.values.len()
    }

    /// True if the frequency and every response value are finite
    pub fn is_finite(&self) -> bool {
        self.freq.is_finite() && self.values.iter().all(|v| v.is_finite())
    }
}

impl From<(Complex64, Vec<Complex64>)> for Sample {
    fn from((freq, values): (Complex64, Vec<Complex64>)) -> Self {
        Self::new(freq, values)
    }
}
