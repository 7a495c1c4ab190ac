//! Fitted pole-residue model and its evaluation
//!
//! The model for channel `m` is
//!
//! ```text
//! H_m(s) = d_m + h_m*s + sum_k[ r_mk / (s - p_k) ]
//! ```
//!
//! where the sum runs over every scalar pole, conjugates included.

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;

use super::poles::PoleSet;
use crate::sample::Sample;

/// Completed Vector Fitting model
///
/// Immutable once built; every accessor borrows or copies.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    poles: PoleSet,
    /// [n_channels, model_order], aligned with `poles.expand()`
    residues: Array2<Complex64>,
    constant: Array1<f64>,
    proportional: Array1<f64>,
}

impl FittedModel {
    pub(crate) fn new(
        poles: PoleSet,
        residues: Array2<Complex64>,
        constant: Array1<f64>,
        proportional: Array1<f64>,
    ) -> Self {
        debug_assert_eq!(residues.ncols(), poles.model_order());
        debug_assert_eq!(residues.nrows(), constant.len());
        debug_assert_eq!(residues.nrows(), proportional.len());
        Self {
            poles,
            residues,
            constant,
            proportional,
        }
    }

    /// Number of output channels
    #[inline]
    pub fn n_channels(&self) -> usize {
        self.residues.nrows()
    }

    /// Number of scalar poles
    #[inline]
    pub fn model_order(&self) -> usize {
        self.poles.model_order()
    }

    /// Categorized pole set
    pub fn pole_set(&self) -> &PoleSet {
        &self.poles
    }

    /// Every scalar pole, conjugates adjacent to their partners
    pub fn poles(&self) -> Vec<Complex64> {
        self.poles.expand()
    }

    /// Residues flattened channel by channel (`model_order * n_channels`)
    pub fn residues(&self) -> Vec<Complex64> {
        self.residues.iter().copied().collect()
    }

    /// Residues of a single channel, aligned with [`FittedModel::poles`]
    pub fn channel_residues(&self, channel: usize) -> Option<ArrayView1<'_, Complex64>> {
        (channel < self.n_channels()).then(|| self.residues.row(channel))
    }

    /// Constant coefficients `d`, one per channel
    pub fn constant(&self) -> &Array1<f64> {
        &self.constant
    }

    /// Proportional coefficients `h`, one per channel
    pub fn proportional(&self) -> &Array1<f64> {
        &self.proportional
    }

    /// Evaluate every channel at the complex frequency `s`
    pub fn predict_response(&self, s: Complex64) -> Vec<Complex64> {
        let poles = self.poles.expand();
        self.residues
            .rows()
            .into_iter()
            .zip(self.constant.iter().zip(self.proportional.iter()))
            .map(|(residues, (&d, &h))| evaluate_channel(&poles, residues, d, h, s))
            .collect()
    }

    /// Evaluate every channel at each frequency in `freqs`
    pub fn evaluate_many(&self, freqs: &[Complex64]) -> Vec<Vec<Complex64>> {
        freqs.iter().map(|&s| self.predict_response(s)).collect()
    }

    /// Evaluate the model at the frequencies of `samples`
    pub fn fitted_samples(&self, samples: &[Sample]) -> Vec<Sample> {
        samples
            .iter()
            .map(|sample| Sample::new(sample.freq, self.predict_response(sample.freq)))
            .collect()
    }

    /// Root-mean-square error against `samples` over all channels
    pub fn rmse(&self, samples: &[Sample]) -> f64 {
        let (sum, count) = self
            .deviations(samples)
            .fold((0.0, 0usize), |(sum, count), e| (sum + e * e, count + 1));
        if count == 0 {
            return f64::NAN;
        }
        (sum / count as f64).sqrt()
    }

    /// Largest absolute deviation from `samples` over all channels
    pub fn max_error(&self, samples: &[Sample]) -> f64 {
        self.deviations(samples).fold(0.0, f64::max)
    }

    fn deviations<'a>(&'a self, samples: &'a [Sample]) -> impl Iterator<Item = f64> + 'a {
        samples.iter().flat_map(move |sample| {
            self.predict_response(sample.freq)
                .into_iter()
                .zip(sample.values.iter())
                .map(|(model, target)| (model - target).norm())
                .collect::<Vec<_>>()
        })
    }
}

/// Evaluate one channel: `d + h*s + sum_k r_k / (s - p_k)`
pub fn evaluate_channel(
    poles: &[Complex64],
    residues: ArrayView1<'_, Complex64>,
    d: f64,
    h: f64,
    s: Complex64,
) -> Complex64 {
    poles
        .iter()
        .zip(residues.iter())
        .fold(Complex64::new(d, 0.0) + s * h, |acc, (&p, &r)| {
            acc + r / (s - p)
        })
}
