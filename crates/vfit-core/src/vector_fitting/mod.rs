//! Vector Fitting algorithm for rational approximation of frequency responses
//!
//! This module fits sampled, multi-channel frequency responses with a
//! pole-residue model
//!
//! ```text
//! H_m(s) = d_m + h_m*s + sum_k[ r_mk / (s - p_k) ]
//! ```
//!
//! by alternating pole identification (relocation through the zeros of an
//! auxiliary sigma function) and residue identification (linear least
//! squares with the poles held fixed).
//!
//! # Example
//!
//! ```
//! use num_complex::Complex64;
//! use vfit_core::{Sample, VectorFitting};
//!
//! let samples: Vec<Sample> = (1..=3)
//!     .map(|k| {
//!         let s = Complex64::new(0.0, k as f64);
//!         Sample::new(s, vec![(s + 1.0).inv()])
//!     })
//!     .collect();
//!
//! let mut vf = VectorFitting::with_poles(samples, &[Complex64::new(-0.5, 0.0)], 1)?;
//! vf.fit()?;
//! assert!((vf.poles()?[0] - Complex64::new(-1.0, 0.0)).norm() < 1e-8);
//! # Ok::<(), vfit_core::VectorFittingError>(())
//! ```
//!
//! # References
//!
//! - B. Gustavsen, A. Semlyen, "Rational Approximation of Frequency Domain Responses
//!   by Vector Fitting", IEEE Trans. Power Delivery, vol. 14, no. 3, 1999
//! - B. Gustavsen, "Improving the Pole Relocating Properties of Vector Fitting",
//!   IEEE Trans. Power Delivery, vol. 21, no. 3, 2006

pub mod algorithms;
mod constants;
mod core;
mod error;
mod model;
mod poles;

pub use self::core::{FitOptions, FitState, VectorFitting};
pub use algorithms::{InitPoleSpacing, PoleIdentification, ResidueIdentification};
pub use error::{Result, Stage, VectorFittingError};
pub use model::FittedModel;
pub use poles::{Pole, PoleSet};
