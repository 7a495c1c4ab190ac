//! Numerical constants shared across the crate
//!
//! Provides standardized tolerance values used by the linear algebra layer
//! and the fitting stages.

/// Tolerance for detecting near-zero values in division and singularity checks.
pub const NEAR_ZERO: f64 = 1e-15;

/// Cutoff (relative to the largest singular value) below which singular
/// values are discarded by the SVD least-squares solve.
pub const SVD_TOLERANCE: f64 = 1e-14;

/// Tolerance for column scaling in numerical algorithms.
/// Columns with a smaller norm are left unscaled.
pub const COLUMN_SCALE_TOL: f64 = 1e-15;
