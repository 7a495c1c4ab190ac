//! Constants for Vector Fitting algorithms
//!
//! Centralizes magic numbers to improve code clarity and maintainability.

// ============================================================================
// Iteration control
// ============================================================================

/// Default maximum number of pole relocation iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default tolerance for convergence checking (maximum relative pole
/// displacement between two iterations)
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Numerical tolerances
// ============================================================================

/// Tolerance for considering a pole as real, relative to `max(1, |p|)`
pub const REAL_POLE_TOLERANCE: f64 = 1e-12;

/// Tolerance for matching a pole with its conjugate, relative to `max(1, |p|)`
pub const CONJUGATE_MATCH_TOLERANCE: f64 = 1e-9;

/// Lower bound on |d̃| (sigma constant) before falling back to a fixed value
pub const SIGMA_CONSTANT_LOW: f64 = 1e-18;

/// Upper bound on |d̃| (sigma constant) before falling back to a fixed value
pub const SIGMA_CONSTANT_HIGH: f64 = 1e18;

// ============================================================================
// Pole initialization parameters
// ============================================================================

/// Damping ratio for complex pole initialization
/// (real part = -DAMPING_RATIO * omega)
pub const COMPLEX_POLE_DAMPING_RATIO: f64 = 0.01;

/// Minimum frequency fraction when f_min = 0
pub const MIN_FREQUENCY_FRACTION: f64 = 1e-6;
