//! Linear algebra operations
//!
//! Thin layer over nalgebra used by the fitting stages. Working matrices are
//! built as ndarray arrays; every ndarray<->nalgebra conversion is contained
//! here so the stages never touch nalgebra types directly.

use nalgebra::DMatrix;
use ndarray::Array2;
use num_complex::Complex64;
use thiserror::Error;

use crate::constants::{COLUMN_SCALE_TOL, SVD_TOLERANCE};

/// Linear algebra failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("empty matrix ({rows}x{cols})")]
    Empty { rows: usize, cols: usize },

    #[error("dimension mismatch: matrix has {expected} rows, right-hand side has {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("non-finite entry in {0}")]
    NonFinite(&'static str),

    #[error("rank deficient system: rank {rank} < {cols} unknowns")]
    RankDeficient { rank: usize, cols: usize },

    #[error("SVD solve failed: {0}")]
    SolveFailed(&'static str),
}

/// Result of least squares solve
#[derive(Debug, Clone)]
pub struct LstsqResult {
    /// Solution, one column per right-hand side
    pub solution: Array2<f64>,
    /// Singular values of the system matrix
    pub singular_values: Vec<f64>,
    pub condition: f64,
}

// ============================================================================
// Conversion helpers (internal)
// ============================================================================

#[inline]
fn to_na_real(a: &Array2<f64>) -> DMatrix<f64> {
    let (m, n) = a.dim();
    DMatrix::from_fn(m, n, |i, j| a[[i, j]])
}

#[inline]
fn from_na_real(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn all_finite(a: &Array2<f64>) -> bool {
    a.iter().all(|v| v.is_finite())
}

// ============================================================================
// Real/imaginary splitting
// ============================================================================

/// Stack real parts on top of imaginary parts: `[Re(A); Im(A)]`
///
/// Turns a complex system with real unknowns into an equivalent real system
/// with twice as many rows.
pub fn stack_real_imag(a: &Array2<Complex64>) -> Array2<f64> {
    let (rows, cols) = a.dim();
    let mut result = Array2::<f64>::zeros((2 * rows, cols));
    for ((i, j), v) in a.indexed_iter() {
        result[[i, j]] = v.re;
        result[[rows + i, j]] = v.im;
    }
    result
}

// ============================================================================
// Column scaling
// ============================================================================

/// Scale every column of `a` to unit Euclidean norm in place
///
/// Returns the applied factors; the solution of the scaled system must be
/// multiplied row-wise by them to recover the unscaled unknowns.
pub fn scale_columns(a: &mut Array2<f64>) -> Vec<f64> {
    a.columns_mut()
        .into_iter()
        .map(|mut col| {
            let norm = col.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > COLUMN_SCALE_TOL {
                col.mapv_inplace(|v| v / norm);
                1.0 / norm
            } else {
                1.0
            }
        })
        .collect()
}

// ============================================================================
// QR Decomposition
// ============================================================================

/// QR decomposition of `a`, returning `(R, Qᵀ·b)`
///
/// `R` is `min(m, n) x n` upper triangular. `b` may be `None` when only the
/// triangular factor is needed, in which case the second element is empty.
pub fn qr_reduce(
    a: &Array2<f64>,
    b: Option<&Array2<f64>>,
) -> Result<(Array2<f64>, Array2<f64>), LinalgError> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err(LinalgError::Empty { rows: m, cols: n });
    }
    if !all_finite(a) {
        return Err(LinalgError::NonFinite("QR input"));
    }

    let qr = to_na_real(a).qr();
    let r = from_na_real(&qr.r());

    let qtb = match b {
        Some(b) => {
            if b.nrows() != m {
                return Err(LinalgError::DimensionMismatch {
                    expected: m,
                    found: b.nrows(),
                });
            }
            let q = qr.q();
            from_na_real(&(q.transpose() * to_na_real(b)))
        }
        None => Array2::zeros((0, 0)),
    };

    Ok((r, qtb))
}

// ============================================================================
// Least Squares
// ============================================================================

/// Solve the least squares problem `A·X = B` using SVD
///
/// `B` may carry several right-hand sides (one per column). Fails when the
/// system is rank deficient under the usual `σ_max · max(m, n) · ε` rank
/// cutoff, or when any entry of the input or solution is not finite.
pub fn lstsq(a: &Array2<f64>, b: &Array2<f64>) -> Result<LstsqResult, LinalgError> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err(LinalgError::Empty { rows: m, cols: n });
    }
    if b.nrows() != m {
        return Err(LinalgError::DimensionMismatch {
            expected: m,
            found: b.nrows(),
        });
    }
    if !all_finite(a) {
        return Err(LinalgError::NonFinite("least squares matrix"));
    }
    if !all_finite(b) {
        return Err(LinalgError::NonFinite("least squares right-hand side"));
    }

    let svd = to_na_real(a).svd(true, true);
    let singular_values: Vec<f64> = svd.singular_values.iter().cloned().collect();

    let s_max = singular_values.iter().cloned().fold(0.0, f64::max);
    let s_min = singular_values.iter().cloned().fold(f64::INFINITY, f64::min);
    let rank_tol = s_max * m.max(n) as f64 * f64::EPSILON;
    let rank = singular_values.iter().filter(|&&s| s > rank_tol).count();
    if s_max == 0.0 || rank < n {
        return Err(LinalgError::RankDeficient { rank, cols: n });
    }

    let solution = svd
        .solve(&to_na_real(b), SVD_TOLERANCE * s_max)
        .map_err(LinalgError::SolveFailed)?;
    let solution = from_na_real(&solution);
    if !all_finite(&solution) {
        return Err(LinalgError::NonFinite("least squares solution"));
    }

    Ok(LstsqResult {
        solution,
        singular_values,
        condition: s_max / s_min,
    })
}

// ============================================================================
// Eigenvalue decomposition
// ============================================================================

/// Compute complex eigenvalues of a real matrix
pub fn eigenvalues(a: &Array2<f64>) -> Result<Vec<Complex64>, LinalgError> {
    let (m, n) = a.dim();
    if m != n {
        return Err(LinalgError::NotSquare { rows: m, cols: n });
    }
    if m == 0 {
        return Ok(Vec::new());
    }
    if !all_finite(a) {
        return Err(LinalgError::NonFinite("eigenvalue input"));
    }

    let eigs = to_na_real(a).complex_eigenvalues();
    let eigs: Vec<Complex64> = eigs.iter().map(|e| Complex64::new(e.re, e.im)).collect();
    if eigs.iter().any(|e| !e.re.is_finite() || !e.im.is_finite()) {
        return Err(LinalgError::NonFinite("eigenvalues"));
    }
    Ok(eigs)
}
