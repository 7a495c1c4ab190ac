//! Core algorithms for Vector Fitting
//!
//! Implements starting pole generation, pole identification (QR-reduced
//! sigma system + eigenvalue extraction) and residue identification (least
//! squares with the poles held fixed).
//!
//! Both stages are pure functions of `(poles, frequencies, responses)`. The
//! working matrices are rebuilt on every call.

use ndarray::{s, Array1, Array2};
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, trace};

use super::constants::{
    COMPLEX_POLE_DAMPING_RATIO, MIN_FREQUENCY_FRACTION, SIGMA_CONSTANT_HIGH, SIGMA_CONSTANT_LOW,
};
use super::core::FitOptions;
use super::error::{Result, Stage, VectorFittingError};
use super::poles::{Pole, PoleSet};
use crate::math::linalg::{eigenvalues, lstsq, qr_reduce, scale_columns, stack_real_imag};

/// Initial pole spacing type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitPoleSpacing {
    #[default]
    Linear,
    Logarithmic,
}

/// Result of one pole identification step
#[derive(Debug, Clone)]
pub struct PoleIdentification {
    /// Relocated poles (zeros of sigma), same order as the input
    pub poles: PoleSet,
    /// Constant term d̃ of the sigma function
    pub sigma_constant: f64,
    /// Condition number of the solved sigma system
    pub condition: f64,
}

/// Result of one residue identification step
#[derive(Debug, Clone)]
pub struct ResidueIdentification {
    /// Residues [n_channels, model_order], aligned with `PoleSet::expand`
    pub residues: Array2<Complex64>,
    pub constant: Array1<f64>,
    pub proportional: Array1<f64>,
    pub condition: f64,
}

/// Generate starting poles across the frequency range
///
/// `order / 2` complex pairs `-β/100 ± jβ` plus one real pole `-β` when
/// `order` is odd, with `β` spread over `[min |s|, max |s|]`.
pub fn init_poles(freqs: &[Complex64], order: usize, spacing: InitPoleSpacing) -> PoleSet {
    if freqs.is_empty() || order == 0 {
        return PoleSet::from_parts(Vec::new(), Vec::new());
    }

    let f_max = freqs.iter().map(|s| s.norm()).fold(0.0, f64::max);
    let f_min = freqs.iter().map(|s| s.norm()).fold(f64::INFINITY, f64::min);

    let f_max = if f_max > 0.0 { f_max } else { 1.0 };
    // Poles cannot be at f=0
    let f_min = if f_min > 0.0 {
        f_min
    } else {
        f_max * MIN_FREQUENCY_FRACTION
    };

    let spaced = |n: usize| match spacing {
        InitPoleSpacing::Linear => linspace(f_min, f_max, n),
        InitPoleSpacing::Logarithmic => logspace(f_min, f_max, n),
    };

    let real_poles = spaced(order % 2).into_iter().map(|w| -w).collect();
    let complex_poles = spaced(order / 2)
        .into_iter()
        .map(|w| Complex64::new(-COMPLEX_POLE_DAMPING_RATIO * w, w))
        .collect();

    PoleSet::from_parts(real_poles, complex_poles)
}

/// Real-valued partial fraction basis `[N, model_order]`
///
/// A real pole `a` contributes `1/(s-a)`. A pair `(p, conj(p))` contributes
/// `1/(s-p) + 1/(s-conj(p))` and `j/(s-p) - j/(s-conj(p))`, so that the
/// coefficients `(c', c'')` of these columns are the real and imaginary parts
/// of the residue of `p`.
pub fn pole_basis(poles: &PoleSet, freqs: &[Complex64]) -> Array2<Complex64> {
    let mut phi = Array2::<Complex64>::zeros((freqs.len(), poles.model_order()));

    for (i, &s_i) in freqs.iter().enumerate() {
        let mut col = 0;
        for pole in poles.iter() {
            match *pole {
                Pole::Real(a) => {
                    phi[[i, col]] = (s_i - a).inv();
                    col += 1;
                }
                Pole::ComplexPair(p) => {
                    let term1 = (s_i - p).inv();
                    let term2 = (s_i - p.conj()).inv();
                    phi[[i, col]] = term1 + term2;
                    phi[[i, col + 1]] = Complex64::i() * (term1 - term2);
                    col += 2;
                }
            }
        }
    }

    phi
}

/// `[Φ, 1, s]` with the constant and proportional columns as enabled
fn direct_columns(
    phi: &Array2<Complex64>,
    freqs: &[Complex64],
    options: &FitOptions,
) -> Array2<Complex64> {
    let n = phi.ncols();
    let n_cols = n + usize::from(options.fit_constant) + usize::from(options.fit_proportional);
    let mut a = Array2::<Complex64>::zeros((freqs.len(), n_cols));
    a.slice_mut(s![.., ..n]).assign(phi);

    let mut col = n;
    if options.fit_constant {
        a.column_mut(col).fill(Complex64::new(1.0, 0.0));
        col += 1;
    }
    if options.fit_proportional {
        for (i, &s_i) in freqs.iter().enumerate() {
            a[[i, col]] = s_i;
        }
    }
    a
}

/// Identify new poles from the current ones
///
/// Solves for the sigma function `σ(s) = Σ c̃_k φ_k(s) + d̃` such that
/// `σ·f_m` is representable on the current pole basis for every channel,
/// then returns the zeros of σ as the relocated poles.
pub fn identify_poles(
    poles: &PoleSet,
    freqs: &[Complex64],
    responses: &Array2<Complex64>,
    options: &FitOptions,
) -> Result<PoleIdentification> {
    let stage = Stage::PoleIdentification;
    if responses.ncols() == 0 || responses.nrows() == 0 || poles.is_empty() {
        return Err(VectorFittingError::degenerate(stage, "empty input"));
    }
    if responses.ncols() != freqs.len() {
        return Err(VectorFittingError::degenerate(
            stage,
            format!(
                "{} frequencies for {} response samples",
                freqs.len(),
                responses.ncols()
            ),
        ));
    }

    let n = poles.model_order();
    let phi = pole_basis(poles, freqs);
    let direct = direct_columns(&phi, freqs, options);

    let (c_res, d_res, condition) = if options.relax {
        let relaxed = solve_sigma(&phi, &direct, responses, None)?;
        let d_res = relaxed.1;
        if d_res.abs() < SIGMA_CONSTANT_LOW || d_res.abs() > SIGMA_CONSTANT_HIGH {
            let fixed = d_res.abs().clamp(SIGMA_CONSTANT_LOW, SIGMA_CONSTANT_HIGH).copysign(d_res);
            debug!(d_res, fixed, "sigma constant out of range, solving with fixed value");
            solve_sigma(&phi, &direct, responses, Some(fixed))?
        } else {
            relaxed
        }
    } else {
        solve_sigma(&phi, &direct, responses, Some(1.0))?
    };

    // State matrix of sigma: A - b·c̃ᵀ/d̃
    let mut h_matrix = Array2::<f64>::zeros((n, n));
    let mut b = Array1::<f64>::zeros(n);
    let mut col = 0;
    for pole in poles.iter() {
        match *pole {
            Pole::Real(a) => {
                h_matrix[[col, col]] = a;
                b[col] = 1.0;
                col += 1;
            }
            Pole::ComplexPair(p) => {
                h_matrix[[col, col]] = p.re;
                h_matrix[[col, col + 1]] = p.im;
                h_matrix[[col + 1, col]] = -p.im;
                h_matrix[[col + 1, col + 1]] = p.re;
                b[col] = 2.0;
                col += 2;
            }
        }
    }
    for i in 0..n {
        for j in 0..n {
            h_matrix[[i, j]] -= b[i] * c_res[j] / d_res;
        }
    }

    let eigs = eigenvalues(&h_matrix).map_err(VectorFittingError::linalg(stage))?;
    let new_poles = PoleSet::from_eigenvalues(&eigs);
    if new_poles.model_order() != n {
        return Err(VectorFittingError::degenerate(
            stage,
            format!(
                "relocated poles are not conjugate-closed: expected order {}, got {}",
                n,
                new_poles.model_order()
            ),
        ));
    }

    Ok(PoleIdentification {
        poles: new_poles,
        sigma_constant: d_res,
        condition,
    })
}

/// Solve the stacked sigma system for `(c̃, d̃, condition)`
///
/// With `fixed == None` d̃ is an unknown and the system carries the
/// non-triviality row `Re Σ_i σ(s_i) = N`. Otherwise d̃ is fixed and moved to
/// the right-hand side.
fn solve_sigma(
    phi: &Array2<Complex64>,
    direct: &Array2<Complex64>,
    responses: &Array2<Complex64>,
    fixed: Option<f64>,
) -> Result<(Array1<f64>, f64, f64)> {
    let stage = Stage::PoleIdentification;
    let n = phi.ncols();
    let n_freqs = phi.nrows();
    let n_direct = direct.ncols();
    let n_sigma = if fixed.is_some() { n } else { n + 1 };

    // Per channel: eliminate the direct unknowns by QR, keep the R22 block
    let blocks = (0..responses.nrows())
        .into_par_iter()
        .map(|m| {
            let f = responses.row(m);
            let mut a = Array2::<Complex64>::zeros((n_freqs, n_direct + n_sigma));
            a.slice_mut(s![.., ..n_direct]).assign(direct);
            for i in 0..n_freqs {
                for k in 0..n {
                    a[[i, n_direct + k]] = -f[i] * phi[[i, k]];
                }
                if fixed.is_none() {
                    a[[i, n_direct + n]] = -f[i];
                }
            }
            let a = stack_real_imag(&a);
            let rhs = fixed.map(|d| {
                stack_real_imag(&Array2::from_shape_fn((n_freqs, 1), |(i, _)| f[i] * d))
            });

            let (r, qtb) = qr_reduce(&a, rhs.as_ref()).map_err(VectorFittingError::linalg(stage))?;
            let top = n_direct.min(r.nrows());
            let r22 = r.slice(s![top.., n_direct..]).to_owned();
            let b22 = match fixed {
                Some(_) => qtb.slice(s![top.., ..]).to_owned(),
                None => Array2::zeros((r22.nrows(), 1)),
            };
            Ok((r22, b22))
        })
        .collect::<Result<Vec<_>>>()?;

    let extra = usize::from(fixed.is_none());
    let n_rows = blocks.iter().map(|(r, _)| r.nrows()).sum::<usize>() + extra;
    let mut a = Array2::<f64>::zeros((n_rows, n_sigma));
    let mut b = Array2::<f64>::zeros((n_rows, 1));

    let mut row = 0;
    for (r22, b22) in &blocks {
        let h = r22.nrows();
        a.slice_mut(s![row..row + h, ..]).assign(r22);
        b.slice_mut(s![row..row + h, ..]).assign(b22);
        row += h;
    }

    if fixed.is_none() {
        // Non-triviality constraint, weighted to the size of the data
        let weight =
            responses.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt() / n_freqs as f64;
        for k in 0..n {
            a[[row, k]] = weight * phi.column(k).iter().map(|v| v.re).sum::<f64>();
        }
        a[[row, n]] = weight * n_freqs as f64;
        b[[row, 0]] = weight * n_freqs as f64;
    }

    trace!(rows = n_rows, cols = n_sigma, "solving sigma system");

    let scale = scale_columns(&mut a);
    let solved = lstsq(&a, &b).map_err(VectorFittingError::linalg(stage))?;
    trace!(
        condition = solved.condition,
        min_singular_value = min_singular_value(&solved.singular_values),
        "sigma system solved"
    );
    let x: Array1<f64> = solved
        .solution
        .column(0)
        .iter()
        .zip(scale.iter())
        .map(|(v, f)| v * f)
        .collect();

    match fixed {
        Some(d) => Ok((x, d, solved.condition)),
        None => {
            let d = x[n];
            Ok((x.slice(s![..n]).to_owned(), d, solved.condition))
        }
    }
}

/// Identify residues and constant/proportional terms for fixed poles
///
/// All channels share the same basis matrix, so the system is factorized once
/// and solved for one right-hand side per channel.
pub fn identify_residues(
    poles: &PoleSet,
    freqs: &[Complex64],
    responses: &Array2<Complex64>,
    options: &FitOptions,
) -> Result<ResidueIdentification> {
    let stage = Stage::ResidueIdentification;
    let n_channels = responses.nrows();
    if responses.ncols() == 0 || n_channels == 0 || poles.is_empty() {
        return Err(VectorFittingError::degenerate(stage, "empty input"));
    }
    if responses.ncols() != freqs.len() {
        return Err(VectorFittingError::degenerate(
            stage,
            format!(
                "{} frequencies for {} response samples",
                freqs.len(),
                responses.ncols()
            ),
        ));
    }

    let n = poles.model_order();
    let phi = pole_basis(poles, freqs);
    let mut a = stack_real_imag(&direct_columns(&phi, freqs, options));
    let b = stack_real_imag(&responses.t().to_owned());

    let scale = scale_columns(&mut a);
    let solved = lstsq(&a, &b).map_err(VectorFittingError::linalg(stage))?;
    trace!(
        condition = solved.condition,
        min_singular_value = min_singular_value(&solved.singular_values),
        "residue system solved"
    );
    let mut x = solved.solution;
    for (k, &factor) in scale.iter().enumerate() {
        x.row_mut(k).mapv_inplace(|v| v * factor);
    }

    let mut residues = Array2::<Complex64>::zeros((n_channels, n));
    let mut constant = Array1::<f64>::zeros(n_channels);
    let mut proportional = Array1::<f64>::zeros(n_channels);

    for m in 0..n_channels {
        let mut col = 0;
        for pole in poles.iter() {
            match pole {
                Pole::Real(_) => {
                    residues[[m, col]] = Complex64::new(x[[col, m]], 0.0);
                    col += 1;
                }
                Pole::ComplexPair(_) => {
                    let r = Complex64::new(x[[col, m]], x[[col + 1, m]]);
                    residues[[m, col]] = r;
                    residues[[m, col + 1]] = r.conj();
                    col += 2;
                }
            }
        }
        if options.fit_constant {
            constant[m] = x[[col, m]];
            col += 1;
        }
        if options.fit_proportional {
            proportional[m] = x[[col, m]];
        }
    }

    Ok(ResidueIdentification {
        residues,
        constant,
        proportional,
        condition: solved.condition,
    })
}

// Helper functions

fn min_singular_value(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::INFINITY, f64::min)
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return vec![];
    }
    if n == 1 {
        return vec![(start + end) / 2.0];
    }
    (0..n)
        .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
        .collect()
}

fn logspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n == 0 || start <= 0.0 || end <= 0.0 {
        return linspace(start, end, n);
    }
    linspace(start.ln(), end.ln(), n)
        .into_iter()
        .map(f64::exp)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn jw(omegas: &[f64]) -> Vec<Complex64> {
        omegas.iter().map(|&w| Complex64::new(0.0, w)).collect()
    }

    /// One channel sampled from `d + Σ r/(s-p)` over the expanded poles
    fn synthesize(
        freqs: &[Complex64],
        poles: &[Complex64],
        residues: &[Complex64],
        d: f64,
    ) -> Array2<Complex64> {
        Array2::from_shape_fn((1, freqs.len()), |(_, i)| {
            poles
                .iter()
                .zip(residues)
                .fold(Complex64::new(d, 0.0), |acc, (&p, &r)| acc + r / (freqs[i] - p))
        })
    }

    /// `1/(s+1) + d`
    fn one_pole(freqs: &[Complex64], d: f64) -> Array2<Complex64> {
        synthesize(freqs, &[Complex64::new(-1.0, 0.0)], &[Complex64::new(1.0, 0.0)], d)
    }

    #[test]
    fn test_init_poles_linear() {
        let freqs = jw(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let poles = init_poles(&freqs, 5, InitPoleSpacing::Linear);

        assert_eq!(poles.model_order(), 5);
        assert_eq!(poles.n_real(), 1);
        assert_eq!(poles.n_complex(), 2);

        let flat = poles.expand();
        // Real pole at the midpoint, pairs at the band edges
        assert_relative_eq!(flat[0].re, -3.0);
        assert_relative_eq!(flat[1].im, 1.0);
        assert_relative_eq!(flat[1].re, -0.01);
        assert_relative_eq!(flat[3].im, 5.0);
        assert!(flat.iter().all(|p| p.re < 0.0));
    }

    #[test]
    fn test_init_poles_log_with_dc() {
        let freqs = jw(&[0.0, 10.0, 100.0, 1000.0]);
        let poles = init_poles(&freqs, 4, InitPoleSpacing::Logarithmic);
        let flat = poles.expand();
        assert_eq!(flat.len(), 4);
        // f_min = 1000 * 1e-6
        assert_relative_eq!(flat[0].im, 1e-3, epsilon = 1e-12);
        assert_relative_eq!(flat[2].im, 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pole_basis_pair_columns() {
        let p = Complex64::new(-0.5, 2.0);
        let poles = PoleSet::from_parts(vec![], vec![p]);
        let s = Complex64::new(0.0, 1.0);
        let phi = pole_basis(&poles, &[s]);

        // c' Φ1 + c'' Φ2 == r/(s-p) + conj(r)/(s-conj(p)) with r = c' + jc''
        let r = Complex64::new(0.7, -0.2);
        let lhs = phi[[0, 0]] * r.re + phi[[0, 1]] * r.im;
        let rhs = r / (s - p) + r.conj() / (s - p.conj());
        assert_relative_eq!(lhs.re, rhs.re, epsilon = 1e-14);
        assert_relative_eq!(lhs.im, rhs.im, epsilon = 1e-14);
    }

    #[test]
    fn test_identify_poles_single_real_pole() {
        // f(s) = 1/(s+1); one relocation from -0.5 lands on -1
        let freqs = jw(&[1.0, 2.0, 3.0]);
        let responses = one_pole(&freqs, 0.0);
        let start = PoleSet::from_parts(vec![-0.5], vec![]);

        let result = identify_poles(&start, &freqs, &responses, &FitOptions::default()).unwrap();
        let poles = result.poles.expand();
        assert_eq!(poles.len(), 1);
        assert_relative_eq!(poles[0].re, -1.0, epsilon = 1e-8);
        assert_relative_eq!(poles[0].im, 0.0);
    }

    #[test]
    fn test_identify_poles_non_relaxed() {
        let freqs = jw(&[1.0, 2.0, 3.0]);
        let responses = one_pole(&freqs, 0.0);
        let start = PoleSet::from_parts(vec![-0.5], vec![]);
        let options = FitOptions {
            relax: false,
            ..FitOptions::default()
        };

        let result = identify_poles(&start, &freqs, &responses, &options).unwrap();
        assert_eq!(result.sigma_constant, 1.0);
        assert_relative_eq!(result.poles.expand()[0].re, -1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_identify_poles_keeps_order_and_pairs() {
        let omegas: Vec<f64> = (1..=40).map(|i| i as f64 * 0.25).collect();
        let freqs = jw(&omegas);
        let p = Complex64::new(-0.3, 4.0);
        let r = Complex64::new(1.0, 0.5);
        let responses = synthesize(
            &freqs,
            &[Complex64::new(-2.0, 0.0), p, p.conj()],
            &[Complex64::new(3.0, 0.0), r, r.conj()],
            0.1,
        );
        let start = init_poles(&freqs, 3, InitPoleSpacing::Linear);

        let result = identify_poles(&start, &freqs, &responses, &FitOptions::default()).unwrap();
        assert_eq!(result.poles.model_order(), 3);
        let flat = result.poles.expand();
        for q in &flat {
            assert!(q.re < 0.0);
            if q.im != 0.0 {
                assert!(flat.contains(&q.conj()));
            }
        }
    }

    #[test]
    fn test_identify_residues_exact() {
        let omegas: Vec<f64> = (1..=20).map(|i| i as f64 * 0.5).collect();
        let freqs = jw(&omegas);
        let p = Complex64::new(-0.4, 3.0);
        let r = Complex64::new(0.8, -0.6);
        let responses = synthesize(
            &freqs,
            &[Complex64::new(-1.0, 0.0), p, p.conj()],
            &[Complex64::new(2.0, 0.0), r, r.conj()],
            0.25,
        );
        let poles = PoleSet::from_parts(vec![-1.0], vec![p]);

        let result = identify_residues(&poles, &freqs, &responses, &FitOptions::default()).unwrap();
        let residues = result.residues.row(0);
        assert_relative_eq!(residues[0].re, 2.0, epsilon = 1e-9);
        assert_relative_eq!(residues[1].re, r.re, epsilon = 1e-9);
        assert_relative_eq!(residues[1].im, r.im, epsilon = 1e-9);
        assert_eq!(residues[2], residues[1].conj());
        assert_relative_eq!(result.constant[0], 0.25, epsilon = 1e-9);
        assert_eq!(result.proportional[0], 0.0);
    }

    #[test]
    fn test_identify_residues_with_proportional() {
        let freqs = jw(&[0.5, 1.0, 2.0, 4.0, 8.0]);
        let mut responses = one_pole(&freqs, 0.5);
        for (i, v) in responses.row_mut(0).iter_mut().enumerate() {
            *v += freqs[i] * 0.1;
        }
        let poles = PoleSet::from_parts(vec![-1.0], vec![]);
        let options = FitOptions {
            fit_proportional: true,
            ..FitOptions::default()
        };

        let result = identify_residues(&poles, &freqs, &responses, &options).unwrap();
        assert_relative_eq!(result.residues[[0, 0]].re, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.constant[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(result.proportional[0], 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_identify_residues_pole_on_sample_is_degenerate() {
        // A pole sitting exactly on a sample frequency makes the basis infinite
        let freqs = jw(&[1.0, 2.0, 3.0]);
        let responses = Array2::from_elem((1, 3), Complex64::new(1.0, 0.0));
        let poles = PoleSet::from_parts(vec![], vec![Complex64::new(0.0, 2.0)]);

        let err =
            identify_residues(&poles, &freqs, &responses, &FitOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            VectorFittingError::NumericalDegeneracy {
                stage: Stage::ResidueIdentification,
                ..
            }
        ));
    }

    #[test]
    fn test_identify_poles_rejects_empty() {
        let poles = PoleSet::from_parts(vec![-1.0], vec![]);
        let responses = Array2::<Complex64>::zeros((1, 0));
        assert!(identify_poles(&poles, &[], &responses, &FitOptions::default()).is_err());
    }

    #[test]
    fn test_linspace() {
        let result = linspace(0.0, 10.0, 5);
        assert_eq!(result.len(), 5);
        assert_relative_eq!(result[0], 0.0);
        assert_relative_eq!(result[4], 10.0);
        assert_relative_eq!(result[2], 5.0);
    }
}
