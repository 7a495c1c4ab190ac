//! Pole set abstraction for Vector Fitting
//!
//! Poles are kept as a tagged union of real poles and complex conjugate
//! pairs, so a complex pole can never exist without its conjugate. Only the
//! member with positive imaginary part is stored; the conjugate is implicit.

use num_complex::Complex64;

use super::constants::{CONJUGATE_MATCH_TOLERANCE, REAL_POLE_TOLERANCE};
use super::error::{Result, VectorFittingError};
use crate::constants::NEAR_ZERO;

/// A single real pole or a complex conjugate pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pole {
    Real(f64),
    /// `p` and `conj(p)`, stored with `p.im > 0`
    ComplexPair(Complex64),
}

impl Pole {
    /// Number of scalar poles represented (1 or 2)
    #[inline]
    pub fn multiplicity(&self) -> usize {
        match self {
            Pole::Real(_) => 1,
            Pole::ComplexPair(_) => 2,
        }
    }

    /// The stored pole value (upper half-plane member for pairs)
    #[inline]
    pub fn value(&self) -> Complex64 {
        match *self {
            Pole::Real(a) => Complex64::new(a, 0.0),
            Pole::ComplexPair(p) => p,
        }
    }

    fn scaled(self, factor: f64) -> Self {
        match self {
            Pole::Real(a) => Pole::Real(a * factor),
            Pole::ComplexPair(p) => Pole::ComplexPair(p * factor),
        }
    }
}

fn is_real(p: Complex64) -> bool {
    p.im.abs() <= REAL_POLE_TOLERANCE * p.norm().max(1.0)
}

/// An ordered set of poles
///
/// Canonical order: real poles by ascending magnitude, then conjugate pairs
/// by ascending imaginary part.
#[derive(Debug, Clone, PartialEq)]
pub struct PoleSet {
    poles: Vec<Pole>,
}

impl PoleSet {
    /// Create a PoleSet from separate real and complex pole vectors
    ///
    /// Complex poles are given by their upper half-plane member; a negative
    /// imaginary part is folded to its conjugate.
    pub fn from_parts(real_poles: Vec<f64>, complex_poles: Vec<Complex64>) -> Self {
        let poles = real_poles
            .into_iter()
            .map(Pole::Real)
            .chain(
                complex_poles
                    .into_iter()
                    .map(|p| Pole::ComplexPair(Complex64::new(p.re, p.im.abs()))),
            )
            .collect();
        Self::canonical(poles)
    }

    /// Create a PoleSet from a flat list of complex poles
    ///
    /// Every pole with a non-negligible imaginary part must be matched by its
    /// conjugate somewhere in the list.
    pub fn from_complex(poles: &[Complex64]) -> Result<Self> {
        let mut reals = Vec::new();
        let mut upper = Vec::new();
        let mut lower = Vec::new();

        for &p in poles {
            if !p.is_finite() {
                return Err(VectorFittingError::config(format!(
                    "starting pole {} is not finite",
                    p
                )));
            }
            if is_real(p) {
                reals.push(p.re);
            } else if p.im > 0.0 {
                upper.push(p);
            } else {
                lower.push(p);
            }
        }

        for &p in &upper {
            let tol = CONJUGATE_MATCH_TOLERANCE * p.norm().max(1.0);
            let partner = lower.iter().position(|q| (q - p.conj()).norm() <= tol);
            match partner {
                Some(idx) => {
                    lower.swap_remove(idx);
                }
                None => {
                    return Err(VectorFittingError::config(format!(
                        "starting pole {} has no conjugate partner",
                        p
                    )))
                }
            }
        }
        if let Some(p) = lower.first() {
            return Err(VectorFittingError::config(format!(
                "starting pole {} has no conjugate partner",
                p
            )));
        }

        Ok(Self::from_parts(reals, upper))
    }

    /// Build the relocated pole set from the eigenvalues of a real matrix
    ///
    /// Unstable eigenvalues (non-negative real part) are reflected into the
    /// left half-plane. Lower half-plane eigenvalues are dropped since their
    /// upper partner represents the pair.
    pub fn from_eigenvalues(eigenvalues: &[Complex64]) -> Self {
        let poles = eigenvalues
            .iter()
            .filter_map(|&e| {
                let re = -e.re.abs();
                if is_real(e) {
                    Some(Pole::Real(re))
                } else if e.im > 0.0 {
                    Some(Pole::ComplexPair(Complex64::new(re, e.im)))
                } else {
                    None
                }
            })
            .collect();
        Self::canonical(poles)
    }

    fn canonical(mut poles: Vec<Pole>) -> Self {
        poles.sort_by(|a, b| match (a, b) {
            (Pole::Real(x), Pole::Real(y)) => x.abs().total_cmp(&y.abs()),
            (Pole::Real(_), Pole::ComplexPair(_)) => std::cmp::Ordering::Less,
            (Pole::ComplexPair(_), Pole::Real(_)) => std::cmp::Ordering::Greater,
            (Pole::ComplexPair(p), Pole::ComplexPair(q)) => p.im.total_cmp(&q.im),
        });
        Self { poles }
    }

    /// Number of real poles
    #[inline]
    pub fn n_real(&self) -> usize {
        self.poles
            .iter()
            .filter(|p| matches!(p, Pole::Real(_)))
            .count()
    }

    /// Number of complex pole pairs
    #[inline]
    pub fn n_complex(&self) -> usize {
        self.poles.len() - self.n_real()
    }

    /// Number of entries (real poles + complex pairs)
    #[inline]
    pub fn len(&self) -> usize {
        self.poles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poles.is_empty()
    }

    /// Model order = n_real + 2 * n_complex
    ///
    /// This is the number of scalar poles and the dimension of the
    /// state-space representation.
    #[inline]
    pub fn model_order(&self) -> usize {
        self.poles.iter().map(Pole::multiplicity).sum()
    }

    /// Iterate over the entries in canonical order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Pole> + '_ {
        self.poles.iter()
    }

    /// Flat list of every scalar pole, each conjugate right after its partner
    pub fn expand(&self) -> Vec<Complex64> {
        let mut out = Vec::with_capacity(self.model_order());
        for pole in &self.poles {
            match *pole {
                Pole::Real(a) => out.push(Complex64::new(a, 0.0)),
                Pole::ComplexPair(p) => {
                    out.push(p);
                    out.push(p.conj());
                }
            }
        }
        out
    }

    /// Multiply every pole by `factor` (frequency (de)normalization)
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            poles: self.poles.iter().map(|p| p.scaled(factor)).collect(),
        }
    }

    /// Largest relative distance from a pole of `other` to the nearest pole
    /// of `self`
    ///
    /// Returns infinity when the two sets have different model orders.
    pub fn max_relative_displacement(&self, other: &PoleSet) -> f64 {
        if self.model_order() != other.model_order() {
            return f64::INFINITY;
        }
        let old = self.expand();
        other
            .expand()
            .iter()
            .map(|p| {
                old.iter()
                    .map(|q| (p - q).norm() / q.norm().max(NEAR_ZERO))
                    .fold(f64::INFINITY, f64::min)
            })
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pole_set_from_parts() {
        let ps = PoleSet::from_parts(
            vec![-2e9, -1e9],
            vec![Complex64::new(-0.3e9, 2e9), Complex64::new(-0.5e9, 1e9)],
        );

        assert_eq!(ps.n_real(), 2);
        assert_eq!(ps.n_complex(), 2);
        assert_eq!(ps.len(), 4);
        assert_eq!(ps.model_order(), 6); // 2 + 2*2 = 6

        // Canonical ordering
        let entries: Vec<Pole> = ps.iter().copied().collect();
        assert_eq!(entries[0], Pole::Real(-1e9));
        assert_eq!(entries[1], Pole::Real(-2e9));
        assert_eq!(entries[2], Pole::ComplexPair(Complex64::new(-0.5e9, 1e9)));
        assert_eq!(entries[3], Pole::ComplexPair(Complex64::new(-0.3e9, 2e9)));
    }

    #[test]
    fn test_from_parts_folds_lower_half_plane() {
        let ps = PoleSet::from_parts(vec![], vec![Complex64::new(-0.1, -1.0)]);
        assert_eq!(ps.expand(), vec![Complex64::new(-0.1, 1.0), Complex64::new(-0.1, -1.0)]);
    }

    #[test]
    fn test_from_complex_pairs_conjugates() {
        let poles = vec![
            Complex64::new(-0.1, -1.0),
            Complex64::new(-3.0, 0.0),
            Complex64::new(-0.1, 1.0),
        ];
        let ps = PoleSet::from_complex(&poles).unwrap();
        assert_eq!(ps.n_real(), 1);
        assert_eq!(ps.n_complex(), 1);
        assert_eq!(ps.model_order(), 3);
    }

    #[test]
    fn test_from_complex_missing_conjugate() {
        let poles = vec![Complex64::new(-0.1, 1.0), Complex64::new(-0.2, -1.0)];
        let err = PoleSet::from_complex(&poles).unwrap_err();
        assert!(matches!(err, VectorFittingError::Configuration(_)));
    }

    #[test]
    fn test_from_complex_unpaired_lower() {
        let poles = vec![Complex64::new(-1.0, 0.0), Complex64::new(-0.2, -1.0)];
        assert!(PoleSet::from_complex(&poles).is_err());
    }

    #[test]
    fn test_from_eigenvalues_reflects_unstable() {
        let eigs = vec![
            Complex64::new(2.0, 0.0),
            Complex64::new(0.5, 3.0),
            Complex64::new(0.5, -3.0),
            Complex64::new(-1.0, 0.0),
        ];
        let ps = PoleSet::from_eigenvalues(&eigs);
        assert_eq!(ps.model_order(), 4);
        for p in ps.expand() {
            assert!(p.re < 0.0, "pole {} should be stable", p);
        }
        let entries: Vec<Pole> = ps.iter().copied().collect();
        assert_eq!(entries[0], Pole::Real(-1.0));
        assert_eq!(entries[1], Pole::Real(-2.0));
        assert_eq!(entries[2], Pole::ComplexPair(Complex64::new(-0.5, 3.0)));
    }

    #[test]
    fn test_expand_keeps_conjugates_adjacent() {
        let ps = PoleSet::from_parts(vec![-1.0], vec![Complex64::new(-0.5, 1.0)]);
        let flat = ps.expand();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[1], flat[2].conj());
    }

    #[test]
    fn test_scaled() {
        let ps = PoleSet::from_parts(vec![-1.0], vec![Complex64::new(-0.5, 1.0)]);
        let scaled = ps.scaled(10.0);
        assert_eq!(
            scaled.expand(),
            vec![
                Complex64::new(-10.0, 0.0),
                Complex64::new(-5.0, 10.0),
                Complex64::new(-5.0, -10.0),
            ]
        );
    }

    #[test]
    fn test_max_relative_displacement() {
        let a = PoleSet::from_parts(vec![-1.0, -2.0], vec![]);
        let b = PoleSet::from_parts(vec![-1.1, -2.0], vec![]);
        assert_relative_eq!(a.max_relative_displacement(&b), 0.1, epsilon = 1e-12);
        assert_eq!(a.max_relative_displacement(&a), 0.0);

        let c = PoleSet::from_parts(vec![-1.0], vec![]);
        assert!(a.max_relative_displacement(&c).is_infinite());
    }
}
