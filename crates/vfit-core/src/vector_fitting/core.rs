//! Core VectorFitting struct and main fitting routine

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use ndarray::Array2;
use num_complex::Complex64;
use tracing::{debug, info, warn};

use super::algorithms::{self, InitPoleSpacing, ResidueIdentification};
use super::constants::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use super::error::{Result, VectorFittingError};
use super::model::FittedModel;
use super::poles::PoleSet;
use crate::sample::Sample;

/// Fitting parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Maximum iterations for pole relocation
    pub max_iterations: usize,

    /// Convergence tolerance on the relative pole displacement
    pub tolerance: f64,

    /// Include a constant term `d` in the fit
    pub fit_constant: bool,

    /// Include a proportional term `h·s` in the fit
    pub fit_proportional: bool,

    /// Spacing of automatically generated starting poles; ignored when the
    /// caller supplied the starting poles
    pub init_spacing: InitPoleSpacing,

    /// Let the constant term of sigma float (relaxed non-triviality
    /// constraint) instead of fixing it to one
    pub relax: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            fit_constant: true,
            fit_proportional: false,
            init_spacing: InitPoleSpacing::Linear,
            relax: true,
        }
    }
}

/// Where a fitting run stands
///
/// `Converged`, `Exhausted` and `Cancelled` leave a usable model; `Failed`
/// does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    /// Starting poles set, no residues yet
    Initialized,
    /// Pole relocation in progress
    Iterating,
    /// Pole displacement fell below the tolerance
    Converged { iterations: usize },
    /// Iteration budget spent without convergence (best-effort model)
    Exhausted { iterations: usize },
    /// Stopped by the caller between iterations
    Cancelled { iterations: usize },
    /// A stage hit a numerical degeneracy; no model
    Failed,
}

impl FitState {
    /// True for terminal states that leave a usable model
    pub fn has_model(&self) -> bool {
        matches!(
            self,
            FitState::Converged { .. } | FitState::Exhausted { .. } | FitState::Cancelled { .. }
        )
    }
}

/// Vector Fitting run: input samples, starting poles and fitted model
#[derive(Debug, Clone)]
pub struct VectorFitting {
    samples: Vec<Sample>,
    n_channels: usize,
    order: usize,

    /// Caller-supplied starting poles in normalized frequency units;
    /// `None` means they are generated from `options.init_spacing`
    explicit_poles: Option<PoleSet>,

    /// Normalized frequencies `s_i / norm`
    freqs_norm: Vec<Complex64>,

    /// Stacked responses [n_channels, n_samples]
    responses: Array2<Complex64>,

    /// Frequency normalization factor (mean |s|)
    norm: f64,

    options: FitOptions,
    state: FitState,
    model: Option<FittedModel>,

    /// Wall-clock time of last fit (in seconds)
    wall_clock_time: f64,
}

impl VectorFitting {
    /// Create a fitter with starting poles generated automatically
    ///
    /// # Arguments
    /// * `samples` - Data to be fitted
    /// * `order` - Number of poles of the approximation
    pub fn new(samples: Vec<Sample>, order: usize) -> Result<Self> {
        Self::with_spacing(samples, order, InitPoleSpacing::default())
    }

    /// Create a fitter with automatically generated starting poles using the
    /// given spacing
    pub fn with_spacing(
        samples: Vec<Sample>,
        order: usize,
        spacing: InitPoleSpacing,
    ) -> Result<Self> {
        let mut vf = Self::validated(samples, order)?;
        vf.options.init_spacing = spacing;
        Ok(vf)
    }

    /// Create a fitter with starting poles provided by the caller
    ///
    /// # Arguments
    /// * `samples` - Data to be fitted
    /// * `poles` - Starting poles; complex poles must come with their conjugate
    /// * `order` - Number of poles, must equal `poles.len()`
    pub fn with_poles(samples: Vec<Sample>, poles: &[Complex64], order: usize) -> Result<Self> {
        if poles.len() != order {
            return Err(VectorFittingError::config(format!(
                "{} starting poles given for order {}",
                poles.len(),
                order
            )));
        }
        let mut vf = Self::validated(samples, order)?;
        vf.explicit_poles = Some(PoleSet::from_complex(poles)?.scaled(1.0 / vf.norm));
        Ok(vf)
    }

    /// Check the inputs and build the normalized working data
    fn validated(samples: Vec<Sample>, order: usize) -> Result<Self> {
        if order == 0 {
            return Err(VectorFittingError::config("order must be positive"));
        }
        let first = samples
            .first()
            .ok_or_else(|| VectorFittingError::config("sample set is empty"))?;
        let n_channels = first.n_channels();
        if n_channels == 0 {
            return Err(VectorFittingError::config("samples have no channels"));
        }
        for (i, sample) in samples.iter().enumerate() {
            if sample.n_channels() != n_channels {
                return Err(VectorFittingError::config(format!(
                    "sample {} has {} channels, expected {}",
                    i,
                    sample.n_channels(),
                    n_channels
                )));
            }
            if !sample.is_finite() {
                return Err(VectorFittingError::config(format!(
                    "sample {} contains non-finite values",
                    i
                )));
            }
        }

        // Normalize frequencies for numerical stability
        let norm = samples.iter().map(|s| s.freq.norm()).sum::<f64>() / samples.len() as f64;
        let norm = if norm > 0.0 { norm } else { 1.0 };
        let freqs_norm = samples.iter().map(|s| s.freq / norm).collect();

        let responses =
            Array2::from_shape_fn((n_channels, samples.len()), |(m, i)| samples[i].values[m]);

        Ok(Self {
            samples,
            n_channels,
            order,
            explicit_poles: None,
            freqs_norm,
            responses,
            norm,
            options: FitOptions::default(),
            state: FitState::Initialized,
            model: None,
            wall_clock_time: 0.0,
        })
    }

    /// Replace the fitting parameters
    ///
    /// Automatically generated starting poles follow the new
    /// `init_spacing`, including a spacing chosen by [`VectorFitting::with_spacing`].
    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    /// Fitting parameters, editable between runs
    pub fn options_mut(&mut self) -> &mut FitOptions {
        &mut self.options
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Starting poles of the next run, normalized
    fn initial_poles(&self) -> PoleSet {
        match &self.explicit_poles {
            Some(poles) => poles.clone(),
            None => {
                algorithms::init_poles(&self.freqs_norm, self.order, self.options.init_spacing)
            }
        }
    }

    /// Run the fit to a terminal state
    ///
    /// Always restarts from the starting poles. Returns the terminal state;
    /// a stage failure leaves the fitter in [`FitState::Failed`] and returns
    /// the error.
    ///
    /// On noiseless data an order above the number of poles the data actually
    /// has makes the least-squares systems rank deficient, and the run fails
    /// with [`VectorFittingError::NumericalDegeneracy`]. Lower the order when
    /// that happens.
    pub fn fit(&mut self) -> Result<FitState> {
        self.fit_until(|_| false)
    }

    /// Run the fit, checking `cancel` between iterations
    pub fn fit_with_cancel(&mut self, cancel: &AtomicBool) -> Result<FitState> {
        self.fit_until(|_| cancel.load(Ordering::Relaxed))
    }

    /// Run the fit, stopping before the next iteration once `stop` returns
    /// true for the number of completed iterations
    fn fit_until(&mut self, stop: impl Fn(usize) -> bool) -> Result<FitState> {
        let timer_start = Instant::now();
        self.model = None;
        self.state = FitState::Iterating;

        let result = self.run(stop);
        self.wall_clock_time = timer_start.elapsed().as_secs_f64();

        match result {
            Ok((state, poles, identified)) => {
                self.model = Some(self.denormalize(poles, identified));
                self.state = state;
                match state {
                    FitState::Exhausted { iterations } => {
                        warn!(iterations, "vector fitting did not converge")
                    }
                    _ => info!(?state, seconds = self.wall_clock_time, "vector fitting finished"),
                }
                Ok(state)
            }
            Err(e) => {
                self.state = FitState::Failed;
                warn!(error = %e, "vector fitting failed");
                Err(e)
            }
        }
    }

    fn run(
        &self,
        stop: impl Fn(usize) -> bool,
    ) -> Result<(FitState, PoleSet, ResidueIdentification)> {
        let opts = &self.options;
        let mut poles = self.initial_poles();
        let mut identified = None;
        let mut terminal = None;
        let mut completed = 0;

        for iteration in 1..=opts.max_iterations {
            if stop(completed) {
                terminal = Some(FitState::Cancelled {
                    iterations: completed,
                });
                break;
            }

            let relocated =
                algorithms::identify_poles(&poles, &self.freqs_norm, &self.responses, opts)?;
            let residues = algorithms::identify_residues(
                &relocated.poles,
                &self.freqs_norm,
                &self.responses,
                opts,
            )?;

            let displacement = poles.max_relative_displacement(&relocated.poles);
            debug!(
                iteration,
                displacement,
                sigma_constant = relocated.sigma_constant,
                condition = relocated.condition,
                "pole relocation"
            );

            poles = relocated.poles;
            identified = Some(residues);
            completed = iteration;

            if displacement < opts.tolerance {
                terminal = Some(FitState::Converged {
                    iterations: iteration,
                });
                break;
            }
        }

        let identified = match identified {
            Some(identified) => identified,
            None => algorithms::identify_residues(&poles, &self.freqs_norm, &self.responses, opts)?,
        };
        let state = terminal.unwrap_or(FitState::Exhausted {
            iterations: completed,
        });

        Ok((state, poles, identified))
    }

    /// Undo the frequency normalization
    fn denormalize(&self, poles: PoleSet, identified: ResidueIdentification) -> FittedModel {
        let norm = self.norm;
        FittedModel::new(
            poles.scaled(norm),
            identified.residues.mapv(|r| r * norm),
            identified.constant,
            identified.proportional.mapv(|h| h / norm),
        )
    }

    /// Current state of the run
    pub fn state(&self) -> FitState {
        self.state
    }

    /// The fitted model
    pub fn model(&self) -> Result<&FittedModel> {
        self.model.as_ref().ok_or(VectorFittingError::ModelNotFitted)
    }

    /// Input samples
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of output channels
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Requested model order
    pub fn order(&self) -> usize {
        self.order
    }

    /// Starting poles in the caller's frequency units
    pub fn starting_poles(&self) -> Vec<Complex64> {
        self.initial_poles().scaled(self.norm).expand()
    }

    /// Wall-clock time of the last fit in seconds
    pub fn wall_clock_time(&self) -> f64 {
        self.wall_clock_time
    }

    /// Evaluate every channel of the model at the complex frequency `freq`
    pub fn predict_response(&self, freq: Complex64) -> Result<Vec<Complex64>> {
        Ok(self.model()?.predict_response(freq))
    }

    /// Model evaluated at every original sample frequency
    pub fn fitted_samples(&self) -> Result<Vec<Sample>> {
        Ok(self.model()?.fitted_samples(&self.samples))
    }

    /// Fitted poles, conjugates adjacent to their partners
    pub fn poles(&self) -> Result<Vec<Complex64>> {
        Ok(self.model()?.poles())
    }

    /// Fitted residues, channel by channel, aligned with [`VectorFitting::poles`]
    pub fn residues(&self) -> Result<Vec<Complex64>> {
        Ok(self.model()?.residues())
    }

    /// Root-mean-square error over all channels and samples
    pub fn rmse(&self) -> Result<f64> {
        Ok(self.model()?.rmse(&self.samples))
    }

    /// Largest absolute deviation over all channels and samples
    pub fn max_error(&self) -> Result<f64> {
        Ok(self.model()?.max_error(&self.samples))
    }

    /// Number of scalar poles in the fitted model
    pub fn model_order(&self) -> Option<usize> {
        self.model.as_ref().map(FittedModel::model_order)
    }
}
