//! vfit-core: Vector Fitting of complex frequency responses
//!
//! Fits multi-channel frequency-domain samples with a rational model made of
//! simple poles plus optional constant and proportional terms.
//!
//! ## Modules
//!
//! - `sample` - Frequency-response samples
//! - `math` - Linear algebra layer (least squares, QR, eigenvalues)
//! - `vector_fitting` - Pole/residue identification and the fitting loop

pub mod constants;
pub mod math;
pub mod sample;
pub mod vector_fitting;

pub use sample::Sample;
pub use vector_fitting::{
    FitOptions, FitState, FittedModel, InitPoleSpacing, VectorFitting, VectorFittingError,
};
