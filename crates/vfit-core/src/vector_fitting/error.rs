//! Error types for Vector Fitting

use std::fmt;

use thiserror::Error;

use crate::math::linalg::LinalgError;

/// Fitting stage that produced a numerical failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PoleIdentification,
    ResidueIdentification,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PoleIdentification => write!(f, "pole identification"),
            Stage::ResidueIdentification => write!(f, "residue identification"),
        }
    }
}

/// Vector Fitting errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorFittingError {
    /// Invalid constructor arguments or input samples
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Singular, rank-deficient or non-finite system in one of the stages
    #[error("numerical degeneracy in {stage}: {reason}")]
    NumericalDegeneracy { stage: Stage, reason: String },

    /// Evaluation requested without a usable fitted model
    #[error("model not fitted yet")]
    ModelNotFitted,
}

impl VectorFittingError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        VectorFittingError::Configuration(msg.into())
    }

    pub(crate) fn degenerate(stage: Stage, reason: impl fmt::Display) -> Self {
        VectorFittingError::NumericalDegeneracy {
            stage,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn linalg(stage: Stage) -> impl Fn(LinalgError) -> Self {
        move |e| match e {
            LinalgError::RankDeficient { .. } => Self::degenerate(
                stage,
                format!("{}; the model order may exceed what the samples support", e),
            ),
            _ => Self::degenerate(stage, e),
        }
    }
}

pub type Result<T> = std::result::Result<T, VectorFittingError>;
