//! Mathematical functions module
//!
//! Dense linear algebra used by the fitting stages.

pub mod linalg;
