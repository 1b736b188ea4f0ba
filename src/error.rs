//! Error type shared by every registration stage

use thiserror::Error;

/// Errors raised by quantization, I/O, and registration entry points
///
/// Numerical degeneracy inside the objective (an empty field of view) and
/// optimizer non-convergence are not errors; they surface as
/// [`crate::cost::DEGENERATE_COST`] and a `converged` flag respectively.
#[derive(Error, Debug)]
pub enum CoregError {
    #[error("degenerate intensity range: min = max = {min}")]
    DegenerateIntensityRange { min: f64 },
    #[error("invalid volume dimensions: {0}")]
    InvalidDimensions(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("unknown cost function '{0}' (expected mi, nmi or ecc)")]
    UnknownCostFunction(String),
    #[error("NIfTI error: {0}")]
    Nifti(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoregError>;
