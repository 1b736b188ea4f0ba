//! coreg-core: rigid-body multi-modal 3D image registration
//!
//! Aligns a source volume to a reference volume by maximizing a
//! histogram-based similarity (mutual information and its normalized
//! variants) over six rigid parameters with a coarse-to-fine Powell search.
//!
//! # Modules
//! - `volume`: flat Fortran-order volumes with a voxel-to-world affine
//! - `quantize`: rescaling to 8 bits with hot-spot clipping
//! - `smoothing`: Gaussian/box kernels, volume and histogram smoothing
//! - `histogram`: jittered joint histogram of two volumes
//! - `cost`: MI / NMI / ECC objective
//! - `rigid`: rigid parameter vector to 4x4 matrix
//! - `solvers`: Brent line search and Powell's method
//! - `coreg`: pyramidal registration entry points
//! - `nifti_io`: NIfTI-1 load/save

pub mod error;
pub mod volume;
pub mod rigid;

// Algorithm modules
pub mod quantize;
pub mod smoothing;
pub mod histogram;
pub mod cost;
pub mod solvers;
pub mod coreg;

// I/O modules
pub mod nifti_io;

pub use coreg::{
    register_rigid, register_rigid_with, register_rigid_with_progress, CoregParams, CoregProgress,
    CoregResult, LevelResult,
};
pub use cost::CostFunction;
pub use error::{CoregError, Result};
pub use quantize::{quantize, Intensity, QuantizeParams};
pub use volume::Volume;
