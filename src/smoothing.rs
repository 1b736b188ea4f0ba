//! Separable smoothing with a Gaussian convolved with a unit box
//!
//! The 1D kernel is the closed-form integral of a Gaussian over one voxel
//! (Gaussian * 0th-degree B-spline), sampled at integer offsets in
//! [-ceil(2*FWHM), ceil(2*FWHM)] and normalized to unit sum.
//!
//! Volumes are smoothed with half-sample symmetric (reflect) padding,
//! `d c b a | a b c d | d c b a`; 2D histograms wrap around.

use statrs::function::erf::erf;

use crate::error::{CoregError, Result};
use crate::volume::Volume;

/// Convert a full-width-half-maximum into a Gaussian standard deviation
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (8.0 * std::f64::consts::LN_2).sqrt()
}

/// Build the normalized 1D smoothing kernel for `fwhm` (in samples)
///
/// Returns a kernel of length `2 * ceil(2 * fwhm) + 1`; `fwhm == 0` gives
/// the identity kernel `[1.0]`.
pub fn smoothing_kernel(fwhm: f64) -> Result<Vec<f64>> {
    if !(fwhm >= 0.0 && fwhm.is_finite()) {
        return Err(CoregError::InvalidParameter(format!(
            "FWHM must be finite and non-negative, got {}",
            fwhm
        )));
    }

    let lim = (2.0 * fwhm).ceil() as i64;
    // Variance from FWHM; epsilon keeps the zero-width case finite
    let s = fwhm * fwhm / (8.0 * std::f64::consts::LN_2) + f64::EPSILON;
    let w1 = 0.5 * (2.0 / s).sqrt();
    let w2 = -0.5 / s;
    let w3 = (s / 2.0 / std::f64::consts::PI).sqrt();

    let mut kernel: Vec<f64> = (-lim..=lim)
        .map(|x| {
            let x = x as f64;
            let v = 0.5
                * (erf(w1 * (x + 1.0)) * (x + 1.0) + erf(w1 * (x - 1.0)) * (x - 1.0)
                    - 2.0 * erf(w1 * x) * x)
                + w3 * ((w2 * (x + 1.0).powi(2)).exp() + (w2 * (x - 1.0).powi(2)).exp()
                    - 2.0 * (w2 * x * x).exp());
            v.max(0.0)
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    Ok(kernel)
}

/// Volume axis for separable filtering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Smooth a volume separably with per-axis FWHM given in voxels
///
/// An axis with zero FWHM is left untouched. The result keeps the input
/// geometry and is returned as `f64`.
pub fn smooth_volume<T: Copy + Into<f64>>(volume: &Volume<T>, fwhm_voxels: [f64; 3]) -> Result<Volume<f64>> {
    let kernels = [
        smoothing_kernel(fwhm_voxels[0])?,
        smoothing_kernel(fwhm_voxels[1])?,
        smoothing_kernel(fwhm_voxels[2])?,
    ];

    let (nx, ny, nz) = volume.dims;
    let mut data: Vec<f64> = volume.data.iter().map(|&v| v.into()).collect();

    for (axis, kernel) in [Axis::X, Axis::Y, Axis::Z].into_iter().zip(kernels.iter()) {
        if kernel.len() > 1 {
            data = convolve_1d_direction(&data, nx, ny, nz, kernel, axis);
        }
    }

    Volume::new(data, volume.dims, volume.affine)
}

/// Mirror an out-of-range index back into `0..n`, repeating the edge sample
fn reflect_index(v: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let v = v.rem_euclid(period);
    if v < n as isize {
        v as usize
    } else {
        (period - 1 - v) as usize
    }
}

/// Apply 1D convolution along one axis with reflect padding
fn convolve_1d_direction(
    data: &[f64],
    nx: usize, ny: usize, nz: usize,
    kernel: &[f64],
    axis: Axis,
) -> Vec<f64> {
    let mut result = vec![0.0f64; nx * ny * nz];
    let radius = ((kernel.len() - 1) / 2) as isize;

    let idx = |i: usize, j: usize, k: usize| i + j * nx + k * nx * ny;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let mut sum = 0.0;
                for (ki, &w) in kernel.iter().enumerate() {
                    let offset = ki as isize - radius;
                    let src = match axis {
                        Axis::X => idx(reflect_index(i as isize + offset, nx), j, k),
                        Axis::Y => idx(i, reflect_index(j as isize + offset, ny), k),
                        Axis::Z => idx(i, j, reflect_index(k as isize + offset, nz)),
                    };
                    sum += data[src] * w;
                }
                result[idx(i, j, k)] = sum;
            }
        }
    }

    result
}

/// Smooth a row-major `rows x cols` grid with circular boundaries
///
/// `fwhm[0]` applies along rows (first index), `fwhm[1]` along columns.
pub fn smooth_2d_wrap(data: &[f64], rows: usize, cols: usize, fwhm: [f64; 2]) -> Result<Vec<f64>> {
    if data.len() != rows * cols {
        return Err(CoregError::InvalidDimensions(format!(
            "grid of {} values is not {}x{}",
            data.len(), rows, cols
        )));
    }
    let k0 = smoothing_kernel(fwhm[0])?;
    let k1 = smoothing_kernel(fwhm[1])?;
    let r0 = ((k0.len() - 1) / 2) as isize;
    let r1 = ((k1.len() - 1) / 2) as isize;

    // Along the first index
    let mut tmp = vec![0.0f64; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            let mut sum = 0.0;
            for (ki, &w) in k0.iter().enumerate() {
                let rr = (r as isize + ki as isize - r0).rem_euclid(rows as isize) as usize;
                sum += data[rr * cols + c] * w;
            }
            tmp[r * cols + c] = sum;
        }
    }

    // Along the second index
    let mut out = vec![0.0f64; rows * cols];
    for r in 0..rows {
        let row = &tmp[r * cols..(r + 1) * cols];
        for c in 0..cols {
            let mut sum = 0.0;
            for (ki, &w) in k1.iter().enumerate() {
                let cc = (c as isize + ki as isize - r1).rem_euclid(cols as isize) as usize;
                sum += row[cc] * w;
            }
            out[r * cols + c] = sum;
        }
    }

    Ok(out)
}
