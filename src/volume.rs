//! In-memory 3D volumes
//!
//! Voxels are stored flat in Fortran (column-major) order to match the NIfTI
//! convention: index = x + y*nx + z*nx*ny. The affine maps 0-based voxel
//! indices to world (mm) coordinates.

use nalgebra::Matrix4;

use crate::error::{CoregError, Result};
use crate::rigid::voxel_sizes;

/// A scalar 3D image plus its voxel-to-world affine
#[derive(Clone, Debug)]
pub struct Volume<T> {
    /// Voxel intensities, Fortran order
    pub data: Vec<T>,
    /// Dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Voxel (0-based) to world transform
    pub affine: Matrix4<f64>,
}

impl<T> Volume<T> {
    /// Wrap a voxel buffer, checking that its length matches `dims`
    pub fn new(data: Vec<T>, dims: (usize, usize, usize), affine: Matrix4<f64>) -> Result<Self> {
        let (nx, ny, nz) = dims;
        if data.len() != nx * ny * nz {
            return Err(CoregError::InvalidDimensions(format!(
                "data length {} does not match {}x{}x{}",
                data.len(), nx, ny, nz
            )));
        }
        Ok(Self { data, dims, affine })
    }

    /// Total number of voxels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat index of 0-based voxel (i, j, k)
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.dims.0 + k * self.dims.0 * self.dims.1
    }

    /// Voxel sizes in mm, taken from the affine columns
    pub fn voxel_size(&self) -> [f64; 3] {
        voxel_sizes(&self.affine)
    }

    /// Fail unless every axis has at least two voxels
    ///
    /// Trilinear sampling needs a neighbour along each axis.
    pub fn check_sampleable(&self, name: &str) -> Result<()> {
        let (nx, ny, nz) = self.dims;
        if nx < 2 || ny < 2 || nz < 2 {
            return Err(CoregError::InvalidDimensions(format!(
                "{} volume is {}x{}x{}; registration needs at least 2 voxels per axis",
                name, nx, ny, nz
            )));
        }
        Ok(())
    }
}

impl<T: Copy + Into<f64>> Volume<T> {
    /// Trilinear interpolation at 1-based voxel coordinates
    ///
    /// Caller guarantees 1 <= x < nx (and likewise for y, z) so that the
    /// eight neighbours exist.
    #[inline]
    pub fn sample_trilinear(&self, x: f64, y: f64, z: f64) -> f64 {
        let (nx, ny, _) = self.dims;
        let ix = x.floor();
        let iy = y.floor();
        let iz = z.floor();
        let dx1 = x - ix;
        let dy1 = y - iy;
        let dz1 = z - iz;
        let dx2 = 1.0 - dx1;
        let dy2 = 1.0 - dy1;
        let dz2 = 1.0 - dz1;

        // 1-based floor -> 0-based corner; the +1 neighbours are clamped so a
        // coordinate sitting exactly on the last plane stays in bounds.
        let i0 = ix as usize - 1;
        let j0 = iy as usize - 1;
        let k0 = iz as usize - 1;
        let i1 = (i0 + 1).min(nx - 1);
        let j1 = (j0 + 1).min(ny - 1);
        let k1 = (k0 + 1).min(self.dims.2 - 1);

        let v = |i: usize, j: usize, k: usize| -> f64 { self.data[i + j * nx + k * nx * ny].into() };

        let lower = (v(i0, j0, k0) * dx2 + v(i1, j0, k0) * dx1) * dy2
            + (v(i0, j1, k0) * dx2 + v(i1, j1, k0) * dx1) * dy1;
        let upper = (v(i0, j0, k1) * dx2 + v(i1, j0, k1) * dx1) * dy2
            + (v(i0, j1, k1) * dx2 + v(i1, j1, k1) * dx1) * dy1;

        lower * dz2 + upper * dz1
    }
}
