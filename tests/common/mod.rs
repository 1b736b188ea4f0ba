//! Synthetic head phantoms for coreg-core integration tests
//!
//! Phantoms are defined in world coordinates (mm) and rendered through a
//! voxel grid, so a known rigid motion can be baked into a volume exactly.

#![allow(dead_code)]

use coreg_core::rigid::{rigid_inverse, rigid_matrix};
use coreg_core::Volume;
use nalgebra::{Matrix4, Vector4};

/// Tissue classes with modality-specific intensities
#[derive(Clone, Copy, Debug)]
pub enum Tissue {
    Scalp,
    WhiteMatter,
    GreyMatter,
    Ventricle,
    Lesion,
    Nucleus,
    Cyst,
    Vessel,
}

#[derive(Clone, Copy, Debug)]
pub enum Contrast {
    T1,
    T2,
}

impl Contrast {
    pub fn intensity(&self, tissue: Tissue) -> f64 {
        match (self, tissue) {
            (Contrast::T1, Tissue::Scalp) => 300.0,
            (Contrast::T1, Tissue::GreyMatter) => 550.0,
            (Contrast::T1, Tissue::WhiteMatter) => 800.0,
            (Contrast::T1, Tissue::Ventricle) => 120.0,
            (Contrast::T1, Tissue::Lesion) => 420.0,
            (Contrast::T1, Tissue::Nucleus) => 650.0,
            (Contrast::T1, Tissue::Cyst) => 200.0,
            (Contrast::T1, Tissue::Vessel) => 950.0,
            (Contrast::T2, Tissue::Scalp) => 900.0,
            (Contrast::T2, Tissue::GreyMatter) => 1400.0,
            (Contrast::T2, Tissue::WhiteMatter) => 700.0,
            (Contrast::T2, Tissue::Ventricle) => 2600.0,
            (Contrast::T2, Tissue::Lesion) => 2000.0,
            (Contrast::T2, Tissue::Nucleus) => 500.0,
            (Contrast::T2, Tissue::Cyst) => 1800.0,
            (Contrast::T2, Tissue::Vessel) => 300.0,
        }
    }
}

/// Axis-aligned ellipsoid; later entries paint over earlier ones
#[derive(Clone, Copy, Debug)]
pub struct Ellipsoid {
    pub center: [f64; 3],
    pub radii: [f64; 3],
    pub tissue: Tissue,
}

impl Ellipsoid {
    fn contains(&self, p: &[f64; 3]) -> bool {
        (0..3)
            .map(|i| ((p[i] - self.center[i]) / self.radii[i]).powi(2))
            .sum::<f64>()
            < 1.0
    }
}

/// Head-like phantom centred on the world origin
///
/// Nested shells plus off-centre structures 15-25 mm out in every quadrant
/// of the axial plane, so in-plane rotation moves high-contrast edges by
/// more than a voxel.
pub fn head_phantom() -> Vec<Ellipsoid> {
    vec![
        Ellipsoid { center: [0.0, 0.0, 0.0], radii: [30.0, 34.0, 26.0], tissue: Tissue::Scalp },
        Ellipsoid { center: [0.0, 1.0, 1.0], radii: [26.0, 30.0, 22.0], tissue: Tissue::GreyMatter },
        Ellipsoid { center: [1.0, 2.0, 2.0], radii: [20.0, 24.0, 16.0], tissue: Tissue::WhiteMatter },
        Ellipsoid { center: [-5.0, 4.0, 4.0], radii: [4.0, 10.0, 5.0], tissue: Tissue::Ventricle },
        Ellipsoid { center: [6.0, 3.0, 5.0], radii: [3.0, 9.0, 4.0], tissue: Tissue::Ventricle },
        Ellipsoid { center: [12.0, -15.0, -4.0], radii: [5.0, 4.0, 6.0], tissue: Tissue::Lesion },
        Ellipsoid { center: [-17.0, -10.0, 0.0], radii: [4.0, 8.0, 6.0], tissue: Tissue::Nucleus },
        Ellipsoid { center: [13.0, 17.0, -2.0], radii: [7.0, 3.0, 5.0], tissue: Tissue::Cyst },
        Ellipsoid { center: [-8.0, 22.0, 6.0], radii: [4.0, 3.0, 4.0], tissue: Tissue::Vessel },
        Ellipsoid { center: [20.0, 2.0, 8.0], radii: [3.0, 6.0, 4.0], tissue: Tissue::Ventricle },
    ]
}

fn intensity_at(phantom: &[Ellipsoid], contrast: Contrast, p: &[f64; 3]) -> f64 {
    phantom
        .iter()
        .filter(|e| e.contains(p))
        .last()
        .map(|e| contrast.intensity(e.tissue))
        .unwrap_or(0.0)
}

/// Isotropic grid centred on the world origin
pub fn centred_affine(n: usize, voxel_mm: f64) -> Matrix4<f64> {
    let origin = -(n as f64 - 1.0) / 2.0 * voxel_mm;
    Matrix4::new(
        voxel_mm, 0.0, 0.0, origin,
        0.0, voxel_mm, 0.0, origin,
        0.0, 0.0, voxel_mm, origin,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Render the phantom after moving it by `motion` (world mm/radians)
///
/// A voxel at world position `w` shows the phantom at
/// `rigid_matrix(motion)^-1 * w`, so registering the result against an
/// unmoved rendering should recover `motion`. Each voxel averages a 3x3x3
/// sub-grid for partial-volume edges.
pub fn render(
    phantom: &[Ellipsoid],
    contrast: Contrast,
    n: usize,
    affine: &Matrix4<f64>,
    motion: &[f64; 6],
) -> Volume<f64> {
    let inv = rigid_inverse(&rigid_matrix(motion));
    let to_object = inv * affine;
    let offsets = [-1.0 / 3.0, 0.0, 1.0 / 3.0];
    let mut data = Vec::with_capacity(n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let mut sum = 0.0;
                for dz in offsets {
                    for dy in offsets {
                        for dx in offsets {
                            let v = Vector4::new(i as f64 + dx, j as f64 + dy, k as f64 + dz, 1.0);
                            let w = to_object * v;
                            sum += intensity_at(phantom, contrast, &[w[0], w[1], w[2]]);
                        }
                    }
                }
                data.push(sum / 27.0);
            }
        }
    }
    Volume::new(data, (n, n, n), *affine).unwrap()
}

/// 40^3 grid of 2 mm voxels
pub fn standard_pair(contrast_ref: Contrast, contrast_src: Contrast, motion: &[f64; 6]) -> (Volume<f64>, Volume<f64>) {
    let phantom = head_phantom();
    let affine = centred_affine(40, 2.0);
    let reference = render(&phantom, contrast_ref, 40, &affine, &[0.0; 6]);
    let source = render(&phantom, contrast_src, 40, &affine, motion);
    (reference, source)
}
