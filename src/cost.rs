//! Information-theoretic similarity of a joint histogram
//!
//! All scores are negated so that smaller is better:
//! - MI: mutual information
//! - NMI: normalized mutual information, Studholme, Hill & Hawkes (1998),
//!   "A normalized entropy measure of 3-D medical image alignment",
//!   Proc. SPIE Medical Imaging 3338, 132-143
//! - ECC: entropy correlation coefficient, Maes et al. (1997),
//!   "Multimodality image registration by maximization of mutual
//!   information", IEEE TMI 16(2), 187-198

use std::fmt;
use std::str::FromStr;

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::{CoregError, Result};
use crate::histogram::{joint_histogram, JitterTable, JointHistogram, HIST_BINS};
use crate::rigid::{one_based, rigid_matrix, voxel_sizes};
use crate::smoothing::smooth_2d_wrap;
use crate::volume::Volume;

/// Floor added to every histogram bin before taking logarithms
pub const HISTOGRAM_EPSILON: f64 = f64::EPSILON;

/// Objective value reported when no sample lands in the source volume
pub const DEGENERATE_COST: f64 = 1.0e10;

/// Similarity criterion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostFunction {
    #[serde(rename = "mi")]
    MutualInformation,
    #[default]
    #[serde(rename = "nmi")]
    NormalizedMutualInformation,
    #[serde(rename = "ecc")]
    EntropyCorrelationCoefficient,
}

impl CostFunction {
    pub const ALL: [CostFunction; 3] = [
        CostFunction::MutualInformation,
        CostFunction::NormalizedMutualInformation,
        CostFunction::EntropyCorrelationCoefficient,
    ];

    /// Short selector name (`mi`, `nmi`, `ecc`)
    pub fn name(&self) -> &'static str {
        match self {
            CostFunction::MutualInformation => "mi",
            CostFunction::NormalizedMutualInformation => "nmi",
            CostFunction::EntropyCorrelationCoefficient => "ecc",
        }
    }

    /// Negated similarity of a normalized joint distribution
    pub fn score(&self, stats: &EntropyTerms) -> f64 {
        match self {
            CostFunction::MutualInformation => -stats.mutual_information,
            CostFunction::NormalizedMutualInformation => {
                // Both numerator and denominator are sums of p*log2(p) (<= 0)
                -((stats.row_plogp + stats.col_plogp) / stats.joint_plogp)
            }
            CostFunction::EntropyCorrelationCoefficient => {
                let ecc = -2.0 * stats.mutual_information / (stats.row_plogp + stats.col_plogp);
                -ecc
            }
        }
    }
}

impl fmt::Display for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CostFunction {
    type Err = CoregError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mi" => Ok(CostFunction::MutualInformation),
            "nmi" => Ok(CostFunction::NormalizedMutualInformation),
            "ecc" => Ok(CostFunction::EntropyCorrelationCoefficient),
            other => Err(CoregError::UnknownCostFunction(other.to_string())),
        }
    }
}

/// Entropy sums of a normalized joint distribution (base 2)
#[derive(Clone, Copy, Debug)]
pub struct EntropyTerms {
    /// Sum of H * log2(H / (row * col))
    pub mutual_information: f64,
    /// Sum of p * log2(p) over the reference (row) marginal
    pub row_plogp: f64,
    /// Sum of p * log2(p) over the source (column) marginal
    pub col_plogp: f64,
    /// Sum of H * log2(H) over the joint distribution
    pub joint_plogp: f64,
}

impl EntropyTerms {
    /// Floor every bin by [`HISTOGRAM_EPSILON`], normalize, and accumulate
    pub fn from_bins(bins: &[f64]) -> Result<Self> {
        if bins.len() != HIST_BINS * HIST_BINS {
            return Err(CoregError::InvalidDimensions(format!(
                "joint histogram has {} bins, expected {}",
                bins.len(),
                HIST_BINS * HIST_BINS
            )));
        }

        let h: Vec<f64> = bins.iter().map(|&v| v + HISTOGRAM_EPSILON).collect();
        let total: f64 = h.iter().sum();

        let mut row = vec![0.0f64; HIST_BINS];
        let mut col = vec![0.0f64; HIST_BINS];
        for r in 0..HIST_BINS {
            for c in 0..HIST_BINS {
                let p = h[r * HIST_BINS + c] / total;
                row[r] += p;
                col[c] += p;
            }
        }

        let mut mutual_information = 0.0;
        let mut joint_plogp = 0.0;
        for r in 0..HIST_BINS {
            for c in 0..HIST_BINS {
                let p = h[r * HIST_BINS + c] / total;
                mutual_information += p * (p / (row[r] * col[c])).log2();
                joint_plogp += p * p.log2();
            }
        }

        let plogp = |m: &[f64]| -> f64 { m.iter().map(|&p| p * p.log2()).sum() };

        Ok(Self {
            mutual_information,
            row_plogp: plogp(&row),
            col_plogp: plogp(&col),
            joint_plogp,
        })
    }
}

/// Smooth a raw joint histogram and score it
///
/// An empty histogram (no sample in the field of view) scores
/// [`DEGENERATE_COST`].
pub fn histogram_cost(hist: &JointHistogram, cost: CostFunction, fwhm: [f64; 2]) -> Result<f64> {
    if hist.samples == 0 || !(hist.total() > 0.0) {
        return Ok(DEGENERATE_COST);
    }
    let smoothed = smooth_2d_wrap(hist.as_slice(), HIST_BINS, HIST_BINS, fwhm)?;
    let terms = EntropyTerms::from_bins(&smoothed)?;
    Ok(cost.score(&terms))
}

/// Similarity objective for one reference/source pair
///
/// Holds the voxel-to-voxel plumbing so that each evaluation only needs the
/// candidate rigid transform and the sampling step.
pub struct CoregObjective<'a, R, S> {
    reference: &'a Volume<R>,
    source: &'a Volume<S>,
    cost: CostFunction,
    histogram_fwhm: [f64; 2],
    jitter: JitterTable,
    reference_voxels: Matrix4<f64>,
    source_voxels_inv: Matrix4<f64>,
    reference_voxel_size: [f64; 3],
}

impl<'a, R, S> CoregObjective<'a, R, S>
where
    R: Copy + Into<f64>,
    S: Copy + Into<f64>,
{
    /// # Errors
    /// `InvalidParameter` for a singular affine or a bad histogram FWHM
    pub fn new(
        reference: &'a Volume<R>,
        source: &'a Volume<S>,
        cost: CostFunction,
        histogram_fwhm: [f64; 2],
    ) -> Result<Self> {
        if histogram_fwhm.iter().any(|f| !(*f >= 0.0 && f.is_finite())) {
            return Err(CoregError::InvalidParameter(format!(
                "histogram FWHM must be finite and non-negative, got {:?}",
                histogram_fwhm
            )));
        }
        let source_voxels_inv = one_based(&source.affine).try_inverse().ok_or_else(|| {
            CoregError::InvalidParameter("source affine is singular".to_string())
        })?;
        let reference_voxel_size = voxel_sizes(&reference.affine);
        if reference_voxel_size.iter().any(|v| !(*v > 0.0)) {
            return Err(CoregError::InvalidParameter("reference affine is singular".to_string()));
        }

        Ok(Self {
            reference,
            source,
            cost,
            histogram_fwhm,
            jitter: JitterTable::spm(),
            reference_voxels: one_based(&reference.affine),
            source_voxels_inv,
            reference_voxel_size,
        })
    }

    /// Replace the jitter sequence used for every evaluation
    pub fn with_jitter(mut self, jitter: JitterTable) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn cost_function(&self) -> CostFunction {
        self.cost
    }

    /// Reference-voxel to source-voxel mapping (both 1-based) for a world transform
    pub fn voxel_mapping(&self, transform: &Matrix4<f64>) -> Matrix4<f64> {
        self.source_voxels_inv * transform * self.reference_voxels
    }

    /// Sampling step in reference voxels for a step in mm
    pub fn voxel_step(&self, step_mm: &[f64; 3]) -> [f64; 3] {
        [
            step_mm[0] / self.reference_voxel_size[0],
            step_mm[1] / self.reference_voxel_size[1],
            step_mm[2] / self.reference_voxel_size[2],
        ]
    }

    /// Joint histogram for a world-space transform
    pub fn histogram(&self, transform: &Matrix4<f64>, step_mm: &[f64; 3]) -> Result<JointHistogram> {
        joint_histogram(
            self.reference,
            self.source,
            &self.voxel_mapping(transform),
            self.voxel_step(step_mm),
            self.jitter.clone(),
        )
    }

    /// Objective value for a world-space transform
    pub fn evaluate_transform(&self, transform: &Matrix4<f64>, step_mm: &[f64; 3]) -> Result<f64> {
        let hist = self.histogram(transform, step_mm)?;
        histogram_cost(&hist, self.cost, self.histogram_fwhm)
    }

    /// Objective value for rigid parameters (SPM matrix convention)
    pub fn evaluate(&self, params: &[f64; 6], step_mm: &[f64; 3]) -> Result<f64> {
        self.evaluate_transform(&rigid_matrix(params), step_mm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    /// Two overlapping ellipsoids on a dim background, 1 mm voxels
    fn phantom(n: usize) -> Volume<u8> {
        let c = (n as f64 - 1.0) / 2.0;
        let mut data = Vec::with_capacity(n * n * n);
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    let (x, y, z) = (i as f64 - c, j as f64 - c, k as f64 - c);
                    let mut v = 20.0;
                    if (x / 9.0).powi(2) + (y / 7.0).powi(2) + (z / 6.0).powi(2) < 1.0 {
                        v = 120.0;
                    }
                    if ((x - 3.0) / 3.0).powi(2) + ((y + 1.0) / 4.0).powi(2) + (z / 3.0).powi(2) < 1.0 {
                        v = 220.0;
                    }
                    data.push(v as u8);
                }
            }
        }
        Volume::new(data, (n, n, n), Matrix4::identity()).unwrap()
    }

    fn uniform_bins(value: f64) -> Vec<f64> {
        vec![value; HIST_BINS * HIST_BINS]
    }

    #[test]
    fn test_parse_cost_function() {
        assert_eq!("mi".parse::<CostFunction>().unwrap(), CostFunction::MutualInformation);
        assert_eq!("nmi".parse::<CostFunction>().unwrap(), CostFunction::NormalizedMutualInformation);
        assert_eq!("ecc".parse::<CostFunction>().unwrap(), CostFunction::EntropyCorrelationCoefficient);
        match "ncc".parse::<CostFunction>() {
            Err(CoregError::UnknownCostFunction(s)) => assert_eq!(s, "ncc"),
            other => panic!("expected unknown cost function, got {:?}", other),
        }
    }

    #[test]
    fn test_display_round_trips_names() {
        for cf in CostFunction::ALL {
            assert_eq!(cf.to_string().parse::<CostFunction>().unwrap(), cf);
        }
        assert_eq!(CostFunction::default(), CostFunction::NormalizedMutualInformation);
    }

    #[test]
    fn test_independent_distribution_scores() {
        let terms = EntropyTerms::from_bins(&uniform_bins(1.0)).unwrap();
        assert!(terms.mutual_information.abs() < 1e-9);
        // 256 equiprobable bins per marginal: sum p log2 p = -8
        assert!((terms.row_plogp + 8.0).abs() < 1e-9);
        assert!((terms.joint_plogp + 16.0).abs() < 1e-9);

        let nmi = CostFunction::NormalizedMutualInformation.score(&terms);
        assert!((nmi + 1.0).abs() < 1e-9, "nmi {}", nmi);
        assert!(CostFunction::EntropyCorrelationCoefficient.score(&terms).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_distribution_is_maximally_similar() {
        let mut bins = uniform_bins(0.0);
        for i in 0..HIST_BINS {
            bins[i * HIST_BINS + i] = 1.0;
        }
        let terms = EntropyTerms::from_bins(&bins).unwrap();
        // MI of a perfect 256-level match is 8 bits
        assert!((terms.mutual_information - 8.0).abs() < 1e-6);
        let nmi = CostFunction::NormalizedMutualInformation.score(&terms);
        assert!((nmi + 2.0).abs() < 1e-6, "nmi {}", nmi);
        let ecc = CostFunction::EntropyCorrelationCoefficient.score(&terms);
        assert!((ecc + 1.0).abs() < 1e-6, "ecc {}", ecc);
    }

    #[test]
    fn test_empty_histogram_is_degenerate() {
        let hist = JointHistogram::zeros();
        for cf in CostFunction::ALL {
            assert_eq!(histogram_cost(&hist, cf, [7.0, 7.0]).unwrap(), DEGENERATE_COST);
        }
    }

    #[test]
    fn test_wrong_bin_count_is_rejected() {
        assert!(EntropyTerms::from_bins(&[1.0; 10]).is_err());
    }

    #[test]
    fn test_aligned_beats_large_translation_nmi() {
        let vol = phantom(32);
        let objective = CoregObjective::new(&vol, &vol, CostFunction::NormalizedMutualInformation, [7.0, 7.0]).unwrap();
        let aligned = objective.evaluate(&[0.0; 6], &[2.0; 3]).unwrap();
        let moved = objective.evaluate(&[20.0, 0.0, 0.0, 0.0, 0.0, 0.0], &[2.0; 3]).unwrap();
        assert!(aligned < moved, "aligned {} should beat moved {}", aligned, moved);
    }

    #[test]
    fn test_every_cost_prefers_alignment() {
        let vol = phantom(32);
        for cf in CostFunction::ALL {
            let objective = CoregObjective::new(&vol, &vol, cf, [7.0, 7.0]).unwrap();
            let aligned = objective.evaluate(&[0.0; 6], &[2.0; 3]).unwrap();
            let moved = objective.evaluate(&[6.0, -4.0, 0.0, 0.0, 0.0, 0.2], &[2.0; 3]).unwrap();
            assert!(aligned < 0.0, "{}: aligned {}", cf, aligned);
            assert!(aligned < moved, "{}: aligned {} vs moved {}", cf, aligned, moved);
        }
    }

    #[test]
    fn test_disjoint_volumes_give_degenerate_cost() {
        let reference = phantom(16);
        let mut source = phantom(16);
        source.affine = Matrix4::new_translation(&Vector3::new(500.0, 0.0, 0.0));
        let objective = CoregObjective::new(&reference, &source, CostFunction::MutualInformation, [7.0, 7.0]).unwrap();
        let hist = objective.histogram(&Matrix4::identity(), &[2.0; 3]).unwrap();
        assert_eq!(hist.total(), 0.0);
        assert_eq!(objective.evaluate(&[0.0; 6], &[2.0; 3]).unwrap(), DEGENERATE_COST);
    }

    #[test]
    fn test_injected_jitter_changes_histogram_deterministically() {
        let vol = phantom(24);
        let transform = rigid_matrix(&[0.4, -0.3, 0.2, 0.0, 0.02, 0.0]);
        let spm = CoregObjective::new(&vol, &vol, CostFunction::MutualInformation, [7.0, 7.0]).unwrap();
        let custom = CoregObjective::new(&vol, &vol, CostFunction::MutualInformation, [7.0, 7.0])
            .unwrap()
            .with_jitter(JitterTable::new(vec![0.1, 0.9, 0.5]).unwrap());

        let a = custom.histogram(&transform, &[2.0; 3]).unwrap();
        let b = custom.histogram(&transform, &[2.0; 3]).unwrap();
        let reference = spm.histogram(&transform, &[2.0; 3]).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a.as_slice(), reference.as_slice());
        assert_eq!(
            custom.evaluate_transform(&transform, &[2.0; 3]).unwrap(),
            custom.evaluate_transform(&transform, &[2.0; 3]).unwrap()
        );
    }

    #[test]
    fn test_step_is_converted_to_reference_voxels() {
        let mut reference = phantom(8);
        reference.affine = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 1.0, 0.5));
        let source = phantom(8);
        let objective = CoregObjective::new(&reference, &source, CostFunction::MutualInformation, [7.0, 7.0]).unwrap();
        assert_eq!(objective.voxel_step(&[4.0, 4.0, 4.0]), [2.0, 4.0, 8.0]);
    }

    #[test]
    fn test_identical_geometry_maps_voxels_to_themselves() {
        let mut vol = phantom(8);
        vol.affine = Matrix4::new_translation(&Vector3::new(-12.0, 4.0, 7.0))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 2.0, 3.0));
        let objective = CoregObjective::new(&vol, &vol, CostFunction::MutualInformation, [7.0, 7.0]).unwrap();
        let m = objective.voxel_mapping(&Matrix4::identity());
        assert!((m - Matrix4::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_singular_affine_is_rejected() {
        let reference = phantom(8);
        let mut source = phantom(8);
        source.affine = Matrix4::zeros();
        let result = CoregObjective::new(&reference, &source, CostFunction::MutualInformation, [7.0, 7.0]);
        assert!(matches!(result, Err(CoregError::InvalidParameter(_))));
    }
}
