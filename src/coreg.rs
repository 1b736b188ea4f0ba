//! Pyramidal rigid-body registration
//!
//! Estimates the six rigid parameters (three translations in mm, three
//! rotations in radians) that bring a source volume into register with a
//! reference volume by minimizing a histogram-based similarity with Powell's
//! method. The sampling step is refined level by level (4 mm then 2 mm by
//! default), each level starting from the previous level's estimate.
//!
//! Reference:
//! Collignon, A., Maes, F., Delaere, D., Vandermeulen, D., Suetens, P. and
//! Marchal, G. (1995). "Automated multi-modality image registration based on
//! information theory." Information Processing in Medical Imaging, 263-274.

use log::{debug, info, warn};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::cost::{CoregObjective, CostFunction, DEGENERATE_COST};
use crate::error::{CoregError, Result};
use crate::histogram::JitterTable;
use crate::quantize::{Intensity, QuantizeParams};
use crate::rigid::rigid_matrix;
use crate::smoothing::smooth_volume;
use crate::solvers::powell::{powell_minimize, PowellParams};
use crate::volume::Volume;

/// Registration settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoregParams {
    /// Sampling steps in mm, coarse to fine, one pyramid level each
    pub sampling_steps: Vec<[f64; 3]>,
    /// Starting estimate `[tx, ty, tz, rx, ry, rz]`
    pub initial_params: [f64; 6],
    /// Required accuracy of each parameter
    pub tolerances: [f64; 6],
    pub cost_function: CostFunction,
    /// FWHM (bins) of the joint histogram smoothing
    pub histogram_fwhm: [f64; 2],
    /// FWHM (mm) of the volume smoothing applied before registration
    pub volume_fwhm: [f64; 3],
    pub smooth_volumes: bool,
    /// Powell sweeps allowed per level
    pub max_iterations: usize,
    /// Objective evaluations allowed per level
    pub max_evaluations: usize,
    /// Relative objective decrease below which a level is converged
    pub ftol: f64,
    /// Used for volumes that are not already 8-bit
    pub quantize: QuantizeParams,
    /// Histogram sampling jitter, values in [0, 1); `None` uses the SPM table
    pub jitter: Option<Vec<f64>>,
}

impl Default for CoregParams {
    fn default() -> Self {
        Self {
            sampling_steps: vec![[4.0, 4.0, 4.0], [2.0, 2.0, 2.0]],
            initial_params: [0.0; 6],
            tolerances: [0.02, 0.02, 0.02, 0.001, 0.001, 0.001],
            cost_function: CostFunction::default(),
            histogram_fwhm: [7.0, 7.0],
            volume_fwhm: [7.0, 7.0, 7.0],
            smooth_volumes: true,
            max_iterations: 64,
            max_evaluations: 4000,
            ftol: 1e-4,
            quantize: QuantizeParams::default(),
            jitter: None,
        }
    }
}

impl CoregParams {
    pub fn budget(&self) -> PyramidBudget {
        PyramidBudget {
            ftol: self.ftol,
            max_iterations: self.max_iterations,
            max_evaluations: self.max_evaluations,
        }
    }

    /// Jitter sequence for the joint histogram
    pub fn jitter_table(&self) -> Result<JitterTable> {
        match &self.jitter {
            Some(values) => JitterTable::new(values.clone()),
            None => Ok(JitterTable::spm()),
        }
    }

    /// Check every setting once, before any volume is touched
    pub fn validate(&self) -> Result<()> {
        if self.sampling_steps.is_empty() {
            return Err(CoregError::InvalidParameter(
                "at least one sampling step is required".to_string(),
            ));
        }
        for step in &self.sampling_steps {
            if step.iter().any(|s| !(*s > 0.0 && s.is_finite())) {
                return Err(CoregError::InvalidParameter(format!(
                    "sampling steps must be positive, got {:?}",
                    step
                )));
            }
        }
        if self.tolerances.iter().any(|t| !(*t > 0.0 && t.is_finite())) {
            return Err(CoregError::InvalidParameter(format!(
                "tolerances must be positive, got {:?}",
                self.tolerances
            )));
        }
        if self.initial_params.iter().any(|p| !p.is_finite()) {
            return Err(CoregError::InvalidParameter(format!(
                "initial parameters must be finite, got {:?}",
                self.initial_params
            )));
        }
        if self.volume_fwhm.iter().any(|f| !(*f >= 0.0 && f.is_finite())) {
            return Err(CoregError::InvalidParameter(format!(
                "volume FWHM must be finite and non-negative, got {:?}",
                self.volume_fwhm
            )));
        }
        if !(self.ftol >= 0.0 && self.ftol.is_finite()) {
            return Err(CoregError::InvalidParameter(format!(
                "ftol must be finite and non-negative, got {}",
                self.ftol
            )));
        }
        if self.max_iterations == 0 || self.max_evaluations == 0 {
            return Err(CoregError::InvalidParameter(
                "iteration and evaluation budgets must be non-zero".to_string(),
            ));
        }
        self.jitter_table()?;
        Ok(())
    }
}

/// Stopping rule shared by every pyramid level
#[derive(Clone, Debug, PartialEq)]
pub struct PyramidBudget {
    pub ftol: f64,
    pub max_iterations: usize,
    pub max_evaluations: usize,
}

impl Default for PyramidBudget {
    fn default() -> Self {
        CoregParams::default().budget()
    }
}

/// Reported after each completed pyramid level
#[derive(Clone, Debug)]
pub struct CoregProgress {
    /// 1-based index of the level just finished
    pub level: usize,
    pub levels: usize,
    pub params: [f64; 6],
    pub cost: f64,
}

/// Outcome of one pyramid level
#[derive(Clone, Debug, PartialEq)]
pub struct LevelResult {
    pub sampling_step: [f64; 3],
    /// Parameters the level started from
    pub start: [f64; 6],
    pub params: [f64; 6],
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// Outcome of a registration
#[derive(Clone, Debug, PartialEq)]
pub struct CoregResult {
    /// Final rigid parameters `[tx, ty, tz, rx, ry, rz]`
    pub params: [f64; 6],
    /// Objective at `params` for the finest sampling step
    pub cost: f64,
    /// True when every level met its tolerance within budget
    pub converged: bool,
    pub levels: Vec<LevelResult>,
}

/// Run Powell's method once per sampling step, coarse to fine
///
/// The objective receives candidate parameters and the current sampling
/// step (mm). Initial directions are the coordinate axes scaled by
/// `20 * tolerances[i]`; the line-search tolerance is
/// `min(min(tolerances), 1e-3)`.
///
/// With no sampling steps the start point is returned unevaluated.
pub fn pyramid_minimize<F>(
    x0: &[f64; 6],
    tolerances: &[f64; 6],
    steps: &[[f64; 3]],
    budget: &PyramidBudget,
    objective: F,
) -> CoregResult
where
    F: FnMut(&[f64; 6], &[f64; 3]) -> f64,
{
    pyramid_minimize_with_progress(x0, tolerances, steps, budget, objective, |_| {})
}

/// [`pyramid_minimize`] reporting each finished level to `progress_callback`
pub fn pyramid_minimize_with_progress<F, P>(
    x0: &[f64; 6],
    tolerances: &[f64; 6],
    steps: &[[f64; 3]],
    budget: &PyramidBudget,
    mut objective: F,
    mut progress_callback: P,
) -> CoregResult
where
    F: FnMut(&[f64; 6], &[f64; 3]) -> f64,
    P: FnMut(&CoregProgress),
{
    let xtol = tolerances.iter().copied().fold(f64::INFINITY, f64::min).min(1e-3);
    let powell_params = PowellParams {
        xtol,
        ftol: budget.ftol,
        max_iter: budget.max_iterations,
        max_evals: budget.max_evaluations,
    };

    let mut params = *x0;
    let mut cost = f64::INFINITY;
    let mut levels = Vec::with_capacity(steps.len());

    for (level, step) in steps.iter().enumerate() {
        info!(
            "level {}/{}: sampling step {:?} mm, start {:?}",
            level + 1,
            steps.len(),
            step,
            params
        );

        let directions: Vec<Vec<f64>> = (0..6)
            .map(|i| {
                let mut d = vec![0.0; 6];
                d[i] = 20.0 * tolerances[i];
                d
            })
            .collect();

        let result = powell_minimize(
            |x: &[f64]| objective(&to_params(x), step),
            &params,
            directions,
            &powell_params,
        );

        let start = params;
        params = to_params(&result.x);
        cost = result.fval;

        if result.converged {
            info!(
                "level {}/{} converged: params {:?}, cost {:.6}, {} iterations, {} evaluations",
                level + 1,
                steps.len(),
                params,
                cost,
                result.iterations,
                result.evaluations
            );
        } else {
            warn!(
                "level {}/{} stopped on budget: params {:?}, cost {:.6}, {} iterations, {} evaluations",
                level + 1,
                steps.len(),
                params,
                cost,
                result.iterations,
                result.evaluations
            );
        }

        levels.push(LevelResult {
            sampling_step: *step,
            start,
            params,
            cost,
            iterations: result.iterations,
            evaluations: result.evaluations,
            converged: result.converged,
        });

        progress_callback(&CoregProgress {
            level: level + 1,
            levels: steps.len(),
            params,
            cost,
        });
    }

    CoregResult {
        params,
        cost,
        converged: levels.iter().all(|l| l.converged),
        levels,
    }
}

fn to_params(x: &[f64]) -> [f64; 6] {
    let mut p = [0.0; 6];
    for (dst, src) in p.iter_mut().zip(x) {
        *dst = *src;
    }
    p
}

/// Register `source` to `reference`
///
/// Volumes that are not `u8` are quantized first (see [`Intensity`]); with
/// `smooth_volumes` both are then smoothed by `volume_fwhm` (less their own
/// voxel size).
///
/// # Errors
/// `InvalidParameter` for bad settings, `InvalidDimensions` for volumes
/// thinner than 2 voxels, `DegenerateIntensityRange` for constant volumes.
pub fn register_rigid<R, S>(
    reference: &Volume<R>,
    source: &Volume<S>,
    params: &CoregParams,
) -> Result<CoregResult>
where
    R: Intensity,
    S: Intensity,
{
    register_rigid_impl(reference, source, params, rigid_matrix, |_| {})
}

/// [`register_rigid`] with a caller-supplied parameter-to-matrix conversion
pub fn register_rigid_with<R, S, M>(
    reference: &Volume<R>,
    source: &Volume<S>,
    params: &CoregParams,
    to_matrix: M,
) -> Result<CoregResult>
where
    R: Intensity,
    S: Intensity,
    M: Fn(&[f64; 6]) -> Matrix4<f64>,
{
    register_rigid_impl(reference, source, params, to_matrix, |_| {})
}

/// [`register_rigid`] calling `progress_callback` after each pyramid level
pub fn register_rigid_with_progress<R, S, P>(
    reference: &Volume<R>,
    source: &Volume<S>,
    params: &CoregParams,
    progress_callback: P,
) -> Result<CoregResult>
where
    R: Intensity,
    S: Intensity,
    P: FnMut(&CoregProgress),
{
    register_rigid_impl(reference, source, params, rigid_matrix, progress_callback)
}

fn register_rigid_impl<R, S, M, P>(
    reference: &Volume<R>,
    source: &Volume<S>,
    params: &CoregParams,
    to_matrix: M,
    progress_callback: P,
) -> Result<CoregResult>
where
    R: Intensity,
    S: Intensity,
    M: Fn(&[f64; 6]) -> Matrix4<f64>,
    P: FnMut(&CoregProgress),
{
    params.validate()?;
    reference.check_sampleable("reference")?;
    source.check_sampleable("source")?;

    let reference = R::to_uint8(reference, &params.quantize)?;
    let source = S::to_uint8(source, &params.quantize)?;

    if params.smooth_volumes {
        info!("smoothing volumes, FWHM {:?} mm", params.volume_fwhm);
        let reference = smooth_volume(&*reference, residual_fwhm(&*reference, &params.volume_fwhm))?;
        let source = smooth_volume(&*source, residual_fwhm(&*source, &params.volume_fwhm))?;
        run_pyramid(&reference, &source, params, to_matrix, progress_callback)
    } else {
        run_pyramid(&*reference, &*source, params, to_matrix, progress_callback)
    }
}

fn run_pyramid<R, S, M, P>(
    reference: &Volume<R>,
    source: &Volume<S>,
    params: &CoregParams,
    to_matrix: M,
    progress_callback: P,
) -> Result<CoregResult>
where
    R: Copy + Into<f64>,
    S: Copy + Into<f64>,
    M: Fn(&[f64; 6]) -> Matrix4<f64>,
    P: FnMut(&CoregProgress),
{
    let objective = CoregObjective::new(reference, source, params.cost_function, params.histogram_fwhm)?
        .with_jitter(params.jitter_table()?);

    let evaluate = |p: &[f64; 6], step: &[f64; 3]| -> f64 {
        match objective.evaluate_transform(&to_matrix(p), step) {
            Ok(cost) if cost.is_finite() => {
                debug!(
                    "{:>9.4} {:>9.4} {:>9.4} {:>9.5} {:>9.5} {:>9.5} | {} = {:.6}",
                    p[0], p[1], p[2], p[3], p[4], p[5],
                    objective.cost_function(),
                    cost
                );
                cost
            }
            Ok(cost) => {
                warn!("non-finite cost {} at {:?}", cost, p);
                DEGENERATE_COST
            }
            Err(e) => {
                warn!("objective failed at {:?}: {}", p, e);
                DEGENERATE_COST
            }
        }
    };

    Ok(pyramid_minimize_with_progress(
        &params.initial_params,
        &params.tolerances,
        &params.sampling_steps,
        &params.budget(),
        evaluate,
        progress_callback,
    ))
}

/// Per-axis smoothing in voxels that brings a volume to `fwhm_mm` overall
pub fn residual_fwhm<T>(volume: &Volume<T>, fwhm_mm: &[f64; 3]) -> [f64; 3] {
    let vox = volume.voxel_size();
    let mut out = [0.0; 3];
    for i in 0..3 {
        out[i] = (fwhm_mm[i] * fwhm_mm[i] - vox[i] * vox[i]).max(0.0).sqrt() / vox[i];
    }
    out
}
