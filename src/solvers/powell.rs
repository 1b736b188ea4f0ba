//! Powell's direction-set method
//!
//! Derivative-free minimization by successive line searches along a set of
//! directions; after each sweep the direction of largest decrease may be
//! replaced by the overall displacement of the sweep.
//!
//! Reference:
//! Powell, M.J.D. (1964). "An efficient method for finding the minimum of a
//! function of several variables without calculating derivatives."
//! The Computer Journal 7(2), 155-162.

use std::cell::Cell;

use super::brent::{bracket_minimum, brent_minimize};

const BRACKET_MAX_ITER: usize = 1000;
const BRENT_MAX_ITER: usize = 500;

/// Parameters for [`powell_minimize`]
#[derive(Clone, Debug)]
pub struct PowellParams {
    /// Line-search tolerance; each Brent search uses `100 * xtol`
    pub xtol: f64,
    /// Relative decrease of the objective below which a sweep counts as converged
    pub ftol: f64,
    /// Maximum number of sweeps
    pub max_iter: usize,
    /// Maximum number of objective evaluations (checked after each sweep)
    pub max_evals: usize,
}

impl Default for PowellParams {
    fn default() -> Self {
        Self {
            xtol: 1e-4,
            ftol: 1e-4,
            max_iter: 200,
            max_evals: 6000,
        }
    }
}

/// Outcome of a Powell minimization
#[derive(Clone, Debug)]
pub struct PowellResult {
    /// Best point found
    pub x: Vec<f64>,
    /// Objective at `x`
    pub fval: f64,
    /// Sweeps performed
    pub iterations: usize,
    /// Objective evaluations performed
    pub evaluations: usize,
    /// False when a budget ran out before the `ftol` test passed
    pub converged: bool,
    /// Final direction set
    pub directions: Vec<Vec<f64>>,
}

/// Minimize `f` from `x0` with initial search `directions`
///
/// # Arguments
/// * `f` - Objective
/// * `x0` - Starting point
/// * `directions` - Initial direction set, one vector per row, each of `x0.len()`
/// * `params` - Tolerances and budgets
pub fn powell_minimize<F>(
    mut f: F,
    x0: &[f64],
    directions: Vec<Vec<f64>>,
    params: &PowellParams,
) -> PowellResult
where
    F: FnMut(&[f64]) -> f64,
{
    let evaluations = Cell::new(0usize);
    let mut counted = |x: &[f64]| -> f64 {
        evaluations.set(evaluations.get() + 1);
        f(x)
    };

    let mut direc = directions;
    let mut x = x0.to_vec();
    let mut fval = counted(&x);
    let mut x1 = x.clone();
    let mut iterations = 0usize;
    let line_tol = params.xtol * 100.0;
    let mut converged = false;

    if direc.is_empty() {
        return PowellResult {
            x,
            fval,
            iterations,
            evaluations: evaluations.get(),
            converged: true,
            directions: direc,
        };
    }

    loop {
        let fx = fval;
        let mut bigind = 0;
        let mut delta = 0.0;

        for i in 0..direc.len() {
            let fx2 = fval;
            let (fnew, xnew, _) = line_search(&mut counted, &x, &direc[i], line_tol);
            fval = fnew;
            x = xnew;
            if fx2 - fval > delta {
                delta = fx2 - fval;
                bigind = i;
            }
        }
        iterations += 1;

        let bound = params.ftol * (fx.abs() + fval.abs()) + 1e-20;
        if 2.0 * (fx - fval) <= bound {
            converged = true;
            break;
        }
        if evaluations.get() >= params.max_evals || iterations >= params.max_iter {
            break;
        }

        // Extrapolate along the sweep's displacement
        let displacement: Vec<f64> = x.iter().zip(&x1).map(|(a, b)| a - b).collect();
        let x2: Vec<f64> = x.iter().zip(&x1).map(|(a, b)| 2.0 * a - b).collect();
        x1 = x.clone();
        let fx2 = counted(&x2);

        if fx > fx2 {
            let mut t = 2.0 * (fx + fx2 - 2.0 * fval);
            let temp = fx - fval - delta;
            t *= temp * temp;
            let temp = fx - fx2;
            t -= delta * temp * temp;
            if t < 0.0 {
                let (fnew, xnew, step) = line_search(&mut counted, &x, &displacement, line_tol);
                fval = fnew;
                x = xnew;
                let last = direc.len() - 1;
                direc[bigind] = direc[last].clone();
                direc[last] = step;
            }
        }
    }

    PowellResult {
        x,
        fval,
        iterations,
        evaluations: evaluations.get(),
        converged,
        directions: direc,
    }
}

/// Brent search along `direction` from `p`
///
/// Returns the new objective value, the new point and the step taken (the
/// direction scaled by the optimal multiplier).
fn line_search<F>(f: &mut F, p: &[f64], direction: &[f64], tol: f64) -> (f64, Vec<f64>, Vec<f64>)
where
    F: FnMut(&[f64]) -> f64,
{
    let mut buf = vec![0.0; p.len()];
    let mut along = |alpha: f64| -> f64 {
        for ((b, &pi), &di) in buf.iter_mut().zip(p).zip(direction) {
            *b = pi + alpha * di;
        }
        f(&buf)
    };

    let bracket = bracket_minimum(&mut along, 0.0, 1.0, BRACKET_MAX_ITER);
    let min = brent_minimize(&mut along, &bracket, tol, BRENT_MAX_ITER);

    let step: Vec<f64> = direction.iter().map(|&d| min.x * d).collect();
    let x: Vec<f64> = p.iter().zip(&step).map(|(a, b)| a + b).collect();
    (min.fx, x, step)
}
