//! One-dimensional minimization: downhill bracketing and Brent's method
//!
//! Reference:
//! Brent, R.P. (1973). "Algorithms for Minimization Without Derivatives",
//! Prentice-Hall, chapter 5.
//! Press et al., "Numerical Recipes", section 10.1-10.2 (mnbrak, brent).

const GOLD: f64 = 1.618034;
const CGOLD: f64 = 0.3819660;
const TINY: f64 = 1e-21;

/// Maximum parabolic extrapolation, in units of the current step
pub const GROW_LIMIT: f64 = 110.0;
/// Absolute tolerance floor of the Brent search
pub const MIN_TOL: f64 = 1e-11;

/// Three abscissae with the middle one lowest (when bracketing succeeded)
#[derive(Clone, Copy, Debug)]
pub struct Bracket {
    pub xa: f64,
    pub xb: f64,
    pub xc: f64,
    pub fa: f64,
    pub fb: f64,
    pub fc: f64,
    /// Function evaluations spent
    pub evaluations: usize,
}

/// Walk downhill from `xa`, `xb` until a minimum is enclosed
///
/// Stops after `max_iter` expansions and returns the last triple, which then
/// may not enclose a minimum.
pub fn bracket_minimum<F>(f: &mut F, xa: f64, xb: f64, max_iter: usize) -> Bracket
where
    F: FnMut(f64) -> f64,
{
    let (mut xa, mut xb) = (xa, xb);
    let mut fa = f(xa);
    let mut fb = f(xb);
    if fa < fb {
        std::mem::swap(&mut xa, &mut xb);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut xc = xb + GOLD * (xb - xa);
    let mut fc = f(xc);
    let mut evaluations = 3;
    let mut iter = 0;

    while fc < fb && iter < max_iter {
        iter += 1;
        let tmp1 = (xb - xa) * (fb - fc);
        let tmp2 = (xb - xc) * (fb - fa);
        let val = tmp2 - tmp1;
        let denom = if val.abs() < TINY { 2.0 * TINY } else { 2.0 * val };
        let mut w = xb - ((xb - xc) * tmp2 - (xb - xa) * tmp1) / denom;
        let wlim = xb + GROW_LIMIT * (xc - xb);
        let mut fw;

        if (w - xc) * (xb - w) > 0.0 {
            // Parabolic point between xb and xc
            fw = f(w);
            evaluations += 1;
            if fw < fc {
                return Bracket { xa: xb, xb: w, xc, fa: fb, fb: fw, fc, evaluations };
            } else if fw > fb {
                return Bracket { xa, xb, xc: w, fa, fb, fc: fw, evaluations };
            }
            w = xc + GOLD * (xc - xb);
            fw = f(w);
            evaluations += 1;
        } else if (w - wlim) * (wlim - xc) >= 0.0 {
            w = wlim;
            fw = f(w);
            evaluations += 1;
        } else if (w - wlim) * (xc - w) > 0.0 {
            fw = f(w);
            evaluations += 1;
            if fw < fc {
                xb = xc;
                xc = w;
                w = xc + GOLD * (xc - xb);
                fb = fc;
                fc = fw;
                fw = f(w);
                evaluations += 1;
            }
        } else {
            w = xc + GOLD * (xc - xb);
            fw = f(w);
            evaluations += 1;
        }

        xa = xb;
        xb = xc;
        xc = w;
        fa = fb;
        fb = fc;
        fc = fw;
    }

    Bracket { xa, xb, xc, fa, fb, fc, evaluations }
}

/// Result of a Brent line minimization
#[derive(Clone, Copy, Debug)]
pub struct LineMinimum {
    pub x: f64,
    pub fx: f64,
    pub iterations: usize,
    pub evaluations: usize,
}

/// Brent's method inside a bracket
///
/// `tol` is relative to |x|, floored by [`MIN_TOL`].
pub fn brent_minimize<F>(f: &mut F, bracket: &Bracket, tol: f64, max_iter: usize) -> LineMinimum
where
    F: FnMut(f64) -> f64,
{
    let (mut a, mut b) = if bracket.xa < bracket.xc {
        (bracket.xa, bracket.xc)
    } else {
        (bracket.xc, bracket.xa)
    };
    let (mut x, mut w, mut v) = (bracket.xb, bracket.xb, bracket.xb);
    let (mut fx, mut fw, mut fv) = (bracket.fb, bracket.fb, bracket.fb);
    let mut deltax: f64 = 0.0;
    let mut rat: f64 = 0.0;
    let mut evaluations = 0;
    let mut iterations = 0;

    while iterations < max_iter {
        let tol1 = tol * x.abs() + MIN_TOL;
        let tol2 = 2.0 * tol1;
        let xmid = 0.5 * (a + b);
        if (x - xmid).abs() < tol2 - 0.5 * (b - a) {
            break;
        }

        if deltax.abs() <= tol1 {
            deltax = if x >= xmid { a - x } else { b - x };
            rat = CGOLD * deltax;
        } else {
            let tmp1 = (x - w) * (fx - fv);
            let mut tmp2 = (x - v) * (fx - fw);
            let mut p = (x - v) * tmp2 - (x - w) * tmp1;
            tmp2 = 2.0 * (tmp2 - tmp1);
            if tmp2 > 0.0 {
                p = -p;
            }
            tmp2 = tmp2.abs();
            let dx_temp = deltax;
            deltax = rat;
            if p > tmp2 * (a - x) && p < tmp2 * (b - x) && p.abs() < (0.5 * tmp2 * dx_temp).abs() {
                rat = p / tmp2;
                let u = x + rat;
                if (u - a) < tol2 || (b - u) < tol2 {
                    rat = if xmid - x >= 0.0 { tol1 } else { -tol1 };
                }
            } else {
                deltax = if x >= xmid { a - x } else { b - x };
                rat = CGOLD * deltax;
            }
        }

        let u = if rat.abs() < tol1 {
            if rat >= 0.0 { x + tol1 } else { x - tol1 }
        } else {
            x + rat
        };
        let fu = f(u);
        evaluations += 1;

        if fu > fx {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        } else {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        }

        iterations += 1;
    }

    LineMinimum { x, fx, iterations, evaluations }
}
