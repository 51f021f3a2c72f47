//! # Stumpff functions and the universal-anomaly engine
//!
//! Leaf module of the two-body solver cluster. [`find_c2c3`] evaluates the Stumpff
//! functions c2(z), c3(z) across all three conic regimes; [`iterate_universal_x`] solves
//! the universal Kepler time equation for the universal anomaly χ, with the closed-form
//! seed branched on orbit type and a halving fallback when a Newton step overshoots.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::SMALL;

/// Evaluate the Stumpff functions `c2(z)` and `c3(z)`.
///
/// Branches
/// -----------------
/// * `z > 1e-6` (elliptical): trigonometric form.
/// * `z < -1e-6` (hyperbolic): hyperbolic-trigonometric form.
/// * otherwise: Taylor limits `c2 = 1/2`, `c3 = 1/6`.
///
/// Pure function, no failure mode. Continuous across `z = 0` to well below 1e-8
/// for `|z| < 1e-6` (the limit values differ from the trig forms by O(z)).
#[inline]
pub fn find_c2c3(z: f64) -> (f64, f64) {
    if z > SMALL {
        let sqrtz = z.sqrt();
        let c2 = (1.0 - sqrtz.cos()) / z;
        let c3 = (sqrtz - sqrtz.sin()) / (sqrtz * z);
        (c2, c3)
    } else if z < -SMALL {
        let sqrtmz = (-z).sqrt();
        let c2 = (1.0 - sqrtmz.cosh()) / z;
        let c3 = (sqrtmz.sinh() - sqrtmz) / (sqrtmz * sqrtmz * sqrtmz);
        (c2, c3)
    } else {
        (0.5, 1.0 / 6.0)
    }
}

/// Outcome of the universal-anomaly Newton iteration.
///
/// `converged` reports whether the time residual met tolerance within the cap.
/// Matching the reference behavior, non-convergence is **not** an error here:
/// the caller decides whether to validate the residual or propagate a failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniversalXResult {
    /// Newton iterations consumed
    pub iterations: usize,
    /// Stumpff c2 at the final z
    pub c2: f64,
    /// Stumpff c3 at the final z
    pub c3: f64,
    /// Universal anomaly χ (km^0.5)
    pub x: f64,
    /// z = χ²·α at the final iterate
    pub z: f64,
    /// Whether the time-equation residual met tolerance
    pub converged: bool,
}

/// Solve the universal Kepler time equation for the universal anomaly χ.
///
/// Arguments
/// -----------------
/// * `alpha`: Reciprocal semi-major axis `2/r − v²/μ` (1/km).
/// * `dt_sec`: Elapsed time to match (s); may be negative.
/// * `r_dot_v`: `r · v` at the initial state (km²/s).
/// * `mag_r`: Initial radius (km).
/// * `r`, `v`: Initial position/velocity, used only by the parabolic seed.
/// * `mu`: Gravitational parameter (km³/s²).
/// * `max_iter`: Iteration cap (reference value: 50).
///
/// Return
/// ----------
/// * [`UniversalXResult`] with the final iterate; see `converged` for the residual status.
///
/// Notes
/// ----------
/// * The seed is branched on orbit type: ellipse for `alpha ≥ 1e-6`, parabola for
///   `|alpha| < 1e-6` (semi-latus rectum construction), hyperbola otherwise.
/// * A Newton step that drives χ against the sign of `dt_sec` is replaced by a
///   halving step `x ← x/2`.
#[allow(clippy::too_many_arguments)]
pub fn iterate_universal_x(
    alpha: f64,
    dt_sec: f64,
    r_dot_v: f64,
    mag_r: f64,
    r: &Vector3<f64>,
    v: &Vector3<f64>,
    mu: f64,
    max_iter: usize,
) -> UniversalXResult {
    let sqrt_mu = mu.sqrt();

    // Closed-form first guesses, branched on conic type.
    let mut xold = if alpha >= SMALL {
        // Circle or ellipse. Nudge away from exactly one period's worth of anomaly,
        // where the plain guess stalls.
        let guess = sqrt_mu * dt_sec * alpha;
        if (alpha - 1.0).abs() > SMALL {
            guess
        } else {
            guess * 0.97
        }
    } else if alpha.abs() < SMALL {
        // Parabola: seed through the semi-latus rectum and Barker-style angles.
        let h = r.cross(v);
        let p = h.norm_squared() / mu;
        let s = 0.5 * (1.0 / (3.0 * (mu / p.powi(3)).sqrt() * dt_sec)).atan();
        let w = s.tan().cbrt().atan();
        p.sqrt() * (2.0 / (2.0 * w).tan())
    } else {
        // Hyperbola.
        let a = 1.0 / alpha;
        let sign = dt_sec.signum();
        let num = -2.0 * mu * alpha * dt_sec;
        let den = r_dot_v + sign * (-mu * a).sqrt() * (1.0 - mag_r * alpha);
        sign * (-a).sqrt() * (num / den).ln()
    };

    let mut c2 = 0.5;
    let mut c3 = 1.0 / 6.0;
    let mut znew = xold * xold * alpha;
    let mut converged = false;
    let mut ktr = 0usize;

    while ktr < max_iter {
        znew = xold * xold * alpha;
        let (c2n, c3n) = find_c2c3(znew);
        c2 = c2n;
        c3 = c3n;

        let rval = xold * xold * c2
            + r_dot_v / sqrt_mu * xold * (1.0 - znew * c3)
            + mag_r * (1.0 - znew * c2);
        // dtnew is sqrt(mu) * elapsed time for the current iterate.
        let dtnew = xold.powi(3) * c3
            + r_dot_v / sqrt_mu * xold * xold * c2
            + mag_r * xold * (1.0 - znew * c3);

        ktr += 1;
        if (dtnew / sqrt_mu - dt_sec).abs() < SMALL {
            converged = true;
            break;
        }

        let mut xnew = xold + (dt_sec * sqrt_mu - dtnew) / rval;

        // Newton overshoot across zero: halve instead of jumping branches.
        if xnew * dt_sec < 0.0 {
            xnew = xold * 0.5;
        }
        xold = xnew;
    }

    UniversalXResult {
        iterations: ktr,
        c2,
        c3,
        x: xold,
        z: znew,
        converged,
    }
}

#[cfg(test)]
mod stumpff_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_taylor_limits_at_zero() {
        let (c2, c3) = find_c2c3(0.0);
        assert_relative_eq!(c2, 0.5);
        assert_relative_eq!(c3, 1.0 / 6.0);
    }

    #[test]
    fn test_continuity_across_zero() {
        for &z in &[-1e-6, -1e-7, -1e-8, 1e-8, 1e-7, 1e-6] {
            let (c2, c3) = find_c2c3(z);
            assert!((c2 - 0.5).abs() < 1e-6, "c2 discontinuous at z={z}");
            assert!((c3 - 1.0 / 6.0).abs() < 1e-7, "c3 discontinuous at z={z}");
        }
    }

    #[test]
    fn test_elliptic_values() {
        // z = (pi/2)^2: cos(sqrt z) = 0, sin(sqrt z) = 1.
        let z = std::f64::consts::FRAC_PI_2 * std::f64::consts::FRAC_PI_2;
        let (c2, c3) = find_c2c3(z);
        assert_relative_eq!(c2, 1.0 / z, max_relative = 1e-12);
        assert_relative_eq!(
            c3,
            (std::f64::consts::FRAC_PI_2 - 1.0) / (z * std::f64::consts::FRAC_PI_2),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_hyperbolic_values() {
        let z = -4.0;
        let (c2, c3) = find_c2c3(z);
        assert_relative_eq!(c2, (1.0 - 2.0f64.cosh()) / -4.0, max_relative = 1e-12);
        assert_relative_eq!(c3, (2.0f64.sinh() - 2.0) / 8.0, max_relative = 1e-12);
    }

    #[test]
    fn test_universal_x_circular_orbit() {
        // Canonical circular orbit at r = 1, mu = 1: after a quarter period,
        // chi = sqrt(mu) * dt / r... for a circle chi = sqrt(a) * delta_E.
        let r = Vector3::new(1.0, 0.0, 0.0);
        let v = Vector3::new(0.0, 1.0, 0.0);
        let alpha = 2.0 / 1.0 - 1.0 / 1.0;
        let dt = std::f64::consts::FRAC_PI_2;

        let res = iterate_universal_x(alpha, dt, 0.0, 1.0, &r, &v, 1.0, 50);
        assert!(res.converged);
        assert_relative_eq!(res.x, std::f64::consts::FRAC_PI_2, epsilon = 1e-5);
    }
}
