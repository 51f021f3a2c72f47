//! # The degree-8 range polynomial shared by Laplace and Gauss
//!
//! Both direct angles-only methods reduce to the same sparse scalar polynomial in the
//! middle-epoch range magnitude:
//!
//! ```text
//! r^8 + c6·r^6 + c3·r^3 + c0 = 0
//! ```
//!
//! The primary root is found by **Halley iteration from a fixed seed** (the
//! GPS-altitude heuristic, in canonical Earth radii), preserving the reference
//! selection behavior. A Descartes sign-variation prefilter skips the iteration
//! when no positive real root can exist, and an Aberth–Ehrlich census of all
//! positive real roots backs the multiple-root ambiguity diagnostic without ever
//! changing which root is selected.

use aberth::{aberth, StopReason};
use smallvec::SmallVec;
use serde::{Deserialize, Serialize};

use crate::iod::IodParams;
use crate::orbdet_errors::OrbdetError;

/// A converged root of the degree-8 range polynomial, with diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialRootEstimate {
    /// The Halley-converged positive real root (canonical radii)
    pub root: f64,
    /// Halley iterations consumed
    pub iterations: usize,
    /// Coefficient-sign signature of a possible multiple-positive-root geometry
    /// (`c6 < 0 ∧ c3 > 0`); surfaced, never auto-resolved
    pub possible_multiple_roots: bool,
    /// All positive real roots found by the Aberth–Ehrlich census (diagnostic only)
    pub positive_real_roots: SmallVec<[f64; 8]>,
}

/// Compute Descartes' sign-variation upper bound for the sparse polynomial
/// `p(x) = c0 + c3·x³ + c6·x⁶ + x⁸` (monic leading term).
///
/// The returned value bounds the number of **positive real roots** from above;
/// a result of `0` guarantees there is none, so the caller can skip any numerical
/// root finding for `x > 0`. Coefficients with `|c| ≤ zero_eps` are treated as zero.
#[inline]
pub(crate) fn descartes_upper_bound_deg8_sparse(c0: f64, c3: f64, c6: f64, zero_eps: f64) -> u32 {
    #[inline]
    fn s(v: f64, eps: f64) -> i8 {
        if v.abs() <= eps {
            0
        } else if v.is_sign_positive() {
            1
        } else {
            -1
        }
    }
    // Descending degree: [x^8, x^6, x^3, x^0].
    let seq = [1_i8, s(c6, zero_eps), s(c3, zero_eps), s(c0, zero_eps)];

    let mut last = 0_i8;
    let mut count = 0_u32;
    for &cur in &seq {
        if cur == 0 {
            continue;
        }
        if last != 0 && cur != last {
            count += 1;
        }
        last = cur;
    }
    count
}

/// Census of the positive real roots via the Aberth–Ehrlich complex solver.
fn positive_real_roots(
    c0: f64,
    c3: f64,
    c6: f64,
    params: &IodParams,
) -> Result<SmallVec<[f64; 8]>, OrbdetError> {
    let poly = [c0, 0.0, 0.0, c3, 0.0, 0.0, c6, 0.0, 1.0];
    let roots = aberth(&poly, params.aberth_max_iter, params.aberth_eps);
    match roots.stop_reason {
        StopReason::Converged(_) | StopReason::MaxIteration(_) => Ok(roots
            .iter()
            .filter(|z| z.re > 0.0 && z.im.abs() < params.root_imag_eps)
            .map(|z| z.re)
            .collect()),
        StopReason::Failed(_) => Err(OrbdetError::PolynomialRootFindingFailed),
    }
}

/// Solve the range polynomial by Halley iteration from `seed` (canonical radii).
///
/// Arguments
/// -----------------
/// * `c6`, `c3`, `c0`: The three non-trivial coefficients.
/// * `seed`: Starting range magnitude (canonical radii; the fixed GPS-altitude
///   heuristic of the reference).
/// * `params`: Iteration budget, tolerance and Aberth census controls.
///
/// Return
/// ----------
/// * `Ok(PolynomialRootEstimate)` with the converged root and diagnostics.
/// * `Err(NoPositiveRoot)` when Descartes rules out any positive root or the
///   iteration converges to a non-positive value.
/// * `Err(NotConverged)` after the Halley cap.
pub fn solve_range_poly(
    c6: f64,
    c3: f64,
    c0: f64,
    seed: f64,
    params: &IodParams,
) -> Result<PolynomialRootEstimate, OrbdetError> {
    if descartes_upper_bound_deg8_sparse(c0, c3, c6, 0.0) == 0 {
        return Err(OrbdetError::NoPositiveRoot);
    }

    let f = |r: f64| r.powi(8) + c6 * r.powi(6) + c3 * r.powi(3) + c0;
    let fp = |r: f64| 8.0 * r.powi(7) + 6.0 * c6 * r.powi(5) + 3.0 * c3 * r.powi(2);
    let fpp = |r: f64| 56.0 * r.powi(6) + 30.0 * c6 * r.powi(4) + 6.0 * c3 * r;

    let mut r = seed;
    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < params.halley_max_iter {
        iterations += 1;
        let (fv, fpv, fppv) = (f(r), fp(r), fpp(r));
        let denom = 2.0 * fpv * fpv - fv * fppv;
        let dr = if denom.abs() > f64::MIN_POSITIVE {
            -2.0 * fv * fpv / denom
        } else {
            -fv / fpv
        };
        r += dr;
        if dr.abs() < params.halley_eps * r.abs().max(1.0) {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(OrbdetError::NotConverged {
            solver: "range_poly_halley",
            iterations,
        });
    }
    if !(r.is_finite() && r > 0.0) {
        return Err(OrbdetError::NoPositiveRoot);
    }

    Ok(PolynomialRootEstimate {
        root: r,
        iterations,
        possible_multiple_roots: c6 < 0.0 && c3 > 0.0,
        positive_real_roots: positive_real_roots(c0, c3, c6, params)?,
    })
}

#[cfg(test)]
mod poly8_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_descartes_bound() {
        // All positive coefficients: no sign change, no positive root.
        assert_eq!(descartes_upper_bound_deg8_sparse(1.0, 2.0, 3.0, 0.0), 0);
        // One sign change.
        assert_eq!(descartes_upper_bound_deg8_sparse(-1.0, 2.0, 3.0, 0.0), 1);
        // Alternating signs: three changes.
        assert_eq!(descartes_upper_bound_deg8_sparse(-1.0, 2.0, -3.0, 0.0), 3);
        // Near-zero coefficients are skipped.
        assert_eq!(descartes_upper_bound_deg8_sparse(-1.0, 1e-18, 3.0, 1e-12), 1);
    }

    #[test]
    fn test_known_root_recovered() {
        // Construct a polynomial with root at r = 2: pick c6 = -1, c3 = -2, then
        // c0 = -(2^8 - 2^6 - 2*2^3) = -(256 - 64 - 16) = -176.
        let (c6, c3) = (-1.0, -2.0);
        let c0 = -176.0;
        let params = IodParams::default();

        let est = solve_range_poly(c6, c3, c0, 3.13, &params).unwrap();
        assert_relative_eq!(est.root, 2.0, max_relative = 1e-8);
        assert!(!est.possible_multiple_roots);
        assert!(est
            .positive_real_roots
            .iter()
            .any(|&r| (r - 2.0).abs() < 1e-4));
    }

    #[test]
    fn test_no_positive_root_prefilter() {
        let params = IodParams::default();
        let err = solve_range_poly(3.0, 2.0, 1.0, 3.13, &params).unwrap_err();
        assert_eq!(err, OrbdetError::NoPositiveRoot);
    }

    #[test]
    fn test_ambiguity_signature_flagged() {
        // c6 < 0 and c3 > 0 triggers the multiple-root warning path.
        // r^8 - 20 r^6 + 5 r^3 - c0 with a root near 4.47: f(r)=0 for some r>0.
        let (c6, c3) = (-20.0, 5.0);
        // Choose c0 so that r = 4.0 is a root: 65536 - 81920 + 320 + c0 = 0.
        let c0 = 81920.0 - 65536.0 - 320.0;
        let params = IodParams::default();

        let est = solve_range_poly(c6, c3, c0, 3.13, &params).unwrap();
        assert!(est.possible_multiple_roots);
        assert!(est.root > 0.0);
    }
}
