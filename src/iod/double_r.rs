//! # Double-R angles-only IOD
//!
//! Maintains two independent unknowns — the range magnitudes at the first and middle
//! epochs — and drives them with a 2×2 finite-difference Newton iteration. The
//! residual function [`doubler`] reconstructs all three positions (the third through
//! the common-perpendicular coplanarity relation), fits the conic through them, and
//! measures the time intervals the fitted orbit implies against the observed ones via
//! the eccentric-anomaly (or hyperbolic-anomaly) differences.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{GravParams, Seconds, SMALL};
use crate::iod::{IodParams, IterationRecord, ObservationTriple};
use crate::orbdet_errors::OrbdetError;
use crate::state_vector::StateVector;

/// Double-R solution: the state at the middle epoch plus iteration diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleRSolution {
    pub state: StateVector,
    /// Outer Newton iterations consumed
    pub iterations: usize,
    /// Final residual quality `sqrt(f1² + f2²)` (s)
    pub quality: f64,
    /// Converged range magnitude at t1 (km)
    pub mag_r1: f64,
    /// Converged range magnitude at t2 (km)
    pub mag_r2: f64,
}

/// One evaluation of the Double-R residual function.
struct DoublerEval {
    r2: Vector3<f64>,
    r3: Vector3<f64>,
    /// `tau1 − ΔM12/n` (s)
    f1: f64,
    /// `tau3 − ΔM32/n` (s)
    f2: f64,
    /// `sqrt(f1² + f2²)`
    q: f64,
    /// Lagrange f over the (t2, t3) interval of the fitted conic
    f_lagr: f64,
    /// Lagrange g over the (t2, t3) interval (s)
    g_lagr: f64,
}

/// Solve the along-LOS quadratic `|rho·L + rs| = magr` for the positive range.
fn range_from_magnitude(cc: f64, mag_site_sq: f64, mag_r: f64) -> Result<f64, OrbdetError> {
    let disc = cc * cc - 4.0 * (mag_site_sq - mag_r * mag_r);
    if disc < 0.0 {
        return Err(OrbdetError::DegenerateGeometry(
            "range magnitude below the site horizon for this line of sight",
        ));
    }
    Ok((-cc + disc.sqrt()) * 0.5)
}

/// Residual function: reconstruct the geometry for a pair of range magnitudes and
/// measure the Kepler-equation time consistency.
#[allow(clippy::too_many_arguments)]
fn doubler(
    obs: &ObservationTriple,
    cc1: f64,
    cc2: f64,
    mag_rs1_sq: f64,
    mag_rs2_sq: f64,
    mag_r1_in: f64,
    mag_r2_in: f64,
    tau1: Seconds,
    tau3: Seconds,
    grav: &GravParams,
) -> Result<DoublerEval, OrbdetError> {
    let mu = grav.mu;

    let rho1 = range_from_magnitude(cc1, mag_rs1_sq, mag_r1_in)?;
    let rho2 = range_from_magnitude(cc2, mag_rs2_sq, mag_r2_in)?;

    let r1 = obs.first().los * rho1 + obs.first().site_eci;
    let r2 = obs.middle().los * rho2 + obs.middle().site_eci;

    // Third range from the coplanarity (common-perpendicular) relation.
    let w = r1.cross(&r2).normalize();
    let l3_dot_w = obs.last().los.dot(&w);
    if l3_dot_w.abs() < SMALL {
        return Err(OrbdetError::DegenerateGeometry(
            "third line of sight parallel to the orbit plane",
        ));
    }
    let rho3 = -obs.last().site_eci.dot(&w) / l3_dot_w;
    let r3 = obs.last().los * rho3 + obs.last().site_eci;

    let mag_r1 = r1.norm();
    let mag_r2 = r2.norm();
    let mag_r3 = r3.norm();

    // Transfer angles between the reconstructed positions.
    let angle = |a: &Vector3<f64>, b: &Vector3<f64>| -> (f64, f64) {
        let c = (a.dot(b) / (a.norm() * b.norm())).clamp(-1.0, 1.0);
        (c, (1.0 - c * c).max(0.0).sqrt())
    };
    let (cosdv21, sindv21) = angle(&r2, &r1);
    let (cosdv32, sindv32) = angle(&r3, &r2);
    let dv21 = sindv21.atan2(cosdv21);
    let dv32 = sindv32.atan2(cosdv32);
    let dv31 = dv21 + dv32;
    let (sindv31, cosdv31) = dv31.sin_cos();

    // Semi-latus rectum of the conic through three coplanar positions.
    let denom = sindv32 / mag_r1 - sindv31 / mag_r2 + sindv21 / mag_r3;
    if denom.abs() < f64::MIN_POSITIVE {
        return Err(OrbdetError::DegenerateGeometry(
            "collinear position reconstruction",
        ));
    }
    let p = (sindv32 - sindv31 + sindv21) / denom;

    let ecosv1 = p / mag_r1 - 1.0;
    let ecosv2 = p / mag_r2 - 1.0;
    let ecosv3 = p / mag_r3 - 1.0;

    let esinv2 = if (dv21 - std::f64::consts::PI).abs() > SMALL {
        (ecosv1 - cosdv21 * ecosv2) / sindv21
    } else {
        (cosdv32 * ecosv2 - ecosv3) / sindv32
    };

    let ecc_sq = ecosv2 * ecosv2 + esinv2 * esinv2;
    let a = p / (1.0 - ecc_sq);

    let (deltam12, deltam32, n, f_lagr, g_lagr) = if a > 0.0 {
        // Elliptic branch.
        let n = (mu / a.powi(3)).sqrt();
        let sqrt_ap = (a * p).sqrt();
        let one_p_ecosv2 = 1.0 + ecosv2;
        let esin_e2 = (1.0 - ecc_sq).sqrt() * esinv2 / one_p_ecosv2;
        let ecos_e2 = (ecc_sq + ecosv2) / one_p_ecosv2;

        let sinde32 = mag_r3 / sqrt_ap * sindv32
            - mag_r2 * mag_r3 / (p * sqrt_ap) * (1.0 - cosdv32) * esinv2;
        let cosde32 = 1.0 - mag_r2 * mag_r3 / (a * p) * (1.0 - cosdv32);
        let deltae32 = sinde32.atan2(cosde32);

        let sinde21 = mag_r1 / sqrt_ap * sindv21
            + mag_r1 * mag_r2 / (p * sqrt_ap) * (1.0 - cosdv21) * esinv2;
        let cosde21 = 1.0 - mag_r2 * mag_r1 / (a * p) * (1.0 - cosdv21);
        let deltae21 = sinde21.atan2(cosde21);

        let deltam32 =
            deltae32 + esin_e2 * (1.0 - deltae32.cos()) - ecos_e2 * deltae32.sin();
        let deltam12 =
            -deltae21 + esin_e2 * (1.0 - deltae21.cos()) + ecos_e2 * deltae21.sin();

        let f = 1.0 - a / mag_r2 * (1.0 - deltae32.cos());
        let g = tau3 - (a.powi(3) / mu).sqrt() * (deltae32 - deltae32.sin());
        (deltam12, deltam32, n, f, g)
    } else {
        // Hyperbolic fallback when the fitted semi-major axis is negative.
        let n = (mu / (-a).powi(3)).sqrt();
        let one_p_ecosv2 = 1.0 + ecosv2;
        let esinh_h2 = (ecc_sq - 1.0).sqrt() * esinv2 / one_p_ecosv2;
        let ecosh_h2 = (ecc_sq + ecosv2) / one_p_ecosv2;

        let sqrt_map = (-a * p).sqrt();
        let sindh32 = mag_r3 / sqrt_map * sindv32
            - mag_r2 * mag_r3 / (p * sqrt_map) * (1.0 - cosdv32) * esinv2;
        let deltah32 = sindh32.asinh();
        let sindh21 = mag_r1 / sqrt_map * sindv21
            + mag_r1 * mag_r2 / (p * sqrt_map) * (1.0 - cosdv21) * esinv2;
        let deltah21 = sindh21.asinh();

        let deltam32 =
            esinh_h2 * (deltah32.cosh() - 1.0) + ecosh_h2 * deltah32.sinh() - deltah32;
        let deltam12 =
            esinh_h2 * (deltah21.cosh() - 1.0) - ecosh_h2 * deltah21.sinh() + deltah21;

        let f = 1.0 - a / mag_r2 * (1.0 - deltah32.cosh());
        let g = tau3 - ((-a).powi(3) / mu).sqrt() * (deltah32.sinh() - deltah32);
        (deltam12, deltam32, n, f, g)
    };

    let f1 = tau1 - deltam12 / n;
    let f2 = tau3 - deltam32 / n;
    let q = (f1 * f1 + f2 * f2).sqrt();

    Ok(DoublerEval {
        r2,
        r3,
        f1,
        f2,
        q,
        f_lagr,
        g_lagr,
    })
}

/// Recover a state vector at the middle epoch by the Double-R method.
///
/// Arguments
/// -----------------
/// * `obs`: The observation triple (arc below one revolution).
/// * `mag_r1_guess`, `mag_r2_guess`: Initial radii at t1 and t2 (km).
/// * `pct_chg`: Initial finite-difference perturbation fraction (halved each outer
///   iteration; the reference uses 0.005).
/// * `grav`, `params`: Physical constants and iteration budget.
///
/// Return
/// ----------
/// * `Ok(DoubleRSolution)` once both range updates drop below
///   `doubler_range_tol_km`, or `Err(NotConverged)` after `doubler_max_outer`.
///
/// Notes
/// ----------
/// * Each Newton step is clamped to `doubler_step_clamp` (10 %) of the current
///   range magnitude, which keeps a bad Jacobian from ejecting the iterate.
pub fn angles_double_r(
    obs: &ObservationTriple,
    mag_r1_guess: f64,
    mag_r2_guess: f64,
    pct_chg: f64,
    grav: &GravParams,
    params: &IodParams,
) -> Result<DoubleRSolution, OrbdetError> {
    let cc1 = 2.0 * obs.first().los.dot(&obs.first().site_eci);
    let cc2 = 2.0 * obs.middle().los.dot(&obs.middle().site_eci);
    let mag_rs1_sq = obs.first().site_eci.norm_squared();
    let mag_rs2_sq = obs.middle().site_eci.norm_squared();

    let tau1 = obs.tau1();
    let tau3 = obs.tau3();

    let mut mag_r1 = mag_r1_guess;
    let mut mag_r2 = mag_r2_guess;
    let mut pct = pct_chg;

    let eval = |m1: f64, m2: f64| {
        doubler(
            obs, cc1, cc2, mag_rs1_sq, mag_rs2_sq, m1, m2, tau1, tau3, grav,
        )
    };

    let mut converged = false;
    let mut iterations = 0usize;

    for ktr in 1..=params.doubler_max_outer {
        iterations = ktr;
        let base = eval(mag_r1, mag_r2)?;

        // 2x2 finite-difference Jacobian, perturbing each range by pct of itself.
        let dr1 = pct * mag_r1;
        let e1 = eval(mag_r1 + dr1, mag_r2)?;
        let pf1pr1 = (e1.f1 - base.f1) / dr1;
        let pf2pr1 = (e1.f2 - base.f2) / dr1;

        let dr2 = pct * mag_r2;
        let e2 = eval(mag_r1, mag_r2 + dr2)?;
        let pf1pr2 = (e2.f1 - base.f1) / dr2;
        let pf2pr2 = (e2.f2 - base.f2) / dr2;

        let delta = pf1pr1 * pf2pr2 - pf2pr1 * pf1pr2;
        if delta.abs() < f64::MIN_POSITIVE {
            return Err(OrbdetError::DegenerateGeometry(
                "singular double-r jacobian",
            ));
        }
        let delta1 = pf2pr2 * base.f1 - pf1pr2 * base.f2;
        let delta2 = pf1pr1 * base.f2 - pf2pr1 * base.f1;

        let mut step1 = -delta1 / delta;
        let mut step2 = -delta2 / delta;

        // Clamp any single step to a fraction of its range magnitude.
        let clamp1 = params.doubler_step_clamp * mag_r1;
        let clamp2 = params.doubler_step_clamp * mag_r2;
        step1 = step1.clamp(-clamp1, clamp1);
        step2 = step2.clamp(-clamp2, clamp2);

        mag_r1 += step1;
        mag_r2 += step2;
        pct *= 0.5;

        params.emit(IterationRecord {
            solver: "double_r",
            iteration: ktr,
            residual: base.q,
            estimates: [mag_r1, mag_r2],
        });
        debug!(ktr, q = base.q, mag_r1, mag_r2, "double-r outer iteration");

        if step1.abs() < params.doubler_range_tol_km && step2.abs() < params.doubler_range_tol_km
        {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(OrbdetError::NotConverged {
            solver: "double_r",
            iterations,
        });
    }

    let fin = eval(mag_r1, mag_r2)?;
    if fin.g_lagr.abs() < f64::MIN_POSITIVE {
        return Err(OrbdetError::DegenerateGeometry("vanishing lagrange g"));
    }
    let v2 = (fin.r3 - fin.r2 * fin.f_lagr) / fin.g_lagr;

    Ok(DoubleRSolution {
        state: StateVector::new(fin.r2, v2, obs.middle().epoch),
        iterations,
        quality: fin.q,
        mag_r1,
        mag_r2,
    })
}
