//! # Gooding angles-only IOD
//!
//! The most demanding of the four solvers: the unknowns are the range magnitudes at
//! the **outer** epochs, and the residual oracle is a full boundary-value/initial-value
//! chain — a Lambert solve between the reconstructed outer positions (universal
//! variable, with the automatic Battin fallback), then a Kepler propagation to the
//! middle epoch. The predicted topocentric direction is compared against the observed
//! middle line of sight through its two perpendicular components, and a 2-D Halley
//! iteration (finite-difference first and second partials) drives the ranges.
//!
//! Lambert failures trigger a chain of three restart heuristics (closest-approach
//! ranges, common-perpendicular ranges, zero ranges) before the solver gives up.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{GravParams, SMALL};
use crate::kepler::kepler;
use crate::lambert::{lambert_u_mins, lambert_univ, DirectionOfMotion, EnergyBranch};
use crate::iod::{IodParams, IterationRecord, ObservationTriple};
use crate::orbdet_errors::OrbdetError;
use crate::state_vector::StateVector;

/// Gooding solution: state at the middle epoch plus iteration diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodingSolution {
    pub state: StateVector,
    /// Halley iterations consumed
    pub iterations: usize,
    /// Restart heuristics consumed on Lambert failures
    pub restarts: usize,
    /// Final scaled residual `sqrt(f² + g²)/den`
    pub crit: f64,
    /// Jacobian axis ratio (singular-value ratio) at the last iteration
    pub ax_ratio: f64,
    /// Orientation of the dominant Jacobian axis (rad)
    pub bearing: f64,
}

/// Residual pair of one range-pair evaluation: the components of the predicted
/// middle-epoch topocentric vector perpendicular to the observed line of sight,
/// plus the predicted slant range for scaling.
struct PsEval {
    f: f64,
    g: f64,
    den: f64,
}

/// Map the half-revolution count onto Lambert inputs.
#[inline]
fn transfer_branch(num_half_rev: u32) -> (DirectionOfMotion, u32) {
    let nrev = num_half_rev / 2;
    let dm = if num_half_rev % 2 == 0 {
        DirectionOfMotion::Short
    } else {
        DirectionOfMotion::Long
    };
    (dm, nrev)
}

/// The range-consistency oracle: reconstruct r1/r3, solve Lambert between them,
/// propagate to the middle epoch and project the prediction error on (p̂, q̂).
#[allow(clippy::too_many_arguments)]
fn calc_ps(
    obs: &ObservationTriple,
    rho1: f64,
    rho3: f64,
    num_half_rev: u32,
    phat: &Vector3<f64>,
    qhat: &Vector3<f64>,
    grav: &GravParams,
    params: &IodParams,
) -> Result<PsEval, OrbdetError> {
    let r1 = obs.first().site_eci + obs.first().los * rho1;
    let r3 = obs.last().site_eci + obs.last().los * rho3;

    let tof = obs.last().epoch.seconds_from(&obs.first().epoch);
    let dt12 = obs.middle().epoch.seconds_from(&obs.first().epoch);

    let (dm, nrev) = transfer_branch(num_half_rev);
    let psi_boundary = if nrev > 0 {
        Some(lambert_u_mins(&r1, &r3, dm, nrev, grav)?)
    } else {
        None
    };

    // The middle line of sight approximates an in-plane direction; it only matters
    // when the transfer degenerates to 180 deg and the plane needs a hint.
    let v1_hint = obs.middle().los;

    let sol = lambert_univ(
        &r1,
        &r3,
        &v1_hint,
        dm,
        EnergyBranch::Low,
        nrev,
        tof,
        psi_boundary,
        0.0,
        grav,
        params,
    )?;

    let start = StateVector::new(r1, sol.v1, obs.first().epoch);
    let mid = kepler(&start, dt12, grav, params.kepler_max_iter)?;

    let rho2_pred = mid.position - obs.middle().site_eci;
    Ok(PsEval {
        f: rho2_pred.dot(phat),
        g: rho2_pred.dot(qhat),
        den: rho2_pred.norm().max(SMALL),
    })
}

/// Restart heuristics for the range pair, tried in order on Lambert failure.
fn restart_ranges(obs: &ObservationTriple, attempt: usize) -> (f64, f64) {
    match attempt {
        // Ranges of the points along each line of sight closest to the geocenter.
        1 => (
            (-obs.first().site_eci.dot(&obs.first().los)).max(0.0),
            (-obs.last().site_eci.dot(&obs.last().los)).max(0.0),
        ),
        // Mutual closest points of the two outer lines of sight.
        2 => {
            let l1 = obs.first().los;
            let l3 = obs.last().los;
            let d = obs.last().site_eci - obs.first().site_eci;
            let b = l1.dot(&l3);
            let denom = 1.0 - b * b;
            if denom.abs() < SMALL {
                (0.0, 0.0)
            } else {
                let e = l1.dot(&d);
                let f = l3.dot(&d);
                (
                    ((e - b * f) / denom).max(0.0),
                    ((b * e - f) / denom).max(0.0),
                )
            }
        }
        // Collapse onto the sites.
        _ => (0.0, 0.0),
    }
}

/// Recover a state vector at the middle epoch by Gooding's method.
///
/// Arguments
/// -----------------
/// * `obs`: The observation triple.
/// * `num_half_rev`: Half revolutions of the t1→t3 transfer (0 = short way direct,
///   1 = long way direct, 2 = one full revolution short way, …).
/// * `range_guess_1`, `range_guess_3`: Initial slant ranges at the outer epochs (km).
/// * `grav`, `params`: Physical constants and iteration budget.
///
/// Return
/// ----------
/// * `Ok(GoodingSolution)` when the scaled residual drops below `gooding_crit_val`
///   (or, in the near-singular minimize mode, when the residual-norm gradient
///   stabilizes below the same threshold).
/// * `Err(LambertRestartExhausted)` when the restart chain runs dry.
/// * `Err(NotConverged)` after `gooding_max_iter` iterations.
pub fn angles_gooding(
    obs: &ObservationTriple,
    num_half_rev: u32,
    range_guess_1: f64,
    range_guess_3: f64,
    grav: &GravParams,
    params: &IodParams,
) -> Result<GoodingSolution, OrbdetError> {
    // Fixed residual frame perpendicular to the middle line of sight.
    let l2 = obs.middle().los;
    let mut helper = obs.first().los;
    if l2.cross(&helper).norm() < SMALL {
        helper = obs.last().los;
    }
    let phat = l2.cross(&helper).normalize();
    let qhat = l2.cross(&phat);

    let mut rho1 = range_guess_1;
    let mut rho3 = range_guess_3;
    let mut restarts = 0usize;

    let mut ax_ratio = 1.0;
    let mut bearing = 0.0;
    let mut crit = f64::INFINITY;
    let mut iterations = 0usize;

    let eval = |r1: f64, r3: f64| {
        calc_ps(obs, r1, r3, num_half_rev, &phat, &qhat, grav, params)
    };

    let mut converged = false;
    while iterations < params.gooding_max_iter {
        iterations += 1;

        let center = match eval(rho1, rho3) {
            Ok(c) => c,
            Err(_) => {
                restarts += 1;
                if restarts > params.gooding_max_restarts {
                    return Err(OrbdetError::LambertRestartExhausted {
                        attempts: restarts - 1,
                    });
                }
                let (n1, n3) = restart_ranges(obs, restarts);
                debug!(restarts, n1, n3, "gooding restart heuristic engaged");
                rho1 = n1;
                rho3 = n3;
                continue;
            }
        };

        crit = (center.f * center.f + center.g * center.g).sqrt() / center.den;
        params.emit(IterationRecord {
            solver: "gooding",
            iteration: iterations,
            residual: crit,
            estimates: [rho1, rho3],
        });
        if crit < params.gooding_crit_val {
            converged = true;
            break;
        }

        // Finite-difference first and second partials (2-D Halley scheme).
        let d1 = params.gooding_pert_frac * (rho1.abs() + grav.re);
        let d3 = params.gooding_pert_frac * (rho3.abs() + grav.re);

        let (xp, xm, yp, ym, xpyp) = match (
            eval(rho1 + d1, rho3),
            eval(rho1 - d1, rho3),
            eval(rho1, rho3 + d3),
            eval(rho1, rho3 - d3),
            eval(rho1 + d1, rho3 + d3),
        ) {
            (Ok(a), Ok(b), Ok(c), Ok(d), Ok(e)) => (a, b, c, d, e),
            _ => {
                restarts += 1;
                if restarts > params.gooding_max_restarts {
                    return Err(OrbdetError::LambertRestartExhausted {
                        attempts: restarts - 1,
                    });
                }
                let (n1, n3) = restart_ranges(obs, restarts);
                rho1 = n1;
                rho3 = n3;
                continue;
            }
        };

        let fx = (xp.f - xm.f) / (2.0 * d1);
        let fy = (yp.f - ym.f) / (2.0 * d3);
        let gx = (xp.g - xm.g) / (2.0 * d1);
        let gy = (yp.g - ym.g) / (2.0 * d3);

        let fxx = (xp.f - 2.0 * center.f + xm.f) / (d1 * d1);
        let fyy = (yp.f - 2.0 * center.f + ym.f) / (d3 * d3);
        let fxy = (xpyp.f - xp.f - yp.f + center.f) / (d1 * d3);
        let gxx = (xp.g - 2.0 * center.g + xm.g) / (d1 * d1);
        let gyy = (yp.g - 2.0 * center.g + ym.g) / (d3 * d3);
        let gxy = (xpyp.g - xp.g - yp.g + center.g) / (d1 * d3);

        // Singular-value diagnostics of the 2x2 Jacobian.
        let a11 = fx * fx + gx * gx;
        let a12 = fx * fy + gx * gy;
        let a22 = fy * fy + gy * gy;
        let det_j = fx * gy - fy * gx;
        let half_tr = 0.5 * (a11 + a22);
        let disc = (half_tr * half_tr - det_j * det_j).max(0.0).sqrt();
        let sig_max = (half_tr + disc).max(f64::MIN_POSITIVE).sqrt();
        let sig_min = (half_tr - disc).max(0.0).sqrt();
        ax_ratio = sig_min / sig_max;
        bearing = 0.5 * (2.0 * a12).atan2(a11 - a22);

        let (step1, step3) = if ax_ratio < 1e-9 || det_j.abs() < f64::MIN_POSITIVE {
            // Minimize mode: the target component is unreachable; descend the
            // residual norm along the well-conditioned direction.
            let grad1 = center.f * fx + center.g * gx;
            let grad3 = center.f * fy + center.g * gy;
            let grad_norm = (grad1 * grad1 + grad3 * grad3).sqrt();
            if grad_norm / center.den < params.gooding_crit_val {
                // Derivative-based stopping criterion has stabilized.
                converged = true;
                break;
            }
            let scale = (center.f * center.f + center.g * center.g)
                / (grad_norm * grad_norm).max(f64::MIN_POSITIVE);
            (-grad1 * scale, -grad3 * scale)
        } else {
            // Newton step...
            let n1 = (-center.f * gy + center.g * fy) / det_j;
            let n3 = (-center.g * fx + center.f * gx) / det_j;
            // ...with the Halley curvature correction.
            let hf = fxx * n1 * n1 + 2.0 * fxy * n1 * n3 + fyy * n3 * n3;
            let hg = gxx * n1 * n1 + 2.0 * gxy * n1 * n3 + gyy * n3 * n3;
            let cf = center.f + 0.5 * hf;
            let cg = center.g + 0.5 * hg;
            (
                (-cf * gy + cg * fy) / det_j,
                (-cg * fx + cf * gx) / det_j,
            )
        };

        rho1 = (rho1 + step1).max(0.0);
        rho3 = (rho3 + step3).max(0.0);
    }

    if !converged {
        return Err(OrbdetError::NotConverged {
            solver: "gooding",
            iterations,
        });
    }

    // Final reconstruction at the converged ranges.
    let r1 = obs.first().site_eci + obs.first().los * rho1;
    let r3 = obs.last().site_eci + obs.last().los * rho3;
    let tof = obs.last().epoch.seconds_from(&obs.first().epoch);
    let dt12 = obs.middle().epoch.seconds_from(&obs.first().epoch);
    let (dm, nrev) = transfer_branch(num_half_rev);
    let psi_boundary = if nrev > 0 {
        Some(lambert_u_mins(&r1, &r3, dm, nrev, grav)?)
    } else {
        None
    };
    let sol = lambert_univ(
        &r1,
        &r3,
        &obs.middle().los,
        dm,
        EnergyBranch::Low,
        nrev,
        tof,
        psi_boundary,
        0.0,
        grav,
        params,
    )?;
    let start = StateVector::new(r1, sol.v1, obs.first().epoch);
    let mid = kepler(&start, dt12, grav, params.kepler_max_iter)?;

    Ok(GoodingSolution {
        state: mid,
        iterations,
        restarts,
        crit,
        ax_ratio,
        bearing,
    })
}
