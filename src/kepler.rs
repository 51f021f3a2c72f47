//! # Universal-variable Kepler propagator
//!
//! Propagates an inertial state vector by an elapsed time with the universal-variable
//! formulation: one Newton solve for the universal anomaly (shared with
//! [`crate::stumpff::iterate_universal_x`]), then Lagrange f/g recovery of the new state.
//! Works across all conic branches; the branch is derived from the state on entry and
//! never stored.

use nalgebra::Vector3;

use crate::constants::GravParams;
use crate::orbdet_errors::OrbdetError;
use crate::state_vector::StateVector;
use crate::stumpff::iterate_universal_x;

/// Elapsed times below this are treated as the identity propagation (s).
const DT_IDENTITY: f64 = 1e-9;

/// Propagate `state` by `dt_sec` seconds under two-body dynamics.
///
/// Arguments
/// -----------------
/// * `state`: Initial inertial state (km, km/s).
/// * `dt_sec`: Elapsed time (s); negative propagates backwards.
/// * `grav`: Physical constants.
/// * `max_iter`: Universal-anomaly Newton cap (reference value: 50).
///
/// Return
/// ----------
/// * `Ok(StateVector)` at `epoch + dt_sec`, or
/// * `Err(OrbdetError::NotConverged)` if the Newton loop exhausts the cap.
///
/// Notes
/// ----------
/// * `|dt_sec| < 1e-9` returns the input unchanged (identity shortcut).
/// * The Lagrange identity `f·ġ − ḟ·g = 1` is asserted in debug builds.
pub fn kepler(
    state: &StateVector,
    dt_sec: f64,
    grav: &GravParams,
    max_iter: usize,
) -> Result<StateVector, OrbdetError> {
    if dt_sec.abs() < DT_IDENTITY {
        return Ok(*state);
    }

    let r0 = state.position;
    let v0 = state.velocity;
    let mag_r0 = r0.norm();
    let r_dot_v = r0.dot(&v0);
    let alpha = state.alpha(grav.mu);
    let sqrt_mu = grav.mu.sqrt();

    let uni = iterate_universal_x(alpha, dt_sec, r_dot_v, mag_r0, &r0, &v0, grav.mu, max_iter);
    if !uni.converged {
        return Err(OrbdetError::NotConverged {
            solver: "kepler",
            iterations: uni.iterations,
        });
    }

    let x = uni.x;
    let z = uni.z;
    let (c2, c3) = (uni.c2, uni.c3);

    // Lagrange coefficients from the converged universal anomaly.
    let f = 1.0 - x * x * c2 / mag_r0;
    let g = dt_sec - x.powi(3) * c3 / sqrt_mu;

    let r_new: Vector3<f64> = r0 * f + v0 * g;
    let mag_r_new = r_new.norm();

    let gdot = 1.0 - x * x * c2 / mag_r_new;
    let fdot = sqrt_mu * x * (z * c3 - 1.0) / (mag_r_new * mag_r0);

    let v_new: Vector3<f64> = r0 * fdot + v0 * gdot;

    debug_assert!(
        (f * gdot - fdot * g - 1.0).abs() < 1e-6,
        "f/g consistency violated: {}",
        f * gdot - fdot * g
    );

    Ok(StateVector::new(
        r_new,
        v_new,
        state.epoch.add_seconds(dt_sec),
    ))
}
