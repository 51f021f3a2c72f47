//! # Earth-impact guard for transfer orbits
//!
//! Post-check shared by both Lambert solvers: classifies whether a computed transfer
//! orbit dips below a padded Earth radius between its endpoints. Pure classification,
//! no iteration; the verdict rides on the solution as an annotation because callers
//! may still want the numbers for a trajectory that grazes the pad.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{GravParams, Kilometer, SMALL};

/// Why (or why not) the transfer was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactReason {
    /// Trajectory stays above the padded radius
    Clear,
    /// An endpoint radius is already below the padded radius
    EndpointBelowPad,
    /// The arc passes perigee and the perigee radius is below the padded radius
    PerigeeBelowPad,
}

/// Earth-impact verdict with the derived transfer-orbit scalars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarthImpact {
    pub hit: bool,
    pub reason: ImpactReason,
    /// Perigee radius of the transfer orbit (km, or canonical radii)
    pub rp: f64,
    /// Semi-major axis of the transfer orbit (signed; very large near parabolic)
    pub a: f64,
}

/// Classify a transfer orbit against a padded Earth radius.
///
/// The perigee radius is derived from the transfer energy and eccentricity at `r1`
/// (`rp = p / (1 + ecc)`, equivalent to `a (1 − ecc)` and robust through the parabolic
/// branch). The check is branched on `nrev`:
///
/// * `nrev > 0` – the arc completes at least one revolution, so it always passes
///   perigee: the perigee radius is always checked.
/// * `nrev = 0` – only the radial-velocity sign combinations that can pass perigee are
///   checked: inbound departure with outbound arrival always does; same-sign
///   combinations only when the true-anomaly sweep wraps through perigee. Endpoints
///   below the pad are immediate hits.
///
/// Arguments
/// -----------------
/// * `alt_pad`: Padding altitude above `grav.re` (same unit as the positions).
/// * `r1`, `v1t`: Departure position and transfer velocity.
/// * `r2`, `v2t`: Arrival position and transfer velocity.
/// * `nrev`: Complete revolutions on the transfer arc.
/// * `grav`: Physical constants (use [`check_hit_earth_canonical`] for canonical units).
pub fn check_hit_earth(
    alt_pad: Kilometer,
    r1: &Vector3<f64>,
    v1t: &Vector3<f64>,
    r2: &Vector3<f64>,
    v2t: &Vector3<f64>,
    nrev: u32,
    grav: &GravParams,
) -> EarthImpact {
    let mu = grav.mu;
    let r_pad = grav.re + alt_pad;

    let mag_r1 = r1.norm();
    let mag_r2 = r2.norm();

    // Transfer-orbit scalars, derived fresh from the endpoint state.
    let v1_sq = v1t.norm_squared();
    let ksi = v1_sq / 2.0 - mu / mag_r1;
    let a = if ksi.abs() > SMALL {
        -mu / (2.0 * ksi)
    } else {
        f64::INFINITY
    };
    let h = r1.cross(v1t);
    let p = h.norm_squared() / mu;
    let e_vec = (r1 * (v1_sq - mu / mag_r1) - v1t * r1.dot(v1t)) / mu;
    let ecc = e_vec.norm();
    let rp = p / (1.0 + ecc);

    if mag_r1 < r_pad || mag_r2 < r_pad {
        return EarthImpact {
            hit: true,
            reason: ImpactReason::EndpointBelowPad,
            rp,
            a,
        };
    }

    let passes_perigee = if nrev > 0 {
        true
    } else if ecc < SMALL {
        // Near-circular: radius is essentially constant, already covered above.
        false
    } else {
        let rdotv1 = r1.dot(v1t);
        let rdotv2 = r2.dot(v2t);
        if rdotv1 < 0.0 && rdotv2 > 0.0 {
            true
        } else if rdotv1 > 0.0 && rdotv2 < 0.0 {
            // Passes apogee only.
            false
        } else {
            // Same-sign combinations: the sweep passes perigee iff the true anomaly
            // wraps through zero between departure and arrival.
            let nu1 = true_anomaly(&e_vec, ecc, r1, rdotv1);
            let nu2 = true_anomaly(&e_vec, ecc, r2, rdotv2);
            nu2 < nu1
        }
    };

    if passes_perigee && rp < r_pad {
        EarthImpact {
            hit: true,
            reason: ImpactReason::PerigeeBelowPad,
            rp,
            a,
        }
    } else {
        EarthImpact {
            hit: false,
            reason: ImpactReason::Clear,
            rp,
            a,
        }
    }
}

/// Canonical-unit variant: positions in Earth radii, velocities in canonical velocity
/// units, `alt_pad` in Earth radii. Shares all logic with [`check_hit_earth`].
pub fn check_hit_earth_canonical(
    alt_pad_er: f64,
    r1: &Vector3<f64>,
    v1t: &Vector3<f64>,
    r2: &Vector3<f64>,
    v2t: &Vector3<f64>,
    nrev: u32,
) -> EarthImpact {
    let canonical = GravParams { mu: 1.0, re: 1.0 };
    check_hit_earth(alt_pad_er, r1, v1t, r2, v2t, nrev, &canonical)
}

/// True anomaly in [0, 2π) from the eccentricity vector and the radial-velocity sign.
fn true_anomaly(e_vec: &Vector3<f64>, ecc: f64, r: &Vector3<f64>, rdotv: f64) -> f64 {
    let cos_nu = (e_vec.dot(r) / (ecc * r.norm())).clamp(-1.0, 1.0);
    let nu = cos_nu.acos();
    if rdotv >= 0.0 {
        nu
    } else {
        crate::constants::DPI - nu
    }
}
