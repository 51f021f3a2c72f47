//! # Three-position velocity completion: Gibbs and Herrick-Gibbs
//!
//! Both routines recover the velocity at the middle of three co-orbital position vectors.
//! The classical Gibbs vector formula is exact but ill-conditioned when the vectors are
//! closely spaced; the Herrick-Gibbs Taylor form is the small-angle substitute, valid only
//! below the 1° inter-vector regime. The angles-only solvers hand off between the two
//! based on the geometry diagnostic reported here.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{GravParams, Radian, ONE_DEGREE, SMALL};
use crate::orbdet_errors::OrbdetError;
use crate::state_vector::Epoch;

/// Geometry diagnostic shared by [`gibbs`] and [`herrick_gibbs`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GibbsDiagnostic {
    /// Out-of-plane angle of r1 against the (r2, r3) plane (rad)
    pub coplanarity_angle: Radian,
    /// Angle between r1 and r2 (rad)
    pub theta12: Radian,
    /// Angle between r2 and r3 (rad)
    pub theta23: Radian,
}

/// Angle between two vectors, safe against rounding outside [-1, 1].
#[inline]
fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a.dot(b) / (a.norm() * b.norm())).clamp(-1.0, 1.0).acos()
}

fn geometry_diagnostic(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    r3: &Vector3<f64>,
) -> GibbsDiagnostic {
    let p = r2.cross(r3);
    let copa = (p.normalize().dot(&r1.normalize())).clamp(-1.0, 1.0).asin();
    GibbsDiagnostic {
        coplanarity_angle: copa,
        theta12: angle_between(r1, r2),
        theta23: angle_between(r2, r3),
    }
}

/// Classical Gibbs velocity at the middle of three position vectors.
///
/// Arguments
/// -----------------
/// * `r1`, `r2`, `r3`: Time-ordered positions on a common two-body orbit (km).
/// * `grav`: Physical constants.
///
/// Return
/// ----------
/// * `Ok((v2, diagnostic))` – velocity at the middle epoch (km/s) plus the geometry diagnostic.
/// * `Err(NotCoplanar)` when r1 sits more than 1° out of the (r2, r3) plane.
/// * `Err(DegenerateGeometry)` when any inter-vector angle is below 1° (Herrick-Gibbs
///   territory) or the d/n construction degenerates.
pub fn gibbs(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    r3: &Vector3<f64>,
    grav: &GravParams,
) -> Result<(Vector3<f64>, GibbsDiagnostic), OrbdetError> {
    let diag = geometry_diagnostic(r1, r2, r3);
    if diag.coplanarity_angle.abs() > ONE_DEGREE {
        return Err(OrbdetError::NotCoplanar {
            angle_rad: diag.coplanarity_angle,
        });
    }
    if diag.theta12 < ONE_DEGREE || diag.theta23 < ONE_DEGREE {
        return Err(OrbdetError::DegenerateGeometry(
            "inter-vector angles below the 1 degree Gibbs regime",
        ));
    }

    let mag_r1 = r1.norm();
    let mag_r2 = r2.norm();
    let mag_r3 = r3.norm();

    let p = r2.cross(r3);
    let q = r3.cross(r1);
    let w = r1.cross(r2);

    let d = p + q + w;
    let n = p * mag_r1 + q * mag_r2 + w * mag_r3;

    let mag_d = d.norm();
    let mag_n = n.norm();
    if mag_d < SMALL || mag_n < SMALL {
        return Err(OrbdetError::DegenerateGeometry(
            "gibbs d/n vectors vanish",
        ));
    }
    // d and n must point the same way for a physically consistent conic.
    if n.dot(&d) / (mag_n * mag_d) < SMALL {
        return Err(OrbdetError::DegenerateGeometry(
            "gibbs d/n vectors are not co-directional",
        ));
    }

    let s = r1 * (mag_r2 - mag_r3) + r2 * (mag_r3 - mag_r1) + r3 * (mag_r1 - mag_r2);
    let b = d.cross(r2);
    let lg = (grav.mu / (mag_n * mag_d)).sqrt();

    let v2 = b * (lg / mag_r2) + s * lg;
    Ok((v2, diag))
}

/// Herrick-Gibbs Taylor-series velocity at the middle of three closely spaced positions.
///
/// The small-angle-safe substitute for [`gibbs`]: valid only when all inter-vector
/// angles are **below** the 1° tolerance.
///
/// Arguments
/// -----------------
/// * `r1`, `r2`, `r3`: Time-ordered positions (km).
/// * `t1`, `t2`, `t3`: Their epochs (strictly increasing).
/// * `grav`: Physical constants.
///
/// Return
/// ----------
/// * `Ok((v2, diagnostic))` – velocity at `t2` (km/s) plus the geometry diagnostic.
/// * `Err(NotCoplanar)` / `Err(DegenerateGeometry)` on the inverse of the Gibbs checks.
#[allow(clippy::too_many_arguments)]
pub fn herrick_gibbs(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    r3: &Vector3<f64>,
    t1: &Epoch,
    t2: &Epoch,
    t3: &Epoch,
    grav: &GravParams,
) -> Result<(Vector3<f64>, GibbsDiagnostic), OrbdetError> {
    let diag = geometry_diagnostic(r1, r2, r3);
    if diag.coplanarity_angle.abs() > ONE_DEGREE {
        return Err(OrbdetError::NotCoplanar {
            angle_rad: diag.coplanarity_angle,
        });
    }
    if diag.theta12 > ONE_DEGREE || diag.theta23 > ONE_DEGREE {
        return Err(OrbdetError::DegenerateGeometry(
            "inter-vector angles above the Herrick-Gibbs small-angle regime",
        ));
    }

    let dt21 = t2.seconds_from(t1);
    let dt31 = t3.seconds_from(t1);
    let dt32 = t3.seconds_from(t2);
    if dt21 <= 0.0 || dt32 <= 0.0 {
        return Err(OrbdetError::NonIncreasingEpochs);
    }

    let mu = grav.mu;
    let term1 = -dt32 * (1.0 / (dt21 * dt31) + mu / (12.0 * r1.norm().powi(3)));
    let term2 = (dt32 - dt21) * (1.0 / (dt21 * dt32) + mu / (12.0 * r2.norm().powi(3)));
    let term3 = dt21 * (1.0 / (dt32 * dt31) + mu / (12.0 * r3.norm().powi(3)));

    let v2 = r1 * term1 + r2 * term2 + r3 * term3;
    Ok((v2, diag))
}

#[cfg(test)]
mod gibbs_test {
    use super::*;
    use crate::kepler::kepler;
    use crate::state_vector::StateVector;
    use approx::assert_relative_eq;

    fn truth_state() -> StateVector {
        StateVector::new(
            Vector3::new(7_378.137, 0.0, 0.0),
            Vector3::new(0.0, 6.0, 4.0),
            Epoch::from_jd_split(2_460_000.5, 0.0),
        )
    }

    /// Propagate the truth orbit to three epochs separated by `dt` seconds.
    fn triplet(dt: f64) -> (StateVector, StateVector, StateVector) {
        let grav = GravParams::EARTH_WGS84;
        let s2 = truth_state();
        let s1 = kepler(&s2, -dt, &grav, 50).unwrap();
        let s3 = kepler(&s2, dt, &grav, 50).unwrap();
        (s1, s2, s3)
    }

    #[test]
    fn test_gibbs_recovers_middle_velocity() {
        let grav = GravParams::EARTH_WGS84;
        // ~8 degrees of arc between vectors: comfortably in the Gibbs regime.
        let (s1, s2, s3) = triplet(120.0);

        let (v2, diag) = gibbs(&s1.position, &s2.position, &s3.position, &grav).unwrap();
        assert!(diag.coplanarity_angle.abs() < 1e-9);
        assert_relative_eq!(
            (v2 - s2.velocity).norm() / s2.velocity.norm(),
            0.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_herrick_gibbs_recovers_middle_velocity() {
        let grav = GravParams::EARTH_WGS84;
        // ~0.5 degrees of arc: below the Gibbs regime.
        let (s1, s2, s3) = triplet(8.0);

        let (v2, _) = herrick_gibbs(
            &s1.position,
            &s2.position,
            &s3.position,
            &s1.epoch,
            &s2.epoch,
            &s3.epoch,
            &grav,
        )
        .unwrap();
        assert_relative_eq!(
            (v2 - s2.velocity).norm() / s2.velocity.norm(),
            0.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_small_angle_handoff() {
        let grav = GravParams::EARTH_WGS84;
        let (s1, s2, s3) = triplet(8.0);

        // Gibbs must refuse the small-angle geometry...
        let err = gibbs(&s1.position, &s2.position, &s3.position, &grav).unwrap_err();
        assert!(matches!(err, OrbdetError::DegenerateGeometry(_)));

        // ...and Herrick-Gibbs must accept the same input.
        assert!(herrick_gibbs(
            &s1.position,
            &s2.position,
            &s3.position,
            &s1.epoch,
            &s2.epoch,
            &s3.epoch,
            &grav,
        )
        .is_ok());
    }

    #[test]
    fn test_not_coplanar_rejected() {
        let grav = GravParams::EARTH_WGS84;
        let (s1, s2, s3) = triplet(120.0);
        // Push r1 well out of the orbit plane.
        let r1_bad = s1.position + Vector3::new(0.0, 0.0, 1_500.0);

        let err = gibbs(&r1_bad, &s2.position, &s3.position, &grav).unwrap_err();
        assert!(matches!(err, OrbdetError::NotCoplanar { .. }));
    }
}
