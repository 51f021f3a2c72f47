//! # Gauss angles-only IOD
//!
//! Inverts the line-of-sight direction matrix against the site matrix to express the
//! three slant ranges through the middle geocentric distance, solves
//! the same degree-8 polynomial class as Laplace (identical Halley-from-seed root
//! procedure, plus the Descartes prefilter and Aberth census), and completes the
//! velocity with Gibbs — falling back to Herrick-Gibbs when the position vectors are
//! near-parallel.
//!
//! An optional differential-correction loop (off by default, reference behavior)
//! replaces the truncated f/g series with exact universal-variable values at the
//! outer epochs and re-solves the ranges until the middle range stabilizes.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{GravParams, SMALL};
use crate::gibbs::{gibbs, herrick_gibbs};
use crate::iod::poly8::{solve_range_poly, PolynomialRootEstimate};
use crate::iod::{IodParams, IterationRecord, ObservationTriple};
use crate::orbdet_errors::OrbdetError;
use crate::state_vector::StateVector;
use crate::stumpff::iterate_universal_x;

/// Gauss solution: the recovered state at the middle epoch plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussSolution {
    pub state: StateVector,
    pub root: PolynomialRootEstimate,
    /// Whether the differential-correction loop ran and converged
    pub refined: bool,
    /// Iterations consumed by the correction loop (0 when disabled)
    pub refine_iterations: usize,
}

/// Exact Lagrange f and g at `tau` (canonical units) from a state at the middle epoch.
fn fg_series_exact(
    r: &Vector3<f64>,
    v: &Vector3<f64>,
    tau: f64,
    kepler_max_iter: usize,
) -> (f64, f64) {
    let mag_r = r.norm();
    let alpha = 2.0 / mag_r - v.norm_squared();
    let uni = iterate_universal_x(alpha, tau, r.dot(v), mag_r, r, v, 1.0, kepler_max_iter);
    let f = 1.0 - uni.x * uni.x * uni.c2 / mag_r;
    let g = tau - uni.x.powi(3) * uni.c3;
    (f, g)
}

/// Solve the three slant ranges for a given coefficient triple `(c1, -1, c3)`.
///
/// `m` is the inverted direction matrix times the site matrix. Ranges follow the
/// classical relation `rho_i = -(M c)_i / c_i`.
fn ranges_from_coeffs(m: &Matrix3<f64>, c1: f64, c3: f64) -> Vector3<f64> {
    let c = Vector3::new(c1, -1.0, c3);
    let crhom = m * c;
    -crhom.component_div(&c)
}

/// Recover a state vector at the middle epoch by the Gauss method.
///
/// Arguments
/// -----------------
/// * `obs`: The observation triple.
/// * `grav`: Physical constants.
/// * `params`: Root-finding controls, plus `gauss_refine` to enable the
///   differential-correction loop.
///
/// Return
/// ----------
/// * `Ok(GaussSolution)`; `root.possible_multiple_roots` carries the ambiguity flag.
/// * `Err(SingularDirectionMatrix)` when the three directions are nearly coplanar.
/// * `Err(NoPositiveRoot)` / `Err(NotConverged)` from the polynomial stage.
/// * Geometry errors from the Gibbs/Herrick-Gibbs completion when both fail.
pub fn angles_gauss(
    obs: &ObservationTriple,
    grav: &GravParams,
    params: &IodParams,
) -> Result<GaussSolution, OrbdetError> {
    let tu = grav.tu_sec();
    let re = grav.re;

    let tau1 = obs.tau1() / tu;
    let tau3 = obs.tau3() / tu;
    let tau13 = tau3 - tau1;

    let l1 = obs.first().los;
    let l2 = obs.middle().los;
    let l3 = obs.last().los;

    let rs1 = obs.first().site_eci / re;
    let rs2 = obs.middle().site_eci / re;
    let rs3 = obs.last().site_eci / re;

    let lmat = Matrix3::from_columns(&[l1, l2, l3]);
    let rsmat = Matrix3::from_columns(&[rs1, rs2, rs3]);
    let lmat_inv = lmat
        .try_inverse()
        .ok_or(OrbdetError::SingularDirectionMatrix)?;
    let m = lmat_inv * rsmat;

    // Truncated f/g series coefficients.
    let a1 = tau3 / tau13;
    let a3 = -tau1 / tau13;
    let a1u = tau3 * (tau13 * tau13 - tau3 * tau3) / (6.0 * tau13);
    let a3u = -tau1 * (tau13 * tau13 - tau1 * tau1) / (6.0 * tau13);

    let d1 = m[(1, 0)] * a1 - m[(1, 1)] + m[(1, 2)] * a3;
    let d2 = m[(1, 0)] * a1u + m[(1, 2)] * a3u;
    let csite = l2.dot(&rs2);
    let rs2_sq = rs2.norm_squared();

    // Same sparse degree-8 polynomial class as Laplace (canonical mu = 1).
    let c6 = -(d1 * d1 + 2.0 * csite * d1 + rs2_sq);
    let c3 = -2.0 * d2 * (csite + d1);
    let c0 = -(d2 * d2);

    let root = solve_range_poly(c6, c3, c0, params.laplace_seed_er, params)?;
    let mag_r2 = root.root;

    let u = 1.0 / mag_r2.powi(3);
    let mut c1_coef = a1 + a1u * u;
    let mut c3_coef = a3 + a3u * u;

    let mut rho = ranges_from_coeffs(&m, c1_coef, c3_coef);
    let mut r1_vec = l1 * rho[0] + rs1;
    let mut r2_vec = l2 * rho[1] + rs2;
    let mut r3_vec = l3 * rho[2] + rs3;

    let mut v2 = completion_velocity(obs, &r1_vec, &r2_vec, &r3_vec, grav)?;

    // Optional differential correction: replace the truncated series with exact
    // universal-variable f/g at both outer epochs and re-solve the ranges.
    let mut refined = false;
    let mut refine_iterations = 0usize;
    if params.gauss_refine {
        let mut rho2_old = rho[1];
        for ktr in 1..=params.gauss_refine_max_iter {
            refine_iterations = ktr;
            // Canonical state at the middle epoch.
            let v2_can = v2 / grav.vu_km_s();
            let (f1, g1) = fg_series_exact(&r2_vec, &v2_can, tau1, params.kepler_max_iter);
            let (f3, g3) = fg_series_exact(&r2_vec, &v2_can, tau3, params.kepler_max_iter);

            let denom = f1 * g3 - f3 * g1;
            if denom.abs() < SMALL * SMALL {
                break;
            }
            c1_coef = g3 / denom;
            c3_coef = -g1 / denom;

            rho = ranges_from_coeffs(&m, c1_coef, c3_coef);
            r1_vec = l1 * rho[0] + rs1;
            r2_vec = l2 * rho[1] + rs2;
            r3_vec = l3 * rho[2] + rs3;

            // Exact velocity from the same f/g pair.
            let v2_can_new = (r3_vec * f1 - r1_vec * f3) * (1.0 / denom);
            v2 = v2_can_new * grav.vu_km_s();

            let drho2 = (rho[1] - rho2_old).abs() * re;
            params.emit(IterationRecord {
                solver: "gauss_refine",
                iteration: ktr,
                residual: drho2,
                estimates: [rho[1] * re, rho[0] * re],
            });
            rho2_old = rho[1];

            if drho2 < params.gauss_refine_tol_km {
                refined = true;
                break;
            }
        }
        debug!(refined, refine_iterations, "gauss differential correction finished");
    }

    Ok(GaussSolution {
        state: StateVector::new(r2_vec * re, v2, obs.middle().epoch),
        root,
        refined,
        refine_iterations,
    })
}

/// Gibbs velocity completion with the Herrick-Gibbs small-angle fallback.
///
/// Positions arrive in canonical radii; the completion itself runs in km so the
/// returned velocity is in km/s.
fn completion_velocity(
    obs: &ObservationTriple,
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    r3: &Vector3<f64>,
    grav: &GravParams,
) -> Result<Vector3<f64>, OrbdetError> {
    let r1k = r1 * grav.re;
    let r2k = r2 * grav.re;
    let r3k = r3 * grav.re;

    match gibbs(&r1k, &r2k, &r3k, grav) {
        Ok((v2, _)) => Ok(v2),
        Err(OrbdetError::DegenerateGeometry(_)) | Err(OrbdetError::NotCoplanar { .. }) => {
            herrick_gibbs(
                &r1k,
                &r2k,
                &r3k,
                &obs.first().epoch,
                &obs.middle().epoch,
                &obs.last().epoch,
                grav,
            )
            .map(|(v2, _)| v2)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod gauss_test {
    use super::*;
    use crate::state_vector::Epoch;
    use crate::iod::Observation;

    #[test]
    fn test_singular_direction_matrix() {
        // Three parallel lines of sight cannot be inverted.
        let los = Vector3::new(0.0, 1.0, 0.0);
        let t0 = Epoch::from_jd_split(2_460_000.5, 0.0);
        let mk = |frac: f64, site: Vector3<f64>| {
            Observation::new(los, site, t0.add_seconds(frac * 86_400.0))
        };
        let triple = ObservationTriple::new(
            mk(0.0, Vector3::new(6378.0, 0.0, 0.0)),
            mk(0.001, Vector3::new(6370.0, 300.0, 0.0)),
            mk(0.002, Vector3::new(6350.0, 600.0, 0.0)),
        )
        .unwrap();

        let err = angles_gauss(&triple, &GravParams::EARTH_WGS84, &IodParams::default())
            .unwrap_err();
        assert_eq!(err, OrbdetError::SingularDirectionMatrix);
    }
}
