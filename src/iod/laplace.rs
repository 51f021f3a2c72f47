//! # Laplace angles-only IOD
//!
//! Differentiates the middle line of sight (and the site motion) with 3-point Lagrange
//! coefficients, forms the degree-8 range polynomial at the middle epoch, and recovers
//! the full state from the determinant ratios. All arithmetic runs in canonical
//! Earth-radius/time units to control the dynamic range of the polynomial
//! coefficients; the result converts back to km/s only after the root is found.

use nalgebra::{Matrix3, Vector3};

use crate::constants::{GravParams, SMALL};
use crate::iod::poly8::{solve_range_poly, PolynomialRootEstimate};
use crate::iod::{IodParams, ObservationTriple};
use crate::orbdet_errors::OrbdetError;
use crate::state_vector::StateVector;
use serde::{Deserialize, Serialize};

/// Laplace solution: the recovered state at the middle epoch plus the root diagnostics.
///
/// The polynomial ambiguity (`root.possible_multiple_roots`) is surfaced here as an
/// annotation: the solver keeps the Halley root nearest the fixed seed and never
/// attempts disambiguation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaplaceSolution {
    pub state: StateVector,
    pub root: PolynomialRootEstimate,
}

/// Lagrange 3-point first-derivative coefficients evaluated at the middle node.
/// Nodes are `(tau1, 0, tau3)`.
fn lagrange_first(tau1: f64, tau3: f64) -> [f64; 3] {
    [
        -tau3 / (tau1 * (tau1 - tau3)),
        -(tau1 + tau3) / (tau1 * tau3),
        -tau1 / ((tau3 - tau1) * tau3),
    ]
}

/// Lagrange 3-point second-derivative coefficients evaluated at the middle node.
fn lagrange_second(tau1: f64, tau3: f64) -> [f64; 3] {
    [
        2.0 / (tau1 * (tau1 - tau3)),
        2.0 / (tau1 * tau3),
        2.0 / ((tau3 - tau1) * tau3),
    ]
}

#[inline]
fn det3(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> f64 {
    Matrix3::from_columns(&[*a, *b, *c]).determinant()
}

/// Recover a state vector at the middle epoch by Laplace's method.
///
/// Arguments
/// -----------------
/// * `obs`: The observation triple (epochs strictly increasing).
/// * `grav`: Physical constants.
/// * `params`: Halley/Aberth controls and the range seed (`laplace_seed_er`).
///
/// Return
/// ----------
/// * `Ok(LaplaceSolution)` – state at the middle epoch; check
///   `root.possible_multiple_roots` for the multiple-root warning.
/// * `Err(DegenerateGeometry)` when the line-of-sight determinant vanishes
///   (directions and their derivatives nearly coplanar).
/// * `Err(NoPositiveRoot)` / `Err(NotConverged)` from the polynomial stage.
///
/// Notes
/// ----------
/// * The 3-point Lagrange differentiation makes this a *truncated* method: its
///   accuracy degrades with the square of the observation spacing. It remains the
///   fastest of the four solvers and needs no range iteration at all.
pub fn angles_laplace(
    obs: &ObservationTriple,
    grav: &GravParams,
    params: &IodParams,
) -> Result<LaplaceSolution, OrbdetError> {
    let tu = grav.tu_sec();
    let re = grav.re;

    // Canonical times relative to the middle epoch.
    let tau1 = obs.tau1() / tu;
    let tau3 = obs.tau3() / tu;

    let l1 = obs.first().los;
    let l2 = obs.middle().los;
    let l3 = obs.last().los;

    let rs1 = obs.first().site_eci / re;
    let rs2 = obs.middle().site_eci / re;
    let rs3 = obs.last().site_eci / re;

    let c1 = lagrange_first(tau1, tau3);
    let c2 = lagrange_second(tau1, tau3);

    let ldot = l1 * c1[0] + l2 * c1[1] + l3 * c1[2];
    let lddot = l1 * c2[0] + l2 * c2[1] + l3 * c2[2];
    let rsdot = rs1 * c1[0] + rs2 * c1[1] + rs3 * c1[2];
    let rsddot = rs1 * c2[0] + rs2 * c2[1] + rs3 * c2[2];

    let d = 2.0 * det3(&l2, &ldot, &lddot);
    if d.abs() < SMALL * SMALL {
        return Err(OrbdetError::DegenerateGeometry(
            "laplace determinant vanishes: line of sight and derivatives coplanar",
        ));
    }

    let d1 = det3(&l2, &ldot, &rsddot);
    let d2 = det3(&l2, &ldot, &rs2);
    let d3 = det3(&l2, &rsddot, &lddot);
    let d4 = det3(&l2, &rs2, &lddot);

    // rho = a_l + b_l / r^3 with canonical mu = 1.
    let a_l = -2.0 * d1 / d;
    let b_l = -2.0 * d2 / d;
    let csite = l2.dot(&rs2);
    let rs2_sq = rs2.norm_squared();

    // r^8 + c6 r^6 + c3 r^3 + c0 = 0.
    let c6 = -(a_l * a_l + 2.0 * a_l * csite + rs2_sq);
    let c3 = -2.0 * b_l * (a_l + csite);
    let c0 = -(b_l * b_l);

    let root = solve_range_poly(c6, c3, c0, params.laplace_seed_er, params)?;
    let mag_r2 = root.root;

    let r2m3 = 1.0 / mag_r2.powi(3);
    let rho = a_l + b_l * r2m3;
    let rhodot = -(d3 + d4 * r2m3) / d;

    let r2_vec = l2 * rho + rs2;
    let v2_vec = l2 * rhodot + ldot * rho + rsdot;

    Ok(LaplaceSolution {
        state: StateVector::new(
            r2_vec * re,
            v2_vec * grav.vu_km_s(),
            obs.middle().epoch,
        ),
        root,
    })
}
