//! # Battin continued-fraction Lambert solver
//!
//! Battin's reformulation iterates a non-dimensional variable x through a cubic
//! resolvent evaluated with two continued fractions, and recovers the semi-latus
//! rectum and eccentricity directly — no `y < 0` pathology and no singularity at
//! 180° transfer angles, which is why the universal-variable solver delegates here
//! when its `vara` geometry parameter collapses.
//!
//! [`lamb_hodograph`] converts the converged `(p, ecc)` pair into the endpoint
//! velocities, choosing the transfer-plane normal from `r1 × v1` instead of
//! `r1 × r2` when `sin Δν ≈ 0` (the 180°/360° case where the position vectors no
//! longer span the plane).

use nalgebra::Vector3;
use tracing::debug;

use crate::constants::{GravParams, Seconds, DPI, SMALL};
use crate::iod::{IodParams, IterationRecord};
use crate::lambert::earth_impact::check_hit_earth;
use crate::lambert::{DirectionOfMotion, EnergyBranch, LambertSolution};
use crate::orbdet_errors::OrbdetError;

/// Number of continued-fraction levels; truncation is below 1e-9 over the
/// |η| < 1 range the solver visits.
const CF_DEPTH: usize = 20;

/// Battin's ξ continued fraction.
///
/// `ξ(v) = 8(√(1+v)+1) / (3 + 1/(5 + η + (9/35)η/(1 + (16/63)η/(1 + ...))))` with
/// `η = v/(1+√(1+v))²`; the level-k coefficient is `n²/(4n²−1)` for `n = k+3`.
/// Evaluated by backward recurrence at fixed depth.
pub fn see_battin(v: f64) -> f64 {
    let sqrtopv = (1.0 + v).sqrt();
    let eta = v / (1.0 + sqrtopv).powi(2);

    let mut tail = 1.0;
    for k in (1..CF_DEPTH).rev() {
        let n = (k + 3) as f64;
        let c = n * n / (4.0 * n * n - 1.0);
        tail = 1.0 + c * eta / tail;
    }
    let inner = (9.0 / 35.0) * eta / tail;

    8.0 * (1.0 + sqrtopv) / (3.0 + 1.0 / (5.0 + eta + inner))
}

/// Battin's K continued fraction.
///
/// `K(u) = (1/3)/(1 + d₁u/(1 + d₂u/(1 + ...)))` with the classical coefficients
/// `d₂ₙ₊₁ = 2(3n+2)(6n+1)/(9(4n+1)(4n+3))`, `d₂ₙ = 2(3n+1)(6n−1)/(9(4n−1)(4n+1))`
/// (so d₁ = 4/27, d₂ = 8/27, d₃ = 2/9, d₄ = 22/81, …). Backward recurrence.
pub fn k_battin(u: f64) -> f64 {
    let d = |i: usize| -> f64 {
        if i % 2 == 1 {
            let n = (i / 2) as f64;
            2.0 * (3.0 * n + 2.0) * (6.0 * n + 1.0) / (9.0 * (4.0 * n + 1.0) * (4.0 * n + 3.0))
        } else {
            let n = (i / 2) as f64;
            2.0 * (3.0 * n + 1.0) * (6.0 * n - 1.0) / (9.0 * (4.0 * n - 1.0) * (4.0 * n + 1.0))
        }
    };

    let mut tail = 1.0;
    for i in (1..=CF_DEPTH).rev() {
        tail = 1.0 + d(i) * u / tail;
    }
    (1.0 / 3.0) / tail
}

/// Largest real root of `y³ − c·y² − h2 = 0` by the trigonometric/hyperbolic
/// Cardano closed form (the cubic has exactly one real root for `c, h2 > 0`).
fn cubic_root_closed_form(c: f64, h2: f64) -> f64 {
    // Depressed form: y = w + c/3, w³ + p·w + q = 0.
    let p = -c * c / 3.0;
    let q = -(2.0 * c.powi(3) / 27.0 + h2);
    let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);

    if disc >= 0.0 {
        let sd = disc.sqrt();
        let w = (-q / 2.0 + sd).cbrt() + (-q / 2.0 - sd).cbrt();
        w + c / 3.0
    } else {
        // Three real roots: the largest is the physical one here.
        let rho = (-(p / 3.0).powi(3)).sqrt();
        let theta = (-q / (2.0 * rho)).clamp(-1.0, 1.0).acos();
        2.0 * (-p / 3.0).sqrt() * (theta / 3.0).cos() + c / 3.0
    }
}

/// Solve Lambert's problem with Battin's continued-fraction formulation.
///
/// Mirrors the [`crate::lambert::lambert_univ`] signature (minus the ψ boundary, which
/// has no meaning here). Two code paths:
///
/// * **standard** (0-rev and low-energy multi-rev): the (u, K(u)) resolvent of the
///   cubic `y³ − (1+h1)y² − h2 = 0`;
/// * **high-energy multi-rev** (`de = High`, `nrev > 0`): the cubic is solved in
///   closed form (Cardano) and x advances by the direct fixed-point update, seeded
///   from the small-x side where the high-energy family lives.
///
/// The converged x yields the semi-latus rectum and eccentricity directly (not via
/// f/g), and [`lamb_hodograph`] rebuilds the endpoint velocities.
#[allow(clippy::too_many_arguments)]
pub fn lambert_battin(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    v1_hint: &Vector3<f64>,
    dm: DirectionOfMotion,
    de: EnergyBranch,
    nrev: u32,
    dt_sec: Seconds,
    alt_pad: f64,
    grav: &GravParams,
    params: &IodParams,
) -> Result<LambertSolution, OrbdetError> {
    if dt_sec <= SMALL {
        return Err(OrbdetError::NoTransferSolution);
    }

    let mu = grav.mu;
    let mag_r1 = r1.norm();
    let mag_r2 = r2.norm();
    let cos_dnu = (r1.dot(r2) / (mag_r1 * mag_r2)).clamp(-1.0, 1.0);
    let sin_dnu = dm.sign() * (1.0 - cos_dnu * cos_dnu).max(0.0).sqrt();
    let mut dnu = sin_dnu.atan2(cos_dnu);
    if dnu < 0.0 {
        dnu += DPI;
    }

    let chord = (mag_r1 * mag_r1 + mag_r2 * mag_r2 - 2.0 * mag_r1 * mag_r2 * cos_dnu).sqrt();
    let s = (mag_r1 + mag_r2 + chord) * 0.5;

    let ror = mag_r2 / mag_r1;
    let eps_r = ror - 1.0;
    let tan2w = 0.25 * eps_r * eps_r / (ror.sqrt() + ror * (2.0 + ror.sqrt()));
    let rp = (mag_r1 * mag_r2).sqrt() * ((dnu * 0.25).cos().powi(2) + tan2w);

    let ell = if dnu < std::f64::consts::PI {
        let sq = (dnu * 0.25).sin().powi(2);
        (sq + tan2w) / (sq + tan2w + (dnu * 0.5).cos())
    } else {
        let cq = (dnu * 0.25).cos().powi(2);
        (cq + tan2w - (dnu * 0.5).cos()) / (cq + tan2w)
    };

    let m = mu * dt_sec * dt_sec / (8.0 * rp.powi(3));

    let high_energy = nrev > 0 && de == EnergyBranch::High;
    // The high-energy family lives at small x; the standard recursion starts at L.
    let mut x = if high_energy { 1e-6 } else { ell };
    let mut y;
    let mut iterations = 0usize;

    loop {
        iterations += 1;
        if iterations > params.battin_max_iter {
            return Err(OrbdetError::NotConverged {
                solver: "lambert_battin",
                iterations: iterations - 1,
            });
        }

        let tempx = see_battin(x);
        let denom = 1.0 / ((1.0 + 2.0 * x + ell) * (4.0 * x + tempx * (3.0 + x)));
        let h1 = (ell + x).powi(2) * (1.0 + 3.0 * x + tempx) * denom;
        let h2 = m * (x - ell + tempx) * denom;

        y = if high_energy {
            cubic_root_closed_form(1.0 + h1, h2)
        } else {
            let b = 0.25 * 27.0 * h2 / (1.0 + h1).powi(3);
            if b < -1.0 {
                return Err(OrbdetError::NoTransferSolution);
            }
            let u = 0.5 * b / (1.0 + (1.0 + b).sqrt());
            let k2 = k_battin(u);
            ((1.0 + h1) / 3.0) * (2.0 + (1.0 + b).sqrt() / (1.0 + 2.0 * u * k2 * k2))
        };

        let xn = (((1.0 - ell) * 0.5).powi(2) + m / (y * y)).sqrt() - (1.0 + ell) * 0.5;

        params.emit(IterationRecord {
            solver: "lambert_battin",
            iteration: iterations,
            residual: xn - x,
            estimates: [x, y],
        });

        if (xn - x).abs() < SMALL {
            x = xn;
            break;
        }
        x = xn;
    }

    let a = mu * dt_sec * dt_sec / (16.0 * rp * rp * x * y * y);
    let p = (2.0 * mag_r1 * mag_r2 * y * y * (1.0 + x).powi(2) * (dnu * 0.5).sin().powi(2))
        / (m * s * (1.0 + 2.0 * x + ell).powi(2));
    let ecc = (1.0 - p / a).max(0.0).sqrt();

    debug!(a, p, ecc, iterations, "battin recursion converged");

    let (v1t, v2t) = lamb_hodograph(r1, v1_hint, r2, p, ecc, dnu, dt_sec, nrev, grav)?;
    let hit_earth = check_hit_earth(alt_pad, r1, &v1t, r2, &v2t, nrev, grav);

    Ok(LambertSolution {
        v1: v1t,
        v2: v2t,
        psi: 0.0,
        iterations,
        hit_earth,
    })
}

/// Rebuild the two endpoint velocities of a transfer conic from `(p, ecc, Δν)`.
///
/// The radial component at r1 follows from the conic relations
/// (`(μ/p)·e·sin ν1 = ±√((μe/p)² − (μ/r1 − μ/p)²)`), its sign resolved by
/// consistency with the arrival radius; the transverse component is `√(μp)/r`.
///
/// Singular 180°/360° geometries (`sin Δν ≈ 0`) take the transfer-plane normal from
/// `r1 × v1` (the current-orbit velocity hint) because `r1 × r2` no longer spans the
/// plane; for elliptic multi-period transfers the radial-velocity sign at departure
/// follows the period parity of the requested time of flight.
#[allow(clippy::too_many_arguments)]
pub(crate) fn lamb_hodograph(
    r1: &Vector3<f64>,
    v1: &Vector3<f64>,
    r2: &Vector3<f64>,
    p: f64,
    ecc: f64,
    dnu: f64,
    dt_sec: Seconds,
    nrev: u32,
    grav: &GravParams,
) -> Result<(Vector3<f64>, Vector3<f64>), OrbdetError> {
    let mu = grav.mu;
    // A non-positive semi-latus rectum cannot come out of a converged solver.
    debug_assert!(p > 0.0, "non-positive semi-latus rectum: {p}");

    let mag_r1 = r1.norm();
    let mag_r2 = r2.norm();

    let a_r1 = mu / mag_r1 - mu / p; // (mu/p) e cos nu1
    let b = (mu * ecc / p).powi(2) - a_r1 * a_r1;
    let mut x1 = if b <= 0.0 { 0.0 } else { -b.sqrt() }; // (mu/p) e sin nu1

    let sin_dnu = dnu.sin();
    let cos_dnu = dnu.cos();

    let nunit = if sin_dnu.abs() < SMALL {
        // 180/360 transfer: the endpoint positions no longer span the plane.
        let n = r1.cross(v1);
        if n.norm() < SMALL {
            return Err(OrbdetError::DegenerateGeometry(
                "transfer plane undefined: 180 deg transfer with no usable velocity hint",
            ));
        }
        if ecc < 1.0 {
            let at = p / (1.0 - ecc * ecc);
            let ptx = DPI * (at.powi(3) / mu).sqrt();
            if dt_sec.rem_euclid(ptx) > ptx * 0.5 {
                x1 = -x1;
            }
        }
        n.normalize()
    } else {
        // Sign of the radial component: the candidate that reproduces the arrival
        // radius through the conic sweep wins.
        let y2a = mu / p - x1 * sin_dnu + a_r1 * cos_dnu;
        let y2b = mu / p + x1 * sin_dnu + a_r1 * cos_dnu;
        if (mu / mag_r2 - y2b).abs() < (mu / mag_r2 - y2a).abs() {
            x1 = -x1;
        }
        r1.cross(r2).normalize() * sin_dnu.signum()
    };

    let scale = (p / mu).sqrt();
    let vt = (mu * p).sqrt();

    let r1_unit = r1 / mag_r1;
    let r2_unit = r2 / mag_r2;

    let v1t = r1_unit * (x1 * scale) + nunit.cross(&r1_unit) * (vt / mag_r1);
    let x2 = x1 * cos_dnu + a_r1 * sin_dnu; // (mu/p) e sin nu2
    let v2t = r2_unit * (x2 * scale) + nunit.cross(&r2_unit) * (vt / mag_r2);

    Ok((v1t, v2t))
}

#[cfg(test)]
mod battin_test {
    use super::*;
    use crate::kepler::kepler;
    use crate::state_vector::{Epoch, StateVector};
    use approx::assert_relative_eq;

    #[test]
    fn test_continued_fraction_limits() {
        // xi(0) = 16/3.2 = 5, K(0) = 1/3.
        assert_relative_eq!(see_battin(0.0), 5.0, max_relative = 1e-12);
        assert_relative_eq!(k_battin(0.0), 1.0 / 3.0, max_relative = 1e-12);
    }

    #[test]
    fn test_cubic_closed_form_solves_cubic() {
        for &(c, h2) in &[(1.5, 0.3), (2.0, 1e-6), (1.0, 10.0)] {
            let y = cubic_root_closed_form(c, h2);
            assert!(y > 0.0);
            assert_relative_eq!(y.powi(3) - c * y * y, h2, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_matches_reference_transfer() {
        let grav = GravParams::EARTH_WGS84;
        let r1 = Vector3::new(15_945.34, 0.0, 0.0);
        let r2 = Vector3::new(12_214.834, 10_249.467, 0.0);
        let tof = 76.0 * 60.0;

        let sol = lambert_battin(
            &r1,
            &r2,
            &Vector3::zeros(),
            DirectionOfMotion::Short,
            EnergyBranch::Low,
            0,
            tof,
            0.0,
            &grav,
            &IodParams::default(),
        )
        .unwrap();

        assert_relative_eq!(sol.v1.x, 2.058913, epsilon = 2e-3);
        assert_relative_eq!(sol.v1.y, 2.915965, epsilon = 2e-3);
        assert_relative_eq!(sol.v2.x, -3.451565, epsilon = 2e-3);
        assert_relative_eq!(sol.v2.y, 0.910315, epsilon = 2e-3);
    }

    #[test]
    fn test_near_180_transfer_kepler_consistent() {
        let grav = GravParams::EARTH_WGS84;
        let r_mag = 8_000.0;
        let theta: f64 = 179.5 * crate::constants::RADEG;
        let r1 = Vector3::new(r_mag, 0.0, 0.0);
        let r2 = Vector3::new(r_mag * theta.cos(), r_mag * theta.sin(), 0.0);
        // About half the circular period at this radius.
        let tof = 0.5 * DPI * (r_mag.powi(3) / grav.mu).sqrt();

        let sol = lambert_battin(
            &r1,
            &r2,
            &Vector3::zeros(),
            DirectionOfMotion::Short,
            EnergyBranch::Low,
            0,
            tof,
            0.0,
            &grav,
            &IodParams::default(),
        )
        .unwrap();

        let start = StateVector::new(r1, sol.v1, Epoch::from_jd_split(2_460_000.5, 0.0));
        let end = kepler(&start, tof, &grav, 50).unwrap();
        assert_relative_eq!((end.position - r2).norm() / r_mag, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_universal_delegates_near_180(){
        let grav = GravParams::EARTH_WGS84;
        let r_mag = 8_000.0;
        let theta: f64 = 179.9 * crate::constants::RADEG;
        let r1 = Vector3::new(r_mag, 0.0, 0.0);
        let r2 = Vector3::new(r_mag * theta.cos(), r_mag * theta.sin(), 0.0);
        let tof = 0.5 * DPI * (r_mag.powi(3) / grav.mu).sqrt();
        // A velocity hint defining the transfer plane (prograde in xy).
        let v1_hint = Vector3::new(0.0, 7.0, 0.0);

        let sol = crate::lambert::lambert_univ(
            &r1,
            &r2,
            &v1_hint,
            DirectionOfMotion::Short,
            EnergyBranch::Low,
            0,
            tof,
            None,
            0.0,
            &grav,
            &IodParams::default(),
        )
        .unwrap();

        // Delegated solutions carry psi = 0 (Battin path).
        assert_eq!(sol.psi, 0.0);
        let start = StateVector::new(r1, sol.v1, Epoch::from_jd_split(2_460_000.5, 0.0));
        let end = kepler(&start, tof, &grav, 50).unwrap();
        assert_relative_eq!((end.position - r2).norm() / r_mag, 0.0, epsilon = 1e-3);
    }
}
