//! # Universal-variable Lambert solver and its minimum-time companions
//!
//! Newton/bisection hybrid on the universal variable ψ matching a required time of
//! flight between two position vectors. Multi-revolution transfers need the ψ at
//! minimum time of flight ([`lambert_u_mins`]) to separate the low/high energy
//! branches; [`lambert_min_t`] additionally recovers the velocities of the
//! minimum-time transfer, and [`lambert_tmax_rp`] the transfer of maximum perigee
//! radius within the same geometry.
//!
//! Near 180° transfer angles the `vara` geometry parameter vanishes and this
//! formulation is ill-conditioned: [`lambert_univ`] then delegates to the Battin
//! solver instead of failing.

use std::f64::consts::PI;

use nalgebra::Vector3;
use tracing::debug;

use crate::constants::{GravParams, Seconds, DPI, SMALL};
use crate::iod::{IodParams, IterationRecord};
use crate::lambert::battin::{lamb_hodograph, lambert_battin};
use crate::lambert::earth_impact::check_hit_earth;
use crate::lambert::{DirectionOfMotion, EnergyBranch, LambertSolution, PsiBoundary};
use crate::orbdet_errors::OrbdetError;
use crate::stumpff::find_c2c3;

/// Transfer geometry scalars shared by the ψ iteration helpers.
struct Geometry {
    mag_r1: f64,
    mag_r2: f64,
    cos_dnu: f64,
    vara: f64,
}

fn geometry(r1: &Vector3<f64>, r2: &Vector3<f64>, dm: DirectionOfMotion) -> Geometry {
    let mag_r1 = r1.norm();
    let mag_r2 = r2.norm();
    let cos_dnu = (r1.dot(r2) / (mag_r1 * mag_r2)).clamp(-1.0, 1.0);
    let vara = dm.sign() * (mag_r1 * mag_r2 * (1.0 + cos_dnu)).sqrt();
    Geometry {
        mag_r1,
        mag_r2,
        cos_dnu,
        vara,
    }
}

/// `y(ψ)` auxiliary variable.
#[inline]
fn y_of_psi(geom: &Geometry, psi: f64, c2: f64, c3: f64) -> f64 {
    geom.mag_r1 + geom.mag_r2 + geom.vara * (psi * c3 - 1.0) / c2.sqrt()
}

/// Time of flight at ψ, or `None` where `y < 0` (no physical transfer there).
fn tof_at_psi(geom: &Geometry, psi: f64, sqrt_mu: f64) -> Option<(f64, f64, f64)> {
    let (c2, c3) = find_c2c3(psi);
    let y = y_of_psi(geom, psi, c2, c3);
    if y < 0.0 {
        return None;
    }
    let x = (y / c2).sqrt();
    let dt = (x.powi(3) * c3 + geom.vara * y.sqrt()) / sqrt_mu;
    Some((y, x, dt))
}

/// Analytic dΔt/dψ, with the ψ→0 series form.
fn dtof_dpsi(geom: &Geometry, psi: f64, x: f64, y: f64, c2: f64, c3: f64, sqrt_mu: f64) -> f64 {
    if psi.abs() > 1e-5 {
        let dc2 = (1.0 - psi * c3 - 2.0 * c2) / (2.0 * psi);
        let dc3 = (c2 - 3.0 * c3) / (2.0 * psi);
        (x.powi(3) * (dc3 - 3.0 * c3 * dc2 / (2.0 * c2))
            + 0.125 * geom.vara * (3.0 * c3 * y.sqrt() / c2 + geom.vara / x))
            / sqrt_mu
    } else {
        (std::f64::consts::SQRT_2 / 40.0 * y.powf(1.5)
            + 0.125 * geom.vara * (y.sqrt() + geom.vara * (0.5 / y).sqrt()))
            / sqrt_mu
    }
}

/// Solve Lambert's problem with the universal-variable formulation.
///
/// Arguments
/// -----------------
/// * `r1`, `r2`: Departure and arrival positions (km).
/// * `v1_hint`: Current velocity at r1, used only to orient the transfer plane when
///   the geometry degenerates to a 180°/360° transfer (forwarded to Battin).
/// * `dm`: Direction of motion (short/long way).
/// * `de`: Energy branch for multi-revolution transfers (ignored for `nrev = 0`).
/// * `nrev`: Complete revolutions on the transfer arc.
/// * `dt_sec`: Required time of flight (s), strictly positive.
/// * `psi_boundary`: ψ at minimum TOF from [`lambert_u_mins`]; **required** when
///   `nrev ≥ 1` (the reference left branch selection undefined without it; here the
///   omission is a typed error).
/// * `alt_pad`: Padding altitude for the Earth-impact annotation (km).
/// * `grav`, `params`: Physical constants and iteration budget.
///
/// Return
/// ----------
/// * `Ok(LambertSolution)` with both transfer velocities and the impact annotation.
/// * `Err(NoTransferSolution)` when `dt_sec` is non-positive or below the multi-rev
///   minimum; `Err(MissingPsiBoundary)`, `Err(ImpossibleGeometry)`,
///   `Err(NotConverged)` otherwise.
///
/// Notes
/// ----------
/// * 0-rev transfers admit parabolic/hyperbolic solutions (ψ bracket opens far below
///   zero); `nrev ≥ 1` is restricted to the elliptic band `[4n²π², 4(n+1)²π²]`.
/// * Near-180° transfer angles (`1 + cos Δν` below `lambert_singularity_tol`)
///   delegate to [`lambert_battin`].
#[allow(clippy::too_many_arguments)]
pub fn lambert_univ(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    v1_hint: &Vector3<f64>,
    dm: DirectionOfMotion,
    de: EnergyBranch,
    nrev: u32,
    dt_sec: Seconds,
    psi_boundary: Option<PsiBoundary>,
    alt_pad: f64,
    grav: &GravParams,
    params: &IodParams,
) -> Result<LambertSolution, OrbdetError> {
    if dt_sec <= SMALL {
        return Err(OrbdetError::NoTransferSolution);
    }

    let geom = geometry(r1, r2, dm);

    // Classic Lambert singularity: the chord geometry parameter vanishes near a 180°
    // transfer. The continued-fraction formulation has no such pathology.
    if 1.0 + geom.cos_dnu < params.lambert_singularity_tol {
        debug!(
            cos_dnu = geom.cos_dnu,
            "universal-variable geometry ill-conditioned, delegating to Battin"
        );
        return lambert_battin(
            r1, r2, v1_hint, dm, de, nrev, dt_sec, alt_pad, grav, params,
        );
    }

    let pi2 = PI * PI;
    let (mut lower, mut upper, mut psi) = if nrev == 0 {
        (-16.0 * pi2, 4.0 * pi2, 0.0)
    } else {
        let pb = psi_boundary.ok_or(OrbdetError::MissingPsiBoundary)?;
        if dt_sec < pb.tof_min {
            return Err(OrbdetError::NoTransferSolution);
        }
        let n = nrev as f64;
        let (lo, hi) = match de {
            EnergyBranch::High => (4.0 * n * n * pi2 + SMALL, pb.psi),
            EnergyBranch::Low => (pb.psi, 4.0 * (n + 1.0) * (n + 1.0) * pi2 - SMALL),
        };
        (lo, hi, 0.5 * (lo + hi))
    };

    let sqrt_mu = grav.mu.sqrt();
    let mut iterations = 0usize;

    loop {
        iterations += 1;
        if iterations > params.lambert_max_iter {
            return Err(OrbdetError::NotConverged {
                solver: "lambert_univ",
                iterations: iterations - 1,
            });
        }

        let (mut c2, mut c3) = find_c2c3(psi);
        let mut y = y_of_psi(&geom, psi, c2, c3);

        // Newton drove y negative: bounded search increasing psi until y > 0.
        if geom.vara > 0.0 && y < 0.0 {
            let mut jtr = 0usize;
            while y < 0.0 && jtr < 10 {
                psi = 0.8 * (1.0 / c3) * (1.0 - (geom.mag_r1 + geom.mag_r2) * c2.sqrt() / geom.vara);
                let (nc2, nc3) = find_c2c3(psi);
                c2 = nc2;
                c3 = nc3;
                y = y_of_psi(&geom, psi, c2, c3);
                jtr += 1;
            }
            if y < 0.0 {
                return Err(OrbdetError::ImpossibleGeometry);
            }
        }

        let x = (y / c2).sqrt();
        let dtnew = (x.powi(3) * c3 + geom.vara * y.sqrt()) / sqrt_mu;

        params.emit(IterationRecord {
            solver: "lambert_univ",
            iteration: iterations,
            residual: dtnew - dt_sec,
            estimates: [psi, y],
        });

        if (dtnew - dt_sec).abs() < params.lambert_tof_tol_sec {
            let f = 1.0 - y / geom.mag_r1;
            let gdot = 1.0 - y / geom.mag_r2;
            let g = geom.vara * (y / grav.mu).sqrt();

            let v1t = (r2 - r1 * f) / g;
            let v2t = (r2 * gdot - r1) / g;

            let hit_earth = check_hit_earth(alt_pad, r1, &v1t, r2, &v2t, nrev, grav);
            return Ok(LambertSolution {
                v1: v1t,
                v2: v2t,
                psi,
                iterations,
                hit_earth,
            });
        }

        // Time of flight grows with psi everywhere except on the high-energy branch.
        let increasing = nrev == 0 || de == EnergyBranch::Low;
        if (dtnew <= dt_sec) == increasing {
            lower = psi;
        } else {
            upper = psi;
        }

        let slope = dtof_dpsi(&geom, psi, x, y, c2, c3, sqrt_mu);
        let psinew = psi + (dt_sec - dtnew) / slope;

        psi = if psinew.is_finite() && (lower..=upper).contains(&psinew) {
            psinew
        } else {
            // Newton left the bracket: bisect.
            0.5 * (lower + upper)
        };
    }
}

/// ψ at the minimum time of flight for an `nrev ≥ 1` transfer.
///
/// The TOF curve is unimodal on the elliptic band `(4n²π², 4(n+1)²π²)`; the stationary
/// point is located by golden-section reduction (evaluations where `y < 0` are treated
/// as unreachable). The returned [`PsiBoundary`] disambiguates the low/high energy
/// branches in [`lambert_univ`].
pub fn lambert_u_mins(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    dm: DirectionOfMotion,
    nrev: u32,
    grav: &GravParams,
) -> Result<PsiBoundary, OrbdetError> {
    if nrev == 0 {
        return Err(OrbdetError::InvalidIodParameter(
            "lambert_u_mins requires nrev >= 1".into(),
        ));
    }
    let geom = geometry(r1, r2, dm);
    if geom.vara.abs() < SMALL {
        return Err(OrbdetError::ImpossibleGeometry);
    }

    let sqrt_mu = grav.mu.sqrt();
    let pi2 = PI * PI;
    let n = nrev as f64;
    let mut lo = 4.0 * n * n * pi2 + 1e-6;
    let mut hi = 4.0 * (n + 1.0) * (n + 1.0) * pi2 - 1e-6;

    let eval = |psi: f64| -> f64 {
        tof_at_psi(&geom, psi, sqrt_mu)
            .map(|(_, _, dt)| dt)
            .unwrap_or(f64::INFINITY)
    };

    // Golden-section reduction of the unimodal TOF curve.
    const INVPHI: f64 = 0.618_033_988_749_894_8;
    let mut x1 = hi - INVPHI * (hi - lo);
    let mut x2 = lo + INVPHI * (hi - lo);
    let mut f1 = eval(x1);
    let mut f2 = eval(x2);
    for _ in 0..80 {
        if f1 < f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INVPHI * (hi - lo);
            f1 = eval(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INVPHI * (hi - lo);
            f2 = eval(x2);
        }
    }

    let psi = 0.5 * (lo + hi);
    let tof_min = eval(psi);
    if !tof_min.is_finite() {
        return Err(OrbdetError::ImpossibleGeometry);
    }
    Ok(PsiBoundary { psi, tof_min })
}

/// Minimum time of flight for an `nrev ≥ 1` transfer, with the velocities of the
/// minimum-time trajectory.
///
/// Return
/// ----------
/// * `Ok((boundary, v1t, v2t))` – the ψ boundary for branch disambiguation plus the
///   transfer velocities of the minimum-time trajectory itself.
pub fn lambert_min_t(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    dm: DirectionOfMotion,
    nrev: u32,
    grav: &GravParams,
) -> Result<(PsiBoundary, Vector3<f64>, Vector3<f64>), OrbdetError> {
    let boundary = lambert_u_mins(r1, r2, dm, nrev, grav)?;
    let geom = geometry(r1, r2, dm);
    let sqrt_mu = grav.mu.sqrt();

    let (y, _, _) =
        tof_at_psi(&geom, boundary.psi, sqrt_mu).ok_or(OrbdetError::ImpossibleGeometry)?;

    let f = 1.0 - y / geom.mag_r1;
    let gdot = 1.0 - y / geom.mag_r2;
    let g = geom.vara * (y / grav.mu).sqrt();
    let v1t = (r2 - r1 * f) / g;
    let v2t = (r2 * gdot - r1) / g;

    Ok((boundary, v1t, v2t))
}

/// Transfer of maximum perigee radius within the conic family through (r1, r2, Δν).
///
/// The one-parameter family of conics joining the two positions is parameterized by
/// the semi-latus rectum `p`; the perigee radius `rp(p) = p / (1 + e(p))` is maximized
/// by golden-section search, then the time of flight of the extremal orbit (including
/// `nrev` full revolutions) is recovered through the eccentric-anomaly relations.
///
/// Return
/// ----------
/// * `Ok((tmaxrp, rp_max, v1t, v2t))` – TOF of the max-perigee transfer (s), its
///   perigee radius (km) and the transfer velocities.
/// * `Err(ImpossibleGeometry)` for ~180° geometries (the family is degenerate there);
///   `Err(NoTransferSolution)` when `nrev ≥ 1` but the extremal conic is not elliptic.
#[allow(clippy::too_many_arguments)]
pub fn lambert_tmax_rp(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    v1_hint: &Vector3<f64>,
    dm: DirectionOfMotion,
    nrev: u32,
    grav: &GravParams,
) -> Result<(Seconds, f64, Vector3<f64>, Vector3<f64>), OrbdetError> {
    let geom = geometry(r1, r2, dm);
    let sin_dnu_mag = (1.0 - geom.cos_dnu * geom.cos_dnu).max(0.0).sqrt();
    let sin_dnu = dm.sign() * sin_dnu_mag;
    if sin_dnu.abs() < SMALL {
        return Err(OrbdetError::ImpossibleGeometry);
    }
    let mut dnu = sin_dnu.atan2(geom.cos_dnu);
    if dnu < 0.0 {
        dnu += DPI;
    }

    let (mag_r1, mag_r2) = (geom.mag_r1, geom.mag_r2);

    // e·cos(nu1), e·sin(nu1) of the family member with semi-latus rectum p.
    let conic = |p: f64| -> (f64, f64, f64) {
        let ecosv1 = p / mag_r1 - 1.0;
        let esinv1 = ((p / mag_r1 - 1.0) * dnu.cos() - (p / mag_r2 - 1.0)) / dnu.sin();
        let ecc = (ecosv1 * ecosv1 + esinv1 * esinv1).sqrt();
        (ecosv1, esinv1, ecc)
    };
    let rp_of = |p: f64| -> f64 {
        let (_, _, ecc) = conic(p);
        p / (1.0 + ecc)
    };

    // Golden-section maximization of rp over the admissible p range.
    const INVPHI: f64 = 0.618_033_988_749_894_8;
    let mut lo = 1e-6 * mag_r1.min(mag_r2);
    let mut hi = 4.0 * (mag_r1 + mag_r2);
    let mut x1 = hi - INVPHI * (hi - lo);
    let mut x2 = lo + INVPHI * (hi - lo);
    let mut f1 = rp_of(x1);
    let mut f2 = rp_of(x2);
    for _ in 0..100 {
        if f1 > f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INVPHI * (hi - lo);
            f1 = rp_of(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INVPHI * (hi - lo);
            f2 = rp_of(x2);
        }
    }
    let p = 0.5 * (lo + hi);
    let (ecosv1, esinv1, ecc) = conic(p);
    let rp_max = p / (1.0 + ecc);

    if nrev > 0 && ecc >= 1.0 {
        return Err(OrbdetError::NoTransferSolution);
    }

    let nu1 = esinv1.atan2(ecosv1);
    let nu2 = nu1 + dnu;

    let tof = if ecc < 1.0 {
        let a = p / (1.0 - ecc * ecc);
        let ecc_anom = |nu: f64| -> f64 {
            2.0 * (((1.0 - ecc) / (1.0 + ecc)).sqrt() * (nu / 2.0).tan()).atan()
        };
        let e1 = ecc_anom(nu1);
        let mut de_anom = ecc_anom(nu2) - e1;
        // Unwrap so the eccentric-anomaly sweep matches the positive transfer angle.
        while de_anom < 0.0 {
            de_anom += DPI;
        }
        let dm_anom = de_anom - ecc * ((e1 + de_anom).sin() - e1.sin()) + DPI * nrev as f64;
        dm_anom / (grav.mu / a.powi(3)).sqrt()
    } else {
        let a = p / (1.0 - ecc * ecc); // negative
        let hyp_anom = |nu: f64| -> f64 {
            let t = ((ecc - 1.0) / (ecc + 1.0)).sqrt() * (nu / 2.0).tan();
            ((1.0 + t) / (1.0 - t)).ln() // 2 atanh(t)
        };
        let h1 = hyp_anom(nu1);
        let h2 = hyp_anom(nu2);
        let dm_anom = ecc * (h2.sinh() - h1.sinh()) - (h2 - h1);
        dm_anom / (grav.mu / (-a).powi(3)).sqrt()
    };

    let (v1t, v2t) = lamb_hodograph(r1, v1_hint, r2, p, ecc, dnu, tof, nrev, grav)?;
    Ok((tof, rp_max, v1t, v2t))
}
