//! # Epochs and inertial state vectors
//!
//! The [`Epoch`] type keeps Julian dates as a **split pair** (whole day + fractional day)
//! so that differencing two epochs a few minutes apart retains sub-second precision;
//! a single `f64` Julian date loses that precision at ~1e-5 s granularity.
//!
//! [`StateVector`] tags an inertial position/velocity pair with its epoch. Every solver
//! in this crate produces a fresh `StateVector`; nothing is aliased or cached.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{Seconds, SECONDS_PER_DAY};

/// Epoch as a split Julian date (whole day + fractional day).
///
/// Fields
/// -----------------
/// * `jd`: Whole Julian day (conventionally ending in `.5`, but any split is accepted).
/// * `jd_frac`: Fractional day, normalized into `[0, 1)` by the constructors.
///
/// The time scale is whatever the caller uses consistently (TT/TDB recommended);
/// the crate only ever *differences* epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    pub jd: f64,
    pub jd_frac: f64,
}

impl Epoch {
    /// Build an epoch from a split Julian date, normalizing the fraction into `[0, 1)`.
    pub fn from_jd_split(jd: f64, jd_frac: f64) -> Epoch {
        let carry = jd_frac.floor();
        Epoch {
            jd: jd + carry,
            jd_frac: jd_frac - carry,
        }
    }

    /// Build an epoch from a single (full-precision-limited) Julian date.
    pub fn from_jd(jd: f64) -> Epoch {
        Epoch::from_jd_split(jd.floor(), jd - jd.floor())
    }

    /// Total Julian date as a single `f64` (precision-losing; for display only).
    #[inline]
    pub fn jd_total(&self) -> f64 {
        self.jd + self.jd_frac
    }

    /// Signed difference `self - other` in SI seconds.
    ///
    /// The whole-day and fractional-day parts are differenced separately before
    /// recombining, which is the entire point of the split representation.
    #[inline]
    pub fn seconds_from(&self, other: &Epoch) -> Seconds {
        ((self.jd - other.jd) + (self.jd_frac - other.jd_frac)) * SECONDS_PER_DAY
    }

    /// A new epoch offset by `sec` SI seconds.
    pub fn add_seconds(&self, sec: Seconds) -> Epoch {
        Epoch::from_jd_split(self.jd, self.jd_frac + sec / SECONDS_PER_DAY)
    }

    /// Convert from a [`hifitime::Epoch`] (dynamical time scale).
    pub fn from_hifitime(epoch: hifitime::Epoch) -> Epoch {
        Epoch::from_jd(epoch.to_jde_et_days())
    }

    /// Convert to a [`hifitime::Epoch`] (dynamical time scale).
    pub fn to_hifitime(&self) -> hifitime::Epoch {
        hifitime::Epoch::from_jde_et(self.jd_total())
    }
}

impl PartialOrd for Epoch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.seconds_from(other).partial_cmp(&0.0)
    }
}

/// Inertial state vector: position (km) and velocity (km/s) at an [`Epoch`].
///
/// Positions and velocities are expressed in whichever common inertial frame the
/// caller's astro-geometry layer uses (typically ECI/J2000). The crate never rotates
/// frames; it only requires that all inputs to one call share a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    /// Position (km)
    pub position: Vector3<f64>,
    /// Velocity (km/s)
    pub velocity: Vector3<f64>,
    /// Epoch of validity
    pub epoch: Epoch,
}

impl StateVector {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, epoch: Epoch) -> StateVector {
        StateVector {
            position,
            velocity,
            epoch,
        }
    }

    /// Specific orbital energy `v²/2 − μ/r` (km²/s²).
    #[inline]
    pub fn specific_energy(&self, mu: f64) -> f64 {
        self.velocity.norm_squared() / 2.0 - mu / self.position.norm()
    }

    /// Reciprocal semi-major axis `α = 2/r − v²/μ` (1/km).
    ///
    /// Positive for ellipses, near zero for parabolas, negative for hyperbolas.
    /// Recomputed on demand, never stored: the conic branch used during an iteration
    /// must always agree with the branch a post-convergence check would derive.
    #[inline]
    pub fn alpha(&self, mu: f64) -> f64 {
        2.0 / self.position.norm() - self.velocity.norm_squared() / mu
    }
}
