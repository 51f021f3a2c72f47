//! # Lambert boundary-value solvers
//!
//! Two formulations of Lambert's problem (two positions + time of flight → the two
//! connecting velocities):
//!
//! * [`universal`] – universal-variable Newton/bisection hybrid on ψ; the workhorse.
//! * [`battin`] – Battin's continued-fraction method, free of the universal-variable
//!   singularity near 180° transfer angles; the universal solver delegates to it
//!   automatically when the geometry approaches that singularity.
//!
//! [`earth_impact`] holds the shared post-check annotating solutions whose transfer
//! perigee dips below a padded Earth radius.

use serde::{Deserialize, Serialize};

use crate::constants::Seconds;

pub mod battin;
pub mod earth_impact;
pub mod universal;

pub use battin::lambert_battin;
pub use earth_impact::{check_hit_earth, check_hit_earth_canonical, EarthImpact, ImpactReason};
pub use universal::{lambert_min_t, lambert_tmax_rp, lambert_u_mins, lambert_univ};

/// Direction of motion around the transfer plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionOfMotion {
    /// Transfer angle below 180°
    Short,
    /// Transfer angle above 180°
    Long,
}

impl DirectionOfMotion {
    /// Sign applied to the `vara` geometry parameter.
    #[inline]
    pub(crate) fn sign(self) -> f64 {
        match self {
            DirectionOfMotion::Short => 1.0,
            DirectionOfMotion::Long => -1.0,
        }
    }
}

/// Energy branch selector for multi-revolution transfers.
///
/// For `nrev ≥ 1` the time-of-flight curve over ψ is U-shaped: two solutions exist for
/// any reachable time. `High` selects the larger-semi-major-axis branch (ψ below the
/// minimum-time ψ), `Low` the tighter orbit (ψ above it). Irrelevant for `nrev = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyBranch {
    Low,
    High,
}

/// Boundary ψ produced by the minimum-time companion solvers, required to
/// disambiguate the energy branches of a multi-revolution transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsiBoundary {
    /// ψ at the minimum time of flight for the requested revolution count
    pub psi: f64,
    /// The minimum time of flight itself (s)
    pub tof_min: Seconds,
}

/// A converged Lambert solution: the two endpoint velocities plus diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LambertSolution {
    /// Velocity on the transfer orbit at r1 (km/s)
    pub v1: nalgebra::Vector3<f64>,
    /// Velocity on the transfer orbit at r2 (km/s)
    pub v2: nalgebra::Vector3<f64>,
    /// Converged universal variable ψ (0 when produced by the Battin path)
    pub psi: f64,
    /// Iterations consumed
    pub iterations: usize,
    /// Earth-impact annotation for the transfer arc (not a failure)
    pub hit_earth: EarthImpact,
}
