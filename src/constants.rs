//! # Constants and type definitions for orbdet
//!
//! This module centralizes the **physical constants**, **conversion factors**, and **common type
//! definitions** used throughout the `orbdet` library, together with the immutable
//! [`GravParams`] configuration value every solver receives by reference.
//!
//! ## Overview
//!
//! - Gravitational and geophysical constants (WGS-84 Earth values)
//! - Unit conversions (degrees ↔ radians, days ↔ seconds)
//! - Canonical-unit helpers (Earth radii / canonical time units)
//! - Core type aliases used across the crate
//!
//! These definitions are used by all main modules: the universal-variable engine, the
//! Lambert solvers, and the angles-only orbit determination suite.

use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Earth gravitational parameter in km³/s² (WGS-84)
pub const MU_EARTH: f64 = 398_600.4418;

/// Earth equatorial radius in kilometers (WGS-84)
pub const EARTH_RADIUS_KM: f64 = 6_378.137;

/// Numerical epsilon used for branch decisions in the universal-variable formulation
pub const SMALL: f64 = 1e-6;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Coplanarity / small-angle tolerance used by Gibbs and Herrick-Gibbs (1° in radians)
pub const ONE_DEGREE: f64 = 0.017_452_406_437_283_512;

/// Conversion factor between Julian Date and Modified Julian Date
pub const JDTOMJD: f64 = 2_400_000.5;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in radians
pub type Radian = f64;
/// Distance in kilometers
pub type Kilometer = f64;
/// Speed in kilometers per second
pub type KmPerSec = f64;
/// Duration in SI seconds
pub type Seconds = f64;

// -------------------------------------------------------------------------------------------------
// Immutable physical configuration
// -------------------------------------------------------------------------------------------------

/// Immutable physical constants consumed by every solver.
///
/// A `GravParams` value is passed by reference into each solver entry point; nothing in the
/// crate reads a global. The canonical-unit helpers express lengths in units of the central
/// body radius and times in the matching canonical time unit, which keeps the dynamic range
/// of the degree-8 range polynomials under control.
///
/// Fields
/// -----------------
/// * `mu`: Gravitational parameter of the central body (km³/s²).
/// * `re`: Reference (equatorial) radius of the central body (km).
///
/// See also
/// ------------
/// * [`GravParams::EARTH_WGS84`] – Default Earth values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GravParams {
    /// Gravitational parameter (km³/s²)
    pub mu: f64,
    /// Central-body equatorial radius (km)
    pub re: f64,
}

impl GravParams {
    /// WGS-84 Earth constants.
    pub const EARTH_WGS84: GravParams = GravParams {
        mu: MU_EARTH,
        re: EARTH_RADIUS_KM,
    };

    /// Canonical time unit in seconds: `sqrt(re³ / mu)`.
    #[inline]
    pub fn tu_sec(&self) -> f64 {
        (self.re.powi(3) / self.mu).sqrt()
    }

    /// Canonical velocity unit in km/s: `re / tu`.
    #[inline]
    pub fn vu_km_s(&self) -> f64 {
        self.re / self.tu_sec()
    }

    /// Convert a distance in kilometers to canonical radii.
    #[inline]
    pub fn to_canonical_distance(&self, km: Kilometer) -> f64 {
        km / self.re
    }

    /// Convert a duration in seconds to canonical time units.
    #[inline]
    pub fn to_canonical_time(&self, sec: Seconds) -> f64 {
        sec / self.tu_sec()
    }

    /// Canonical copy of these constants (`mu = 1`, `re = 1`).
    #[inline]
    pub fn canonical(&self) -> GravParams {
        GravParams { mu: 1.0, re: 1.0 }
    }
}

impl Default for GravParams {
    fn default() -> Self {
        GravParams::EARTH_WGS84
    }
}

#[cfg(test)]
mod grav_params_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_canonical_units() {
        let grav = GravParams::EARTH_WGS84;

        // One canonical time unit for Earth is about 806.8 s.
        assert_relative_eq!(grav.tu_sec(), 806.811, epsilon = 1e-2);
        assert_relative_eq!(grav.vu_km_s(), 7.905_366, epsilon = 1e-5);
        assert_relative_eq!(grav.to_canonical_distance(EARTH_RADIUS_KM), 1.0);
        assert_relative_eq!(grav.to_canonical_time(grav.tu_sec()), 1.0);
    }
}
