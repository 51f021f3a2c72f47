use nalgebra::Vector3;

use orbdet::constants::GravParams;
use orbdet::iod::{Observation, ObservationTriple};
use orbdet::kepler::kepler;
use orbdet::state_vector::{Epoch, StateVector};

/// Earth rotation rate (rad/s), used to move the fictitious observing site.
const EARTH_ROT: f64 = 7.292_115_9e-5;

/// A truth orbit with its radius near the fixed Laplace/Gauss range seed
/// (a = 20 000 km is about 3.13 Earth radii).
pub fn truth_state(grav: &GravParams) -> StateVector {
    let a: f64 = 20_000.0;
    let ecc = 0.1;
    // Start at perigee of an inclined orbit.
    let rp = a * (1.0 - ecc);
    let vp = (grav.mu * (2.0 / rp - 1.0 / a)).sqrt();
    let inc: f64 = 0.5; // rad

    StateVector::new(
        Vector3::new(rp, 0.0, 0.0),
        Vector3::new(0.0, vp * inc.cos(), vp * inc.sin()),
        Epoch::from_jd_split(2_460_200.5, 0.25),
    )
}

/// Observing-site position at `dt` seconds from the middle epoch.
fn site_at(dt: f64, grav: &GravParams) -> Vector3<f64> {
    let lat: f64 = 0.35;
    let theta = 0.6 + EARTH_ROT * dt;
    Vector3::new(
        grav.re * lat.cos() * theta.cos(),
        grav.re * lat.cos() * theta.sin(),
        grav.re * lat.sin(),
    )
}

pub struct SyntheticTrack {
    pub triple: ObservationTriple,
    /// Truth states at the three epochs
    pub states: [StateVector; 3],
    /// Truth slant ranges at the three epochs (km)
    pub ranges: [f64; 3],
}

/// Generate three noiseless topocentric angle observations of the truth orbit,
/// spaced `dt_sec` apart around the middle epoch.
pub fn synthetic_track(dt_sec: f64, grav: &GravParams) -> SyntheticTrack {
    let s2 = truth_state(grav);
    let s1 = kepler(&s2, -dt_sec, grav, 50).expect("backward propagation");
    let s3 = kepler(&s2, dt_sec, grav, 50).expect("forward propagation");

    let states = [s1, s2, s3];
    let offsets = [-dt_sec, 0.0, dt_sec];

    let mut obs = Vec::with_capacity(3);
    let mut ranges = [0.0; 3];
    for (i, (state, off)) in states.iter().zip(offsets).enumerate() {
        let site = site_at(off, grav);
        let slant = state.position - site;
        ranges[i] = slant.norm();
        obs.push(Observation::new(slant.normalize(), site, state.epoch));
    }

    SyntheticTrack {
        triple: ObservationTriple::new(obs[0], obs[1], obs[2]).expect("ordered epochs"),
        states,
        ranges,
    }
}

/// Relative position/velocity error of a recovered middle-epoch state.
pub fn state_errors(recovered: &StateVector, truth: &StateVector) -> (f64, f64) {
    (
        (recovered.position - truth.position).norm() / truth.position.norm(),
        (recovered.velocity - truth.velocity).norm() / truth.velocity.norm(),
    )
}
