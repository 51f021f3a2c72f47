use approx::assert_relative_eq;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use orbdet::constants::{GravParams, RADEG};
use orbdet::iod::IodParams;
use orbdet::kepler::kepler;
use orbdet::lambert::{
    lambert_battin, lambert_u_mins, lambert_univ, DirectionOfMotion, EnergyBranch,
};
use orbdet::state_vector::{Epoch, StateVector};

/// Random bound (elliptic) state: radius in [7000, 30000] km, speed safely below
/// escape, random direction with a non-radial component.
fn random_elliptic_state(rng: &mut StdRng, grav: &GravParams) -> StateVector {
    loop {
        let r_mag = rng.random_range(7_000.0..30_000.0);
        let u = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        if u.norm() < 1e-3 {
            continue;
        }
        let r = u.normalize() * r_mag;

        let w = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let t = r.cross(&w);
        if t.norm() < 1e-3 {
            continue;
        }
        let v_circ = (grav.mu / r_mag).sqrt();
        let v_mag = rng.random_range(0.7..1.25) * v_circ;
        let v = t.normalize() * v_mag;

        let state = StateVector::new(r, v, Epoch::from_jd_split(2_460_000.5, 0.0));
        // Keep perigee above the dense atmosphere so long propagations stay sane.
        let a = 1.0 / state.alpha(grav.mu);
        if a > 6_800.0 {
            return state;
        }
    }
}

#[test]
fn test_kepler_round_trip_random_elliptic() {
    let grav = GravParams::EARTH_WGS84;
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..50 {
        let s = random_elliptic_state(&mut rng, &grav);
        let dt = rng.random_range(-5_000.0..5_000.0);
        if dt.abs() < 1.0 {
            continue;
        }

        let fwd = kepler(&s, dt, &grav, 50).unwrap();
        let back = kepler(&fwd, -dt, &grav, 50).unwrap();

        assert_relative_eq!(
            (back.position - s.position).norm() / s.position.norm(),
            0.0,
            epsilon = 1e-8
        );
        assert_relative_eq!(
            (back.velocity - s.velocity).norm() / s.velocity.norm(),
            0.0,
            epsilon = 1e-8
        );
    }
}

#[test]
fn test_lambert_kepler_consistency_zero_rev() {
    let grav = GravParams::EARTH_WGS84;
    let params = IodParams::default();
    let mut rng = StdRng::seed_from_u64(7);

    let mut checked = 0;
    while checked < 20 {
        let s = random_elliptic_state(&mut rng, &grav);
        let tof = rng.random_range(900.0..4_000.0);
        let end_truth = kepler(&s, tof, &grav, 50).unwrap();

        // Skip geometries too close to the 180 degree singularity; those are the
        // Battin delegation cases, covered separately.
        let cosdnu = s.position.dot(&end_truth.position)
            / (s.position.norm() * end_truth.position.norm());
        if cosdnu < -0.95 {
            continue;
        }

        // The truth arc direction decides short vs long way.
        let h = s.position.cross(&s.velocity);
        let dm = if s.position.cross(&end_truth.position).dot(&h) >= 0.0 && cosdnu > -1.0 {
            DirectionOfMotion::Short
        } else {
            DirectionOfMotion::Long
        };

        let sol = lambert_univ(
            &s.position,
            &end_truth.position,
            &s.velocity,
            dm,
            EnergyBranch::Low,
            0,
            tof,
            None,
            0.0,
            &grav,
            &params,
        )
        .unwrap();

        assert_relative_eq!(
            (sol.v1 - s.velocity).norm() / s.velocity.norm(),
            0.0,
            epsilon = 1e-5
        );
        assert_relative_eq!(
            (sol.v2 - end_truth.velocity).norm() / end_truth.velocity.norm(),
            0.0,
            epsilon = 1e-5
        );
        checked += 1;
    }
}

#[test]
fn test_lambert_kepler_consistency_one_rev() {
    let grav = GravParams::EARTH_WGS84;
    let params = IodParams::default();

    // A mildly elliptic orbit observed over slightly more than one revolution.
    let s = StateVector::new(
        Vector3::new(12_000.0, 0.0, 0.0),
        Vector3::new(0.0, 5.9, 1.0),
        Epoch::from_jd_split(2_460_000.5, 0.0),
    );
    let a = 1.0 / s.alpha(grav.mu);
    let period = std::f64::consts::TAU * (a.powi(3) / grav.mu).sqrt();
    let tof = 1.25 * period;
    let end_truth = kepler(&s, tof, &grav, 50).unwrap();

    let h = s.position.cross(&s.velocity);
    let prograde = s.position.cross(&end_truth.position).dot(&h) >= 0.0;
    let dm = if prograde {
        DirectionOfMotion::Short
    } else {
        DirectionOfMotion::Long
    };

    let boundary = lambert_u_mins(&s.position, &end_truth.position, dm, 1, &grav).unwrap();
    assert!(boundary.tof_min < tof);

    // One of the two energy branches must reproduce the truth velocities.
    let mut matched = false;
    for de in [EnergyBranch::Low, EnergyBranch::High] {
        let sol = lambert_univ(
            &s.position,
            &end_truth.position,
            &s.velocity,
            dm,
            de,
            1,
            tof,
            Some(boundary),
            0.0,
            &grav,
            &params,
        )
        .unwrap();

        let v1_err = (sol.v1 - s.velocity).norm() / s.velocity.norm();
        if v1_err < 1e-5 {
            assert_relative_eq!(
                (sol.v2 - end_truth.velocity).norm() / end_truth.velocity.norm(),
                0.0,
                epsilon = 1e-5
            );
            matched = true;
        }

        // Every returned branch must at least be self-consistent under Kepler.
        let start = StateVector::new(s.position, sol.v1, s.epoch);
        let end = kepler(&start, tof, &grav, 50).unwrap();
        assert_relative_eq!(
            (end.position - end_truth.position).norm() / end_truth.position.norm(),
            0.0,
            epsilon = 1e-5
        );
    }
    assert!(matched, "neither energy branch reproduced the truth orbit");
}

#[test]
fn test_universal_and_battin_agree_off_singularity() {
    let grav = GravParams::EARTH_WGS84;
    let params = IodParams::default();

    // 177 degrees: close to the singularity but still on the universal-variable
    // side of the delegation threshold.
    let r_mag = 9_000.0;
    let theta: f64 = 177.0 * RADEG;
    let r1 = Vector3::new(r_mag, 0.0, 0.0);
    let r2 = Vector3::new(r_mag * theta.cos(), r_mag * theta.sin(), 0.0);
    let tof = 0.47 * std::f64::consts::TAU * (r_mag.powi(3) / grav.mu).sqrt();
    let v1_hint = Vector3::new(0.0, 6.6, 0.0);

    let uni = lambert_univ(
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
        &params,
    )
    .unwrap();
    assert!(uni.psi != 0.0, "universal solver unexpectedly delegated");

    let bat = lambert_battin(
        &r1,
        &r2,
        &v1_hint,
        DirectionOfMotion::Short,
        EnergyBranch::Low,
        0,
        tof,
        0.0,
        &grav,
        &params,
    )
    .unwrap();

    assert_relative_eq!((uni.v1 - bat.v1).norm() / uni.v1.norm(), 0.0, epsilon = 1e-5);
    assert_relative_eq!((uni.v2 - bat.v2).norm() / uni.v2.norm(), 0.0, epsilon = 1e-5);
}

#[test]
fn test_hit_earth_annotation_on_grazing_transfer() {
    let grav = GravParams::EARTH_WGS84;
    let params = IodParams::default();

    // A transfer between two points on opposite sides at low altitude with a long
    // flight time dips toward the Earth on its way.
    let r1 = Vector3::new(8_000.0, 0.0, 0.0);
    let r2 = Vector3::new(-200.0, 8_000.0, 0.0);
    let tof = 5_400.0;

    let sol = lambert_univ(
        &r1,
        &r2,
        &Vector3::zeros(),
        DirectionOfMotion::Long,
        EnergyBranch::Low,
        0,
        tof,
        None,
        200.0,
        &grav,
        &params,
    )
    .unwrap();

    // Whatever the verdict, the annotation must carry a perigee radius consistent
    // with the reported flag.
    if sol.hit_earth.hit {
        assert!(sol.hit_earth.rp < grav.re + 200.0);
    } else {
        assert!(sol.hit_earth.rp >= grav.re + 200.0 || sol.hit_earth.reason
            == orbdet::lambert::ImpactReason::Clear);
    }
}
