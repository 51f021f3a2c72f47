//! Benchmarks for the universal-variable Lambert solver
//!
//! Run with:
//!   cargo bench --bench lambert_universal
//!   cargo bench lambert_universal -- lambert/zero_rev_short
//!   cargo bench lambert_universal -- lambert/one_rev_with_boundary

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;

use orbdet::constants::GravParams;
use orbdet::iod::IodParams;
use orbdet::lambert::{lambert_u_mins, lambert_univ, DirectionOfMotion, EnergyBranch};

fn bench_zero_rev(c: &mut Criterion) {
    let grav = GravParams::EARTH_WGS84;
    let params = IodParams::default();
    let r1 = Vector3::new(15_945.34, 0.0, 0.0);
    let r2 = Vector3::new(12_214.834, 10_249.467, 0.0);
    let tof = 76.0 * 60.0;

    c.bench_function("lambert/zero_rev_short", |b| {
        b.iter(|| {
            lambert_univ(
                black_box(&r1),
                black_box(&r2),
                &Vector3::zeros(),
                DirectionOfMotion::Short,
                EnergyBranch::Low,
                0,
                black_box(tof),
                None,
                0.0,
                &grav,
                &params,
            )
        })
    });
}

fn bench_one_rev(c: &mut Criterion) {
    let grav = GravParams::EARTH_WGS84;
    let params = IodParams::default();
    let r1 = Vector3::new(15_000.0, 0.0, 0.0);
    let r2 = Vector3::new(0.0, 15_000.0, 0.0);
    let dm = DirectionOfMotion::Short;

    // The boundary solve is a fixture cost, not part of the measured path.
    let boundary = lambert_u_mins(&r1, &r2, dm, 1, &grav).expect("psi boundary");
    let tof = boundary.tof_min * 1.4;

    c.bench_function("lambert/one_rev_with_boundary", |b| {
        b.iter(|| {
            lambert_univ(
                black_box(&r1),
                black_box(&r2),
                &Vector3::zeros(),
                dm,
                EnergyBranch::Low,
                1,
                black_box(tof),
                Some(boundary),
                0.0,
                &grav,
                &params,
            )
        })
    });
}

criterion_group!(benches, bench_zero_rev, bench_one_rev);
criterion_main!(benches);
