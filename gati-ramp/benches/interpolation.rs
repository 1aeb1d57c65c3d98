//! Interpolator benchmarks.
//!
//! The arbitrary-velocity solver sits on the shortcutter hot path and runs
//! once per slowdown try, so its cost dominates planning time.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gati_ramp::Interpolator;

fn bench_zero_vel(c: &mut Criterion) {
    let mut interp = Interpolator::new(6);
    let x0 = [0.0, 0.1, -0.4, 1.2, 0.0, -0.7];
    let x1 = [0.8, -0.3, 0.2, 0.4, 1.0, 0.1];
    let v_max = [2.0; 6];
    let a_max = [4.0; 6];
    let mut out = Vec::new();

    c.bench_function("zero_vel_nd_6dof", |b| {
        b.iter(|| {
            interp.zero_vel_nd(
                black_box(&x0),
                black_box(&x1),
                &v_max,
                &a_max,
                &mut out,
            )
        })
    });
}

fn bench_arbitrary_vel(c: &mut Criterion) {
    let mut interp = Interpolator::new(6);
    let x0 = [0.0, 0.1, -0.4, 1.2, 0.0, -0.7];
    let x1 = [0.8, -0.3, 0.2, 0.4, 1.0, 0.1];
    let v0 = [0.3, -0.1, 0.0, 0.2, -0.4, 0.1];
    let v1 = [0.0, 0.2, -0.3, 0.0, 0.1, 0.0];
    let x_lower = [-10.0; 6];
    let x_upper = [10.0; 6];
    let v_max = [2.0; 6];
    let a_max = [4.0; 6];
    let mut out = Vec::new();

    c.bench_function("arbitrary_vel_nd_6dof", |b| {
        b.iter(|| {
            interp.arbitrary_vel_nd(
                black_box(&x0),
                black_box(&x1),
                black_box(&v0),
                black_box(&v1),
                &x_lower,
                &x_upper,
                &v_max,
                &a_max,
                false,
                &mut out,
            )
        })
    });
}

criterion_group!(benches, bench_zero_vel, bench_arbitrary_vel);
criterion_main!(benches);
