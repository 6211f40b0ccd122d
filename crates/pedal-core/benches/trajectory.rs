use criterion::{Criterion, black_box, criterion_group, criterion_main};

use pedal_core::{
    FiniteHorizonOptions, Fixed, Precision, TailPlan, Trajectory, finite_horizon_optimal_phase,
    long_horizon_objective, trajectory,
};

fn bench_trajectory_one_shot(c: &mut Criterion) {
    c.bench_function("trajectory_f64_tau_50", |b| {
        b.iter(|| trajectory(black_box(&0.54f64), black_box(&50.0)))
    });
}

fn bench_trajectory_reused(c: &mut Criterion) {
    let mut traj = Trajectory::new(&0.54f64).unwrap();
    traj.evaluate(&200.0).unwrap();
    c.bench_function("trajectory_f64_cached_table", |b| {
        b.iter(|| traj.evaluate(black_box(&137.5)))
    });
}

fn bench_trajectory_fixed(c: &mut Criterion) {
    let p = Precision::new(40);
    let phase = Fixed::parse("0.54", p).unwrap();
    let tau = Fixed::from_int(10, p);
    c.bench_function("trajectory_fixed40_tau_10", |b| {
        b.iter(|| trajectory(black_box(&phase), black_box(&tau)))
    });
}

fn bench_finite_horizon(c: &mut Criterion) {
    let options = FiniteHorizonOptions {
        grid_resolution: 100,
        multi_start: 10,
        ..FiniteHorizonOptions::default()
    };
    let mut group = c.benchmark_group("finite_horizon");
    group.sample_size(10);
    group.bench_function("c_star_tau_20", |b| {
        b.iter(|| finite_horizon_optimal_phase(black_box(20.0), &options))
    });
    group.finish();
}

fn bench_objective(c: &mut Criterion) {
    let p = Precision::new(30);
    let plan = TailPlan::for_precision(p).unwrap();
    let phase = Fixed::parse("0.54", p).unwrap();
    let mut group = c.benchmark_group("long_horizon");
    group.sample_size(10);
    group.bench_function("objective_30_digits", |b| {
        b.iter(|| long_horizon_objective(black_box(&phase), p, plan.truncation, plan.series_terms))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_trajectory_one_shot,
    bench_trajectory_reused,
    bench_trajectory_fixed,
    bench_finite_horizon,
    bench_objective
);
criterion_main!(benches);
