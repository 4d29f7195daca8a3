use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use laplace_jacobi::data::local_grid::LocalGrid;
use laplace_jacobi::device::{HostDevice, PoolDevice, SweepDevice};
use laplace_jacobi::prelude::*;

fn seeded_grid(dim: usize) -> LocalGrid {
    let mut g = LocalGrid::zeros(dim);
    for (i, v) in g.as_mut_slice().iter_mut().enumerate() {
        *v = ((i * 7919) % 1000) as f64 * 0.3;
    }
    g
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    let host = HostDevice::new(0);
    let pool = PoolDevice::new(0, 0).expect("thread pool");

    for &dim in &[128usize, 512, 1024] {
        let current = seeded_grid(dim);
        group.bench_with_input(BenchmarkId::new("host", dim), &dim, |b, _| {
            let mut next = current.clone();
            b.iter(|| black_box(host.sweep(&current, &mut next).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("pool", dim), &dim, |b, _| {
            let mut next = current.clone();
            b.iter(|| black_box(pool.sweep(&current, &mut next).unwrap()));
        });
    }
    group.finish();
}

fn bench_threaded_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("threaded_solve");
    group.sample_size(10);
    for &side in &[1usize, 2, 4] {
        let cfg = SolverConfig::default()
            .with_dimension(256)
            .with_topology(side)
            .with_tolerance(0.0)
            .with_max_iterations(50)
            .with_report_every(0);
        group.bench_with_input(BenchmarkId::new("50_iterations", side), &side, |b, _| {
            b.iter(|| black_box(run_threaded(&cfg).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sweep, bench_threaded_solve);
criterion_main!(benches);
